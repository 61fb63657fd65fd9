use crate::batch::compute_batch;
use crate::calc::model::OverallResult;
use crate::calc::{compute_student, resolve_supplementary, StudentRequest};
use crate::certify;
use crate::config::{EngineConfig, SelectionPolicy};
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::ledger::RawMarkEntry;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

fn active_config(state: &AppState, req: &Request) -> Result<Arc<EngineConfig>, serde_json::Value> {
    state
        .config
        .clone()
        .ok_or_else(|| err(&req.id, "no_config", "load a configuration first", None))
}

fn optional_param<T: DeserializeOwned>(req: &Request, key: &str) -> Result<Option<T>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|e| err(&req.id, "bad_params", format!("{}: {}", key, e), None)),
    }
}

fn required_param<T: DeserializeOwned>(req: &Request, key: &str) -> Result<T, serde_json::Value> {
    optional_param(req, key)?
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn certified(config: &EngineConfig, req: &Request, result: OverallResult) -> serde_json::Value {
    let certificate = certify::issue(config, &result);
    debug!(
        student_id = %result.student_id,
        verdict = ?result.verdict,
        digest = %result.digest,
        "result certified"
    );
    ok(
        &req.id,
        json!({
            "result": result,
            "certificate": certificate,
        }),
    )
}

fn compute(state: &AppState, req: &Request) -> Result<serde_json::Value, serde_json::Value> {
    let config = active_config(state, req)?;
    let student_id: String = required_param(req, "studentId")?;
    let marks: Vec<RawMarkEntry> = required_param(req, "marks")?;
    let subject_ids: Option<Vec<String>> = optional_param(req, "subjectIds")?;
    let selection: Option<SelectionPolicy> = optional_param(req, "selection")?;

    let student = StudentRequest {
        student_id: &student_id,
        entries: &marks,
        subject_ids: subject_ids.as_deref(),
        selection: selection.as_ref(),
    };
    match compute_student(&config, &student) {
        Ok(result) => Ok(certified(&config, req, result)),
        Err(e) => {
            warn!(student_id = %student_id, code = e.code(), "result not computed: {}", e);
            Err(calc_err(&req.id, &e))
        }
    }
}

fn compute_batch_outcomes(state: &AppState, req: &Request) -> Result<serde_json::Value, serde_json::Value> {
    let config = active_config(state, req)?;
    let marks: Vec<RawMarkEntry> = required_param(req, "marks")?;
    let subject_ids: Option<Vec<String>> = optional_param(req, "subjectIds")?;
    let selection: Option<SelectionPolicy> = optional_param(req, "selection")?;

    let outcomes: Vec<serde_json::Value> =
        compute_batch(&config, marks, subject_ids.as_deref(), selection.as_ref())
            .into_iter()
            .map(|o| {
                let certificate = o.result.as_ref().map(|r| certify::issue(&config, r));
                let mut v = json!(o);
                if let Some(c) = certificate {
                    v["certificate"] = json!(c);
                }
                v
            })
            .collect();
    Ok(ok(&req.id, json!({ "outcomes": outcomes })))
}

fn supplementary(state: &AppState, req: &Request) -> Result<serde_json::Value, serde_json::Value> {
    let config = active_config(state, req)?;
    let previous: OverallResult = required_param(req, "previous")?;
    let marks: Vec<RawMarkEntry> = required_param(req, "marks")?;

    match resolve_supplementary(&config, &previous, &marks) {
        Ok(result) => Ok(certified(&config, req, result)),
        Err(e) => {
            warn!(
                student_id = %previous.student_id,
                code = e.code(),
                "supplementary result not computed: {}",
                e
            );
            Err(calc_err(&req.id, &e))
        }
    }
}

fn handle_result_compute(state: &mut AppState, req: &Request) -> serde_json::Value {
    compute(state, req).unwrap_or_else(|e| e)
}

fn handle_result_compute_batch(state: &mut AppState, req: &Request) -> serde_json::Value {
    compute_batch_outcomes(state, req).unwrap_or_else(|e| e)
}

fn handle_result_supplementary(state: &mut AppState, req: &Request) -> serde_json::Value {
    supplementary(state, req).unwrap_or_else(|e| e)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "result.compute" => Some(handle_result_compute(state, req)),
        "result.computeBatch" => Some(handle_result_compute_batch(state, req)),
        "result.supplementary" => Some(handle_result_supplementary(state, req)),
        _ => None,
    }
}
