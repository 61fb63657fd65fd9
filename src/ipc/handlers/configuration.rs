use crate::config::{self, ConfigDocument, EngineConfig};
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

fn parse_document(req: &Request) -> Result<ConfigDocument, serde_json::Value> {
    let Some(raw) = req.params.get("config") else {
        return Err(err(&req.id, "bad_params", "missing params.config", None));
    };
    serde_json::from_value(raw.clone())
        .map_err(|e| err(&req.id, "bad_params", format!("config: {}", e), None))
}

fn summary(cfg: &EngineConfig) -> serde_json::Value {
    json!({
        "subjects": cfg.subjects().len(),
        "examTerms": cfg.terms().len(),
        "configDigest": cfg.digest(),
    })
}

fn validate(req: &Request, doc: ConfigDocument) -> Result<EngineConfig, serde_json::Value> {
    EngineConfig::from_document(doc).map_err(|e| {
        warn!(code = e.code(), "configuration rejected: {}", e);
        calc_err(&req.id, &e)
    })
}

fn handle_config_validate(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let doc = match parse_document(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match validate(req, doc) {
        Ok(cfg) => {
            let mut result = summary(&cfg);
            result["valid"] = json!(true);
            ok(&req.id, result)
        }
        Err(e) => e,
    }
}

fn handle_config_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);

    let doc = match path {
        Some(p) => match config::load_document(&p) {
            Ok(doc) => doc,
            Err(e) => return err(&req.id, "config_read_failed", format!("{e:#}"), None),
        },
        None => match parse_document(req) {
            Ok(v) => v,
            Err(e) => return e,
        },
    };

    match validate(req, doc) {
        Ok(cfg) => {
            info!(
                subjects = cfg.subjects().len(),
                terms = cfg.terms().len(),
                digest = cfg.digest(),
                "configuration loaded"
            );
            let result = summary(&cfg);
            state.config = Some(Arc::new(cfg));
            ok(&req.id, result)
        }
        Err(e) => e,
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "config.validate" => Some(handle_config_validate(state, req)),
        "config.load" => Some(handle_config_load(state, req)),
        _ => None,
    }
}
