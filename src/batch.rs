use crate::calc::model::OverallResult;
use crate::calc::{compute_student, StudentRequest};
use crate::config::{EngineConfig, SelectionPolicy};
use crate::error::ErrorBody;
use crate::ledger::{group_by_student, RawMarkEntry};
use rayon::prelude::*;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentOutcome {
    pub student_id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<OverallResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Computes every student in the batch independently. Outcomes come back in
/// student id order whatever order the entries arrived in, and one
/// student's error never reaches another's result.
pub fn compute_batch(
    config: &EngineConfig,
    entries: Vec<RawMarkEntry>,
    subject_ids: Option<&[String]>,
    selection: Option<&SelectionPolicy>,
) -> Vec<StudentOutcome> {
    let per_student: Vec<(String, Vec<RawMarkEntry>)> =
        group_by_student(entries).into_iter().collect();

    per_student
        .par_iter()
        .map(|(student_id, marks)| {
            let req = StudentRequest {
                subject_ids,
                selection,
                ..StudentRequest::new(student_id, marks)
            };
            match compute_student(config, &req) {
                Ok(result) => StudentOutcome {
                    student_id: student_id.clone(),
                    ok: true,
                    result: Some(result),
                    error: None,
                },
                Err(e) => {
                    warn!(student_id = %student_id, code = e.code(), "student result not computed");
                    StudentOutcome {
                        student_id: student_id.clone(),
                        ok: false,
                        result: None,
                        error: Some(e.to_body()),
                    }
                }
            }
        })
        .collect()
}
