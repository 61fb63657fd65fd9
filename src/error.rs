use crate::config::ComponentKind;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// One required mark that has not been entered yet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingMark {
    pub subject_id: String,
    pub exam_term_id: String,
    pub component: ComponentKind,
}

/// Everything the engine can refuse to compute.
///
/// `Configuration`, `Integrity` and `ArithmeticInvariant` abort the whole
/// student. `MissingMarks` and `InvalidMark` carry every offending entry so
/// the caller can fix all of them in one round-trip.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("configuration rejected: {}", .problems.join("; "))]
    Configuration { problems: Vec<String> },

    #[error("{} required mark(s) not entered", .missing.len())]
    MissingMarks { missing: Vec<MissingMark> },

    #[error("invalid mark entries: {}", .problems.join("; "))]
    InvalidMark { problems: Vec<String> },

    #[error("selection policy: {0}")]
    Policy(String),

    #[error("result integrity: {0}")]
    Integrity(String),

    #[error("arithmetic invariant violated: {0}")]
    ArithmeticInvariant(String),
}

impl CalcError {
    pub fn configuration(problem: impl Into<String>) -> Self {
        CalcError::Configuration {
            problems: vec![problem.into()],
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CalcError::Configuration { .. } => "configuration_error",
            CalcError::MissingMarks { .. } => "missing_marks",
            CalcError::InvalidMark { .. } => "invalid_mark",
            CalcError::Policy(_) => "policy_error",
            CalcError::Integrity(_) => "integrity_error",
            CalcError::ArithmeticInvariant(_) => "arithmetic_invariant",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            CalcError::Configuration { problems } | CalcError::InvalidMark { problems } => {
                Some(json!({ "problems": problems }))
            }
            CalcError::MissingMarks { missing } => Some(json!({ "missing": missing })),
            _ => None,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }
}

/// Wire shape of an error, shared by IPC responses and batch outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_marks_body_lists_every_entry() {
        let e = CalcError::MissingMarks {
            missing: vec![
                MissingMark {
                    subject_id: "S1".into(),
                    exam_term_id: "T1".into(),
                    component: ComponentKind::Theory,
                },
                MissingMark {
                    subject_id: "S2".into(),
                    exam_term_id: "T3".into(),
                    component: ComponentKind::Practical,
                },
            ],
        };
        let body = e.to_body();
        assert_eq!(body.code, "missing_marks");
        assert_eq!(body.message, "2 required mark(s) not entered");
        let details = body.details.expect("details");
        assert_eq!(details["missing"][1]["examTermId"], "T3");
        assert_eq!(details["missing"][1]["component"], "practical");
    }

    #[test]
    fn policy_error_has_no_details() {
        let e = CalcError::Policy("n exceeds electives".into());
        assert_eq!(e.code(), "policy_error");
        assert!(e.details().is_none());
    }
}
