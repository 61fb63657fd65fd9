use crate::certify;
use crate::config::{ComponentKind, SelectionPolicy, SubjectCategory};
use crate::error::CalcError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertifiedComponentMark {
    pub component: ComponentKind,
    pub blended_marks: u32,
    pub max_marks: u32,
    pub passing_marks: u32,
    pub passed: bool,
    pub grace_applied: u32,
    /// Terms recorded ABSENT; each contributed zero.
    #[serde(default)]
    pub absent_terms: Vec<String>,
    /// Set once a supplementary mark replaced the blended one.
    #[serde(default)]
    pub supplementary_applied: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectResult {
    pub subject_id: String,
    pub subject_name: String,
    pub category: SubjectCategory,
    pub components: Vec<CertifiedComponentMark>,
    pub total_obtained: u32,
    pub total_max: u32,
    pub percentage: f64,
    pub display_percentage: f64,
    pub grade: String,
    pub passed: bool,
    pub supplementary_eligible: bool,
    pub remark: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
    Supplementary,
}

/// One certified result. Never patched: a later pass produces a new value
/// whose `supersedes` names this one's digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallResult {
    pub student_id: String,
    /// Subjects counted toward the aggregate, in configuration order.
    pub subjects: Vec<SubjectResult>,
    /// Subjects left out by the selection policy; transcript only.
    pub excluded_subjects: Vec<SubjectResult>,
    pub total_marks: u64,
    pub max_marks: u64,
    pub percentage: f64,
    pub display_percentage: f64,
    pub overall_grade: String,
    pub division: String,
    pub verdict: Verdict,
    pub selection: SelectionPolicy,
    pub supplementary_round: u32,
    #[serde(default)]
    pub supersedes: Option<String>,
    #[serde(default)]
    pub digest: String,
}

impl OverallResult {
    pub fn all_subjects(&self) -> impl Iterator<Item = &SubjectResult> {
        self.subjects.iter().chain(self.excluded_subjects.iter())
    }

    fn content_digest(&self) -> Result<String, CalcError> {
        let mut unsealed = self.clone();
        unsealed.digest = String::new();
        certify::digest_json(&unsealed)
            .map_err(|e| CalcError::ArithmeticInvariant(format!("result digest failed: {}", e)))
    }

    pub(crate) fn seal(mut self) -> Result<Self, CalcError> {
        self.digest = self.content_digest()?;
        Ok(self)
    }

    pub fn verify_digest(&self) -> Result<(), CalcError> {
        let expected = self.content_digest()?;
        if expected == self.digest {
            Ok(())
        } else {
            Err(CalcError::Integrity(format!(
                "result for student {} does not match its digest",
                self.student_id
            )))
        }
    }
}
