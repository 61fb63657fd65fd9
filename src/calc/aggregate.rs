use super::model::{OverallResult, SubjectResult, Verdict};
use super::rounding::{display_percentage, percentage};
use super::selection::Selection;
use crate::config::{EngineConfig, SelectionPolicy, SupplementaryPolicy};
use crate::error::CalcError;

/// Where a result sits in the supersession chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub supplementary_round: u32,
    pub supersedes: Option<String>,
}

pub fn verdict_for(counted: &[SubjectResult], policy: &SupplementaryPolicy) -> Verdict {
    let failed: Vec<&SubjectResult> = counted.iter().filter(|s| !s.passed).collect();
    if failed.is_empty() {
        Verdict::Pass
    } else if failed.iter().all(|s| s.supplementary_eligible)
        && failed.len() <= policy.max_failed_subjects as usize
    {
        Verdict::Supplementary
    } else {
        Verdict::Fail
    }
}

/// Sums the counted subjects into the student's overall result and seals it.
pub fn aggregate(
    student_id: &str,
    selection: Selection,
    policy: &SelectionPolicy,
    config: &EngineConfig,
    provenance: Provenance,
) -> Result<OverallResult, CalcError> {
    if selection.counted.is_empty() {
        return Err(CalcError::Policy(format!(
            "no subjects counted for student {}",
            student_id
        )));
    }

    let total_marks: u64 = selection
        .counted
        .iter()
        .map(|s| u64::from(s.total_obtained))
        .sum();
    let max_marks: u64 = selection
        .counted
        .iter()
        .map(|s| u64::from(s.total_max))
        .sum();
    if total_marks > max_marks || max_marks == 0 {
        return Err(CalcError::ArithmeticInvariant(format!(
            "student {}: total {} against maximum {}",
            student_id, total_marks, max_marks
        )));
    }

    let pct = percentage(total_marks, max_marks);
    let overall_grade = config
        .grades
        .grade_for(pct)
        .ok_or_else(|| CalcError::configuration(format!("no grade band matches {}%", pct)))?
        .to_string();
    let division = config
        .divisions
        .division_for(pct)
        .ok_or_else(|| CalcError::configuration(format!("no division matches {}%", pct)))?
        .to_string();
    let verdict = verdict_for(&selection.counted, &config.supplementary);

    OverallResult {
        student_id: student_id.to_string(),
        subjects: selection.counted,
        excluded_subjects: selection.excluded,
        total_marks,
        max_marks,
        percentage: pct,
        display_percentage: display_percentage(total_marks, max_marks),
        overall_grade,
        division,
        verdict,
        selection: policy.clone(),
        supplementary_round: provenance.supplementary_round,
        supersedes: provenance.supersedes,
        digest: String::new(),
    }
    .seal()
}
