use super::model::{CertifiedComponentMark, SubjectResult};
use super::rounding::{display_percentage, percentage};
use crate::config::{EngineConfig, SubjectDefinition};
use crate::error::CalcError;

/// Remark codes derived from computed fields only, space-joined in a fixed
/// order: `DISTN`, `GRACE`, `ABS`, `SUPP`.
pub fn remark_for(
    passed: bool,
    percentage: f64,
    components: &[CertifiedComponentMark],
    distinction_percent: f64,
) -> String {
    let mut codes = Vec::new();
    if passed && percentage >= distinction_percent {
        codes.push("DISTN");
    }
    if components.iter().any(|c| c.grace_applied > 0) {
        codes.push("GRACE");
    }
    if components.iter().any(|c| !c.absent_terms.is_empty()) {
        codes.push("ABS");
    }
    if components.iter().any(|c| c.supplementary_applied) {
        codes.push("SUPP");
    }
    codes.join(" ")
}

/// Combines certified components into the subject's total, grade and verdict.
///
/// Every component must clear its own passing mark. `rounds_used` is the
/// number of supplementary rounds already taken by the student; once it
/// reaches the policy's limit no subject is eligible again.
pub fn resolve_subject(
    subject: &SubjectDefinition,
    components: Vec<CertifiedComponentMark>,
    config: &EngineConfig,
    rounds_used: u32,
) -> Result<SubjectResult, CalcError> {
    if components.len() != subject.components.len()
        || subject
            .components
            .iter()
            .zip(&components)
            .any(|(spec, c)| spec.kind != c.component)
    {
        return Err(CalcError::ArithmeticInvariant(format!(
            "subject {}: certified components do not match configuration",
            subject.id
        )));
    }

    let mut total_obtained: u32 = 0;
    for (spec, c) in subject.components.iter().zip(&components) {
        if c.blended_marks > spec.max_marks {
            return Err(CalcError::ArithmeticInvariant(format!(
                "subject {} {}: {} exceeds maxMarks {}",
                subject.id, spec.kind, c.blended_marks, spec.max_marks
            )));
        }
        total_obtained += c.blended_marks;
    }
    let total_max = subject.total_max_marks();

    let passed = subject
        .components
        .iter()
        .zip(&components)
        .all(|(spec, c)| c.blended_marks >= spec.passing_marks);

    let pct = percentage(u64::from(total_obtained), u64::from(total_max));
    let grade = config
        .grades
        .grade_for(pct)
        .ok_or_else(|| {
            CalcError::configuration(format!(
                "subject {}: no grade band matches {}%",
                subject.id, pct
            ))
        })?
        .to_string();

    // A failing component already bumped by grace has had its one chance.
    let exhausted = components
        .iter()
        .filter(|c| !c.passed)
        .any(|c| c.grace_applied > 0);
    let supplementary_eligible = !passed
        && subject.supplementary_allowed
        && !exhausted
        && rounds_used < config.supplementary.max_rounds;

    let remark = remark_for(passed, pct, &components, config.remarks.distinction_percent);

    Ok(SubjectResult {
        subject_id: subject.id.clone(),
        subject_name: subject.name.clone(),
        category: subject.category,
        components,
        total_obtained,
        total_max,
        percentage: pct,
        display_percentage: display_percentage(u64::from(total_obtained), u64::from(total_max)),
        grade,
        passed,
        supplementary_eligible,
        remark,
    })
}
