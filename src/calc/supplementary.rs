use super::aggregate::{aggregate, Provenance};
use super::component::replace_with_supplementary;
use super::model::{OverallResult, SubjectResult, Verdict};
use super::selection::select_subjects;
use super::subject::resolve_subject;
use crate::config::{EngineConfig, TermKind};
use crate::error::CalcError;
use crate::ledger::{MarkLedger, RawMarkEntry};
use tracing::debug;

/// Produces the result that supersedes `previous` once supplementary marks
/// are in.
///
/// Re-attempted components are replaced wholesale; everything else keeps
/// its certified mark. Every subject is re-resolved at the next round so
/// eligibility is recomputed, which turns a still-failing subject into a
/// final `FAIL` once the round limit is reached.
pub fn resolve_supplementary(
    config: &EngineConfig,
    previous: &OverallResult,
    entries: &[RawMarkEntry],
) -> Result<OverallResult, CalcError> {
    previous.verify_digest()?;
    if previous.supplementary_round >= config.supplementary.max_rounds {
        return Err(CalcError::configuration(format!(
            "student {}: {} supplementary round(s) already resolved and no further round is allowed",
            previous.student_id, previous.supplementary_round
        )));
    }
    if previous.verdict != Verdict::Supplementary {
        return Err(CalcError::Policy(format!(
            "student {}: verdict {:?} does not admit a supplementary attempt",
            previous.student_id, previous.verdict
        )));
    }
    config.check_selection(&previous.selection)?;

    let ledger = MarkLedger::build(config, &previous.student_id, entries, TermKind::Supplementary)?;

    let mut problems = Vec::new();
    for subject_id in ledger.subject_ids() {
        match previous.all_subjects().find(|s| s.subject_id == subject_id) {
            None => problems.push(format!("subject {} is not on the previous result", subject_id)),
            Some(s) if !s.supplementary_eligible => {
                problems.push(format!("subject {} is not eligible for supplementary", subject_id))
            }
            Some(s) => {
                for c in s.components.iter().filter(|c| c.grace_applied > 0) {
                    if !ledger.term_marks(subject_id, c.component).is_empty() {
                        problems.push(format!(
                            "subject {} {}: component was passed by grace and cannot be re-attempted",
                            subject_id, c.component
                        ));
                    }
                }
            }
        }
    }
    if !problems.is_empty() {
        return Err(CalcError::Policy(problems.join("; ")));
    }

    let mut prior: Vec<&SubjectResult> = previous.all_subjects().collect();
    for s in &prior {
        if config.subject_position(&s.subject_id).is_none() {
            return Err(CalcError::configuration(format!(
                "previous result references unconfigured subject {}",
                s.subject_id
            )));
        }
    }
    prior.sort_by_key(|s| config.subject_position(&s.subject_id));

    let round = previous.supplementary_round + 1;
    let mut missing = Vec::new();
    let mut invalid = Vec::new();
    let mut resolved = Vec::with_capacity(prior.len());
    for s in prior {
        let Some(def) = config.subject(&s.subject_id) else {
            continue;
        };
        let mut components = s.components.clone();
        for c in components.iter_mut() {
            let attempts = ledger.term_marks(&s.subject_id, c.component);
            if attempts.len() > 1 {
                invalid.push(format!(
                    "{}/{}: more than one supplementary term entered",
                    s.subject_id, c.component
                ));
                continue;
            }
            let Some((term_id, value)) = attempts.into_iter().next() else {
                continue;
            };
            let Some(spec) = def.component(c.component) else {
                return Err(CalcError::ArithmeticInvariant(format!(
                    "subject {}: certified {} component is not configured",
                    s.subject_id, c.component
                )));
            };
            match replace_with_supplementary(def, spec, &term_id, value) {
                Ok(replaced) => *c = replaced,
                Err(CalcError::MissingMarks { missing: m }) => missing.extend(m),
                Err(e) => return Err(e),
            }
        }
        if missing.is_empty() && invalid.is_empty() {
            resolved.push(resolve_subject(def, components, config, round)?);
        }
    }
    if !invalid.is_empty() {
        return Err(CalcError::InvalidMark { problems: invalid });
    }
    if !missing.is_empty() {
        return Err(CalcError::MissingMarks { missing });
    }

    debug!(
        student_id = %previous.student_id,
        round,
        "supplementary marks applied"
    );
    let selection = select_subjects(resolved, &previous.selection)?;
    aggregate(
        &previous.student_id,
        selection,
        &previous.selection,
        config,
        Provenance {
            supplementary_round: round,
            supersedes: Some(previous.digest.clone()),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::{compute_student, StudentRequest};
    use crate::config::{fixtures, ComponentKind, EngineConfig};
    use crate::ledger::entry;

    fn regular(student: &str, subject: &str, kind: ComponentKind, m: f64) -> Vec<RawMarkEntry> {
        ["QY", "HY", "AN"]
            .iter()
            .map(|t| entry(student, subject, t, kind, Some(m)))
            .collect()
    }

    fn failing_maths(cfg: &EngineConfig) -> OverallResult {
        let mut marks = regular("st1", "S1", ComponentKind::Theory, 20.0);
        marks.extend(regular("st1", "S3", ComponentKind::Theory, 70.0));
        compute_student(cfg, &StudentRequest::new("st1", &marks)).expect("first pass")
    }

    #[test]
    fn passing_supplementary_turns_verdict_to_pass() {
        let cfg = fixtures::config();
        let first = failing_maths(&cfg);
        assert_eq!(first.verdict, Verdict::Supplementary);
        assert!(first.subjects[0].supplementary_eligible);

        let sup = [entry("st1", "S1", "SUP", ComponentKind::Theory, Some(40.0))];
        let second = resolve_supplementary(&cfg, &first, &sup).expect("second pass");
        assert_eq!(second.verdict, Verdict::Pass);
        assert_eq!(second.supplementary_round, 1);
        assert_eq!(second.supersedes.as_deref(), Some(first.digest.as_str()));
        let maths = &second.subjects[0];
        assert_eq!(maths.total_obtained, 40);
        assert_eq!(maths.remark, "SUPP");
        assert!(maths.components[0].supplementary_applied);
        assert_eq!(second.subjects[1], first.subjects[1].clone());
    }

    #[test]
    fn failing_again_is_final_fail() {
        let cfg = fixtures::config();
        let first = failing_maths(&cfg);
        let sup = [entry("st1", "S1", "SUP", ComponentKind::Theory, Some(31.0))];
        let second = resolve_supplementary(&cfg, &first, &sup).expect("second pass");
        assert_eq!(second.verdict, Verdict::Fail);
        assert!(!second.subjects[0].supplementary_eligible);
        assert_eq!(second.subjects[0].components[0].grace_applied, 0);
    }

    #[test]
    fn second_round_without_cascading_is_a_configuration_error() {
        let cfg = fixtures::config();
        let first = failing_maths(&cfg);
        let sup = [entry("st1", "S1", "SUP", ComponentKind::Theory, Some(31.0))];
        let second = resolve_supplementary(&cfg, &first, &sup).expect("second pass");
        let err = resolve_supplementary(&cfg, &second, &sup).unwrap_err();
        assert_eq!(err.code(), "configuration_error");
    }

    #[test]
    fn cascading_rounds_when_policy_allows() {
        let mut doc = fixtures::document();
        doc.supplementary.max_rounds = 2;
        let cfg = EngineConfig::from_document(doc).expect("valid");
        let first = failing_maths(&cfg);
        let low = [entry("st1", "S1", "SUP", ComponentKind::Theory, Some(31.0))];
        let second = resolve_supplementary(&cfg, &first, &low).expect("second");
        assert_eq!(second.verdict, Verdict::Supplementary);
        let high = [entry("st1", "S1", "SUP", ComponentKind::Theory, Some(50.0))];
        let third = resolve_supplementary(&cfg, &second, &high).expect("third");
        assert_eq!(third.verdict, Verdict::Pass);
        assert_eq!(third.supplementary_round, 2);
    }

    #[test]
    fn ineligible_subject_is_rejected() {
        let cfg = fixtures::config();
        let first = failing_maths(&cfg);
        let sup = [entry("st1", "S3", "SUP", ComponentKind::Theory, Some(90.0))];
        let err = resolve_supplementary(&cfg, &first, &sup).unwrap_err();
        assert_eq!(
            err,
            CalcError::Policy("subject S3 is not eligible for supplementary".into())
        );
    }

    fn grace_passed_theory_with_failed_practical() -> Vec<RawMarkEntry> {
        // Theory blends to 24, one short of 25; practical blends to 4 of 8.
        let mut marks = regular("st1", "S2", ComponentKind::Theory, 24.0);
        marks.extend(regular("st1", "S2", ComponentKind::Practical, 4.0));
        marks.extend(regular("st1", "S1", ComponentKind::Theory, 60.0));
        marks
    }

    #[test]
    fn failed_practical_beside_grace_passed_theory_goes_to_supplementary() {
        let cfg = fixtures::config();
        let marks = grace_passed_theory_with_failed_practical();
        let first = compute_student(&cfg, &StudentRequest::new("st1", &marks)).expect("first pass");
        let science = &first.subjects[1];
        assert_eq!(science.components[0].grace_applied, 1);
        assert!(science.components[0].passed);
        assert!(!science.components[1].passed);
        assert!(science.supplementary_eligible);
        assert_eq!(first.verdict, Verdict::Supplementary);

        let sup = [entry("st1", "S2", "SUP", ComponentKind::Practical, Some(12.0))];
        let second = resolve_supplementary(&cfg, &first, &sup).expect("second pass");
        assert_eq!(second.verdict, Verdict::Pass);
        assert_eq!(second.subjects[1].components[0].grace_applied, 1);
        assert_eq!(second.subjects[1].components[1].blended_marks, 12);
    }

    #[test]
    fn grace_passed_component_cannot_be_re_attempted() {
        let cfg = fixtures::config();
        let marks = grace_passed_theory_with_failed_practical();
        let first = compute_student(&cfg, &StudentRequest::new("st1", &marks)).expect("first pass");
        let sup = [entry("st1", "S2", "SUP", ComponentKind::Theory, Some(60.0))];
        assert_eq!(
            resolve_supplementary(&cfg, &first, &sup).unwrap_err(),
            CalcError::Policy(
                "subject S2 theory: component was passed by grace and cannot be re-attempted".into()
            )
        );
    }

    #[test]
    fn regular_term_marks_are_rejected() {
        let cfg = fixtures::config();
        let first = failing_maths(&cfg);
        let sup = [entry("st1", "S1", "AN", ComponentKind::Theory, Some(90.0))];
        assert_eq!(
            resolve_supplementary(&cfg, &first, &sup).unwrap_err().code(),
            "invalid_mark"
        );
    }

    #[test]
    fn tampered_previous_result_is_rejected() {
        let cfg = fixtures::config();
        let mut first = failing_maths(&cfg);
        first.subjects[0].supplementary_eligible = true;
        first.subjects[1].total_obtained = 100;
        let sup = [entry("st1", "S1", "SUP", ComponentKind::Theory, Some(40.0))];
        assert_eq!(
            resolve_supplementary(&cfg, &first, &sup).unwrap_err().code(),
            "integrity_error"
        );
    }
}
