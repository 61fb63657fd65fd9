use super::model::CertifiedComponentMark;
use super::rounding::Ratio;
use crate::config::{ComponentSpec, GracePolicy, SubjectDefinition, SubjectPlan};
use crate::error::{CalcError, MissingMark};
use crate::ledger::MarkValue;
use std::collections::BTreeMap;

/// Raises a near-miss to exactly the passing mark when the shortfall is
/// within the grace ceiling. Returns `(marks, grace_applied)`.
pub fn apply_grace(marks: u32, spec: &ComponentSpec, policy: &GracePolicy) -> (u32, u32) {
    if marks >= spec.passing_marks || spec.passing_marks > spec.max_marks {
        return (marks, 0);
    }
    let shortfall = spec.passing_marks - marks;
    if shortfall <= policy.ceiling {
        (spec.passing_marks, shortfall)
    } else {
        (marks, 0)
    }
}

/// Blends one component's regular-term marks into a certified mark.
///
/// Each term contributes `obtained / termMax * maxMarks * weightage / 100`.
/// The sum is exact and rounded once, half away from zero. ABSENT terms
/// count as zero; terms not yet entered are reported together as
/// `MissingMarks`.
pub fn resolve_component(
    subject: &SubjectDefinition,
    plan: &SubjectPlan,
    spec: &ComponentSpec,
    term_marks: &BTreeMap<String, MarkValue>,
    grace: &GracePolicy,
) -> Result<CertifiedComponentMark, CalcError> {
    if plan.weight_total() != 100 {
        return Err(CalcError::configuration(format!(
            "subject {}: regular term weightages sum to {}, expected 100",
            subject.id,
            plan.weight_total()
        )));
    }

    let mut blended = Ratio::ZERO;
    let mut missing = Vec::new();
    let mut absent_terms = Vec::new();
    for w in plan.weights() {
        let term_max = spec.max_marks_for_term(&w.term_id);
        match term_marks
            .get(&w.term_id)
            .copied()
            .unwrap_or(MarkValue::NotEntered)
        {
            MarkValue::NotEntered => missing.push(MissingMark {
                subject_id: subject.id.clone(),
                exam_term_id: w.term_id.clone(),
                component: spec.kind,
            }),
            MarkValue::Absent => absent_terms.push(w.term_id.clone()),
            MarkValue::Obtained(hundredths) => {
                // hundredths / 100 / term_max * max * weight / 100
                blended = blended.add(Ratio::new(
                    i128::from(hundredths) * i128::from(spec.max_marks) * i128::from(w.weightage),
                    i128::from(term_max) * 10_000,
                ));
            }
        }
    }
    if !missing.is_empty() {
        return Err(CalcError::MissingMarks { missing });
    }

    let rounded = blended.round_half_away();
    if rounded < 0 || rounded > i128::from(spec.max_marks) {
        return Err(CalcError::ArithmeticInvariant(format!(
            "subject {} {}: blended marks {} outside 0..{}",
            subject.id, spec.kind, rounded, spec.max_marks
        )));
    }
    let (blended_marks, grace_applied) = apply_grace(rounded as u32, spec, grace);

    Ok(CertifiedComponentMark {
        component: spec.kind,
        blended_marks,
        max_marks: spec.max_marks,
        passing_marks: spec.passing_marks,
        passed: blended_marks >= spec.passing_marks,
        grace_applied,
        absent_terms,
        supplementary_applied: false,
    })
}

/// Replaces a certified mark wholesale with a supplementary attempt. The
/// attempt is scaled from its paper maximum; no grace applies.
pub fn replace_with_supplementary(
    subject: &SubjectDefinition,
    spec: &ComponentSpec,
    term_id: &str,
    value: MarkValue,
) -> Result<CertifiedComponentMark, CalcError> {
    let term_max = spec.max_marks_for_term(term_id);
    let (marks, absent_terms) = match value {
        MarkValue::NotEntered => {
            return Err(CalcError::MissingMarks {
                missing: vec![MissingMark {
                    subject_id: subject.id.clone(),
                    exam_term_id: term_id.to_string(),
                    component: spec.kind,
                }],
            })
        }
        MarkValue::Absent => (0, vec![term_id.to_string()]),
        MarkValue::Obtained(hundredths) => {
            let r = Ratio::new(
                i128::from(hundredths) * i128::from(spec.max_marks),
                i128::from(term_max) * 100,
            )
            .round_half_away();
            (r, Vec::new())
        }
    };
    if marks < 0 || marks > i128::from(spec.max_marks) {
        return Err(CalcError::ArithmeticInvariant(format!(
            "subject {} {}: supplementary marks {} outside 0..{}",
            subject.id, spec.kind, marks, spec.max_marks
        )));
    }
    let marks = marks as u32;
    Ok(CertifiedComponentMark {
        component: spec.kind,
        blended_marks: marks,
        max_marks: spec.max_marks,
        passing_marks: spec.passing_marks,
        passed: marks >= spec.passing_marks,
        grace_applied: 0,
        absent_terms,
        supplementary_applied: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{fixtures, ComponentKind};
    use proptest::prelude::*;

    fn marks(pairs: &[(&str, MarkValue)]) -> BTreeMap<String, MarkValue> {
        pairs.iter().map(|(t, v)| (t.to_string(), *v)).collect()
    }

    fn obtained(v: i64) -> MarkValue {
        MarkValue::Obtained(v * 100)
    }

    #[test]
    fn science_theory_and_practical_blend() {
        let cfg = fixtures::config();
        let s2 = cfg.subject("S2").expect("S2");
        let plan = cfg.plan("S2").expect("plan");
        let no_grace = GracePolicy::default();

        // 60*0.2 + 68*0.3 + 72*0.5 = 68.4
        let theory = resolve_component(
            s2,
            plan,
            &s2.components[0],
            &marks(&[("QY", obtained(60)), ("HY", obtained(68)), ("AN", obtained(72))]),
            &no_grace,
        )
        .expect("theory");
        assert_eq!(theory.blended_marks, 68);
        assert!(theory.passed);

        // 20*0.2 + 21*0.3 + 23*0.5 = 21.8
        let practical = resolve_component(
            s2,
            plan,
            &s2.components[1],
            &marks(&[("QY", obtained(20)), ("HY", obtained(21)), ("AN", obtained(23))]),
            &no_grace,
        )
        .expect("practical");
        assert_eq!(practical.blended_marks, 22);
        assert_eq!(practical.grace_applied, 0);
    }

    #[test]
    fn rounds_once_after_summation() {
        // Rounding per term would give 1 + 2 + 1 = 4; the exact sum is 2.5.
        let cfg = fixtures::config();
        let s1 = cfg.subject("S1").expect("S1");
        let plan = cfg.plan("S1").expect("plan");
        let m = marks(&[
            ("QY", MarkValue::Obtained(250)),
            ("HY", MarkValue::Obtained(500)),
            ("AN", MarkValue::Obtained(100)),
        ]);
        // 2.5*0.2 + 5*0.3 + 1*0.5 = 0.5 + 1.5 + 0.5
        let c = resolve_component(s1, plan, &s1.components[0], &m, &GracePolicy::default()).expect("ok");
        assert_eq!(c.blended_marks, 3);
    }

    #[test]
    fn term_maximum_scales_attainment() {
        let mut doc = fixtures::document();
        doc.subjects[0].components[0].term_max_marks.insert("QY".into(), 50);
        let cfg = crate::config::EngineConfig::from_document(doc).expect("valid");
        let s1 = cfg.subject("S1").expect("S1");
        let m = marks(&[("QY", obtained(50)), ("HY", obtained(100)), ("AN", obtained(100))]);
        let c = resolve_component(s1, cfg.plan("S1").expect("plan"), &s1.components[0], &m, &GracePolicy::default())
            .expect("ok");
        assert_eq!(c.blended_marks, 100);
    }

    #[test]
    fn absent_counts_zero_and_is_recorded() {
        let cfg = fixtures::config();
        let s1 = cfg.subject("S1").expect("S1");
        let m = marks(&[("QY", MarkValue::Absent), ("HY", obtained(50)), ("AN", obtained(50))]);
        let c = resolve_component(s1, cfg.plan("S1").expect("plan"), &s1.components[0], &m, &GracePolicy::default())
            .expect("ok");
        assert_eq!(c.blended_marks, 40);
        assert_eq!(c.absent_terms, vec!["QY".to_string()]);
    }

    #[test]
    fn every_missing_term_is_reported() {
        let cfg = fixtures::config();
        let s1 = cfg.subject("S1").expect("S1");
        let m = marks(&[("HY", MarkValue::NotEntered), ("AN", obtained(50))]);
        let err = resolve_component(s1, cfg.plan("S1").expect("plan"), &s1.components[0], &m, &GracePolicy::default())
            .unwrap_err();
        let CalcError::MissingMarks { missing } = err else {
            panic!("expected missing marks");
        };
        let terms: Vec<&str> = missing.iter().map(|m| m.exam_term_id.as_str()).collect();
        assert_eq!(terms, vec!["QY", "HY"]);
    }

    #[test]
    fn grace_lifts_near_miss_to_passing() {
        let cfg = fixtures::config();
        let s1 = cfg.subject("S1").expect("S1");
        let m = marks(&[("QY", obtained(31)), ("HY", obtained(31)), ("AN", obtained(31))]);
        let c = resolve_component(s1, cfg.plan("S1").expect("plan"), &s1.components[0], &m, &cfg.grace)
            .expect("ok");
        assert_eq!(c.blended_marks, 33);
        assert_eq!(c.grace_applied, 2);
        assert!(c.passed);

        let far = marks(&[("QY", obtained(29)), ("HY", obtained(29)), ("AN", obtained(29))]);
        let c = resolve_component(s1, cfg.plan("S1").expect("plan"), &s1.components[0], &far, &cfg.grace)
            .expect("ok");
        assert_eq!(c.blended_marks, 29);
        assert_eq!(c.grace_applied, 0);
        assert!(!c.passed);
    }

    #[test]
    fn supplementary_replacement_is_scaled_and_graceless() {
        let cfg = fixtures::config();
        let s1 = cfg.subject("S1").expect("S1");
        let c = replace_with_supplementary(s1, &s1.components[0], "SUP", obtained(31)).expect("ok");
        assert_eq!(c.blended_marks, 31);
        assert!(!c.passed);
        assert_eq!(c.grace_applied, 0);
        assert!(c.supplementary_applied);

        let absent = replace_with_supplementary(s1, &s1.components[0], "SUP", MarkValue::Absent).expect("ok");
        assert_eq!(absent.blended_marks, 0);
        assert_eq!(absent.absent_terms, vec!["SUP".to_string()]);
    }

    proptest! {
        #[test]
        fn grace_never_lowers_or_overshoots(
            max in 1u32..200,
            passing_frac in 0u32..=100,
            marks_frac in 0u32..=100,
            ceiling in 0u32..10,
        ) {
            let passing = max * passing_frac / 100;
            let marks = max * marks_frac / 100;
            let spec = fixtures::component(ComponentKind::Theory, max, passing);
            let (after, grace) = apply_grace(marks, &spec, &GracePolicy { ceiling });
            prop_assert!(after >= marks);
            prop_assert!(after <= max);
            prop_assert_eq!(after - marks, grace);
            prop_assert!(grace <= ceiling);
            if marks >= passing {
                prop_assert_eq!(after, marks);
            }
            if grace > 0 {
                prop_assert_eq!(after, passing);
            }
        }

        #[test]
        fn blending_is_deterministic_and_bounded(
            qy in 0i64..=10_000,
            hy in 0i64..=10_000,
            an in 0i64..=10_000,
        ) {
            let cfg = fixtures::config();
            let s1 = cfg.subject("S1").expect("S1");
            let plan = cfg.plan("S1").expect("plan");
            let m = marks(&[
                ("QY", MarkValue::Obtained(qy)),
                ("HY", MarkValue::Obtained(hy)),
                ("AN", MarkValue::Obtained(an)),
            ]);
            let a = resolve_component(s1, plan, &s1.components[0], &m, &cfg.grace).expect("ok");
            let b = resolve_component(s1, plan, &s1.components[0], &m, &cfg.grace).expect("ok");
            prop_assert_eq!(&a, &b);
            prop_assert!(a.blended_marks <= 100);
        }
    }
}
