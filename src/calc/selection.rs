use super::model::SubjectResult;
use super::rounding::cmp_fraction;
use crate::config::SelectionPolicy;
use crate::error::CalcError;
use std::cmp::Ordering;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub counted: Vec<SubjectResult>,
    pub excluded: Vec<SubjectResult>,
}

/// Splits a trailing run of ASCII digits off an id: `S10` -> (`S`, `10`).
fn split_numeric_suffix(id: &str) -> (&str, &str) {
    let at = id
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)
        .unwrap_or(id.len());
    id.split_at(at)
}

/// Orders subject ids so that `S9` comes before `S10`. Ids sharing a
/// prefix compare by their numeric suffix; anything else, and any
/// remaining tie such as `S09` against `S9`, falls back to plain string
/// order.
fn cmp_subject_ids(a: &str, b: &str) -> Ordering {
    let (a_prefix, a_digits) = split_numeric_suffix(a);
    let (b_prefix, b_digits) = split_numeric_suffix(b);
    if a_prefix == b_prefix && !a_digits.is_empty() && !b_digits.is_empty() {
        let a_num = a_digits.trim_start_matches('0');
        let b_num = b_digits.trim_start_matches('0');
        a_num
            .len()
            .cmp(&b_num.len())
            .then_with(|| a_num.cmp(b_num))
            .then_with(|| a.cmp(b))
    } else {
        a.cmp(b)
    }
}

/// Higher total first, then higher percentage, then lower subject id in
/// natural order.
fn elective_rank(a: &SubjectResult, b: &SubjectResult) -> Ordering {
    b.total_obtained
        .cmp(&a.total_obtained)
        .then_with(|| {
            cmp_fraction(
                u64::from(b.total_obtained),
                u64::from(b.total_max),
                u64::from(a.total_obtained),
                u64::from(a.total_max),
            )
        })
        .then_with(|| cmp_subject_ids(&a.subject_id, &b.subject_id))
}

/// Splits subject results into counted and transcript-only sets. Both keep
/// the input order.
pub fn select_subjects(
    all: Vec<SubjectResult>,
    policy: &SelectionPolicy,
) -> Result<Selection, CalcError> {
    let (core_ids, n) = match policy {
        SelectionPolicy::AllSubjects => {
            return Ok(Selection {
                counted: all,
                excluded: Vec::new(),
            })
        }
        SelectionPolicy::BestOfN {
            core_subject_ids,
            n,
        } => (core_subject_ids, *n),
    };

    for id in core_ids {
        if !all.iter().any(|s| &s.subject_id == id) {
            return Err(CalcError::Policy(format!(
                "core subject {} has no result for this student",
                id
            )));
        }
    }

    let mut electives: Vec<&SubjectResult> = all
        .iter()
        .filter(|s| !core_ids.contains(&s.subject_id))
        .collect();
    if n > electives.len() {
        return Err(CalcError::Policy(format!(
            "best of {} requested but only {} elective subject(s) available",
            n,
            electives.len()
        )));
    }
    electives.sort_by(|a, b| elective_rank(a, b));
    let kept: HashSet<String> = electives
        .iter()
        .take(n)
        .map(|s| s.subject_id.clone())
        .collect();

    let (counted, excluded) = all
        .into_iter()
        .partition(|s| core_ids.contains(&s.subject_id) || kept.contains(&s.subject_id));
    Ok(Selection { counted, excluded })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SubjectCategory;

    fn result(id: &str, total: u32, max: u32) -> SubjectResult {
        SubjectResult {
            subject_id: id.to_string(),
            subject_name: id.to_string(),
            category: SubjectCategory::Core,
            components: Vec::new(),
            total_obtained: total,
            total_max: max,
            percentage: 100.0 * f64::from(total) / f64::from(max),
            display_percentage: 0.0,
            grade: String::new(),
            passed: true,
            supplementary_eligible: false,
            remark: String::new(),
        }
    }

    fn ids(v: &[SubjectResult]) -> Vec<&str> {
        v.iter().map(|s| s.subject_id.as_str()).collect()
    }

    fn best_of(core: &[&str], n: usize) -> SelectionPolicy {
        SelectionPolicy::BestOfN {
            core_subject_ids: core.iter().map(|s| s.to_string()).collect(),
            n,
        }
    }

    #[test]
    fn all_subjects_is_identity() {
        let all = vec![result("S1", 10, 100), result("S2", 20, 100)];
        let sel = select_subjects(all.clone(), &SelectionPolicy::AllSubjects).expect("ok");
        assert_eq!(sel.counted, all);
        assert!(sel.excluded.is_empty());
    }

    #[test]
    fn best_of_keeps_core_and_strongest_elective() {
        let all = vec![
            result("S1", 60, 100),
            result("S2", 90, 100),
            result("S3", 55, 100),
            result("S4", 40, 100),
            result("S5", 70, 100),
        ];
        let sel = select_subjects(all, &best_of(&["S1", "S3", "S4"], 1)).expect("ok");
        assert_eq!(ids(&sel.counted), vec!["S1", "S2", "S3", "S4"]);
        assert_eq!(ids(&sel.excluded), vec!["S5"]);
    }

    #[test]
    fn ties_prefer_percentage_then_lower_id() {
        // Same total; S7 has the smaller maximum so the higher percentage.
        let all = vec![result("S6", 45, 100), result("S7", 45, 50), result("S8", 45, 50)];
        let sel = select_subjects(all.clone(), &best_of(&[], 1)).expect("ok");
        assert_eq!(ids(&sel.counted), vec!["S7"]);

        let reversed: Vec<SubjectResult> = all.into_iter().rev().collect();
        let sel = select_subjects(reversed, &best_of(&[], 2)).expect("ok");
        assert_eq!(ids(&sel.counted), vec!["S8", "S7"]);
        assert_eq!(ids(&sel.excluded), vec!["S6"]);
    }

    #[test]
    fn id_tie_break_is_numeric_within_a_prefix() {
        let all = vec![result("S10", 45, 50), result("S9", 45, 50)];
        let sel = select_subjects(all, &best_of(&[], 1)).expect("ok");
        assert_eq!(ids(&sel.counted), vec!["S9"]);

        assert_eq!(cmp_subject_ids("S9", "S10"), Ordering::Less);
        assert_eq!(cmp_subject_ids("S09", "S9"), Ordering::Less);
        assert_eq!(cmp_subject_ids("MATH", "S1"), Ordering::Less);
        assert_eq!(cmp_subject_ids("S", "S1"), Ordering::Less);
    }

    #[test]
    fn too_few_electives_is_a_policy_error() {
        let all = vec![result("S1", 10, 100), result("S2", 20, 100)];
        let err = select_subjects(all, &best_of(&["S1"], 2)).unwrap_err();
        assert_eq!(
            err,
            CalcError::Policy("best of 2 requested but only 1 elective subject(s) available".into())
        );
    }

    #[test]
    fn missing_core_result_is_a_policy_error() {
        let all = vec![result("S2", 20, 100)];
        let err = select_subjects(all, &best_of(&["S1"], 0)).unwrap_err();
        assert_eq!(err.code(), "policy_error");
    }
}
