use crate::calc::rounding::to_hundredths;
use crate::config::{ComponentKind, EngineConfig, TermKind};
use crate::error::CalcError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One cell of the data-entry grid. `obtainedMarks: null` means the mark
/// has not been entered yet; `absent: true` is the ABSENT sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawMarkEntry {
    pub student_id: String,
    pub subject_id: String,
    pub exam_term_id: String,
    pub component: ComponentKind,
    #[serde(default)]
    pub obtained_marks: Option<f64>,
    #[serde(default)]
    pub absent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkValue {
    NotEntered,
    Absent,
    /// Hundredths of a mark.
    Obtained(i64),
}

type MarkKey = (String, ComponentKind, String);

/// Validated marks of one student for one kind of term.
#[derive(Debug, Clone)]
pub struct MarkLedger {
    student_id: String,
    marks: BTreeMap<MarkKey, MarkValue>,
}

impl MarkLedger {
    /// Rejects, all at once, entries that name unknown subjects, terms or
    /// components, belong to another student or another term kind, repeat
    /// a cell, or fall outside the component's mark range.
    pub fn build(
        config: &EngineConfig,
        student_id: &str,
        entries: &[RawMarkEntry],
        term_kind: TermKind,
    ) -> Result<Self, CalcError> {
        let mut problems = Vec::new();
        let mut marks = BTreeMap::new();

        for (i, e) in entries.iter().enumerate() {
            let at = format!("marks[{}] {}/{}/{}", i, e.subject_id, e.exam_term_id, e.component);
            if e.student_id != student_id {
                problems.push(format!("{}: belongs to student {}, not {}", at, e.student_id, student_id));
                continue;
            }
            let Some(subject) = config.subject(&e.subject_id) else {
                problems.push(format!("{}: unknown subject", at));
                continue;
            };
            let Some(term) = config.term(&e.exam_term_id) else {
                problems.push(format!("{}: unknown exam term", at));
                continue;
            };
            if term.kind != term_kind {
                problems.push(format!("{}: term kind is {:?}, expected {:?}", at, term.kind, term_kind));
                continue;
            }
            let Some(spec) = subject.component(e.component) else {
                problems.push(format!("{}: subject has no {} component", at, e.component));
                continue;
            };

            let value = match (e.absent, e.obtained_marks) {
                (true, Some(_)) => {
                    problems.push(format!("{}: marked absent but carries obtainedMarks", at));
                    continue;
                }
                (true, None) => MarkValue::Absent,
                (false, None) => MarkValue::NotEntered,
                (false, Some(v)) => {
                    let Some(h) = to_hundredths(v) else {
                        problems.push(format!("{}: {} is not a mark with at most two decimals", at, v));
                        continue;
                    };
                    let term_max = spec.max_marks_for_term(&term.id);
                    if h < i64::from(spec.min_marks) * 100 || h > i64::from(term_max) * 100 {
                        problems.push(format!(
                            "{}: {} outside {}..{}",
                            at, v, spec.min_marks, term_max
                        ));
                        continue;
                    }
                    MarkValue::Obtained(h)
                }
            };

            let key = (e.subject_id.clone(), e.component, e.exam_term_id.clone());
            if marks.insert(key, value).is_some() {
                problems.push(format!("{}: entered more than once", at));
            }
        }

        if problems.is_empty() {
            Ok(MarkLedger {
                student_id: student_id.to_string(),
                marks,
            })
        } else {
            Err(CalcError::InvalidMark { problems })
        }
    }

    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    /// Term id -> mark for one subject component.
    pub fn term_marks(&self, subject_id: &str, kind: ComponentKind) -> BTreeMap<String, MarkValue> {
        self.marks
            .iter()
            .filter(|((s, k, _), _)| s == subject_id && *k == kind)
            .map(|((_, _, t), v)| (t.clone(), *v))
            .collect()
    }

    pub fn subject_ids(&self) -> BTreeSet<&str> {
        self.marks.keys().map(|(s, _, _)| s.as_str()).collect()
    }
}

/// Splits a batch of entries per student, ordered by student id.
pub fn group_by_student(entries: Vec<RawMarkEntry>) -> BTreeMap<String, Vec<RawMarkEntry>> {
    let mut out: BTreeMap<String, Vec<RawMarkEntry>> = BTreeMap::new();
    for e in entries {
        out.entry(e.student_id.clone()).or_default().push(e);
    }
    out
}

#[cfg(test)]
pub(crate) fn entry(student: &str, subject: &str, term: &str, kind: ComponentKind, marks: Option<f64>) -> RawMarkEntry {
    RawMarkEntry {
        student_id: student.to_string(),
        subject_id: subject.to_string(),
        exam_term_id: term.to_string(),
        component: kind,
        obtained_marks: marks,
        absent: false,
    }
}
