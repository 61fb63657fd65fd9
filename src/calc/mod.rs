//! Result computation engine.
//!
//! Data flows one way: ledger -> component -> subject -> selection ->
//! aggregate, with `supplementary` re-entering at the subject step. Nothing
//! here performs I/O or keeps state between calls.

pub mod aggregate;
pub mod component;
pub mod model;
pub mod rounding;
pub mod selection;
pub mod subject;
pub mod supplementary;

use crate::config::{EngineConfig, SelectionPolicy, TermKind};
use crate::error::CalcError;
use crate::ledger::{MarkLedger, RawMarkEntry};
use aggregate::{aggregate, Provenance};
use component::resolve_component;
use model::OverallResult;
use selection::select_subjects;
use subject::resolve_subject;
use tracing::debug;

pub use supplementary::resolve_supplementary;

#[derive(Debug, Clone, Copy)]
pub struct StudentRequest<'a> {
    pub student_id: &'a str,
    pub entries: &'a [RawMarkEntry],
    /// Subjects the student is enrolled in. `None` means every subject that
    /// appears in the student's marks.
    pub subject_ids: Option<&'a [String]>,
    /// Overrides the configured default selection policy.
    pub selection: Option<&'a SelectionPolicy>,
}

impl<'a> StudentRequest<'a> {
    pub fn new(student_id: &'a str, entries: &'a [RawMarkEntry]) -> Self {
        Self {
            student_id,
            entries,
            subject_ids: None,
            selection: None,
        }
    }
}

/// Computes one student's complete result from regular-term marks.
///
/// Missing marks are gathered across every subject before failing; any
/// other error stops the student immediately.
pub fn compute_student(
    config: &EngineConfig,
    req: &StudentRequest<'_>,
) -> Result<OverallResult, CalcError> {
    let policy = req.selection.unwrap_or(&config.selection);
    config.check_selection(policy)?;

    let ledger = MarkLedger::build(config, req.student_id, req.entries, TermKind::Regular)?;

    let mut subject_ids: Vec<&str> = match req.subject_ids {
        Some(ids) => ids.iter().map(|s| s.as_str()).collect(),
        None => ledger.subject_ids().into_iter().collect(),
    };
    let unknown: Vec<&str> = subject_ids
        .iter()
        .copied()
        .filter(|id| config.subject(id).is_none())
        .collect();
    if !unknown.is_empty() {
        return Err(CalcError::Policy(format!(
            "unknown subject(s) requested: {}",
            unknown.join(", ")
        )));
    }
    if req.subject_ids.is_some() {
        let stray: Vec<String> = ledger
            .subject_ids()
            .into_iter()
            .filter(|id| !subject_ids.contains(id))
            .map(|id| format!("subject {}: marks entered but student {} is not enrolled", id, req.student_id))
            .collect();
        if !stray.is_empty() {
            return Err(CalcError::InvalidMark { problems: stray });
        }
    }
    subject_ids.sort_by_key(|id| config.subject_position(id));
    subject_ids.dedup();

    let mut missing = Vec::new();
    let mut results = Vec::with_capacity(subject_ids.len());
    for id in subject_ids {
        let (Some(subject), Some(plan)) = (config.subject(id), config.plan(id)) else {
            continue;
        };
        let mut components = Vec::with_capacity(subject.components.len());
        for spec in &subject.components {
            let term_marks = ledger.term_marks(id, spec.kind);
            match resolve_component(subject, plan, spec, &term_marks, &config.grace) {
                Ok(c) => components.push(c),
                Err(CalcError::MissingMarks { missing: m }) => missing.extend(m),
                Err(e) => return Err(e),
            }
        }
        if components.len() == subject.components.len() {
            results.push(resolve_subject(subject, components, config, 0)?);
        }
    }
    if !missing.is_empty() {
        return Err(CalcError::MissingMarks { missing });
    }

    debug!(
        student_id = %ledger.student_id(),
        subjects = results.len(),
        "subjects resolved"
    );
    let selection = select_subjects(results, policy)?;
    aggregate(
        req.student_id,
        selection,
        policy,
        config,
        Provenance::default(),
    )
}
