use crate::certify;
use crate::error::CalcError;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Theory,
    Practical,
    Project,
}

impl ComponentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Theory => "theory",
            ComponentKind::Practical => "practical",
            ComponentKind::Project => "project",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectCategory {
    Core,
    Language,
    Vocational,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ComponentSpec {
    pub kind: ComponentKind,
    /// Lowest mark data entry may record for this component.
    #[serde(default)]
    pub min_marks: u32,
    pub max_marks: u32,
    pub passing_marks: u32,
    /// Paper maximum in a given term when it differs from `max_marks`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub term_max_marks: BTreeMap<String, u32>,
}

impl ComponentSpec {
    pub fn max_marks_for_term(&self, term_id: &str) -> u32 {
        self.term_max_marks
            .get(term_id)
            .copied()
            .unwrap_or(self.max_marks)
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubjectDefinition {
    pub id: String,
    pub name: String,
    pub category: SubjectCategory,
    pub components: Vec<ComponentSpec>,
    #[serde(default = "default_true")]
    pub supplementary_allowed: bool,
    /// Per-subject override of regular term weightages. Empty means every
    /// regular term contributes its own `weightagePercent`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub term_weightages: BTreeMap<String, u32>,
}

impl SubjectDefinition {
    pub fn component(&self, kind: ComponentKind) -> Option<&ComponentSpec> {
        self.components.iter().find(|c| c.kind == kind)
    }

    pub fn total_max_marks(&self) -> u32 {
        self.components.iter().map(|c| c.max_marks).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermKind {
    #[default]
    Regular,
    Supplementary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExamTermDefinition {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub kind: TermKind,
    #[serde(default)]
    pub weightage_percent: u32,
}

/// `[rangeStart, rangeEnd)`; the band ending at 100 also holds 100 itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GradeBand {
    pub grade: String,
    pub range_start: f64,
    pub range_end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DivisionThreshold {
    pub division: String,
    pub min_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GracePolicy {
    /// Largest shortfall (in marks) grace may cover. Zero disables grace.
    #[serde(default)]
    pub ceiling: u32,
}

fn default_max_failed_subjects() -> u32 {
    2
}

fn default_max_rounds() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SupplementaryPolicy {
    #[serde(default = "default_max_failed_subjects")]
    pub max_failed_subjects: u32,
    /// More than one round means cascading supplementary terms are allowed.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

impl Default for SupplementaryPolicy {
    fn default() -> Self {
        Self {
            max_failed_subjects: default_max_failed_subjects(),
            max_rounds: default_max_rounds(),
        }
    }
}

fn default_distinction_percent() -> f64 {
    75.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RemarkPolicy {
    #[serde(default = "default_distinction_percent")]
    pub distinction_percent: f64,
}

impl Default for RemarkPolicy {
    fn default() -> Self {
        Self {
            distinction_percent: default_distinction_percent(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SelectionPolicy {
    #[default]
    AllSubjects,
    #[serde(rename_all = "camelCase")]
    BestOfN {
        core_subject_ids: Vec<String>,
        n: usize,
    },
}

/// Configuration as supplied by the masters collaborator, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigDocument {
    pub subjects: Vec<SubjectDefinition>,
    pub exam_terms: Vec<ExamTermDefinition>,
    pub grade_bands: Vec<GradeBand>,
    pub divisions: Vec<DivisionThreshold>,
    #[serde(default)]
    pub grace: GracePolicy,
    #[serde(default)]
    pub supplementary: SupplementaryPolicy,
    #[serde(default)]
    pub remarks: RemarkPolicy,
    #[serde(default)]
    pub selection: SelectionPolicy,
}

pub fn load_document(path: &Path) -> anyhow::Result<ConfigDocument> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.to_string_lossy()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse config {}", path.to_string_lossy()))
}

/// Reads and validates a configuration file in one step.
pub fn load_config_file(path: &Path) -> anyhow::Result<EngineConfig> {
    let doc = load_document(path)?;
    EngineConfig::from_document(doc)
        .with_context(|| format!("invalid config {}", path.to_string_lossy()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermWeight {
    pub term_id: String,
    pub weightage: u32,
}

/// Regular terms feeding one subject, in term configuration order. Terms
/// weighted zero are left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectPlan {
    weights: Vec<TermWeight>,
}

impl SubjectPlan {
    pub fn new(
        subject: &SubjectDefinition,
        terms: &[ExamTermDefinition],
    ) -> Result<Self, Vec<String>> {
        let mut problems = Vec::new();
        for term_id in subject.term_weightages.keys() {
            match terms.iter().find(|t| &t.id == term_id) {
                None => problems.push(format!(
                    "subject {}: weightage override names unknown term {}",
                    subject.id, term_id
                )),
                Some(t) if t.kind == TermKind::Supplementary => problems.push(format!(
                    "subject {}: supplementary term {} cannot carry weightage",
                    subject.id, term_id
                )),
                Some(_) => {}
            }
        }

        let weights: Vec<TermWeight> = terms
            .iter()
            .filter(|t| t.kind == TermKind::Regular)
            .map(|t| TermWeight {
                term_id: t.id.clone(),
                weightage: if subject.term_weightages.is_empty() {
                    t.weightage_percent
                } else {
                    subject.term_weightages.get(&t.id).copied().unwrap_or(0)
                },
            })
            .filter(|w| w.weightage > 0)
            .collect();

        let plan = SubjectPlan { weights };
        if plan.weight_total() != 100 {
            problems.push(format!(
                "subject {}: regular term weightages sum to {}, expected 100",
                subject.id,
                plan.weight_total()
            ));
        }

        if problems.is_empty() {
            Ok(plan)
        } else {
            Err(problems)
        }
    }

    pub fn weights(&self) -> &[TermWeight] {
        &self.weights
    }

    pub fn weight_total(&self) -> u32 {
        self.weights.iter().map(|w| w.weightage).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeTable {
    bands: Vec<GradeBand>,
}

impl GradeTable {
    pub fn new(bands: &[GradeBand]) -> Result<Self, Vec<String>> {
        let mut problems = Vec::new();
        let mut sorted = bands.to_vec();
        sorted.sort_by(|a, b| a.range_start.total_cmp(&b.range_start));

        if sorted.is_empty() {
            problems.push("gradeBands: at least one band is required".to_string());
        }
        for b in &sorted {
            if b.grade.trim().is_empty() {
                problems.push("gradeBands: grade label must not be blank".to_string());
            }
            if !(b.range_start.is_finite() && b.range_end.is_finite())
                || b.range_start >= b.range_end
            {
                problems.push(format!(
                    "gradeBands {}: range {}..{} is empty or inverted",
                    b.grade, b.range_start, b.range_end
                ));
            }
        }
        if let (Some(first), Some(last)) = (sorted.first(), sorted.last()) {
            if first.range_start != 0.0 {
                problems.push(format!(
                    "gradeBands: lowest band starts at {}, expected 0",
                    first.range_start
                ));
            }
            if last.range_end != 100.0 {
                problems.push(format!(
                    "gradeBands: highest band ends at {}, expected 100",
                    last.range_end
                ));
            }
        }
        for pair in sorted.windows(2) {
            if pair[0].range_end < pair[1].range_start {
                problems.push(format!(
                    "gradeBands: gap between {} and {} ({}..{})",
                    pair[0].grade, pair[1].grade, pair[0].range_end, pair[1].range_start
                ));
            } else if pair[0].range_end > pair[1].range_start {
                problems.push(format!(
                    "gradeBands: {} overlaps {}",
                    pair[0].grade, pair[1].grade
                ));
            }
        }

        if problems.is_empty() {
            Ok(GradeTable { bands: sorted })
        } else {
            Err(problems)
        }
    }

    pub fn grade_for(&self, percentage: f64) -> Option<&str> {
        self.bands
            .iter()
            .find(|b| {
                percentage >= b.range_start
                    && (percentage < b.range_end || (b.range_end == 100.0 && percentage == 100.0))
            })
            .map(|b| b.grade.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DivisionTable {
    /// Highest threshold first.
    thresholds: Vec<DivisionThreshold>,
}

impl DivisionTable {
    pub fn new(thresholds: &[DivisionThreshold]) -> Result<Self, Vec<String>> {
        let mut problems = Vec::new();
        let mut sorted = thresholds.to_vec();
        sorted.sort_by(|a, b| b.min_percent.total_cmp(&a.min_percent));

        for t in &sorted {
            if t.division.trim().is_empty() {
                problems.push("divisions: division label must not be blank".to_string());
            }
            if !(0.0..=100.0).contains(&t.min_percent) {
                problems.push(format!(
                    "divisions {}: minPercent {} outside 0..100",
                    t.division, t.min_percent
                ));
            }
        }
        for pair in sorted.windows(2) {
            if pair[0].min_percent == pair[1].min_percent {
                problems.push(format!(
                    "divisions: {} and {} share minPercent {}",
                    pair[0].division, pair[1].division, pair[0].min_percent
                ));
            }
        }
        if !sorted.iter().any(|t| t.min_percent == 0.0) {
            problems.push("divisions: a tier starting at 0 is required to cover every percentage".to_string());
        }

        if problems.is_empty() {
            Ok(DivisionTable { thresholds: sorted })
        } else {
            Err(problems)
        }
    }

    pub fn division_for(&self, percentage: f64) -> Option<&str> {
        if !(0.0..=100.0).contains(&percentage) {
            return None;
        }
        self.thresholds
            .iter()
            .find(|t| percentage >= t.min_percent)
            .map(|t| t.division.as_str())
    }
}

/// Validated, immutable configuration shared read-only by every computation.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    subjects: Vec<SubjectDefinition>,
    plans: Vec<SubjectPlan>,
    subject_index: HashMap<String, usize>,
    terms: Vec<ExamTermDefinition>,
    pub grades: GradeTable,
    pub divisions: DivisionTable,
    pub grace: GracePolicy,
    pub supplementary: SupplementaryPolicy,
    pub remarks: RemarkPolicy,
    pub selection: SelectionPolicy,
    digest: String,
}

impl EngineConfig {
    /// Validates everything up front and reports every problem at once.
    pub fn from_document(doc: ConfigDocument) -> Result<Self, CalcError> {
        let mut problems: Vec<String> = Vec::new();

        let mut term_ids = HashSet::new();
        for t in &doc.exam_terms {
            if !term_ids.insert(t.id.as_str()) {
                problems.push(format!("examTerms: duplicate id {}", t.id));
            }
            if t.weightage_percent > 100 {
                problems.push(format!(
                    "examTerms {}: weightagePercent {} exceeds 100",
                    t.id, t.weightage_percent
                ));
            }
            if t.kind == TermKind::Supplementary && t.weightage_percent != 0 {
                problems.push(format!(
                    "examTerms {}: supplementary terms carry no weightage",
                    t.id
                ));
            }
        }

        let mut subject_index = HashMap::new();
        let mut plans = Vec::with_capacity(doc.subjects.len());
        for (i, s) in doc.subjects.iter().enumerate() {
            if subject_index.insert(s.id.clone(), i).is_some() {
                problems.push(format!("subjects: duplicate id {}", s.id));
            }
            problems.extend(validate_components(s, &term_ids));
            match SubjectPlan::new(s, &doc.exam_terms) {
                Ok(plan) => plans.push(plan),
                Err(p) => problems.extend(p),
            }
        }

        let grades = GradeTable::new(&doc.grade_bands).map_err(|p| problems.extend(p));
        let divisions = DivisionTable::new(&doc.divisions).map_err(|p| problems.extend(p));

        if !doc.remarks.distinction_percent.is_finite()
            || !(0.0..=100.0).contains(&doc.remarks.distinction_percent)
        {
            problems.push(format!(
                "remarks: distinctionPercent {} outside 0..100",
                doc.remarks.distinction_percent
            ));
        }

        if let SelectionPolicy::BestOfN {
            core_subject_ids, ..
        } = &doc.selection
        {
            problems.extend(validate_core_ids(core_subject_ids, &subject_index));
        }

        let digest = certify::digest_json(&doc)
            .map_err(|e| problems.push(format!("config digest failed: {}", e)));

        match (grades, divisions, digest) {
            (Ok(grades), Ok(divisions), Ok(digest)) if problems.is_empty() => Ok(EngineConfig {
                subjects: doc.subjects,
                plans,
                subject_index,
                terms: doc.exam_terms,
                grades,
                divisions,
                grace: doc.grace,
                supplementary: doc.supplementary,
                remarks: doc.remarks,
                selection: doc.selection,
                digest,
            }),
            _ => Err(CalcError::Configuration { problems }),
        }
    }

    pub fn subjects(&self) -> &[SubjectDefinition] {
        &self.subjects
    }

    pub fn terms(&self) -> &[ExamTermDefinition] {
        &self.terms
    }

    pub fn subject(&self, id: &str) -> Option<&SubjectDefinition> {
        self.subject_index.get(id).map(|&i| &self.subjects[i])
    }

    /// Position in configuration order, used for stable output ordering.
    pub fn subject_position(&self, id: &str) -> Option<usize> {
        self.subject_index.get(id).copied()
    }

    pub fn plan(&self, subject_id: &str) -> Option<&SubjectPlan> {
        self.subject_index.get(subject_id).map(|&i| &self.plans[i])
    }

    pub fn term(&self, id: &str) -> Option<&ExamTermDefinition> {
        self.terms.iter().find(|t| t.id == id)
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Checks a per-request selection policy against the loaded subjects.
    pub fn check_selection(&self, policy: &SelectionPolicy) -> Result<(), CalcError> {
        match policy {
            SelectionPolicy::AllSubjects => Ok(()),
            SelectionPolicy::BestOfN {
                core_subject_ids, ..
            } => {
                let problems = validate_core_ids(core_subject_ids, &self.subject_index);
                if problems.is_empty() {
                    Ok(())
                } else {
                    Err(CalcError::Configuration { problems })
                }
            }
        }
    }
}

fn validate_components(s: &SubjectDefinition, term_ids: &HashSet<&str>) -> Vec<String> {
    let mut problems = Vec::new();
    if s.components.is_empty() {
        problems.push(format!("subject {}: at least one component is required", s.id));
    }
    let mut kinds = HashSet::new();
    for c in &s.components {
        if !kinds.insert(c.kind) {
            problems.push(format!("subject {}: duplicate {} component", s.id, c.kind));
        }
        if c.max_marks == 0 {
            problems.push(format!("subject {} {}: maxMarks must be positive", s.id, c.kind));
        }
        if c.passing_marks > c.max_marks {
            problems.push(format!(
                "subject {} {}: passingMarks {} exceeds maxMarks {}",
                s.id, c.kind, c.passing_marks, c.max_marks
            ));
        }
        if c.min_marks > c.passing_marks {
            problems.push(format!(
                "subject {} {}: minMarks {} exceeds passingMarks {}",
                s.id, c.kind, c.min_marks, c.passing_marks
            ));
        }
        for (term_id, max) in &c.term_max_marks {
            if !term_ids.contains(term_id.as_str()) {
                problems.push(format!(
                    "subject {} {}: termMaxMarks names unknown term {}",
                    s.id, c.kind, term_id
                ));
            }
            if *max == 0 {
                problems.push(format!(
                    "subject {} {}: termMaxMarks for {} must be positive",
                    s.id, c.kind, term_id
                ));
            }
        }
    }
    problems
}

fn validate_core_ids(core: &[String], subject_index: &HashMap<String, usize>) -> Vec<String> {
    let mut problems = Vec::new();
    let mut seen = HashSet::new();
    for id in core {
        if !seen.insert(id.as_str()) {
            problems.push(format!("selection: core subject {} listed twice", id));
        }
        if !subject_index.contains_key(id) {
            problems.push(format!("selection: core subject {} is not configured", id));
        }
    }
    problems
}
