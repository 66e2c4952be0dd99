//! Change detection between two requirement collections.
//!
//! Detection works from fingerprints alone: comparing which of the hashes
//! differ is enough to classify the blast radius of a change. When the full
//! requirement bodies are available,
//! [`detect_requirement_changes`] also records *what* changed for reporting.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Write as _},
};

use serde::{Deserialize, Serialize};

use crate::domain::{
    fingerprint::{CanonicalBounds, Fingerprint, compute_fingerprint, normalize_text},
    requirement::{Attribute, ConstraintKind, Requirement, RequirementId},
};

/// How far-reaching a change to a requirement is.
///
/// Variants are ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Content is identical.
    #[default]
    None,
    /// Only names or documentation changed.
    Minor,
    /// Values changed (bounds, constraint expressions) but the shape is the same.
    Moderate,
    /// The shape changed: attributes, types, constraint kinds or nesting.
    Major,
}

impl Severity {
    /// All severities, most severe first.
    pub const DESCENDING: [Self; 4] = [Self::Major, Self::Moderate, Self::Minor, Self::None];

    /// Lowercase label, as used in reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Minor => "minor",
            Self::Moderate => "moderate",
            Self::Major => "major",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classifies the change between two fingerprints of the same requirement.
///
/// Structural change dominates: it is reported as [`Severity::Major`] even
/// when documentation or values also changed.
#[must_use]
pub fn classify(old: &Fingerprint, new: &Fingerprint) -> Severity {
    if old.content_hash == new.content_hash {
        Severity::None
    } else if old.structure_hash != new.structure_hash {
        Severity::Major
    } else if old.body_hash == new.body_hash && old.metadata_hash != new.metadata_hash {
        Severity::Minor
    } else {
        Severity::Moderate
    }
}

/// One aspect of a requirement that differs between two versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum ChangedField {
    /// The short name changed.
    Name {
        /// Previous name.
        old: String,
        /// New name.
        new: String,
    },
    /// The documentation text changed.
    Documentation,
    /// An attribute was added.
    AttributeAdded {
        /// Attribute name.
        name: String,
    },
    /// An attribute was removed.
    AttributeRemoved {
        /// Attribute name.
        name: String,
    },
    /// An attribute's scalar type changed.
    AttributeType {
        /// Attribute name.
        name: String,
    },
    /// An attribute's bounds changed.
    AttributeBounds {
        /// Attribute name.
        name: String,
    },
    /// An attribute's description changed.
    AttributeDescription {
        /// Attribute name.
        name: String,
    },
    /// The set of constraint expressions changed.
    ConstraintsChanged {
        /// Number of constraints before.
        old_count: usize,
        /// Number of constraints after.
        new_count: usize,
    },
    /// The nested requirement ids changed.
    NestedRequirements,
}

impl fmt::Display for ChangedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name { old, new } => write!(f, "name: {old} -> {new}"),
            Self::Documentation => f.write_str("documentation"),
            Self::AttributeAdded { name } => write!(f, "attribute added: {name}"),
            Self::AttributeRemoved { name } => write!(f, "attribute removed: {name}"),
            Self::AttributeType { name } => write!(f, "attribute type: {name}"),
            Self::AttributeBounds { name } => write!(f, "attribute bounds: {name}"),
            Self::AttributeDescription { name } => write!(f, "attribute description: {name}"),
            Self::ConstraintsChanged {
                old_count,
                new_count,
            } => write!(f, "constraints ({old_count} -> {new_count})"),
            Self::NestedRequirements => f.write_str("nested requirements"),
        }
    }
}

/// The change to a single requirement present in both collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// The requirement that changed.
    pub requirement_id: RequirementId,
    /// How far-reaching the change is.
    pub severity: Severity,
    /// Content hash before the change.
    pub old_hash: String,
    /// Content hash after the change.
    pub new_hash: String,
    /// What changed. Empty when only fingerprints were compared.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<ChangedField>,
}

/// The result of comparing two requirement collections.
///
/// All id lists are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Ids present only in the new collection.
    pub added: Vec<RequirementId>,
    /// Ids present only in the old collection.
    pub deleted: Vec<RequirementId>,
    /// Requirements whose content changed.
    pub modified: Vec<ChangeRecord>,
    /// Requirements whose content is identical.
    pub unchanged: Vec<RequirementId>,
}

impl SyncReport {
    /// Number of distinct requirement ids across both collections.
    #[must_use]
    pub fn total_requirements(&self) -> usize {
        self.added.len() + self.deleted.len() + self.modified.len() + self.unchanged.len()
    }

    /// Number of added, deleted and modified requirements.
    #[must_use]
    pub fn total_changes(&self) -> usize {
        self.added.len() + self.deleted.len() + self.modified.len()
    }

    /// Whether anything changed at all.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.total_changes() > 0
    }

    /// Modified requirements with the given severity.
    pub fn by_severity(&self, severity: Severity) -> impl Iterator<Item = &ChangeRecord> {
        self.modified.iter().filter(move |c| c.severity == severity)
    }

    /// The severity of the change to `id`.
    ///
    /// Added and deleted requirements are [`Severity::Major`]. Ids not in the
    /// report at all return `None`.
    #[must_use]
    pub fn severity_of(&self, id: &RequirementId) -> Option<Severity> {
        if self.added.contains(id) || self.deleted.contains(id) {
            return Some(Severity::Major);
        }
        if self.unchanged.contains(id) {
            return Some(Severity::None);
        }
        self.modified
            .iter()
            .find(|c| &c.requirement_id == id)
            .map(|c| c.severity)
    }

    /// Ids of requirements that need their artifacts updated: added and
    /// modified.
    pub fn pending(&self) -> impl Iterator<Item = &RequirementId> {
        self.added
            .iter()
            .chain(self.modified.iter().map(|c| &c.requirement_id))
    }

    /// Renders the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct Summary {
            total_requirements: usize,
            total_changes: usize,
            added: usize,
            deleted: usize,
            modified: usize,
            unchanged: usize,
        }

        #[derive(Serialize)]
        struct Document<'a> {
            summary: Summary,
            #[serde(flatten)]
            report: &'a SyncReport,
        }

        serde_json::to_string_pretty(&Document {
            summary: Summary {
                total_requirements: self.total_requirements(),
                total_changes: self.total_changes(),
                added: self.added.len(),
                deleted: self.deleted.len(),
                modified: self.modified.len(),
                unchanged: self.unchanged.len(),
            },
            report: self,
        })
    }

    /// Renders the report as a markdown document.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("# Requirement Sync Report\n\n");

        let _ = writeln!(out, "**Total Requirements:** {}  ", self.total_requirements());
        let _ = writeln!(out, "**Total Changes:** {}\n", self.total_changes());

        out.push_str("| Change | Count |\n|---|---|\n");
        let _ = writeln!(out, "| Added | {} |", self.added.len());
        let _ = writeln!(out, "| Deleted | {} |", self.deleted.len());
        let _ = writeln!(out, "| Modified | {} |", self.modified.len());
        let _ = writeln!(out, "| Unchanged | {} |", self.unchanged.len());

        if !self.added.is_empty() {
            out.push_str("\n## Added\n\n");
            for id in &self.added {
                let _ = writeln!(out, "- `{id}`");
            }
        }

        if !self.deleted.is_empty() {
            out.push_str("\n## Deleted\n\n");
            for id in &self.deleted {
                let _ = writeln!(out, "- `{id}`");
            }
        }

        if !self.modified.is_empty() {
            out.push_str("\n## Modified\n");
            for severity in Severity::DESCENDING {
                let changes: Vec<_> = self.by_severity(severity).collect();
                if changes.is_empty() {
                    continue;
                }
                let _ = writeln!(out, "\n### {}\n", severity.label().to_uppercase());
                for change in changes {
                    let _ = write!(out, "- `{}`", change.requirement_id);
                    if !change.changed_fields.is_empty() {
                        let fields: Vec<_> =
                            change.changed_fields.iter().map(ToString::to_string).collect();
                        let _ = write!(out, ": {}", fields.join(", "));
                    }
                    out.push('\n');
                }
            }
        }

        out
    }
}

/// Compares two fingerprint collections.
#[must_use]
pub fn detect_changes(
    old: &BTreeMap<RequirementId, Fingerprint>,
    new: &BTreeMap<RequirementId, Fingerprint>,
) -> SyncReport {
    let mut report = SyncReport::default();

    for (id, new_print) in new {
        match old.get(id) {
            None => report.added.push(id.clone()),
            Some(old_print) => match classify(old_print, new_print) {
                Severity::None => report.unchanged.push(id.clone()),
                severity => report.modified.push(ChangeRecord {
                    requirement_id: id.clone(),
                    severity,
                    old_hash: old_print.content_hash.clone(),
                    new_hash: new_print.content_hash.clone(),
                    changed_fields: Vec::new(),
                }),
            },
        }
    }

    report.deleted = old.keys().filter(|id| !new.contains_key(*id)).cloned().collect();

    tracing::info!(
        added = report.added.len(),
        deleted = report.deleted.len(),
        modified = report.modified.len(),
        unchanged = report.unchanged.len(),
        "detected requirement changes"
    );

    report
}

/// Fingerprints every requirement in a collection.
#[must_use]
pub fn fingerprint_all<'a>(
    requirements: impl IntoIterator<Item = &'a Requirement>,
) -> BTreeMap<RequirementId, Fingerprint> {
    requirements
        .into_iter()
        .map(|r| (r.id().clone(), compute_fingerprint(r)))
        .collect()
}

/// Compares two requirement collections, recording which fields changed for
/// every modified requirement.
#[must_use]
pub fn detect_requirement_changes(
    old: &BTreeMap<RequirementId, Requirement>,
    new: &BTreeMap<RequirementId, Requirement>,
) -> SyncReport {
    let mut report = detect_changes(&fingerprint_all(old.values()), &fingerprint_all(new.values()));

    for change in &mut report.modified {
        if let (Some(before), Some(after)) =
            (old.get(&change.requirement_id), new.get(&change.requirement_id))
        {
            change.changed_fields = changed_fields(before, after);
        }
    }

    report
}

/// Lists the fields that differ between two versions of a requirement.
#[must_use]
pub fn changed_fields(old: &Requirement, new: &Requirement) -> Vec<ChangedField> {
    let mut fields = Vec::new();

    if normalize_text(&old.metadata.name) != normalize_text(&new.metadata.name) {
        fields.push(ChangedField::Name {
            old: old.metadata.name.clone(),
            new: new.metadata.name.clone(),
        });
    }

    if normalized(old.metadata.documentation.as_deref())
        != normalized(new.metadata.documentation.as_deref())
    {
        fields.push(ChangedField::Documentation);
    }

    let old_attrs: BTreeMap<&str, &Attribute> =
        old.attributes.iter().map(|a| (a.name.as_str(), a)).collect();
    let new_attrs: BTreeMap<&str, &Attribute> =
        new.attributes.iter().map(|a| (a.name.as_str(), a)).collect();

    for (name, after) in &new_attrs {
        let Some(before) = old_attrs.get(name) else {
            fields.push(ChangedField::AttributeAdded {
                name: (*name).to_string(),
            });
            continue;
        };
        if before.scalar_type != after.scalar_type {
            fields.push(ChangedField::AttributeType {
                name: (*name).to_string(),
            });
        }
        if before.bounds.as_ref().map(CanonicalBounds::from)
            != after.bounds.as_ref().map(CanonicalBounds::from)
        {
            fields.push(ChangedField::AttributeBounds {
                name: (*name).to_string(),
            });
        }
        if normalized(before.description.as_deref()) != normalized(after.description.as_deref()) {
            fields.push(ChangedField::AttributeDescription {
                name: (*name).to_string(),
            });
        }
    }

    for name in old_attrs.keys().filter(|name| !new_attrs.contains_key(*name)) {
        fields.push(ChangedField::AttributeRemoved {
            name: (*name).to_string(),
        });
    }

    let constraint_set = |r: &Requirement| -> BTreeSet<(ConstraintKind, String)> {
        r.constraints
            .iter()
            .map(|c| (c.kind, normalize_text(&c.expression)))
            .collect()
    };
    if constraint_set(old) != constraint_set(new) || old.constraints.len() != new.constraints.len()
    {
        fields.push(ChangedField::ConstraintsChanged {
            old_count: old.constraints.len(),
            new_count: new.constraints.len(),
        });
    }

    let nested = |r: &Requirement| -> BTreeSet<String> {
        r.nested_requirements.iter().map(|n| normalize_text(n)).collect()
    };
    if nested(old) != nested(new) {
        fields.push(ChangedField::NestedRequirements);
    }

    fields
}

fn normalized(text: Option<&str>) -> String {
    normalize_text(text.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::domain::requirement::{Bounds, Constraint, ScalarType};

    fn id(s: &str) -> RequirementId {
        s.parse().unwrap()
    }

    fn tree_height(min: f64) -> Requirement {
        Requirement::new(id("REQ-001"), "TreeHeight")
            .with_documentation("The tree shall be tall.")
            .with_attribute(
                Attribute::new("height", ScalarType::Integer).with_bounds(Bounds::range(min, 200.0)),
            )
            .with_constraint(Constraint::new(
                ConstraintKind::Requirement,
                format!("{min} <= height and height <= 200"),
            ))
    }

    fn collection(requirements: impl IntoIterator<Item = Requirement>) -> BTreeMap<RequirementId, Requirement> {
        requirements
            .into_iter()
            .map(|r| (r.id().clone(), r))
            .collect()
    }

    enum Edit {
        Docs,
        Bounds,
        Structure,
        StructureAndDocs,
        StructureAndBounds,
        Expression,
        Nothing,
    }

    fn edit(req: &Requirement, edit: &Edit) -> Requirement {
        let mut out = req.clone();
        match edit {
            Edit::Docs => out.metadata.documentation = Some("Reworded.".into()),
            Edit::Bounds => out.attributes[0].bounds = Some(Bounds::range(1.0, 2.0)),
            Edit::Structure => out.attributes.push(Attribute::new("width", ScalarType::Real)),
            Edit::StructureAndDocs => {
                out.attributes.push(Attribute::new("width", ScalarType::Real));
                out.metadata.documentation = Some("Reworded.".into());
            }
            Edit::StructureAndBounds => {
                out.attributes[0].scalar_type = ScalarType::Real;
                out.attributes[0].bounds = Some(Bounds::range(1.0, 2.0));
            }
            Edit::Expression => out.constraints[0].expression = "height > 0".into(),
            Edit::Nothing => {}
        }
        out
    }

    #[test_case(&Edit::Docs, Severity::Minor ; "documentation only")]
    #[test_case(&Edit::Bounds, Severity::Moderate ; "bounds only")]
    #[test_case(&Edit::Expression, Severity::Moderate ; "constraint expression")]
    #[test_case(&Edit::Structure, Severity::Major ; "new attribute")]
    #[test_case(&Edit::StructureAndDocs, Severity::Major ; "structure dominates documentation")]
    #[test_case(&Edit::StructureAndBounds, Severity::Major ; "structure dominates bounds")]
    #[test_case(&Edit::Nothing, Severity::None ; "unchanged")]
    fn severity_classification(change: &Edit, expected: Severity) {
        let before = tree_height(150.0);
        let after = edit(&before, change);
        assert_eq!(
            classify(&compute_fingerprint(&before), &compute_fingerprint(&after)),
            expected
        );
    }

    #[test]
    fn added_deleted_and_unchanged_are_partitioned() {
        let a = Requirement::new(id("REQ-A"), "A");
        let b = Requirement::new(id("REQ-B"), "B");
        let c = Requirement::new(id("REQ-C"), "C");

        let report = detect_requirement_changes(
            &collection([a.clone(), b]),
            &collection([a, c]),
        );

        assert_eq!(report.added, vec![id("REQ-C")]);
        assert_eq!(report.deleted, vec![id("REQ-B")]);
        assert_eq!(report.unchanged, vec![id("REQ-A")]);
        assert!(report.modified.is_empty());
        assert_eq!(report.total_requirements(), 3);
        assert_eq!(report.total_changes(), 2);
        assert_eq!(report.severity_of(&id("REQ-C")), Some(Severity::Major));
        assert_eq!(report.severity_of(&id("REQ-A")), Some(Severity::None));
    }

    #[test]
    fn refingerprinting_is_unchanged() {
        let req = tree_height(150.0);
        let report = detect_requirement_changes(&collection([req.clone()]), &collection([req]));
        assert!(!report.has_changes());
        assert_eq!(report.unchanged, vec![id("REQ-001")]);
    }

    #[test]
    fn lower_bound_change_is_moderate_with_bounds_field() {
        let report = detect_requirement_changes(
            &collection([tree_height(150.0)]),
            &collection([tree_height(140.0)]),
        );

        assert_eq!(report.modified.len(), 1);
        let change = &report.modified[0];
        assert_eq!(change.requirement_id, id("REQ-001"));
        assert_eq!(change.severity, Severity::Moderate);
        assert!(change.changed_fields.contains(&ChangedField::AttributeBounds {
            name: "height".into()
        }));
        assert!(change
            .changed_fields
            .iter()
            .any(|f| matches!(f, ChangedField::ConstraintsChanged { .. })));
    }

    #[test]
    fn reordered_enumeration_is_not_a_bounds_change() {
        let colour = |values: &[&str]| {
            Requirement::new(id("REQ-002"), "Colour").with_attribute(
                Attribute::new("colour", ScalarType::String).with_bounds(Bounds::Enumerated(
                    values.iter().map(ToString::to_string).collect(),
                )),
            )
        };

        let before = colour(&["red", "green"]);
        let after = colour(&["green", "red", "red"]);

        assert!(changed_fields(&before, &after).is_empty());
        assert_eq!(
            changed_fields(&before, &colour(&["red", "blue"])),
            [ChangedField::AttributeBounds {
                name: "colour".into()
            }]
        );
    }

    #[test]
    fn detection_needs_only_fingerprints() {
        let old = fingerprint_all([&tree_height(150.0)]);
        let new = fingerprint_all([&tree_height(140.0)]);

        let report = detect_changes(&old, &new);
        assert_eq!(report.modified[0].severity, Severity::Moderate);
        assert!(report.modified[0].changed_fields.is_empty());
    }

    #[test]
    fn id_lists_are_sorted() {
        let new = collection(["REQ-9", "REQ-1", "REQ-5"].map(|s| Requirement::new(id(s), s)));
        let report = detect_requirement_changes(&BTreeMap::new(), &new);
        assert_eq!(report.added, vec![id("REQ-1"), id("REQ-5"), id("REQ-9")]);
    }

    #[test]
    fn markdown_report_has_totals() {
        let report = detect_requirement_changes(
            &collection([tree_height(150.0)]),
            &collection([tree_height(140.0)]),
        );
        let markdown = report.to_markdown();
        assert!(markdown.contains("# Requirement Sync Report"));
        assert!(markdown.contains("Total Requirements:** 1"));
        assert!(markdown.contains("Total Changes:** 1"));
        assert!(markdown.contains("### MODERATE"));
        assert!(markdown.contains("`REQ-001`"));
    }

    #[test]
    fn json_report_has_summary() {
        let report = detect_requirement_changes(
            &collection([tree_height(150.0)]),
            &collection([tree_height(140.0)]),
        );
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["summary"]["modified"], 1);
        assert_eq!(value["modified"][0]["severity"], "moderate");
    }

    #[test]
    fn severities_are_ordered() {
        assert!(Severity::Major > Severity::Moderate);
        assert!(Severity::Moderate > Severity::Minor);
        assert!(Severity::Minor > Severity::None);
    }
}
