//! Content fingerprints for requirements.
//!
//! A [`Fingerprint`] summarises a requirement with several SHA256 hashes over
//! different projections of its canonical form. Comparing the hashes of two
//! fingerprints tells the change detector *what kind* of change happened
//! without needing the requirement bodies.
//!
//! Canonicalisation happens before hashing:
//!
//! - attributes are sorted by name, constraints by kind then expression
//! - runs of whitespace in free text and expressions collapse to one space
//! - numbers are rendered in their shortest decimal form (`150`, not `150.0`)
//! - enumerated bound values are sorted and deduplicated

use borsh::BorshSerialize;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::requirement::{
    Bounds, ConstraintKind, Requirement, RequirementId, ScalarType,
};

/// Hashes and version summarising a requirement at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// The requirement this fingerprint describes.
    pub requirement_id: RequirementId,
    /// Hash of the entire canonical requirement.
    pub content_hash: String,
    /// Hash of the name and documentation fields only.
    pub metadata_hash: String,
    /// Hash of the shape: attribute names and types, constraint kinds and
    /// nested requirement ids.
    pub structure_hash: String,
    /// Hash of everything except the name and documentation fields.
    pub body_hash: String,
    /// Monotonic version, bumped whenever `content_hash` changes.
    pub version: u32,
    /// When the fingerprint was taken.
    pub timestamp: DateTime<Utc>,
}

impl Fingerprint {
    /// The version this fingerprint should carry given the previously stored
    /// `(content_hash, version)` for the same requirement.
    ///
    /// - no previous record: version 1
    /// - same content hash: the previous version is kept
    /// - different content hash: previous version + 1
    #[must_use]
    pub fn next_version(&self, previous: Option<(&str, u32)>) -> u32 {
        match previous {
            None => 1,
            Some((hash, version)) if hash == self.content_hash => version.max(1),
            Some((_, version)) => version.saturating_add(1).max(1),
        }
    }

    /// Sets the version from the previously stored record. See
    /// [`Fingerprint::next_version`].
    #[must_use]
    pub fn versioned_against(mut self, previous: Option<(&str, u32)>) -> Self {
        self.version = self.next_version(previous);
        self
    }
}

/// Computes the fingerprint of a requirement.
///
/// The returned fingerprint has version 1 and is stamped with the current
/// time. Use [`Fingerprint::versioned_against`] to resolve the real version
/// against stored state.
#[must_use]
pub fn compute_fingerprint(requirement: &Requirement) -> Fingerprint {
    compute_fingerprint_at(requirement, Utc::now())
}

/// Computes the fingerprint of a requirement with an explicit timestamp.
#[must_use]
pub fn compute_fingerprint_at(requirement: &Requirement, timestamp: DateTime<Utc>) -> Fingerprint {
    let canonical = Canonical::from(requirement);

    Fingerprint {
        requirement_id: requirement.id().clone(),
        content_hash: digest(&canonical),
        metadata_hash: digest(&canonical.metadata),
        structure_hash: digest(&canonical.structure()),
        body_hash: digest(&canonical.body),
        version: 1,
        timestamp,
    }
}

/// SHA256 over the borsh encoding, rendered as lowercase hex.
///
/// # Panics
///
/// Panics if borsh serialization fails (which should never happen for these
/// data structures, which only contain strings, vectors and unit enums).
fn digest<T: BorshSerialize>(value: &T) -> String {
    let encoded = borsh::to_vec(value).expect("this should never fail");
    let hash = Sha256::digest(encoded);
    format!("{hash:x}")
}

/// Collapses whitespace runs to a single space and trims the ends.
pub(crate) fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Renders a number in a canonical decimal form.
///
/// Integral values have no fractional part and negative zero is zero, so
/// `150`, `150.0` and `1.5e2` all canonicalise to `"150"`.
#[allow(clippy::float_cmp)]
pub(crate) fn normalize_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.abs() == 0.0 {
        return "0".to_string();
    }
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        // Exactly representable as an integer in this range.
        #[allow(clippy::cast_possible_truncation)]
        return format!("{}", value as i64);
    }
    format!("{value}")
}

#[derive(Debug, PartialEq, Eq, BorshSerialize)]
pub(crate) enum CanonicalBounds {
    Range {
        min: Option<String>,
        max: Option<String>,
    },
    Enumerated(Vec<String>),
}

impl From<&Bounds> for CanonicalBounds {
    fn from(bounds: &Bounds) -> Self {
        match bounds {
            Bounds::Range { min, max } => Self::Range {
                min: min.map(normalize_number),
                max: max.map(normalize_number),
            },
            Bounds::Enumerated(values) => {
                let mut values: Vec<_> = values.iter().map(|v| normalize_text(v)).collect();
                values.sort();
                values.dedup();
                Self::Enumerated(values)
            }
        }
    }
}

#[derive(Debug, BorshSerialize)]
struct CanonicalAttribute {
    name: String,
    scalar_type: ScalarType,
    bounds: Option<CanonicalBounds>,
}

#[derive(Debug, BorshSerialize)]
struct CanonicalConstraint {
    kind: ConstraintKind,
    expression: String,
}

/// Name and documentation fields.
#[derive(Debug, BorshSerialize)]
struct CanonicalMetadata {
    name: String,
    documentation: String,
    /// `(attribute name, description)` for described attributes, sorted.
    attribute_docs: Vec<(String, String)>,
    /// `(kind, description)` for described constraints, sorted.
    constraint_docs: Vec<(ConstraintKind, String)>,
}

/// Everything that is not a name or documentation field.
#[derive(Debug, BorshSerialize)]
struct CanonicalBody {
    attributes: Vec<CanonicalAttribute>,
    constraints: Vec<CanonicalConstraint>,
    nested_requirements: Vec<String>,
}

#[derive(Debug, BorshSerialize)]
struct CanonicalStructure {
    attributes: Vec<(String, ScalarType)>,
    constraint_kinds: Vec<ConstraintKind>,
    nested_requirements: Vec<String>,
}

/// The canonical form of a requirement. Its hash is the content hash.
#[derive(Debug, BorshSerialize)]
struct Canonical {
    metadata: CanonicalMetadata,
    body: CanonicalBody,
}

impl Canonical {
    fn structure(&self) -> CanonicalStructure {
        let mut constraint_kinds: Vec<_> = self.body.constraints.iter().map(|c| c.kind).collect();
        constraint_kinds.sort();

        CanonicalStructure {
            attributes: self
                .body
                .attributes
                .iter()
                .map(|a| (a.name.clone(), a.scalar_type))
                .collect(),
            constraint_kinds,
            nested_requirements: self.body.nested_requirements.clone(),
        }
    }
}

impl From<&Requirement> for Canonical {
    fn from(requirement: &Requirement) -> Self {
        let mut attributes: Vec<_> = requirement
            .attributes
            .iter()
            .map(|a| CanonicalAttribute {
                name: normalize_text(&a.name),
                scalar_type: a.scalar_type,
                bounds: a.bounds.as_ref().map(CanonicalBounds::from),
            })
            .collect();
        attributes.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.scalar_type.cmp(&b.scalar_type))
        });

        let mut constraints: Vec<_> = requirement
            .constraints
            .iter()
            .map(|c| CanonicalConstraint {
                kind: c.kind,
                expression: normalize_text(&c.expression),
            })
            .collect();
        constraints.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.expression.cmp(&b.expression)));

        let mut nested_requirements: Vec<_> = requirement
            .nested_requirements
            .iter()
            .map(|n| normalize_text(n))
            .collect();
        nested_requirements.sort();

        // expressions stay out of the documentation projection
        let mut attribute_docs: Vec<_> = requirement
            .attributes
            .iter()
            .filter_map(|a| {
                let description = normalize_text(a.description.as_deref()?);
                (!description.is_empty()).then(|| (normalize_text(&a.name), description))
            })
            .collect();
        attribute_docs.sort();

        let mut constraint_docs: Vec<_> = requirement
            .constraints
            .iter()
            .filter_map(|c| {
                let description = normalize_text(c.description.as_deref()?);
                (!description.is_empty()).then_some((c.kind, description))
            })
            .collect();
        constraint_docs.sort();

        Self {
            metadata: CanonicalMetadata {
                name: normalize_text(&requirement.metadata.name),
                documentation: normalize_text(
                    requirement.metadata.documentation.as_deref().unwrap_or_default(),
                ),
                attribute_docs,
                constraint_docs,
            },
            body: CanonicalBody {
                attributes,
                constraints,
                nested_requirements,
            },
        }
    }
}
