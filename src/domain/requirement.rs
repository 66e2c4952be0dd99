use std::{fmt, ops::Deref, str::FromStr};

use non_empty_string::NonEmptyString;
use serde::{Deserialize, Serialize};

/// Stable identifier of a requirement, e.g. `REQ-001`.
///
/// Identifiers are opaque to the sync engine. The only rule is that they are
/// non-empty once surrounding whitespace has been removed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequirementId(NonEmptyString);

impl RequirementId {
    /// Creates a new identifier, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyIdError`] if the trimmed string is empty.
    pub fn new(s: impl AsRef<str>) -> Result<Self, EmptyIdError> {
        NonEmptyString::new(s.as_ref().trim().to_string())
            .map(Self)
            .map_err(|_| EmptyIdError)
    }

    /// Returns the string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Error returned when an empty string is used as a requirement identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("requirement identifier must not be empty")]
pub struct EmptyIdError;

impl FromStr for RequirementId {
    type Err = EmptyIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for RequirementId {
    type Error = EmptyIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl Deref for RequirementId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.0.as_str()
    }
}

impl AsRef<str> for RequirementId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for RequirementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RequirementId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RequirementId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

/// The scalar type of a requirement attribute.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    borsh::BorshSerialize,
)]
pub enum ScalarType {
    /// Whole numbers.
    Integer,
    /// Floating point numbers.
    Real,
    /// True or false.
    Boolean,
    /// Free text.
    String,
    /// Any type tag the extractor could not map.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "Integer",
            Self::Real => "Real",
            Self::Boolean => "Boolean",
            Self::String => "String",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Value bounds attached to an attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Bounds {
    /// A numeric interval. Either end may be open.
    Range {
        /// Inclusive lower bound.
        min: Option<f64>,
        /// Inclusive upper bound.
        max: Option<f64>,
    },
    /// An explicit set of allowed values.
    Enumerated(Vec<String>),
}

impl Bounds {
    /// A closed numeric interval.
    #[must_use]
    pub const fn range(min: f64, max: f64) -> Self {
        Self::Range {
            min: Some(min),
            max: Some(max),
        }
    }
}

/// A named, typed input of a requirement.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Attribute name, unique within its requirement.
    pub name: String,
    /// The scalar type tag.
    pub scalar_type: ScalarType,
    /// Optional bounds on the values the attribute may take.
    pub bounds: Option<Bounds>,
    /// Optional free-text description.
    pub description: Option<String>,
}

impl Attribute {
    /// Creates an unbounded attribute with no description.
    #[must_use]
    pub fn new(name: impl Into<String>, scalar_type: ScalarType) -> Self {
        Self {
            name: name.into(),
            scalar_type,
            bounds: None,
            description: None,
        }
    }

    /// Sets the bounds of the attribute.
    #[must_use]
    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Sets the description of the attribute.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Whether a constraint is a precondition or a postcondition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    borsh::BorshSerialize,
)]
pub enum ConstraintKind {
    /// A precondition (`assume`).
    #[serde(rename = "assume")]
    Assumption,
    /// A postcondition (`require`).
    #[serde(rename = "require")]
    Requirement,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assumption => f.write_str("assume"),
            Self::Requirement => f.write_str("require"),
        }
    }
}

/// A constraint expression attached to a requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    /// Precondition or postcondition.
    pub kind: ConstraintKind,
    /// The expression text, opaque to the sync engine.
    pub expression: String,
    /// Optional free-text description.
    pub description: Option<String>,
}

impl Constraint {
    /// Creates a constraint with no description.
    #[must_use]
    pub fn new(kind: ConstraintKind, expression: impl Into<String>) -> Self {
        Self {
            kind,
            expression: expression.into(),
            description: None,
        }
    }
}

/// Identity and documentation of a requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Stable identifier.
    pub id: RequirementId,
    /// Short name.
    pub name: String,
    /// Fully qualified name in the source model, if known.
    pub qualified_name: Option<String>,
    /// Free-text documentation.
    pub documentation: Option<String>,
}

/// A structured requirement record, as produced by the upstream extractor.
///
/// The sync engine treats requirements as immutable input. Only their
/// fingerprints are stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    /// Identity and documentation.
    pub metadata: Metadata,
    /// Typed inputs, in extractor order.
    pub attributes: Vec<Attribute>,
    /// Constraint expressions, in extractor order.
    pub constraints: Vec<Constraint>,
    /// Identifiers of requirements nested inside this one.
    pub nested_requirements: Vec<String>,
}

impl Requirement {
    /// Creates a requirement with no attributes, constraints or documentation.
    #[must_use]
    pub fn new(id: RequirementId, name: impl Into<String>) -> Self {
        Self {
            metadata: Metadata {
                id,
                name: name.into(),
                qualified_name: None,
                documentation: None,
            },
            attributes: Vec::new(),
            constraints: Vec::new(),
            nested_requirements: Vec::new(),
        }
    }

    /// The stable identifier of this requirement.
    #[must_use]
    pub const fn id(&self) -> &RequirementId {
        &self.metadata.id
    }

    /// The short name of this requirement.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Sets the documentation text.
    #[must_use]
    pub fn with_documentation(mut self, documentation: impl Into<String>) -> Self {
        self.metadata.documentation = Some(documentation.into());
        self
    }

    /// Appends an attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Appends a constraint.
    #[must_use]
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Looks up an attribute by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_trimmed() {
        let id = RequirementId::new("  REQ-001 ").unwrap();
        assert_eq!(id.as_str(), "REQ-001");
    }

    #[test]
    fn blank_id_is_rejected() {
        assert_eq!(RequirementId::new("   "), Err(EmptyIdError));
    }

    #[test]
    fn id_serializes_as_plain_string() {
        let id: RequirementId = "REQ-007".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"REQ-007\"");

        let back: RequirementId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn unknown_type_tag_maps_to_unknown() {
        let ty: ScalarType = serde_json::from_str("\"Quaternion\"").unwrap();
        assert_eq!(ty, ScalarType::Unknown);
    }

    #[test]
    fn attribute_lookup_by_name() {
        let req = Requirement::new("REQ-001".parse().unwrap(), "Height")
            .with_attribute(Attribute::new("height", ScalarType::Integer));
        assert!(req.attribute("height").is_some());
        assert!(req.attribute("width").is_none());
    }
}
