//! Loading requirement collections written by the upstream extractor.
//!
//! A collection document looks like this (JSON or YAML):
//!
//! ```json
//! {
//!   "requirements": [
//!     {
//!       "metadata": { "id": "REQ-001", "name": "TreeHeight", "documentation": "..." },
//!       "attributes": [ { "name": "height", "type": "Integer", "min_value": 150, "max_value": 200 } ],
//!       "constraints": [ { "kind": "require", "expression": "height >= 150" } ],
//!       "nested_requirements": []
//!     }
//!   ],
//!   "count": 1
//! }
//! ```

use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::domain::{
    Attribute, Bounds, Constraint, ConstraintKind, Requirement, RequirementId, ScalarType,
    requirement::Metadata,
};

/// Requirements keyed by id.
pub type Collection = BTreeMap<RequirementId, Requirement>;

/// The encoding of a collection document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// JSON.
    Json,
    /// YAML.
    Yaml,
}

impl Format {
    /// Picks the format from a file extension. Anything that is not `yaml` or
    /// `yml` is read as JSON.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Self::Yaml
            }
            _ => Self::Json,
        }
    }
}

/// Why a collection could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum CollectionLoadError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// The collection file.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// The document is not valid JSON of the expected shape.
    #[error("invalid requirement collection: {0}")]
    Json(#[from] serde_json::Error),

    /// The document is not valid YAML of the expected shape.
    #[error("invalid requirement collection: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Two requirements share an id.
    #[error("duplicate requirement id {0}")]
    DuplicateId(RequirementId),

    /// A requirement has neither an id nor a name.
    #[error("requirement #{index} has no id or name")]
    MissingId {
        /// Position of the requirement in the document.
        index: usize,
    },
}

/// Loads a collection from a file, picking the format from its extension.
///
/// # Errors
///
/// See [`CollectionLoadError`].
pub fn load_collection(path: &Path) -> Result<Collection, CollectionLoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| CollectionLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let collection = parse_collection(&text, Format::from_path(path))?;
    tracing::debug!(
        "loaded {} requirements from {}",
        collection.len(),
        path.display()
    );
    Ok(collection)
}

/// Parses a collection document.
///
/// A requirement without an id is keyed by its name. A `count` that does not
/// match the number of requirements is logged and otherwise ignored.
///
/// # Errors
///
/// See [`CollectionLoadError`].
pub fn parse_collection(text: &str, format: Format) -> Result<Collection, CollectionLoadError> {
    let document: Document = match format {
        Format::Json => serde_json::from_str(text)?,
        Format::Yaml => serde_yaml::from_str(text)?,
    };

    if let Some(count) = document.count {
        if count != document.requirements.len() {
            tracing::warn!(
                "collection declares {count} requirements but contains {}",
                document.requirements.len()
            );
        }
    }

    let mut collection = Collection::new();
    for (index, record) in document.requirements.into_iter().enumerate() {
        let requirement = record.into_requirement(index)?;
        let id = requirement.id().clone();
        if collection.insert(id.clone(), requirement).is_some() {
            return Err(CollectionLoadError::DuplicateId(id));
        }
    }
    Ok(collection)
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    requirements: Vec<RequirementRecord>,
    #[serde(default)]
    count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RequirementRecord {
    metadata: MetadataRecord,
    #[serde(default)]
    attributes: Vec<AttributeRecord>,
    #[serde(default)]
    constraints: Vec<ConstraintRecord>,
    #[serde(default)]
    nested_requirements: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MetadataRecord {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    qualified_name: Option<String>,
    #[serde(default)]
    documentation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AttributeRecord {
    name: String,
    #[serde(rename = "type", default = "unknown_type")]
    scalar_type: ScalarType,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    min_value: Option<f64>,
    #[serde(default)]
    max_value: Option<f64>,
    #[serde(default)]
    allowed_values: Option<Vec<String>>,
}

const fn unknown_type() -> ScalarType {
    ScalarType::Unknown
}

#[derive(Debug, Deserialize)]
struct ConstraintRecord {
    #[serde(alias = "type")]
    kind: ConstraintKind,
    expression: String,
    #[serde(default)]
    description: Option<String>,
}

impl RequirementRecord {
    fn into_requirement(self, index: usize) -> Result<Requirement, CollectionLoadError> {
        let Self {
            metadata,
            attributes,
            constraints,
            nested_requirements,
        } = self;

        let id = metadata
            .id
            .as_deref()
            .and_then(|id| RequirementId::new(id).ok())
            .or_else(|| RequirementId::new(&metadata.name).ok())
            .ok_or(CollectionLoadError::MissingId { index })?;

        Ok(Requirement {
            metadata: Metadata {
                id,
                name: metadata.name,
                qualified_name: metadata.qualified_name,
                documentation: metadata.documentation,
            },
            attributes: attributes.into_iter().map(Attribute::from).collect(),
            constraints: constraints.into_iter().map(Constraint::from).collect(),
            nested_requirements,
        })
    }
}

impl From<AttributeRecord> for Attribute {
    fn from(record: AttributeRecord) -> Self {
        let bounds = match (record.allowed_values, record.min_value, record.max_value) {
            (Some(values), _, _) => Some(Bounds::Enumerated(values)),
            (None, None, None) => None,
            (None, min, max) => Some(Bounds::Range { min, max }),
        };
        Self {
            name: record.name,
            scalar_type: record.scalar_type,
            bounds,
            description: record.description,
        }
    }
}

impl From<ConstraintRecord> for Constraint {
    fn from(record: ConstraintRecord) -> Self {
        Self {
            kind: record.kind,
            expression: record.expression,
            description: record.description,
        }
    }
}
