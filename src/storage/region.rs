//! Parsing of artifact text into protected regions.
//!
//! An artifact is a text file containing one or more requirement groups:
//!
//! ```text
//! # SYSML2PYTEST-METADATA-START
//! # requirement_id: REQ-001
//! # content_hash: 3f2a...
//! # version: 2
//! # SYSML2PYTEST-METADATA-END
//! # SYSML2PYTEST-GENERATED-START
//! @given(height=st.integers(min_value=150, max_value=200))
//! def test_tree_height(height):
//! # SYSML2PYTEST-GENERATED-END
//!     # SYSML2PYTEST-CUSTOM-START
//!     assert plant(height).is_tall()
//!     # SYSML2PYTEST-CUSTOM-END
//! ```
//!
//! Parsing is a strict state machine over lines. Unbalanced or nested markers
//! are rejected rather than guessed at. Everything outside a region is kept as
//! filler, and every line is kept with its terminator, so
//! [`ParsedArtifact::render`] reproduces the input byte for byte.

use std::{fmt, ops::Range};

use crate::domain::{Config, Fingerprint, Requirement, RequirementId};

/// Line-comment leader and tag used to build marker tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    leader: String,
    tag: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self::new("#", "SYSML2PYTEST")
    }
}

impl Markers {
    /// Text of the placeholder line in a freshly created custom region.
    pub const PLACEHOLDER: &'static str = "Add custom test logic here";

    /// Indentation of custom regions rendered by [`Markers::render_group`].
    const BODY_INDENT: &'static str = "    ";

    /// Creates markers from a comment leader (e.g. `#`) and a tag (e.g.
    /// `SYSML2PYTEST`).
    #[must_use]
    pub fn new(leader: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            leader: leader.into(),
            tag: tag.into(),
        }
    }

    /// Markers configured for a workspace.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.comment_leader.clone(), config.marker_tag.clone())
    }

    /// The comment leader.
    #[must_use]
    pub fn leader(&self) -> &str {
        &self.leader
    }

    /// The marker token for one edge of a block, e.g.
    /// `# SYSML2PYTEST-CUSTOM-START`.
    #[must_use]
    pub fn token(&self, block: Block, edge: Edge) -> String {
        format!("{} {}-{}-{}", self.leader, self.tag, block.label(), edge.label())
    }

    /// The placeholder comment line, without indentation or terminator.
    #[must_use]
    pub fn placeholder(&self) -> String {
        format!("{} {}", self.leader, Self::PLACEHOLDER)
    }

    /// A `key: value` metadata line, without terminator.
    #[must_use]
    pub fn metadata_line(&self, key: &str, value: impl fmt::Display) -> String {
        format!("{} {key}: {value}", self.leader)
    }

    fn classify(&self, line: &str) -> Option<(Block, Edge)> {
        let rest = line.trim().strip_prefix(&self.leader)?;
        let rest = rest.trim_start().strip_prefix(&self.tag)?.strip_prefix('-')?;
        let (block, edge) = rest.split_once('-')?;
        let block = match block {
            "METADATA" => Block::Metadata,
            "GENERATED" => Block::Generated,
            "CUSTOM" => Block::Custom,
            _ => return None,
        };
        let edge = match edge {
            "START" => Edge::Start,
            "END" => Edge::End,
            _ => return None,
        };
        // only the exact token counts, so look-alikes inside user code are content
        (line.trim() == self.token(block, edge)).then_some((block, edge))
    }

    fn is_placeholder(&self, line: &str) -> bool {
        line.trim() == self.placeholder()
    }

    /// Parses artifact text using these markers.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] on unbalanced or nested markers, a metadata
    /// block with no generated region after it, or an invalid metadata block.
    pub fn parse(&self, text: &str) -> Result<ParsedArtifact, ParseError> {
        Parser::new(self).run(text)
    }

    /// Renders one requirement group: metadata block, generated region and a
    /// custom region.
    ///
    /// `generated` is the body of the generated region. `custom` is the body
    /// of the custom region; `None` renders the placeholder. Both are inserted
    /// verbatim and should end with a newline.
    #[must_use]
    pub fn render_group(
        &self,
        metadata: &ArtifactMetadata,
        generated: &str,
        custom: Option<&str>,
    ) -> String {
        let indent = Self::BODY_INDENT;
        let mut out = metadata.render(self);

        out.push_str(&self.token(Block::Generated, Edge::Start));
        out.push('\n');
        push_body(&mut out, generated);
        out.push_str(&self.token(Block::Generated, Edge::End));
        out.push('\n');

        out.push_str(&format!("{indent}{}\n", self.token(Block::Custom, Edge::Start)));
        match custom {
            Some(body) => push_body(&mut out, body),
            None => out.push_str(&format!("{indent}{}\n", self.placeholder())),
        }
        out.push_str(&format!("{indent}{}\n", self.token(Block::Custom, Edge::End)));

        out
    }
}

fn push_body(out: &mut String, body: &str) {
    out.push_str(body);
    if !body.is_empty() && !body.ends_with('\n') {
        out.push('\n');
    }
}

/// The three kinds of delimited block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    /// A metadata block.
    Metadata,
    /// A generated region.
    Generated,
    /// A custom region.
    Custom,
}

impl Block {
    const fn label(self) -> &'static str {
        match self {
            Self::Metadata => "METADATA",
            Self::Generated => "GENERATED",
            Self::Custom => "CUSTOM",
        }
    }
}

/// Start or end of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Opening marker.
    Start,
    /// Closing marker.
    End,
}

impl Edge {
    const fn label(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::End => "END",
        }
    }
}

/// Kind of a protected region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    /// Owned by the generator and replaced on every sync.
    Generated,
    /// Owned by the user and preserved verbatim.
    Custom,
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generated => f.write_str("GENERATED"),
            Self::Custom => f.write_str("CUSTOM"),
        }
    }
}

/// The parser state in which a marker was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Between regions.
    Outside,
    /// Inside a metadata block.
    InMetadata,
    /// Inside a generated region.
    InGenerated,
    /// Inside a custom region.
    InCustom,
}

impl fmt::Display for ParseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outside => f.write_str("outside any region (expected a start marker)"),
            Self::InMetadata => f.write_str("inside a metadata block (expected METADATA-END)"),
            Self::InGenerated => f.write_str("inside a generated region (expected GENERATED-END)"),
            Self::InCustom => f.write_str("inside a custom region (expected CUSTOM-END)"),
        }
    }
}

/// Artifact text that does not follow the region grammar.
///
/// Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// A start marker inside a block, or an end marker that does not close
    /// the current block.
    #[error("line {line}: unexpected marker `{found}` {state}")]
    UnbalancedMarker {
        /// Line of the offending marker.
        line: usize,
        /// The offending marker line, trimmed.
        found: String,
        /// The state the parser was in.
        state: ParseState,
    },

    /// A block that is still open at the end of the input.
    #[error("line {line}: block opened here is never closed, input ended {state}")]
    Unterminated {
        /// Line of the opening marker.
        line: usize,
        /// The state the parser was left in.
        state: ParseState,
    },

    /// A metadata block not followed by a generated region.
    #[error("line {line}: metadata block is not followed by a generated region")]
    DanglingMetadata {
        /// Line of the metadata start marker.
        line: usize,
    },

    /// A metadata block with missing or malformed values.
    #[error("line {line}: invalid metadata block: {reason}")]
    InvalidMetadata {
        /// Line of the metadata start marker.
        line: usize,
        /// What is wrong with it.
        reason: String,
    },
}

/// The values recorded in a metadata block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMetadata {
    /// The requirement the following group belongs to.
    pub requirement_id: RequirementId,
    /// Name of the requirement when generated.
    pub requirement_name: String,
    /// Content hash of the requirement when generated.
    pub content_hash: String,
    /// Requirement version when generated.
    pub version: u32,
    /// Generation timestamp, as written.
    pub generated_at: String,
    /// Version of the generator that wrote the group.
    pub generator_version: String,
}

impl ArtifactMetadata {
    const KEYS: [&'static str; 6] = [
        "requirement_id",
        "requirement_name",
        "content_hash",
        "version",
        "generated_at",
        "generator_version",
    ];

    /// Metadata describing a requirement at the given fingerprint.
    #[must_use]
    pub fn new(
        requirement: &Requirement,
        fingerprint: &Fingerprint,
        generator_version: impl Into<String>,
    ) -> Self {
        Self {
            requirement_id: requirement.id().clone(),
            requirement_name: requirement.name().to_string(),
            content_hash: fingerprint.content_hash.clone(),
            version: fingerprint.version,
            generated_at: fingerprint.timestamp.to_rfc3339(),
            generator_version: generator_version.into(),
        }
    }

    fn value(&self, key: &str) -> String {
        match key {
            "requirement_id" => self.requirement_id.to_string(),
            "requirement_name" => self.requirement_name.clone(),
            "content_hash" => self.content_hash.clone(),
            "version" => self.version.to_string(),
            "generated_at" => self.generated_at.clone(),
            "generator_version" => self.generator_version.clone(),
            _ => String::new(),
        }
    }

    /// Renders the full block, including its start and end markers.
    #[must_use]
    pub fn render(&self, markers: &Markers) -> String {
        let mut out = markers.token(Block::Metadata, Edge::Start);
        out.push('\n');
        for key in Self::KEYS {
            out.push_str(&markers.metadata_line(key, self.value(key)));
            out.push('\n');
        }
        out.push_str(&markers.token(Block::Metadata, Edge::End));
        out.push('\n');
        out
    }

    fn parse(body: &str, leader: &str, line: usize) -> Result<Self, ParseError> {
        let invalid = |reason: String| ParseError::InvalidMetadata { line, reason };

        let mut requirement_id = None;
        let mut requirement_name = String::new();
        let mut content_hash = String::new();
        let mut version = 1;
        let mut generated_at = String::new();
        let mut generator_version = String::new();

        for (key, value) in body.lines().filter_map(|l| split_metadata_line(l, leader)) {
            match key {
                "requirement_id" => {
                    requirement_id = Some(
                        RequirementId::new(value)
                            .map_err(|_| invalid("empty requirement_id".to_string()))?,
                    );
                }
                "requirement_name" => requirement_name = value.to_string(),
                "content_hash" => content_hash = value.to_string(),
                "version" => {
                    version = value
                        .parse::<u32>()
                        .ok()
                        .filter(|v| *v >= 1)
                        .ok_or_else(|| invalid(format!("version '{value}' is not a positive integer")))?;
                }
                "generated_at" => generated_at = value.to_string(),
                "generator_version" => generator_version = value.to_string(),
                _ => {}
            }
        }

        Ok(Self {
            requirement_id: requirement_id.ok_or_else(|| invalid("missing requirement_id".to_string()))?,
            requirement_name,
            content_hash,
            version,
            generated_at,
            generator_version,
        })
    }
}

fn split_metadata_line<'a>(line: &'a str, leader: &str) -> Option<(&'a str, &'a str)> {
    let (key, value) = line.trim().strip_prefix(leader)?.split_once(':')?;
    Some((key.trim(), value.trim()))
}

/// A metadata block and the raw lines it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataBlock {
    /// The parsed values.
    pub metadata: ArtifactMetadata,
    /// Line of the start marker.
    pub line: usize,
    /// Ordinal of the generated region the block is bound to.
    pub region: usize,
    open: String,
    body: String,
    close: String,
}

impl MetadataBlock {
    /// The requirement id recorded in the block.
    #[must_use]
    pub const fn requirement_id(&self) -> &RequirementId {
        &self.metadata.requirement_id
    }

    fn render_into(&self, out: &mut String) {
        out.push_str(&self.open);
        out.push_str(&self.body);
        out.push_str(&self.close);
    }

    /// Rewrites `content_hash`, `version` and `generated_at`, keeping every
    /// other line as it was. Missing keys are appended.
    fn stamp(&mut self, leader: &str, content_hash: &str, version: u32, generated_at: &str) {
        let updates = [
            ("content_hash", content_hash.to_string()),
            ("version", version.to_string()),
            ("generated_at", generated_at.to_string()),
        ];
        let mut seen = [false; 3];
        let mut body = String::with_capacity(self.body.len());

        for line in self.body.split_inclusive('\n') {
            let slot = split_metadata_line(line, leader)
                .and_then(|(key, _)| updates.iter().position(|(k, _)| *k == key));
            match slot {
                Some(i) => {
                    seen[i] = true;
                    let indent = &line[..line.len() - line.trim_start().len()];
                    let eol = line_ending(line);
                    let (key, value) = &updates[i];
                    body.push_str(&format!("{indent}{leader} {key}: {value}{eol}"));
                }
                None => body.push_str(line),
            }
        }

        for (i, (key, value)) in updates.iter().enumerate() {
            if !seen[i] {
                if !body.is_empty() && !body.ends_with('\n') {
                    body.push('\n');
                }
                body.push_str(&format!("{leader} {key}: {value}\n"));
            }
        }

        self.body = body;
        self.metadata.content_hash = content_hash.to_string();
        self.metadata.version = version;
        self.metadata.generated_at = generated_at.to_string();
    }
}

fn line_ending(line: &str) -> &str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

/// Where a region sits in its artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Index among all regions of the artifact, starting at 0.
    pub ordinal: usize,
    /// Line of the start marker.
    pub line: usize,
}

/// A delimited span of artifact text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedRegion {
    /// Generated or custom.
    pub kind: RegionKind,
    /// The text between the markers, byte for byte.
    pub raw_text: String,
    /// Where the region sits.
    pub position: Position,
    open: String,
    close: String,
}

impl ProtectedRegion {
    /// Whether this is a custom region holding more than the placeholder.
    #[must_use]
    pub fn has_custom_code(&self, markers: &Markers) -> bool {
        self.kind == RegionKind::Custom
            && self
                .raw_text
                .lines()
                .any(|line| !line.trim().is_empty() && !markers.is_placeholder(line))
    }

    fn render_into(&self, out: &mut String) {
        out.push_str(&self.open);
        out.push_str(&self.raw_text);
        out.push_str(&self.close);
    }

    /// The same region with its body replaced by `raw_text`.
    #[must_use]
    pub(crate) fn with_body(&self, raw_text: &str) -> Self {
        Self {
            raw_text: raw_text.to_string(),
            ..self.clone()
        }
    }
}

/// One piece of a parsed artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Unprotected text between blocks, kept verbatim.
    Filler(String),
    /// A metadata block.
    Metadata(MetadataBlock),
    /// A generated or custom region.
    Region(ProtectedRegion),
}

impl Segment {
    fn render_into(&self, out: &mut String) {
        match self {
            Self::Filler(text) => out.push_str(text),
            Self::Metadata(block) => block.render_into(out),
            Self::Region(region) => region.render_into(out),
        }
    }
}

/// A metadata block together with everything up to the next one.
#[derive(Debug, Clone, Copy)]
pub struct Group<'a> {
    /// The metadata block opening the group.
    pub metadata: &'a MetadataBlock,
    /// All segments of the group, starting with the metadata block.
    pub segments: &'a [Segment],
    /// Index range of `segments` within the artifact.
    pub range: (usize, usize),
}

impl Group<'_> {
    /// The requirement this group belongs to.
    #[must_use]
    pub const fn id(&self) -> &RequirementId {
        self.metadata.requirement_id()
    }

    /// Regions of the group, in order.
    pub fn regions(&self) -> impl Iterator<Item = &ProtectedRegion> {
        regions_of(self.segments)
    }

    /// The kinds of the group's regions, in order.
    #[must_use]
    pub fn kind_sequence(&self) -> Vec<RegionKind> {
        self.regions().map(|r| r.kind).collect()
    }

    /// Whether any custom region of the group holds user code.
    #[must_use]
    pub fn has_custom_code(&self, markers: &Markers) -> bool {
        self.regions().any(|r| r.has_custom_code(markers))
    }

    /// The group's text, byte for byte.
    #[must_use]
    pub fn render(&self) -> String {
        render_segments(self.segments)
    }

    pub(crate) const fn index_range(&self) -> Range<usize> {
        self.range.0..self.range.1
    }
}

fn regions_of(segments: &[Segment]) -> impl Iterator<Item = &ProtectedRegion> {
    segments.iter().filter_map(|s| match s {
        Segment::Region(region) => Some(region),
        _ => None,
    })
}

pub(crate) fn render_segments(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        segment.render_into(&mut out);
    }
    out
}

/// Artifact text split into filler, metadata blocks and protected regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArtifact {
    segments: Vec<Segment>,
    markers: Markers,
}

impl ParsedArtifact {
    pub(crate) const fn from_segments(segments: Vec<Segment>, markers: Markers) -> Self {
        Self { segments, markers }
    }

    /// All segments, in order.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub(crate) fn into_segments(self) -> Vec<Segment> {
        self.segments
    }

    /// The markers the artifact was parsed with.
    #[must_use]
    pub const fn markers(&self) -> &Markers {
        &self.markers
    }

    /// All protected regions, in order.
    pub fn regions(&self) -> impl Iterator<Item = &ProtectedRegion> {
        regions_of(&self.segments)
    }

    /// All metadata blocks, in order.
    pub fn metadata(&self) -> impl Iterator<Item = &MetadataBlock> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Metadata(block) => Some(block),
            _ => None,
        })
    }

    /// The kinds of all regions, in order.
    #[must_use]
    pub fn kind_sequence(&self) -> Vec<RegionKind> {
        self.regions().map(|r| r.kind).collect()
    }

    /// Requirement ids of all groups, in order.
    #[must_use]
    pub fn requirement_ids(&self) -> Vec<RequirementId> {
        self.metadata().map(|m| m.requirement_id().clone()).collect()
    }

    /// Segments before the first metadata block.
    #[must_use]
    pub fn preamble(&self) -> &[Segment] {
        let end = self
            .segments
            .iter()
            .position(|s| matches!(s, Segment::Metadata(_)))
            .unwrap_or(self.segments.len());
        &self.segments[..end]
    }

    /// All requirement groups, in order.
    #[must_use]
    pub fn groups(&self) -> Vec<Group<'_>> {
        let starts: Vec<usize> = self
            .segments
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, Segment::Metadata(_)))
            .map(|(i, _)| i)
            .collect();

        starts
            .iter()
            .enumerate()
            .filter_map(|(n, &start)| {
                let end = starts.get(n + 1).copied().unwrap_or(self.segments.len());
                match &self.segments[start] {
                    Segment::Metadata(metadata) => Some(Group {
                        metadata,
                        segments: &self.segments[start..end],
                        range: (start, end),
                    }),
                    _ => None,
                }
            })
            .collect()
    }

    /// The group for a requirement id. The first one wins if the id occurs
    /// more than once.
    #[must_use]
    pub fn group(&self, id: &RequirementId) -> Option<Group<'_>> {
        self.groups().into_iter().find(|g| g.id() == id)
    }

    /// Whether any custom region holds user code.
    #[must_use]
    pub fn has_custom_code(&self) -> bool {
        self.regions().any(|r| r.has_custom_code(&self.markers))
    }

    /// Rewrites `content_hash`, `version` and `generated_at` in the metadata
    /// block of `id`. Returns `false` if there is no such block.
    pub fn stamp(
        &mut self,
        id: &RequirementId,
        content_hash: &str,
        version: u32,
        generated_at: &str,
    ) -> bool {
        let leader = self.markers.leader.clone();
        self.segments
            .iter_mut()
            .find_map(|s| match s {
                Segment::Metadata(block) if block.requirement_id() == id => Some(block),
                _ => None,
            })
            .map(|block| block.stamp(&leader, content_hash, version, generated_at))
            .is_some()
    }

    /// The artifact text, byte for byte.
    #[must_use]
    pub fn render(&self) -> String {
        render_segments(&self.segments)
    }
}

/// Parses artifact text using the default markers.
///
/// # Errors
///
/// See [`Markers::parse`].
pub fn parse_artifact(text: &str) -> Result<ParsedArtifact, ParseError> {
    Markers::default().parse(text)
}

/// An open block: what it is, where it started, and what has been read.
struct Open {
    block: Block,
    line: usize,
    marker: String,
    body: String,
}

struct Parser<'m> {
    markers: &'m Markers,
    segments: Vec<Segment>,
    filler: String,
    open: Option<Open>,
    /// Index of a metadata segment still waiting for its generated region.
    pending: Option<usize>,
    regions: usize,
}

impl<'m> Parser<'m> {
    const fn new(markers: &'m Markers) -> Self {
        Self {
            markers,
            segments: Vec::new(),
            filler: String::new(),
            open: None,
            pending: None,
            regions: 0,
        }
    }

    fn state(&self) -> ParseState {
        match self.open.as_ref().map(|o| o.block) {
            None => ParseState::Outside,
            Some(Block::Metadata) => ParseState::InMetadata,
            Some(Block::Generated) => ParseState::InGenerated,
            Some(Block::Custom) => ParseState::InCustom,
        }
    }

    fn run(mut self, text: &str) -> Result<ParsedArtifact, ParseError> {
        let mut last_line = 0;
        for (index, line) in text.split_inclusive('\n').enumerate() {
            last_line = index + 1;
            self.line(last_line, line)?;
        }

        if let Some(open) = &self.open {
            return Err(ParseError::Unterminated {
                line: open.line,
                state: self.state(),
            });
        }
        self.check_pending()?;
        tracing::trace!(lines = last_line, segments = self.segments.len(), "parsed artifact");

        self.flush_filler();
        Ok(ParsedArtifact::from_segments(self.segments, self.markers.clone()))
    }

    fn line(&mut self, number: usize, line: &str) -> Result<(), ParseError> {
        let Some((block, edge)) = self.markers.classify(line) else {
            match &mut self.open {
                Some(open) => open.body.push_str(line),
                None => self.filler.push_str(line),
            }
            return Ok(());
        };

        let unbalanced = |state: ParseState| ParseError::UnbalancedMarker {
            line: number,
            found: line.trim().to_string(),
            state,
        };

        match (self.open.take(), edge) {
            (None, Edge::Start) => {
                match block {
                    Block::Metadata | Block::Custom => self.check_pending()?,
                    Block::Generated => {}
                }
                self.flush_filler();
                self.open = Some(Open {
                    block,
                    line: number,
                    marker: line.to_string(),
                    body: String::new(),
                });
                Ok(())
            }
            (None, Edge::End) => Err(unbalanced(ParseState::Outside)),
            (Some(open), Edge::End) if open.block == block => self.close(open, line),
            (Some(open), _) => {
                let state = match open.block {
                    Block::Metadata => ParseState::InMetadata,
                    Block::Generated => ParseState::InGenerated,
                    Block::Custom => ParseState::InCustom,
                };
                Err(unbalanced(state))
            }
        }
    }

    fn close(&mut self, open: Open, marker: &str) -> Result<(), ParseError> {
        let kind = match open.block {
            Block::Metadata => {
                let metadata = ArtifactMetadata::parse(&open.body, &self.markers.leader, open.line)?;
                self.pending = Some(self.segments.len());
                self.segments.push(Segment::Metadata(MetadataBlock {
                    metadata,
                    line: open.line,
                    region: 0,
                    open: open.marker,
                    body: open.body,
                    close: marker.to_string(),
                }));
                return Ok(());
            }
            Block::Generated => RegionKind::Generated,
            Block::Custom => RegionKind::Custom,
        };

        let ordinal = self.regions;
        self.regions += 1;

        if kind == RegionKind::Generated {
            if let Some(Segment::Metadata(block)) =
                self.pending.take().and_then(|i| self.segments.get_mut(i))
            {
                block.region = ordinal;
            }
        }

        self.segments.push(Segment::Region(ProtectedRegion {
            kind,
            raw_text: open.body,
            position: Position {
                ordinal,
                line: open.line,
            },
            open: open.marker,
            close: marker.to_string(),
        }));
        Ok(())
    }

    fn check_pending(&self) -> Result<(), ParseError> {
        match self.pending.and_then(|i| self.segments.get(i)) {
            Some(Segment::Metadata(block)) => {
                Err(ParseError::DanglingMetadata { line: block.line })
            }
            _ => Ok(()),
        }
    }

    fn flush_filler(&mut self) {
        if !self.filler.is_empty() {
            self.segments
                .push(Segment::Filler(std::mem::take(&mut self.filler)));
        }
    }
}
