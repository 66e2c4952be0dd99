use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::domain::change::Severity;

/// How an existing artifact is reconciled with freshly generated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Discard the existing artifact and write the generated text verbatim.
    FullRegen,
    /// Replace generated regions and keep custom regions.
    Surgical,
    /// Write the generated text next to the artifact, leaving it untouched.
    SideBySide,
    /// Choose one of the above from the severity and the existing content.
    #[default]
    Hybrid,
}

impl Strategy {
    /// Every strategy, in the order they are listed to users.
    pub const ALL: [Self; 4] = [Self::Hybrid, Self::Surgical, Self::SideBySide, Self::FullRegen];

    /// The name used on the command line and in configuration files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::FullRegen => "full_regen",
            Self::Surgical => "surgical",
            Self::SideBySide => "side_by_side",
            Self::Hybrid => "hybrid",
        }
    }

    /// Resolves this strategy into a concrete plan for one artifact.
    ///
    /// - without existing text there is nothing to protect, so every strategy
    ///   regenerates
    /// - [`Strategy::Hybrid`] regenerates artifacts without custom code,
    ///   merges surgically (falling back to a sibling file on conflict) for
    ///   minor and moderate changes, and goes straight to a sibling file for
    ///   major changes
    #[must_use]
    pub const fn plan(self, severity: Severity, has_custom_code: bool, existing: bool) -> Plan {
        if !existing {
            return Plan::FullRegen;
        }
        match self {
            Self::FullRegen => Plan::FullRegen,
            Self::Surgical => Plan::Surgical { fallback: false },
            Self::SideBySide => Plan::SideBySide,
            Self::Hybrid => match (has_custom_code, severity) {
                (false, _) => Plan::FullRegen,
                (true, Severity::Major) => Plan::SideBySide,
                (true, Severity::None | Severity::Minor | Severity::Moderate) => {
                    Plan::Surgical { fallback: true }
                }
            },
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An unrecognised strategy name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown strategy '{0}' (expected one of: hybrid, surgical, side_by_side, full_regen)")]
pub struct UnknownStrategy(String);

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.name() == normalized)
            .ok_or_else(|| UnknownStrategy(s.to_string()))
    }
}

/// The concrete action chosen for one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Overwrite the artifact with the generated text.
    FullRegen,
    /// Merge region by region.
    Surgical {
        /// Whether a conflict degrades to [`Plan::SideBySide`] instead of
        /// failing.
        fallback: bool,
    },
    /// Write the generated text to a sibling path.
    SideBySide,
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(Severity::None, true, Plan::Surgical { fallback: true } ; "unchanged with custom code")]
    #[test_case(Severity::Minor, true, Plan::Surgical { fallback: true } ; "minor with custom code")]
    #[test_case(Severity::Moderate, true, Plan::Surgical { fallback: true } ; "moderate with custom code")]
    #[test_case(Severity::Major, true, Plan::SideBySide ; "major with custom code")]
    #[test_case(Severity::Major, false, Plan::FullRegen ; "major without custom code")]
    #[test_case(Severity::Moderate, false, Plan::FullRegen ; "moderate without custom code")]
    fn hybrid_dispatch(severity: Severity, has_custom_code: bool, expected: Plan) {
        assert_eq!(
            Strategy::Hybrid.plan(severity, has_custom_code, true),
            expected
        );
    }

    #[test_case(Strategy::Hybrid)]
    #[test_case(Strategy::Surgical)]
    #[test_case(Strategy::SideBySide)]
    #[test_case(Strategy::FullRegen)]
    fn new_artifacts_are_regenerated(strategy: Strategy) {
        assert_eq!(strategy.plan(Severity::Major, true, false), Plan::FullRegen);
    }

    #[test]
    fn explicit_surgical_does_not_fall_back() {
        assert_eq!(
            Strategy::Surgical.plan(Severity::Major, true, true),
            Plan::Surgical { fallback: false }
        );
    }

    #[test_case("hybrid", Strategy::Hybrid)]
    #[test_case("side-by-side", Strategy::SideBySide)]
    #[test_case("FULL_REGEN", Strategy::FullRegen)]
    fn parses_names(name: &str, expected: Strategy) {
        assert_eq!(name.parse::<Strategy>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_names() {
        assert!("clobber".parse::<Strategy>().is_err());
    }
}
