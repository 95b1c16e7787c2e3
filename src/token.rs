//! Symbolic token resolution.
//!
//! Tokens are placeholders resolved at read time against the current
//! resolution context: either to a scenario key (substituted into a
//! `MetricKey` before lookup), a displayable numeric value, or a filter
//! key. The catalog is fixed and parsed in one place; nothing else in the
//! system string-matches token names.
//!
//! Resolution always produces the typed `TokenValue`, never a bare
//! primitive: callers building keys and callers expecting numbers cannot be
//! confused at the type level, and the kind for a given token never varies
//! by data.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::metric::key::ALL;
use crate::metric::stats::MetricStatistics;

fn rank_regex() -> &'static Regex {
    static RANK_RE: OnceLock<Regex> = OnceLock::new();
    // Ranks are 1-based; "rank-0" is not a token.
    RANK_RE.get_or_init(|| Regex::new(r"^rank-([1-9][0-9]*)$").expect("valid rank regex"))
}

/// A symbolic placeholder from the fixed token catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    /// The scenario currently being viewed.
    CurrentScenario,
    /// The scenario currently being edited.
    ActiveScenario,
    /// The best-ranked scenario per the metric's direction.
    BestScenario,
    /// The worst-ranked scenario per the metric's direction.
    WorstScenario,
    /// The cross-scenario mean.
    AverageValue,
    /// The cross-scenario median.
    MedianValue,
    /// The scenario at the given 1-based rank.
    Rank(usize),
    /// The canonical "all" filter sentinel.
    NoneFilter,
}

/// The kind of value a token resolves to. Fixed per token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenKind {
    /// Resolves to a scenario key.
    ScenarioKey,
    /// Resolves to a displayable number.
    NumericValue,
    /// Resolves to a filter key.
    FilterKey,
}

/// The typed result of resolving a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum TokenValue {
    /// A scenario key, to be substituted into a `MetricKey`.
    ScenarioKey(String),
    /// A displayable numeric value.
    NumericValue(f64),
    /// A filter key.
    FilterKey(String),
}

impl TokenValue {
    /// The kind tag of this value.
    #[must_use]
    pub const fn kind(&self) -> TokenKind {
        match self {
            Self::ScenarioKey(_) => TokenKind::ScenarioKey,
            Self::NumericValue(_) => TokenKind::NumericValue,
            Self::FilterKey(_) => TokenKind::FilterKey,
        }
    }

    /// The scenario key, if this value is one.
    #[must_use]
    pub fn as_scenario_key(&self) -> Option<&str> {
        match self {
            Self::ScenarioKey(s) => Some(s),
            _ => None,
        }
    }

    /// The numeric value, if this value is one.
    #[must_use]
    pub const fn as_numeric(&self) -> Option<f64> {
        match self {
            Self::NumericValue(v) => Some(*v),
            _ => None,
        }
    }
}

/// State a token is resolved against.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionContext<'a> {
    /// The scenario the user is viewing.
    pub current_scenario: &'a str,
    /// The scenario the user is editing.
    pub active_scenario: &'a str,
    /// Statistics for the (analysis, metric) pair under resolution, when
    /// available.
    pub statistics: Option<&'a MetricStatistics>,
}

impl Token {
    /// Parses a token string from the catalog.
    ///
    /// # Errors
    ///
    /// Unrecognized strings are a hard `ValidationError`: a typo must fail
    /// here, not resolve to "a scenario that happens not to exist" and
    /// masquerade as missing data.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        match input {
            "current-scenario" => Ok(Self::CurrentScenario),
            "active-scenario" => Ok(Self::ActiveScenario),
            "best-scenario" => Ok(Self::BestScenario),
            "worst-scenario" => Ok(Self::WorstScenario),
            "average-value" => Ok(Self::AverageValue),
            "median-value" => Ok(Self::MedianValue),
            "none-filter" => Ok(Self::NoneFilter),
            other => {
                if let Some(caps) = rank_regex().captures(other) {
                    let rank: usize = caps[1].parse().map_err(|_| {
                        ValidationError::UnrecognizedToken {
                            token: other.to_string(),
                        }
                    })?;
                    return Ok(Self::Rank(rank));
                }
                Err(ValidationError::UnrecognizedToken {
                    token: other.to_string(),
                })
            }
        }
    }

    /// The kind of value this token resolves to. Never varies by data.
    #[must_use]
    pub const fn kind(&self) -> TokenKind {
        match self {
            Self::CurrentScenario
            | Self::ActiveScenario
            | Self::BestScenario
            | Self::WorstScenario
            | Self::Rank(_) => TokenKind::ScenarioKey,
            Self::AverageValue | Self::MedianValue => TokenKind::NumericValue,
            Self::NoneFilter => TokenKind::FilterKey,
        }
    }

    /// Resolves this token against a context.
    ///
    /// # Errors
    ///
    /// - `ValidationError::MissingStatistics` for statistics-dependent
    ///   tokens when the context carries none.
    /// - `ValidationError::RankOutOfRange` for `rank-N` beyond the ranking
    ///   list; never clamped.
    pub fn resolve(&self, ctx: &ResolutionContext<'_>) -> Result<TokenValue, ValidationError> {
        match self {
            Self::CurrentScenario => Ok(TokenValue::ScenarioKey(ctx.current_scenario.to_string())),
            Self::ActiveScenario => Ok(TokenValue::ScenarioKey(ctx.active_scenario.to_string())),
            Self::BestScenario => Ok(TokenValue::ScenarioKey(
                require_stats(self, ctx)?.best.scenario.clone(),
            )),
            Self::WorstScenario => Ok(TokenValue::ScenarioKey(
                require_stats(self, ctx)?.worst.scenario.clone(),
            )),
            Self::AverageValue => Ok(TokenValue::NumericValue(require_stats(self, ctx)?.average)),
            Self::MedianValue => Ok(TokenValue::NumericValue(require_stats(self, ctx)?.median)),
            Self::Rank(rank) => {
                let rankings = &require_stats(self, ctx)?.rankings;
                let entry = rankings.get(rank - 1).ok_or(ValidationError::RankOutOfRange {
                    rank: *rank,
                    available: rankings.len(),
                })?;
                Ok(TokenValue::ScenarioKey(entry.scenario.clone()))
            }
            Self::NoneFilter => Ok(TokenValue::FilterKey(ALL.to_string())),
        }
    }
}

fn require_stats<'a>(
    token: &Token,
    ctx: &ResolutionContext<'a>,
) -> Result<&'a MetricStatistics, ValidationError> {
    ctx.statistics.ok_or_else(|| ValidationError::MissingStatistics {
        token: token.to_string(),
    })
}

/// Parses and resolves a token string in one step.
///
/// # Errors
///
/// Any error from `Token::parse` or `Token::resolve`.
pub fn resolve(input: &str, ctx: &ResolutionContext<'_>) -> Result<TokenValue, ValidationError> {
    Token::parse(input)?.resolve(ctx)
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CurrentScenario => write!(f, "current-scenario"),
            Self::ActiveScenario => write!(f, "active-scenario"),
            Self::BestScenario => write!(f, "best-scenario"),
            Self::WorstScenario => write!(f, "worst-scenario"),
            Self::AverageValue => write!(f, "average-value"),
            Self::MedianValue => write!(f, "median-value"),
            Self::Rank(n) => write!(f, "rank-{n}"),
            Self::NoneFilter => write!(f, "none-filter"),
        }
    }
}

impl FromStr for Token {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Token {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
