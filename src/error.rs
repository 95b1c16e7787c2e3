//! Error types for terrastat.
//!
//! All errors are strongly typed using thiserror. This enables pattern
//! matching on specific error conditions and provides clear error messages
//! at the boundary where a bad input is introduced.

use thiserror::Error;

/// Validation errors that occur during input validation.
///
/// These are always surfaced synchronously to the caller and never
/// silently defaulted.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Metric key component '{component}' is empty")]
    EmptyKeyComponent {
        component: &'static str,
    },

    #[error("Metric key component '{component}' contains the delimiter '::': {value}")]
    DelimiterInKeyComponent {
        component: &'static str,
        value: String,
    },

    #[error("Malformed metric key string '{input}': expected 4 '::'-delimited components, found {found}")]
    MalformedKeyString {
        input: String,
        found: usize,
    },

    #[error("Position ({x}, {y}) has a non-finite coordinate")]
    NonFinitePosition {
        x: f64,
        y: f64,
    },

    #[error("Metric value {value} is not finite")]
    NonFiniteValue {
        value: f64,
    },

    #[error("Unrecognized token: '{token}'")]
    UnrecognizedToken {
        token: String,
    },

    #[error("Rank {rank} is out of range: only {available} ranked scenarios exist")]
    RankOutOfRange {
        rank: usize,
        available: usize,
    },

    #[error("Token '{token}' requires statistics, but the resolution context has none")]
    MissingStatistics {
        token: String,
    },

    #[error("Token '{token}' resolves to a {found}, expected a {expected}")]
    TokenKindMismatch {
        token: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid bounds: min ({min}) exceeds max ({max}) on the {axis} axis")]
    InvalidBounds {
        axis: &'static str,
        min: f64,
        max: f64,
    },
}

/// Configuration errors.
///
/// Fatal at the point of use: the orchestrator refuses to run work that
/// would hit one of these.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("No good-direction configured for metric '{metric}'; best/worst are undefined without one")]
    MissingDirection {
        metric: String,
    },

    #[error("Dependency cycle among components: {members:?}")]
    DependencyCycle {
        members: Vec<String>,
    },

    #[error("Component '{component}' depends on unknown component '{dependency}'")]
    UnknownDependency {
        component: String,
        dependency: String,
    },

    #[error("Spatial cell size {cell_size} must be finite and positive")]
    InvalidCellSize {
        cell_size: f64,
    },

    #[error("Schedule interval must be positive")]
    NonPositiveInterval,
}

/// A supplied compute or pipeline-step function failed.
///
/// Carries the structured report fields delivered to the error-isolation
/// channel: module, operation, cause, and whether a retry could succeed.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("Computation failed in {module}::{operation}: {cause}")]
pub struct ComputationError {
    /// Component or calculator the failure originated in.
    pub module: String,
    /// Operation that was being performed.
    pub operation: String,
    /// Human-readable cause.
    pub cause: String,
    /// Whether retrying could succeed.
    pub recoverable: bool,
}

impl ComputationError {
    /// Creates a recoverable computation error.
    #[must_use]
    pub fn recoverable(
        module: impl Into<String>,
        operation: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            operation: operation.into(),
            cause: cause.into(),
            recoverable: true,
        }
    }

    /// Creates a non-recoverable computation error.
    #[must_use]
    pub fn fatal(
        module: impl Into<String>,
        operation: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            operation: operation.into(),
            cause: cause.into(),
            recoverable: false,
        }
    }
}

/// Execution errors that occur while running pipelines or the scheduler.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Pipeline not found: {name}")]
    PipelineNotFound {
        name: String,
    },

    #[error("Pipeline '{name}' is already running")]
    PipelineBusy {
        name: String,
    },

    #[error("Scheduler queue '{queue}' is full (capacity {capacity})")]
    QueueFull {
        queue: String,
        capacity: usize,
    },

    #[error("Scheduler channel '{queue}' is disconnected")]
    Disconnected {
        queue: String,
    },
}

/// Top-level error type for terrastat.
///
/// This enum encompasses all possible errors that can occur when using
/// the analytics core.
#[derive(Debug, Error)]
pub enum TerraError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Computation error: {0}")]
    Computation(#[from] ComputationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl TerraError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns true if this error could succeed on retry.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            // Bad inputs and bad configuration won't change on retry.
            Self::Validation(_) | Self::Configuration(_) | Self::Internal { .. } => false,
            Self::Computation(e) => e.recoverable,
            Self::Execution(e) => matches!(
                e,
                ExecutionError::PipelineBusy { .. } | ExecutionError::QueueFull { .. }
            ),
        }
    }
}

/// Result type alias for terrastat operations.
pub type TerraResult<T> = Result<T, TerraError>;
