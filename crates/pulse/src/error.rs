use thiserror::Error;

/// Boxed source error carried out of a failing check
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Pulse result type
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to run check {name}: {source}")]
    Check {
        name: String,
        #[source]
        source: BoxError,
    },
    #[error("check run cancelled before the gather pass completed")]
    Cancelled,
    #[error("check run exceeded its deadline")]
    DeadlineExceeded,
    #[error("no target client selected: one of the consensus or execution selectors must name a client")]
    NoTarget,
    #[error("ambiguous target: both consensus ({consensus}) and execution ({execution}) are selected")]
    AmbiguousTarget {
        consensus: String,
        execution: String,
    },
}

impl Error {
    /// Wrap a check failure with the name of the check that produced it
    pub fn check(name: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Check {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Short label for the variant, stable enough for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Check { .. } => "check",
            Error::Cancelled => "cancelled",
            Error::DeadlineExceeded => "deadline_exceeded",
            Error::NoTarget => "no_target",
            Error::AmbiguousTarget { .. } => "ambiguous_target",
        }
    }
}
