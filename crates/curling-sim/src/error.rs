use curling_match::MatchError;

/// Why a simulated match could not produce a report.
#[derive(Debug)]
pub enum SimError {
    /// Seating the bots or reading back the final state failed.
    Match(MatchError),
    /// The match did not finish within the configured match time.
    Timeout { secs: f64 },
    /// A participant task panicked or was cancelled.
    Task(tokio::task::JoinError),
}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Match(e) => write!(f, "match error: {e}"),
            Self::Timeout { secs } => write!(f, "match unfinished after {secs}s"),
            Self::Task(e) => write!(f, "participant task failed: {e}"),
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Match(e) => Some(e),
            Self::Task(e) => Some(e),
            Self::Timeout { .. } => None,
        }
    }
}

impl From<MatchError> for SimError {
    fn from(e: MatchError) -> Self {
        Self::Match(e)
    }
}

impl From<tokio::task::JoinError> for SimError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e)
    }
}
