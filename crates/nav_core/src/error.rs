use thiserror::Error;

/// Failures reported by a routing collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RoutingError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No route between the requested points")]
    NoRoute,

    #[error("Invalid routing response: {0}")]
    InvalidResponse(String),

    #[error("Route has too few points: {points}")]
    TooFewPoints { points: usize },
}

impl RoutingError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RoutingError::Transport(_) => true,
            RoutingError::NoRoute => false,
            RoutingError::InvalidResponse(_) => false,
            RoutingError::TooFewPoints { .. } => false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NavError {
    #[error("Invalid route: need at least 2 points, got {points}")]
    InvalidRoute { points: usize },

    #[error("No active route")]
    NoActiveRoute,

    #[error("No position observed yet")]
    NoPosition,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Routing failed: {0}")]
    Routing(#[from] RoutingError),
}

pub type Result<T> = std::result::Result<T, NavError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RoutingError::Transport("timeout".into()).is_transient());
        assert!(!RoutingError::NoRoute.is_transient());
        assert!(!RoutingError::TooFewPoints { points: 1 }.is_transient());
    }

    #[test]
    fn test_routing_error_converts() {
        let err: NavError = RoutingError::NoRoute.into();
        assert_eq!(err.to_string(), "Routing failed: No route between the requested points");
    }
}
