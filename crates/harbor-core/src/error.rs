use thiserror::Error;

use crate::models::Coordinate;

/// Which end of a planning request an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    Start,
    Goal,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Start => f.write_str("start"),
            Endpoint::Goal => f.write_str("goal"),
        }
    }
}

/// Errors surfaced by the route optimization engine.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The search budget ran out and the direct-path fallback could not avoid obstacles.
    #[error("no route found from {start} to {goal}")]
    NoPathFound { start: Coordinate, goal: Coordinate },

    /// An endpoint lies inside an obstacle even without its safety buffer.
    #[error("{endpoint} position {position} is inside a restricted area")]
    UnsafeEndpoint {
        endpoint: Endpoint,
        position: Coordinate,
    },

    /// An obstacle definition was rejected at load time.
    #[error("invalid obstacle '{name}': {reason}")]
    InvalidObstacle { name: String, reason: String },
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PlanError>;
