pub mod collision;
pub mod engine;
pub mod error;
pub mod models;
pub mod obstacle;
pub mod optimizer;
pub mod pathfinder;
pub mod rules;
pub mod spatial;

pub use collision::{collision_intervals, encounter, CollisionChecker, Encounter};
pub use engine::RouteEngine;
pub use error::{Endpoint, PlanError, Result};
pub use models::{
    CollisionInterval, Coordinate, PlanRequest, PlannedRoute, PlanningMode, RouteSegment,
    RouteTiming, SearchQuality, TimedRoute, UnresolvedCollision, VesselConflict, VesselRoute,
    DEFAULT_SPEED_KNOTS,
};
pub use obstacle::{Footprint, ObstacleArea, ObstacleDefinition, ObstacleSet};
pub use optimizer::{unified_cost_minutes, DepartureChoice, DepartureOptimizer, FixedOutcome};
pub use pathfinder::{BestEffortReason, Pathfinder, SearchOutcome, SearchResult, SearchStats};
pub use rules::{AvoidanceRules, DepartureWindow, EngineRules, SafetyRules, SearchRules};
pub use spatial::{bearing_deg, distance_nm, interpolate};
