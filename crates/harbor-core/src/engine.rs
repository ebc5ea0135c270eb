//! Route optimization façade.
//!
//! [`RouteEngine`] is built once from the harbor's obstacle definitions and
//! shared by every planning request. It holds no mutable state: committed
//! routes are passed in per call.

use tracing::{info, warn};

use crate::collision::CollisionChecker;
use crate::error::{Endpoint, PlanError, Result};
use crate::models::{
    Coordinate, PlanRequest, PlannedRoute, PlanningMode, RouteSegment, SearchQuality, TimedRoute,
    VesselRoute,
};
use crate::obstacle::{ObstacleDefinition, ObstacleSet};
use crate::optimizer::{self, DepartureOptimizer};
use crate::pathfinder::{BestEffortReason, Pathfinder, SearchOutcome};
use crate::rules::EngineRules;
use crate::spatial;

#[derive(Debug, Clone)]
pub struct RouteEngine {
    obstacles: ObstacleSet,
    rules: EngineRules,
}

impl RouteEngine {
    /// Validate the obstacle definitions and build the engine.
    pub fn new(definitions: Vec<ObstacleDefinition>, rules: EngineRules) -> Result<Self> {
        let obstacles = ObstacleSet::new(definitions, rules.safety.obstacle_buffer_nm)?;
        info!(obstacles = obstacles.len(), "Route engine ready");
        Ok(Self { obstacles, rules })
    }

    pub fn obstacles(&self) -> &ObstacleSet {
        &self.obstacles
    }

    pub fn rules(&self) -> &EngineRules {
        &self.rules
    }

    pub fn pathfinder(&self) -> Pathfinder<'_> {
        Pathfinder::new(&self.obstacles, &self.rules.search)
    }

    /// Collision checker over this harbor's obstacles and the given committed routes.
    pub fn checker(&self, committed: &[VesselRoute]) -> CollisionChecker<'_> {
        CollisionChecker::new(
            &self.obstacles,
            committed,
            &self.rules.safety,
            self.rules.search.default_speed_knots,
        )
    }

    /// Pair a route with its timing, substituting this engine's fallback speed.
    pub fn timed(&self, route: &VesselRoute) -> TimedRoute {
        route.timed_with(self.rules.search.default_speed_knots)
    }

    fn check_endpoint(&self, endpoint: Endpoint, position: Coordinate) -> Result<()> {
        if !position.is_valid() || self.obstacles.contains_point(position, true) {
            return Err(PlanError::UnsafeEndpoint { endpoint, position });
        }
        Ok(())
    }

    /// Plan a route for one vessel against the currently committed routes.
    pub fn plan(&self, request: &PlanRequest, committed: &[VesselRoute]) -> Result<PlannedRoute> {
        self.check_endpoint(Endpoint::Start, request.start)?;
        self.check_endpoint(Endpoint::Goal, request.goal)?;

        // The vessel's own earlier route is being replaced, never avoided.
        let committed: Vec<VesselRoute> = committed
            .iter()
            .filter(|route| route.vessel_id != request.vessel_id)
            .filter(|route| {
                let problems = route.validate();
                if !problems.is_empty() {
                    warn!(vessel_id = %route.vessel_id, ?problems, "Skipping invalid committed route");
                }
                problems.is_empty()
            })
            .cloned()
            .collect();

        let pathfinder = self.pathfinder();
        let (path, search) = if spatial::distance_nm(request.start, request.goal) < 1e-9 {
            (vec![request.start], SearchQuality::Trivial)
        } else {
            let result = pathfinder.search(request.start, request.goal);
            info!(
                vessel_id = %request.vessel_id,
                iterations = result.stats.iterations,
                nodes_expanded = result.stats.nodes_expanded,
                "Static path search finished"
            );
            match result.outcome {
                SearchOutcome::Optimal(path) => (path, SearchQuality::Optimal),
                SearchOutcome::BestEffort { path, reason } => {
                    let quality = match reason {
                        BestEffortReason::ClosestNode { remaining_nm } => {
                            SearchQuality::BestEffort { remaining_nm }
                        }
                        BestEffortReason::DirectFallback => SearchQuality::DirectFallback,
                    };
                    (path, quality)
                }
                SearchOutcome::NotFound => {
                    return Err(PlanError::NoPathFound {
                        start: request.start,
                        goal: request.goal,
                    });
                }
            }
        };

        let route = VesselRoute::from_parts(
            request.vessel_id.clone(),
            request.name.clone(),
            request.start,
            request.goal,
            path,
            request.departure,
            request.speed_knots,
        );

        let checker = self.checker(&committed);
        let optimizer = DepartureOptimizer::new(&checker, &self.rules);

        let static_path = route.path.clone();
        let (route, collision_risk, added_distance_nm, unified_cost_minutes) = match request.mode
        {
            PlanningMode::Flexible => {
                let choice = optimizer.flexible(&pathfinder, &route);
                (
                    route.with_departure(choice.departure).with_path(choice.path),
                    None,
                    choice.added_distance_nm,
                    choice.unified_cost_minutes,
                )
            }
            PlanningMode::Fixed => {
                let outcome = optimizer.fixed(&pathfinder, &route);
                let cost = optimizer::unified_cost_minutes(
                    0.0,
                    outcome.added_distance_nm,
                    route.effective_speed(self.rules.search.default_speed_knots),
                );
                (
                    route.with_path(outcome.path),
                    outcome.collision_risk,
                    outcome.added_distance_nm,
                    cost,
                )
            }
        };
        let rerouted = route.path != static_path;

        let fallback_speed = self.rules.search.default_speed_knots;
        let timing = route.derive_timing_with(fallback_speed);
        let departure = route.departure;
        let arrival = timing.arrival().unwrap_or(departure);
        let distance_nm = timing.path_length_nm;
        let adjustment = departure - request.departure;
        let direct_distance_nm = spatial::distance_nm(request.start, request.goal);

        if let Some(risk) = &collision_risk {
            warn!(
                vessel_id = %request.vessel_id,
                conflicts = risk.conflicts.len(),
                "Planned route keeps unresolved collision risk"
            );
        }

        let planned = PlannedRoute {
            segments: RouteSegment::from_path(route.waypoints(), timing.speed_knots),
            min_separation_nm: optimizer::min_separation_nm(&checker, &route, fallback_speed),
            detour_ratio: optimizer::detour_ratio(distance_nm, request.start, request.goal),
            duration_minutes: timing.duration_hours() * 60.0,
            mode: request.mode,
            requested_departure: request.departure,
            departure,
            arrival,
            distance_nm,
            departure_adjusted: adjustment.num_seconds() != 0,
            adjustment_minutes: adjustment.num_minutes(),
            search,
            collision_risk,
            direct_distance_nm,
            added_distance_nm,
            unified_cost_minutes,
            rerouted,
            route,
            timing,
        };

        info!(
            vessel_id = %request.vessel_id,
            mode = ?planned.mode,
            distance_nm = planned.distance_nm,
            offset_min = planned.adjustment_minutes,
            waypoints = planned.route.path.len(),
            rerouted = planned.rerouted,
            "Route planned"
        );
        Ok(planned)
    }
}
