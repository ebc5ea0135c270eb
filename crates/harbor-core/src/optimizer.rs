//! Departure-time and fixed-time optimization against committed routes.
//!
//! Flexible mode shifts the departure within a small window and keeps the path,
//! trading delay against a detour when no shift alone clears the traffic.
//! Fixed mode keeps the departure and reroutes around momentary vessel
//! footprints, falling back to the original path with the residual risk
//! reported when no alternative clears every conflict.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::collision::CollisionChecker;
use crate::models::{
    hours_to_duration, Coordinate, TimedRoute, UnresolvedCollision, VesselConflict, VesselRoute,
};
use crate::obstacle::Footprint;
use crate::pathfinder::Pathfinder;
use crate::rules::EngineRules;
use crate::spatial;

/// Unified time cost in minutes: departure delay plus the time the extra
/// distance takes at `speed_knots`.
pub fn unified_cost_minutes(delay_minutes: f64, detour_nm: f64, speed_knots: f64) -> f64 {
    let detour_minutes = if speed_knots > 0.0 {
        detour_nm.max(0.0) / speed_knots * 60.0
    } else {
        0.0
    };
    delay_minutes.abs() + detour_minutes
}

/// Outcome of the flexible departure search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartureChoice {
    pub offset_minutes: i64,
    pub departure: DateTime<Utc>,
    /// Path flown at this departure; a detour when shifting alone was not enough.
    pub path: Vec<Coordinate>,
    pub added_distance_nm: f64,
    pub unified_cost_minutes: f64,
    /// Committed routes still in conflict at this departure.
    pub conflict_count: usize,
    /// Closest approach to any committed vessel, `None` when no route overlaps in time.
    pub min_distance_nm: Option<f64>,
}

/// A collision-free fixed-time alternative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub path: Vec<Coordinate>,
    pub added_distance_nm: f64,
    pub unified_cost_minutes: f64,
    pub avoidance_radius_nm: f64,
    pub check_time: DateTime<Utc>,
}

/// Outcome of fixed-time optimization.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedOutcome {
    pub path: Vec<Coordinate>,
    pub added_distance_nm: f64,
    pub collision_risk: Option<UnresolvedCollision>,
    /// Every collision-free alternative found, cheapest first.
    pub alternatives: Vec<Alternative>,
}

/// Optimizes one new route against the committed routes held by a checker.
pub struct DepartureOptimizer<'c, 'a> {
    checker: &'c CollisionChecker<'a>,
    rules: &'c EngineRules,
}

impl<'c, 'a> DepartureOptimizer<'c, 'a> {
    pub fn new(checker: &'c CollisionChecker<'a>, rules: &'c EngineRules) -> Self {
        Self { checker, rules }
    }

    fn timed(&self, route: &VesselRoute) -> TimedRoute {
        route.timed_with(self.rules.search.default_speed_knots)
    }

    /// Conflict count and closest approach for a candidate.
    fn evaluate(&self, candidate: &TimedRoute) -> (usize, Option<f64>) {
        let encounters = self.checker.encounters(candidate);
        let conflicts = encounters.iter().filter(|enc| enc.is_conflict()).count();
        let min_distance = encounters
            .iter()
            .map(|enc| enc.min_distance_nm)
            .filter(|d| d.is_finite())
            .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |m| m.min(d))));
        (conflicts, min_distance)
    }

    /// Pick the departure offset with the fewest conflicts, then the largest
    /// closest approach, then the earliest offset. When every offset still
    /// conflicts, detours are tried at each offset and the cheapest
    /// collision-free pair by unified cost wins.
    pub fn flexible(&self, pathfinder: &Pathfinder<'_>, route: &VesselRoute) -> DepartureChoice {
        let requested = route.departure;
        let unchanged = DepartureChoice {
            offset_minutes: 0,
            departure: requested,
            path: route.path.clone(),
            added_distance_nm: 0.0,
            unified_cost_minutes: 0.0,
            conflict_count: 0,
            min_distance_nm: None,
        };

        if self.checker.committed().is_empty() {
            return unchanged;
        }

        let mut best: Option<DepartureChoice> = None;
        for offset in self.rules.departure_window.offsets() {
            let departure = requested + Duration::minutes(offset);
            let (conflict_count, min_distance_nm) =
                self.evaluate(&self.timed(&route.with_departure(departure)));
            debug!(
                vessel_id = %route.vessel_id,
                offset_min = offset,
                conflicts = conflict_count,
                min_distance_nm = min_distance_nm.unwrap_or(f64::INFINITY),
                "Evaluated departure offset"
            );

            let candidate = DepartureChoice {
                offset_minutes: offset,
                departure,
                path: route.path.clone(),
                added_distance_nm: 0.0,
                unified_cost_minutes: unified_cost_minutes(offset as f64, 0.0, 0.0),
                conflict_count,
                min_distance_nm,
            };
            let better = match &best {
                None => true,
                Some(current) => is_better_departure(&candidate, current),
            };
            if better {
                best = Some(candidate);
            }
        }

        let choice = best.unwrap_or(unchanged);
        if choice.conflict_count == 0 {
            info!(
                vessel_id = %route.vessel_id,
                offset_min = choice.offset_minutes,
                "Selected departure offset"
            );
            return choice;
        }

        match self.delay_with_detour(pathfinder, route) {
            Some(detour) => {
                info!(
                    vessel_id = %route.vessel_id,
                    offset_min = detour.offset_minutes,
                    added_distance_nm = detour.added_distance_nm,
                    cost_min = detour.unified_cost_minutes,
                    "Selected departure offset with detour"
                );
                detour
            }
            None => {
                warn!(
                    vessel_id = %route.vessel_id,
                    offset_min = choice.offset_minutes,
                    conflicts = choice.conflict_count,
                    "No conflict-free departure in window"
                );
                choice
            }
        }
    }

    /// Cheapest collision-free (offset, detour) pair over the window.
    fn delay_with_detour(
        &self,
        pathfinder: &Pathfinder<'_>,
        route: &VesselRoute,
    ) -> Option<DepartureChoice> {
        let mut best: Option<DepartureChoice> = None;
        for offset in self.rules.departure_window.offsets() {
            let shifted = route.with_departure(route.departure + Duration::minutes(offset));
            let conflicts = self.checker.conflicts(&self.timed(&shifted));
            let alternatives = self.alternatives(pathfinder, &shifted, &conflicts, offset as f64);
            let Some(cheapest) = alternatives.into_iter().next() else {
                continue;
            };

            let better = best.as_ref().map_or(true, |current| {
                cheapest.unified_cost_minutes < current.unified_cost_minutes - 1e-9
            });
            if better {
                let (_, min_distance_nm) =
                    self.evaluate(&self.timed(&shifted.with_path(cheapest.path.clone())));
                best = Some(DepartureChoice {
                    offset_minutes: offset,
                    departure: shifted.departure,
                    path: cheapest.path,
                    added_distance_nm: cheapest.added_distance_nm,
                    unified_cost_minutes: cheapest.unified_cost_minutes,
                    conflict_count: 0,
                    min_distance_nm,
                });
            }
        }
        best
    }

    /// Keep the departure and reroute around committed vessels if needed.
    pub fn fixed(&self, pathfinder: &Pathfinder<'_>, route: &VesselRoute) -> FixedOutcome {
        let conflicts = self.checker.conflicts(&self.timed(route));
        if conflicts.is_empty() {
            return FixedOutcome {
                path: route.path.clone(),
                added_distance_nm: 0.0,
                collision_risk: None,
                alternatives: Vec::new(),
            };
        }

        let alternatives = self.alternatives(pathfinder, route, &conflicts, 0.0);
        match alternatives.first() {
            Some(best) => {
                info!(
                    vessel_id = %route.vessel_id,
                    alternatives = alternatives.len(),
                    added_distance_nm = best.added_distance_nm,
                    avoidance_radius_nm = best.avoidance_radius_nm,
                    "Selected fixed-time alternative"
                );
                FixedOutcome {
                    path: best.path.clone(),
                    added_distance_nm: best.added_distance_nm,
                    collision_risk: None,
                    alternatives,
                }
            }
            None => {
                warn!(
                    vessel_id = %route.vessel_id,
                    conflicts = conflicts.len(),
                    "No collision-free alternative; keeping original path"
                );
                FixedOutcome {
                    path: route.path.clone(),
                    added_distance_nm: 0.0,
                    collision_risk: Some(UnresolvedCollision { conflicts }),
                    alternatives,
                }
            }
        }
    }

    /// Collision-free detours for `route` at its own departure, cheapest first.
    ///
    /// Check times are the midpoints of the detected conflict intervals plus the
    /// configured journey fractions; each is combined with every radius factor.
    fn alternatives(
        &self,
        pathfinder: &Pathfinder<'_>,
        route: &VesselRoute,
        conflicts: &[VesselConflict],
        delay_minutes: f64,
    ) -> Vec<Alternative> {
        let original = self.timed(route);
        let original_nm = original.timing.path_length_nm;
        let speed = original.timing.speed_knots;
        let journey_hours = original.timing.duration_hours();

        let mut check_times: Vec<DateTime<Utc>> = conflicts
            .iter()
            .flat_map(|conflict| conflict.intervals.iter().map(|iv| iv.midpoint()))
            .collect();
        check_times.extend(
            self.rules
                .avoidance
                .journey_fractions
                .iter()
                .map(|fraction| route.departure + hours_to_duration(journey_hours * fraction)),
        );
        check_times.sort();
        check_times.dedup();
        debug!(
            vessel_id = %route.vessel_id,
            conflicts = conflicts.len(),
            check_times = check_times.len(),
            delay_min = delay_minutes,
            "Searching avoidance alternatives"
        );

        let mut alternatives: Vec<Alternative> = Vec::new();
        for &check_time in &check_times {
            for factor in &self.rules.avoidance.radius_factors {
                let radius_nm = self.checker.collision_radius_nm() * factor;
                let footprints = self.footprints_at(check_time, radius_nm, route);
                if footprints.is_empty() {
                    continue;
                }

                let finder = pathfinder.clone().with_footprints(footprints);
                let Some(path) = finder.search(route.start, route.goal).outcome.into_path() else {
                    continue;
                };
                if path == route.path || path.last() != Some(&route.goal) {
                    continue;
                }

                let candidate = self.timed(&route.with_path(path.clone()));
                if !self.checker.conflicts(&candidate).is_empty() {
                    continue;
                }

                let added_distance_nm = candidate.timing.path_length_nm - original_nm;
                alternatives.push(Alternative {
                    path,
                    added_distance_nm,
                    unified_cost_minutes: unified_cost_minutes(
                        delay_minutes,
                        added_distance_nm,
                        speed,
                    ),
                    avoidance_radius_nm: radius_nm,
                    check_time,
                });
            }
        }

        alternatives.sort_by(|a, b| {
            a.unified_cost_minutes
                .total_cmp(&b.unified_cost_minutes)
                .then_with(|| a.added_distance_nm.total_cmp(&b.added_distance_nm))
        });
        alternatives
    }

    /// Committed vessel positions at `time` as circular obstacles. Footprints
    /// covering the route's own endpoints are left out.
    fn footprints_at(
        &self,
        time: DateTime<Utc>,
        radius_nm: f64,
        route: &VesselRoute,
    ) -> Vec<Footprint> {
        self.checker
            .committed()
            .iter()
            .filter_map(|other| other.position_at(time))
            .map(|center| Footprint { center, radius_nm })
            .filter(|fp| !fp.contains_point(route.start) && !fp.contains_point(route.goal))
            .collect()
    }
}

fn is_better_departure(candidate: &DepartureChoice, current: &DepartureChoice) -> bool {
    if candidate.conflict_count != current.conflict_count {
        return candidate.conflict_count < current.conflict_count;
    }
    let candidate_min = candidate.min_distance_nm.unwrap_or(f64::INFINITY);
    let current_min = current.min_distance_nm.unwrap_or(f64::INFINITY);
    // Earlier offsets win unless the separation gain is meaningful.
    candidate_min > current_min + 1e-9
}

/// Closest approach of a candidate path to any committed vessel at `departure`.
pub fn min_separation_nm(
    checker: &CollisionChecker<'_>,
    route: &VesselRoute,
    fallback_speed: f64,
) -> Option<f64> {
    checker
        .encounters(&route.timed_with(fallback_speed))
        .iter()
        .map(|enc| enc.min_distance_nm)
        .filter(|d| d.is_finite())
        .reduce(f64::min)
}

/// Straight-line reference used for detour reporting.
pub fn detour_ratio(path_nm: f64, start: Coordinate, goal: Coordinate) -> f64 {
    let direct = spatial::distance_nm(start, goal);
    if direct > 1e-9 {
        path_nm / direct
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obstacle::ObstacleSet;
    use chrono::TimeZone;

    const CENTER: Coordinate = Coordinate::new(35.90, 129.60);

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 5, 0, 0).unwrap()
    }

    fn route_through_center(id: &str, bearing: f64, departure: DateTime<Utc>) -> VesselRoute {
        let start = spatial::offset_by_bearing(CENTER, 2.5, bearing + 180.0);
        let goal = spatial::offset_by_bearing(CENTER, 2.5, bearing);
        VesselRoute::new(id, id, vec![start, goal], departure, 10.0).unwrap()
    }

    #[test]
    fn unified_cost_adds_delay_and_detour_time() {
        assert_eq!(unified_cost_minutes(-4.0, 0.0, 10.0), 4.0);
        assert!((unified_cost_minutes(2.0, 1.0, 10.0) - 8.0).abs() < 1e-12);
        // a shorter path is never a negative cost
        assert_eq!(unified_cost_minutes(0.0, -0.5, 10.0), 0.0);
    }

    #[test]
    fn flexible_without_traffic_keeps_requested_time() {
        let obstacles = ObstacleSet::empty();
        let rules = EngineRules::default();
        let checker = CollisionChecker::new(&obstacles, &[], &rules.safety, 10.0);
        let optimizer = DepartureOptimizer::new(&checker, &rules);
        let pathfinder = Pathfinder::new(&obstacles, &rules.search);

        let candidate = route_through_center("N", 0.0, t0());
        let choice = optimizer.flexible(&pathfinder, &candidate);
        assert_eq!(choice.offset_minutes, 0);
        assert_eq!(choice.departure, t0());
        assert_eq!(choice.path, candidate.path);
        assert_eq!(choice.unified_cost_minutes, 0.0);
    }

    #[test]
    fn flexible_avoids_crossing_vessel() {
        let obstacles = ObstacleSet::empty();
        let rules = EngineRules::default();
        // Committed vessel crosses the center 15 minutes after t0.
        let committed = vec![route_through_center("E", 90.0, t0())];
        let checker = CollisionChecker::new(&obstacles, &committed, &rules.safety, 10.0);
        let optimizer = DepartureOptimizer::new(&checker, &rules);
        let pathfinder = Pathfinder::new(&obstacles, &rules.search);

        // Requested so that +3 minutes still meets the committed vessel head on.
        let candidate = route_through_center("N", 0.0, t0() - Duration::minutes(3));
        let choice = optimizer.flexible(&pathfinder, &candidate);

        assert!(rules.departure_window.contains(choice.offset_minutes));
        assert_eq!(choice.conflict_count, 0);
        assert!(choice.min_distance_nm.unwrap() >= rules.safety.collision_radius_nm);
        assert_eq!(choice.departure, candidate.departure + Duration::minutes(choice.offset_minutes));
        // shifting alone clears it, so the path is kept
        assert_eq!(choice.path, candidate.path);
        assert_eq!(choice.unified_cost_minutes, choice.offset_minutes as f64);
    }

    #[test]
    fn tie_break_prefers_earliest_offset() {
        let earlier = DepartureChoice {
            offset_minutes: 3,
            departure: t0(),
            path: Vec::new(),
            added_distance_nm: 0.0,
            unified_cost_minutes: 3.0,
            conflict_count: 0,
            min_distance_nm: Some(2.0),
        };
        let later = DepartureChoice {
            offset_minutes: 4,
            min_distance_nm: Some(2.0),
            ..earlier.clone()
        };
        assert!(!is_better_departure(&later, &earlier));
        let wider = DepartureChoice {
            min_distance_nm: Some(2.5),
            ..later.clone()
        };
        assert!(is_better_departure(&wider, &earlier));
        let conflicted = DepartureChoice {
            conflict_count: 1,
            min_distance_nm: Some(9.0),
            ..later
        };
        assert!(!is_better_departure(&conflicted, &earlier));
    }

    #[test]
    fn flexible_trades_delay_for_detour_when_no_shift_clears() {
        let obstacles = ObstacleSet::empty();
        let mut rules = EngineRules::default();
        rules.departure_window.min_offset_minutes = 3;
        rules.departure_window.max_offset_minutes = 4;
        rules.avoidance.radius_factors = vec![1.3];
        rules.avoidance.journey_fractions = vec![0.5];
        rules.search.grid_resolution_deg = 0.0005;
        rules.search.max_iterations = 50_000;
        // Loitering on the track for the whole window: no delay alone helps.
        let loiter_end = spatial::offset_by_bearing(CENTER, 0.01, 90.0);
        let committed =
            vec![VesselRoute::new("L", "loiter", vec![CENTER, loiter_end], t0(), 0.01).unwrap()];
        let checker = CollisionChecker::new(&obstacles, &committed, &rules.safety, 10.0);
        let optimizer = DepartureOptimizer::new(&checker, &rules);
        let pathfinder = Pathfinder::new(&obstacles, &rules.search);

        let start = spatial::offset_by_bearing(CENTER, 0.8, 180.0);
        let goal = spatial::offset_by_bearing(CENTER, 0.8, 0.0);
        let candidate = VesselRoute::new("N", "N", vec![start, goal], t0(), 10.0).unwrap();
        for offset in rules.departure_window.offsets() {
            let shifted = candidate.with_departure(t0() + Duration::minutes(offset));
            assert!(!checker.conflicts(&shifted.timed()).is_empty());
        }

        let choice = optimizer.flexible(&pathfinder, &candidate);

        assert_eq!(choice.conflict_count, 0);
        assert!(rules.departure_window.contains(choice.offset_minutes));
        assert_ne!(choice.path, candidate.path);
        assert_eq!(choice.path.first(), Some(&start));
        assert_eq!(choice.path.last(), Some(&goal));
        assert!(choice.added_distance_nm > 0.0);
        let expected = unified_cost_minutes(choice.offset_minutes as f64, choice.added_distance_nm, 10.0);
        assert!((choice.unified_cost_minutes - expected).abs() < 1e-9);
        assert!(choice.unified_cost_minutes > choice.offset_minutes as f64);

        let flown = candidate
            .with_departure(choice.departure)
            .with_path(choice.path.clone())
            .timed();
        assert!(checker.conflicts(&flown).is_empty());
    }

    #[test]
    fn fixed_keeps_conflict_free_path_unchanged() {
        let obstacles = ObstacleSet::empty();
        let rules = EngineRules::default();
        let committed = vec![route_through_center("E", 90.0, t0() + Duration::hours(2))];
        let checker = CollisionChecker::new(&obstacles, &committed, &rules.safety, 10.0);
        let optimizer = DepartureOptimizer::new(&checker, &rules);
        let pathfinder = Pathfinder::new(&obstacles, &rules.search);

        let candidate = route_through_center("N", 0.0, t0());
        let outcome = optimizer.fixed(&pathfinder, &candidate);
        assert_eq!(outcome.path, candidate.path);
        assert!(outcome.collision_risk.is_none());
        assert_eq!(outcome.added_distance_nm, 0.0);
    }

    #[test]
    fn fixed_reroutes_around_slow_crossing_vessel() {
        let obstacles = ObstacleSet::empty();
        let mut rules = EngineRules::default();
        rules.avoidance.radius_factors = vec![1.3];
        rules.avoidance.journey_fractions = vec![0.5];
        rules.search.grid_resolution_deg = 0.0005;
        rules.search.max_iterations = 50_000;
        // A near-stationary vessel loitering on the candidate's track.
        let loiter_end = spatial::offset_by_bearing(CENTER, 0.01, 90.0);
        let committed =
            vec![VesselRoute::new("L", "loiter", vec![CENTER, loiter_end], t0(), 0.01).unwrap()];
        let checker = CollisionChecker::new(&obstacles, &committed, &rules.safety, 10.0);
        let optimizer = DepartureOptimizer::new(&checker, &rules);
        let pathfinder = Pathfinder::new(&obstacles, &rules.search);

        let start = spatial::offset_by_bearing(CENTER, 0.8, 180.0);
        let goal = spatial::offset_by_bearing(CENTER, 0.8, 0.0);
        let candidate = VesselRoute::new("N", "N", vec![start, goal], t0(), 10.0).unwrap();
        let outcome = optimizer.fixed(&pathfinder, &candidate);

        assert!(outcome.collision_risk.is_none(), "{:?}", outcome.collision_risk);
        assert_ne!(outcome.path, candidate.path);
        assert!(outcome.added_distance_nm > 0.0);
        assert_eq!(outcome.path.first(), Some(&start));
        assert_eq!(outcome.path.last(), Some(&goal));
        let rerouted = candidate.with_path(outcome.path.clone()).timed();
        assert!(checker.conflicts(&rerouted).is_empty());
        assert!(outcome
            .alternatives
            .windows(2)
            .all(|w| w[0].unified_cost_minutes <= w[1].unified_cost_minutes));
    }

    #[test]
    fn fixed_reports_unresolved_risk_when_blocked() {
        let obstacles = ObstacleSet::empty();
        let rules = EngineRules::default();
        // The committed vessel sits on the candidate's goal: every footprint
        // covering the goal is dropped, so nothing can clear the conflict.
        let start = spatial::offset_by_bearing(CENTER, 1.0, 180.0);
        let loiter_end = spatial::offset_by_bearing(CENTER, 0.01, 90.0);
        let committed =
            vec![VesselRoute::new("L", "moored", vec![CENTER, loiter_end], t0(), 0.01).unwrap()];
        let checker = CollisionChecker::new(&obstacles, &committed, &rules.safety, 10.0);
        let optimizer = DepartureOptimizer::new(&checker, &rules);
        let pathfinder = Pathfinder::new(&obstacles, &rules.search);

        let candidate = VesselRoute::new("N", "N", vec![start, CENTER], t0(), 10.0).unwrap();
        let outcome = optimizer.fixed(&pathfinder, &candidate);

        assert_eq!(outcome.path, candidate.path);
        let risk = outcome.collision_risk.expect("residual risk reported");
        assert_eq!(risk.conflicts.len(), 1);
        assert_eq!(risk.conflicts[0].vessel_id, "L");
        assert!(!risk.conflicts[0].intervals.is_empty());
    }

    #[test]
    fn detour_ratio_of_straight_line_is_one() {
        let a = Coordinate::new(35.9, 129.6);
        let b = spatial::offset_by_bearing(a, 3.0, 45.0);
        assert!((detour_ratio(3.0, a, b) - 1.0).abs() < 1e-9);
        assert_eq!(detour_ratio(0.0, a, a), 1.0);
    }
}
