//! Collision checking against obstacles and committed vessel routes.

use chrono::{DateTime, Duration, Utc};
use tracing::trace;

use crate::models::{
    hours_to_duration, seconds_between, CollisionInterval, Coordinate, TimedRoute, VesselConflict,
    VesselRoute,
};
use crate::obstacle::ObstacleSet;
use crate::rules::SafetyRules;
use crate::spatial;

/// Pairwise scan result between two timed routes.
#[derive(Debug, Clone, PartialEq)]
pub struct Encounter {
    /// Spans where the vessels were closer than the collision radius.
    pub intervals: Vec<CollisionInterval>,
    /// Smallest sampled separation, `f64::INFINITY` when the routes never overlap in time.
    pub min_distance_nm: f64,
    pub closest_time: Option<DateTime<Utc>>,
}

impl Encounter {
    fn none() -> Self {
        Self {
            intervals: Vec::new(),
            min_distance_nm: f64::INFINITY,
            closest_time: None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        !self.intervals.is_empty()
    }
}

/// Scan the overlapping time window of two routes at a fixed step.
///
/// Contiguous unsafe samples are merged into one interval running from the
/// first to the last unsafe sample.
pub fn encounter(a: &TimedRoute, b: &TimedRoute, step: Duration, radius_nm: f64) -> Encounter {
    let start = a.departure().max(b.departure());
    let end = a.arrival().min(b.arrival());
    if start > end {
        return Encounter::none();
    }

    let step_secs = seconds_between(start, start + step).max(1.0);
    let window_secs = seconds_between(start, end);
    let steps = (window_secs / step_secs).floor() as i64;

    let mut times: Vec<DateTime<Utc>> = (0..=steps)
        .map(|i| start + hours_to_duration(i as f64 * step_secs / 3600.0))
        .collect();
    if times.last().is_some_and(|last| *last < end) {
        times.push(end);
    }

    let mut result = Encounter::none();
    let mut open: Option<CollisionInterval> = None;

    for t in times {
        let (Some(pa), Some(pb)) = (a.position_at(t), b.position_at(t)) else {
            continue;
        };
        let distance = spatial::distance_nm(pa, pb);
        if distance < result.min_distance_nm {
            result.min_distance_nm = distance;
            result.closest_time = Some(t);
        }

        if distance < radius_nm {
            match open.as_mut() {
                Some(interval) => interval.end = t,
                None => open = Some(CollisionInterval { start: t, end: t }),
            }
        } else if let Some(interval) = open.take() {
            result.intervals.push(interval);
        }
    }
    if let Some(interval) = open {
        result.intervals.push(interval);
    }

    result
}

/// Time spans during which `a` and `b` come closer than `radius_nm`.
pub fn collision_intervals(
    a: &TimedRoute,
    b: &TimedRoute,
    step: Duration,
    radius_nm: f64,
) -> Vec<CollisionInterval> {
    encounter(a, b, step, radius_nm).intervals
}

/// Checks candidate positions and routes against obstacles and committed routes.
///
/// Assembled per planning request; holds no state beyond its inputs.
#[derive(Debug, Clone)]
pub struct CollisionChecker<'a> {
    obstacles: &'a ObstacleSet,
    committed: Vec<TimedRoute>,
    rules: SafetyRules,
}

impl<'a> CollisionChecker<'a> {
    pub fn new(
        obstacles: &'a ObstacleSet,
        committed: &[VesselRoute],
        rules: &SafetyRules,
        fallback_speed: f64,
    ) -> Self {
        let committed = committed
            .iter()
            .map(|route| route.timed_with(fallback_speed))
            .collect();
        Self {
            obstacles,
            committed,
            rules: rules.clone(),
        }
    }

    pub fn obstacles(&self) -> &ObstacleSet {
        self.obstacles
    }

    pub fn committed(&self) -> &[TimedRoute] {
        &self.committed
    }

    pub fn collision_radius_nm(&self) -> f64 {
        self.rules.collision_radius_nm
    }

    fn encounter_step(&self) -> Duration {
        hours_to_duration(self.rules.encounter_step_minutes.max(1.0 / 60.0) / 60.0)
    }

    /// False if `coord` is in an obstacle, or within the collision radius of
    /// any committed vessel at `at_time`.
    pub fn is_position_safe(
        &self,
        coord: Coordinate,
        at_time: Option<DateTime<Utc>>,
        ignore_buffer: bool,
    ) -> bool {
        if self.obstacles.contains_point(coord, ignore_buffer) {
            return false;
        }

        let Some(time) = at_time else {
            return true;
        };
        self.committed.iter().all(|route| {
            route
                .position_at(time)
                .map_or(true, |pos| {
                    spatial::distance_nm(coord, pos) >= self.rules.collision_radius_nm
                })
        })
    }

    /// False if the segment crosses an obstacle; with timing, every sample
    /// along the segment must also be clear of committed vessels.
    pub fn is_path_safe(
        &self,
        from: Coordinate,
        to: Coordinate,
        start_time: Option<DateTime<Utc>>,
        travel_hours: Option<f64>,
    ) -> bool {
        if self.obstacles.intersects_segment(from, to, false) {
            return false;
        }

        let (Some(start_time), Some(travel_hours)) = (start_time, travel_hours) else {
            return true;
        };
        let travel_hours = if travel_hours.is_finite() {
            travel_hours.max(0.0)
        } else {
            0.0
        };
        let interval = self.rules.position_sample_hours.max(1e-3);
        let samples = ((travel_hours / interval).ceil() as usize + 1).max(2);

        (0..samples).all(|i| {
            let fraction = i as f64 / (samples - 1) as f64;
            let position = spatial::interpolate(from, to, fraction);
            let time = start_time + hours_to_duration(travel_hours * fraction);
            self.is_position_safe(position, Some(time), false)
        })
    }

    /// Encounter of `candidate` with every committed route, in committed order.
    pub fn encounters(&self, candidate: &TimedRoute) -> Vec<Encounter> {
        let step = self.encounter_step();
        self.committed
            .iter()
            .map(|other| encounter(candidate, other, step, self.rules.collision_radius_nm))
            .collect()
    }

    /// Committed vessels that `candidate` still comes too close to.
    pub fn conflicts(&self, candidate: &TimedRoute) -> Vec<VesselConflict> {
        let conflicts: Vec<VesselConflict> = self
            .committed
            .iter()
            .zip(self.encounters(candidate))
            .filter(|(_, enc)| enc.is_conflict())
            .map(|(other, enc)| VesselConflict {
                vessel_id: other.route.vessel_id.clone(),
                name: other.route.name.clone(),
                intervals: enc.intervals,
                min_distance_nm: enc.min_distance_nm,
            })
            .collect();
        trace!(
            vessel_id = %candidate.route.vessel_id,
            conflicts = conflicts.len(),
            "Scanned committed routes"
        );
        conflicts
    }
}
