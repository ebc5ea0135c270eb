//! Core data models for harbor route planning.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::spatial;

/// Speed substituted when a route carries a zero, negative or non-finite speed.
pub const DEFAULT_SPEED_KNOTS: f64 = 10.0;

/// A geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    #[serde(alias = "lon")]
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// Whether the coordinate is a usable position on the globe.
    pub fn is_valid(&self) -> bool {
        self.is_finite() && self.lat.abs() <= 90.0 && self.lng.abs() <= 180.0
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// A vessel's planned passage: identity, endpoints, waypoints, departure and speed.
///
/// The value is immutable once built. Timing is derived on demand with
/// [`VesselRoute::derive_timing`] and never cached on the route itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselRoute {
    pub vessel_id: String,
    #[serde(default)]
    pub name: String,
    pub start: Coordinate,
    pub goal: Coordinate,
    #[serde(default)]
    pub path: Vec<Coordinate>,
    pub departure: DateTime<Utc>,
    #[serde(default = "default_speed")]
    pub speed_knots: f64,
}

fn default_speed() -> f64 {
    DEFAULT_SPEED_KNOTS
}

impl VesselRoute {
    pub fn new(
        vessel_id: impl Into<String>,
        name: impl Into<String>,
        path: Vec<Coordinate>,
        departure: DateTime<Utc>,
        speed_knots: f64,
    ) -> Option<Self> {
        let start = *path.first()?;
        let goal = *path.last()?;
        Some(Self {
            vessel_id: vessel_id.into(),
            name: name.into(),
            start,
            goal,
            path,
            departure,
            speed_knots,
        })
    }

    /// Rebuild a committed route from stored parts.
    ///
    /// Stored routes may have lost their waypoint list; those are kept as a
    /// single-point route at `start`.
    pub fn from_parts(
        vessel_id: impl Into<String>,
        name: impl Into<String>,
        start: Coordinate,
        goal: Coordinate,
        path: Vec<Coordinate>,
        departure: DateTime<Utc>,
        speed_knots: f64,
    ) -> Self {
        Self {
            vessel_id: vessel_id.into(),
            name: name.into(),
            start,
            goal,
            path,
            departure,
            speed_knots,
        }
    }

    /// Same route with a different departure time.
    pub fn with_departure(&self, departure: DateTime<Utc>) -> Self {
        Self {
            departure,
            ..self.clone()
        }
    }

    /// Same route with a different waypoint list.
    pub fn with_path(&self, path: Vec<Coordinate>) -> Self {
        Self {
            path,
            ..self.clone()
        }
    }

    /// Waypoints used for timing: the stored path, or `[start]` when it is empty.
    pub fn waypoints(&self) -> &[Coordinate] {
        if self.path.is_empty() {
            std::slice::from_ref(&self.start)
        } else {
            &self.path
        }
    }

    /// Speed used for timing, substituting `fallback` for unusable values.
    pub fn effective_speed(&self, fallback: f64) -> f64 {
        if self.speed_knots.is_finite() && self.speed_knots > 0.0 {
            self.speed_knots
        } else if fallback.is_finite() && fallback > 0.0 {
            fallback
        } else {
            DEFAULT_SPEED_KNOTS
        }
    }

    /// Derive per-waypoint arrival times and the total path length.
    pub fn derive_timing(&self) -> RouteTiming {
        self.derive_timing_with(DEFAULT_SPEED_KNOTS)
    }

    /// Like [`derive_timing`](Self::derive_timing) with an explicit fallback speed.
    pub fn derive_timing_with(&self, fallback_speed: f64) -> RouteTiming {
        let speed = self.effective_speed(fallback_speed);
        let waypoints = self.waypoints();

        let mut timestamps = Vec::with_capacity(waypoints.len());
        timestamps.push(self.departure);

        let mut total_nm = 0.0;
        for pair in waypoints.windows(2) {
            total_nm += spatial::distance_nm(pair[0], pair[1]);
            timestamps.push(self.departure + hours_to_duration(total_nm / speed));
        }

        RouteTiming {
            timestamps,
            path_length_nm: total_nm,
            speed_knots: speed,
        }
    }

    /// Pair the route with its derived timing, falling back to
    /// [`DEFAULT_SPEED_KNOTS`]. Use [`VesselRoute::timed_with`] (or
    /// `RouteEngine::timed`) to honour a configured fallback speed.
    pub fn timed(&self) -> TimedRoute {
        TimedRoute::new(self.clone())
    }

    pub fn timed_with(&self, fallback_speed: f64) -> TimedRoute {
        let timing = self.derive_timing_with(fallback_speed);
        TimedRoute {
            route: self.clone(),
            timing,
        }
    }

    /// Problems that make the route unusable as a committed route.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.vessel_id.trim().is_empty() {
            errors.push("Vessel id must not be empty".to_string());
        }
        if !self.start.is_valid() {
            errors.push(format!("Start {} is not a valid position", self.start));
        }
        if !self.goal.is_valid() {
            errors.push(format!("Goal {} is not a valid position", self.goal));
        }
        if let Some(index) = self.path.iter().position(|p| !p.is_valid()) {
            errors.push(format!("Waypoint {} is not a valid position", index));
        }

        errors
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

/// Timing derived from a route: one timestamp per waypoint plus total length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteTiming {
    pub timestamps: Vec<DateTime<Utc>>,
    pub path_length_nm: f64,
    /// Speed actually used, after any fallback substitution.
    pub speed_knots: f64,
}

impl RouteTiming {
    pub fn departure(&self) -> Option<DateTime<Utc>> {
        self.timestamps.first().copied()
    }

    pub fn arrival(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }

    pub fn duration_hours(&self) -> f64 {
        self.path_length_nm / self.speed_knots
    }
}

/// A route together with its derived timing, ready for time-based queries.
#[derive(Debug, Clone)]
pub struct TimedRoute {
    pub route: VesselRoute,
    pub timing: RouteTiming,
}

impl TimedRoute {
    /// Derive timing with the crate default fallback speed.
    pub fn new(route: VesselRoute) -> Self {
        let timing = route.derive_timing();
        Self { route, timing }
    }

    pub fn departure(&self) -> DateTime<Utc> {
        self.route.departure
    }

    pub fn arrival(&self) -> DateTime<Utc> {
        self.timing.arrival().unwrap_or(self.route.departure)
    }

    pub fn waypoints(&self) -> &[Coordinate] {
        self.route.waypoints()
    }

    /// Position at `time`: `None` before departure, the final waypoint once
    /// the passage is complete, otherwise interpolated along the active leg.
    pub fn position_at(&self, time: DateTime<Utc>) -> Option<Coordinate> {
        let waypoints = self.route.waypoints();
        let timestamps = &self.timing.timestamps;

        if time < self.route.departure {
            return None;
        }
        let last = *waypoints.last()?;
        if waypoints.len() < 2 || time >= self.arrival() {
            return Some(last);
        }

        // First leg whose end time lies after `time`.
        let end_idx = timestamps
            .iter()
            .position(|ts| *ts > time)
            .unwrap_or(timestamps.len() - 1)
            .max(1);
        let start_idx = end_idx - 1;

        let leg_secs = seconds_between(timestamps[start_idx], timestamps[end_idx]);
        if leg_secs <= 0.0 {
            return Some(waypoints[end_idx]);
        }
        let fraction =
            (seconds_between(timestamps[start_idx], time) / leg_secs).clamp(0.0, 1.0);
        Some(spatial::interpolate(
            waypoints[start_idx],
            waypoints[end_idx],
            fraction,
        ))
    }
}

/// Convert fractional hours to a chrono duration (microsecond precision).
pub fn hours_to_duration(hours: f64) -> Duration {
    if !hours.is_finite() {
        return Duration::zero();
    }
    Duration::microseconds((hours * 3_600_000_000.0).round() as i64)
}

/// Seconds from `from` to `to` as a float (negative when `to` is earlier).
pub fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1000.0,
    }
}

/// How the departure time may be treated while planning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanningMode {
    /// Departure may shift within the configured window.
    #[default]
    Flexible,
    /// Departure is locked; the path is reshaped instead.
    Fixed,
}

/// A single planning request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub vessel_id: String,
    #[serde(default)]
    pub name: String,
    pub start: Coordinate,
    pub goal: Coordinate,
    pub departure: DateTime<Utc>,
    #[serde(default = "default_speed")]
    pub speed_knots: f64,
    #[serde(default)]
    pub mode: PlanningMode,
}

/// How the static-obstacle search concluded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchQuality {
    /// The search reached the goal.
    Optimal,
    /// Iteration budget ran out; the path ends at the closest node reached.
    BestEffort { remaining_nm: f64 },
    /// The search failed and a direct path with avoidance waypoints was used.
    DirectFallback,
    /// Start and goal coincide; no search was needed.
    Trivial,
}

/// A time span during which two vessels are closer than the collision radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CollisionInterval {
    pub fn midpoint(&self) -> DateTime<Utc> {
        self.start + (self.end - self.start) / 2
    }
}

/// Residual conflict with one committed vessel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselConflict {
    pub vessel_id: String,
    pub name: String,
    pub intervals: Vec<CollisionInterval>,
    pub min_distance_nm: f64,
}

/// Collision risk left unresolved by fixed-time planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedCollision {
    pub conflicts: Vec<VesselConflict>,
}

/// One leg of a planned route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSegment {
    pub from: Coordinate,
    pub to: Coordinate,
    pub distance_nm: f64,
    pub duration_minutes: f64,
    pub speed_knots: f64,
    pub bearing_deg: f64,
}

impl RouteSegment {
    /// Break a path into legs sailed at `speed_knots`.
    pub fn from_path(path: &[Coordinate], speed_knots: f64) -> Vec<Self> {
        path.windows(2)
            .map(|pair| {
                let distance_nm = spatial::distance_nm(pair[0], pair[1]);
                Self {
                    from: pair[0],
                    to: pair[1],
                    distance_nm,
                    duration_minutes: distance_nm / speed_knots * 60.0,
                    speed_knots,
                    bearing_deg: spatial::bearing_deg(pair[0], pair[1]),
                }
            })
            .collect()
    }
}

/// The finalized result of a planning request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedRoute {
    pub route: VesselRoute,
    pub timing: RouteTiming,
    pub mode: PlanningMode,
    pub requested_departure: DateTime<Utc>,
    pub departure: DateTime<Utc>,
    pub arrival: DateTime<Utc>,
    pub distance_nm: f64,
    pub duration_minutes: f64,
    pub departure_adjusted: bool,
    /// Shift applied to the requested departure, in whole minutes.
    pub adjustment_minutes: i64,
    /// Quality of the static-obstacle search.
    pub search: SearchQuality,
    /// Closest approach to any committed vessel over the passage.
    pub min_separation_nm: Option<f64>,
    /// Fixed mode only: conflicts that no alternative path could clear.
    pub collision_risk: Option<UnresolvedCollision>,
    pub segments: Vec<RouteSegment>,
    pub direct_distance_nm: f64,
    pub detour_ratio: f64,
    /// Extra distance versus the static-obstacle path.
    pub added_distance_nm: f64,
    /// Departure shift plus detour time, minutes.
    pub unified_cost_minutes: f64,
    /// The path was changed from the static-obstacle path to avoid traffic.
    /// `search` describes the static phase only.
    pub rerouted: bool,
}

impl PlannedRoute {
    pub fn has_collision_risk(&self) -> bool {
        self.collision_risk
            .as_ref()
            .is_some_and(|risk| !risk.conflicts.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn departure() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 5, 0, 0).unwrap()
    }

    fn three_leg_route(speed: f64) -> VesselRoute {
        let a = Coordinate::new(35.98, 129.55);
        let b = spatial::offset_by_bearing(a, 1.0, 90.0);
        let c = spatial::offset_by_bearing(b, 2.0, 0.0);
        let d = spatial::offset_by_bearing(c, 0.5, 45.0);
        VesselRoute::new("V-1", "Haenam-ho", vec![a, b, c, d], departure(), speed).unwrap()
    }

    #[test]
    fn timing_has_one_timestamp_per_waypoint() {
        let route = three_leg_route(10.0);
        let timing = route.derive_timing();

        assert_eq!(timing.timestamps.len(), route.path.len());
        assert_eq!(timing.timestamps[0], route.departure);
        assert!(timing.timestamps.windows(2).all(|w| w[0] <= w[1]));
        assert!((timing.path_length_nm - 3.5).abs() < 1e-6);

        let expected = departure() + hours_to_duration(timing.path_length_nm / 10.0);
        assert_eq!(timing.arrival(), Some(expected));
    }

    #[test]
    fn derive_timing_is_idempotent() {
        let route = three_leg_route(7.5);
        assert_eq!(route.derive_timing(), route.derive_timing());
    }

    #[test]
    fn non_positive_speed_uses_default() {
        for speed in [0.0, -3.0, f64::NAN] {
            let timing = three_leg_route(speed).derive_timing();
            assert_eq!(timing.speed_knots, DEFAULT_SPEED_KNOTS);
        }
    }

    #[test]
    fn empty_path_is_single_point_route() {
        let start = Coordinate::new(35.98, 129.55);
        let route = VesselRoute::from_parts(
            "V-2",
            "",
            start,
            Coordinate::new(35.99, 129.56),
            Vec::new(),
            departure(),
            8.0,
        );
        let timed = route.timed();

        assert_eq!(timed.timing.timestamps, vec![departure()]);
        assert_eq!(timed.timing.path_length_nm, 0.0);
        assert_eq!(timed.position_at(departure()), Some(start));
        assert_eq!(timed.position_at(departure() + Duration::hours(3)), Some(start));
    }

    #[test]
    fn position_before_departure_is_none() {
        let timed = three_leg_route(10.0).timed();
        assert_eq!(timed.position_at(departure() - Duration::seconds(1)), None);
    }

    #[test]
    fn position_after_arrival_is_pinned_to_last_waypoint() {
        let route = three_leg_route(10.0);
        let timed = route.timed();
        let last = *route.path.last().unwrap();

        assert_eq!(timed.position_at(timed.arrival()), Some(last));
        assert_eq!(timed.position_at(timed.arrival() + Duration::hours(5)), Some(last));
    }

    #[test]
    fn position_interpolates_along_active_leg() {
        let route = three_leg_route(10.0);
        let timed = route.timed();

        // First leg is 1 NM at 10 kn: halfway after 3 minutes.
        let pos = timed
            .position_at(departure() + Duration::minutes(3))
            .unwrap();
        assert!((spatial::distance_nm(route.path[0], pos) - 0.5).abs() < 0.01);

        // Exactly at the second waypoint's timestamp we are at that waypoint.
        let at_b = timed.position_at(timed.timing.timestamps[1]).unwrap();
        assert!(spatial::distance_nm(at_b, route.path[1]) < 1e-6);
    }

    #[test]
    fn with_departure_keeps_path() {
        let route = three_leg_route(10.0);
        let later = route.with_departure(departure() + Duration::minutes(5));
        assert_eq!(later.path, route.path);
        assert_eq!(later.departure - route.departure, Duration::minutes(5));
    }

    #[test]
    fn validate_flags_bad_positions() {
        let mut route = three_leg_route(10.0);
        assert!(route.is_valid());
        route.path[1] = Coordinate::new(f64::NAN, 129.0);
        let errors = route.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Waypoint 1"));
    }

    #[test]
    fn segments_carry_bearing_and_duration() {
        let route = three_leg_route(10.0);
        let segments = RouteSegment::from_path(&route.path, 10.0);

        assert_eq!(segments.len(), 3);
        assert!((segments[0].bearing_deg - 90.0).abs() < 0.05);
        assert!((segments[0].duration_minutes - 6.0).abs() < 1e-3);
        assert!((segments[1].distance_nm - 2.0).abs() < 1e-6);
    }

    #[test]
    fn planning_mode_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&PlanningMode::Fixed).unwrap(), "\"fixed\"");
        let mode: PlanningMode = serde_json::from_str("\"flexible\"").unwrap();
        assert_eq!(mode, PlanningMode::Flexible);
    }
}
