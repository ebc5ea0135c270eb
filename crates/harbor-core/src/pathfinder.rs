//! A* pathfinding over continuous lat/lng space.
//!
//! Nodes are positions reached by stepping in eight compass directions; they are
//! quantized to the grid resolution only for deduplication. The step grows with
//! distance to the goal so long passages stay within the iteration budget while
//! the approach to obstacles and the goal keeps full resolution.
//!
//! Termination is guaranteed by the iteration cap. When the cap is hit the search
//! degrades explicitly (see [`SearchOutcome`]) instead of returning a path that
//! looks optimal.

use crate::models::Coordinate;
use crate::obstacle::{Footprint, ObstacleSet};
use crate::rules::SearchRules;
use crate::spatial;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::{debug, warn};

/// Eight compass directions as (lat, lng) unit steps.
const DIRECTIONS: [(f64, f64); 8] = [
    (1.0, 0.0),
    (1.0, 1.0),
    (0.0, 1.0),
    (-1.0, 1.0),
    (-1.0, 0.0),
    (-1.0, -1.0),
    (0.0, -1.0),
    (1.0, -1.0),
];

/// Fixed probe offsets (degrees lat, lng) around the midpoint for the direct fallback.
const DIRECT_PROBES_DEG: [(f64, f64); 8] = [
    (0.01, 0.01),
    (-0.01, 0.01),
    (0.01, -0.01),
    (-0.01, -0.01),
    (0.02, 0.0),
    (-0.02, 0.0),
    (0.0, 0.02),
    (0.0, -0.02),
];

/// Perpendicular probe distances, as fractions of the direct distance.
const PERPENDICULAR_PROBES: [f64; 3] = [0.25, 0.5, 1.0];

/// Why a search returned a degraded path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BestEffortReason {
    /// The path ends at the node closest to the goal.
    ClosestNode { remaining_nm: f64 },
    /// A straight line bent through a single avoidance waypoint.
    DirectFallback,
}

/// Result of a static-obstacle search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Optimal(Vec<Coordinate>),
    BestEffort {
        path: Vec<Coordinate>,
        reason: BestEffortReason,
    },
    NotFound,
}

impl SearchOutcome {
    pub fn path(&self) -> Option<&[Coordinate]> {
        match self {
            SearchOutcome::Optimal(path) | SearchOutcome::BestEffort { path, .. } => Some(path),
            SearchOutcome::NotFound => None,
        }
    }

    pub fn into_path(self) -> Option<Vec<Coordinate>> {
        match self {
            SearchOutcome::Optimal(path) | SearchOutcome::BestEffort { path, .. } => Some(path),
            SearchOutcome::NotFound => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    pub iterations: usize,
    pub nodes_expanded: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub outcome: SearchOutcome,
    pub stats: SearchStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct NodeKey {
    lat: i64,
    lng: i64,
}

#[derive(Debug, Clone, Copy)]
struct FloatOrd(f64);

impl PartialEq for FloatOrd {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatOrd {}

impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenNode {
    key: NodeKey,
    g_score: FloatOrd,
    f_score: FloatOrd,
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Prefer deeper nodes on equal f so ties resolve toward the goal.
        self.f_score
            .cmp(&other.f_score)
            .then_with(|| other.g_score.cmp(&self.g_score))
            .then_with(|| self.key.lat.cmp(&other.key.lat))
            .then_with(|| self.key.lng.cmp(&other.key.lng))
    }
}

/// Endpoints of one search plus the buffered zones each one sits in.
///
/// An endpoint inside a buffer (a dock drawn inside a restricted polygon) may
/// only be left through the raw geometry of the areas holding it, and only
/// within the escape radius. Every other area keeps its buffer.
#[derive(Debug, Clone)]
struct Endpoints {
    start: Coordinate,
    goal: Coordinate,
    start_areas: Vec<usize>,
    goal_areas: Vec<usize>,
    escape_nm: f64,
}

impl Endpoints {
    /// Whether area `index` is crossed on its raw polygon at `point`.
    fn relaxes(&self, point: Coordinate, index: usize) -> bool {
        (self.start_areas.contains(&index)
            && spatial::distance_nm(point, self.start) <= self.escape_nm)
            || (self.goal_areas.contains(&index)
                && spatial::distance_nm(point, self.goal) <= self.escape_nm)
    }
}

/// Static-obstacle pathfinder.
#[derive(Debug, Clone)]
pub struct Pathfinder<'a> {
    obstacles: &'a ObstacleSet,
    footprints: Vec<Footprint>,
    rules: SearchRules,
}

impl<'a> Pathfinder<'a> {
    pub fn new(obstacles: &'a ObstacleSet, rules: &SearchRules) -> Self {
        Self {
            obstacles,
            footprints: Vec::new(),
            rules: rules.clone(),
        }
    }

    /// Treat the given vessel footprints as additional temporary obstacles.
    pub fn with_footprints(mut self, footprints: Vec<Footprint>) -> Self {
        self.footprints = footprints;
        self
    }

    pub fn footprints(&self) -> &[Footprint] {
        &self.footprints
    }

    fn endpoints(&self, start: Coordinate, goal: Coordinate) -> Endpoints {
        Endpoints {
            start,
            goal,
            start_areas: self.obstacles.buffered_at(start),
            goal_areas: self.obstacles.buffered_at(goal),
            escape_nm: self.rules.endpoint_escape_nm,
        }
    }

    fn point_clear(&self, point: Coordinate, ends: &Endpoints) -> bool {
        if self.footprints.iter().any(|fp| fp.contains_point(point)) {
            return false;
        }
        !self
            .obstacles
            .contains_point_relaxed(point, |index| ends.relaxes(point, index))
    }

    fn segment_clear(&self, from: Coordinate, to: Coordinate, ends: &Endpoints) -> bool {
        if self
            .footprints
            .iter()
            .any(|fp| fp.intersects_segment(from, to))
        {
            return false;
        }
        !self.obstacles.intersects_segment_relaxed(from, to, |index| {
            ends.relaxes(from, index) || ends.relaxes(to, index)
        })
    }

    fn key_for(&self, point: Coordinate) -> NodeKey {
        let res = self.rules.grid_resolution_deg;
        NodeKey {
            lat: (point.lat / res).round() as i64,
            lng: (point.lng / res).round() as i64,
        }
    }

    /// Whether the straight segment between two points is navigable for this search.
    pub fn is_segment_clear(&self, from: Coordinate, to: Coordinate) -> bool {
        let ends = self.endpoints(from, to);
        self.segment_clear(from, to, &ends)
    }

    /// Search for a path from `start` to `goal`.
    pub fn search(&self, start: Coordinate, goal: Coordinate) -> SearchResult {
        let ends = self.endpoints(start, goal);
        let mut stats = SearchStats::default();

        if spatial::distance_nm(start, goal) < 1e-9 {
            return SearchResult {
                outcome: SearchOutcome::Optimal(vec![start]),
                stats,
            };
        }
        if self.segment_clear(start, goal, &ends) {
            return SearchResult {
                outcome: SearchOutcome::Optimal(vec![start, goal]),
                stats,
            };
        }

        let res = self.rules.grid_resolution_deg;
        let start_key = self.key_for(start);
        let start_h = spatial::distance_nm(start, goal);

        let mut open_set: BinaryHeap<Reverse<OpenNode>> = BinaryHeap::new();
        open_set.push(Reverse(OpenNode {
            key: start_key,
            g_score: FloatOrd(0.0),
            f_score: FloatOrd(start_h),
        }));
        let mut closed_set: HashSet<NodeKey> = HashSet::new();
        let mut g_score: HashMap<NodeKey, f64> = HashMap::new();
        let mut came_from: HashMap<NodeKey, NodeKey> = HashMap::new();
        let mut positions: HashMap<NodeKey, Coordinate> = HashMap::new();
        g_score.insert(start_key, 0.0);
        positions.insert(start_key, start);

        let mut best = (start_key, start_h);

        while let Some(Reverse(current)) = open_set.pop() {
            if closed_set.contains(&current.key) {
                continue;
            }
            let best_g = g_score.get(&current.key).copied().unwrap_or(f64::INFINITY);
            if current.g_score.0 > best_g + 1e-12 {
                continue;
            }
            if stats.iterations >= self.rules.max_iterations {
                debug!(iterations = stats.iterations, "Search iteration cap reached");
                break;
            }
            stats.iterations += 1;
            if stats.iterations % 1000 == 0 {
                debug!(
                    iterations = stats.iterations,
                    open = open_set.len(),
                    best_remaining_nm = best.1,
                    "Search progress"
                );
            }
            closed_set.insert(current.key);

            let Some(&position) = positions.get(&current.key) else {
                continue;
            };
            let remaining_nm = spatial::distance_nm(position, goal);
            if remaining_nm < best.1 {
                best = (current.key, remaining_nm);
            }

            if (position.lat - goal.lat).abs() <= res
                && (position.lng - goal.lng).abs() <= res
                && self.segment_clear(position, goal, &ends)
            {
                let mut path = self.reconstruct(current.key, &came_from, &positions);
                if spatial::distance_nm(position, goal) > 1e-9 {
                    path.push(goal);
                }
                debug!(iterations = stats.iterations, "Search reached goal");
                return SearchResult {
                    outcome: SearchOutcome::Optimal(self.simplify(&path, &ends)),
                    stats,
                };
            }

            let step = self.rules.step_deg(remaining_nm);
            for (dlat, dlng) in DIRECTIONS {
                let next = Coordinate::new(position.lat + dlat * step, position.lng + dlng * step);
                let next_key = self.key_for(next);
                if closed_set.contains(&next_key) {
                    continue;
                }
                if !self.point_clear(next, &ends) || !self.segment_clear(position, next, &ends) {
                    continue;
                }

                let tentative_g = best_g + spatial::distance_nm(position, next);
                let known = g_score.get(&next_key).copied().unwrap_or(f64::INFINITY);
                if tentative_g + 1e-12 < known {
                    g_score.insert(next_key, tentative_g);
                    came_from.insert(next_key, current.key);
                    positions.insert(next_key, next);
                    stats.nodes_expanded += 1;
                    open_set.push(Reverse(OpenNode {
                        key: next_key,
                        g_score: FloatOrd(tentative_g),
                        f_score: FloatOrd(tentative_g + spatial::distance_nm(next, goal)),
                    }));
                }
            }
        }

        let outcome = self.fallback(best, &came_from, &positions, &ends);
        SearchResult { outcome, stats }
    }

    fn fallback(
        &self,
        (best_key, best_remaining): (NodeKey, f64),
        came_from: &HashMap<NodeKey, NodeKey>,
        positions: &HashMap<NodeKey, Coordinate>,
        ends: &Endpoints,
    ) -> SearchOutcome {
        if best_remaining <= self.rules.best_effort_radius_nm {
            let mut path = self.reconstruct(best_key, came_from, positions);
            if let Some(&last) = path.last() {
                if self.segment_clear(last, ends.goal, ends) {
                    path.push(ends.goal);
                }
            }
            let path = self.simplify(&path, ends);
            let remaining_nm = path
                .last()
                .map(|last| spatial::distance_nm(*last, ends.goal))
                .unwrap_or(best_remaining);
            warn!(remaining_nm, "Search budget exhausted, using closest node");
            return SearchOutcome::BestEffort {
                path,
                reason: BestEffortReason::ClosestNode { remaining_nm },
            };
        }

        match self.direct_with_avoidance(ends) {
            Some(path) => {
                warn!(waypoints = path.len(), "Search failed, using direct path with avoidance");
                SearchOutcome::BestEffort {
                    path,
                    reason: BestEffortReason::DirectFallback,
                }
            }
            None => {
                warn!(start = %ends.start, goal = %ends.goal, "No path found");
                SearchOutcome::NotFound
            }
        }
    }

    /// Probe single avoidance waypoints around the straight line.
    fn direct_with_avoidance(&self, ends: &Endpoints) -> Option<Vec<Coordinate>> {
        let (start, goal) = (ends.start, ends.goal);
        if self.segment_clear(start, goal, ends) {
            return Some(vec![start, goal]);
        }

        let mid = spatial::interpolate(start, goal, 0.5);
        let direct_nm = spatial::distance_nm(start, goal);
        let course = spatial::bearing_deg(start, goal);

        let perpendicular = PERPENDICULAR_PROBES.iter().flat_map(|fraction| {
            [90.0, 270.0].map(|turn| spatial::offset_by_bearing(mid, direct_nm * fraction, course + turn))
        });
        let fixed = DIRECT_PROBES_DEG
            .iter()
            .map(|(dlat, dlng)| Coordinate::new(mid.lat + dlat, mid.lng + dlng));

        perpendicular.chain(fixed).find_map(|waypoint| {
            let doable = self.point_clear(waypoint, ends)
                && self.segment_clear(start, waypoint, ends)
                && self.segment_clear(waypoint, goal, ends);
            doable.then(|| vec![start, waypoint, goal])
        })
    }

    fn reconstruct(
        &self,
        end: NodeKey,
        came_from: &HashMap<NodeKey, NodeKey>,
        positions: &HashMap<NodeKey, Coordinate>,
    ) -> Vec<Coordinate> {
        let mut path = Vec::new();
        let mut current = Some(end);
        while let Some(key) = current {
            if let Some(position) = positions.get(&key) {
                path.push(*position);
            }
            current = came_from.get(&key).copied();
        }
        path.reverse();
        path
    }

    /// Greedy line-of-sight simplification: from each kept point jump to the
    /// furthest later point that is still reachable in a straight line.
    fn simplify(&self, path: &[Coordinate], ends: &Endpoints) -> Vec<Coordinate> {
        if path.len() <= 2 {
            return path.to_vec();
        }

        let mut simplified = vec![path[0]];
        let mut current_idx = 0usize;

        while current_idx < path.len() - 1 {
            let mut furthest_valid = current_idx + 1;
            for target_idx in (current_idx + 2)..path.len() {
                if self.segment_clear(path[current_idx], path[target_idx], ends) {
                    furthest_valid = target_idx;
                }
            }
            simplified.push(path[furthest_valid]);
            current_idx = furthest_valid;
        }

        simplified
    }
}
