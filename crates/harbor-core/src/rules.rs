//! Tunable parameters for the route optimization engine.

use serde::{Deserialize, Serialize};

/// All engine tunables, grouped by concern.
///
/// Every section falls back to its defaults, so a partial JSON override is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineRules {
    pub safety: SafetyRules,
    pub search: SearchRules,
    pub departure_window: DepartureWindow,
    pub avoidance: AvoidanceRules,
}

/// Separation and sampling thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyRules {
    /// Minimum allowed distance between two vessels, nautical miles
    pub collision_radius_nm: f64,
    /// Margin added around every obstacle polygon, nautical miles
    pub obstacle_buffer_nm: f64,
    /// Time resolution when sampling a timed segment, hours
    pub position_sample_hours: f64,
    /// Step of the pairwise encounter scan, minutes
    pub encounter_step_minutes: f64,
}

impl Default for SafetyRules {
    fn default() -> Self {
        Self {
            collision_radius_nm: 0.5,
            obstacle_buffer_nm: 0.02, // ~37 m
            position_sample_hours: 0.25,
            encounter_step_minutes: 0.5,
        }
    }
}

/// A* search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRules {
    /// Node deduplication grid, degrees (~20 m)
    pub grid_resolution_deg: f64,
    /// Step multiplier while more than `far_distance_nm` from the goal
    pub far_step_multiplier: f64,
    pub far_distance_nm: f64,
    /// Step multiplier while more than `mid_distance_nm` from the goal
    pub mid_step_multiplier: f64,
    pub mid_distance_nm: f64,
    pub max_iterations: usize,
    /// Accept the closest node reached if it is this close to the goal
    pub best_effort_radius_nm: f64,
    /// Nodes this close to an endpoint only need to clear the raw polygons
    pub endpoint_escape_nm: f64,
    /// Substituted for unusable vessel speeds
    pub default_speed_knots: f64,
}

impl Default for SearchRules {
    fn default() -> Self {
        Self {
            grid_resolution_deg: 0.0002,
            far_step_multiplier: 10.0,
            far_distance_nm: 5.0,
            mid_step_multiplier: 5.0,
            mid_distance_nm: 1.0,
            max_iterations: 10_000,
            best_effort_radius_nm: 1.0,
            endpoint_escape_nm: 0.1,
            default_speed_knots: 10.0,
        }
    }
}

impl SearchRules {
    /// Step size in degrees for a node `remaining_nm` away from the goal.
    pub fn step_deg(&self, remaining_nm: f64) -> f64 {
        let multiplier = if remaining_nm > self.far_distance_nm {
            self.far_step_multiplier
        } else if remaining_nm > self.mid_distance_nm {
            self.mid_step_multiplier
        } else {
            1.0
        };
        self.grid_resolution_deg * multiplier.max(1.0)
    }
}

/// Flexible-mode departure offsets, minutes relative to the requested time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepartureWindow {
    pub min_offset_minutes: i64,
    pub max_offset_minutes: i64,
    pub step_minutes: i64,
}

impl Default for DepartureWindow {
    fn default() -> Self {
        Self {
            min_offset_minutes: 3,
            max_offset_minutes: 10,
            step_minutes: 1,
        }
    }
}

impl DepartureWindow {
    /// Candidate offsets in preference order (earliest first), bounds inclusive.
    pub fn offsets(&self) -> Vec<i64> {
        let step = self.step_minutes.max(1);
        let (lo, hi) = if self.min_offset_minutes <= self.max_offset_minutes {
            (self.min_offset_minutes, self.max_offset_minutes)
        } else {
            (self.max_offset_minutes, self.min_offset_minutes)
        };
        (lo..=hi).step_by(step as usize).collect()
    }

    pub fn contains(&self, offset_minutes: i64) -> bool {
        let lo = self.min_offset_minutes.min(self.max_offset_minutes);
        let hi = self.min_offset_minutes.max(self.max_offset_minutes);
        (lo..=hi).contains(&offset_minutes)
    }
}

/// Fixed-mode path perturbation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvoidanceRules {
    /// Footprint radii to try, as multiples of the collision radius
    pub radius_factors: Vec<f64>,
    /// Extra check times, as fractions of the journey
    pub journey_fractions: Vec<f64>,
}

impl Default for AvoidanceRules {
    fn default() -> Self {
        Self {
            radius_factors: vec![0.6, 0.8, 1.0, 1.2, 1.5],
            journey_fractions: vec![0.25, 0.5, 0.75],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_window_is_three_to_ten_minutes() {
        let window = DepartureWindow::default();
        assert_eq!(window.offsets(), (3..=10).collect::<Vec<_>>());
        assert!(window.contains(3));
        assert!(!window.contains(11));
    }

    #[test]
    fn wide_window_with_coarse_step() {
        let window = DepartureWindow {
            min_offset_minutes: -30,
            max_offset_minutes: 120,
            step_minutes: 15,
        };
        let offsets = window.offsets();
        assert_eq!(offsets.first(), Some(&-30));
        assert_eq!(offsets.last(), Some(&120));
        assert_eq!(offsets.len(), 11);
    }

    #[test]
    fn step_size_adapts_to_remaining_distance() {
        let search = SearchRules::default();
        assert_eq!(search.step_deg(0.5), 0.0002);
        assert!((search.step_deg(2.0) - 0.001).abs() < 1e-12);
        assert!((search.step_deg(8.0) - 0.002).abs() < 1e-12);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let rules: EngineRules =
            serde_json::from_str(r#"{ "safety": { "collision_radius_nm": 0.3 } }"#).unwrap();
        assert_eq!(rules.safety.collision_radius_nm, 0.3);
        assert_eq!(rules.safety.obstacle_buffer_nm, 0.02);
        assert_eq!(rules.search, SearchRules::default());
        assert_eq!(rules.departure_window.offsets().len(), 8);
    }
}
