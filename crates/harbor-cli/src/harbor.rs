//! Harbor definition and committed-route loading.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use harbor_core::{EngineRules, ObstacleDefinition, PlannedRoute, RouteEngine, VesselRoute};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Static description of a harbor: its restricted areas and engine tuning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarborDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub obstacles: Vec<ObstacleDefinition>,
    #[serde(default)]
    pub rules: EngineRules,
}

impl HarborDefinition {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse harbor definition")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read harbor definition {}", path.display()))?;
        let definition = Self::from_json(&raw)
            .with_context(|| format!("Invalid harbor definition {}", path.display()))?;
        info!(
            harbor = %definition.name,
            obstacles = definition.obstacles.len(),
            "Loaded harbor definition"
        );
        Ok(definition)
    }

    /// Construct the engine once; it is then shared by every request.
    pub fn into_engine(self) -> Result<RouteEngine> {
        RouteEngine::new(self.obstacles, self.rules).context("Failed to build route engine")
    }
}

/// Parse committed routes, dropping entries that fail validation.
pub fn parse_committed_routes(json: &str) -> Result<Vec<VesselRoute>> {
    let routes: Vec<VesselRoute> =
        serde_json::from_str(json).context("Failed to parse committed routes")?;
    let total = routes.len();
    let valid: Vec<VesselRoute> = routes
        .into_iter()
        .filter(|route| {
            let problems = route.validate();
            if !problems.is_empty() {
                warn!(vessel_id = %route.vessel_id, ?problems, "Dropping committed route");
            }
            problems.is_empty()
        })
        .collect();
    if valid.len() != total {
        warn!(dropped = total - valid.len(), "Some committed routes were invalid");
    }
    Ok(valid)
}

pub fn load_committed_routes(path: &Path) -> Result<Vec<VesselRoute>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read committed routes {}", path.display()))?;
    parse_committed_routes(&raw).with_context(|| format!("Invalid committed routes {}", path.display()))
}

/// Planning output with harbor context for operators.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub harbor: String,
    pub plan: PlannedRoute,
    /// Closest distance from any waypoint to a raw obstacle.
    pub nearest_obstacle_nm: Option<f64>,
}

impl PlanReport {
    pub fn new(harbor: impl Into<String>, engine: &RouteEngine, plan: PlannedRoute) -> Self {
        let nearest_obstacle_nm = plan
            .route
            .waypoints()
            .iter()
            .map(|p| engine.obstacles().distance_to_point_nm(*p))
            .filter(|d| d.is_finite())
            .reduce(f64::min);
        Self {
            harbor: harbor.into(),
            plan,
            nearest_obstacle_nm,
        }
    }
}
