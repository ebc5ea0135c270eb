//! Restricted zones (breakwaters, no-go areas) with safety buffers.
//!
//! Geometry is evaluated on a local planar frame in nautical miles. The buffered
//! zone of an obstacle is the raw polygon plus every point closer than
//! `buffer_nm` to its boundary, so it always contains the raw polygon.

use serde::{Deserialize, Serialize};

use crate::error::{PlanError, Result};
use crate::models::Coordinate;
use crate::spatial::{self, LocalFrame};

/// Static obstacle definition as loaded from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleDefinition {
    pub name: String,
    /// Polygon vertices in order; a closing vertex equal to the first is allowed.
    pub vertices: Vec<Coordinate>,
    /// Per-obstacle buffer override, nautical miles
    #[serde(default)]
    pub buffer_nm: Option<f64>,
}

/// A validated obstacle polygon with its safety buffer.
#[derive(Debug, Clone)]
pub struct ObstacleArea {
    name: String,
    vertices: Vec<Coordinate>,
    buffer_nm: f64,
    frame: LocalFrame,
    projected: Vec<(f64, f64)>,
    // Projected bounding box of the buffered zone: (min_x, min_y, max_x, max_y)
    bounds: (f64, f64, f64, f64),
}

impl ObstacleArea {
    pub fn new(definition: ObstacleDefinition, default_buffer_nm: f64) -> Result<Self> {
        let ObstacleDefinition {
            name,
            mut vertices,
            buffer_nm,
        } = definition;
        let invalid = |reason: String| PlanError::InvalidObstacle {
            name: name.clone(),
            reason,
        };

        if let Some(index) = vertices.iter().position(|v| !v.is_valid()) {
            return Err(invalid(format!("vertex {} is not a valid position", index)));
        }

        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        vertices.dedup();
        if vertices.len() < 3 {
            return Err(invalid(format!(
                "polygon needs at least 3 distinct vertices, got {}",
                vertices.len()
            )));
        }

        let buffer_nm = buffer_nm.unwrap_or(default_buffer_nm);
        if !buffer_nm.is_finite() || buffer_nm < 0.0 {
            return Err(invalid(format!("buffer {} must be a non-negative distance", buffer_nm)));
        }

        let n = vertices.len() as f64;
        let centroid = Coordinate::new(
            vertices.iter().map(|v| v.lat).sum::<f64>() / n,
            vertices.iter().map(|v| v.lng).sum::<f64>() / n,
        );
        let frame = LocalFrame::new(centroid);
        let projected: Vec<(f64, f64)> = vertices.iter().map(|v| frame.project(*v)).collect();

        if polygon_area(&projected) < 1e-12 {
            return Err(invalid("polygon has zero area".to_string()));
        }

        let mut bounds = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for &(x, y) in &projected {
            bounds.0 = bounds.0.min(x);
            bounds.1 = bounds.1.min(y);
            bounds.2 = bounds.2.max(x);
            bounds.3 = bounds.3.max(y);
        }
        bounds.0 -= buffer_nm;
        bounds.1 -= buffer_nm;
        bounds.2 += buffer_nm;
        bounds.3 += buffer_nm;

        Ok(Self {
            name,
            vertices,
            buffer_nm,
            frame,
            projected,
            bounds,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertices(&self) -> &[Coordinate] {
        &self.vertices
    }

    pub fn buffer_nm(&self) -> f64 {
        self.buffer_nm
    }

    /// Ray-casting containment against the raw polygon.
    fn contains_raw(&self, p: (f64, f64)) -> bool {
        let mut inside = false;
        let n = self.projected.len();
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.projected[i];
            let (xj, yj) = self.projected[j];
            if ((yi > p.1) != (yj > p.1)) && (p.0 < (xj - xi) * (p.1 - yi) / (yj - yi) + xi) {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    fn edges(&self) -> impl Iterator<Item = ((f64, f64), (f64, f64))> + '_ {
        let n = self.projected.len();
        (0..n).map(move |i| (self.projected[i], self.projected[(i + 1) % n]))
    }

    fn boundary_distance(&self, p: (f64, f64)) -> f64 {
        self.edges()
            .map(|(a, b)| spatial::point_segment_distance_2d(p, a, b))
            .fold(f64::INFINITY, f64::min)
    }

    fn outside_bounds(&self, p: (f64, f64)) -> bool {
        p.0 < self.bounds.0 || p.1 < self.bounds.1 || p.0 > self.bounds.2 || p.1 > self.bounds.3
    }

    /// Whether `point` lies in the obstacle, including the buffer unless `ignore_buffer`.
    pub fn contains_point(&self, point: Coordinate, ignore_buffer: bool) -> bool {
        let p = self.frame.project(point);
        if self.outside_bounds(p) {
            return false;
        }
        if self.contains_raw(p) {
            return true;
        }
        !ignore_buffer && self.buffer_nm > 0.0 && self.boundary_distance(p) < self.buffer_nm
    }

    /// Whether the segment `start`–`end` touches the obstacle (buffered unless `ignore_buffer`).
    pub fn intersects_segment(&self, start: Coordinate, end: Coordinate, ignore_buffer: bool) -> bool {
        let a = self.frame.project(start);
        let b = self.frame.project(end);

        if a.0.max(b.0) < self.bounds.0
            || a.1.max(b.1) < self.bounds.1
            || a.0.min(b.0) > self.bounds.2
            || a.1.min(b.1) > self.bounds.3
        {
            return false;
        }

        // A segment fully inside the polygon crosses no edge.
        if self.contains_raw(a) || self.contains_raw(b) {
            return true;
        }

        let margin = if ignore_buffer { 0.0 } else { self.buffer_nm };
        self.edges().any(|(e1, e2)| {
            if margin > 0.0 {
                spatial::segment_segment_distance_2d(a, b, e1, e2) < margin
            } else {
                spatial::segments_intersect_2d(a, b, e1, e2)
            }
        })
    }

    /// Distance to the raw polygon in nautical miles, 0 inside.
    pub fn distance_to_point_nm(&self, point: Coordinate) -> f64 {
        let p = self.frame.project(point);
        if self.contains_raw(p) {
            0.0
        } else {
            self.boundary_distance(p)
        }
    }
}

fn polygon_area(points: &[(f64, f64)]) -> f64 {
    let n = points.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let (x1, y1) = points[i];
            let (x2, y2) = points[(i + 1) % n];
            x1 * y2 - x2 * y1
        })
        .sum();
    (twice / 2.0).abs()
}

/// Every obstacle of the harbor. Loaded once and never mutated.
#[derive(Debug, Clone, Default)]
pub struct ObstacleSet {
    areas: Vec<ObstacleArea>,
}

impl ObstacleSet {
    /// Validate and build all obstacles, failing on the first bad definition.
    pub fn new(definitions: Vec<ObstacleDefinition>, default_buffer_nm: f64) -> Result<Self> {
        let areas = definitions
            .into_iter()
            .map(|definition| ObstacleArea::new(definition, default_buffer_nm))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { areas })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn areas(&self) -> &[ObstacleArea] {
        &self.areas
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    pub fn contains_point(&self, point: Coordinate, ignore_buffer: bool) -> bool {
        self.areas
            .iter()
            .any(|area| area.contains_point(point, ignore_buffer))
    }

    /// First obstacle containing `point`, if any.
    pub fn find_containing(&self, point: Coordinate, ignore_buffer: bool) -> Option<&ObstacleArea> {
        self.areas
            .iter()
            .find(|area| area.contains_point(point, ignore_buffer))
    }

    pub fn intersects_segment(&self, start: Coordinate, end: Coordinate, ignore_buffer: bool) -> bool {
        self.areas
            .iter()
            .any(|area| area.intersects_segment(start, end, ignore_buffer))
    }

    /// Indices of the areas whose buffered zone holds `point`.
    pub fn buffered_at(&self, point: Coordinate) -> Vec<usize> {
        self.areas
            .iter()
            .enumerate()
            .filter(|(_, area)| area.contains_point(point, false))
            .map(|(index, _)| index)
            .collect()
    }

    /// Containment where only the areas selected by `relaxed` drop their buffer.
    pub fn contains_point_relaxed(&self, point: Coordinate, relaxed: impl Fn(usize) -> bool) -> bool {
        self.areas
            .iter()
            .enumerate()
            .any(|(index, area)| area.contains_point(point, relaxed(index)))
    }

    /// Segment test where only the areas selected by `relaxed` drop their buffer.
    /// Every other area keeps its full safety margin.
    pub fn intersects_segment_relaxed(
        &self,
        start: Coordinate,
        end: Coordinate,
        relaxed: impl Fn(usize) -> bool,
    ) -> bool {
        self.areas
            .iter()
            .enumerate()
            .any(|(index, area)| area.intersects_segment(start, end, relaxed(index)))
    }

    /// Distance to the nearest raw obstacle, `f64::INFINITY` when there are none.
    pub fn distance_to_point_nm(&self, point: Coordinate) -> f64 {
        self.areas
            .iter()
            .map(|area| area.distance_to_point_nm(point))
            .fold(f64::INFINITY, f64::min)
    }
}

/// A committed vessel's momentary position expanded into a temporary circular obstacle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub center: Coordinate,
    pub radius_nm: f64,
}

impl Footprint {
    pub fn contains_point(&self, point: Coordinate) -> bool {
        spatial::distance_nm(self.center, point) < self.radius_nm
    }

    pub fn intersects_segment(&self, start: Coordinate, end: Coordinate) -> bool {
        spatial::distance_to_segment_nm(self.center, start, end) < self.radius_nm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn breakwater() -> ObstacleDefinition {
        ObstacleDefinition {
            name: "north breakwater".to_string(),
            vertices: vec![
                Coordinate::new(35.9900, 129.5500),
                Coordinate::new(35.9900, 129.5560),
                Coordinate::new(35.9903, 129.5560),
                Coordinate::new(35.9903, 129.5500),
                Coordinate::new(35.9900, 129.5500),
            ],
            buffer_nm: None,
        }
    }

    fn area() -> ObstacleArea {
        ObstacleArea::new(breakwater(), 0.02).unwrap()
    }

    #[test]
    fn closing_vertex_is_dropped() {
        assert_eq!(area().vertices().len(), 4);
    }

    #[test]
    fn rejects_degenerate_polygons() {
        let mut def = breakwater();
        def.vertices.truncate(2);
        let err = ObstacleArea::new(def, 0.02).unwrap_err();
        assert!(matches!(err, PlanError::InvalidObstacle { .. }));

        let collinear = ObstacleDefinition {
            name: "line".to_string(),
            vertices: vec![
                Coordinate::new(35.0, 129.0),
                Coordinate::new(35.1, 129.0),
                Coordinate::new(35.2, 129.0),
            ],
            buffer_nm: None,
        };
        assert!(ObstacleArea::new(collinear, 0.02).is_err());

        let mut bad = breakwater();
        bad.vertices[1].lat = f64::INFINITY;
        assert!(ObstacleArea::new(bad, 0.02).is_err());
    }

    #[test]
    fn rejects_negative_buffer_override() {
        let mut def = breakwater();
        def.buffer_nm = Some(-0.1);
        assert!(ObstacleArea::new(def, 0.02).is_err());
    }

    #[test]
    fn buffer_extends_containment() {
        let area = area();
        let inside = Coordinate::new(35.99015, 129.553);
        // ~0.01 NM south of the wall: inside the 0.02 NM buffer only
        let near = Coordinate::new(35.99 - spatial::nm_to_lat_deg(0.01), 129.553);
        let far = Coordinate::new(35.98, 129.553);

        assert!(area.contains_point(inside, true));
        assert!(area.contains_point(inside, false));
        assert!(!area.contains_point(near, true));
        assert!(area.contains_point(near, false));
        assert!(!area.contains_point(far, false));
    }

    #[test]
    fn segment_across_wall_intersects() {
        let area = area();
        let south = Coordinate::new(35.9880, 129.553);
        let north = Coordinate::new(35.9920, 129.553);
        assert!(area.intersects_segment(south, north, true));
        assert!(area.intersects_segment(south, north, false));
    }

    #[test]
    fn segment_grazing_buffer_only_hits_buffered_zone() {
        let area = area();
        let lat = 35.99 - spatial::nm_to_lat_deg(0.01);
        let a = Coordinate::new(lat, 129.548);
        let b = Coordinate::new(lat, 129.558);
        assert!(!area.intersects_segment(a, b, true));
        assert!(area.intersects_segment(a, b, false));
    }

    #[test]
    fn segment_clear_of_obstacle() {
        let area = area();
        let a = Coordinate::new(35.985, 129.540);
        let b = Coordinate::new(35.985, 129.570);
        assert!(!area.intersects_segment(a, b, false));
    }

    #[test]
    fn distance_to_point_is_zero_inside() {
        let area = area();
        assert_eq!(area.distance_to_point_nm(Coordinate::new(35.99015, 129.553)), 0.0);
        let south = Coordinate::new(35.99 - spatial::nm_to_lat_deg(0.1), 129.553);
        assert!((area.distance_to_point_nm(south) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn buffered_zone_contains_raw_polygon() {
        let set = ObstacleSet::new(vec![breakwater()], 0.02).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..2_000 {
            let p = Coordinate::new(
                rng.random_range(35.9890..35.9913),
                rng.random_range(129.5490..129.5570),
            );
            if set.contains_point(p, true) {
                assert!(set.contains_point(p, false), "{p} inside raw but not buffered");
            }
        }
    }

    #[test]
    fn footprint_blocks_nearby_segments() {
        let center = Coordinate::new(35.98, 129.55);
        let footprint = Footprint {
            center,
            radius_nm: 0.3,
        };
        let west = spatial::offset_by_bearing(center, 1.0, 270.0);
        let east = spatial::offset_by_bearing(center, 1.0, 90.0);
        assert!(footprint.intersects_segment(west, east));
        assert!(footprint.contains_point(center));

        let north = spatial::offset_by_bearing(center, 0.5, 0.0);
        let north_east = spatial::offset_by_bearing(north, 1.0, 90.0);
        assert!(!footprint.intersects_segment(north, north_east));
    }

    #[test]
    fn relaxing_one_area_keeps_the_others_buffered() {
        let mut mole = breakwater();
        mole.name = "mole".to_string();
        for v in &mut mole.vertices {
            v.lat -= 0.02;
        }
        let set = ObstacleSet::new(vec![breakwater(), mole], 0.02).unwrap();

        // Grazes the breakwater's buffer only.
        let lat = 35.99 - spatial::nm_to_lat_deg(0.01);
        let a = Coordinate::new(lat, 129.549);
        let b = Coordinate::new(lat, 129.557);
        assert_eq!(set.buffered_at(a), Vec::<usize>::new());
        assert_eq!(set.buffered_at(Coordinate::new(lat, 129.553)), vec![0]);
        assert!(set.intersects_segment(a, b, false));
        assert!(!set.intersects_segment_relaxed(a, b, |index| index == 0));
        assert!(set.intersects_segment_relaxed(a, b, |index| index == 1));

        let p = Coordinate::new(lat, 129.553);
        assert!(!set.contains_point_relaxed(p, |index| index == 0));
        assert!(set.contains_point_relaxed(p, |index| index == 1));
    }
}
