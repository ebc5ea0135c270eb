//! Geodesy helpers: great-circle distance, bearings, and local planar projection.

use crate::models::Coordinate;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;
/// Kilometres to nautical miles.
pub const KM_TO_NM: f64 = 0.539957;
/// Nautical miles per degree of latitude (and of longitude at the equator).
pub const NM_PER_DEG: f64 = 60.0;

/// Great-circle distance between two points in nautical miles (haversine formula).
pub fn distance_nm(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let dphi = (b.lat - a.lat).to_radians();
    let dlambda = (b.lng - a.lng).to_radians();
    let h = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().clamp(0.0, 1.0).asin();
    EARTH_RADIUS_KM * c * KM_TO_NM
}

/// Initial compass bearing from `a` to `b` in degrees, normalised to `[0, 360)`.
pub fn bearing_deg(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let delta_lambda = (b.lng - a.lng).to_radians();

    let x = delta_lambda.sin() * phi2.cos();
    let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    let bearing = x.atan2(y).to_degrees().rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if bearing >= 360.0 {
        0.0
    } else {
        bearing
    }
}

/// Linear interpolation in lat/lng space.
///
/// Good enough at harbor scale; not geodesically exact over long distances.
pub fn interpolate(a: Coordinate, b: Coordinate, fraction: f64) -> Coordinate {
    Coordinate {
        lat: a.lat + (b.lat - a.lat) * fraction,
        lng: a.lng + (b.lng - a.lng) * fraction,
    }
}

/// Total great-circle length of a polyline in nautical miles.
pub fn path_length_nm(path: &[Coordinate]) -> f64 {
    path.windows(2).map(|pair| distance_nm(pair[0], pair[1])).sum()
}

// ==== Local scale conversion ====
// 1° latitude ≈ 60 NM, 1° longitude ≈ 60·cos(latitude) NM.

/// Convert a north/south distance in nautical miles to degrees latitude.
pub fn nm_to_lat_deg(nm: f64) -> f64 {
    nm / NM_PER_DEG
}

/// Convert an east/west distance in nautical miles to degrees longitude at `ref_lat_deg`.
pub fn nm_to_lng_deg(nm: f64, ref_lat_deg: f64) -> f64 {
    nm / nm_per_deg_lng(ref_lat_deg)
}

/// Nautical miles per degree of longitude at a given latitude.
pub fn nm_per_deg_lng(lat_deg: f64) -> f64 {
    (NM_PER_DEG * lat_deg.to_radians().cos()).max(1e-9)
}

/// Offset a position by a distance and compass bearing (degrees, 0 = north).
pub fn offset_by_bearing(origin: Coordinate, distance_nm: f64, bearing_deg: f64) -> Coordinate {
    if distance_nm.abs() <= f64::EPSILON {
        return origin;
    }

    let lat1 = origin.lat.to_radians();
    let lng1 = origin.lng.to_radians();
    let bearing_rad = bearing_deg.to_radians();
    let angular_distance = distance_nm / KM_TO_NM / EARTH_RADIUS_KM;

    let sin_lat1 = lat1.sin();
    let cos_lat1 = lat1.cos();
    let sin_ad = angular_distance.sin();
    let cos_ad = angular_distance.cos();

    let sin_lat2 = sin_lat1 * cos_ad + cos_lat1 * sin_ad * bearing_rad.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();

    let y = bearing_rad.sin() * sin_ad * cos_lat1;
    let x = cos_ad - sin_lat1 * sin_lat2;
    let mut lng2 = lng1 + y.atan2(x);
    lng2 =
        (lng2 + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI) - std::f64::consts::PI;

    Coordinate {
        lat: lat2.to_degrees(),
        lng: lng2.to_degrees(),
    }
}

/// Planar approximation in nautical miles around a reference latitude/longitude.
///
/// All polygon and segment geometry runs in this frame so buffers and tolerances
/// can be expressed in nautical miles directly.
#[derive(Debug, Clone, Copy)]
pub struct LocalFrame {
    origin: Coordinate,
    nm_per_deg_lng: f64,
}

impl LocalFrame {
    pub fn new(origin: Coordinate) -> Self {
        Self {
            origin,
            nm_per_deg_lng: nm_per_deg_lng(origin.lat),
        }
    }

    /// Project to `(east_nm, north_nm)`.
    pub fn project(&self, point: Coordinate) -> (f64, f64) {
        (
            (point.lng - self.origin.lng) * self.nm_per_deg_lng,
            (point.lat - self.origin.lat) * NM_PER_DEG,
        )
    }

    pub fn origin(&self) -> Coordinate {
        self.origin
    }
}

pub(crate) fn segments_intersect_2d(
    a1: (f64, f64),
    a2: (f64, f64),
    b1: (f64, f64),
    b2: (f64, f64),
) -> bool {
    // Tolerance in nautical miles on the projected frame; absorbs projection and rounding error.
    const EPS_NM: f64 = 1e-9;

    fn orient(p: (f64, f64), q: (f64, f64), r: (f64, f64)) -> f64 {
        (q.0 - p.0) * (r.1 - p.1) - (q.1 - p.1) * (r.0 - p.0)
    }

    fn within(a: f64, b: f64, value: f64) -> bool {
        let min = a.min(b) - EPS_NM;
        let max = a.max(b) + EPS_NM;
        value >= min && value <= max
    }

    fn on_segment(p: (f64, f64), q: (f64, f64), r: (f64, f64)) -> bool {
        within(p.0, q.0, r.0) && within(p.1, q.1, r.1)
    }

    let o1 = orient(a1, a2, b1);
    let o2 = orient(a1, a2, b2);
    let o3 = orient(b1, b2, a1);
    let o4 = orient(b1, b2, a2);

    if o1.abs() <= EPS_NM && on_segment(a1, a2, b1) {
        return true;
    }
    if o2.abs() <= EPS_NM && on_segment(a1, a2, b2) {
        return true;
    }
    if o3.abs() <= EPS_NM && on_segment(b1, b2, a1) {
        return true;
    }
    if o4.abs() <= EPS_NM && on_segment(b1, b2, a2) {
        return true;
    }

    let a_crosses = (o1 > EPS_NM && o2 < -EPS_NM) || (o1 < -EPS_NM && o2 > EPS_NM);
    let b_crosses = (o3 > EPS_NM && o4 < -EPS_NM) || (o3 < -EPS_NM && o4 > EPS_NM);
    a_crosses && b_crosses
}

/// Distance from `p` to segment `a`–`b` on the projected plane.
pub(crate) fn point_segment_distance_2d(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let sx = b.0 - a.0;
    let sy = b.1 - a.1;
    let px = p.0 - a.0;
    let py = p.1 - a.1;

    let seg_len_sq = sx * sx + sy * sy;
    if seg_len_sq < 1e-18 {
        return (px * px + py * py).sqrt();
    }

    // Project point onto segment line: t = ((P-A) · (B-A)) / |B-A|²
    let t = ((px * sx + py * sy) / seg_len_sq).clamp(0.0, 1.0);
    let dx = px - t * sx;
    let dy = py - t * sy;
    (dx * dx + dy * dy).sqrt()
}

/// Minimum distance between two segments on the projected plane (0 when they touch).
pub(crate) fn segment_segment_distance_2d(
    a1: (f64, f64),
    a2: (f64, f64),
    b1: (f64, f64),
    b2: (f64, f64),
) -> f64 {
    if segments_intersect_2d(a1, a2, b1, b2) {
        return 0.0;
    }
    point_segment_distance_2d(a1, b1, b2)
        .min(point_segment_distance_2d(a2, b1, b2))
        .min(point_segment_distance_2d(b1, a1, a2))
        .min(point_segment_distance_2d(b2, a1, a2))
}

/// Minimum distance in nautical miles from a point to the segment `start`–`end`.
///
/// Uses a local planar frame anchored at the segment start.
pub fn distance_to_segment_nm(point: Coordinate, start: Coordinate, end: Coordinate) -> f64 {
    let frame = LocalFrame::new(start);
    point_segment_distance_2d(frame.project(point), (0.0, 0.0), frame.project(end))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HARBOR: Coordinate = Coordinate {
        lat: 35.9858,
        lng: 129.5532,
    };

    #[test]
    fn one_degree_of_latitude_is_about_sixty_nm() {
        let dist = distance_nm(Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 0.0));
        assert!((dist - 60.04).abs() < 0.1, "got {dist}");
    }

    #[test]
    fn distance_to_self_is_zero() {
        assert!(distance_nm(HARBOR, HARBOR) < 1e-12);
    }

    #[test]
    fn bearing_cardinal_directions() {
        let north = offset_by_bearing(HARBOR, 1.0, 0.0);
        let east = offset_by_bearing(HARBOR, 1.0, 90.0);
        let west = offset_by_bearing(HARBOR, 1.0, 270.0);

        assert!(bearing_deg(HARBOR, north) < 0.01 || bearing_deg(HARBOR, north) > 359.99);
        assert!((bearing_deg(HARBOR, east) - 90.0).abs() < 0.05);
        assert!((bearing_deg(HARBOR, west) - 270.0).abs() < 0.05);
    }

    #[test]
    fn offset_by_bearing_round_trips_distance() {
        let moved = offset_by_bearing(HARBOR, 2.5, 37.0);
        assert!((distance_nm(HARBOR, moved) - 2.5).abs() < 1e-6);
    }

    #[test]
    fn interpolate_endpoints_and_midpoint() {
        let b = Coordinate::new(35.99, 129.56);
        assert_eq!(interpolate(HARBOR, b, 0.0), HARBOR);
        assert_eq!(interpolate(HARBOR, b, 1.0), b);
        let mid = interpolate(HARBOR, b, 0.5);
        assert!((mid.lat - (HARBOR.lat + b.lat) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn local_frame_matches_haversine_at_harbor_scale() {
        let frame = LocalFrame::new(HARBOR);
        let other = offset_by_bearing(HARBOR, 0.8, 120.0);
        let (x, y) = frame.project(other);
        let planar = (x * x + y * y).sqrt();
        assert!((planar - 0.8).abs() < 0.005, "planar {planar}");
    }

    #[test]
    fn crossing_segments_have_zero_distance() {
        let d = segment_segment_distance_2d((0.0, 0.0), (1.0, 1.0), (0.0, 1.0), (1.0, 0.0));
        assert_eq!(d, 0.0);
        let d = segment_segment_distance_2d((0.0, 0.0), (1.0, 0.0), (0.0, 0.5), (1.0, 0.5));
        assert!((d - 0.5).abs() < 1e-12);
    }

    #[test]
    fn distance_to_segment_nm_measures_perpendicular_offset() {
        let end = offset_by_bearing(HARBOR, 1.0, 90.0);
        let mid = interpolate(HARBOR, end, 0.5);
        let probe = offset_by_bearing(mid, 0.2, 0.0);
        let d = distance_to_segment_nm(probe, HARBOR, end);
        assert!((d - 0.2).abs() < 0.002, "got {d}");
    }
}
