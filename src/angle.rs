//! Great-circle geometry on the celestial sphere
//!
//! All public distances and widths are in degrees; the math runs on
//! f64 unit vectors so that distances are good to well below 1e-8
//! degrees over the full 0..180 degree range.

//a Imports
use geo_nd::Vector;
use serde::{Deserialize, Serialize};

use crate::Vec3;

//a Constants
/// Below this vector length a cross product is treated as degenerate
const DEGENERATE_EPS: f64 = 1e-12;

/// Slack for the on-arc test in [segment_distance_vec]
const ARC_EPS: f64 = 1e-9;

//a CelestialPoint
//tp CelestialPoint
/// A position on the celestial sphere in equatorial coordinates
///
/// `ra` is right ascension in degrees in `[0, 360)`; `dec` is
/// declination in degrees in `[-90, 90]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CelestialPoint {
    pub ra: f64,
    pub dec: f64,
}

//ip CelestialPoint
impl CelestialPoint {
    //cp new
    pub fn new(ra: f64, dec: f64) -> Self {
        Self { ra, dec }
    }

    //mp unit_vector
    /// The unit vector of the point, x towards (ra=0, dec=0), z to the
    /// north celestial pole
    pub fn unit_vector(&self) -> Vec3 {
        let ra = self.ra.to_radians();
        let dec = self.dec.to_radians();
        [ra.cos() * dec.cos(), ra.sin() * dec.cos(), dec.sin()].into()
    }
}

//a Distance functions
//fi cross
fn cross(p: &Vec3, q: &Vec3) -> Vec3 {
    [
        p[1] * q[2] - p[2] * q[1],
        p[2] * q[0] - p[0] * q[2],
        p[0] * q[1] - p[1] * q[0],
    ]
    .into()
}

//fp angular_distance_vec
/// Great-circle distance between two unit vectors, in degrees
///
/// Uses the `atan2(|p x q|, p . q)` form, which stays accurate for
/// both nearly-coincident and nearly-antipodal inputs where the
/// plain `acos` form loses half the mantissa.
pub fn angular_distance_vec(p: &Vec3, q: &Vec3) -> f64 {
    cross(p, q).length().atan2(p.dot(q)).to_degrees()
}

//fp angular_distance
/// Great-circle distance between two sky positions, in degrees
pub fn angular_distance(p: CelestialPoint, q: CelestialPoint) -> f64 {
    angular_distance_vec(&p.unit_vector(), &q.unit_vector())
}

//fp cone_contains
/// Is `p` within `radius` degrees of `center`?
pub fn cone_contains(center: CelestialPoint, radius: f64, p: CelestialPoint) -> bool {
    angular_distance(center, p) <= radius
}

//fp segment_distance_vec
/// Minimum distance in degrees from `p` to the great-circle *arc*
/// from `a` to `b`
///
/// The foot of `p` on the great circle through `a` and `b` is used
/// only when it lies on the arc itself; otherwise the nearer endpoint
/// wins. A degenerate segment (`a == b`) collapses to the point
/// distance.
pub fn segment_distance_vec(a: &Vec3, b: &Vec3, p: &Vec3) -> f64 {
    let n = cross(a, b);
    let n_len = n.length();
    if n_len < DEGENERATE_EPS {
        return angular_distance_vec(a, p);
    }
    let n = n / n_len;

    // Project p onto the great-circle plane
    let foot = *p - n * n.dot(p);
    let foot_len = foot.length();
    if foot_len < DEGENERATE_EPS {
        // p is a pole of the great circle; every point of it is 90 degrees away
        return 90.0;
    }
    let foot = foot / foot_len;

    let span = angular_distance_vec(a, b);
    let to_a = angular_distance_vec(a, &foot);
    let to_b = angular_distance_vec(&foot, b);
    if to_a <= span + ARC_EPS && to_b <= span + ARC_EPS {
        angular_distance_vec(p, &foot)
    } else {
        angular_distance_vec(a, p).min(angular_distance_vec(b, p))
    }
}

//fp segment_distance
/// Minimum distance in degrees from `p` to the arc from `a` to `b`
pub fn segment_distance(a: CelestialPoint, b: CelestialPoint, p: CelestialPoint) -> f64 {
    segment_distance_vec(&a.unit_vector(), &b.unit_vector(), &p.unit_vector())
}

//fp polyline_distance_vec
/// Minimum distance in degrees from `p` to a polyline of unit vectors
///
/// Returns infinity for an empty path and the point distance for a
/// single-point path.
pub fn polyline_distance_vec(path: &[Vec3], p: &Vec3) -> f64 {
    match path.len() {
        0 => f64::INFINITY,
        1 => angular_distance_vec(&path[0], p),
        _ => path
            .windows(2)
            .map(|w| segment_distance_vec(&w[0], &w[1], p))
            .fold(f64::INFINITY, f64::min),
    }
}

//fp corridor_contains
/// Is `p` within `width` degrees of the polyline `path`?
pub fn corridor_contains(path: &[CelestialPoint], width: f64, p: CelestialPoint) -> bool {
    let path: Vec<Vec3> = path.iter().map(|q| q.unit_vector()).collect();
    polyline_distance_vec(&path, &p.unit_vector()) <= width
}

//a Tests
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_on_equator() {
        let p = CelestialPoint::new(10.0, 0.0);
        let q = CelestialPoint::new(100.0, 0.0);
        assert!((angular_distance(p, q) - 90.0).abs() < 1e-10);
    }

    #[test]
    fn distance_pole_to_pole() {
        let n = CelestialPoint::new(42.0, 90.0);
        let s = CelestialPoint::new(270.0, -90.0);
        assert!((angular_distance(n, s) - 180.0).abs() < 1e-9);
    }

    #[test]
    fn distance_small_separation_is_stable() {
        let p = CelestialPoint::new(83.0, -5.0);
        let q = CelestialPoint::new(83.0, -5.0 + 1e-7);
        let d = angular_distance(p, q);
        assert!((d - 1e-7).abs() < 1e-12);
    }

    #[test]
    fn distance_coincident_is_zero() {
        let p = CelestialPoint::new(180.0, 45.0);
        assert_eq!(angular_distance(p, p), 0.0);
    }

    #[test]
    fn segment_clamps_to_endpoints() {
        // Arc along the equator from ra=0 to ra=10; a point past the
        // end at ra=20 must use the endpoint, not the circle extension
        let a = CelestialPoint::new(0.0, 0.0);
        let b = CelestialPoint::new(10.0, 0.0);
        let p = CelestialPoint::new(20.0, 0.0);
        let d = segment_distance(a, b, p);
        assert!((d - 10.0).abs() < 1e-9);
    }

    #[test]
    fn segment_uses_perpendicular_foot_inside_arc() {
        let a = CelestialPoint::new(0.0, 0.0);
        let b = CelestialPoint::new(10.0, 0.0);
        let p = CelestialPoint::new(5.0, 2.0);
        let d = segment_distance(a, b, p);
        assert!((d - 2.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_segment_is_point_distance() {
        let a = CelestialPoint::new(30.0, 10.0);
        let p = CelestialPoint::new(30.0, 15.0);
        let d = segment_distance(a, a, p);
        assert!((d - 5.0).abs() < 1e-9);
    }

    #[test]
    fn segment_endpoint_coincident_with_point() {
        let a = CelestialPoint::new(30.0, 10.0);
        let b = CelestialPoint::new(40.0, 10.0);
        assert!(segment_distance(a, b, a) < 1e-10);
    }

    #[test]
    fn corridor_membership() {
        let path = [
            CelestialPoint::new(80.0, -5.0),
            CelestialPoint::new(85.0, -2.5),
            CelestialPoint::new(90.0, 0.0),
        ];
        assert!(corridor_contains(&path, 0.5, CelestialPoint::new(85.0, -2.4)));
        assert!(!corridor_contains(&path, 0.5, CelestialPoint::new(85.0, 5.0)));
    }
}
