//! # Geographic Utilities
//!
//! Small geographic helpers used by the layer synchronizer.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`polyline_length`] | Total length of a GPS track in meters |
//! | [`compute_bounds`] | Bounding box of a set of points, if any |
//! | [`meters_to_degrees`] | Convert meters to approximate degrees at a latitude |
//!
//! ## Example
//!
//! ```rust
//! use track_overlay::{GpsPoint, geo_utils};
//!
//! let track = vec![
//!     GpsPoint::new(39.9000, 116.3000),  // Beijing
//!     GpsPoint::new(39.9010, 116.3010),
//!     GpsPoint::new(39.9020, 116.3030),
//! ];
//!
//! let length = geo_utils::polyline_length(&track);
//! println!("Track length: {:.0}m", length);
//!
//! let bounds = geo_utils::compute_bounds(&track).unwrap();
//! println!("Bounds: {:.4}N to {:.4}N", bounds.min_lat, bounds.max_lat);
//! ```
//!
//! All functions expect WGS84 coordinates (latitude/longitude in degrees).

use geo::{BoundingRect, Distance, Haversine, MultiPoint, Point};

use crate::{Bounds, GpsPoint};

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance between two GPS points.
///
/// # Arguments
///
/// * `p1` - First GPS point
/// * `p2` - Second GPS point
///
/// # Returns
///
/// Distance in meters along the Earth's surface (spherical model).
///
/// # Example
///
/// ```rust
/// use track_overlay::{GpsPoint, geo_utils};
///
/// let london = GpsPoint::new(51.5074, -0.1278);
/// let paris = GpsPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0);
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    Haversine::distance(p1.to_point(), p2.to_point())
}

/// Total length of a track.
///
/// Sums the haversine distance between consecutive points, in received
/// order. Empty or single-point tracks return 0.0.
///
/// # Arguments
///
/// * `points` - Track points
///
/// # Returns
///
/// Track length in meters.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Convert meters to approximate degrees at a given latitude.
///
/// Uses the longitude scale (the smaller one) so a square search box built
/// from the result always covers the requested radius.
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let lat_rad = latitude.to_radians();
    let meters_per_degree = 111_320.0 * lat_rad.cos().max(0.1);
    meters / meters_per_degree
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Bounding box enclosing all points.
///
/// This is what the synchronizer fits the viewport to after a render.
///
/// # Arguments
///
/// * `points` - Points in any order
///
/// # Returns
///
/// The smallest box containing every point (edges included), or `None`
/// for empty input. A single point gives a zero-area box.
///
/// # Example
///
/// ```rust
/// use track_overlay::{GpsPoint, geo_utils};
///
/// let track = vec![
///     GpsPoint::new(39.90, 116.30),
///     GpsPoint::new(39.91, 116.31),
/// ];
///
/// let bounds = geo_utils::compute_bounds(&track).unwrap();
/// assert_eq!(bounds.min_lat, 39.90);
/// assert_eq!(bounds.max_lng, 116.31);
/// assert!(geo_utils::compute_bounds(&[]).is_none());
/// ```
pub fn compute_bounds(points: &[GpsPoint]) -> Option<Bounds> {
    let multi: MultiPoint<f64> = points.iter().map(GpsPoint::to_point).collect();
    let rect = multi.bounding_rect()?;

    Some(Bounds {
        min_lat: rect.min().y,
        max_lat: rect.max().y,
        min_lng: rect.min().x,
        max_lng: rect.max().x,
    })
}

impl GpsPoint {
    /// Convert to a `geo` point (x = longitude, y = latitude).
    #[inline]
    pub fn to_point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_haversine_distance_same_point() {
        let p = GpsPoint::new(39.9, 116.3);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_distance_known_value() {
        // London to Paris is approximately 344 km
        let london = GpsPoint::new(51.5074, -0.1278);
        let paris = GpsPoint::new(48.8566, 2.3522);
        assert!(approx_eq(haversine_distance(&london, &paris), 343_560.0, 5000.0));
    }

    #[test]
    fn test_polyline_length_degenerate() {
        assert_eq!(polyline_length(&[]), 0.0);
        assert_eq!(polyline_length(&[GpsPoint::new(39.9, 116.3)]), 0.0);
    }

    #[test]
    fn test_polyline_length_two_points() {
        let track = vec![GpsPoint::new(39.9000, 116.3000), GpsPoint::new(39.9010, 116.3000)];
        let length = polyline_length(&track);
        // 0.001 degrees of latitude is about 111m
        assert!(approx_eq(length, 111.0, 2.0));
    }

    #[test]
    fn test_compute_bounds() {
        let track = vec![
            GpsPoint::new(39.90, 116.31),
            GpsPoint::new(39.91, 116.30),
            GpsPoint::new(39.905, 116.305),
        ];
        let bounds = compute_bounds(&track).unwrap();
        assert_eq!(bounds.min_lat, 39.90);
        assert_eq!(bounds.max_lat, 39.91);
        assert_eq!(bounds.min_lng, 116.30);
        assert_eq!(bounds.max_lng, 116.31);
    }

    #[test]
    fn test_compute_bounds_single_point() {
        let bounds = compute_bounds(&[GpsPoint::new(39.9, 116.3)]).unwrap();
        assert_eq!(bounds.min_lat, bounds.max_lat);
        assert_eq!(bounds.min_lng, bounds.max_lng);
    }

    #[test]
    fn test_compute_bounds_empty() {
        assert!(compute_bounds(&[]).is_none());
    }

    #[test]
    fn test_meters_to_degrees() {
        let deg = meters_to_degrees(111_320.0, 0.0);
        assert!(approx_eq(deg, 1.0, 0.01));

        let deg_40 = meters_to_degrees(111_320.0, 40.0);
        assert!(deg_40 > 1.0);
    }
}
