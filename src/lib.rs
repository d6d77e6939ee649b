//! # Track Overlay
//!
//! GPS trajectory layer synchronization for interactive maps.
//!
//! This library provides:
//! - Lenient decoding of trajectory GeoJSON (original, filtered, map-matched points)
//! - A layer synchronizer that replaces polylines, point markers and the layer
//!   toggle control on a map surface, then fits the viewport
//! - Optional per-category density heatmaps and persistent map tools
//!   (pointer coordinate readout, distance ruler)
//! - Request sequencing so stale backend responses never overwrite newer renders
//! - A person/date selection cascade and an async session tying it together
//!
//! ## Features
//!
//! - **`http`** - Enable the reqwest backend for the trajectory service
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use track_overlay::{FeatureCollection, MapSynchronizer, RecordingSurface};
//!
//! let body = r#"{"type": "FeatureCollection", "features": [
//!     {"geometry": {"coordinates": [116.30, 39.90]}, "properties": {"type": "original", "time": "t1"}},
//!     {"geometry": {"coordinates": [116.31, 39.91]}, "properties": {"type": "filtered", "time": "t2"}}
//! ]}"#;
//!
//! let collection = FeatureCollection::parse(body).unwrap();
//! let mut sync = MapSynchronizer::new(RecordingSurface::default());
//! let summary = sync.render(&collection);
//!
//! assert_eq!(summary.categories.len(), 2);
//! assert_eq!(sync.surface().layers().len(), 4);
//! ```

use serde::Serialize;

pub mod error;
pub use error::{Result, SyncError};

pub mod geo_utils;

pub mod geojson;
pub use geojson::{CategoryTrack, FeatureCollection, PointFeature, UNKNOWN_CATEGORY};

pub mod style;
pub use style::{CategoryStyle, GradientStop, HeatStyle, StyleRegistry};

pub mod heatmap;
pub use heatmap::{HeatmapCell, HeatmapConfig};

pub mod tools;
pub use tools::{ControlCorner, LengthUnit, MapTools, PointerReadout, RulerOptions};

pub mod render;
pub use render::{
    CategorySummary, ControlEntry, HeatmapLayer, LayerContent, LayerControl, LayerGroup, LayerId,
    MapSynchronizer, MarkerLayer, MarkerRef, PointMarker, PolylineLayer, RenderState,
    RenderSummary, SyncConfig,
};

pub mod surface;
pub use surface::{MapSurface, RecordingSurface};

pub mod html;
pub use html::LeafletDocument;

pub mod sequence;
pub use sequence::{RequestSequencer, Ticket};

pub mod cascade;
pub use cascade::SelectionCascade;

pub mod backend;
pub use backend::{BackendConfig, PreprocessOptions, TrajectoryBackend, TrajectoryRequest};

// HTTP backend for the trajectory service
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::HttpBackend;

pub mod session;
pub use session::MapSession;

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use track_overlay::GpsPoint;
/// let point = GpsPoint::new(39.926117, 116.315750); // Beijing
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// `[lat, lng]` pair as map libraries expect it.
    pub fn lat_lng(&self) -> [f64; 2] {
        [self.latitude, self.longitude]
    }
}

/// Bounding box of rendered points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// South-west and north-east corners as `[lat, lng]` pairs.
    pub fn corners(&self) -> [[f64; 2]; 2] {
        [[self.min_lat, self.min_lng], [self.max_lat, self.max_lng]]
    }

    /// Check whether a point lies inside (edges included).
    pub fn contains(&self, point: &GpsPoint) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lng
            && point.longitude <= self.max_lng
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
