//! Trajectory backend interface.
//!
//! The backend turns a (person, date) selection, optionally with
//! preprocessing options, into a GeoJSON body, and lists the dates
//! available for a person.

use std::future::Future;
use std::time::Duration;

use crate::error::{Result, SyncError};

/// Endpoint serving raw + Kalman filtered points.
pub const GEOJSON_ENDPOINT: &str = "geojsondata";
/// Endpoint serving the initial map for a selection.
pub const INIT_MAP_ENDPOINT: &str = "init_map";
/// Endpoint running the preprocessing pipeline.
pub const PREPROCESS_ENDPOINT: &str = "preprocess";
/// Endpoint prefix listing dates for a person (`dates/{person}`).
pub const DATES_ENDPOINT: &str = "dates";

/// Preprocessing options sent to the backend.
///
/// Values are forwarded as-is; the backend owns their validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessOptions {
    /// Run the Kalman filter. Default: true
    pub kalman_filter: bool,
    /// Kalman EM iterations. Default: 5
    pub n_iter: u32,
    /// Time gap (seconds) that splits a track into segments. Default: 60
    pub time_segment: u32,
    /// Snap points to the road network. Default: false
    pub map_match: bool,
    /// Map matching search radius in meters. Default: 150.0
    pub search_radius: f64,
    /// Expected GPS accuracy in meters. Default: 5.0
    pub gps_accuracy: f64,
    /// Distance (meters) beyond which a match is broken. Default: 2000.0
    pub breakage_distance: f64,
    /// Distance (meters) under which points are interpolated. Default: 10.0
    pub interpolation_distance: f64,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            kalman_filter: true,
            n_iter: 5,
            time_segment: 60,
            map_match: false,
            search_radius: 150.0,
            gps_accuracy: 5.0,
            breakage_distance: 2000.0,
            interpolation_distance: 10.0,
        }
    }
}

impl PreprocessOptions {
    fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("kalmanFilter", self.kalman_filter.to_string()),
            ("n_iter", self.n_iter.to_string()),
            ("timeSegment", self.time_segment.to_string()),
            ("mapMatch", self.map_match.to_string()),
            ("searchRadius", self.search_radius.to_string()),
            ("gpsAccuracy", self.gps_accuracy.to_string()),
            ("breakageDistance", self.breakage_distance.to_string()),
            ("interpolationDistance", self.interpolation_distance.to_string()),
        ]
    }
}

/// A request for one person's trajectory on one date.
#[derive(Debug, Clone, PartialEq)]
pub enum TrajectoryRequest {
    /// Original + filtered points (`POST /geojsondata`)
    Raw { person: String, date: String },
    /// Initial map for a selection (`POST /init_map`)
    Initial { person: String, date: String },
    /// Preprocessed points (`POST /preprocess`)
    Preprocessed {
        person: String,
        date: String,
        options: PreprocessOptions,
    },
}

impl TrajectoryRequest {
    pub fn raw(person: &str, date: &str) -> Self {
        Self::Raw {
            person: person.to_string(),
            date: date.to_string(),
        }
    }

    pub fn initial(person: &str, date: &str) -> Self {
        Self::Initial {
            person: person.to_string(),
            date: date.to_string(),
        }
    }

    pub fn preprocessed(person: &str, date: &str, options: PreprocessOptions) -> Self {
        Self::Preprocessed {
            person: person.to_string(),
            date: date.to_string(),
            options,
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Raw { .. } => GEOJSON_ENDPOINT,
            Self::Initial { .. } => INIT_MAP_ENDPOINT,
            Self::Preprocessed { .. } => PREPROCESS_ENDPOINT,
        }
    }

    pub fn person(&self) -> &str {
        match self {
            Self::Raw { person, .. }
            | Self::Initial { person, .. }
            | Self::Preprocessed { person, .. } => person,
        }
    }

    pub fn date(&self) -> &str {
        match self {
            Self::Raw { date, .. } | Self::Initial { date, .. } | Self::Preprocessed { date, .. } => {
                date
            }
        }
    }

    /// Form-encoded body fields, `person` and `date` first.
    pub fn form(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("person", self.person().to_string()),
            ("date", self.date().to_string()),
        ];
        if let Self::Preprocessed { options, .. } = self {
            fields.extend(options.form_fields());
        }
        fields
    }
}

/// Source of trajectory data.
pub trait TrajectoryBackend {
    /// Dates with data for `person`, in display order.
    fn fetch_dates(&self, person: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Raw response body for `request` (GeoJSON, possibly string-wrapped).
    fn fetch_trajectory(
        &self,
        request: &TrajectoryRequest,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Connection settings for the trajectory backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    /// Base URL of the web app. Default: `http://127.0.0.1:5000`
    pub base_url: String,
    /// Per-request timeout. Default: 30 seconds
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl BackendConfig {
    /// Defaults overridden by `TRACK_OVERLAY_BASE_URL` and
    /// `TRACK_OVERLAY_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("TRACK_OVERLAY_BASE_URL") {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(SyncError::Config(format!(
                    "TRACK_OVERLAY_BASE_URL must be an http(s) URL, got {}",
                    url
                )));
            }
            config.base_url = url;
        }

        if let Some(secs) = lookup("TRACK_OVERLAY_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                SyncError::Config(format!("TRACK_OVERLAY_TIMEOUT_SECS is not a number: {}", secs))
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}
