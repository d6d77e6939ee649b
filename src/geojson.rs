//! Lenient GeoJSON decoding for trajectory responses.
//!
//! The backend returns point features tagged with a `type` category and a
//! `time` label. Individual features are decoded and validated one by one
//! so a single malformed point (including a number `f64` cannot hold) never
//! rejects the whole response; only a missing or non-array `features`
//! member does.

use std::collections::HashMap;

use log::debug;
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{Map, Value};

use crate::error::{Result, SyncError};
use crate::GpsPoint;

/// Category assigned to features without a string `type` property.
pub const UNKNOWN_CATEGORY: &str = "unknown";

// Flask's jsonify() over gdf.to_json() wraps the collection in a JSON string.
const MAX_STRING_WRAPPING: usize = 2;

/// A validated point feature.
#[derive(Debug, Clone, PartialEq)]
pub struct PointFeature {
    /// Category label from `properties.type`
    pub category: String,
    /// Timestamp label from `properties.time` (empty when absent)
    pub time: String,
    pub point: GpsPoint,
}

/// All features of one category, in received order.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTrack {
    pub category: String,
    pub features: Vec<PointFeature>,
}

impl CategoryTrack {
    pub fn points(&self) -> Vec<GpsPoint> {
        self.features.iter().map(|f| f.point).collect()
    }
}

/// A decoded FeatureCollection holding only renderable features.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    features: Vec<PointFeature>,
    rejected: usize,
}

#[derive(Debug, Deserialize)]
struct RawFeature {
    geometry: Option<RawGeometry>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RawGeometry {
    coordinates: Option<Vec<Option<f64>>>,
}

impl FeatureCollection {
    /// Decode a response body, unwrapping string-encoded JSON if needed.
    ///
    /// The body is only scanned, not converted, until each feature is
    /// decoded on its own.
    pub fn parse(body: &str) -> Result<Self> {
        let mut raw: Box<RawValue> = serde_json::from_str(body)?;
        for _ in 0..MAX_STRING_WRAPPING {
            if !raw.get().trim_start().starts_with('"') {
                break;
            }
            let inner: String = serde_json::from_str(raw.get())?;
            raw = serde_json::from_str(&inner)?;
        }

        if !raw.get().trim_start().starts_with('{') {
            return Err(not_an_object());
        }
        let members: HashMap<String, Box<RawValue>> = serde_json::from_str(raw.get())?;

        if let Some(kind) = members.get("type") {
            check_type(&serde_json::from_str::<Value>(kind.get())?)?;
        }

        let raw_features = members
            .get("features")
            .filter(|f| f.get().trim_start().starts_with('['))
            .ok_or_else(missing_features)?;
        let raw_features: Vec<Box<RawValue>> = serde_json::from_str(raw_features.get())?;

        Ok(Self::from_candidates(raw_features.iter().map(|raw| {
            serde_json::from_str::<Value>(raw.get())
                .ok()
                .and_then(|value| validate_feature(&value))
        })))
    }

    /// Decode an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        let value = unwrap_string_layers(value)?;
        let object = value.as_object().ok_or_else(not_an_object)?;

        if let Some(kind) = object.get("type") {
            check_type(kind)?;
        }

        let raw_features = object
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(missing_features)?;

        Ok(Self::from_candidates(raw_features.iter().map(validate_feature)))
    }

    fn from_candidates(candidates: impl Iterator<Item = Option<PointFeature>>) -> Self {
        let mut features = Vec::new();
        let mut rejected = 0;
        for candidate in candidates {
            match candidate {
                Some(feature) => features.push(feature),
                None => rejected += 1,
            }
        }

        if rejected > 0 {
            debug!(
                "[FeatureCollection] Dropped {} of {} invalid features",
                rejected,
                features.len() + rejected
            );
        }

        Self { features, rejected }
    }

    /// Build a collection directly from validated features.
    pub fn from_features(features: Vec<PointFeature>) -> Self {
        Self { features, rejected: 0 }
    }

    pub fn features(&self) -> &[PointFeature] {
        &self.features
    }

    /// Number of features excluded during validation.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Group features by category in first-appearance order.
    ///
    /// Points keep the order they were received in; the backend is
    /// responsible for temporal ordering.
    pub fn partition(&self) -> Vec<CategoryTrack> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut tracks: Vec<CategoryTrack> = Vec::new();

        for feature in &self.features {
            let slot = *index.entry(feature.category.as_str()).or_insert_with(|| {
                tracks.push(CategoryTrack {
                    category: feature.category.clone(),
                    features: Vec::new(),
                });
                tracks.len() - 1
            });
            tracks[slot].features.push(feature.clone());
        }

        tracks
    }
}

fn not_an_object() -> SyncError {
    SyncError::InvalidCollection("top-level value is not an object".to_string())
}

fn missing_features() -> SyncError {
    SyncError::InvalidCollection("missing features array".to_string())
}

fn check_type(kind: &Value) -> Result<()> {
    if kind.as_str() == Some("FeatureCollection") {
        return Ok(());
    }
    Err(SyncError::InvalidCollection(format!(
        "expected type FeatureCollection, got {}",
        kind
    )))
}

fn unwrap_string_layers(mut value: Value) -> Result<Value> {
    for _ in 0..MAX_STRING_WRAPPING {
        match value {
            Value::String(inner) => value = serde_json::from_str(&inner)?,
            other => return Ok(other),
        }
    }
    Ok(value)
}

/// Returns `None` for anything that cannot be drawn as a point.
fn validate_feature(raw: &Value) -> Option<PointFeature> {
    let feature = RawFeature::deserialize(raw).ok()?;
    let coordinates = feature.geometry?.coordinates?;

    let (lng, lat) = match coordinates.as_slice() {
        [Some(lng), Some(lat)] => (*lng, *lat),
        _ => return None,
    };

    let properties = feature.properties.unwrap_or_default();
    let category = properties
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_CATEGORY)
        .to_string();
    let time = match properties.get("time") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    Some(PointFeature {
        category,
        time,
        point: GpsPoint::new(lat, lng),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point(lng: f64, lat: f64, kind: &str, time: &str) -> Value {
        json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [lng, lat] },
            "properties": { "type": kind, "time": time }
        })
    }

    #[test]
    fn test_parse_plain_collection() {
        let body = json!({
            "type": "FeatureCollection",
            "features": [point(116.3, 39.9, "original", "t1"), point(116.31, 39.91, "filtered", "t2")]
        })
        .to_string();

        let collection = FeatureCollection::parse(&body).unwrap();
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.features()[0].point, GpsPoint::new(39.9, 116.3));
        assert_eq!(collection.features()[1].category, "filtered");
        assert_eq!(collection.features()[1].time, "t2");
    }

    #[test]
    fn test_parse_string_wrapped_collection() {
        let inner = json!({ "features": [point(116.3, 39.9, "original", "t1")] }).to_string();
        let wrapped = Value::String(inner.clone()).to_string();

        let plain = FeatureCollection::parse(&inner).unwrap();
        let unwrapped = FeatureCollection::parse(&wrapped).unwrap();
        assert_eq!(plain, unwrapped);
    }

    #[test]
    fn test_missing_features_is_error() {
        let err = FeatureCollection::parse(r#"{"type":"FeatureCollection"}"#).unwrap_err();
        assert!(matches!(err, SyncError::InvalidCollection(_)));

        let err = FeatureCollection::parse(r#"{"features": {}}"#).unwrap_err();
        assert!(matches!(err, SyncError::InvalidCollection(_)));

        let err = FeatureCollection::parse("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, SyncError::InvalidCollection(_)));
    }

    #[test]
    fn test_wrong_type_is_error() {
        let err = FeatureCollection::parse(r#"{"type":"Feature","features":[]}"#).unwrap_err();
        assert!(matches!(err, SyncError::InvalidCollection(_)));
    }

    #[test]
    fn test_malformed_json_is_error() {
        let err = FeatureCollection::parse("{not json").unwrap_err();
        assert!(matches!(err, SyncError::Json(_)));
    }

    #[test]
    fn test_invalid_features_are_dropped() {
        let body = json!({
            "features": [
                point(116.30, 39.90, "original", "t1"),
                { "geometry": { "coordinates": [null, null] }, "properties": { "type": "original" } },
                { "geometry": null, "properties": { "type": "original" } },
                { "properties": { "type": "filtered" } },
                { "geometry": { "coordinates": [116.3] }, "properties": { "type": "filtered" } },
                { "geometry": { "coordinates": [116.3, 39.9, 12.0] }, "properties": { "type": "filtered" } },
                { "geometry": { "coordinates": ["116.3", 39.9] }, "properties": { "type": "filtered" } },
                "not a feature",
                point(116.31, 39.91, "filtered", "t2"),
            ]
        })
        .to_string();

        let collection = FeatureCollection::parse(&body).unwrap();
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.rejected(), 7);
    }

    #[test]
    fn test_out_of_range_number_drops_only_its_feature() {
        let body = r#"{"type": "FeatureCollection", "features": [
            {"geometry": {"coordinates": [116.3, 1e400]}, "properties": {"type": "original"}},
            {"geometry": {"coordinates": [116.3, 39.9]}, "properties": {"type": "original", "time": 1e999}},
            {"geometry": {"coordinates": [116.31, 39.91]}, "properties": {"type": "original"}}
        ]}"#;

        let collection = FeatureCollection::parse(body).unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.rejected(), 2);
        assert_eq!(collection.features()[0].point, GpsPoint::new(39.91, 116.31));

        let wrapped = Value::String(body.to_string()).to_string();
        assert_eq!(FeatureCollection::parse(&wrapped).unwrap(), collection);
    }

    #[test]
    fn test_parse_matches_from_value() {
        let value = json!({
            "type": "FeatureCollection",
            "features": [point(1.0, 2.0, "kalman", "a"), { "geometry": null }, point(3.0, 4.0, "original", "b")]
        });
        let parsed = FeatureCollection::parse(&value.to_string()).unwrap();
        assert_eq!(parsed, FeatureCollection::from_value(value).unwrap());
        assert_eq!(parsed.rejected(), 1);
    }

    #[test]
    fn test_from_features() {
        let features = vec![
            PointFeature { category: "matched".into(), time: "t1".into(), point: GpsPoint::new(39.9, 116.3) },
            PointFeature { category: "original".into(), time: "t2".into(), point: GpsPoint::new(39.91, 116.31) },
        ];
        let collection = FeatureCollection::from_features(features.clone());

        assert_eq!(collection.features(), features.as_slice());
        assert_eq!(collection.rejected(), 0);
        let names: Vec<String> = collection.partition().into_iter().map(|t| t.category).collect();
        assert_eq!(names, vec!["matched", "original"]);
    }

    #[test]
    fn test_missing_type_and_time() {
        let body = json!({
            "features": [
                { "geometry": { "coordinates": [1.0, 2.0] } },
                { "geometry": { "coordinates": [1.0, 2.0] }, "properties": { "type": 3, "time": 1700000000 } },
            ]
        })
        .to_string();

        let collection = FeatureCollection::parse(&body).unwrap();
        assert_eq!(collection.features()[0].category, UNKNOWN_CATEGORY);
        assert_eq!(collection.features()[0].time, "");
        assert_eq!(collection.features()[1].category, UNKNOWN_CATEGORY);
        assert_eq!(collection.features()[1].time, "1700000000");
    }

    #[test]
    fn test_partition_keeps_order() {
        let body = json!({
            "features": [
                point(1.0, 1.0, "original", "a"),
                point(2.0, 2.0, "kalman", "b"),
                point(3.0, 3.0, "original", "c"),
                point(4.0, 4.0, "matched", "d"),
                point(5.0, 5.0, "kalman", "e"),
            ]
        })
        .to_string();

        let tracks = FeatureCollection::parse(&body).unwrap().partition();
        let names: Vec<&str> = tracks.iter().map(|t| t.category.as_str()).collect();
        assert_eq!(names, vec!["original", "kalman", "matched"]);

        let times: Vec<&str> = tracks[0].features.iter().map(|f| f.time.as_str()).collect();
        assert_eq!(times, vec!["a", "c"]);
        assert_eq!(tracks[1].points(), vec![GpsPoint::new(2.0, 2.0), GpsPoint::new(5.0, 5.0)]);
    }
}
