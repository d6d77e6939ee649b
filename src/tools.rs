//! Map tools: pointer coordinate readout and distance ruler.
//!
//! Tools are not part of a render. The synchronizer attaches them once when
//! it is created and again after every teardown, so clearing layers never
//! takes the ruler or the readout off the map.

use serde::Serialize;

use crate::geo_utils::polyline_length;
use crate::GpsPoint;

/// Map corner a control is docked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlCorner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Live `lat : lng` readout of the pointer position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointerReadout {
    pub position: ControlCorner,
    /// Decimal places shown (default: 5, about 1m)
    pub decimals: u8,
}

impl Default for PointerReadout {
    fn default() -> Self {
        Self {
            position: ControlCorner::TopRight,
            decimals: 5,
        }
    }
}

impl PointerReadout {
    pub fn format(&self, point: &GpsPoint) -> String {
        let decimals = self.decimals as usize;
        format!(
            "{:.*} : {:.*}",
            decimals, point.latitude, decimals, point.longitude
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LengthUnit {
    #[serde(rename = "km")]
    Kilometers,
    #[serde(rename = "m")]
    Meters,
}

impl LengthUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            LengthUnit::Kilometers => "km",
            LengthUnit::Meters => "m",
        }
    }

    fn convert(&self, meters: f64) -> f64 {
        match self {
            LengthUnit::Kilometers => meters / 1000.0,
            LengthUnit::Meters => meters,
        }
    }
}

/// Click-to-measure distance ruler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RulerOptions {
    pub position: ControlCorner,
    /// Measurement line colour
    pub line_color: String,
    /// SVG dash pattern of the measurement line
    pub dash_array: String,
    pub unit: LengthUnit,
    pub decimals: u8,
}

impl Default for RulerOptions {
    fn default() -> Self {
        Self {
            position: ControlCorner::BottomLeft,
            line_color: "#FF0000".to_string(),
            dash_array: "1,6".to_string(),
            unit: LengthUnit::Kilometers,
            decimals: 2,
        }
    }
}

impl RulerOptions {
    /// Length of a measured path, formatted the way the ruler shows it.
    ///
    /// ```rust
    /// use track_overlay::{GpsPoint, RulerOptions};
    ///
    /// let ruler = RulerOptions::default();
    /// let path = [GpsPoint::new(39.90, 116.30), GpsPoint::new(39.91, 116.30)];
    /// assert_eq!(ruler.measure(&path), "1.11 km");
    /// ```
    pub fn measure(&self, path: &[GpsPoint]) -> String {
        let length = self.unit.convert(polyline_length(path));
        format!("{:.*} {}", self.decimals as usize, length, self.unit.symbol())
    }
}

/// Tools kept on the map across renders. `None` disables a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapTools {
    pub pointer_readout: Option<PointerReadout>,
    pub ruler: Option<RulerOptions>,
}

impl Default for MapTools {
    fn default() -> Self {
        Self {
            pointer_readout: Some(PointerReadout::default()),
            ruler: Some(RulerOptions::default()),
        }
    }
}

impl MapTools {
    /// No tools at all.
    pub fn none() -> Self {
        Self {
            pointer_readout: None,
            ruler: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pointer_readout.is_none() && self.ruler.is_none()
    }
}
