//! Category style registry.
//!
//! Maps a trajectory category (`original`, `kalman`, `matched`, ...) to the
//! colours used for its polyline and point markers. Categories the registry
//! does not know fall back to an explicit default entry.

use std::collections::HashMap;

use serde::Serialize;

/// Fill opacity of a marker at rest.
pub const MARKER_FILL_OPACITY: f64 = 0.4;
/// Fill opacity of a marker under the pointer.
pub const MARKER_HOVER_FILL_OPACITY: f64 = 0.8;
/// Marker radius in pixels.
pub const MARKER_RADIUS: f64 = 4.5;
/// Marker outline weight in pixels.
pub const MARKER_OUTLINE_WEIGHT: f64 = 1.0;

// Outline lightness reduction (HSL, 0.0-1.0)
const OUTLINE_DARKEN: f64 = 0.2;

/// One colour stop of a heatmap gradient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradientStop {
    /// Position in the density range (0.0-1.0)
    pub offset: f64,
    pub color: String,
}

impl GradientStop {
    pub fn new(offset: f64, color: &str) -> Self {
        Self {
            offset,
            color: color.to_string(),
        }
    }
}

/// How a category's heatmap layer is drawn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatStyle {
    pub gradient: Vec<GradientStop>,
    /// Heat point radius in pixels
    pub radius: f64,
    /// Blur in pixels
    pub blur: f64,
    /// Opacity of the faintest cell
    pub min_opacity: f64,
}

impl Default for HeatStyle {
    /// Yellow to red, tight radius. Used for processed tracks.
    fn default() -> Self {
        Self {
            gradient: vec![GradientStop::new(0.3, "yellow"), GradientStop::new(0.65, "red")],
            radius: 5.0,
            blur: 6.0,
            min_opacity: 0.5,
        }
    }
}

impl HeatStyle {
    /// Blue to cyan, wide radius. Used for the raw track so the two
    /// densities stay distinguishable when overlaid.
    pub fn cool() -> Self {
        Self {
            gradient: vec![GradientStop::new(0.4, "blue"), GradientStop::new(0.65, "cyan")],
            radius: 10.0,
            blur: 15.0,
            min_opacity: 0.5,
        }
    }
}

/// Visual style of one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStyle {
    /// Marker fill colour (`#rrggbb`)
    pub fill_color: String,
    /// Marker outline colour, a darker shade of the fill
    pub outline_color: String,
    /// Polyline colour
    pub line_color: String,
    /// Polyline weight in pixels
    pub line_weight: f64,
    /// Heatmap layer appearance
    pub heat: HeatStyle,
}

impl CategoryStyle {
    /// Build a style, deriving the outline from the fill colour.
    ///
    /// An unparseable fill colour is reused as its own outline.
    pub fn new(fill_color: &str, line_color: &str, line_weight: f64) -> Self {
        let outline_color =
            darken_hex(fill_color, OUTLINE_DARKEN).unwrap_or_else(|| fill_color.to_string());
        Self {
            fill_color: fill_color.to_string(),
            outline_color,
            line_color: line_color.to_string(),
            line_weight,
            heat: HeatStyle::default(),
        }
    }

    pub fn with_heat(mut self, heat: HeatStyle) -> Self {
        self.heat = heat;
        self
    }
}

/// Lookup table from category key to style, with a default entry.
#[derive(Debug, Clone)]
pub struct StyleRegistry {
    entries: HashMap<String, CategoryStyle>,
    default: CategoryStyle,
}

impl Default for StyleRegistry {
    fn default() -> Self {
        let mut registry = Self::with_default(CategoryStyle::new("#000000", "#000000", 3.0));
        registry.insert(
            "original",
            CategoryStyle::new("#1395FF", "#006EC7", 3.0).with_heat(HeatStyle::cool()),
        );
        registry.insert("kalman", CategoryStyle::new("#C61613", "#931310", 3.0));
        registry.insert("filtered", CategoryStyle::new("#FF0000", "#FF0000", 3.0));
        registry.insert("matched", CategoryStyle::new("#EB96CE", "#FF87D5", 3.0));
        registry
    }
}

impl StyleRegistry {
    /// An empty registry where every category uses `default`.
    pub fn with_default(default: CategoryStyle) -> Self {
        Self {
            entries: HashMap::new(),
            default,
        }
    }

    /// Register or replace the style of a category.
    pub fn insert(&mut self, category: &str, style: CategoryStyle) {
        self.entries.insert(category.to_string(), style);
    }

    /// Style for a category, falling back to the default entry.
    pub fn get(&self, category: &str) -> &CategoryStyle {
        self.entries.get(category).unwrap_or(&self.default)
    }

    pub fn default_style(&self) -> &CategoryStyle {
        &self.default
    }

    pub fn contains(&self, category: &str) -> bool {
        self.entries.contains_key(category)
    }
}

/// Reduce the HSL lightness of a `#rgb` / `#rrggbb` colour.
pub fn darken_hex(hex: &str, amount: f64) -> Option<String> {
    let (r, g, b) = parse_hex(hex)?;
    let (h, s, l) = rgb_to_hsl(r, g, b);
    let (r, g, b) = hsl_to_rgb(h, s, (l - amount).max(0.0));
    Some(format!("#{:02x}{:02x}{:02x}", r, g, b))
}

fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.strip_prefix('#')?;
    // byte slicing below needs one byte per digit
    if !digits.is_ascii() {
        return None;
    }
    match digits.len() {
        6 => Some((
            u8::from_str_radix(&digits[0..2], 16).ok()?,
            u8::from_str_radix(&digits[2..4], 16).ok()?,
            u8::from_str_radix(&digits[4..6], 16).ok()?,
        )),
        3 => {
            let expand = |i: usize| u8::from_str_radix(&digits[i..i + 1].repeat(2), 16).ok();
            Some((expand(0)?, expand(1)?, expand(2)?))
        }
        _ => None,
    }
}

fn rgb_to_hsl(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let r = r as f64 / 255.0;
    let g = g as f64 / 255.0;
    let b = b as f64 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    if max == min {
        return (0.0, 0.0, l);
    }

    let d = max - min;
    let s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };
    let h = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };

    (h / 6.0, s, l)
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    let to_byte = |v: f64| (v * 255.0).round().clamp(0.0, 255.0) as u8;

    if s == 0.0 {
        let v = to_byte(l);
        return (v, v, v);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    (
        to_byte(hue_to_channel(p, q, h + 1.0 / 3.0)),
        to_byte(hue_to_channel(p, q, h)),
        to_byte(hue_to_channel(p, q, h - 1.0 / 3.0)),
    )
}

fn hue_to_channel(p: f64, q: f64, mut t: f64) -> f64 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}
