//! # Map Layer Synchronizer
//!
//! Turns a decoded [`FeatureCollection`] into map layers and keeps a
//! [`MapSurface`] in sync with them.
//!
//! ## Render cycle
//! 1. Partition features by category (first-appearance order)
//! 2. Build one polyline and one marker layer per non-empty category, plus
//!    a density heatmap layer when [`SyncConfig::heatmap`] is set
//! 3. Tear down the previous render state (layers + toggle control) and
//!    re-attach the map tools
//! 4. Add the new layers and a toggle control with one entry per layer
//! 5. Fit the viewport to all rendered points, if there are any
//!
//! The render state is always replaced wholesale. Nothing from a previous
//! render survives into the next one; only the map tools (ruler, pointer
//! readout) stay on the surface.

use log::{debug, error, info};
use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde::Serialize;

use crate::error::Result;
use crate::geo_utils::{compute_bounds, haversine_distance, meters_to_degrees, polyline_length};
use crate::geojson::{CategoryTrack, FeatureCollection};
use crate::heatmap::{density_cells, HeatmapCell, HeatmapConfig};
use crate::style::{
    CategoryStyle, GradientStop, StyleRegistry, MARKER_FILL_OPACITY, MARKER_HOVER_FILL_OPACITY,
    MARKER_OUTLINE_WEIGHT, MARKER_RADIUS,
};
use crate::surface::MapSurface;
use crate::tools::MapTools;
use crate::{Bounds, GpsPoint};

/// Identifier of a rendered layer, unique for the synchronizer's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LayerId(pub u64);

/// Address of a single marker inside a marker layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MarkerRef {
    pub layer: LayerId,
    pub index: usize,
}

/// A polyline through one category's points, in received order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolylineLayer {
    pub points: Vec<GpsPoint>,
    pub color: String,
    pub weight: f64,
}

/// A circle marker with its tooltip and popup content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointMarker {
    pub point: GpsPoint,
    pub time: String,
    /// HTML shown on hover
    pub tooltip: String,
    /// HTML shown on click
    pub popup: String,
}

/// All markers of one category, sharing a style.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerLayer {
    pub markers: Vec<PointMarker>,
    pub fill_color: String,
    pub outline_color: String,
    pub radius: f64,
    pub weight: f64,
    pub fill_opacity: f64,
    pub hover_fill_opacity: f64,
}

/// Point density of one category, one weighted heat point per grid cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapLayer {
    pub cells: Vec<HeatmapCell>,
    pub cell_size_meters: f64,
    pub gradient: Vec<GradientStop>,
    pub radius: f64,
    pub blur: f64,
    pub min_opacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerContent {
    Polyline(PolylineLayer),
    Markers(MarkerLayer),
    Heatmap(HeatmapLayer),
}

/// An independently toggleable bundle of rendered elements.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerGroup {
    pub id: LayerId,
    pub category: String,
    /// Toggle control label, e.g. `Polyline: original`
    pub label: String,
    pub visible: bool,
    pub content: LayerContent,
}

impl LayerGroup {
    pub fn marker_count(&self) -> usize {
        match &self.content {
            LayerContent::Markers(layer) => layer.markers.len(),
            LayerContent::Polyline(_) | LayerContent::Heatmap(_) => 0,
        }
    }

    pub fn is_polyline(&self) -> bool {
        matches!(self.content, LayerContent::Polyline(_))
    }

    pub fn is_heatmap(&self) -> bool {
        matches!(self.content, LayerContent::Heatmap(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlEntry {
    pub label: String,
    pub layer: LayerId,
}

/// Layer toggle control: one entry per rendered layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerControl {
    pub entries: Vec<ControlEntry>,
    pub collapsed: bool,
}

/// Synchronizer settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Pointer distance within which a marker counts as hovered/clicked.
    /// Default: 15.0 meters
    pub hover_tolerance_meters: f64,
    /// Whether the toggle control starts collapsed.
    /// Default: true
    pub collapsed_control: bool,
    /// Add a `Heatmap: <type>` layer per category.
    /// Default: None (polylines and points only)
    pub heatmap: Option<HeatmapConfig>,
    /// Tools kept on the surface across renders.
    /// Default: pointer readout (top right) and ruler (bottom left)
    pub tools: MapTools,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            hover_tolerance_meters: 15.0,
            collapsed_control: true,
            heatmap: None,
            tools: MapTools::default(),
        }
    }
}

/// Per-category result of a render.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySummary {
    pub category: String,
    pub points: usize,
    pub length_meters: f64,
}

/// What a render produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSummary {
    pub categories: Vec<CategorySummary>,
    pub layer_count: usize,
    pub marker_count: usize,
    /// Features dropped for invalid geometry
    pub rejected: usize,
    pub bounds: Option<Bounds>,
}

type MarkerEntry = GeomWithData<[f64; 2], MarkerRef>;

/// Spatial index over the current markers (x = lng, y = lat).
struct MarkerIndex {
    tree: RTree<MarkerEntry>,
}

impl MarkerIndex {
    fn build(layers: &[LayerGroup]) -> Self {
        let entries: Vec<MarkerEntry> = layers
            .iter()
            .filter_map(|group| match &group.content {
                LayerContent::Markers(layer) => Some((group.id, layer)),
                _ => None,
            })
            .flat_map(|(id, layer)| {
                layer.markers.iter().enumerate().map(move |(index, marker)| {
                    GeomWithData::new(
                        [marker.point.longitude, marker.point.latitude],
                        MarkerRef { layer: id, index },
                    )
                })
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }
}

/// Everything currently drawn on the surface.
pub struct RenderState {
    layers: Vec<LayerGroup>,
    control: Option<LayerControl>,
    bounds: Option<Bounds>,
    index: MarkerIndex,
    hovered: Option<MarkerRef>,
}

impl Default for RenderState {
    fn default() -> Self {
        Self::new(Vec::new(), None, None)
    }
}

impl std::fmt::Debug for RenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderState")
            .field("layers", &self.layers.len())
            .field("control", &self.control.as_ref().map(|c| c.entries.len()))
            .field("bounds", &self.bounds)
            .field("hovered", &self.hovered)
            .finish()
    }
}

impl RenderState {
    fn new(layers: Vec<LayerGroup>, control: Option<LayerControl>, bounds: Option<Bounds>) -> Self {
        let index = MarkerIndex::build(&layers);
        Self {
            layers,
            control,
            bounds,
            index,
            hovered: None,
        }
    }

    pub fn layers(&self) -> &[LayerGroup] {
        &self.layers
    }

    pub fn control(&self) -> Option<&LayerControl> {
        self.control.as_ref()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn hovered(&self) -> Option<MarkerRef> {
        self.hovered
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn polyline_count(&self) -> usize {
        self.layers.iter().filter(|l| l.is_polyline()).count()
    }

    pub fn marker_count(&self) -> usize {
        self.layers.iter().map(LayerGroup::marker_count).sum()
    }

    pub fn layer(&self, id: LayerId) -> Option<&LayerGroup> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn marker(&self, marker: MarkerRef) -> Option<&PointMarker> {
        match &self.layer(marker.layer)?.content {
            LayerContent::Markers(layer) => layer.markers.get(marker.index),
            _ => None,
        }
    }

    /// Nearest visible marker within `tolerance_meters` of `point`.
    ///
    /// Candidates come from the R-tree in order of planar distance (degrees,
    /// pruned with the tolerance converted at the pointer latitude) and are
    /// confirmed with the haversine distance. Markers of hidden layers are
    /// skipped.
    ///
    /// # Arguments
    ///
    /// * `point` - Pointer position
    /// * `tolerance_meters` - Maximum pointer-to-marker distance
    ///
    /// # Returns
    ///
    /// The closest matching marker, or `None` if nothing visible is in range.
    pub fn marker_near(&self, point: &GpsPoint, tolerance_meters: f64) -> Option<MarkerRef> {
        let query = [point.longitude, point.latitude];
        let tolerance_deg = meters_to_degrees(tolerance_meters, point.latitude);
        let max_dist_2 = tolerance_deg * tolerance_deg;

        self.index
            .tree
            .nearest_neighbor_iter_with_distance_2(&query)
            .take_while(|(_, dist_2)| *dist_2 <= max_dist_2)
            .map(|(entry, _)| entry.data)
            .find(|marker| {
                let visible = self.layer(marker.layer).is_some_and(|l| l.visible);
                visible
                    && self
                        .marker(*marker)
                        .is_some_and(|m| haversine_distance(&m.point, point) <= tolerance_meters)
            })
    }
}

/// Keeps a map surface in sync with the latest trajectory data.
pub struct MapSynchronizer<S: MapSurface> {
    surface: S,
    styles: StyleRegistry,
    config: SyncConfig,
    state: RenderState,
    next_layer_id: u64,
}

impl<S: MapSurface> MapSynchronizer<S> {
    /// Synchronizer with the default style registry and config.
    pub fn new(surface: S) -> Self {
        Self::with_styles(surface, StyleRegistry::default(), SyncConfig::default())
    }

    /// Synchronizer with explicit styles and config. Attaches the map tools.
    pub fn with_styles(mut surface: S, styles: StyleRegistry, config: SyncConfig) -> Self {
        if !config.tools.is_empty() {
            surface.attach_tools(&config.tools);
        }
        Self {
            surface,
            styles,
            config,
            state: RenderState::default(),
            next_layer_id: 0,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn styles(&self) -> &StyleRegistry {
        &self.styles
    }

    /// Decode a backend response body and render it.
    ///
    /// On a decoding error the current render state is left untouched.
    pub fn render_body(&mut self, body: &str) -> Result<RenderSummary> {
        let collection = FeatureCollection::parse(body).map_err(|e| {
            error!("[MapSynchronizer] Rejected response, keeping current view: {}", e);
            e
        })?;
        Ok(self.render(&collection))
    }

    /// Replace the current render state with layers built from `collection`.
    ///
    /// Every layer and the toggle control of the previous render are removed
    /// before the new ones are added. Categories left empty by validation get
    /// no layers. The viewport is fitted only when at least one point was
    /// rendered.
    ///
    /// # Arguments
    ///
    /// * `collection` - Validated features, any number of categories
    ///
    /// # Returns
    ///
    /// Per-category point counts and track lengths, layer and marker totals,
    /// the rejected feature count and the fitted bounds.
    ///
    /// # Example
    ///
    /// ```rust
    /// use track_overlay::{FeatureCollection, MapSynchronizer, RecordingSurface};
    ///
    /// let body = r#"{"features": [
    ///     {"geometry": {"coordinates": [116.30, 39.90]}, "properties": {"type": "original"}},
    ///     {"geometry": {"coordinates": [null, null]}, "properties": {"type": "matched"}}
    /// ]}"#;
    /// let mut sync = MapSynchronizer::new(RecordingSurface::default());
    /// let summary = sync.render(&FeatureCollection::parse(body).unwrap());
    ///
    /// assert_eq!(summary.layer_count, 2);
    /// assert_eq!(summary.rejected, 1);
    /// assert!(summary.bounds.is_some());
    /// ```
    pub fn render(&mut self, collection: &FeatureCollection) -> RenderSummary {
        let tracks = collection.partition();
        let heatmap = self.config.heatmap.clone();

        let mut layers = Vec::with_capacity(tracks.len() * 3);
        let mut categories = Vec::with_capacity(tracks.len());
        let mut all_points = Vec::with_capacity(collection.len());

        for track in tracks.iter().filter(|t| !t.features.is_empty()) {
            let style = self.styles.get(&track.category).clone();
            let points = track.points();

            let polyline_id = self.allocate_id();
            layers.push(build_polyline(polyline_id, track, &points, &style));
            let markers_id = self.allocate_id();
            layers.push(build_markers(markers_id, track, &style));
            if let Some(config) = &heatmap {
                let heatmap_id = self.allocate_id();
                layers.push(build_heatmap(heatmap_id, track, &points, &style, config));
            }

            categories.push(CategorySummary {
                category: track.category.clone(),
                points: points.len(),
                length_meters: polyline_length(&points),
            });
            all_points.extend(points);
        }

        let bounds = compute_bounds(&all_points);
        let control = (!layers.is_empty()).then(|| LayerControl {
            entries: layers
                .iter()
                .map(|l| ControlEntry {
                    label: l.label.clone(),
                    layer: l.id,
                })
                .collect(),
            collapsed: self.config.collapsed_control,
        });

        self.teardown();

        for layer in &layers {
            self.surface.add_layer(layer);
        }
        if let Some(control) = &control {
            self.surface.attach_control(control);
        }
        match &bounds {
            Some(b) => self.surface.fit_bounds(b),
            None => debug!("[MapSynchronizer] No valid points, viewport unchanged"),
        }

        self.state = RenderState::new(layers, control, bounds);

        let summary = RenderSummary {
            layer_count: self.state.layers.len(),
            marker_count: self.state.marker_count(),
            rejected: collection.rejected(),
            categories,
            bounds,
        };

        for c in &summary.categories {
            info!(
                "[MapSynchronizer] {}: {} points, {:.0}m",
                c.category, c.points, c.length_meters
            );
        }
        info!(
            "[MapSynchronizer] Rendered {} layers ({} markers, {} rejected features)",
            summary.layer_count, summary.marker_count, summary.rejected
        );

        summary
    }

    /// Remove everything from the surface.
    pub fn clear(&mut self) {
        self.teardown();
        self.state = RenderState::default();
    }

    /// Apply the toggle control's effect for the entry labelled `label`.
    ///
    /// Returns `false` when no current layer has that label.
    pub fn set_layer_visible(&mut self, label: &str, visible: bool) -> bool {
        let Some(layer) = self.state.layers.iter_mut().find(|l| l.label == label) else {
            return false;
        };
        let id = layer.id;
        if layer.visible != visible {
            layer.visible = visible;
            self.surface.set_layer_visible(id, visible);
        }
        if !visible && self.state.hovered.is_some_and(|h| h.layer == id) {
            self.set_hovered(None);
        }
        true
    }

    /// Update hover styling for a pointer at `point`.
    ///
    /// The marker under the pointer gets the hover opacity and the marker
    /// hovered before it is restored.
    pub fn pointer_moved(&mut self, point: GpsPoint) -> Option<MarkerRef> {
        let target = self
            .state
            .marker_near(&point, self.config.hover_tolerance_meters);
        self.set_hovered(target);
        target
    }

    pub fn pointer_left(&mut self) {
        self.set_hovered(None);
    }

    /// Popup content of the marker under `point`, if any.
    pub fn click(&self, point: GpsPoint) -> Option<&str> {
        let marker = self
            .state
            .marker_near(&point, self.config.hover_tolerance_meters)?;
        self.state.marker(marker).map(|m| m.popup.as_str())
    }

    fn set_hovered(&mut self, target: Option<MarkerRef>) {
        let previous = self.state.hovered;
        if previous == target {
            return;
        }
        if let Some(prev) = previous {
            self.surface.set_marker_fill_opacity(prev, MARKER_FILL_OPACITY);
        }
        if let Some(next) = target {
            self.surface.set_marker_fill_opacity(next, MARKER_HOVER_FILL_OPACITY);
        }
        self.state.hovered = target;
    }

    fn teardown(&mut self) {
        for layer in &self.state.layers {
            self.surface.remove_layer(layer.id);
        }
        if self.state.control.is_some() {
            self.surface.detach_control();
        }
        if !self.config.tools.is_empty() {
            self.surface.attach_tools(&self.config.tools);
        }
    }

    fn allocate_id(&mut self) -> LayerId {
        self.next_layer_id += 1;
        LayerId(self.next_layer_id)
    }
}

fn build_polyline(
    id: LayerId,
    track: &CategoryTrack,
    points: &[GpsPoint],
    style: &CategoryStyle,
) -> LayerGroup {
    LayerGroup {
        id,
        category: track.category.clone(),
        label: format!("Polyline: {}", track.category),
        visible: true,
        content: LayerContent::Polyline(PolylineLayer {
            points: points.to_vec(),
            color: style.line_color.clone(),
            weight: style.line_weight,
        }),
    }
}

fn build_markers(id: LayerId, track: &CategoryTrack, style: &CategoryStyle) -> LayerGroup {
    let title = escape_html(&capitalize(&track.category));
    let markers = track
        .features
        .iter()
        .map(|f| {
            let label = format!(
                "<strong>{}</strong><br>Coordinates: {}, {}<br>Time: {}",
                title,
                f.point.latitude,
                f.point.longitude,
                escape_html(&f.time)
            );
            PointMarker {
                point: f.point,
                time: f.time.clone(),
                tooltip: label.clone(),
                popup: label,
            }
        })
        .collect();

    LayerGroup {
        id,
        category: track.category.clone(),
        label: format!("Points: {}", track.category),
        visible: true,
        content: LayerContent::Markers(MarkerLayer {
            markers,
            fill_color: style.fill_color.clone(),
            outline_color: style.outline_color.clone(),
            radius: MARKER_RADIUS,
            weight: MARKER_OUTLINE_WEIGHT,
            fill_opacity: MARKER_FILL_OPACITY,
            hover_fill_opacity: MARKER_HOVER_FILL_OPACITY,
        }),
    }
}

fn build_heatmap(
    id: LayerId,
    track: &CategoryTrack,
    points: &[GpsPoint],
    style: &CategoryStyle,
    config: &HeatmapConfig,
) -> LayerGroup {
    LayerGroup {
        id,
        category: track.category.clone(),
        label: format!("Heatmap: {}", track.category),
        visible: true,
        content: LayerContent::Heatmap(HeatmapLayer {
            cells: density_cells(points, config),
            cell_size_meters: config.cell_size_meters,
            gradient: style.heat.gradient.clone(),
            radius: style.heat.radius,
            blur: style.heat.blur,
            min_opacity: style.heat.min_opacity,
        }),
    }
}

/// Uppercase the first character: `kalman` -> `Kalman`.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
