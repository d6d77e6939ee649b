//! Standalone Leaflet page writer.
//!
//! [`LeafletDocument`] is a [`MapSurface`] that keeps the drawn layers in
//! memory and renders them into a self-contained HTML page (Leaflet from a
//! CDN, CARTO light tiles). Useful for sharing a snapshot of a render
//! without running the web app.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::render::{escape_html, LayerControl, LayerGroup, LayerId, MarkerRef};
use crate::surface::MapSurface;
use crate::tools::MapTools;
use crate::Bounds;

/// Initial view before any bounds are fitted (Beijing).
pub const DEFAULT_CENTER: [f64; 2] = [39.926117, 116.315750];
pub const DEFAULT_ZOOM: u8 = 13;

const PAGE_TEMPLATE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>{{TITLE}}</title>
  <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" />
  <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
  <script src="https://unpkg.com/leaflet.heat@0.2.0/dist/leaflet-heat.js"></script>
  <link rel="stylesheet" href="https://cdn.jsdelivr.net/gh/gokertanrisever/leaflet-ruler@master/src/leaflet-ruler.css" />
  <script src="https://cdn.jsdelivr.net/gh/gokertanrisever/leaflet-ruler@master/src/leaflet-ruler.js"></script>
  <style>
    html, body { height: 100%; margin: 0; }
    #map { position: absolute; inset: 0; }
  </style>
</head>
<body>
  <div id="map"></div>
  <script>
    const snapshot = {{DATA}};
    const map = L.map('map').setView(snapshot.center, snapshot.zoom);
    L.tileLayer('https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}.png', {
      maxZoom: 20,
      attribution: '&copy; <a href="https://carto.com/attributions">CARTO</a> contributors'
    }).addTo(map);

    const byId = {};
    for (const layer of snapshot.layers) {
      const content = layer.content;
      let group;
      if (content.kind === 'polyline') {
        const latlngs = content.points.map(p => [p.latitude, p.longitude]);
        group = L.layerGroup([L.polyline(latlngs, { color: content.color, weight: content.weight })]);
      } else if (content.kind === 'heatmap') {
        const heat = content.cells.map(c => [c.center.latitude, c.center.longitude, c.density]);
        const gradient = {};
        for (const stop of content.gradient) {
          gradient[stop.offset] = stop.color;
        }
        group = L.layerGroup([L.heatLayer(heat, {
          radius: content.radius,
          blur: content.blur,
          minOpacity: content.min_opacity,
          gradient: gradient
        })]);
      } else {
        group = L.layerGroup();
        for (const m of content.markers) {
          const marker = L.circleMarker([m.point.latitude, m.point.longitude], {
            radius: content.radius,
            fillColor: content.fill_color,
            color: content.outline_color,
            weight: content.weight,
            opacity: 1,
            fillOpacity: content.fill_opacity
          });
          marker.bindTooltip(m.tooltip, { permanent: false, direction: 'auto' });
          marker.bindPopup(m.popup);
          marker.on('mouseover', function () { this.setStyle({ fillOpacity: content.hover_fill_opacity }); });
          marker.on('mouseout', function () { this.setStyle({ fillOpacity: content.fill_opacity }); });
          group.addLayer(marker);
        }
      }
      byId[layer.id] = group;
      if (layer.visible) {
        group.addTo(map);
      }
    }

    if (snapshot.control) {
      const overlays = {};
      for (const entry of snapshot.control.entries) {
        overlays[entry.label] = byId[entry.layer];
      }
      L.control.layers(null, overlays, { collapsed: snapshot.control.collapsed }).addTo(map);
    }

    const tools = snapshot.tools || {};
    if (tools.pointer_readout) {
      const readout = tools.pointer_readout;
      const PointerReadout = L.Control.extend({
        onAdd: function (m) {
          const div = L.DomUtil.create('div', 'leaflet-control-attribution');
          m.on('mousemove', e => {
            div.innerHTML = e.latlng.lat.toFixed(readout.decimals) + ' : ' + e.latlng.lng.toFixed(readout.decimals);
          });
          return div;
        }
      });
      new PointerReadout({ position: readout.position }).addTo(map);
    }
    if (tools.ruler) {
      const ruler = tools.ruler;
      L.control.ruler({
        position: ruler.position,
        circleMarker: false,
        lineStyle: { color: ruler.line_color, dashArray: ruler.dash_array },
        lengthUnit: { display: ruler.unit, decimal: ruler.decimals, factor: ruler.unit === 'm' ? 1000 : null }
      }).addTo(map);
    }

    if (snapshot.bounds) {
      map.fitBounds(snapshot.bounds);
    }
  </script>
</body>
</html>
"#;

#[derive(Serialize)]
struct Snapshot<'a> {
    center: [f64; 2],
    zoom: u8,
    layers: Vec<&'a LayerGroup>,
    control: Option<&'a LayerControl>,
    tools: Option<&'a MapTools>,
    bounds: Option<[[f64; 2]; 2]>,
}

/// A map surface that renders to a standalone HTML page.
#[derive(Debug)]
pub struct LeafletDocument {
    title: String,
    layers: Vec<LayerGroup>,
    hidden: HashSet<LayerId>,
    control: Option<LayerControl>,
    tools: Option<MapTools>,
    bounds: Option<Bounds>,
    opacity: HashMap<MarkerRef, f64>,
}

impl Default for LeafletDocument {
    fn default() -> Self {
        Self::new("Trajectory map")
    }
}

impl LeafletDocument {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            layers: Vec::new(),
            hidden: HashSet::new(),
            control: None,
            tools: None,
            bounds: None,
            opacity: HashMap::new(),
        }
    }

    /// Set the page title, e.g. the cascade heading.
    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn marker_fill_opacity(&self, marker: MarkerRef) -> Option<f64> {
        self.opacity.get(&marker).copied()
    }

    /// Render the current surface contents as an HTML page.
    pub fn to_html(&self) -> crate::Result<String> {
        let layers: Vec<&LayerGroup> = self.layers.iter().collect();
        let snapshot = Snapshot {
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
            layers,
            control: self.control.as_ref(),
            tools: self.tools.as_ref(),
            bounds: self.bounds.map(|b| b.corners()),
        };

        let mut data = serde_json::to_value(&snapshot)?;
        // Visibility is tracked by the surface, not the layer copies.
        if let Some(array) = data.get_mut("layers").and_then(|v| v.as_array_mut()) {
            for (value, layer) in array.iter_mut().zip(&self.layers) {
                if let Some(object) = value.as_object_mut() {
                    object.insert(
                        "visible".to_string(),
                        serde_json::Value::Bool(!self.hidden.contains(&layer.id)),
                    );
                }
            }
        }

        // "</script>" inside string data must not close the script element
        let data = serde_json::to_string(&data)?.replace("</", "<\\/");

        Ok(PAGE_TEMPLATE
            .replace("{{TITLE}}", &escape_html(&self.title))
            .replace("{{DATA}}", &data))
    }
}

impl MapSurface for LeafletDocument {
    fn add_layer(&mut self, layer: &LayerGroup) {
        self.layers.push(layer.clone());
    }

    fn remove_layer(&mut self, id: LayerId) {
        self.layers.retain(|l| l.id != id);
        self.hidden.remove(&id);
        self.opacity.retain(|m, _| m.layer != id);
    }

    fn set_layer_visible(&mut self, id: LayerId, visible: bool) {
        if visible {
            self.hidden.remove(&id);
        } else {
            self.hidden.insert(id);
        }
    }

    fn attach_control(&mut self, control: &LayerControl) {
        self.control = Some(control.clone());
    }

    fn detach_control(&mut self) {
        self.control = None;
    }

    fn attach_tools(&mut self, tools: &MapTools) {
        self.tools = Some(tools.clone());
    }

    fn fit_bounds(&mut self, bounds: &Bounds) {
        self.bounds = Some(*bounds);
    }

    fn set_marker_fill_opacity(&mut self, marker: MarkerRef, opacity: f64) {
        // Hover is handled in the page itself; track it so snapshots stay consistent.
        self.opacity.insert(marker, opacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FeatureCollection, MapSynchronizer};

    const BODY: &str = r#"{"features": [
        {"geometry": {"coordinates": [116.30, 39.90]}, "properties": {"type": "original", "time": "t1"}},
        {"geometry": {"coordinates": [116.31, 39.91]}, "properties": {"type": "kalman", "time": "</script>"}}
    ]}"#;

    fn rendered() -> MapSynchronizer<LeafletDocument> {
        let mut sync = MapSynchronizer::new(LeafletDocument::new("Person 0 on 2008-10-23"));
        sync.render(&FeatureCollection::parse(BODY).unwrap());
        sync
    }

    #[test]
    fn test_page_contains_layers_and_bounds() {
        let sync = rendered();
        let html = sync.surface().to_html().unwrap();

        assert_eq!(sync.surface().layer_count(), 4);
        assert!(html.contains("<title>Person 0 on 2008-10-23</title>"));
        assert!(html.contains("Polyline: original"));
        assert!(html.contains("Points: kalman"));
        assert!(html.contains("[[39.9,116.3],[39.91,116.31]]"));
    }

    #[test]
    fn test_script_close_is_escaped() {
        let html = rendered().surface().to_html().unwrap();
        let tags = PAGE_TEMPLATE.matches("</script>").count();
        assert_eq!(html.matches("</script>").count(), tags);
    }

    #[test]
    fn test_hidden_layer_marked_invisible() {
        let mut sync = rendered();
        sync.set_layer_visible("Polyline: original", false);
        let html = sync.surface().to_html().unwrap();
        assert!(html.contains(r#""visible":false"#));
    }

    #[test]
    fn test_hover_tracked() {
        let mut sync = rendered();
        let marker = sync.pointer_moved(crate::GpsPoint::new(39.90, 116.30)).unwrap();
        assert_eq!(sync.surface().marker_fill_opacity(marker), Some(0.8));
    }

    #[test]
    fn test_heatmap_and_tools_embedded() {
        let config = crate::SyncConfig {
            heatmap: Some(crate::HeatmapConfig::default()),
            ..crate::SyncConfig::default()
        };
        let mut sync = MapSynchronizer::with_styles(
            LeafletDocument::default(),
            crate::StyleRegistry::default(),
            config,
        );
        sync.render(&FeatureCollection::parse(BODY).unwrap());
        let html = sync.surface().to_html().unwrap();

        assert_eq!(sync.surface().layer_count(), 6);
        assert!(html.contains(r#""kind":"heatmap""#));
        assert!(html.contains("Heatmap: kalman"));
        assert!(html.contains(r#""position":"bottomleft""#));
        assert!(html.contains(r#""position":"topright""#));
    }

    #[test]
    fn test_tools_kept_after_clear() {
        let mut sync = rendered();
        sync.clear();
        let html = sync.surface().to_html().unwrap();
        assert!(html.contains(r#""layers":[]"#));
        assert!(html.contains(r#""ruler":{"#));
    }

    #[test]
    fn test_empty_document() {
        let html = LeafletDocument::default().to_html().unwrap();
        assert!(html.contains(r#""layers":[]"#));
        assert!(html.contains(r#""bounds":null"#));
    }
}
