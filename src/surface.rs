//! Map surfaces the synchronizer draws on.
//!
//! A surface is whatever owns the actual viewport: a browser map, a
//! document writer, or the in-memory [`RecordingSurface`].

use std::collections::{HashMap, HashSet};

use crate::render::{LayerControl, LayerGroup, LayerId, MarkerRef};
use crate::tools::MapTools;
use crate::Bounds;

/// Operations the layer synchronizer needs from a map viewport.
pub trait MapSurface {
    fn add_layer(&mut self, layer: &LayerGroup);

    fn remove_layer(&mut self, id: LayerId);

    fn set_layer_visible(&mut self, id: LayerId, visible: bool);

    /// Attach the layer toggle control. At most one is attached at a time.
    fn attach_control(&mut self, control: &LayerControl);

    fn detach_control(&mut self);

    /// (Re)attach the persistent map tools, replacing any attached before.
    fn attach_tools(&mut self, tools: &MapTools);

    /// Adjust the viewport so every point inside `bounds` is visible.
    fn fit_bounds(&mut self, bounds: &Bounds);

    fn set_marker_fill_opacity(&mut self, marker: MarkerRef, opacity: f64);
}

/// Headless surface that records what is currently drawn.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    layers: Vec<LayerGroup>,
    hidden: HashSet<LayerId>,
    control: Option<LayerControl>,
    fitted: Vec<Bounds>,
    opacity: HashMap<MarkerRef, f64>,
    tools: Option<MapTools>,
    tools_attached: usize,
    removed: usize,
}

impl RecordingSurface {
    /// Layers currently on the surface, in insertion order.
    pub fn layers(&self) -> &[LayerGroup] {
        &self.layers
    }

    pub fn control(&self) -> Option<&LayerControl> {
        self.control.as_ref()
    }

    /// Bounds of the most recent fit.
    pub fn fitted_bounds(&self) -> Option<&Bounds> {
        self.fitted.last()
    }

    pub fn fit_count(&self) -> usize {
        self.fitted.len()
    }

    /// Total layers removed over the surface's lifetime.
    pub fn removed_count(&self) -> usize {
        self.removed
    }

    pub fn tools(&self) -> Option<&MapTools> {
        self.tools.as_ref()
    }

    /// How many times tools were attached over the surface's lifetime.
    pub fn tools_attached(&self) -> usize {
        self.tools_attached
    }

    pub fn marker_count(&self) -> usize {
        self.layers.iter().map(LayerGroup::marker_count).sum()
    }

    pub fn is_visible(&self, id: LayerId) -> bool {
        self.layers.iter().any(|l| l.id == id) && !self.hidden.contains(&id)
    }

    pub fn marker_fill_opacity(&self, marker: MarkerRef) -> Option<f64> {
        self.opacity.get(&marker).copied()
    }
}

impl MapSurface for RecordingSurface {
    fn add_layer(&mut self, layer: &LayerGroup) {
        self.layers.push(layer.clone());
    }

    fn remove_layer(&mut self, id: LayerId) {
        let before = self.layers.len();
        self.layers.retain(|l| l.id != id);
        self.removed += before - self.layers.len();
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
        self.tools_attached += 1;
    }

    fn fit_bounds(&mut self, bounds: &Bounds) {
        self.fitted.push(*bounds);
    }

    fn set_marker_fill_opacity(&mut self, marker: MarkerRef, opacity: f64) {
        self.opacity.insert(marker, opacity);
    }
}
