//! Point density grid for heatmap layers.
//!
//! Bins a track's points into a sparse grid of square cells and normalizes
//! every cell's visit count against the busiest cell. The map draws one
//! weighted heat point per cell, so places where a track lingers (stops,
//! GPS jitter around a fix) stand out from the rest of it.

use std::collections::HashMap;

use log::warn;
use serde::Serialize;

use crate::GpsPoint;

const METERS_PER_DEGREE: f64 = 111_320.0;

/// Configuration for heatmap layers.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapConfig {
    /// Grid cell size in meters (default: 25m)
    pub cell_size_meters: f64,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            cell_size_meters: 25.0,
        }
    }
}

/// A single non-empty cell of the grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapCell {
    /// Grid row index
    pub row: i32,
    /// Grid column index
    pub col: i32,
    /// Cell center for rendering
    pub center: GpsPoint,
    /// Normalized density (0.0-1.0)
    pub density: f64,
    /// Points that fell into this cell
    pub visit_count: u32,
}

type CellCoord = (i32, i32);

struct HeatmapGrid {
    cell_size_meters: f64,
    ref_lat: f64,
    cells: HashMap<CellCoord, u32>,
}

impl HeatmapGrid {
    fn new(cell_size_meters: f64, ref_lat: f64) -> Self {
        Self {
            cell_size_meters,
            ref_lat,
            cells: HashMap::new(),
        }
    }

    fn lng_meters_per_degree(&self) -> f64 {
        METERS_PER_DEGREE * self.ref_lat.to_radians().cos().max(0.1)
    }

    fn to_grid_coords(&self, point: &GpsPoint) -> CellCoord {
        let row = ((point.latitude - self.ref_lat) * METERS_PER_DEGREE / self.cell_size_meters)
            .floor() as i32;
        let col = (point.longitude * self.lng_meters_per_degree() / self.cell_size_meters)
            .floor() as i32;
        (row, col)
    }

    fn cell_center(&self, row: i32, col: i32) -> GpsPoint {
        GpsPoint::new(
            self.ref_lat + (row as f64 + 0.5) * self.cell_size_meters / METERS_PER_DEGREE,
            (col as f64 + 0.5) * self.cell_size_meters / self.lng_meters_per_degree(),
        )
    }

    fn add_point(&mut self, point: &GpsPoint) {
        let coord = self.to_grid_coords(point);
        *self.cells.entry(coord).or_insert(0) += 1;
    }

    fn build(self) -> Vec<HeatmapCell> {
        let max_visits = self.cells.values().copied().max().unwrap_or(1);

        let mut cells: Vec<HeatmapCell> = self
            .cells
            .iter()
            .map(|(&(row, col), &visit_count)| HeatmapCell {
                row,
                col,
                center: self.cell_center(row, col),
                density: visit_count as f64 / max_visits as f64,
                visit_count,
            })
            .collect();

        cells.sort_by_key(|c| (c.row, c.col));
        cells
    }
}

/// Bin `points` into density cells, sorted by row then column.
///
/// The first point's latitude anchors the grid. A non-positive or
/// non-finite cell size falls back to the default.
///
/// # Arguments
///
/// * `points` - Track points in any order
/// * `config` - Grid settings
///
/// # Returns
///
/// Non-empty cells only; empty input gives an empty vector.
///
/// # Example
///
/// ```rust
/// use track_overlay::{GpsPoint, heatmap};
///
/// let stop = GpsPoint::new(39.9, 116.3);
/// let cells = heatmap::density_cells(&[stop, stop, stop], &heatmap::HeatmapConfig::default());
/// assert_eq!(cells.len(), 1);
/// assert_eq!(cells[0].visit_count, 3);
/// assert_eq!(cells[0].density, 1.0);
/// ```
pub fn density_cells(points: &[GpsPoint], config: &HeatmapConfig) -> Vec<HeatmapCell> {
    let Some(first) = points.first() else {
        return Vec::new();
    };

    let cell_size = if config.cell_size_meters.is_finite() && config.cell_size_meters > 0.0 {
        config.cell_size_meters
    } else {
        let fallback = HeatmapConfig::default().cell_size_meters;
        warn!(
            "[Heatmap] Invalid cell size {}, using {}m",
            config.cell_size_meters, fallback
        );
        fallback
    };

    let mut grid = HeatmapGrid::new(cell_size, first.latitude);
    for point in points {
        grid.add_point(point);
    }
    grid.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::haversine_distance;

    #[test]
    fn test_empty_points() {
        assert!(density_cells(&[], &HeatmapConfig::default()).is_empty());
    }

    #[test]
    fn test_density_normalized_to_busiest_cell() {
        let stop = GpsPoint::new(39.9000, 116.3000);
        // ~550m north, well outside the first cell
        let passing = GpsPoint::new(39.9050, 116.3000);
        let points = vec![stop, stop, stop, stop, passing];

        let cells = density_cells(&points, &HeatmapConfig::default());
        assert_eq!(cells.len(), 2);

        let busiest = cells.iter().find(|c| c.visit_count == 4).unwrap();
        let quiet = cells.iter().find(|c| c.visit_count == 1).unwrap();
        assert_eq!(busiest.density, 1.0);
        assert!((quiet.density - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_cell_center_near_points() {
        let config = HeatmapConfig { cell_size_meters: 50.0 };
        let point = GpsPoint::new(39.9012, 116.3034);
        let cells = density_cells(&[point], &config);

        // center is at most half a cell diagonal away
        assert!(haversine_distance(&cells[0].center, &point) < 50.0);
    }

    #[test]
    fn test_nearby_points_share_cell() {
        let config = HeatmapConfig { cell_size_meters: 100.0 };
        let a = GpsPoint::new(39.90001, 116.30001);
        let b = GpsPoint::new(39.90002, 116.30002);
        let cells = density_cells(&[a, b], &config);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].visit_count, 2);
    }

    #[test]
    fn test_invalid_cell_size_uses_default() {
        let point = GpsPoint::new(39.9, 116.3);
        for size in [0.0, -5.0, f64::NAN] {
            let cells = density_cells(&[point], &HeatmapConfig { cell_size_meters: size });
            assert_eq!(cells.len(), 1);
            assert!(cells[0].center.latitude.is_finite());
        }
    }

    #[test]
    fn test_cells_sorted() {
        let points: Vec<GpsPoint> = (0..5)
            .rev()
            .map(|i| GpsPoint::new(39.9 + i as f64 * 0.01, 116.3))
            .collect();
        let cells = density_cells(&points, &HeatmapConfig::default());
        assert!(cells.windows(2).all(|w| (w[0].row, w[0].col) < (w[1].row, w[1].col)));
    }
}
