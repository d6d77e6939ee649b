//! Render a GeoJSON trajectory file into a standalone Leaflet page.
//!
//! Run with: cargo run --example render_snapshot -- track.geojson map.html
//!
//! Without arguments a small built-in sample is rendered to `trajectory.html`.
//! Each category also gets a density heatmap layer (off in the toggle control
//! by unticking `Heatmap: <type>`).

use track_overlay::{
    FeatureCollection, HeatmapConfig, LeafletDocument, MapSynchronizer, StyleRegistry, SyncConfig,
};

const SAMPLE: &str = r#"{"type": "FeatureCollection", "features": [
    {"geometry": {"coordinates": [116.3000, 39.9000]}, "properties": {"type": "original", "time": "2008-10-23 02:53:04"}},
    {"geometry": {"coordinates": [116.3012, 39.9007]}, "properties": {"type": "original", "time": "2008-10-23 02:53:10"}},
    {"geometry": {"coordinates": [116.3025, 39.9011]}, "properties": {"type": "original", "time": "2008-10-23 02:53:15"}},
    {"geometry": {"coordinates": [116.3001, 39.9002]}, "properties": {"type": "kalman", "time": "2008-10-23 02:53:04"}},
    {"geometry": {"coordinates": [116.3011, 39.9006]}, "properties": {"type": "kalman", "time": "2008-10-23 02:53:10"}},
    {"geometry": {"coordinates": [116.3023, 39.9010]}, "properties": {"type": "kalman", "time": "2008-10-23 02:53:15"}},
    {"geometry": {"coordinates": [null, null]}, "properties": {"type": "matched", "time": "2008-10-23 02:53:04"}}
]}"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let body = match args.next() {
        Some(path) => std::fs::read_to_string(path)?,
        None => SAMPLE.to_string(),
    };
    let output = args.next().unwrap_or_else(|| "trajectory.html".to_string());

    let collection = FeatureCollection::parse(&body)?;
    let config = SyncConfig {
        heatmap: Some(HeatmapConfig::default()),
        ..SyncConfig::default()
    };
    let mut sync =
        MapSynchronizer::with_styles(LeafletDocument::default(), StyleRegistry::default(), config);
    let summary = sync.render(&collection);

    println!("Trajectory Snapshot\n");
    for category in &summary.categories {
        println!(
            "  {:<10} {:>5} points  {:>8.0} m",
            category.category, category.points, category.length_meters
        );
    }
    println!("  rejected   {:>5} features", summary.rejected);

    std::fs::write(&output, sync.surface().to_html()?)?;
    println!("\nWrote {}", output);
    Ok(())
}
