//! Drive a map session against a running trajectory web app.
//!
//! Run with: cargo run --example live_session --features http -- <person> [date]
//!
//! The backend URL comes from TRACK_OVERLAY_BASE_URL (default http://127.0.0.1:5000).

use track_overlay::{
    HttpBackend, LeafletDocument, MapSession, MapSynchronizer, PreprocessOptions,
    SelectionCascade,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let person = args.next().unwrap_or_else(|| "0".to_string());
    let date = args.next();

    let session = MapSession::new(
        HttpBackend::from_env()?,
        MapSynchronizer::new(LeafletDocument::default()),
        SelectionCascade::new(Vec::new()),
    );

    session.change_person(&person).await?;
    if let Some(date) = date {
        session.change_date(&date).await?;
    }

    let cascade = session.cascade().await;
    println!("Dates for person {}: {}", person, cascade.dates().join(", "));

    let options = PreprocessOptions {
        map_match: true,
        ..PreprocessOptions::default()
    };
    if let Some(summary) = session.preprocess(options).await? {
        for category in &summary.categories {
            println!("  {:<10} {:>5} points", category.category, category.points);
        }
    }

    let heading = cascade.heading().unwrap_or_else(|| "Trajectory map".to_string());
    let html = session
        .with_synchronizer(|sync| {
            sync.surface_mut().set_title(&heading);
            sync.surface().to_html()
        })
        .await?;
    std::fs::write("session.html", html)?;
    println!("Wrote session.html");
    Ok(())
}
