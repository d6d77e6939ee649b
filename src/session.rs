//! Map session: selection cascade + backend + layer synchronizer.
//!
//! A session owns one synchronizer and serves UI events (person change,
//! date change, form submits). Loads may overlap; each one takes a ticket
//! before it suspends and is applied only if it is still the newest when
//! its response arrives.

use log::{debug, error, info};
use tokio::sync::Mutex;

use crate::backend::{PreprocessOptions, TrajectoryBackend, TrajectoryRequest};
use crate::cascade::SelectionCascade;
use crate::error::Result;
use crate::render::{MapSynchronizer, RenderSummary};
use crate::sequence::RequestSequencer;
use crate::surface::MapSurface;

pub struct MapSession<S: MapSurface, B: TrajectoryBackend> {
    backend: B,
    synchronizer: Mutex<MapSynchronizer<S>>,
    cascade: Mutex<SelectionCascade>,
    renders: RequestSequencer,
    dates: RequestSequencer,
}

impl<S: MapSurface, B: TrajectoryBackend> MapSession<S, B> {
    pub fn new(backend: B, synchronizer: MapSynchronizer<S>, cascade: SelectionCascade) -> Self {
        Self {
            backend,
            synchronizer: Mutex::new(synchronizer),
            cascade: Mutex::new(cascade),
            renders: RequestSequencer::new(),
            dates: RequestSequencer::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Snapshot of the selector state.
    pub async fn cascade(&self) -> SelectionCascade {
        self.cascade.lock().await.clone()
    }

    /// Run `f` with exclusive access to the synchronizer.
    pub async fn with_synchronizer<R>(&self, f: impl FnOnce(&mut MapSynchronizer<S>) -> R) -> R {
        let mut sync = self.synchronizer.lock().await;
        f(&mut sync)
    }

    pub fn into_synchronizer(self) -> MapSynchronizer<S> {
        self.synchronizer.into_inner()
    }

    /// Primary selector changed: refill the dates, then load the first one.
    ///
    /// Returns `Ok(None)` when the person has no dates or a newer person
    /// change overtook this one.
    pub async fn change_person(&self, person: &str) -> Result<Option<RenderSummary>> {
        self.cascade.lock().await.select_person(person);

        let ticket = self.dates.issue();
        let dates = self.backend.fetch_dates(person).await.map_err(|e| {
            error!("[MapSession] Failed to load dates for person {}: {}", person, e);
            e
        })?;

        if !self.dates.is_latest(ticket) {
            debug!(
                "[MapSession] Discarding dates #{} for person {}",
                ticket.number(),
                person
            );
            return Ok(None);
        }

        let selection = {
            let mut cascade = self.cascade.lock().await;
            cascade.replace_dates(person, dates);
            cascade.selection()
        };

        match selection {
            Some((person, date)) => self.load(TrajectoryRequest::initial(&person, &date)).await,
            None => {
                info!("[MapSession] Person {} has no dates", person);
                Ok(None)
            }
        }
    }

    /// Secondary selector changed: load the map for the new selection.
    pub async fn change_date(&self, date: &str) -> Result<Option<RenderSummary>> {
        let selection = {
            let mut cascade = self.cascade.lock().await;
            if !cascade.select_date(date) {
                return Ok(None);
            }
            cascade.selection()
        };

        match selection {
            Some((person, date)) => self.load(TrajectoryRequest::initial(&person, &date)).await,
            None => Ok(None),
        }
    }

    /// Selection form submitted: reload the current selection.
    pub async fn submit(&self) -> Result<Option<RenderSummary>> {
        let selection = self.cascade.lock().await.selection();
        match selection {
            Some((person, date)) => self.load(TrajectoryRequest::initial(&person, &date)).await,
            None => Ok(None),
        }
    }

    /// Preprocessing form submitted.
    pub async fn preprocess(&self, options: PreprocessOptions) -> Result<Option<RenderSummary>> {
        let selection = self.cascade.lock().await.selection();
        match selection {
            Some((person, date)) => {
                self.load(TrajectoryRequest::preprocessed(&person, &date, options))
                    .await
            }
            None => Ok(None),
        }
    }

    /// Fetch `request` and render it unless a newer load was issued meanwhile.
    ///
    /// Errors leave the current render untouched.
    pub async fn load(&self, request: TrajectoryRequest) -> Result<Option<RenderSummary>> {
        let ticket = self.renders.issue();
        debug!(
            "[MapSession] Load #{} /{} person={} date={}",
            ticket.number(),
            request.endpoint(),
            request.person(),
            request.date()
        );

        let body = self.backend.fetch_trajectory(&request).await.map_err(|e| {
            error!("[MapSession] Load #{} failed: {}", ticket.number(), e);
            e
        })?;

        let mut sync = self.synchronizer.lock().await;
        if !self.renders.is_latest(ticket) {
            debug!(
                "[MapSession] Discarding stale load #{} (latest is #{})",
                ticket.number(),
                self.renders.latest().map_or(0, |t| t.number())
            );
            return Ok(None);
        }

        sync.render_body(&body).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::surface::RecordingSurface;
    use crate::GpsPoint;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    fn body(points: &[(f64, f64, &str)]) -> String {
        let features: Vec<serde_json::Value> = points
            .iter()
            .map(|(lng, lat, kind)| {
                serde_json::json!({
                    "geometry": { "coordinates": [lng, lat] },
                    "properties": { "type": kind, "time": "t" }
                })
            })
            .collect();
        let inner = serde_json::json!({ "type": "FeatureCollection", "features": features });
        // the backend double-encodes
        serde_json::Value::String(inner.to_string()).to_string()
    }

    #[derive(Default)]
    struct FakeBackend {
        dates: HashMap<String, Vec<String>>,
        bodies: HashMap<String, String>,
        slow_date: Option<String>,
        gate: Notify,
        slow_person: Option<String>,
        dates_gate: Notify,
        requests: StdMutex<Vec<TrajectoryRequest>>,
    }

    impl TrajectoryBackend for FakeBackend {
        async fn fetch_dates(&self, person: &str) -> Result<Vec<String>> {
            if self.slow_person.as_deref() == Some(person) {
                self.dates_gate.notified().await;
            } else {
                self.dates_gate.notify_one();
            }
            self.dates.get(person).cloned().ok_or_else(|| SyncError::Status {
                endpoint: "dates".to_string(),
                status: 404,
            })
        }

        async fn fetch_trajectory(&self, request: &TrajectoryRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request.clone());
            if self.slow_date.as_deref() == Some(request.date()) {
                self.gate.notified().await;
            } else {
                self.gate.notify_one();
            }
            self.bodies.get(request.date()).cloned().ok_or(SyncError::Status {
                endpoint: request.endpoint().to_string(),
                status: 500,
            })
        }
    }

    fn backend() -> FakeBackend {
        let mut b = FakeBackend::default();
        b.dates.insert("0".into(), vec!["d1".into(), "d2".into()]);
        b.dates.insert("1".into(), vec!["d3".into()]);
        b.bodies.insert("d1".into(), body(&[(116.30, 39.90, "original"), (116.31, 39.91, "kalman")]));
        b.bodies.insert("d2".into(), body(&[(116.40, 39.95, "original")]));
        b.bodies.insert("d3".into(), body(&[(116.50, 40.00, "matched")]));
        b.bodies.insert("broken".into(), r#"{"type": "FeatureCollection"}"#.into());
        b
    }

    fn session(b: FakeBackend) -> MapSession<RecordingSurface, FakeBackend> {
        MapSession::new(
            b,
            MapSynchronizer::new(RecordingSurface::default()),
            SelectionCascade::new(vec!["0".into(), "1".into()]),
        )
    }

    #[tokio::test]
    async fn test_person_change_loads_first_date() {
        let s = session(backend());
        let summary = s.change_person("0").await.unwrap().unwrap();

        assert_eq!(summary.categories.len(), 2);
        let cascade = s.cascade().await;
        assert_eq!(cascade.dates(), &["d1", "d2"]);
        assert_eq!(cascade.date(), Some("d1"));

        let requests = s.backend().requests.lock().unwrap().clone();
        assert_eq!(requests, vec![TrajectoryRequest::initial("0", "d1")]);
    }

    #[tokio::test]
    async fn test_person_change_replaces_dates() {
        let s = session(backend());
        s.change_person("0").await.unwrap();
        s.change_person("1").await.unwrap();

        let cascade = s.cascade().await;
        assert_eq!(cascade.dates(), &["d3"]);
        assert_eq!(cascade.date(), Some("d3"));
        assert_eq!(cascade.heading().as_deref(), Some("Person 1 on d3"));

        let last = s.backend().requests.lock().unwrap().last().cloned();
        assert_eq!(last, Some(TrajectoryRequest::initial("1", "d3")));
        let layers = s.with_synchronizer(|sync| sync.state().layers().len()).await;
        assert_eq!(layers, 2);
    }

    #[tokio::test]
    async fn test_stale_dates_are_discarded() {
        let mut b = backend();
        b.slow_person = Some("0".into());
        let s = session(b);

        // person 0's dates are requested first but arrive after person 1's
        let (first, second) = tokio::join!(s.change_person("0"), s.change_person("1"));

        assert!(first.unwrap().is_none());
        assert!(second.unwrap().is_some());

        let cascade = s.cascade().await;
        assert_eq!(cascade.person(), Some("1"));
        assert_eq!(cascade.dates(), &["d3"]);
        assert_eq!(cascade.date(), Some("d3"));

        let requests = s.backend().requests.lock().unwrap().clone();
        assert_eq!(requests, vec![TrajectoryRequest::initial("1", "d3")]);
    }

    #[tokio::test]
    async fn test_date_change_and_preprocess() {
        let s = session(backend());
        s.change_person("0").await.unwrap();

        let summary = s.change_date("d2").await.unwrap().unwrap();
        assert_eq!(summary.marker_count, 1);
        assert!(s.change_date("missing").await.unwrap().is_none());

        s.preprocess(PreprocessOptions::default()).await.unwrap();
        let last = s.backend().requests.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.endpoint(), "preprocess");
        assert_eq!(last.date(), "d2");
    }

    #[tokio::test]
    async fn test_failures_keep_current_render() {
        let s = session(backend());
        s.change_person("0").await.unwrap();

        let err = s.load(TrajectoryRequest::raw("0", "broken")).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidCollection(_)));
        let err = s.load(TrajectoryRequest::raw("0", "nope")).await.unwrap_err();
        assert!(matches!(err, SyncError::Status { status: 500, .. }));
        assert!(s.change_person("7").await.is_err());

        let layers = s.with_synchronizer(|sync| sync.surface().layers().len()).await;
        assert_eq!(layers, 4);
    }

    #[tokio::test]
    async fn test_submit_without_selection() {
        let s = session(backend());
        assert!(s.submit().await.unwrap().is_none());
        assert!(s.preprocess(PreprocessOptions::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let mut b = backend();
        b.slow_date = Some("d1".into());
        let s = session(b);

        // d1 is issued first but answers last
        let (slow, fast) = tokio::join!(
            s.load(TrajectoryRequest::raw("0", "d1")),
            s.load(TrajectoryRequest::raw("0", "d2")),
        );

        assert!(slow.unwrap().is_none());
        assert!(fast.unwrap().is_some());

        let sync = s.into_synchronizer();
        assert_eq!(sync.state().layers().len(), 2);
        assert!(sync.state().bounds().unwrap().contains(&GpsPoint::new(39.95, 116.40)));
        assert_eq!(sync.surface().fit_count(), 1);
    }
}
