//! Scheduled polling of every configured webcam.
//!
//! The [`Poller`] drives an unbounded loop of discrete ticks.  Each tick
//! fetches every source's marker text concurrently, runs change detection,
//! and downloads and saves the image for each source whose marker moved.
//! Once every source has finished, the poller sleeps for the configured
//! interval and starts the next tick.  Ticks never overlap.
//!
//! ## For contributors
//!
//! Sources are fully independent: a fetch failure on one camera is logged
//! and skipped without touching the others.  The only error that escapes a
//! tick is a failure to create a per-source output directory, which means
//! the output root is unusable and polling should stop.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::source::{Fetcher, Source};
use crate::state::{format_elapsed, Observation, SourceState};
use crate::store::{ImageStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("invalid project or name, no marker text for: {}", .0.join(", "))]
    UnreachableSources(Vec<String>),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of polling one source for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A new image was written.
    Saved,
    /// The marker matched the last one seen.
    Unchanged,
    /// The marker text could not be fetched.
    NoText,
    /// The marker changed but the image could not be fetched.
    NoImage,
    /// The image was fetched but writing it failed.
    WriteFailed,
}

/// Per-tick tally across all sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub saved: usize,
    pub unchanged: usize,
    pub unavailable: usize,
    pub failed: usize,
}

impl TickReport {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Saved => self.saved += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::NoText => self.unavailable += 1,
            Outcome::NoImage | Outcome::WriteFailed => self.failed += 1,
        }
    }
}

/// Owns the change-detection state of every source and drives the poll loop.
pub struct Poller<F> {
    fetcher: F,
    store: ImageStore,
    interval: Duration,
    states: BTreeMap<Source, SourceState>,
}

impl<F: Fetcher> Poller<F> {
    pub fn new(
        fetcher: F,
        store: ImageStore,
        sources: impl IntoIterator<Item = Source>,
        interval: Duration,
    ) -> Self {
        let states = sources
            .into_iter()
            .map(|source| (source, SourceState::new()))
            .collect();
        Self {
            fetcher,
            store,
            interval,
            states,
        }
    }

    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        self.states.keys()
    }

    pub fn state(&self, source: &Source) -> Option<&SourceState> {
        self.states.get(source)
    }

    /// Confirm every source currently publishes marker text.
    ///
    /// Run once before polling starts so a typo in the project or a camera
    /// name fails fast instead of being skipped forever.
    pub async fn validate(&self) -> Result<(), PollError> {
        let checks = self.states.keys().map(|source| async move {
            let text = self.fetcher.fetch_text(&source.urls().text_url).await;
            (source, text.is_some_and(|t| !t.is_empty()))
        });

        let unreachable: Vec<String> = join_all(checks)
            .await
            .into_iter()
            .filter(|(_, ok)| !ok)
            .map(|(source, _)| source.name.clone())
            .collect();

        if unreachable.is_empty() {
            Ok(())
        } else {
            Err(PollError::UnreachableSources(unreachable))
        }
    }

    /// Poll every source once, concurrently, and wait for all of them.
    pub async fn tick(&mut self) -> Result<TickReport, PollError> {
        debug!(sources = self.states.len(), "polling sources");

        let Self {
            fetcher,
            store,
            states,
            ..
        } = self;
        let fetcher = &*fetcher;
        let store = &*store;

        let outcomes = join_all(
            states
                .iter_mut()
                .map(|(source, state)| poll_source(fetcher, store, source, state)),
        )
        .await;

        let mut report = TickReport::default();
        let mut fatal = None;
        for outcome in outcomes {
            match outcome {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    report.failed += 1;
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
            }
        }

        match fatal {
            Some(e) => Err(e.into()),
            None => Ok(report),
        }
    }

    /// Tick forever, sleeping `interval` between ticks, until `shutdown`
    /// resolves.
    ///
    /// `shutdown` is only honoured between ticks; a tick in progress always
    /// runs to completion.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> Result<(), PollError> {
        tokio::pin!(shutdown);

        loop {
            let report = self.tick().await?;
            debug!(
                saved = report.saved,
                unchanged = report.unchanged,
                unavailable = report.unavailable,
                failed = report.failed,
                "tick complete"
            );

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("shutdown requested, stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

/// Fetch, detect and (on change) save for a single source.
async fn poll_source<F: Fetcher>(
    fetcher: &F,
    store: &ImageStore,
    source: &Source,
    state: &mut SourceState,
) -> Result<Outcome, StoreError> {
    let urls = source.urls();

    let fetched = fetcher.fetch_text(&urls.text_url).await;
    let observation = state.observe(fetched.as_deref(), Utc::now());
    let (marker, since_last) = match (fetched, observation) {
        (Some(marker), Observation::Changed { since_last }) => (marker, since_last),
        (_, Observation::Unchanged) => {
            debug!(source = %source, "no new image");
            return Ok(Outcome::Unchanged);
        }
        _ => {
            warn!(source = %source, "no text");
            return Ok(Outcome::NoText);
        }
    };

    // The marker is already recorded; a missing image is not retried.
    let Some(image) = fetcher.fetch_binary(&urls.image_url).await else {
        warn!(source = %source, marker = %marker, "no image");
        return Ok(Outcome::NoImage);
    };

    match store.save(&source.name, &marker, &image).await {
        Ok(path) => {
            let since_last = since_last.map(format_elapsed);
            info!(
                source = %source,
                path = %path.display(),
                since_last = since_last.as_deref(),
                "saved image"
            );
            Ok(Outcome::Saved)
        }
        Err(e @ StoreError::Write(..)) => {
            warn!(source = %source, error = %e, "failed to save image");
            Ok(Outcome::WriteFailed)
        }
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::{HashMap, VecDeque};
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const PROJECT: &str = "demo";

    /// In-memory fetcher that replays scripted marker texts per source.
    ///
    /// Each source's text script is consumed one entry per fetch; the final
    /// entry repeats forever.  Images are fixed per source.
    #[derive(Default)]
    struct ScriptedFetcher {
        texts: Mutex<HashMap<String, VecDeque<Option<String>>>>,
        images: HashMap<String, Bytes>,
        image_fetches: Mutex<HashMap<String, usize>>,
    }

    impl ScriptedFetcher {
        fn texts(self, name: &str, script: &[Option<&str>]) -> Self {
            let url = Source::new(PROJECT, name).urls().text_url;
            let script = script.iter().map(|t| t.map(String::from)).collect();
            self.texts.lock().unwrap().insert(url, script);
            self
        }

        fn image(mut self, name: &str, bytes: &'static [u8]) -> Self {
            let url = Source::new(PROJECT, name).urls().image_url;
            self.images.insert(url, Bytes::from_static(bytes));
            self
        }

        fn image_fetches(&self, name: &str) -> usize {
            let url = Source::new(PROJECT, name).urls().image_url;
            self.image_fetches.lock().unwrap().get(&url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch_text(&self, url: &str) -> Option<String> {
            let mut texts = self.texts.lock().unwrap();
            let script = texts.get_mut(url)?;
            if script.len() > 1 {
                script.pop_front().flatten()
            } else {
                script.front().cloned().flatten()
            }
        }

        async fn fetch_binary(&self, url: &str) -> Option<Bytes> {
            *self
                .image_fetches
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default() += 1;
            self.images.get(url).cloned()
        }
    }

    fn poller(fetcher: ScriptedFetcher, root: &Path, names: &[&str]) -> Poller<ScriptedFetcher> {
        Poller::new(
            fetcher,
            ImageStore::new(root),
            names.iter().map(|n| Source::new(PROJECT, *n)),
            Duration::from_millis(1),
        )
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    // -- validate ------------------------------------------------------------

    #[tokio::test]
    async fn validate_passes_when_every_source_answers() {
        let tmp = TempDir::new().unwrap();
        let fetcher = ScriptedFetcher::default()
            .texts("cam1", &[Some("t1")])
            .texts("cam2", &[Some("t9")]);
        let poller = poller(fetcher, tmp.path(), &["cam1", "cam2"]);

        assert!(poller.validate().await.is_ok());
    }

    #[tokio::test]
    async fn validate_names_unreachable_sources_and_creates_nothing() {
        let tmp = TempDir::new().unwrap();
        let fetcher = ScriptedFetcher::default()
            .texts("cam1", &[Some("t1")])
            .texts("cam2", &[None]);
        let poller = poller(fetcher, tmp.path(), &["cam1", "cam2", "cam3"]);

        let err = poller.validate().await.unwrap_err();

        match err {
            PollError::UnreachableSources(names) => assert_eq!(names, vec!["cam2", "cam3"]),
            other => panic!("unexpected error: {other}"),
        }
        assert!(files_in(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn validate_rejects_empty_marker() {
        let tmp = TempDir::new().unwrap();
        let fetcher = ScriptedFetcher::default().texts("cam1", &[Some("")]);
        let poller = poller(fetcher, tmp.path(), &["cam1"]);

        assert!(matches!(
            poller.validate().await,
            Err(PollError::UnreachableSources(_))
        ));
    }

    #[tokio::test]
    async fn validate_does_not_touch_state() {
        let tmp = TempDir::new().unwrap();
        let fetcher = ScriptedFetcher::default().texts("cam1", &[Some("t1")]);
        let poller = poller(fetcher, tmp.path(), &["cam1"]);

        poller.validate().await.unwrap();

        let state = poller.state(&Source::new(PROJECT, "cam1")).unwrap();
        assert!(state.last_marker().is_none());
    }

    // -- tick ----------------------------------------------------------------

    #[tokio::test]
    async fn first_marker_saves_and_repeat_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let fetcher = ScriptedFetcher::default()
            .texts("cam1", &[Some("t1")])
            .texts("cam2", &[None])
            .image("cam1", b"img1")
            .image("cam2", b"img2");
        let mut poller = poller(fetcher, tmp.path(), &["cam1", "cam2"]);

        let first = poller.tick().await.unwrap();
        assert_eq!(
            first,
            TickReport {
                saved: 1,
                unavailable: 1,
                ..Default::default()
            }
        );
        assert_eq!(
            std::fs::read(tmp.path().join("cam1").join("t1.jpg")).unwrap(),
            b"img1"
        );
        assert!(!tmp.path().join("cam2").exists());
        assert_eq!(poller.fetcher.image_fetches("cam2"), 0);

        let second = poller.tick().await.unwrap();
        assert_eq!(second.unchanged, 1);
        assert_eq!(second.saved, 0);
        assert_eq!(poller.fetcher.image_fetches("cam1"), 1);
        assert_eq!(files_in(&tmp.path().join("cam1")), vec!["t1.jpg"]);
    }

    #[tokio::test]
    async fn one_file_per_marker_change() {
        let tmp = TempDir::new().unwrap();
        let fetcher = ScriptedFetcher::default()
            .texts(
                "cam1",
                &[
                    Some("2024-01-01 12:00:00"),
                    Some("2024-01-01 12:00:00"),
                    None,
                    Some("2024-01-01 12:10:00"),
                    Some("2024-01-01 12:20:00"),
                    Some("2024-01-01 12:20:00"),
                ],
            )
            .image("cam1", b"jpeg");
        let mut poller = poller(fetcher, tmp.path(), &["cam1"]);

        for _ in 0..6 {
            poller.tick().await.unwrap();
        }

        assert_eq!(
            files_in(&tmp.path().join("cam1")),
            vec![
                "2024_01_01_12_00_00.jpg",
                "2024_01_01_12_10_00.jpg",
                "2024_01_01_12_20_00.jpg",
            ]
        );
        assert_eq!(poller.fetcher.image_fetches("cam1"), 3);
    }

    #[tokio::test]
    async fn unavailable_tick_keeps_last_marker() {
        let tmp = TempDir::new().unwrap();
        let fetcher = ScriptedFetcher::default()
            .texts("cam1", &[Some("t1"), None, Some("t1")])
            .image("cam1", b"jpeg");
        let mut poller = poller(fetcher, tmp.path(), &["cam1"]);

        for _ in 0..3 {
            poller.tick().await.unwrap();
        }

        assert_eq!(poller.fetcher.image_fetches("cam1"), 1);
        let state = poller.state(&Source::new(PROJECT, "cam1")).unwrap();
        assert_eq!(state.last_marker(), Some("t1"));
    }

    #[tokio::test]
    async fn failed_image_fetch_consumes_the_change() {
        let tmp = TempDir::new().unwrap();
        // No image scripted: every image fetch is unavailable.
        let fetcher = ScriptedFetcher::default().texts("cam1", &[Some("t1")]);
        let mut poller = poller(fetcher, tmp.path(), &["cam1"]);

        let first = poller.tick().await.unwrap();
        assert_eq!(first.failed, 1);
        assert!(!tmp.path().join("cam1").exists());

        let second = poller.tick().await.unwrap();
        assert_eq!(second.unchanged, 1);
        assert_eq!(poller.fetcher.image_fetches("cam1"), 1);
    }

    #[tokio::test]
    async fn state_records_change_time() {
        let tmp = TempDir::new().unwrap();
        let fetcher = ScriptedFetcher::default()
            .texts("cam1", &[Some("t1")])
            .image("cam1", b"jpeg");
        let mut poller = poller(fetcher, tmp.path(), &["cam1"]);

        let before = Utc::now();
        poller.tick().await.unwrap();

        let state = poller.state(&Source::new(PROJECT, "cam1")).unwrap();
        assert!(state.last_change().unwrap() >= before);
    }

    #[tokio::test]
    async fn write_failure_is_contained_to_its_source() {
        let tmp = TempDir::new().unwrap();
        // A directory where cam1's image file should go.
        std::fs::create_dir_all(tmp.path().join("cam1").join("t1.jpg")).unwrap();
        let fetcher = ScriptedFetcher::default()
            .texts("cam1", &[Some("t1")])
            .texts("cam2", &[Some("t2")])
            .image("cam1", b"a")
            .image("cam2", b"b");
        let mut poller = poller(fetcher, tmp.path(), &["cam1", "cam2"]);

        let report = poller.tick().await.unwrap();

        assert_eq!(report.saved, 1);
        assert_eq!(report.failed, 1);
        assert!(tmp.path().join("cam2").join("t2.jpg").is_file());
    }

    #[tokio::test]
    async fn directory_failure_is_fatal_after_other_sources_finish() {
        let tmp = TempDir::new().unwrap();
        // A file where cam1's directory should go.
        std::fs::write(tmp.path().join("cam1"), b"").unwrap();
        let fetcher = ScriptedFetcher::default()
            .texts("cam1", &[Some("t1")])
            .texts("cam2", &[Some("t2")])
            .image("cam1", b"a")
            .image("cam2", b"b");
        let mut poller = poller(fetcher, tmp.path(), &["cam1", "cam2"]);

        let err = poller.tick().await.unwrap_err();

        assert!(matches!(err, PollError::Store(StoreError::CreateDir(..))));
        assert!(tmp.path().join("cam2").join("t2.jpg").is_file());
    }

    // -- run -----------------------------------------------------------------

    #[tokio::test]
    async fn run_completes_a_tick_before_honouring_shutdown() {
        let tmp = TempDir::new().unwrap();
        let fetcher = ScriptedFetcher::default()
            .texts("cam1", &[Some("t1")])
            .image("cam1", b"jpeg");
        let mut poller = poller(fetcher, tmp.path(), &["cam1"]);

        poller.run(std::future::ready(())).await.unwrap();

        assert!(tmp.path().join("cam1").join("t1.jpg").is_file());
        assert_eq!(poller.fetcher.image_fetches("cam1"), 1);
    }

    #[tokio::test]
    async fn run_keeps_ticking_until_shutdown() {
        let tmp = TempDir::new().unwrap();
        let fetcher = ScriptedFetcher::default()
            .texts("cam1", &[Some("a"), Some("b"), Some("c")])
            .image("cam1", b"jpeg");
        let mut poller = poller(fetcher, tmp.path(), &["cam1"]);

        let shutdown = async {
            while files_in(&tmp.path().join("cam1")).len() < 3 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), poller.run(shutdown))
            .await
            .expect("poller did not stop")
            .unwrap();

        assert_eq!(files_in(&tmp.path().join("cam1")), vec!["a.jpg", "b.jpg", "c.jpg"]);
    }

    #[tokio::test]
    async fn run_stops_on_fatal_store_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("cam1"), b"").unwrap();
        let fetcher = ScriptedFetcher::default()
            .texts("cam1", &[Some("t1")])
            .image("cam1", b"jpeg");
        let mut poller = poller(fetcher, tmp.path(), &["cam1"]);

        let result = poller.run(std::future::pending()).await;
        assert!(matches!(result, Err(PollError::Store(_))));
    }
}
