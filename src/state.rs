//! Per-source change detection.
//!
//! Each configured [`Source`](crate::source::Source) owns one
//! [`SourceState`].  Feeding a freshly fetched marker into
//! [`SourceState::observe`] tells the poller whether the source published a
//! new snapshot since the last tick.

use chrono::{DateTime, Duration, Utc};

/// What a single observation of a source's marker text means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The marker could not be fetched (or was empty).  State is untouched.
    Unavailable,
    /// The marker matches the last one seen.  Nothing to download.
    Unchanged,
    /// A new marker was seen and recorded.
    Changed {
        /// Time since the previous change, if there was one.
        since_last: Option<Duration>,
    },
}

/// Last-seen marker and change time for one source.
///
/// Both fields are `None` until the first change and are always set
/// together afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceState {
    last_marker: Option<String>,
    last_change: Option<DateTime<Utc>>,
}

impl SourceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_marker(&self) -> Option<&str> {
        self.last_marker.as_deref()
    }

    pub fn last_change(&self) -> Option<DateTime<Utc>> {
        self.last_change
    }

    /// Record an observation taken at `now`.
    ///
    /// A change is committed immediately, before any image is downloaded, so
    /// a failed download does not make the same marker look new next tick.
    pub fn observe(&mut self, marker: Option<&str>, now: DateTime<Utc>) -> Observation {
        let marker = match marker {
            Some(m) if !m.is_empty() => m,
            _ => return Observation::Unavailable,
        };

        if self.last_marker.as_deref() == Some(marker) {
            return Observation::Unchanged;
        }

        let since_last = self.last_change.map(|prev| now - prev);
        self.last_marker = Some(marker.to_owned());
        self.last_change = Some(now);

        Observation::Changed { since_last }
    }
}

/// Format an elapsed duration as `HH:MM:SS`.
///
/// Hours are total hours and keep counting past 24.  Negative durations
/// (clock stepped backwards) clamp to zero.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
