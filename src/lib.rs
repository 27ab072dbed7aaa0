//! netzcam-scraper: poll netzcam webcams and save each new snapshot once.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌───────────┐  Config   ┌──────────┐  fetch_text / fetch_binary  ┌────────────┐
//! │ config.rs │ ────────► │ poll.rs  │ ──────────────────────────► │ source/    │
//! │  (clap)   │           │ (ticks)  │                             │ (reqwest)  │
//! └───────────┘           └──────────┘                             └────────────┘
//!                           │      │
//!               observe()   │      │  save()
//!                           ▼      ▼
//!                   ┌──────────┐ ┌──────────┐
//!                   │ state.rs │ │ store.rs │
//!                   └──────────┘ └──────────┘
//! ```
//!
//! * **`config`**: CLI surface and the validated runtime [`config::Config`].
//! * **`source`**: [`source::Source`], the URL template, and the
//!   [`source::Fetcher`] trait with its HTTP implementation.
//! * **`state`**: per-source change detection.
//! * **`store`**: filename sanitization and writing images to disk.
//! * **`poll`**: the tick loop tying everything together.

pub mod config;
pub mod poll;
pub mod source;
pub mod state;
pub mod store;
