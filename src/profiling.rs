//! Tracing setup for the `profiling` feature.
//!
//! The core emits `info_span!`s around spawns, archetype transitions,
//! command replay, and stage execution when the feature is enabled. Install
//! a subscriber to collect them:
//!
//! ```ignore
//! chunked_ecs::profiling::init();
//! // or bring your own:
//! tracing_subscriber::fmt().with_env_filter("chunked_ecs=debug").init();
//! ```
//!
//! Profile release builds; debug timings are not representative.

/// Install a formatting subscriber honoring `RUST_LOG`.
///
/// Panics if a global subscriber is already set.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

/// Like [`init`], but quietly does nothing if a subscriber exists already.
pub fn try_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
