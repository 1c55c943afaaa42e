#![forbid(unsafe_code)]

//! Logging helpers.
//!
//! The crates emit `tracing` events unconditionally; installing a
//! subscriber is left to the host. With the `tracing-json` feature this
//! module offers a ready-made JSON subscriber filtered by `RUST_LOG`.
//!
//! Targets worth filtering on:
//!
//! - `pathwire_core::scheduler`: enqueue (`trace`), drain summaries
//!   (`debug`), task failures (`warn`).
//! - `pathwire_runtime::reactive`: interceptor installation and disposal
//!   (`debug`), re-wiring (`trace`), failed re-wiring (`warn`).

/// Install a global JSON subscriber honouring `RUST_LOG`.
///
/// Fails if a global subscriber is already installed.
#[cfg(feature = "tracing-json")]
pub fn init_json_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
}
