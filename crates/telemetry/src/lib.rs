#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! Observability for the PBFT kernel: structured logging initialization, a
//! Prometheus-backed [`pbft_api::metrics::MetricsSink`] implementation, and
//! the HTTP server that exposes it.
//!
//! The metrics sink traits themselves live in `pbft-api` so that components
//! depend only on the trait, not on this crate — `install()` here builds
//! the concrete Prometheus-backed sink and hands callers an
//! `Arc<dyn MetricsSink>` to thread through at startup, rather than stashing
//! it in a process-global static.

/// A lightweight HTTP server for exposing `/metrics` and `/healthz`.
pub mod http;
/// The initialization routine for global structured logging.
pub mod init;
/// The concrete implementation of [`pbft_api::metrics::MetricsSink`] using the `prometheus` crate.
pub mod prometheus;
/// A simple RAII timer for measuring the duration of a scope.
pub mod time;

pub use prometheus::PrometheusSink;
