//! Structured logging setup for relay-bridge services.
//!
//! Integrates with the `tracing` ecosystem, offering human-readable and
//! JSON-formatted output via `tracing-subscriber`, driven by `RUST_LOG`.

pub mod logging;
