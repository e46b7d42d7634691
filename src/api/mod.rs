//! The HTTP surface: decision REST, a decision-filtered SSE re-broadcast of
//! the daemon's own stream, embedded static UI assets, and a `/version`
//! endpoint. Routed with `axum` the same way the reference architecture
//! nests its control-plane API under `/api`.

pub mod decisions;
pub mod server;
pub mod state;
