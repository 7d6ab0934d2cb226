//! Library surface backing the `archive-gateway` binary (spec §6) — split
//! out so the integration tests under `tests/` can exercise request
//! shaping and the HTTP error mapping without going through `main`.

pub mod app;
pub mod http;
