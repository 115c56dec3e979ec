//! Admin HTTP surface (§B.3): debug-mode toggle, metrics scrape, liveness.

pub mod routes;
