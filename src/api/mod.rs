//! HTTP API for inspecting the resolver's caches.
//!
//! Everything here only reads shared state, except for the blocklist reload.
//!
//! # API Endpoints
//!
//! ## `/healthcheck` (GET)
//!
//!   Returns HTTP 200 (OK) and the JSON body `{"ok":"healthy"}` when the service is operational.
//!
//! ## `/cache` (GET)
//!
//!   Size and capacity of the positive and negative response caches:
//!
//!   ```json
//!   { "positive": { "size": 12, "capacity": 10000 }, "negative": { "size": 1, "capacity": 10000 } }
//!   ```
//!
//! ## `/questions` (GET)
//!
//!   The question log, oldest first. `?limit=n` returns only the `n` most recent entries.
//!
//!   ```json
//!   [ { "date": 1700000000, "client": "192.168.1.20", "blocked": true,
//!       "query": { "name": "ads.example.com", "type": "A", "class": "IN" } } ]
//!   ```
//!
//! ## `/blocklist` (GET)
//!
//!   Number of blocked names: `{"size":12345}`.
//!
//! ## `/blocklist/:name` (GET)
//!
//!   Whether a single name is blocked: `{"name":"ads.example.com","blocked":true}`.
//!
//! ## `/blocklist/reload` (POST)
//!
//!   Re-reads every configured [blocklist][crate::blocklist] file and atomically replaces the
//!   blocked set. Returns the new size, or HTTP 503 with the previous set kept if a file can't be
//!   read. Answers already cached for newly blocked or unblocked names stay until they expire.

mod api_error;
mod model;
mod routes;
pub mod server;

pub use server::new;
