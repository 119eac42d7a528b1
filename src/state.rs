//! Shared application state — injected into every handler via `axum::extract::State`.

use crate::{config::Config, db::Db};

/// Application-wide state passed via axum `State<AppState>`.
///
/// `MySqlPool` is `Arc`-backed and `Config` holds only strings and
/// primitives, so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    pub pool:   Db,
    pub config: Config,
}
