use std::path::PathBuf;

use crate::calc::grading::GradingScale;
use crate::model::Snapshot;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Dataset and grading scale as last read from the workspace database.
pub struct LoadedSnapshot {
    pub snapshot: Snapshot,
    pub version: String,
    pub scale: GradingScale,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Dropped by every write so reads never see stale data.
    pub cache: Option<LoadedSnapshot>,
}

impl AppState {
    pub fn invalidate(&mut self) {
        self.cache = None;
    }
}
