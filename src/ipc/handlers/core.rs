use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{info, warn};

fn health(state: &AppState) -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
        "dbFile": state.workspace.as_ref().map(|_| db::DB_FILE_NAME),
        "snapshotCached": state.cache.is_some(),
    })
}

/// Opens (creating if needed) the workspace database and makes it current.
/// A failed open leaves the previous workspace selected.
fn select_workspace(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let path = PathBuf::from(required_str(&req.params, "path")?);
    let conn = db::open_db(&path).map_err(|e| {
        warn!(workspace = %path.display(), error = %e, "workspace open failed");
        HandlerErr::new("db_open_failed", format!("{e:#}"))
            .with_details(json!({ "path": path.to_string_lossy() }))
    })?;

    info!(workspace = %path.display(), "workspace selected");
    state.workspace = Some(path.clone());
    state.db = Some(conn);
    state.invalidate();
    Ok(json!({ "workspacePath": path.to_string_lossy() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let resp = match req.method.as_str() {
        "health" => Ok(health(state)),
        "workspace.select" => select_workspace(state, req),
        _ => return None,
    };
    Some(match resp {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
