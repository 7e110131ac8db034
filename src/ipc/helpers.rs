use crate::calc::grading::GradingScale;
use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, LoadedSnapshot};
use crate::model::{Snapshot, Student, Term};
use rusqlite::Connection;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    match params.get(key).and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(_) => Err(HandlerErr::new("bad_params", format!("{} must not be empty", key))),
        None => Err(HandlerErr::new("bad_params", format!("missing {}", key))),
    }
}

/// Absent, `null` and blank strings all read as `None`.
pub fn optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(HandlerErr::new("bad_params", format!("{} must be a string", key))),
    }
}

/// Existing id from params, or a fresh one for inserts.
pub fn id_or_new(params: &Value) -> Result<String, HandlerErr> {
    Ok(optional_str(params, "id")?.unwrap_or_else(|| Uuid::new_v4().to_string()))
}

pub fn query_err(e: impl std::fmt::Display) -> HandlerErr {
    HandlerErr::new("db_query_failed", e.to_string())
}

pub fn update_err(e: impl std::fmt::Display) -> HandlerErr {
    HandlerErr::new("db_update_failed", e.to_string())
}

/// SHA-256 over the snapshot JSON followed by the grading thresholds in order.
/// Anything that changes a computed report changes the fingerprint.
pub fn fingerprint(snapshot: &Snapshot, scale: &GradingScale) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(snapshot).unwrap_or_default());
    hasher.update(b"\n");
    hasher.update(serde_json::to_vec(scale.thresholds()).unwrap_or_default());
    format!("{:x}", hasher.finalize())
}

/// Cached snapshot for the open workspace, read from the database on first use
/// after a write.
pub fn loaded_snapshot(state: &mut AppState) -> Result<&LoadedSnapshot, HandlerErr> {
    if state.cache.is_none() {
        let conn = db_conn(state)?;
        let snapshot = db::load_snapshot(conn).map_err(|e| query_err(format!("{e:#}")))?;
        let scale = db::load_grading_scale(conn).map_err(|e| query_err(format!("{e:#}")))?;
        let version = fingerprint(&snapshot, &scale);
        debug!(
            students = snapshot.students.len(),
            marks = snapshot.marks.len(),
            %version,
            "loaded snapshot"
        );
        state.cache = Some(LoadedSnapshot {
            snapshot,
            version,
            scale,
        });
    }
    state
        .cache
        .as_ref()
        .ok_or_else(|| HandlerErr::new("db_query_failed", "snapshot unavailable"))
}

pub fn find_term<'a>(snapshot: &'a Snapshot, id: &str) -> Result<&'a Term, HandlerErr> {
    snapshot.term(id).ok_or_else(|| {
        HandlerErr::new("not_found", "term not found").with_details(json!({ "termId": id }))
    })
}

pub fn find_student<'a>(snapshot: &'a Snapshot, id: &str) -> Result<&'a Student, HandlerErr> {
    snapshot.student(id).ok_or_else(|| {
        HandlerErr::new("not_found", "student not found").with_details(json!({ "studentId": id }))
    })
}
