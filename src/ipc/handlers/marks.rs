use crate::calc::report::subjects_for_student;
use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{db_conn, loaded_snapshot, required_str, update_err};
use crate::ipc::types::{AppState, Request};
use crate::model::{Mark, ScoreOutcome, Snapshot};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::info;

const MARKS_BULK_SET_MAX_EDITS: usize = 5000;

fn marks_sheet(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let class_id = required_str(&req.params, "classId")?;
    let subject_id = required_str(&req.params, "subjectId")?;
    let session_id = required_str(&req.params, "examSessionId")?;

    let loaded = loaded_snapshot(state)?;
    let snap = &loaded.snapshot;
    if snap.class(&class_id).is_none() {
        return Err(HandlerErr::new("not_found", "class not found")
            .with_details(json!({ "classId": class_id })));
    }
    let Some(subject) = snap.subjects.iter().find(|s| s.id == subject_id) else {
        return Err(HandlerErr::new("not_found", "subject not found")
            .with_details(json!({ "subjectId": subject_id })));
    };
    let Some(session) = snap.exam_sessions.iter().find(|s| s.id == session_id) else {
        return Err(HandlerErr::new("not_found", "exam session not found")
            .with_details(json!({ "examSessionId": session_id })));
    };

    let scores: HashMap<&str, ScoreOutcome> = snap
        .marks
        .iter()
        .filter(|m| m.subject_id == subject_id && m.exam_session_id == session_id)
        .map(|m| (m.student_id.as_str(), m.score))
        .collect();
    let rows: Vec<Value> = snap
        .students
        .iter()
        .filter(|s| s.class_id == class_id)
        .map(|s| {
            let takes_subject = subjects_for_student(snap, s)
                .iter()
                .any(|sub| sub.id == subject_id);
            json!({
                "studentId": s.id,
                "admissionNumber": s.admission_number,
                "name": s.name,
                "stream": s.stream,
                "takesSubject": takes_subject,
                "value": scores.get(s.id.as_str()).copied().unwrap_or(ScoreOutcome::Unrecorded),
            })
        })
        .collect();

    Ok(json!({
        "subject": subject,
        "examSession": session,
        "rows": rows,
        "snapshotVersion": loaded.version,
    }))
}

/// Checks one edit against the dataset; on success returns the mark to store.
fn validate_edit(snap: &Snapshot, edit: &Value) -> Result<Mark, (&'static str, String)> {
    let field = |key: &str| -> Result<String, (&'static str, String)> {
        edit.get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().to_string())
            .ok_or(("bad_params", format!("missing {}", key)))
    };
    let student_id = field("studentId")?;
    let subject_id = field("subjectId")?;
    let exam_session_id = field("examSessionId")?;
    let Some(raw) = edit.get("value") else {
        return Err(("bad_params", "missing value".to_string()));
    };
    let score = ScoreOutcome::from_json(raw).map_err(|m| ("bad_params", m))?;

    if snap.student(&student_id).is_none() {
        return Err(("not_found", format!("student not found: {}", student_id)));
    }
    if !snap.subjects.iter().any(|s| s.id == subject_id) {
        return Err(("not_found", format!("subject not found: {}", subject_id)));
    }
    if !snap.exam_sessions.iter().any(|s| s.id == exam_session_id) {
        return Err((
            "not_found",
            format!("exam session not found: {}", exam_session_id),
        ));
    }
    Ok(Mark {
        student_id,
        subject_id,
        exam_session_id,
        score,
    })
}

fn marks_bulk_set(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let Some(edits_arr) = req.params.get("edits").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::new("bad_params", "missing edits[]"));
    };
    if edits_arr.len() > MARKS_BULK_SET_MAX_EDITS {
        return Err(HandlerErr::new(
            "bad_params",
            format!(
                "bulk payload exceeds max edits: {} > {}",
                edits_arr.len(),
                MARKS_BULK_SET_MAX_EDITS
            ),
        )
        .with_details(json!({ "maxEdits": MARKS_BULK_SET_MAX_EDITS })));
    }

    let mut marks = Vec::with_capacity(edits_arr.len());
    let mut errors: Vec<Value> = Vec::new();
    {
        let snap = &loaded_snapshot(state)?.snapshot;
        for (i, edit) in edits_arr.iter().enumerate() {
            match validate_edit(snap, edit) {
                Ok(m) => marks.push(m),
                Err((code, message)) => errors.push(json!({
                    "index": i,
                    "code": code,
                    "message": message,
                })),
            }
        }
    }
    if !errors.is_empty() {
        return Err(HandlerErr::new("bad_params", "no marks were saved: invalid edits")
            .with_details(json!({ "rejected": errors.len(), "errors": errors })));
    }

    let conn = db_conn(state)?;
    let tx = conn.unchecked_transaction().map_err(update_err)?;
    let now = Utc::now().to_rfc3339();
    let mut cleared = 0usize;
    for m in &marks {
        match db::score_to_row(m.score) {
            Some((status, raw_value)) => {
                tx.execute(
                    "INSERT INTO marks(student_id, subject_id, exam_session_id,
                                       status, raw_value, updated_at)
                     VALUES(?, ?, ?, ?, ?, ?)
                     ON CONFLICT(student_id, subject_id, exam_session_id) DO UPDATE SET
                       status = excluded.status,
                       raw_value = excluded.raw_value,
                       updated_at = excluded.updated_at",
                    (
                        &m.student_id,
                        &m.subject_id,
                        &m.exam_session_id,
                        status,
                        raw_value,
                        &now,
                    ),
                )
                .map_err(update_err)?;
            }
            None => {
                cleared += tx
                    .execute(
                        "DELETE FROM marks
                         WHERE student_id = ? AND subject_id = ? AND exam_session_id = ?",
                        (&m.student_id, &m.subject_id, &m.exam_session_id),
                    )
                    .map_err(update_err)?;
            }
        }
    }
    tx.commit().map_err(update_err)?;

    info!(updated = marks.len(), cleared, "marks saved");
    state.invalidate();
    Ok(json!({ "ok": true, "updated": marks.len(), "cleared": cleared }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let resp = match req.method.as_str() {
        "marks.sheet" => marks_sheet(state, req),
        "marks.bulkSet" => marks_bulk_set(state, req),
        _ => return None,
    };
    Some(match resp {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
