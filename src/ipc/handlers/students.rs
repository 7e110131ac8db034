use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    db_conn, id_or_new, loaded_snapshot, optional_str, query_err, required_str, update_err,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{ClassSubjectAssignment, Gender, StaffRole};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use tracing::info;

fn parse_id_list(v: &Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let items = v
        .as_array()
        .ok_or_else(|| HandlerErr::new("bad_params", format!("{} must be an array", key)))?;
    items
        .iter()
        .map(|item| match item.as_str() {
            Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            _ => Err(HandlerErr::new(
                "bad_params",
                format!("{} must contain non-empty strings", key),
            )),
        })
        .collect()
}

fn parse_money(params: &Value, key: &str) -> Result<f64, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(0.0),
        Some(v) => v
            .as_f64()
            .filter(|f| f.is_finite())
            .ok_or_else(|| HandlerErr::new("bad_params", format!("{} must be a number", key))),
    }
}

fn ensure_class(conn: &Connection, class_id: &str) -> Result<(), HandlerErr> {
    let found: Option<String> = conn
        .query_row("SELECT id FROM classes WHERE id = ?", [class_id], |r| r.get(0))
        .optional()
        .map_err(query_err)?;
    match found {
        Some(_) => Ok(()),
        None => Err(HandlerErr::new("not_found", "class not found")
            .with_details(json!({ "classId": class_id }))),
    }
}

fn list_students(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let class_id = optional_str(&req.params, "classId")?;
    let students = db::load_students(conn, class_id.as_deref())
        .map_err(|e| query_err(format!("{e:#}")))?;
    Ok(json!({ "students": students }))
}

fn upsert_student(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let p = &req.params;
    let student_id = id_or_new(p)?;
    let admission_number = required_str(p, "admissionNumber")?;
    let name = required_str(p, "name")?;
    let class_id = required_str(p, "classId")?;
    let stream = required_str(p, "stream")?;
    let gender_raw = required_str(p, "gender")?;
    let gender = Gender::parse(&gender_raw)
        .ok_or_else(|| HandlerErr::new("bad_params", "gender must be Male or Female"))?;
    let current_fees_balance = parse_money(p, "currentFeesBalance")?;
    let next_term_fees = parse_money(p, "nextTermFees")?;
    let subjects_json = match p.get("subjects") {
        None | Some(Value::Null) => None,
        Some(v) => Some(json!(parse_id_list(v, "subjects")?).to_string()),
    };
    ensure_class(conn, &class_id)?;

    conn.execute(
        "INSERT INTO students(id, admission_number, name, class_id, stream, gender,
                              current_fees_balance, next_term_fees, subjects_json, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           admission_number = excluded.admission_number,
           name = excluded.name,
           class_id = excluded.class_id,
           stream = excluded.stream,
           gender = excluded.gender,
           current_fees_balance = excluded.current_fees_balance,
           next_term_fees = excluded.next_term_fees,
           subjects_json = excluded.subjects_json,
           updated_at = excluded.updated_at",
        (
            &student_id,
            &admission_number,
            &name,
            &class_id,
            &stream,
            gender.as_str(),
            current_fees_balance,
            next_term_fees,
            subjects_json,
            Utc::now().to_rfc3339(),
        ),
    )
    .map_err(update_err)?;
    info!(student_id = %student_id, class_id = %class_id, "student saved");
    state.invalidate();
    Ok(json!({ "studentId": student_id }))
}

fn list_staff(state: &mut AppState) -> Result<Value, HandlerErr> {
    let loaded = loaded_snapshot(state)?;
    Ok(json!({ "staff": loaded.snapshot.staff }))
}

fn parse_assignments(p: &Value) -> Result<Vec<ClassSubjectAssignment>, HandlerErr> {
    let Some(raw) = p.get("classSubjectAssignments").filter(|v| !v.is_null()) else {
        return Ok(Vec::new());
    };
    let items = raw.as_array().ok_or_else(|| {
        HandlerErr::new("bad_params", "classSubjectAssignments must be an array")
    })?;
    items
        .iter()
        .map(|a| {
            Ok(ClassSubjectAssignment {
                class_id: required_str(a, "classId")?,
                subject_ids: parse_id_list(
                    a.get("subjectIds").unwrap_or(&Value::Null),
                    "subjectIds",
                )?,
            })
        })
        .collect()
}

fn upsert_staff(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let p = &req.params;
    let staff_id = id_or_new(p)?;
    let name = required_str(p, "name")?;
    let role_raw = required_str(p, "role")?;
    let role = StaffRole::parse(&role_raw)
        .ok_or_else(|| HandlerErr::new("bad_params", "role must be ADMIN or TEACHER"))?;
    let signature = optional_str(p, "signatureImageUrl")?;
    let assignments = parse_assignments(p)?;
    for a in &assignments {
        ensure_class(conn, &a.class_id)?;
    }

    let tx = conn.unchecked_transaction().map_err(update_err)?;
    tx.execute(
        "INSERT INTO staff(id, name, role, signature_image_url) VALUES(?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           role = excluded.role,
           signature_image_url = excluded.signature_image_url",
        (&staff_id, &name, role.as_str(), &signature),
    )
    .map_err(update_err)?;
    tx.execute("DELETE FROM staff_assignments WHERE staff_id = ?", [&staff_id])
        .map_err(update_err)?;
    for a in &assignments {
        tx.execute(
            "INSERT INTO staff_assignments(staff_id, class_id, subject_ids_json)
             VALUES(?, ?, ?)
             ON CONFLICT(staff_id, class_id) DO UPDATE SET
               subject_ids_json = excluded.subject_ids_json",
            (&staff_id, &a.class_id, json!(a.subject_ids).to_string()),
        )
        .map_err(update_err)?;
    }
    tx.commit().map_err(update_err)?;

    info!(staff_id = %staff_id, role = role.as_str(), "staff saved");
    state.invalidate();
    Ok(json!({ "staffId": staff_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let resp = match req.method.as_str() {
        "students.list" => list_students(state, req),
        "students.upsert" => upsert_student(state, req),
        "staff.list" => list_staff(state),
        "staff.upsert" => upsert_staff(state, req),
        _ => return None,
    };
    Some(match resp {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
