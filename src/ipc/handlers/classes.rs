use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{db_conn, id_or_new, query_err, required_str, update_err};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use tracing::info;

fn list_classes(state: &AppState) -> Result<Value, HandlerErr> {
    // No workspace yet: an empty catalogue rather than an error.
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "classes": [] }));
    };
    let mut stmt = conn
        .prepare(
            "SELECT
               c.id,
               c.name,
               (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count
             FROM classes c
             ORDER BY c.name",
        )
        .map_err(query_err)?;
    let classes = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let student_count: i64 = row.get(2)?;
            Ok(json!({
                "id": id,
                "name": name,
                "studentCount": student_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_err)?;
    Ok(json!({ "classes": classes }))
}

fn upsert_class(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let class_id = id_or_new(&req.params)?;
    let name = required_str(&req.params, "name")?;
    conn.execute(
        "INSERT INTO classes(id, name) VALUES(?, ?)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        (&class_id, &name),
    )
    .map_err(update_err)?;
    info!(class_id = %class_id, "class saved");
    state.invalidate();
    Ok(json!({ "classId": class_id, "name": name }))
}

fn list_subjects(state: &AppState) -> Result<Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "subjects": [] }));
    };
    let mut stmt = conn
        .prepare("SELECT id, name, subject_group, active FROM subjects ORDER BY rowid")
        .map_err(query_err)?;
    let subjects = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let group: Option<i64> = row.get(2)?;
            let active: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "group": group,
                "active": active != 0
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_err)?;
    Ok(json!({ "subjects": subjects }))
}

fn upsert_subject(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let subject_id = id_or_new(&req.params)?;
    let name = required_str(&req.params, "name")?;
    let group = match req.params.get("group") {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_i64()
                .ok_or_else(|| HandlerErr::new("bad_params", "group must be integer"))?,
        ),
    };
    let active = match req.params.get("active") {
        None => true,
        Some(v) => v
            .as_bool()
            .ok_or_else(|| HandlerErr::new("bad_params", "active must be boolean"))?,
    };
    conn.execute(
        "INSERT INTO subjects(id, name, subject_group, active) VALUES(?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           subject_group = excluded.subject_group,
           active = excluded.active",
        (&subject_id, &name, group, active as i64),
    )
    .map_err(update_err)?;
    info!(subject_id = %subject_id, active, "subject saved");
    state.invalidate();
    Ok(json!({ "subjectId": subject_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let resp = match req.method.as_str() {
        "classes.list" => list_classes(state),
        "classes.upsert" => upsert_class(state, req),
        "subjects.list" => list_subjects(state),
        "subjects.upsert" => upsert_subject(state, req),
        _ => return None,
    };
    Some(match resp {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn request(method: &str, params: Value) -> Request {
        Request {
            id: "1".into(),
            method: method.into(),
            params,
        }
    }

    #[test]
    fn lists_are_empty_without_a_workspace() {
        let state = AppState::default();
        assert_eq!(list_classes(&state).ok(), Some(json!({ "classes": [] })));
        assert_eq!(list_subjects(&state).ok(), Some(json!({ "subjects": [] })));
    }

    #[test]
    fn upserted_subjects_are_listed_in_insert_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut state = AppState {
            db: Some(db::open_db(dir.path()).expect("open")),
            ..AppState::default()
        };
        let mat = request("subjects.upsert", json!({ "id": "MAT", "name": "Mathematics" }));
        let eng = request(
            "subjects.upsert",
            json!({ "id": "ENG", "name": "English", "group": 1, "active": false }),
        );
        assert!(upsert_subject(&mut state, &mat).is_ok());
        assert!(upsert_subject(&mut state, &eng).is_ok());

        let listed = list_subjects(&state).ok().expect("subjects");
        assert_eq!(listed["subjects"][0]["id"], json!("MAT"));
        assert_eq!(listed["subjects"][1]["active"], json!(false));
        assert_eq!(listed["subjects"][1]["group"], json!(1));

        let bad = request("subjects.upsert", json!({ "name": "Art", "group": "one" }));
        assert_eq!(
            upsert_subject(&mut state, &bad).err().map(|e| e.code),
            Some("bad_params")
        );
    }
}
