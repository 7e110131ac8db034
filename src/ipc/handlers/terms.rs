use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{db_conn, id_or_new, optional_str, query_err, required_str, update_err};
use crate::ipc::types::{AppState, Request};
use crate::model::CalculationMode;
use chrono::NaiveDate;
use rusqlite::params_from_iter;
use serde_json::{json, Value};
use tracing::info;

const MIN_YEAR: i64 = 2000;
const MAX_YEAR: i64 = 2100;
const MAX_SESSIONS: usize = 20;

#[derive(Debug, PartialEq)]
struct SessionInput {
    id: String,
    name: String,
    weight: i64,
}

#[derive(Debug, PartialEq)]
struct TermInput {
    id: String,
    name: String,
    year: i64,
    mode: CalculationMode,
    closing_date: Option<NaiveDate>,
    opening_date: Option<NaiveDate>,
    sessions: Vec<SessionInput>,
}

fn parse_date(params: &Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    let Some(raw) = optional_str(params, key)? else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| HandlerErr::new("bad_params", format!("{} must be YYYY-MM-DD", key)))
}

fn parse_term(params: &Value) -> Result<TermInput, HandlerErr> {
    let id = id_or_new(params)?;
    let name = required_str(params, "name")?;
    let year = params
        .get("year")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::new("bad_params", "year must be integer"))?;
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(HandlerErr::new(
            "bad_params",
            format!("year must be in {}..={}", MIN_YEAR, MAX_YEAR),
        ));
    }
    let mode_raw = required_str(params, "calculationMode")?;
    let mode = CalculationMode::parse(&mode_raw).ok_or_else(|| {
        HandlerErr::new(
            "bad_params",
            "calculationMode must be WEIGHTED_AVERAGE or SIMPLE_AVERAGE",
        )
    })?;

    let raw_sessions = match params.get("sessions") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(_) => return Err(HandlerErr::new("bad_params", "sessions must be an array")),
    };
    if raw_sessions.len() > MAX_SESSIONS {
        return Err(HandlerErr::new(
            "bad_params",
            format!("a term has at most {} exam sessions", MAX_SESSIONS),
        ));
    }
    let mut sessions = Vec::with_capacity(raw_sessions.len());
    for (i, s) in raw_sessions.iter().enumerate() {
        let name = required_str(s, "name")
            .map_err(|e| e.with_details(json!({ "sessionIndex": i })))?;
        let weight = s
            .get("weight")
            .and_then(|v| v.as_i64())
            .filter(|w| (0..=100).contains(w))
            .ok_or_else(|| {
                HandlerErr::new("bad_params", "session weight must be an integer in 0..=100")
                    .with_details(json!({ "sessionIndex": i }))
            })?;
        sessions.push(SessionInput {
            id: id_or_new(s)?,
            name,
            weight,
        });
    }

    if mode == CalculationMode::WeightedAverage && !sessions.is_empty() {
        let total: i64 = sessions.iter().map(|s| s.weight).sum();
        if total != 100 {
            return Err(HandlerErr::new(
                "bad_params",
                "exam session weights must sum to 100 for weighted terms",
            )
            .with_details(json!({ "weightTotal": total })));
        }
    }

    Ok(TermInput {
        id,
        name,
        year,
        mode,
        closing_date: parse_date(params, "closingDate")?,
        opening_date: parse_date(params, "openingDate")?,
        sessions,
    })
}

fn list_terms(state: &mut AppState) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let mut stmt = conn
        .prepare(
            "SELECT id, name, year, calculation_mode, closing_date, opening_date
             FROM terms ORDER BY year, name",
        )
        .map_err(query_err)?;
    let mut terms: Vec<Value> = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "year": r.get::<_, i64>(2)?,
                "calculationMode": r.get::<_, String>(3)?,
                "closingDate": r.get::<_, Option<String>>(4)?,
                "openingDate": r.get::<_, Option<String>>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_err)?;

    let mut sess_stmt = conn
        .prepare(
            "SELECT id, name, weight FROM exam_sessions
             WHERE term_id = ? ORDER BY sort_order, rowid",
        )
        .map_err(query_err)?;
    for term in terms.iter_mut() {
        let term_id = term["id"].as_str().unwrap_or_default().to_string();
        let sessions: Vec<Value> = sess_stmt
            .query_map([&term_id], |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "name": r.get::<_, String>(1)?,
                    "weight": r.get::<_, i64>(2)?,
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(query_err)?;
        term["sessions"] = json!(sessions);
    }
    Ok(json!({ "terms": terms }))
}

fn upsert_term(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let input = parse_term(&req.params)?;
    let conn = db_conn(state)?;
    let tx = conn.unchecked_transaction().map_err(update_err)?;

    tx.execute(
        "INSERT INTO terms(id, name, year, calculation_mode, closing_date, opening_date)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           year = excluded.year,
           calculation_mode = excluded.calculation_mode,
           closing_date = excluded.closing_date,
           opening_date = excluded.opening_date",
        (
            &input.id,
            &input.name,
            input.year,
            input.mode.as_str(),
            input.closing_date.map(|d| d.format("%Y-%m-%d").to_string()),
            input.opening_date.map(|d| d.format("%Y-%m-%d").to_string()),
        ),
    )
    .map_err(update_err)?;

    // Sessions left out of the new list are removed together with their marks.
    let keep: Vec<&str> = input.sessions.iter().map(|s| s.id.as_str()).collect();
    let placeholders = vec!["?"; keep.len()].join(", ");
    let not_kept = if keep.is_empty() {
        String::new()
    } else {
        format!(" AND id NOT IN ({})", placeholders)
    };
    let bind: Vec<&str> = std::iter::once(input.id.as_str()).chain(keep.iter().copied()).collect();
    tx.execute(
        &format!(
            "DELETE FROM marks WHERE exam_session_id IN (
               SELECT id FROM exam_sessions WHERE term_id = ?{})",
            not_kept
        ),
        params_from_iter(bind.iter()),
    )
    .map_err(update_err)?;
    tx.execute(
        &format!("DELETE FROM exam_sessions WHERE term_id = ?{}", not_kept),
        params_from_iter(bind.iter()),
    )
    .map_err(update_err)?;

    for (i, s) in input.sessions.iter().enumerate() {
        let changed = tx
            .execute(
                "INSERT INTO exam_sessions(id, term_id, name, weight, sort_order)
                 VALUES(?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                   name = excluded.name,
                   weight = excluded.weight,
                   sort_order = excluded.sort_order
                 WHERE exam_sessions.term_id = excluded.term_id",
                (&s.id, &input.id, &s.name, s.weight, i as i64),
            )
            .map_err(update_err)?;
        if changed == 0 {
            return Err(HandlerErr::new(
                "bad_params",
                "exam session belongs to another term",
            )
            .with_details(json!({ "examSessionId": s.id })));
        }
    }
    tx.commit().map_err(update_err)?;

    info!(term_id = %input.id, sessions = input.sessions.len(), "term saved");
    state.invalidate();
    let session_ids: Vec<&str> = input.sessions.iter().map(|s| s.id.as_str()).collect();
    Ok(json!({ "termId": input.id, "examSessionIds": session_ids }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let resp = match req.method.as_str() {
        "terms.list" => list_terms(state),
        "terms.upsert" => upsert_term(state, req),
        _ => return None,
    };
    Some(match resp {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
