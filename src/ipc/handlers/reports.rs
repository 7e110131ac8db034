use crate::calc::compare::performance_history;
use crate::calc::report::build_student_report;
use crate::calc::CalcContext;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::handlers::setup::load_school;
use crate::ipc::helpers::{
    db_conn, find_student, find_term, loaded_snapshot, query_err, required_str,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use tracing::debug;

fn report_student(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let student_id = required_str(&req.params, "studentId")?;
    let term_id = required_str(&req.params, "termId")?;
    let school = load_school(db_conn(state)?).map_err(query_err)?;

    let loaded = loaded_snapshot(state)?;
    let snap = &loaded.snapshot;
    let student = find_student(snap, &student_id)?;
    let term = find_term(snap, &term_id)?;
    let ctx = CalcContext::new(snap, &loaded.scale);
    let report = build_student_report(&ctx, student, term);
    debug!(
        student_id = %student_id,
        term_id = %term_id,
        found = report.is_some(),
        "student report"
    );

    Ok(json!({
        "report": report,
        "school": school,
        "snapshotVersion": loaded.version,
    }))
}

fn report_history(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let student_id = required_str(&req.params, "studentId")?;
    let loaded = loaded_snapshot(state)?;
    let student = find_student(&loaded.snapshot, &student_id)?;
    let ctx = CalcContext::new(&loaded.snapshot, &loaded.scale);
    let datapoints = performance_history(&ctx, student);

    Ok(json!({
        "studentId": student_id,
        "datapoints": datapoints,
        "snapshotVersion": loaded.version,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let resp = match req.method.as_str() {
        "reports.student" => report_student(state, req),
        "reports.history" => report_history(state, req),
        _ => return None,
    };
    Some(match resp {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
