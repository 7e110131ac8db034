use crate::calc::cohort::{broadsheet, class_term_analysis, insight_summary, merit_list};
use crate::calc::compare::performance_changes;
use crate::calc::CalcContext;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{find_term, loaded_snapshot, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::Snapshot;
use serde_json::{json, Value};
use tracing::debug;

/// Class filter: absent, `null` or `"all"` mean every class. A named class
/// must exist.
fn class_filter(snap: &Snapshot, params: &Value) -> Result<Option<String>, HandlerErr> {
    match optional_str(params, "classId")? {
        None => Ok(None),
        Some(id) if id == "all" => Ok(None),
        Some(id) if snap.class(&id).is_some() => Ok(Some(id)),
        Some(id) => Err(HandlerErr::new("not_found", "class not found")
            .with_details(json!({ "classId": id }))),
    }
}

fn analytics_merit_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let term_id = required_str(&req.params, "termId")?;
    let loaded = loaded_snapshot(state)?;
    let snap = &loaded.snapshot;
    let term = find_term(snap, &term_id)?;
    let class_id = class_filter(snap, &req.params)?;

    let ctx = CalcContext::new(snap, &loaded.scale);
    let entries = merit_list(&ctx, term, class_id.as_deref());
    debug!(term_id = %term_id, ranked = entries.len(), "merit list");

    Ok(json!({
        "termId": term_id,
        "classId": class_id,
        "entries": entries,
        "snapshotVersion": loaded.version,
    }))
}

fn analytics_broadsheet(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let term_id = required_str(&req.params, "termId")?;
    let class_id = required_str(&req.params, "classId")?;
    let loaded = loaded_snapshot(state)?;
    let snap = &loaded.snapshot;
    let term = find_term(snap, &term_id)?;
    if snap.class(&class_id).is_none() {
        return Err(HandlerErr::new("not_found", "class not found")
            .with_details(json!({ "classId": class_id })));
    }

    let ctx = CalcContext::new(snap, &loaded.scale);
    let rows = broadsheet(&ctx, term, &class_id);
    let subjects: Vec<Value> = snap
        .active_subjects()
        .map(|s| json!({ "id": s.id, "name": s.name }))
        .collect();
    debug!(term_id = %term_id, class_id = %class_id, rows = rows.len(), "broadsheet");

    Ok(json!({
        "termId": term_id,
        "classId": class_id,
        "subjects": subjects,
        "rows": rows,
        "snapshotVersion": loaded.version,
    }))
}

fn analytics_class_term(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let term_id = required_str(&req.params, "termId")?;
    let stream = optional_str(&req.params, "stream")?.filter(|s| s != "all");
    let loaded = loaded_snapshot(state)?;
    let snap = &loaded.snapshot;
    let term = find_term(snap, &term_id)?;
    let class_id = class_filter(snap, &req.params)?;

    let ctx = CalcContext::new(snap, &loaded.scale);
    let analysis = class_term_analysis(&ctx, term, class_id.as_deref(), stream.as_deref());
    debug!(term_id = %term_id, found = analysis.is_some(), "class term analysis");

    Ok(json!({
        "analysis": analysis,
        "snapshotVersion": loaded.version,
    }))
}

fn analytics_insight_summary(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let term_id = required_str(&req.params, "termId")?;
    let stream = optional_str(&req.params, "stream")?.filter(|s| s != "all");
    let loaded = loaded_snapshot(state)?;
    let snap = &loaded.snapshot;
    let term = find_term(snap, &term_id)?;
    let class_id = class_filter(snap, &req.params)?;

    let ctx = CalcContext::new(snap, &loaded.scale);
    let summary = class_term_analysis(&ctx, term, class_id.as_deref(), stream.as_deref())
        .map(|a| insight_summary(&a));

    Ok(json!({
        "summary": summary,
        "snapshotVersion": loaded.version,
    }))
}

fn analytics_performance_changes(
    state: &mut AppState,
    req: &Request,
) -> Result<Value, HandlerErr> {
    let term_id = required_str(&req.params, "termId")?;
    let comparison_id = required_str(&req.params, "comparisonTermId")?;
    let loaded = loaded_snapshot(state)?;
    let snap = &loaded.snapshot;
    let current = find_term(snap, &term_id)?;
    let previous = find_term(snap, &comparison_id)?;
    let class_id = class_filter(snap, &req.params)?;

    let ctx = CalcContext::new(snap, &loaded.scale);
    let entries = performance_changes(&ctx, current, previous, class_id.as_deref());
    debug!(
        term_id = %term_id,
        comparison = %comparison_id,
        entries = entries.len(),
        "performance changes"
    );

    Ok(json!({
        "termId": term_id,
        "comparisonTermId": comparison_id,
        "entries": entries,
        "snapshotVersion": loaded.version,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let resp = match req.method.as_str() {
        "analytics.meritList" => analytics_merit_list(state, req),
        "analytics.broadsheet" => analytics_broadsheet(state, req),
        "analytics.classTerm" => analytics_class_term(state, req),
        "analytics.performanceChanges" => analytics_performance_changes(state, req),
        "analytics.insightSummary" => analytics_insight_summary(state, req),
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
    use crate::model::SchoolClass;

    #[test]
    fn class_filter_accepts_all_and_known_classes() {
        let snap = Snapshot {
            classes: vec![SchoolClass {
                id: "F1".into(),
                name: "Form 1".into(),
            }],
            ..Snapshot::default()
        };
        assert_eq!(class_filter(&snap, &json!({})).ok(), Some(None));
        assert_eq!(class_filter(&snap, &json!({ "classId": "all" })).ok(), Some(None));
        assert_eq!(
            class_filter(&snap, &json!({ "classId": "F1" })).ok(),
            Some(Some("F1".to_string()))
        );
        assert_eq!(
            class_filter(&snap, &json!({ "classId": "F9" })).err().map(|e| e.code),
            Some("not_found")
        );
    }
}
