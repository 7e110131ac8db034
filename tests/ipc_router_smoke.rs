mod test_support;

use serde_json::json;
use test_support::{seed_school, Sidecar};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let mut s = Sidecar::start();
    seed_school(&mut s);

    let health = s.request_ok("health", json!({}));
    assert!(health["version"].is_string());
    assert!(health["workspacePath"].is_string());

    let calls = [
        ("setup.get", json!({})),
        ("classes.list", json!({})),
        ("subjects.list", json!({})),
        ("terms.list", json!({})),
        ("students.list", json!({})),
        ("staff.list", json!({})),
        (
            "marks.sheet",
            json!({ "classId": "F1", "subjectId": "ENG", "examSessionId": "CAT" }),
        ),
        ("marks.bulkSet", json!({ "edits": [] })),
        ("analytics.meritList", json!({ "termId": "T1" })),
        ("analytics.broadsheet", json!({ "termId": "T1", "classId": "F1" })),
        ("analytics.classTerm", json!({ "termId": "T1" })),
        (
            "analytics.performanceChanges",
            json!({ "termId": "T2", "comparisonTermId": "T1" }),
        ),
        ("analytics.insightSummary", json!({ "termId": "T1" })),
    ];
    for (method, params) in calls {
        s.request_ok(method, params);
    }

    let unknown = s.request_err("nope.method", json!({}));
    assert_eq!(unknown["code"], json!("not_implemented"));
}

#[test]
fn workspace_is_required_for_data_methods() {
    let mut s = Sidecar::spawn();
    assert!(s.request_ok("health", json!({}))["workspacePath"].is_null());
    assert_eq!(
        s.request_ok("classes.list", json!({})),
        json!({ "classes": [] })
    );
    for method in ["setup.get", "terms.list", "staff.list", "classes.upsert"] {
        let e = s.request_err(method, json!({ "name": "x" }));
        assert_eq!(e["code"], json!("no_workspace"), "{}", method);
    }
    let e = s.request_err("analytics.meritList", json!({ "termId": "T1" }));
    assert_eq!(e["code"], json!("no_workspace"));
}

#[test]
fn malformed_lines_get_bad_json_replies() {
    let mut s = Sidecar::spawn();
    let v = s.send_raw("{not json");
    assert_eq!(v["ok"], json!(false));
    assert_eq!(v["error"]["code"], json!("bad_json"));
    assert!(v["id"].is_null());

    let v = s.send_raw(r#"{"id":"9","params":{}}"#);
    assert_eq!(v["error"]["code"], json!("bad_json"));
    assert_eq!(v["id"], json!("9"));

    // The sidecar keeps serving after a bad line.
    s.request_ok("health", json!({}));
}

#[test]
fn missing_entities_are_not_found() {
    let mut s = Sidecar::start();
    seed_school(&mut s);
    let e = s.request_err("reports.student", json!({ "studentId": "ghost", "termId": "T1" }));
    assert_eq!(e["code"], json!("not_found"));
    let e = s.request_err("analytics.meritList", json!({ "termId": "T9" }));
    assert_eq!(e["code"], json!("not_found"));
    let e = s.request_err("analytics.broadsheet", json!({ "termId": "T1", "classId": "F9" }));
    assert_eq!(e["code"], json!("not_found"));
    let e = s.request_err("analytics.broadsheet", json!({ "termId": "T1" }));
    assert_eq!(e["code"], json!("bad_params"));
}
