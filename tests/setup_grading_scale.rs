mod test_support;

use serde_json::json;
use test_support::{add_student, mark, seed_school, Sidecar};

#[test]
fn setup_get_returns_defaults() {
    let mut s = Sidecar::start();
    let setup = s.request_ok("setup.get", json!({}));
    assert_eq!(setup["school"]["name"], json!(""));
    assert!(setup["school"]["motto"].is_null());
    let scale = setup["grading"]["scale"].as_array().expect("scale");
    assert_eq!(scale.len(), 12);
    assert_eq!(scale[0], json!({ "min": 80, "grade": "A", "points": 12 }));
    assert_eq!(scale[11], json!({ "min": 0, "grade": "E", "points": 1 }));
}

#[test]
fn custom_scale_regrades_reports() {
    let mut s = Sidecar::start();
    seed_school(&mut s);
    add_student(&mut s, "s1", "Amina Yusuf", "F1", "East");
    s.set_marks(json!([
        mark("s1", "ENG", "END", json!(64)),
        mark("s1", "MAT", "END", json!(30)),
    ]));

    s.request_ok(
        "setup.update",
        json!({
            "section": "grading",
            "patch": { "scale": [
                { "min": 50, "grade": "PASS", "points": 12 },
                { "min": 0, "grade": "FAIL", "points": 0 }
            ] }
        }),
    );

    let r = s.request_ok("reports.student", json!({ "studentId": "s1", "termId": "T1" }))["report"]
        .clone();
    assert_eq!(r["subjectTermResults"][0]["termGrade"], json!("PASS"));
    assert_eq!(r["subjectTermResults"][1]["termGrade"], json!("FAIL"));
    assert_eq!(r["meanTermPoints"], json!(6.0));
    assert_eq!(r["overallTermGrade"], json!("FAIL"));

    let setup = s.request_ok("setup.get", json!({}));
    assert_eq!(setup["grading"]["scale"][0]["grade"], json!("PASS"));
}

#[test]
fn invalid_scales_are_rejected() {
    let mut s = Sidecar::start();
    for scale in [
        json!([]),
        json!([{ "min": 0, "grade": "F", "points": 0 }, { "min": 50, "grade": "P", "points": 12 }]),
        json!([{ "min": 50, "grade": "X", "points": 12 }, { "min": 0, "grade": "F", "points": 0 }]),
        json!([{ "min": 50, "grade": "P", "points": 12 }]),
        json!([{ "min": 50, "grade": "P", "points": 13 }, { "min": 0, "grade": "F", "points": 0 }]),
        json!("A to E"),
    ] {
        let e = s.request_err(
            "setup.update",
            json!({ "section": "grading", "patch": { "scale": scale } }),
        );
        assert_eq!(e["code"], json!("bad_params"), "scale accepted: {}", scale);
    }
    let setup = s.request_ok("setup.get", json!({}));
    assert_eq!(setup["grading"]["scale"][0]["grade"], json!("A"));
}

#[test]
fn school_fields_are_validated() {
    let mut s = Sidecar::start();
    let e = s.request_err(
        "setup.update",
        json!({ "section": "school", "patch": { "name": "x".repeat(121) } }),
    );
    assert_eq!(e["code"], json!("bad_params"));
    let e = s.request_err(
        "setup.update",
        json!({ "section": "school", "patch": { "colour": "blue" } }),
    );
    assert_eq!(e["code"], json!("bad_params"));
    let e = s.request_err("setup.update", json!({ "section": "fees", "patch": {} }));
    assert_eq!(e["code"], json!("bad_params"));
}

#[test]
fn snapshot_version_moves_with_writes() {
    let mut s = Sidecar::start();
    seed_school(&mut s);
    add_student(&mut s, "s1", "Amina Yusuf", "F1", "East");

    let params = json!({ "studentId": "s1", "termId": "T1" });
    let v1 = s.request_ok("reports.student", params.clone())["snapshotVersion"].clone();
    let v1_again = s.request_ok("reports.student", params.clone())["snapshotVersion"].clone();
    assert_eq!(v1, v1_again);

    s.set_marks(json!([mark("s1", "ENG", "END", json!(50))]));
    let v2 = s.request_ok("reports.student", params)["snapshotVersion"].clone();
    assert!(v2.is_string());
    assert_ne!(v1, v2);
}

#[test]
fn grading_scale_change_moves_snapshot_version() {
    let mut s = Sidecar::start();
    seed_school(&mut s);
    add_student(&mut s, "s1", "Amina Yusuf", "F1", "East");
    s.set_marks(json!([mark("s1", "ENG", "END", json!(62))]));

    let params = json!({ "studentId": "s1", "termId": "T1" });
    let before = s.request_ok("reports.student", params.clone());
    assert_eq!(before["report"]["overallTermGrade"], json!("B-"));

    s.request_ok(
        "setup.update",
        json!({
            "section": "grading",
            "patch": { "scale": [
                { "min": 50, "grade": "PASS", "points": 12 },
                { "min": 0, "grade": "FAIL", "points": 0 }
            ] }
        }),
    );
    let after = s.request_ok("reports.student", params);
    assert_eq!(after["report"]["overallTermGrade"], json!("PASS"));
    assert_ne!(before["snapshotVersion"], after["snapshotVersion"]);
}
