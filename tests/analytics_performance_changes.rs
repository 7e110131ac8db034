mod test_support;

use serde_json::json;
use test_support::{add_student, mark, seed_school, Sidecar};

#[test]
fn changes_pair_students_with_points_in_both_terms() {
    let mut s = Sidecar::start();
    seed_school(&mut s);
    add_student(&mut s, "a", "Amina", "F1", "East");
    add_student(&mut s, "b", "Baraka", "F1", "East");
    add_student(&mut s, "c", "Chebet", "F1", "East");
    s.set_marks(json!([
        mark("a", "ENG", "END", json!(80)),
        mark("a", "MAT", "END", json!(70)),
        mark("a", "ENG", "END2", json!(60)),
        mark("a", "MAT", "END2", json!(60)),
        mark("b", "ENG", "END", json!(75)),
        mark("c", "ENG", "END2", json!(75)),
    ]));

    let out = s.request_ok(
        "analytics.performanceChanges",
        json!({ "termId": "T2", "comparisonTermId": "T1", "classId": "F1" }),
    );
    let entries = out["entries"].as_array().expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["studentId"], json!("a"));
    assert_eq!(entries[0]["meanPointsChange"], json!(-3.0));
    assert_eq!(entries[0]["currentReport"]["term"]["id"], json!("T2"));
    assert_eq!(entries[0]["previousReport"]["meanTermPoints"], json!(11.0));

    let other = s.request_ok(
        "analytics.performanceChanges",
        json!({ "termId": "T2", "comparisonTermId": "T1", "classId": "F2" }),
    );
    assert_eq!(other["entries"], json!([]));
}

#[test]
fn unknown_comparison_term_is_not_found() {
    let mut s = Sidecar::start();
    seed_school(&mut s);
    let e = s.request_err(
        "analytics.performanceChanges",
        json!({ "termId": "T2", "comparisonTermId": "T0" }),
    );
    assert_eq!(e["code"], json!("not_found"));
    let e = s.request_err("analytics.performanceChanges", json!({ "termId": "T2" }));
    assert_eq!(e["code"], json!("bad_params"));
}
