mod test_support;

use serde_json::{json, Value};
use test_support::{add_student, mark, seed_school, Sidecar};

fn seed_tied_class(s: &mut Sidecar) {
    seed_school(s);
    add_student(s, "a", "Amina", "F1", "East");
    add_student(s, "b", "Baraka", "F1", "West");
    add_student(s, "c", "Chebet", "F1", "East");
    add_student(s, "d", "Dalmas", "F2", "East");
    add_student(s, "n", "Njoroge", "F1", "East");
    s.set_marks(json!([
        mark("a", "ENG", "END", json!(60)),
        mark("a", "MAT", "END", json!(60)),
        mark("b", "ENG", "END", json!(60)),
        mark("b", "MAT", "END", json!(60)),
        mark("c", "ENG", "END", json!(55)),
        mark("c", "MAT", "END", json!(50)),
        mark("d", "ENG", "END", json!(90)),
        mark("d", "MAT", "END", json!(90)),
    ]));
}

fn ids_and_ranks(entries: &Value) -> Vec<(String, u64)> {
    entries
        .as_array()
        .expect("entries")
        .iter()
        .map(|e| {
            (
                e["report"]["student"]["id"].as_str().unwrap_or_default().to_string(),
                e["meritRank"].as_u64().unwrap_or_default(),
            )
        })
        .collect()
}

#[test]
fn merit_list_ties_share_rank_and_leave_gap() {
    let mut s = Sidecar::start();
    seed_tied_class(&mut s);

    let out = s.request_ok("analytics.meritList", json!({ "termId": "T1", "classId": "F1" }));
    assert_eq!(
        ids_and_ranks(&out["entries"]),
        vec![("a".into(), 1), ("b".into(), 1), ("c".into(), 3)]
    );
    let a = &out["entries"][0]["report"];
    assert_eq!(a["meanTermPoints"], json!(8.0));
    assert_eq!(out["entries"][2]["report"]["meanTermPoints"], json!(6.5));
    // Stream rank stays on the report.
    assert_eq!(out["entries"][1]["report"]["rank"], json!(1));
    assert_eq!(out["entries"][2]["report"]["rank"], json!(2));
}

#[test]
fn merit_list_for_all_classes_spans_the_school() {
    let mut s = Sidecar::start();
    seed_tied_class(&mut s);

    let all = s.request_ok("analytics.meritList", json!({ "termId": "T1", "classId": "all" }));
    assert_eq!(
        ids_and_ranks(&all["entries"]),
        vec![("d".into(), 1), ("a".into(), 2), ("b".into(), 2), ("c".into(), 4)]
    );
    let unfiltered = s.request_ok("analytics.meritList", json!({ "termId": "T1" }));
    assert_eq!(unfiltered["entries"], all["entries"]);

    let empty = s.request_ok("analytics.meritList", json!({ "termId": "T2" }));
    assert_eq!(empty["entries"], json!([]));
}

#[test]
fn merit_list_rejects_unknown_term_and_class() {
    let mut s = Sidecar::start();
    seed_tied_class(&mut s);
    let e = s.request_err("analytics.meritList", json!({ "termId": "T9" }));
    assert_eq!(e["code"], json!("not_found"));
    let e = s.request_err("analytics.meritList", json!({ "termId": "T1", "classId": "F7" }));
    assert_eq!(e["code"], json!("not_found"));
}

#[test]
fn broadsheet_lists_ranked_students_with_a_cell_per_subject() {
    let mut s = Sidecar::start();
    seed_school(&mut s);
    add_student(&mut s, "a", "Amina", "F1", "East");
    add_student(&mut s, "b", "Baraka", "F1", "West");
    add_student(&mut s, "n", "Njoroge", "F1", "East");
    s.set_marks(json!([
        mark("a", "ENG", "END", json!(70)),
        mark("a", "MAT", "END", json!(60)),
        mark("b", "ENG", "END", json!(50)),
        mark("b", "MAT", "END", json!("X")),
    ]));

    let out = s.request_ok("analytics.broadsheet", json!({ "termId": "T1", "classId": "F1" }));
    assert_eq!(
        out["subjects"],
        json!([{ "id": "ENG", "name": "English" }, { "id": "MAT", "name": "Mathematics" }])
    );
    let rows = out["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["studentId"], json!("a"));
    assert_eq!(rows[0]["rank"], json!(1));
    assert_eq!(rows[0]["totalWeightedMarks"], json!(130));

    let b = &rows[1];
    assert_eq!(b["rank"], json!(2));
    assert_eq!(
        b["subjectScores"],
        json!([{ "subjectId": "ENG", "score": 50 }, { "subjectId": "MAT", "score": "X" }])
    );
    assert_eq!(b["totalWeightedMarks"], json!(50));
    assert_eq!(b["meanWeightedScore"], json!(50.0));
    assert_eq!(b["meanTermPoints"], json!(3.0));
    assert_eq!(b["overallTermGrade"], json!("C"));
}

#[test]
fn broadsheet_requires_a_class() {
    let mut s = Sidecar::start();
    seed_school(&mut s);
    let e = s.request_err("analytics.broadsheet", json!({ "termId": "T1" }));
    assert_eq!(e["code"], json!("bad_params"));
}
