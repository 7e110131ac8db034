use super::report::{build_student_report, StudentReport};
use super::CalcContext;
use crate::model::{Student, Term};
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceChangeEntry {
    pub student_id: String,
    pub student_name: String,
    pub admission_number: String,
    pub current_report: StudentReport,
    pub previous_report: StudentReport,
    pub mean_points_change: f64,
}

/// Pairs each student's reports for two terms. Students without mean points
/// in either term are left out; entries keep roster order and are not sorted.
pub fn performance_changes(
    ctx: &CalcContext<'_>,
    current: &Term,
    previous: &Term,
    class_filter: Option<&str>,
) -> Vec<PerformanceChangeEntry> {
    ctx.snapshot
        .students
        .iter()
        .filter(|s| class_filter.map_or(true, |c| s.class_id == c))
        .filter_map(|student| {
            let current_report = build_student_report(ctx, student, current)?;
            let previous_report = build_student_report(ctx, student, previous)?;
            let now = current_report.mean_term_points?;
            let before = previous_report.mean_term_points?;
            Some(PerformanceChangeEntry {
                student_id: student.id.clone(),
                student_name: student.name.clone(),
                admission_number: student.admission_number.clone(),
                current_report,
                previous_report,
                mean_points_change: now - before,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceDatapoint {
    pub term_id: String,
    pub term_name: String,
    pub year: i32,
    pub mean_weighted_score: Option<f64>,
    pub mean_term_points: Option<f64>,
    pub overall_term_grade: Option<String>,
}

fn chronological(a: &Term, b: &Term) -> Ordering {
    a.year.cmp(&b.year).then_with(|| match (a.sequence(), b.sequence()) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.name.cmp(&b.name)),
        _ => a.name.cmp(&b.name),
    })
}

/// One datapoint per term in which the student has mean points, oldest first.
pub fn performance_history(ctx: &CalcContext<'_>, student: &Student) -> Vec<PerformanceDatapoint> {
    let mut terms: Vec<&Term> = ctx.snapshot.terms.iter().collect();
    terms.sort_by(|a, b| chronological(a, b));

    terms
        .into_iter()
        .filter_map(|term| {
            let report = build_student_report(ctx, student, term)?;
            if report.mean_term_points.is_none() {
                return None;
            }
            Some(PerformanceDatapoint {
                term_id: term.id.clone(),
                term_name: term.name.clone(),
                year: term.year,
                mean_weighted_score: report.mean_weighted_score,
                mean_term_points: report.mean_term_points,
                overall_term_grade: report.overall_term_grade,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::fixtures::{self, mark, student, term};
    use crate::calc::grading::GradingScale;
    use crate::model::CalculationMode;
    use crate::model::ScoreOutcome::*;

    #[test]
    fn change_is_current_minus_previous() {
        let mut snap = fixtures::school();
        snap.students = vec![student("a", "Amina", "F1", "East")];
        snap.marks = vec![
            // T1: 60 -> 8 points
            mark("a", "ENG", "end", Numeric(60)),
            // T2: 82 -> 12 points
            mark("a", "ENG", "end2", Numeric(82)),
        ];
        let scale = GradingScale::default();
        let ctx = CalcContext::new(&snap, &scale);
        let t1 = snap.term("T1").expect("t1");
        let t2 = snap.term("T2").expect("t2");

        let up = performance_changes(&ctx, t2, t1, None);
        assert_eq!(up.len(), 1);
        assert_eq!(up[0].mean_points_change, 4.0);
        assert_eq!(up[0].current_report.term.id, "T2");

        let down = performance_changes(&ctx, t1, t2, Some("F1"));
        assert_eq!(down[0].mean_points_change, -4.0);
    }

    #[test]
    fn student_without_marks_in_one_term_is_excluded() {
        let mut snap = fixtures::school();
        snap.students = vec![
            student("a", "Amina", "F1", "East"),
            student("b", "Baraka", "F1", "East"),
        ];
        snap.marks = vec![
            mark("a", "ENG", "end", Numeric(60)),
            mark("a", "ENG", "end2", Numeric(60)),
            mark("b", "ENG", "end", Numeric(90)),
        ];
        let scale = GradingScale::default();
        let ctx = CalcContext::new(&snap, &scale);
        let t1 = snap.term("T1").expect("t1");
        let t2 = snap.term("T2").expect("t2");
        let out = performance_changes(&ctx, t2, t1, None);
        let ids: Vec<&str> = out.iter().map(|e| e.student_id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
        assert_eq!(out[0].mean_points_change, 0.0);
    }

    #[test]
    fn history_orders_by_year_then_term_number() {
        let mut snap = fixtures::school();
        snap.terms.push(term("T3-24", "Term 3", 2024, CalculationMode::SimpleAverage));
        snap.terms.push(term("T10", "Term 10", 2025, CalculationMode::SimpleAverage));
        snap.exam_sessions.push(fixtures::session("old", "T3-24", 100));
        snap.exam_sessions.push(fixtures::session("late", "T10", 100));
        snap.students = vec![student("a", "Amina", "F1", "East")];
        snap.marks = vec![
            mark("a", "ENG", "late", Numeric(40)),
            mark("a", "ENG", "end2", Numeric(50)),
            mark("a", "ENG", "old", Numeric(70)),
            mark("a", "MAT", "end", Numeric(80)),
        ];
        let scale = GradingScale::default();
        let ctx = CalcContext::new(&snap, &scale);
        let s = snap.student("a").expect("student");
        let history = performance_history(&ctx, s);
        let ids: Vec<&str> = history.iter().map(|d| d.term_id.as_str()).collect();
        assert_eq!(ids, vec!["T3-24", "T1", "T2", "T10"]);
        assert_eq!(history[1].overall_term_grade.as_deref(), Some("A"));
    }

    #[test]
    fn history_skips_terms_without_points() {
        let mut snap = fixtures::school();
        snap.students = vec![student("a", "Amina", "F1", "East")];
        snap.marks = vec![mark("a", "ENG", "end2", Numeric(50))];
        let scale = GradingScale::default();
        let ctx = CalcContext::new(&snap, &scale);
        let s = snap.student("a").expect("student");
        let history = performance_history(&ctx, s);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].term_id, "T2");
    }
}
