use super::aggregate::{aggregate_subject_score, session_scores};
use super::grading::GradingScale;
use super::ranking::{self, RankKey, Rankable};
use super::CalcContext;
use crate::model::{
    ExamSession, SchoolClass, ScoreOutcome, Snapshot, StaffRole, Student, Subject, Term,
};
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentScore {
    pub exam_session_id: String,
    pub exam_session_name: String,
    pub score: ScoreOutcome,
    pub grade: String,
    pub points: u8,
    pub remarks: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectTermResult {
    pub subject_id: String,
    pub subject_name: String,
    pub weighted_score: ScoreOutcome,
    pub term_grade: String,
    pub term_points: u8,
    pub term_remarks: String,
    pub teacher_initials: String,
    pub component_scores: Vec<ComponentScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
    pub student: Student,
    pub class_info: SchoolClass,
    pub term: Term,
    pub subject_term_results: Vec<SubjectTermResult>,
    pub total_weighted_marks: Option<u32>,
    pub max_total_marks: u32,
    pub mean_weighted_score: Option<f64>,
    pub mean_term_points: Option<f64>,
    pub overall_term_grade: Option<String>,
    pub principal_comment: String,
    pub class_teacher_comment: String,
    pub rank: Option<usize>,
    pub total_students_in_class: Option<usize>,
    pub class_teacher_name: Option<String>,
    pub class_teacher_signature_url: Option<String>,
    pub principal_name: Option<String>,
    pub principal_signature_url: Option<String>,
    pub current_fees_balance: f64,
    pub next_term_fees: f64,
    pub closing_date: Option<NaiveDate>,
    pub opening_date: Option<NaiveDate>,
}

impl Rankable for StudentReport {
    fn rank_key(&self) -> Option<RankKey<'_>> {
        Some(RankKey {
            points: self.mean_term_points?,
            total_marks: self.total_weighted_marks.map(f64::from),
            tiebreak: &self.student.name,
        })
    }
}

/// The figures a report derives from its subject results.
#[derive(Debug, Clone, PartialEq)]
pub struct TermTotals {
    pub total_weighted_marks: Option<u32>,
    pub max_total_marks: u32,
    pub mean_weighted_score: Option<f64>,
    pub mean_term_points: Option<f64>,
    pub overall_term_grade: Option<String>,
}

/// Lightweight per-student figures used for peer ranking and cohort views.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentTermSummary<'a> {
    pub student: &'a Student,
    pub totals: TermTotals,
    pub subject_scores: Vec<(&'a str, ScoreOutcome)>,
}

impl StudentTermSummary<'_> {
    pub fn score_for(&self, subject_id: &str) -> Option<ScoreOutcome> {
        self.subject_scores
            .iter()
            .find(|(id, _)| *id == subject_id)
            .map(|(_, s)| *s)
    }
}

impl Rankable for StudentTermSummary<'_> {
    fn rank_key(&self) -> Option<RankKey<'_>> {
        Some(RankKey {
            points: self.totals.mean_term_points?,
            total_marks: self.totals.total_weighted_marks.map(f64::from),
            tiebreak: &self.student.name,
        })
    }
}

/// The student's explicit subset (restricted to active subjects) or every
/// active subject.
pub fn subjects_for_student<'a>(snapshot: &'a Snapshot, student: &Student) -> Vec<&'a Subject> {
    match student.subjects.as_deref() {
        Some(ids) if !ids.is_empty() => snapshot
            .active_subjects()
            .filter(|s| ids.iter().any(|id| *id == s.id))
            .collect(),
        _ => snapshot.active_subjects().collect(),
    }
}

/// Totals cover numeric subjects only; mean points cover every subject with
/// an entered score, sentinel subjects contributing zero points.
pub fn term_totals(scale: &GradingScale, results: &[(ScoreOutcome, u8)]) -> TermTotals {
    let numeric: Vec<u32> = results
        .iter()
        .filter_map(|(s, _)| s.value().map(u32::from))
        .collect();
    let taken: Vec<u8> = results
        .iter()
        .filter(|(s, _)| s.is_entered())
        .map(|(_, p)| *p)
        .collect();

    let max_total_marks = 100 * numeric.len() as u32;
    let total_weighted_marks = if numeric.is_empty() {
        None
    } else {
        Some(numeric.iter().sum::<u32>())
    };
    let mean_weighted_score = total_weighted_marks
        .filter(|_| max_total_marks > 0)
        .map(|t| f64::from(t) / f64::from(max_total_marks) * 100.0);
    let mean_term_points = if taken.is_empty() {
        None
    } else {
        Some(taken.iter().map(|p| f64::from(*p)).sum::<f64>() / taken.len() as f64)
    };
    let overall_term_grade = Some(match mean_weighted_score {
        Some(m) => scale.resolve_percent(m).grade,
        None => scale.resolve(ScoreOutcome::Unrecorded).grade,
    });

    TermTotals {
        total_weighted_marks,
        max_total_marks,
        mean_weighted_score,
        mean_term_points,
        overall_term_grade,
    }
}

pub fn summarize_student<'a>(
    ctx: &CalcContext<'a>,
    student: &'a Student,
    term: &Term,
) -> StudentTermSummary<'a> {
    let sessions: Vec<&ExamSession> = ctx.snapshot.sessions_for_term(&term.id).collect();
    let subject_scores: Vec<(&'a str, ScoreOutcome)> = subjects_for_student(ctx.snapshot, student)
        .into_iter()
        .map(|subject| {
            let parts = session_scores(ctx, &student.id, &subject.id, &sessions);
            (
                subject.id.as_str(),
                aggregate_subject_score(term.calculation_mode, &parts),
            )
        })
        .collect();
    let graded: Vec<(ScoreOutcome, u8)> = subject_scores
        .iter()
        .map(|(_, s)| (*s, ctx.scale.resolve(*s).points))
        .collect();
    StudentTermSummary {
        student,
        totals: term_totals(ctx.scale, &graded),
        subject_scores,
    }
}

/// `(rank, ranked peer count)` within the student's class and stream.
pub fn class_stream_rank(
    ctx: &CalcContext<'_>,
    student: &Student,
    term: &Term,
) -> (Option<usize>, Option<usize>) {
    let peers: Vec<StudentTermSummary<'_>> = ctx
        .snapshot
        .students
        .iter()
        .filter(|s| s.class_id == student.class_id && s.stream == student.stream)
        .map(|s| summarize_student(ctx, s, term))
        .collect();
    let ranked = ranking::rank(peers);
    if ranked.is_empty() {
        return (None, None);
    }
    let rank = ranked
        .iter()
        .find(|r| r.item.student.id == student.id)
        .map(|r| r.rank);
    (rank, Some(ranked.len()))
}

fn subject_result(
    ctx: &CalcContext<'_>,
    student: &Student,
    subject: &Subject,
    term: &Term,
    sessions: &[&ExamSession],
) -> SubjectTermResult {
    let parts = session_scores(ctx, &student.id, &subject.id, sessions);
    let component_scores = sessions
        .iter()
        .zip(parts.iter())
        .map(|(session, part)| {
            let gp = ctx.scale.resolve(part.score);
            ComponentScore {
                exam_session_id: session.id.clone(),
                exam_session_name: session.name.clone(),
                score: part.score,
                grade: gp.grade,
                points: gp.points,
                remarks: gp.remarks,
            }
        })
        .collect();

    let weighted_score = aggregate_subject_score(term.calculation_mode, &parts);
    let term_gp = ctx.scale.resolve(weighted_score);
    let teacher_initials = ctx
        .snapshot
        .staff
        .iter()
        .find(|u| u.teaches(&student.class_id, &subject.id))
        .map(|u| u.initials())
        .unwrap_or_else(|| "-".to_string());

    SubjectTermResult {
        subject_id: subject.id.clone(),
        subject_name: subject.name.clone(),
        weighted_score,
        term_grade: term_gp.grade,
        term_points: term_gp.points,
        term_remarks: term_gp.remarks,
        teacher_initials,
        component_scores,
    }
}

/// Principal and class-teacher remarks keyed on mean points.
pub fn comments_for(mean_term_points: Option<f64>, first_name: &str) -> (String, String) {
    let Some(points) = mean_term_points else {
        return (
            "Satisfactory progress. Keep up the effort.".to_string(),
            format!(
                "{} has shown consistent effort. \
                 Focus on areas of improvement for even better results.",
                first_name
            ),
        );
    };
    if points >= 10.0 {
        (
            "Excellent performance! Your hard work is commendable. Aim for the stars!".to_string(),
            format!(
                "Outstanding work, {}! Your dedication is inspiring. Keep challenging yourself.",
                first_name
            ),
        )
    } else if points >= 7.0 {
        (
            "Very good progress. Continue to strive for excellence.".to_string(),
            format!(
                "Well done, {}! You are making great strides. Maintain this momentum.",
                first_name
            ),
        )
    } else if points >= 5.0 {
        (
            "Good effort. With more focus, you can achieve even better.".to_string(),
            format!(
                "{} is showing good potential. \
                 Consistent revision will yield significant improvements.",
                first_name
            ),
        )
    } else if points > 0.0 {
        (
            "There's room for improvement. Let's work together to identify and address challenges."
                .to_string(),
            format!(
                "{}, let's focus on building stronger foundations in key areas. I'm here to help.",
                first_name
            ),
        )
    } else {
        (
            "Significant effort is required. Please see the class teacher for guidance."
                .to_string(),
            format!(
                "{}, we need to discuss strategies for improvement. Please make time to see me.",
                first_name
            ),
        )
    }
}

/// Full report for one student and term. `None` only when the student's class
/// is unknown.
pub fn build_student_report(
    ctx: &CalcContext<'_>,
    student: &Student,
    term: &Term,
) -> Option<StudentReport> {
    let class_info = ctx.snapshot.class(&student.class_id)?;
    let sessions: Vec<&ExamSession> = ctx.snapshot.sessions_for_term(&term.id).collect();

    let subject_term_results: Vec<SubjectTermResult> = subjects_for_student(ctx.snapshot, student)
        .into_iter()
        .map(|subject| subject_result(ctx, student, subject, term, &sessions))
        .collect();
    let graded: Vec<(ScoreOutcome, u8)> = subject_term_results
        .iter()
        .map(|r| (r.weighted_score, r.term_points))
        .collect();
    let totals = term_totals(ctx.scale, &graded);

    let (rank, total_students_in_class) = class_stream_rank(ctx, student, term);
    let (principal_comment, class_teacher_comment) =
        comments_for(totals.mean_term_points, student.first_name());

    let class_teacher = ctx
        .snapshot
        .staff
        .iter()
        .find(|u| u.assigned_to_class(&student.class_id));
    let principal = ctx
        .snapshot
        .staff
        .iter()
        .find(|u| u.role == StaffRole::Admin && u.name.to_lowercase().contains("principal"));

    Some(StudentReport {
        student: student.clone(),
        class_info: class_info.clone(),
        term: term.clone(),
        subject_term_results,
        total_weighted_marks: totals.total_weighted_marks,
        max_total_marks: totals.max_total_marks,
        mean_weighted_score: totals.mean_weighted_score,
        mean_term_points: totals.mean_term_points,
        overall_term_grade: totals.overall_term_grade,
        principal_comment,
        class_teacher_comment,
        rank,
        total_students_in_class,
        class_teacher_name: class_teacher.map(|u| u.name.clone()),
        class_teacher_signature_url: class_teacher.and_then(|u| u.signature_image_url.clone()),
        principal_name: principal.map(|u| u.name.clone()),
        principal_signature_url: principal.and_then(|u| u.signature_image_url.clone()),
        current_fees_balance: student.current_fees_balance,
        next_term_fees: student.next_term_fees,
        closing_date: term.closing_date,
        opening_date: term.opening_date,
    })
}
