use super::grading::GradeBucket;
use super::ranking::{self, RankKey, Rankable};
use super::report::{build_student_report, summarize_student, StudentReport, StudentTermSummary};
use super::{round_off, CalcContext};
use crate::model::{ScoreOutcome, Student, Term};
use serde::Serialize;

pub const ALL_CLASSES_ID: &str = "all";
pub const WHOLE_SCHOOL_NAME: &str = "Whole School";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeritListEntry {
    pub merit_rank: usize,
    pub report: StudentReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadsheetCell {
    pub subject_id: String,
    pub score: ScoreOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassTermBroadsheetEntry {
    pub student_id: String,
    pub admission_number: String,
    pub student_name: String,
    pub class_id: String,
    pub stream: String,
    pub subject_scores: Vec<BroadsheetCell>,
    pub total_weighted_marks: Option<u32>,
    pub mean_weighted_score: Option<f64>,
    pub mean_term_points: Option<f64>,
    pub overall_term_grade: Option<String>,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRankEntry {
    pub student_id: String,
    pub student_name: String,
    pub admission_number: String,
    pub score: ScoreOutcome,
    pub grade: String,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectClassAnalysis {
    pub subject_id: String,
    pub subject_name: String,
    pub mean_score: Option<f64>,
    pub grade_distribution: Vec<GradeBucket>,
    pub ranked_students: Vec<SubjectRankEntry>,
    pub student_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassTermAnalysis {
    pub class_id: String,
    pub class_name: String,
    pub stream: Option<String>,
    pub term_id: String,
    pub term_name: String,
    pub year: i32,
    pub overall_mean_points: f64,
    pub overall_mean_grade: String,
    pub grade_distribution: Vec<GradeBucket>,
    pub total_students: usize,
    pub subject_analyses: Vec<SubjectClassAnalysis>,
}

fn in_class(student: &Student, class_filter: Option<&str>) -> bool {
    class_filter.map_or(true, |c| student.class_id == c)
}

/// Every student in the filter with a report and mean points, ranked over the
/// whole filtered population. Each report keeps its own class+stream rank.
pub fn merit_list(
    ctx: &CalcContext<'_>,
    term: &Term,
    class_filter: Option<&str>,
) -> Vec<MeritListEntry> {
    let reports: Vec<StudentReport> = ctx
        .snapshot
        .students
        .iter()
        .filter(|s| in_class(s, class_filter))
        .filter_map(|s| build_student_report(ctx, s, term))
        .collect();
    ranking::rank(reports)
        .into_iter()
        .map(|r| MeritListEntry {
            merit_rank: r.rank,
            report: r.item,
        })
        .collect()
}

/// One row per ranked student in the class, one cell per active subject.
pub fn broadsheet(
    ctx: &CalcContext<'_>,
    term: &Term,
    class_id: &str,
) -> Vec<ClassTermBroadsheetEntry> {
    let summaries: Vec<StudentTermSummary<'_>> = ctx
        .snapshot
        .students
        .iter()
        .filter(|s| s.class_id == class_id)
        .map(|s| summarize_student(ctx, s, term))
        .collect();

    ranking::rank(summaries)
        .into_iter()
        .map(|r| {
            let s = r.item;
            let subject_scores = ctx
                .snapshot
                .active_subjects()
                .map(|sub| BroadsheetCell {
                    subject_id: sub.id.clone(),
                    score: s.score_for(&sub.id).unwrap_or(ScoreOutcome::Unrecorded),
                })
                .collect();
            ClassTermBroadsheetEntry {
                student_id: s.student.id.clone(),
                admission_number: s.student.admission_number.clone(),
                student_name: s.student.name.clone(),
                class_id: s.student.class_id.clone(),
                stream: s.student.stream.clone(),
                subject_scores,
                total_weighted_marks: s.totals.total_weighted_marks,
                mean_weighted_score: s.totals.mean_weighted_score,
                mean_term_points: s.totals.mean_term_points,
                overall_term_grade: s.totals.overall_term_grade,
                rank: r.rank,
            }
        })
        .collect()
}

struct SubjectScoreRow<'a> {
    student: &'a Student,
    score: ScoreOutcome,
}

impl Rankable for SubjectScoreRow<'_> {
    // Sentinels rank below every real score, malpractice below absent.
    fn rank_key(&self) -> Option<RankKey<'_>> {
        let points = match self.score {
            ScoreOutcome::Numeric(v) => f64::from(v),
            ScoreOutcome::Absent => -1.0,
            ScoreOutcome::Malpractice => -2.0,
            ScoreOutcome::Unrecorded => return None,
        };
        Some(RankKey {
            points,
            total_marks: None,
            tiebreak: &self.student.name,
        })
    }
}

fn subject_analysis(
    ctx: &CalcContext<'_>,
    subject_id: &str,
    subject_name: &str,
    cohort: &[StudentTermSummary<'_>],
) -> SubjectClassAnalysis {
    let rows: Vec<SubjectScoreRow<'_>> = cohort
        .iter()
        .filter_map(|s| {
            s.score_for(subject_id)
                .filter(|score| score.is_entered())
                .map(|score| SubjectScoreRow {
                    student: s.student,
                    score,
                })
        })
        .collect();
    let student_count = rows.len();

    let numeric: Vec<f64> = rows
        .iter()
        .filter_map(|r| r.score.value().map(f64::from))
        .collect();
    if numeric.is_empty() {
        return SubjectClassAnalysis {
            subject_id: subject_id.to_string(),
            subject_name: subject_name.to_string(),
            mean_score: None,
            grade_distribution: ctx.scale.empty_distribution(),
            ranked_students: Vec::new(),
            student_count,
        };
    }
    let mean_score = numeric.iter().sum::<f64>() / numeric.len() as f64;

    let grades: Vec<String> = rows.iter().map(|r| ctx.scale.resolve(r.score).grade).collect();
    let grade_distribution = ctx.scale.tally(grades.iter().map(String::as_str));

    let ranked_students = ranking::rank(rows)
        .into_iter()
        .map(|r| SubjectRankEntry {
            student_id: r.item.student.id.clone(),
            student_name: r.item.student.name.clone(),
            admission_number: r.item.student.admission_number.clone(),
            score: r.item.score,
            grade: ctx.scale.resolve(r.item.score).grade,
            rank: r.rank,
        })
        .collect();

    SubjectClassAnalysis {
        subject_id: subject_id.to_string(),
        subject_name: subject_name.to_string(),
        mean_score: Some(mean_score),
        grade_distribution,
        ranked_students,
        student_count,
    }
}

/// Cohort statistics for a class (or the whole school) and optionally one
/// stream. `None` when nobody in the selection has mean points.
pub fn class_term_analysis(
    ctx: &CalcContext<'_>,
    term: &Term,
    class_id: Option<&str>,
    stream: Option<&str>,
) -> Option<ClassTermAnalysis> {
    let cohort: Vec<StudentTermSummary<'_>> = ctx
        .snapshot
        .students
        .iter()
        .filter(|s| in_class(s, class_id) && stream.map_or(true, |st| s.stream == st))
        .map(|s| summarize_student(ctx, s, term))
        .filter(|s| s.totals.mean_term_points.is_some())
        .collect();
    if cohort.is_empty() {
        return None;
    }
    let n = cohort.len() as f64;

    let overall_mean_points = cohort
        .iter()
        .filter_map(|s| s.totals.mean_term_points)
        .sum::<f64>()
        / n;
    let average_mean_score = cohort
        .iter()
        .map(|s| s.totals.mean_weighted_score.unwrap_or(0.0))
        .sum::<f64>()
        / n;
    let overall_mean_grade = ctx.scale.resolve_percent(average_mean_score).grade;
    let grade_distribution = ctx.scale.tally(
        cohort
            .iter()
            .filter_map(|s| s.totals.overall_term_grade.as_deref()),
    );

    let subject_analyses = ctx
        .snapshot
        .active_subjects()
        .map(|sub| subject_analysis(ctx, &sub.id, &sub.name, &cohort))
        .filter(|a| a.student_count > 0)
        .collect();

    let class = class_id.and_then(|id| ctx.snapshot.class(id));
    Some(ClassTermAnalysis {
        class_id: class_id.unwrap_or(ALL_CLASSES_ID).to_string(),
        class_name: class
            .map(|c| c.name.clone())
            .unwrap_or_else(|| WHOLE_SCHOOL_NAME.to_string()),
        stream: stream.map(str::to_string),
        term_id: term.id.clone(),
        term_name: term.name.clone(),
        year: term.year,
        overall_mean_points,
        overall_mean_grade,
        grade_distribution,
        total_students: cohort.len(),
        subject_analyses,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightTerm {
    pub name: String,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightGroup {
    pub name: String,
    pub stream: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightTotals {
    pub total_students: usize,
    pub overall_mean_points: String,
    pub overall_mean_grade: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightSubject {
    pub subject_name: String,
    pub mean_score: Option<String>,
    pub student_count: usize,
}

/// Input handed to the external summarizer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightSummary {
    pub term: InsightTerm,
    pub group: InsightGroup,
    pub summary: InsightTotals,
    pub overall_grade_distribution: Vec<GradeBucket>,
    pub subject_ranking: Vec<InsightSubject>,
}

pub fn insight_summary(analysis: &ClassTermAnalysis) -> InsightSummary {
    let mut subjects: Vec<&SubjectClassAnalysis> = analysis.subject_analyses.iter().collect();
    // Stable sort keeps catalogue order among equal means.
    subjects.sort_by(|a, b| {
        b.mean_score
            .unwrap_or(0.0)
            .partial_cmp(&a.mean_score.unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    InsightSummary {
        term: InsightTerm {
            name: analysis.term_name.clone(),
            year: analysis.year,
        },
        group: InsightGroup {
            name: analysis.class_name.clone(),
            stream: analysis.stream.clone().unwrap_or_else(|| "All".to_string()),
        },
        summary: InsightTotals {
            total_students: analysis.total_students,
            overall_mean_points: format!("{:.3}", round_off(analysis.overall_mean_points, 3)),
            overall_mean_grade: analysis.overall_mean_grade.clone(),
        },
        overall_grade_distribution: analysis.grade_distribution.clone(),
        subject_ranking: subjects
            .into_iter()
            .map(|s| InsightSubject {
                subject_name: s.subject_name.clone(),
                mean_score: s.mean_score.map(|m| format!("{:.2}", round_off(m, 2))),
                student_count: s.student_count,
            })
            .collect(),
    }
}
