//! Scoring and ranking engine.
//!
//! Every function here is a pure computation over a [`Snapshot`]; absence of
//! data shows up as `None` or [`ScoreOutcome::Unrecorded`], never as an error.

pub mod aggregate;
pub mod cohort;
pub mod compare;
pub mod grading;
pub mod ranking;
pub mod report;

use crate::model::{ScoreOutcome, Snapshot};
use grading::GradingScale;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Rounds half away from zero for the non-negative values the engine produces,
/// matching how marks are rounded on printed report forms.
pub fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

pub fn round_off(x: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    ((x * factor) + 0.5).floor() / factor
}

/// Snapshot plus the lookups every builder needs.
pub struct CalcContext<'a> {
    pub snapshot: &'a Snapshot,
    pub scale: &'a GradingScale,
    marks: HashMap<(&'a str, &'a str, &'a str), ScoreOutcome>,
}

impl<'a> CalcContext<'a> {
    pub fn new(snapshot: &'a Snapshot, scale: &'a GradingScale) -> Self {
        let mut marks = HashMap::with_capacity(snapshot.marks.len());
        for m in &snapshot.marks {
            marks.insert(
                (
                    m.student_id.as_str(),
                    m.subject_id.as_str(),
                    m.exam_session_id.as_str(),
                ),
                m.score,
            );
        }
        Self {
            snapshot,
            scale,
            marks,
        }
    }

    pub fn mark(&self, student_id: &str, subject_id: &str, exam_session_id: &str) -> ScoreOutcome {
        self.marks
            .get(&(student_id, subject_id, exam_session_id))
            .copied()
            .unwrap_or(ScoreOutcome::Unrecorded)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::model::*;

    pub fn subject(id: &str) -> Subject {
        Subject {
            id: id.to_string(),
            name: id.to_string(),
            group: Some(1),
            active: true,
        }
    }

    pub fn term(id: &str, name: &str, year: i32, mode: CalculationMode) -> Term {
        Term {
            id: id.to_string(),
            name: name.to_string(),
            year,
            calculation_mode: mode,
            closing_date: None,
            opening_date: None,
        }
    }

    pub fn session(id: &str, term_id: &str, weight: u8) -> ExamSession {
        ExamSession {
            id: id.to_string(),
            term_id: term_id.to_string(),
            name: id.to_uppercase(),
            weight,
        }
    }

    pub fn student(id: &str, name: &str, class_id: &str, stream: &str) -> Student {
        Student {
            id: id.to_string(),
            admission_number: format!("ADM-{}", id),
            name: name.to_string(),
            class_id: class_id.to_string(),
            stream: stream.to_string(),
            gender: Gender::Female,
            current_fees_balance: 0.0,
            next_term_fees: 0.0,
            subjects: None,
        }
    }

    pub fn mark(student: &str, subject: &str, session: &str, score: ScoreOutcome) -> Mark {
        Mark {
            student_id: student.to_string(),
            subject_id: subject.to_string(),
            exam_session_id: session.to_string(),
            score,
        }
    }

    /// Form 1 with two streams, one weighted term (CAT 30 / END 70) and one
    /// simple-average term, subjects ENG and MAT.
    pub fn school() -> Snapshot {
        Snapshot {
            classes: vec![SchoolClass {
                id: "F1".into(),
                name: "Form 1".into(),
            }],
            subjects: vec![subject("ENG"), subject("MAT")],
            terms: vec![
                term("T1", "Term 1", 2025, CalculationMode::WeightedAverage),
                term("T2", "Term 2", 2025, CalculationMode::SimpleAverage),
            ],
            exam_sessions: vec![
                session("cat", "T1", 30),
                session("end", "T1", 70),
                session("mid2", "T2", 50),
                session("end2", "T2", 50),
            ],
            students: vec![],
            staff: vec![],
            marks: vec![],
        }
    }
}
