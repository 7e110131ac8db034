use super::{round_half_up, CalcError};
use crate::model::ScoreOutcome;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;

pub const ABSENT_GRADE: &str = "X";
pub const MALPRACTICE_GRADE: &str = "Y";
pub const UNGRADED: &str = "-";
pub const MAX_POINTS: u8 = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeThreshold {
    pub min: u8,
    pub grade: String,
    pub points: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradePoint {
    pub grade: String,
    pub points: u8,
    pub remarks: String,
}

impl GradePoint {
    fn fixed(grade: &str, remarks: &str) -> Self {
        Self {
            grade: grade.to_string(),
            points: 0,
            remarks: remarks.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBucket {
    pub grade: String,
    pub count: usize,
}

/// Ordered grade thresholds. First match wins, so construction enforces a
/// strictly descending `min` ending in a catch-all `min = 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GradingScale {
    thresholds: Vec<GradeThreshold>,
}

fn threshold(min: u8, grade: &str, points: u8) -> GradeThreshold {
    GradeThreshold {
        min,
        grade: grade.to_string(),
        points,
    }
}

impl Default for GradingScale {
    fn default() -> Self {
        Self {
            thresholds: vec![
                threshold(80, "A", 12),
                threshold(75, "A-", 11),
                threshold(70, "B+", 10),
                threshold(65, "B", 9),
                threshold(60, "B-", 8),
                threshold(55, "C+", 7),
                threshold(50, "C", 6),
                threshold(45, "C-", 5),
                threshold(40, "D+", 4),
                threshold(35, "D", 3),
                threshold(30, "D-", 2),
                threshold(0, "E", 1),
            ],
        }
    }
}

impl GradingScale {
    pub fn new(thresholds: Vec<GradeThreshold>) -> Result<Self, CalcError> {
        if thresholds.is_empty() {
            return Err(CalcError::new("bad_grading_scale", "grading scale is empty"));
        }
        let mut seen = HashSet::new();
        for (i, t) in thresholds.iter().enumerate() {
            let grade = t.grade.trim();
            if grade.is_empty() {
                return Err(CalcError::new("bad_grading_scale", "grade labels must not be empty")
                    .with_details(json!({ "index": i })));
            }
            if grade == ABSENT_GRADE || grade == MALPRACTICE_GRADE || grade == UNGRADED {
                return Err(CalcError::new(
                    "bad_grading_scale",
                    format!("grade label {} is reserved", grade),
                ));
            }
            if !seen.insert(grade.to_string()) {
                return Err(CalcError::new(
                    "bad_grading_scale",
                    format!("grade {} appears more than once", grade),
                ));
            }
            if t.min > 100 {
                return Err(CalcError::new("bad_grading_scale", "minimum scores must be <= 100")
                    .with_details(json!({ "index": i, "min": t.min })));
            }
            if t.points > MAX_POINTS {
                return Err(CalcError::new(
                    "bad_grading_scale",
                    format!("points must be <= {}", MAX_POINTS),
                )
                .with_details(json!({ "index": i, "points": t.points })));
            }
            if i > 0 && t.min >= thresholds[i - 1].min {
                return Err(CalcError::new(
                    "bad_grading_scale",
                    "thresholds must be strictly descending by min",
                )
                .with_details(json!({ "index": i, "min": t.min })));
            }
        }
        if thresholds.last().map(|t| t.min) != Some(0) {
            return Err(CalcError::new(
                "bad_grading_scale",
                "the last threshold must have min 0",
            ));
        }
        Ok(Self {
            thresholds: thresholds
                .into_iter()
                .map(|t| GradeThreshold {
                    grade: t.grade.trim().to_string(),
                    ..t
                })
                .collect(),
        })
    }

    pub fn thresholds(&self) -> &[GradeThreshold] {
        &self.thresholds
    }

    pub fn resolve(&self, score: ScoreOutcome) -> GradePoint {
        let value = match score {
            ScoreOutcome::Absent => return GradePoint::fixed(ABSENT_GRADE, "Absent"),
            ScoreOutcome::Malpractice => return GradePoint::fixed(MALPRACTICE_GRADE, "Malpractice"),
            ScoreOutcome::Unrecorded => return GradePoint::fixed(UNGRADED, "N/A"),
            ScoreOutcome::Numeric(v) if v > 100 => return GradePoint::fixed(UNGRADED, "N/A"),
            ScoreOutcome::Numeric(v) => v,
        };
        match self.thresholds.iter().find(|t| value >= t.min) {
            Some(t) => GradePoint {
                grade: t.grade.clone(),
                points: t.points,
                remarks: remarks_for_points(t.points).to_string(),
            },
            // Unreachable for a constructed scale: the last entry has min 0.
            None => GradePoint::fixed(UNGRADED, "N/A"),
        }
    }

    /// Grade for an unrounded percentage such as a mean score.
    pub fn resolve_percent(&self, percent: f64) -> GradePoint {
        let rounded = round_half_up(percent);
        if !(0.0..=100.0).contains(&rounded) {
            return GradePoint::fixed(UNGRADED, "N/A");
        }
        self.resolve(ScoreOutcome::Numeric(rounded as u8))
    }

    /// One bucket per scale grade, highest first, all zero.
    pub fn empty_distribution(&self) -> Vec<GradeBucket> {
        self.thresholds
            .iter()
            .map(|t| GradeBucket {
                grade: t.grade.clone(),
                count: 0,
            })
            .collect()
    }

    /// Counts grades into the scale's buckets; pseudo-grades are ignored.
    pub fn tally<'g, I>(&self, grades: I) -> Vec<GradeBucket>
    where
        I: IntoIterator<Item = &'g str>,
    {
        let mut buckets = self.empty_distribution();
        for g in grades {
            if let Some(b) = buckets.iter_mut().find(|b| b.grade == g) {
                b.count += 1;
            }
        }
        buckets
    }
}

pub fn remarks_for_points(points: u8) -> &'static str {
    match points {
        p if p >= 10 => "Excellent",
        p if p >= 8 => "Very Good",
        p if p >= 7 => "Good",
        p if p >= 5 => "Fair",
        _ => "Needs Improvement",
    }
}
