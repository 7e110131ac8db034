use super::{round_half_up, CalcContext};
use crate::model::{CalculationMode, ExamSession, ScoreOutcome};

/// One exam session's contribution to a subject's term score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionScore {
    pub score: ScoreOutcome,
    pub weight: u8,
}

pub fn session_scores(
    ctx: &CalcContext<'_>,
    student_id: &str,
    subject_id: &str,
    sessions: &[&ExamSession],
) -> Vec<SessionScore> {
    sessions
        .iter()
        .map(|s| SessionScore {
            score: ctx.mark(student_id, subject_id, &s.id),
            weight: s.weight,
        })
        .collect()
}

/// Combines a subject's session scores into one term score.
///
/// Sessions that are unrecorded or sentinel are dropped from both the sum and
/// the weight total, so a missing component renormalises the rest instead of
/// counting as zero. A subject with only sentinel entries reports Malpractice
/// when any session was malpractice, otherwise Absent.
pub fn aggregate_subject_score(mode: CalculationMode, components: &[SessionScore]) -> ScoreOutcome {
    let entered: Vec<&SessionScore> = components.iter().filter(|c| c.score.is_entered()).collect();
    if entered.is_empty() {
        return ScoreOutcome::Unrecorded;
    }
    if entered.iter().all(|c| c.score.is_sentinel()) {
        return if entered.iter().any(|c| c.score == ScoreOutcome::Malpractice) {
            ScoreOutcome::Malpractice
        } else {
            ScoreOutcome::Absent
        };
    }

    let valid = entered
        .iter()
        .filter_map(|c| c.score.value().map(|v| (f64::from(v), f64::from(c.weight))));
    let combined = match mode {
        CalculationMode::SimpleAverage => {
            let (sum, n) = valid.fold((0.0_f64, 0_usize), |(sum, n), (v, _)| (sum + v, n + 1));
            if n > 0 {
                Some(sum / n as f64)
            } else {
                None
            }
        }
        CalculationMode::WeightedAverage => {
            let (sum, denom) = valid.fold((0.0_f64, 0.0_f64), |(sum, denom), (v, w)| {
                (sum + v * w, denom + w)
            });
            if denom > 0.0 {
                Some(sum / denom)
            } else {
                None
            }
        }
    };

    match combined {
        Some(v) => ScoreOutcome::Numeric(round_half_up(v).clamp(0.0, 100.0) as u8),
        None => ScoreOutcome::Unrecorded,
    }
}
