use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One entered (or not yet entered) exam score.
///
/// On the wire a score is an integer `0..=100`, `"X"` for absent, `"Y"` for
/// malpractice, or `null` when nothing has been entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreOutcome {
    Numeric(u8),
    Absent,
    Malpractice,
    Unrecorded,
}

impl ScoreOutcome {
    pub const ABSENT_CODE: &'static str = "X";
    pub const MALPRACTICE_CODE: &'static str = "Y";

    pub fn numeric(value: i64) -> Option<Self> {
        if (0..=100).contains(&value) {
            Some(Self::Numeric(value as u8))
        } else {
            None
        }
    }

    pub fn value(self) -> Option<u8> {
        match self {
            Self::Numeric(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_entered(self) -> bool {
        !matches!(self, Self::Unrecorded)
    }

    pub fn is_sentinel(self) -> bool {
        matches!(self, Self::Absent | Self::Malpractice)
    }

    pub fn from_json(raw: &serde_json::Value) -> Result<Self, String> {
        match raw {
            serde_json::Value::Null => Ok(Self::Unrecorded),
            serde_json::Value::String(s) => {
                let code = s.trim();
                if code.eq_ignore_ascii_case(Self::ABSENT_CODE) {
                    Ok(Self::Absent)
                } else if code.eq_ignore_ascii_case(Self::MALPRACTICE_CODE) {
                    Ok(Self::Malpractice)
                } else {
                    Err(format!("unknown score code: {}", code))
                }
            }
            serde_json::Value::Number(n) => {
                let whole = n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64));
                let Some(v) = whole else {
                    return Err("scores must be whole numbers".to_string());
                };
                Self::numeric(v).ok_or_else(|| format!("score {} is outside 0..=100", v))
            }
            _ => Err("score must be a number, \"X\", \"Y\" or null".to_string()),
        }
    }
}

impl Serialize for ScoreOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Numeric(v) => serializer.serialize_u8(*v),
            Self::Absent => serializer.serialize_str(Self::ABSENT_CODE),
            Self::Malpractice => serializer.serialize_str(Self::MALPRACTICE_CODE),
            Self::Unrecorded => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for ScoreOutcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Self::from_json(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub group: Option<i64>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolClass {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalculationMode {
    WeightedAverage,
    SimpleAverage,
}

impl CalculationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WeightedAverage => "WEIGHTED_AVERAGE",
            Self::SimpleAverage => "SIMPLE_AVERAGE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WEIGHTED_AVERAGE" => Some(Self::WeightedAverage),
            "SIMPLE_AVERAGE" => Some(Self::SimpleAverage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    pub id: String,
    pub name: String,
    pub year: i32,
    pub calculation_mode: CalculationMode,
    pub closing_date: Option<NaiveDate>,
    pub opening_date: Option<NaiveDate>,
}

impl Term {
    /// Trailing number of the term name, e.g. 2 for "Term 2".
    pub fn sequence(&self) -> Option<u32> {
        self.name
            .split_whitespace()
            .last()
            .and_then(|tok| tok.parse::<u32>().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSession {
    pub id: String,
    pub term_id: String,
    pub name: String,
    pub weight: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Some(Self::Male),
            "female" | "f" => Some(Self::Female),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub admission_number: String,
    pub name: String,
    pub class_id: String,
    pub stream: String,
    pub gender: Gender,
    pub current_fees_balance: f64,
    pub next_term_fees: f64,
    /// Explicit subject subset; `None` means every active subject.
    pub subjects: Option<Vec<String>>,
}

impl Student {
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StaffRole {
    Admin,
    Teacher,
}

impl StaffRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Teacher => "TEACHER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Self::Admin),
            "TEACHER" => Some(Self::Teacher),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSubjectAssignment {
    pub class_id: String,
    pub subject_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffMember {
    pub id: String,
    pub name: String,
    pub role: StaffRole,
    pub signature_image_url: Option<String>,
    pub class_subject_assignments: Vec<ClassSubjectAssignment>,
}

impl StaffMember {
    pub fn teaches(&self, class_id: &str, subject_id: &str) -> bool {
        self.role == StaffRole::Teacher
            && self
                .class_subject_assignments
                .iter()
                .any(|a| a.class_id == class_id && a.subject_ids.iter().any(|s| s == subject_id))
    }

    pub fn assigned_to_class(&self, class_id: &str) -> bool {
        self.role == StaffRole::Teacher
            && self
                .class_subject_assignments
                .iter()
                .any(|a| a.class_id == class_id)
    }

    /// "Jane Wanjiru Doe" -> "JD"; a single name keeps its first two letters.
    pub fn initials(&self) -> String {
        let parts: Vec<&str> = self.name.split_whitespace().collect();
        match parts.as_slice() {
            [] => String::new(),
            [only] => only.chars().take(2).collect::<String>().to_uppercase(),
            [first, .., last] => {
                let mut out = String::new();
                out.extend(first.chars().next());
                out.extend(last.chars().next());
                out.to_uppercase()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mark {
    pub student_id: String,
    pub subject_id: String,
    pub exam_session_id: String,
    pub score: ScoreOutcome,
}

/// Everything the scoring engine reads, loaded once per request batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub classes: Vec<SchoolClass>,
    pub subjects: Vec<Subject>,
    pub terms: Vec<Term>,
    pub exam_sessions: Vec<ExamSession>,
    pub students: Vec<Student>,
    pub staff: Vec<StaffMember>,
    pub marks: Vec<Mark>,
}

impl Snapshot {
    pub fn class(&self, id: &str) -> Option<&SchoolClass> {
        self.classes.iter().find(|c| c.id == id)
    }

    pub fn term(&self, id: &str) -> Option<&Term> {
        self.terms.iter().find(|t| t.id == id)
    }

    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    pub fn active_subjects(&self) -> impl Iterator<Item = &Subject> {
        self.subjects.iter().filter(|s| s.active)
    }

    pub fn sessions_for_term<'a>(
        &'a self,
        term_id: &'a str,
    ) -> impl Iterator<Item = &'a ExamSession> {
        self.exam_sessions.iter().filter(move |s| s.term_id == term_id)
    }
}
