use crate::calc::grading::{GradeThreshold, GradingScale};
use crate::model::{
    CalculationMode, ClassSubjectAssignment, ExamSession, Gender, Mark, SchoolClass, ScoreOutcome,
    Snapshot, StaffMember, StaffRole, Student, Subject, Term,
};
use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use tracing::warn;

pub const DB_FILE_NAME: &str = "examd.sqlite3";
pub const GRADING_SCALE_KEY: &str = "setup.grading";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("opening {}", db_path.display()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            subject_group INTEGER,
            active INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS terms(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            year INTEGER NOT NULL,
            calculation_mode TEXT NOT NULL,
            closing_date TEXT,
            opening_date TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_sessions(
            id TEXT PRIMARY KEY,
            term_id TEXT NOT NULL,
            name TEXT NOT NULL,
            weight INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(term_id) REFERENCES terms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exam_sessions_term ON exam_sessions(term_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            admission_number TEXT NOT NULL,
            name TEXT NOT NULL,
            class_id TEXT NOT NULL,
            stream TEXT NOT NULL,
            gender TEXT NOT NULL,
            current_fees_balance REAL NOT NULL DEFAULT 0,
            next_term_fees REAL NOT NULL DEFAULT 0,
            subjects_json TEXT,
            updated_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS staff(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            role TEXT NOT NULL,
            signature_image_url TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS staff_assignments(
            staff_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            subject_ids_json TEXT NOT NULL,
            PRIMARY KEY(staff_id, class_id),
            FOREIGN KEY(staff_id) REFERENCES staff(id),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            exam_session_id TEXT NOT NULL,
            status TEXT NOT NULL,
            raw_value INTEGER,
            updated_at TEXT,
            PRIMARY KEY(student_id, subject_id, exam_session_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(exam_session_id) REFERENCES exam_sessions(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_session ON marks(exam_session_id)",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("settings key {}", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// Stored grading scale, or the default one when nothing usable is stored.
pub fn load_grading_scale(conn: &Connection) -> anyhow::Result<GradingScale> {
    let Some(saved) = settings_get_json(conn, GRADING_SCALE_KEY)? else {
        return Ok(GradingScale::default());
    };
    let Some(raw_scale) = saved.get("scale") else {
        return Ok(GradingScale::default());
    };
    let parsed = serde_json::from_value::<Vec<GradeThreshold>>(raw_scale.clone())
        .map_err(|e| e.to_string())
        .and_then(|t| GradingScale::new(t).map_err(|e| e.message));
    match parsed {
        Ok(scale) => Ok(scale),
        Err(message) => {
            warn!(%message, "ignoring stored grading scale");
            Ok(GradingScale::default())
        }
    }
}

/// Mark storage: `status` is `scored`, `absent` or `malpractice`; only scored
/// rows carry a `raw_value`. Unrecorded marks have no row.
pub fn score_to_row(score: ScoreOutcome) -> Option<(&'static str, Option<i64>)> {
    match score {
        ScoreOutcome::Numeric(v) => Some(("scored", Some(i64::from(v)))),
        ScoreOutcome::Absent => Some(("absent", None)),
        ScoreOutcome::Malpractice => Some(("malpractice", None)),
        ScoreOutcome::Unrecorded => None,
    }
}

pub fn score_from_row(status: &str, raw_value: Option<i64>) -> anyhow::Result<ScoreOutcome> {
    match status {
        "scored" => raw_value
            .and_then(ScoreOutcome::numeric)
            .ok_or_else(|| anyhow!("scored mark has invalid value {:?}", raw_value)),
        "absent" => Ok(ScoreOutcome::Absent),
        "malpractice" => Ok(ScoreOutcome::Malpractice),
        other => Err(anyhow!("unknown mark status {}", other)),
    }
}

fn parse_date(raw: Option<String>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

fn parse_id_list(raw: &str) -> anyhow::Result<Vec<String>> {
    Ok(serde_json::from_str(raw)?)
}

/// Reads every table the scoring engine needs. Rows keep insertion order.
pub fn load_snapshot(conn: &Connection) -> anyhow::Result<Snapshot> {
    let classes = conn
        .prepare("SELECT id, name FROM classes ORDER BY rowid")?
        .query_map([], |r| {
            Ok(SchoolClass {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("loading classes")?;

    let subjects = conn
        .prepare("SELECT id, name, subject_group, active FROM subjects ORDER BY rowid")?
        .query_map([], |r| {
            Ok(Subject {
                id: r.get(0)?,
                name: r.get(1)?,
                group: r.get(2)?,
                active: r.get::<_, i64>(3)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("loading subjects")?;

    let term_rows: Vec<(String, String, i32, String, Option<String>, Option<String>)> = conn
        .prepare(
            "SELECT id, name, year, calculation_mode, closing_date, opening_date
             FROM terms ORDER BY rowid",
        )?
        .query_map([], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("loading terms")?;
    let mut terms = Vec::with_capacity(term_rows.len());
    for (id, name, year, mode, closing, opening) in term_rows {
        let calculation_mode = CalculationMode::parse(&mode)
            .ok_or_else(|| anyhow!("term {} has unknown calculation mode {}", id, mode))?;
        terms.push(Term {
            id,
            name,
            year,
            calculation_mode,
            closing_date: parse_date(closing),
            opening_date: parse_date(opening),
        });
    }

    let exam_sessions = conn
        .prepare(
            "SELECT id, term_id, name, weight FROM exam_sessions
             ORDER BY term_id, sort_order, rowid",
        )?
        .query_map([], |r| {
            Ok(ExamSession {
                id: r.get(0)?,
                term_id: r.get(1)?,
                name: r.get(2)?,
                weight: r.get::<_, i64>(3)?.clamp(0, 100) as u8,
            })
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("loading exam sessions")?;

    let students = load_students(conn, None)?;

    let staff_rows: Vec<(String, String, String, Option<String>)> = conn
        .prepare("SELECT id, name, role, signature_image_url FROM staff ORDER BY rowid")?
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))?
        .collect::<Result<Vec<_>, _>>()
        .context("loading staff")?;
    let mut assign_stmt = conn.prepare(
        "SELECT class_id, subject_ids_json FROM staff_assignments
         WHERE staff_id = ? ORDER BY rowid",
    )?;
    let mut staff = Vec::with_capacity(staff_rows.len());
    for (id, name, role, signature_image_url) in staff_rows {
        let role = StaffRole::parse(&role)
            .ok_or_else(|| anyhow!("staff {} has unknown role {}", id, role))?;
        let raw: Vec<(String, String)> = assign_stmt
            .query_map([&id], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut class_subject_assignments = Vec::with_capacity(raw.len());
        for (class_id, subject_ids_json) in raw {
            class_subject_assignments.push(ClassSubjectAssignment {
                class_id,
                subject_ids: parse_id_list(&subject_ids_json)
                    .with_context(|| format!("assignments of staff {}", id))?,
            });
        }
        staff.push(StaffMember {
            id,
            name,
            role,
            signature_image_url,
            class_subject_assignments,
        });
    }

    let mark_rows: Vec<(String, String, String, String, Option<i64>)> = conn
        .prepare(
            "SELECT student_id, subject_id, exam_session_id, status, raw_value
             FROM marks ORDER BY rowid",
        )?
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)))?
        .collect::<Result<Vec<_>, _>>()
        .context("loading marks")?;
    let mut marks = Vec::with_capacity(mark_rows.len());
    for (student_id, subject_id, exam_session_id, status, raw_value) in mark_rows {
        marks.push(Mark {
            score: score_from_row(&status, raw_value)?,
            student_id,
            subject_id,
            exam_session_id,
        });
    }

    Ok(Snapshot {
        classes,
        subjects,
        terms,
        exam_sessions,
        students,
        staff,
        marks,
    })
}

pub fn load_students(conn: &Connection, class_id: Option<&str>) -> anyhow::Result<Vec<Student>> {
    type Row = (
        String,
        String,
        String,
        String,
        String,
        String,
        f64,
        f64,
        Option<String>,
    );
    let mut stmt = conn.prepare(
        "SELECT id, admission_number, name, class_id, stream, gender,
                current_fees_balance, next_term_fees, subjects_json
         FROM students
         WHERE ?1 IS NULL OR class_id = ?1
         ORDER BY rowid",
    )?;
    let rows: Vec<Row> = stmt
        .query_map([class_id], |r| {
            Ok((
                r.get(0)?,
                r.get(1)?,
                r.get(2)?,
                r.get(3)?,
                r.get(4)?,
                r.get(5)?,
                r.get(6)?,
                r.get(7)?,
                r.get(8)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("loading students")?;

    let mut out = Vec::with_capacity(rows.len());
    for (id, admission_number, name, class_id, stream, gender, balance, next_fees, subjects) in rows
    {
        let gender = Gender::parse(&gender)
            .ok_or_else(|| anyhow!("student {} has unknown gender {}", id, gender))?;
        let subjects = match subjects {
            Some(raw) => Some(
                parse_id_list(&raw).with_context(|| format!("subjects of student {}", id))?,
            ),
            None => None,
        };
        out.push(Student {
            id,
            admission_number,
            name,
            class_id,
            stream,
            gender,
            current_fees_balance: balance,
            next_term_fees: next_fees,
            subjects,
        });
    }
    Ok(out)
}
