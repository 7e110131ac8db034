#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tempfile::TempDir;

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
    pub workspace: TempDir,
}

impl Sidecar {
    /// Spawns examd without selecting a workspace.
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_examd");
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn examd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
            workspace: tempfile::tempdir().expect("temp workspace"),
        }
    }

    /// Spawns examd with a fresh temp workspace selected.
    pub fn start() -> Self {
        let mut s = Self::spawn();
        let path = s.workspace.path().to_string_lossy().to_string();
        s.request_ok("workspace.select", json!({ "path": path }));
        s
    }

    pub fn send_raw(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        let value = self.send_raw(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn request_ok(&mut self, method: &str, params: Value) -> Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or(Value::Null)
    }

    /// Returns the error object of a failed request.
    pub fn request_err(&mut self, method: &str, params: Value) -> Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value.get("error").cloned().unwrap_or(Value::Null)
    }

    pub fn set_marks(&mut self, edits: Value) -> Value {
        self.request_ok("marks.bulkSet", json!({ "edits": edits }))
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn mark(student: &str, subject: &str, session: &str, value: Value) -> Value {
    json!({
        "studentId": student,
        "subjectId": subject,
        "examSessionId": session,
        "value": value
    })
}

pub fn add_student(s: &mut Sidecar, id: &str, name: &str, class_id: &str, stream: &str) {
    s.request_ok(
        "students.upsert",
        json!({
            "id": id,
            "admissionNumber": format!("ADM-{}", id),
            "name": name,
            "classId": class_id,
            "stream": stream,
            "gender": "Female"
        }),
    );
}

/// Form 1 (F1) and Form 2 (F2); subjects ENG and MAT; term T1 (2025, weighted,
/// CAT 30 / END 70) and term T2 (2025, simple average, MID2 / END2).
pub fn seed_school(s: &mut Sidecar) {
    s.request_ok("classes.upsert", json!({ "id": "F1", "name": "Form 1" }));
    s.request_ok("classes.upsert", json!({ "id": "F2", "name": "Form 2" }));
    s.request_ok("subjects.upsert", json!({ "id": "ENG", "name": "English", "group": 1 }));
    s.request_ok("subjects.upsert", json!({ "id": "MAT", "name": "Mathematics", "group": 2 }));
    s.request_ok(
        "terms.upsert",
        json!({
            "id": "T1",
            "name": "Term 1",
            "year": 2025,
            "calculationMode": "WEIGHTED_AVERAGE",
            "closingDate": "2025-04-04",
            "openingDate": "2025-04-28",
            "sessions": [
                { "id": "CAT", "name": "CAT", "weight": 30 },
                { "id": "END", "name": "End Term", "weight": 70 }
            ]
        }),
    );
    s.request_ok(
        "terms.upsert",
        json!({
            "id": "T2",
            "name": "Term 2",
            "year": 2025,
            "calculationMode": "SIMPLE_AVERAGE",
            "sessions": [
                { "id": "MID2", "name": "Mid Term", "weight": 50 },
                { "id": "END2", "name": "End Term", "weight": 50 }
            ]
        }),
    );
}
