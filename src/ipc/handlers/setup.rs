use crate::calc::grading::{GradeThreshold, GradingScale};
use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{db_conn, query_err, required_str, update_err};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

#[derive(Clone, Copy)]
enum SetupSection {
    School,
    Grading,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "school" => Some(Self::School),
            "grading" => Some(Self::Grading),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::School => "setup.school",
            Self::Grading => db::GRADING_SCALE_KEY,
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::School => json!({
            "name": "",
            "address": "",
            "motto": null
        }),
        SetupSection::Grading => json!({
            "scale": GradingScale::default().thresholds()
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.chars().count() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn parse_nullable_string_max(v: &Value, key: &str, max_len: usize) -> Result<Value, String> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    let s = parse_string_max(v, key, max_len)?;
    Ok(Value::String(s))
}

fn parse_scale(v: &Value) -> Result<GradingScale, String> {
    let thresholds: Vec<GradeThreshold> = serde_json::from_value(v.clone())
        .map_err(|e| format!("scale must be a list of {{min, grade, points}}: {}", e))?;
    GradingScale::new(thresholds).map_err(|e| e.message)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::School => match k.as_str() {
                "name" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 120)?));
                }
                "address" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 200)?));
                }
                "motto" => {
                    obj.insert(k.clone(), parse_nullable_string_max(v, k, 120)?);
                }
                _ => return Err(format!("unknown school field: {}", k)),
            },
            SetupSection::Grading => match k.as_str() {
                "scale" => {
                    let scale = parse_scale(v)?;
                    obj.insert(k.clone(), json!(scale.thresholds()));
                }
                _ => return Err(format!("unknown grading field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            let mut merged = current.clone();
            match merge_section_patch(section, &mut merged, saved_obj) {
                Ok(()) => current = merged,
                Err(msg) => warn!(key = section.key(), error = %msg, "ignoring stored settings"),
            }
        }
    }
    Ok(current)
}

/// School block printed on every report.
pub fn load_school(conn: &rusqlite::Connection) -> anyhow::Result<Value> {
    load_section(conn, SetupSection::School)
}

fn setup_get(state: &AppState) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let school = load_section(conn, SetupSection::School).map_err(query_err)?;
    let grading = load_section(conn, SetupSection::Grading).map_err(query_err)?;
    Ok(json!({ "school": school, "grading": grading }))
}

fn setup_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let section_raw = required_str(&req.params, "section")?;
    let section = SetupSection::parse(&section_raw).ok_or_else(|| {
        HandlerErr::new("bad_params", "unknown section")
            .with_details(json!({ "section": section_raw }))
    })?;
    let patch = req
        .params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::new("bad_params", "patch must be an object"))?;

    let conn = db_conn(state)?;
    let mut current = load_section(conn, section).map_err(query_err)?;
    merge_section_patch(section, &mut current, patch).map_err(|msg| {
        HandlerErr::new("bad_params", msg).with_details(json!({ "section": section_raw }))
    })?;
    db::settings_set_json(conn, section.key(), &current).map_err(update_err)?;

    info!(section = %section_raw, "setup updated");
    state.invalidate();
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let resp = match req.method.as_str() {
        "setup.get" => setup_get(state),
        "setup.update" => setup_update(state, req),
        _ => return None,
    };
    Some(match resp {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
