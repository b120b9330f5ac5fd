//! Upgrade legacy model records before typed deserialisation.
//!
//! Older exporters wrote device and encoder settings that no longer mean anything
//! for CPU inference, and sometimes omitted fields newer readers require. Every
//! such fix lives here and runs exactly once per artifact load.

use serde_json::{Map, Value};

/// Fields from older exporters that are dropped outright.
const OBSOLETE_FIELDS: [&str; 3] = ["use_label_encoder", "gpu_id", "predictor"];

const DEFAULT_BASE_SCORE: f64 = 0.5;

/// One applied fix, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompatFix {
    DroppedField(&'static str),
    CpuTreeMethod,
    DefaultBaseScore,
    DefaultClasses,
    StringifiedClasses,
}

/// Bring a raw model record up to the current layout in place.
///
/// `fallback_classes` fills a missing `classes` list.
pub fn upgrade_model_record(record: &mut Map<String, Value>, fallback_classes: &[String]) -> Vec<CompatFix> {
    let mut fixes = Vec::new();

    for field in OBSOLETE_FIELDS {
        if record.remove(field).is_some() {
            fixes.push(CompatFix::DroppedField(field));
        }
    }

    if record.get("tree_method").and_then(Value::as_str) == Some("gpu_hist") {
        record.insert("tree_method".into(), Value::from("hist"));
        fixes.push(CompatFix::CpuTreeMethod);
    }

    let is_trees = record.get("kind").and_then(Value::as_str) == Some("gradient_boosted_trees");
    if is_trees && record.get("base_score").map_or(true, Value::is_null) {
        record.insert("base_score".into(), Value::from(DEFAULT_BASE_SCORE));
        fixes.push(CompatFix::DefaultBaseScore);
    }

    match record.get_mut("classes") {
        None | Some(Value::Null) => {
            let classes = fallback_classes.iter().cloned().map(Value::from).collect();
            record.insert("classes".into(), Value::Array(classes));
            fixes.push(CompatFix::DefaultClasses);
        }
        Some(Value::Array(classes)) => {
            let mut changed = false;
            for class in classes.iter_mut() {
                if !class.is_string() {
                    *class = Value::from(label_text(class));
                    changed = true;
                }
            }
            if changed {
                fixes.push(CompatFix::StringifiedClasses);
            }
        }
        Some(_) => {}
    }

    if !fixes.is_empty() {
        tracing::debug!(?fixes, "upgraded legacy model record");
    }
    fixes
}

/// Text form of a JSON label: strings verbatim, anything else as JSON text.
pub(crate) fn label_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
