//! Raw classifier label → friendly class name.

use std::collections::BTreeMap;

/// Built-in names for the binary dementia task.
const DEFAULT_NAMES: [(&str, &str); 4] = [("0", "CN"), ("1", "AD"), ("CN", "CN"), ("AD", "AD")];

/// Default raw → friendly map, the base that per-model overrides extend.
pub fn default_class_name_map() -> BTreeMap<String, String> {
    DEFAULT_NAMES
        .iter()
        .map(|&(raw, name)| (raw.to_string(), name.to_string()))
        .collect()
}

/// Exactly two declared classes, each one the built-in map knows.
pub fn looks_binary(classes: &[String]) -> bool {
    classes.len() == 2
        && classes
            .iter()
            .all(|c| DEFAULT_NAMES.iter().any(|&(raw, _)| raw == c))
}

/// Friendly name for `raw`: the override map first, then the built-in names when the
/// declared classes look binary, otherwise `raw` itself.
pub fn friendly_name(raw: &str, overrides: Option<&BTreeMap<String, String>>, declared: &[String]) -> String {
    if let Some(name) = overrides.and_then(|map| map.get(raw)) {
        return name.clone();
    }
    if looks_binary(declared) {
        if let Some(&(_, name)) = DEFAULT_NAMES.iter().find(|&&(r, _)| r == raw) {
            return name.to_string();
        }
    }
    raw.to_string()
}
