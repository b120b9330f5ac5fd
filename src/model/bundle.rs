//! Classifier bundles: a model plus its declared columns and classes.
//!
//! Artifacts arrive in one of three layouts:
//!
//! * a bare model record (`{"kind": ..., ...}`)
//! * a wrapper object holding the model under one of [`WRAPPER_KEYS`] next to
//!   `x_cols`, `classes`, `class_name_map` and `scaler`
//! * a two-element array `[model, meta]`
//!
//! The layout is resolved once in [`ClassifierBundle::from_value`]; nothing
//! downstream looks at it again.

use super::compat::{label_text, upgrade_model_record};
use super::{Classifier, ModelRecord, StandardScaler};
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Keys a wrapper object may store its model under, in lookup order.
pub const WRAPPER_KEYS: [&str; 6] = ["model", "estimator", "clf", "pipeline", "sk_model", "sk_estimator"];

/// Column count assumed for bare brain models.
pub const DEFAULT_FEATURE_COUNT: usize = 138;

/// Side files next to an artifact that override its declared fields.
const X_COLS_FILE: &str = "x_cols.json";
const LABEL_MAP_FILE: &str = "label_map.json";
const SCALER_FILE: &str = "scaler.json";

/// `vol_1` .. `vol_138`.
pub fn default_feature_columns() -> Vec<String> {
    (1..=DEFAULT_FEATURE_COUNT).map(|i| format!("vol_{i}")).collect()
}

pub fn default_classes() -> Vec<String> {
    vec!["CN".to_string(), "AD".to_string()]
}

/// Layout an artifact was stored in.
#[derive(Debug)]
enum ArtifactShape {
    Bare(Map<String, Value>),
    Wrapped {
        model: Map<String, Value>,
        meta: Map<String, Value>,
    },
    Paired {
        model: Map<String, Value>,
        meta: Option<Map<String, Value>>,
    },
}

/// A JSON object that describes a model (has a string `kind`).
fn is_model_record(value: &Value) -> bool {
    value.get("kind").is_some_and(Value::is_string)
}

fn into_model_record(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) if map.get("kind").is_some_and(Value::is_string) => Some(map),
        _ => None,
    }
}

impl ArtifactShape {
    fn resolve(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) if map.get("kind").is_some_and(Value::is_string) => Ok(Self::Bare(map)),
            Value::Object(mut meta) => {
                let key = WRAPPER_KEYS
                    .into_iter()
                    .find(|key| meta.get(*key).is_some_and(is_model_record))
                    .ok_or_else(|| {
                        Error::Artifact(format!("no model found under any of {WRAPPER_KEYS:?}"))
                    })?;
                let model = meta.remove(key).and_then(into_model_record);
                model
                    .map(|model| Self::Wrapped { model, meta })
                    .ok_or_else(|| Error::Artifact(format!("model under {key:?} is not an object")))
            }
            Value::Array(items) if !items.is_empty() => {
                let mut items = items.into_iter();
                let model = items.next().and_then(into_model_record);
                let meta = match items.next() {
                    Some(Value::Object(meta)) => Some(meta),
                    _ => None,
                };
                model
                    .map(|model| Self::Paired { model, meta })
                    .ok_or_else(|| Error::Artifact("first array element is not a model".into()))
            }
            _ => Err(Error::Artifact(
                "expected a model object, a wrapper object or a [model, meta] array".into(),
            )),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Bare(_) => "bare",
            Self::Wrapped { .. } => "wrapped",
            Self::Paired { .. } => "paired",
        }
    }

    fn into_parts(self) -> (Map<String, Value>, Option<Map<String, Value>>) {
        match self {
            Self::Bare(model) => (model, None),
            Self::Wrapped { model, meta } => (model, Some(meta)),
            Self::Paired { model, meta } => (model, meta),
        }
    }
}

/// Bundle-level fields carried next to the model.
#[derive(Debug, Default, Deserialize)]
struct BundleMeta {
    #[serde(default)]
    x_cols: Option<Vec<Value>>,
    #[serde(default)]
    classes: Option<Vec<Value>>,
    #[serde(default)]
    class_name_map: Option<BTreeMap<String, String>>,
    #[serde(default)]
    scaler: Option<StandardScaler>,
}

#[derive(Debug, Deserialize)]
struct LabelMapFile {
    classes: Vec<Value>,
}

fn texts(values: &[Value]) -> Vec<String> {
    values.iter().map(label_text).collect()
}

/// A loaded classifier and everything needed to feed and read it.
#[derive(Debug)]
pub struct ClassifierBundle {
    model: Box<dyn Classifier>,
    x_cols: Vec<String>,
    classes: Vec<String>,
    class_name_map: BTreeMap<String, String>,
    scaler: Option<StandardScaler>,
}

impl ClassifierBundle {
    /// Bundle an already-built model. `classes` must not be empty.
    pub fn new(model: Box<dyn Classifier>, x_cols: Vec<String>, classes: Vec<String>) -> Result<Self> {
        let bundle = Self {
            model,
            x_cols,
            classes,
            class_name_map: BTreeMap::new(),
            scaler: None,
        };
        bundle.validate()?;
        Ok(bundle)
    }

    pub fn with_class_name_map(mut self, map: BTreeMap<String, String>) -> Self {
        self.class_name_map = map;
        self
    }

    pub fn with_scaler(mut self, scaler: StandardScaler) -> Result<Self> {
        self.scaler = Some(scaler);
        self.validate()?;
        Ok(self)
    }

    /// Resolve any supported artifact layout into a bundle.
    pub fn from_value(value: Value) -> Result<Self> {
        let shape = ArtifactShape::resolve(value)?;
        let layout = shape.name();
        let (mut record, meta) = shape.into_parts();

        let meta: BundleMeta = match meta {
            Some(meta) => serde_json::from_value(Value::Object(meta))?,
            None => BundleMeta::default(),
        };
        let x_cols = meta.x_cols.as_deref().map_or_else(default_feature_columns, texts);
        let classes = meta.classes.as_deref().map_or_else(default_classes, texts);

        upgrade_model_record(&mut record, &classes);
        let parsed: ModelRecord = serde_json::from_value(Value::Object(record))?;
        let model = parsed.build()?;

        let bundle = Self {
            model,
            x_cols,
            classes,
            class_name_map: meta.class_name_map.unwrap_or_default(),
            scaler: meta.scaler.map(StandardScaler::validated).transpose()?,
        };
        bundle.validate()?;
        tracing::debug!(
            layout,
            columns = bundle.x_cols.len(),
            classes = ?bundle.classes,
            "resolved classifier bundle"
        );
        Ok(bundle)
    }

    /// Apply `x_cols.json`, `label_map.json` and `scaler.json` found in `dir`.
    fn apply_side_files(&mut self, dir: &Path) -> Result<()> {
        if let Some(cols) = read_side_file::<Vec<Value>>(&dir.join(X_COLS_FILE))? {
            self.x_cols = texts(&cols);
        }
        if let Some(map) = read_side_file::<LabelMapFile>(&dir.join(LABEL_MAP_FILE))? {
            self.classes = texts(&map.classes);
        }
        if let Some(scaler) = read_side_file::<StandardScaler>(&dir.join(SCALER_FILE))? {
            self.scaler = Some(scaler.validated()?);
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.classes.is_empty() {
            return Err(Error::Artifact("bundle declares no classes".into()));
        }
        if let Some(scaler) = &self.scaler {
            if scaler.width() != self.x_cols.len() {
                return Err(Error::Artifact(format!(
                    "scaler fitted on {} columns but bundle declares {}",
                    scaler.width(),
                    self.x_cols.len()
                )));
            }
        }
        Ok(())
    }

    pub fn model(&self) -> &dyn Classifier {
        self.model.as_ref()
    }

    /// Feature columns in classifier input order.
    pub fn x_cols(&self) -> &[String] {
        &self.x_cols
    }

    /// Declared class labels, indexing the reconciled probability vector.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn class_name_map(&self) -> &BTreeMap<String, String> {
        &self.class_name_map
    }

    pub fn scaler(&self) -> Option<&StandardScaler> {
        self.scaler.as_ref()
    }
}

fn read_side_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.is_file() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)?;
    let value = serde_json::from_str(&text)
        .map_err(|e| Error::parse(path, e.to_string()))?;
    tracing::debug!(path = %path.display(), "applied side file");
    Ok(Some(value))
}

/// Load a classifier artifact plus any side files next to it.
pub fn load_classifier_bundle<P: AsRef<Path>>(path: P) -> Result<ClassifierBundle> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::NotFound(format!(
            "classifier artifact {}",
            path.display()
        )));
    }
    let text = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&text).map_err(|e| Error::parse(path, e.to_string()))?;
    let mut bundle = ClassifierBundle::from_value(value)?;
    if let Some(dir) = path.parent() {
        bundle.apply_side_files(dir)?;
    }
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lr() -> Value {
        json!({"kind": "logistic_regression", "classes": ["0", "1"], "coef": [[1.0, -1.0]], "intercept": [0.0]})
    }

    #[test]
    fn test_bare_model_gets_defaults() {
        let bundle = ClassifierBundle::from_value(json!({
            "kind": "nearest_centroid",
            "centroids": [[0.0], [1.0]]
        }))
        .unwrap();
        assert_eq!(bundle.x_cols().len(), DEFAULT_FEATURE_COUNT);
        assert_eq!(bundle.x_cols()[0], "vol_1");
        assert_eq!(bundle.x_cols()[137], "vol_138");
        assert_eq!(bundle.classes(), &["CN", "AD"]);
        // compat shim filled the model's own classes from the bundle
        assert_eq!(bundle.model().classes(), &["CN", "AD"]);
    }

    #[test]
    fn test_wrapper_keys() {
        for key in WRAPPER_KEYS {
            let mut wrapper = json!({"x_cols": ["a", "b"], "classes": [0, 1]});
            wrapper[key] = lr();
            let bundle = ClassifierBundle::from_value(wrapper).unwrap();
            assert_eq!(bundle.x_cols(), &["a", "b"]);
            assert_eq!(bundle.classes(), &["0", "1"]);
        }
    }

    #[test]
    fn test_paired_layout() {
        let bundle = ClassifierBundle::from_value(json!([
            lr(),
            {"x_cols": ["p", "q"], "classes": ["CN", "AD"], "class_name_map": {"0": "Healthy"}}
        ]))
        .unwrap();
        assert_eq!(bundle.x_cols(), &["p", "q"]);
        assert_eq!(bundle.class_name_map()["0"], "Healthy");

        let bare_pair = ClassifierBundle::from_value(json!([lr()])).unwrap();
        assert_eq!(bare_pair.classes(), &["CN", "AD"]);
    }

    #[test]
    fn test_unrecognised_layouts() {
        for value in [json!(42), json!([]), json!({"weights": [1, 2]}), json!([{"x_cols": []}])] {
            assert!(matches!(
                ClassifierBundle::from_value(value),
                Err(Error::Artifact(_))
            ));
        }
    }

    #[test]
    fn test_empty_classes_rejected() {
        let err = ClassifierBundle::from_value(json!({"model": lr(), "classes": []})).unwrap_err();
        assert!(matches!(err, Error::Artifact(_)));
    }

    #[test]
    fn test_scaler_width_must_match_columns() {
        let err = ClassifierBundle::from_value(json!({
            "model": lr(),
            "x_cols": ["a", "b"],
            "scaler": {"mean": [0.0], "scale": [1.0]}
        }))
        .unwrap_err();
        assert!(matches!(err, Error::Artifact(_)));
    }

    #[test]
    fn test_side_files_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, serde_json::to_string(&lr()).unwrap()).unwrap();
        fs::write(dir.path().join(X_COLS_FILE), r#"["LVEF", "SEG1_thkED"]"#).unwrap();
        fs::write(dir.path().join(LABEL_MAP_FILE), r#"{"classes": ["NOR", "DCM"]}"#).unwrap();
        fs::write(dir.path().join(SCALER_FILE), r#"{"mean": [0.5, 4.0], "scale": [0.1, 1.0]}"#).unwrap();

        let bundle = load_classifier_bundle(&path).unwrap();
        assert_eq!(bundle.x_cols(), &["LVEF", "SEG1_thkED"]);
        assert_eq!(bundle.classes(), &["NOR", "DCM"]);
        assert_eq!(bundle.scaler().map(StandardScaler::width), Some(2));
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_classifier_bundle(dir.path().join("model.json")),
            Err(Error::NotFound(_))
        ));
        let path = dir.path().join("model.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_classifier_bundle(&path), Err(Error::Parse { .. })));
    }
}
