//! Startup scan of a `<root>/<organ>/<disease>/` model tree.
//!
//! Each disease directory holds a classifier artifact, an optional label table and
//! an optional `meta.json`. Entries that fail to load are logged and left out; the
//! registry itself is immutable once built.

use super::bundle::{load_classifier_bundle, ClassifierBundle};
use crate::aha;
use crate::config::{HeartOptions, RegistryConfig};
use crate::error::{Error, Result};
use crate::features::{extract_brain_features, extract_heart_features};
use crate::lut::{load_lut, LabelTable};
use crate::nifti::{self, LabelVolume};
use crate::predict::labels::default_class_name_map;
use crate::predict::{predict_brain, predict_heart, PredictionResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

const MODEL_FILE: &str = "model.json";
const LUT_FILES: [&str; 2] = ["lut_parsed.csv", "lut.csv"];
const META_FILE: &str = "meta.json";

/// Feature pipeline a registered model is fed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pipeline {
    Brain,
    Heart,
}

impl Pipeline {
    /// Default pipeline for an organ directory name.
    fn for_organ(organ: &str) -> Self {
        if organ.eq_ignore_ascii_case("heart") {
            Self::Heart
        } else {
            Self::Brain
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Brain => write!(f, "brain"),
            Self::Heart => write!(f, "heart"),
        }
    }
}

/// Optional `meta.json` next to a model.
#[derive(Debug, Default, Deserialize)]
struct ModelMeta {
    #[serde(default)]
    class_name_map: BTreeMap<String, String>,
    #[serde(default)]
    pipeline: Option<Pipeline>,
}

/// Masks submitted for one inference.
#[derive(Debug, Clone, Copy)]
pub enum MaskInput<'a> {
    /// One mask: the brain parcellation, or a heart mask reused for both phases.
    Single(&'a [u8]),
    /// End-diastole and end-systole heart masks.
    Pair { ed: &'a [u8], es: &'a [u8] },
}

/// One `(organ, disease)` entry, ready for inference.
#[derive(Debug)]
pub struct RegisteredModel {
    organ: String,
    disease: String,
    pipeline: Pipeline,
    bundle: ClassifierBundle,
    lut: Option<LabelTable>,
    class_name_map: BTreeMap<String, String>,
    heart: HeartOptions,
    staging_dir: Option<PathBuf>,
}

impl RegisteredModel {
    pub fn new(organ: impl Into<String>, disease: impl Into<String>, pipeline: Pipeline, bundle: ClassifierBundle) -> Self {
        let class_name_map = bundle.class_name_map().clone();
        Self {
            organ: organ.into(),
            disease: disease.into(),
            pipeline,
            bundle,
            lut: None,
            class_name_map,
            heart: HeartOptions::default(),
            staging_dir: None,
        }
    }

    pub fn with_lut(mut self, lut: LabelTable) -> Self {
        self.lut = Some(lut);
        self
    }

    /// Add name overrides on top of the bundle's own map.
    pub fn with_class_names(mut self, overrides: BTreeMap<String, String>) -> Self {
        self.class_name_map.extend(overrides);
        self
    }

    pub fn with_heart_options(mut self, heart: HeartOptions) -> Self {
        self.heart = heart;
        self
    }

    pub fn with_staging_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.staging_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Load the entry stored in `dir`.
    fn load(organ: &str, disease: &str, dir: &Path, config: &RegistryConfig) -> Result<Self> {
        let names = file_names(dir)?;
        let artifact = find_artifact(&names)
            .ok_or_else(|| Error::NotFound(format!("classifier artifact in {}", dir.display())))?;
        let bundle = load_classifier_bundle(dir.join(artifact))?;

        let meta = match find_named(&names, META_FILE) {
            Some(name) => serde_json::from_str::<ModelMeta>(&fs::read_to_string(dir.join(name))?)
                .map_err(|e| Error::parse(dir.join(name), e.to_string()))?,
            None => ModelMeta::default(),
        };
        let pipeline = meta.pipeline.unwrap_or_else(|| Pipeline::for_organ(organ));

        let lut = LUT_FILES
            .iter()
            .find_map(|candidate| find_named(&names, candidate))
            .map(|name| load_lut(dir.join(name)))
            .transpose()?;
        if pipeline == Pipeline::Brain && lut.is_none() {
            return Err(Error::NotFound(format!(
                "label table (lut_parsed.csv or lut.csv) in {}",
                dir.display()
            )));
        }

        let mut model = Self::new(organ, disease, pipeline, bundle).with_heart_options(config.heart.clone());
        if pipeline == Pipeline::Brain {
            let mut class_names = default_class_name_map();
            class_names.extend(std::mem::take(&mut model.class_name_map));
            model.class_name_map = class_names;
        }
        model = model.with_class_names(meta.class_name_map);
        model.lut = lut;
        model.staging_dir = config.staging_dir.clone();
        Ok(model)
    }

    pub fn organ(&self) -> &str {
        &self.organ
    }

    pub fn disease(&self) -> &str {
        &self.disease
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline
    }

    pub fn bundle(&self) -> &ClassifierBundle {
        &self.bundle
    }

    pub fn lut(&self) -> Option<&LabelTable> {
        self.lut.as_ref()
    }

    pub fn class_name_map(&self) -> &BTreeMap<String, String> {
        &self.class_name_map
    }

    fn decode(&self, bytes: &[u8]) -> Result<LabelVolume> {
        match &self.staging_dir {
            Some(dir) => nifti::decode_in(bytes, dir),
            None => nifti::decode(bytes),
        }
    }

    fn names(&self) -> Option<&BTreeMap<String, String>> {
        (!self.class_name_map.is_empty()).then_some(&self.class_name_map)
    }

    /// Decode the submitted masks, extract features and classify.
    pub fn infer(&self, input: MaskInput<'_>, want_xai: bool) -> Result<PredictionResult> {
        match self.pipeline {
            Pipeline::Brain => {
                let bytes = match input {
                    MaskInput::Single(bytes) => bytes,
                    MaskInput::Pair { ed, .. } => {
                        tracing::warn!(organ = %self.organ, "brain pipeline takes one mask, using the first");
                        ed
                    }
                };
                let lut = self
                    .lut
                    .as_ref()
                    .ok_or_else(|| Error::NotFound(format!("label table for {}/{}", self.organ, self.disease)))?;
                let volume = self.decode(bytes)?;
                let features = extract_brain_features(&volume, lut);
                predict_brain(&self.bundle, &features, lut, self.names(), want_xai)
            }
            Pipeline::Heart => {
                let (ed, es) = match input {
                    MaskInput::Pair { ed, es } => (self.decode(ed)?, self.decode(es)?),
                    MaskInput::Single(bytes) => {
                        tracing::warn!(
                            organ = %self.organ,
                            disease = %self.disease,
                            "single heart mask reused as ED and ES, ejection fractions will be zero"
                        );
                        let volume = self.decode(bytes)?;
                        (volume.clone(), volume)
                    }
                };
                let spacing = self.heart.resolve(ed.spacing());
                let features = extract_heart_features(ed.labels(), es.labels(), spacing)?;
                predict_heart(&self.bundle, &features, self.names(), want_xai)
            }
        }
    }
}

/// Immutable `(organ, disease)` → model table.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    entries: BTreeMap<(String, String), RegisteredModel>,
}

impl ModelRegistry {
    /// Scan `config.models_root`. Only a missing root or bad config is fatal.
    pub fn scan(config: &RegistryConfig) -> Result<Self> {
        config.validate()?;
        aha::set_zone_cache_size(config.zone_cache_size);

        let root = &config.models_root;
        if !root.is_dir() {
            return Err(Error::NotFound(format!("models root {}", root.display())));
        }

        let mut registry = Self::default();
        for (organ, organ_dir) in subdirectories(root)? {
            let diseases = match subdirectories(&organ_dir) {
                Ok(diseases) => diseases,
                Err(e) => {
                    tracing::warn!(%organ, error = %e, "skipping unreadable organ directory");
                    continue;
                }
            };
            for (disease, dir) in diseases {
                match RegisteredModel::load(&organ, &disease, &dir, config) {
                    Ok(model) => {
                        tracing::info!(
                            %organ,
                            %disease,
                            pipeline = %model.pipeline,
                            columns = model.bundle.x_cols().len(),
                            "registered model"
                        );
                        registry.insert(model);
                    }
                    Err(e) => tracing::warn!(%organ, %disease, error = %e, "skipping model entry"),
                }
            }
        }
        tracing::info!(models = registry.len(), root = %root.display(), "model registry ready");
        Ok(registry)
    }

    /// Build a registry from already-loaded models; later duplicates win.
    pub fn from_models<I: IntoIterator<Item = RegisteredModel>>(models: I) -> Self {
        let mut registry = Self::default();
        for model in models {
            registry.insert(model);
        }
        registry
    }

    fn insert(&mut self, model: RegisteredModel) {
        let key = (model.organ.clone(), model.disease.clone());
        self.entries.insert(key, model);
    }

    /// Model for `(organ, disease)`, or `NotFound`.
    pub fn get(&self, organ: &str, disease: &str) -> Result<&RegisteredModel> {
        self.entries
            .get(&(organ.to_string(), disease.to_string()))
            .ok_or_else(|| Error::NotFound(format!("no model registered for {organ}/{disease}")))
    }

    /// Organ → sorted disease names.
    pub fn organs(&self) -> BTreeMap<String, Vec<String>> {
        let mut organs: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (organ, disease) in self.entries.keys() {
            organs.entry(organ.clone()).or_default().push(disease.clone());
        }
        organs
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredModel> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `(name, path)` of each subdirectory, sorted by name.
fn subdirectories(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            out.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
        }
    }
    out.sort();
    Ok(out)
}

/// Sorted names of the regular files in `dir`.
fn file_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// File called `wanted`, compared case-insensitively.
fn find_named<'a>(names: &'a [String], wanted: &str) -> Option<&'a str> {
    names
        .iter()
        .find(|n| n.eq_ignore_ascii_case(wanted))
        .map(String::as_str)
}

/// `model.json`, else the first `*.json` whose name mentions "model".
fn find_artifact(names: &[String]) -> Option<&str> {
    find_named(names, MODEL_FILE).or_else(|| {
        names
            .iter()
            .find(|n| {
                let lower = n.to_ascii_lowercase();
                lower.ends_with(".json") && lower.contains("model")
            })
            .map(String::as_str)
    })
}
