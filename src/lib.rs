//! # medxai
//!
//! Imaging biomarkers from segmentation masks, fed to trained classifiers with
//! explanations attached.
//!
//! Two pipelines are provided:
//!
//! - **brain**: per-region volumes from a labelled parcellation, named through a
//!   label lookup table
//! - **heart**: ventricular volumes, ejection fractions, myocardial mass and
//!   AHA 16-segment wall thickness from an end-diastole/end-systole mask pair
//!
//! ## Quick Start
//!
//! ```ignore
//! use medxai::{ModelRegistry, MaskInput, RegistryConfig};
//!
//! let registry = ModelRegistry::scan(&RegistryConfig::new("models"))?;
//! let model = registry.get("brain", "alzheimers")?;
//! let result = model.infer(MaskInput::Single(&std::fs::read("seg.nii.gz")?), true)?;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! ```

pub mod aha;
pub mod config;
pub mod error;
pub mod features;
pub mod lut;
pub mod model;
pub mod nifti;
pub mod predict;

pub use aha::{generate_zones, zone_names, AhaZones};
pub use config::{HeartOptions, RegistryConfig, SpacingPolicy};
pub use error::{Error, Result};
pub use features::{
    extract_brain_features, extract_heart_features, BrainFeatures, FeatureVector, HeartFeatures,
};
pub use lut::{load_lut, LabelTable};
pub use model::{
    load_classifier_bundle, Classifier, ClassifierBundle, MaskInput, ModelRegistry, Pipeline,
    RegisteredModel,
};
pub use nifti::{decode, LabelVolume};
pub use predict::{predict_brain, predict_heart, PredictionResult, XaiMethod, XaiReport};
