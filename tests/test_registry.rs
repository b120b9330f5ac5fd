//! Registry bring-up from a model directory tree and request-level inference.

use std::fs;
use std::path::Path;

use medxai::features::heart::{LV_LABEL, MYOCARDIUM_LABEL};
use medxai::nifti;
use medxai::{
    Error, HeartOptions, LabelVolume, MaskInput, ModelRegistry, Pipeline, RegistryConfig, XaiMethod,
};
use ndarray::Array3;
use serde_json::json;
use tempfile::tempdir;

fn write_json(path: &Path, value: serde_json::Value) {
    fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
}

/// models/brain/alzheimers, models/heart/cardiomyopathy and two broken entries.
fn model_tree(root: &Path) {
    let brain = root.join("brain/alzheimers");
    fs::create_dir_all(&brain).unwrap();
    write_json(
        &brain.join("model.json"),
        json!({
            "model": {
                "kind": "logistic_regression",
                "classes": [0, 1],
                "coef": [[-0.1, 0.5]],
                "intercept": [0.0],
                "use_label_encoder": false
            },
            "x_cols": ["vol_1", "vol_2"],
            "classes": ["0", "1"]
        }),
    );
    fs::write(
        brain.join("lut_parsed.csv"),
        "label_id,label_name\n1,Left-Hippocampus\n2,Right-Hippocampus\n",
    )
    .unwrap();

    let heart = root.join("heart/cardiomyopathy");
    fs::create_dir_all(&heart).unwrap();
    write_json(
        &heart.join("xgb_model.json"),
        json!({
            "kind": "gradient_boosted_trees",
            "gpu_id": 0,
            "tree_method": "gpu_hist",
            "n_features": 2,
            "trees": [
                {"nodes": [
                    {"feature": 0, "threshold": 0.5, "left": 1, "right": 2, "gain": 3.0},
                    {"leaf": 2.0},
                    {"leaf": -2.0}
                ]},
                {"nodes": [
                    {"feature": 1, "threshold": 100.0, "left": 1, "right": 2, "gain": 7.0},
                    {"leaf": 0.0},
                    {"leaf": 0.0}
                ]}
            ]
        }),
    );
    write_json(&heart.join("x_cols.json"), json!(["LVEF", "SEG4_thkED"]));
    write_json(&heart.join("label_map.json"), json!({"classes": ["NOR", "DCM"]}));

    // Brain entry without a label table.
    let no_lut = root.join("brain/no_lut");
    fs::create_dir_all(&no_lut).unwrap();
    write_json(&no_lut.join("model.json"), json!({"kind": "nearest_centroid", "centroids": [[0.0], [1.0]]}));

    // Unparseable artifact.
    let broken = root.join("brain/broken");
    fs::create_dir_all(&broken).unwrap();
    fs::write(broken.join("model.json"), "{").unwrap();
    fs::write(broken.join("lut.csv"), "label_id,label_name\n1,A\n").unwrap();
}

fn brain_mask() -> Vec<u8> {
    let mut labels = Array3::<i32>::zeros((6, 6, 6));
    labels.slice_mut(ndarray::s![..1, .., ..]).fill(1);
    labels.slice_mut(ndarray::s![1..5, .., ..]).fill(2);
    nifti::encode(&LabelVolume::new(labels, [1.0, 1.0, 1.0]).unwrap(), true).unwrap()
}

fn heart_masks() -> (Vec<u8>, Vec<u8>) {
    let ring = |lv_radius: f64| {
        Array3::from_shape_fn((6, 12, 12), |(_, j, k)| {
            let (y, x) = (j as f64 - 5.5, k as f64 - 5.5);
            let r = (y * y + x * x).sqrt();
            if r < lv_radius {
                LV_LABEL
            } else if r < 5.0 {
                MYOCARDIUM_LABEL
            } else {
                0
            }
        })
    };
    let encode = |labels| nifti::encode(&LabelVolume::new(labels, [1.0, 1.0, 1.0]).unwrap(), false).unwrap();
    (encode(ring(3.5)), encode(ring(2.0)))
}

#[test]
fn test_scan_registers_good_entries_only() {
    let dir = tempdir().unwrap();
    model_tree(dir.path());

    let registry = ModelRegistry::scan(&RegistryConfig::new(dir.path())).unwrap();
    assert_eq!(registry.len(), 2);
    let organs = registry.organs();
    assert_eq!(organs["brain"], vec!["alzheimers".to_string()]);
    assert_eq!(organs["heart"], vec!["cardiomyopathy".to_string()]);

    let brain = registry.get("brain", "alzheimers").unwrap();
    assert_eq!(brain.pipeline(), Pipeline::Brain);
    assert_eq!(brain.lut().map(|l| l.len()), Some(2));
    assert_eq!(brain.class_name_map()["1"], "AD");

    let heart = registry.get("heart", "cardiomyopathy").unwrap();
    assert_eq!(heart.pipeline(), Pipeline::Heart);
    assert_eq!(heart.bundle().x_cols(), &["LVEF", "SEG4_thkED"]);
    assert_eq!(heart.bundle().classes(), &["NOR", "DCM"]);

    assert!(matches!(registry.get("brain", "broken"), Err(Error::NotFound(_))));
    assert!(matches!(registry.get("lung", "copd"), Err(Error::NotFound(_))));
}

#[test]
fn test_brain_inference() {
    let dir = tempdir().unwrap();
    model_tree(dir.path());
    let staging = tempdir().unwrap();
    let config = RegistryConfig::new(dir.path()).staging_dir(staging.path());
    let registry = ModelRegistry::scan(&config).unwrap();

    let mask = brain_mask();
    let result = registry
        .get("brain", "alzheimers")
        .unwrap()
        .infer(MaskInput::Single(&mask), true)
        .unwrap();

    // margin = -0.1 * 36 + 0.5 * 144 > 0
    assert_eq!(result.prediction, "AD");
    assert_eq!(result.icv_mm3, Some(180.0));
    assert_eq!(result.used_features, vec!["vol_1", "vol_2"]);
    let xai = result.xai.unwrap();
    assert_eq!(xai.method, XaiMethod::FeatureImportance);
    assert_eq!(xai.top_regions.unwrap()[0].label_name, "Right-Hippocampus");
    assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[test]
fn test_heart_inference_pair_and_single() {
    let dir = tempdir().unwrap();
    model_tree(dir.path());
    let config = RegistryConfig::new(dir.path()).heart(HeartOptions::new().header_spacing());
    let registry = ModelRegistry::scan(&config).unwrap();
    let heart = registry.get("heart", "cardiomyopathy").unwrap();
    let (ed, es) = heart_masks();

    let paired = heart.infer(MaskInput::Pair { ed: &ed, es: &es }, true).unwrap();
    // LVEF > 0.5 takes the negative leaf
    assert_eq!(paired.prediction, "NOR");
    let xai = paired.xai.unwrap();
    assert_eq!(xai.method, XaiMethod::Gain);
    let top = xai.top_regions.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].label_name, "AHA4");
    assert_eq!(paired.segment_scores.map(|s| s.len()), Some(16));

    // One mask doubles as ED and ES: LVEF = 0 takes the positive leaf.
    let single = heart.infer(MaskInput::Single(&ed), false).unwrap();
    assert_eq!(single.prediction, "DCM");
    assert!(single.xai.is_none());
}

#[test]
fn test_malformed_mask_is_decode_error() {
    let dir = tempdir().unwrap();
    model_tree(dir.path());
    let registry = ModelRegistry::scan(&RegistryConfig::new(dir.path())).unwrap();

    let err = registry
        .get("brain", "alzheimers")
        .unwrap()
        .infer(MaskInput::Single(b"definitely not nifti"), false)
        .unwrap_err();
    assert!(err.is_decode_error(), "{err}");
}

#[test]
fn test_missing_models_root() {
    let dir = tempdir().unwrap();
    let err = ModelRegistry::scan(&RegistryConfig::new(dir.path().join("absent"))).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
