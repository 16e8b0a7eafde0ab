use crate::model::WeibullAftModel;
use crate::types::StageGroup;
use ndarray::{Array1, ArrayView1};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

// --- Public Data Structures ---
// The fitted artifacts are produced by the training pipeline and stored as
// human-readable TOML next to each other in one directory.

/// Default file name of the fitted Weibull AFT model.
pub const MODEL_FILE_NAME: &str = "weibull_aft_model.toml";
/// Default file name of the fitted age/BMI scaler.
pub const SCALER_FILE_NAME: &str = "standard_scaler.toml";
/// Default file name of the fitted tumor-stage encoder.
pub const ENCODER_FILE_NAME: &str = "tumor_ordinal_encoder.toml";

/// Numeric columns the scaler standardizes, in order.
pub const SCALER_FEATURES: [&str; 2] = ["age", "BMI"];

/// Custom error type for loading, saving and applying fitted artifacts.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Failed to read or write artifact file {}: {source}", .path.display())]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML artifact file {}: {source}", .path.display())]
    TomlParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize artifact to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("The {artifact} expects {expected} features, but {found} were supplied.")]
    FeatureCount {
        artifact: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("The {artifact} is structurally invalid: {reason}")]
    Malformed {
        artifact: &'static str,
        reason: String,
    },
    #[error("Category '{0}' is not known to the tumor-stage encoder.")]
    UnknownCategory(String),
}

/// Standardizes the numeric covariates `[age, BMI]`.
pub trait FeatureScaler: Send + Sync {
    fn transform_numeric(&self, values: ArrayView1<'_, f64>) -> Result<Array1<f64>, ArtifactError>;
}

/// Maps a reduced tumor-stage label to its ordinal code.
pub trait StageEncoder: Send + Sync {
    fn encode_category(&self, label: &str) -> Result<f64, ArtifactError>;
}

/// Zero-mean / unit-variance scaler with fitted per-feature mean and scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    feature_names: Vec<String>,
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(
        feature_names: Vec<String>,
        mean: Vec<f64>,
        scale: Vec<f64>,
    ) -> Result<Self, ArtifactError> {
        let scaler = Self {
            feature_names,
            mean,
            scale,
        };
        scaler.validate()?;
        Ok(scaler)
    }

    /// Convenience constructor for the `[age, BMI]` layout.
    pub fn for_age_and_bmi(mean: [f64; 2], scale: [f64; 2]) -> Result<Self, ArtifactError> {
        Self::new(
            SCALER_FEATURES.iter().map(|name| name.to_string()).collect(),
            mean.to_vec(),
            scale.to_vec(),
        )
    }

    pub fn validate(&self) -> Result<(), ArtifactError> {
        const ARTIFACT: &str = "standard scaler";
        if self.feature_names.len() != SCALER_FEATURES.len() {
            return Err(ArtifactError::FeatureCount {
                artifact: ARTIFACT,
                expected: SCALER_FEATURES.len(),
                found: self.feature_names.len(),
            });
        }
        if self.feature_names.iter().map(String::as_str).ne(SCALER_FEATURES) {
            return Err(ArtifactError::Malformed {
                artifact: ARTIFACT,
                reason: format!(
                    "feature names {:?} do not match the expected order {:?}",
                    self.feature_names, SCALER_FEATURES
                ),
            });
        }
        if self.mean.len() != self.feature_names.len() || self.scale.len() != self.feature_names.len()
        {
            return Err(ArtifactError::Malformed {
                artifact: ARTIFACT,
                reason: format!(
                    "{} features but {} means and {} scales",
                    self.feature_names.len(),
                    self.mean.len(),
                    self.scale.len()
                ),
            });
        }
        if let Some(bad) = self.mean.iter().find(|m| !m.is_finite()) {
            return Err(ArtifactError::Malformed {
                artifact: ARTIFACT,
                reason: format!("mean {bad} is not finite"),
            });
        }
        if let Some(bad) = self.scale.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(ArtifactError::Malformed {
                artifact: ARTIFACT,
                reason: format!("scale {bad} is not a finite positive number"),
            });
        }
        Ok(())
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let scaler: Self = load_toml(path.as_ref())?;
        scaler.validate()?;
        Ok(scaler)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ArtifactError> {
        save_toml(self, path.as_ref())
    }
}

impl FeatureScaler for StandardScaler {
    fn transform_numeric(&self, values: ArrayView1<'_, f64>) -> Result<Array1<f64>, ArtifactError> {
        if values.len() != self.mean.len() {
            return Err(ArtifactError::FeatureCount {
                artifact: "standard scaler",
                expected: self.mean.len(),
                found: values.len(),
            });
        }
        let mean = ArrayView1::from(self.mean.as_slice());
        let scale = ArrayView1::from(self.scale.as_slice());
        Ok((&values - &mean) / &scale)
    }
}

/// Ordinal encoder over the reduced tumor-stage categories.
///
/// The code of a category is its position in `categories`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrdinalEncoder {
    feature_name: String,
    categories: Vec<String>,
}

impl OrdinalEncoder {
    pub fn new(feature_name: String, categories: Vec<String>) -> Result<Self, ArtifactError> {
        let encoder = Self {
            feature_name,
            categories,
        };
        encoder.validate()?;
        Ok(encoder)
    }

    /// Encoder over `I-II < III < IV`, the ordering produced at fit time.
    pub fn tumor_stage() -> Self {
        Self {
            feature_name: "tumor_stage".to_string(),
            categories: StageGroup::ALL
                .iter()
                .map(|group| group.label().to_string())
                .collect(),
        }
    }

    /// The encoder must have been fitted on exactly the three reduced stage categories.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        const ARTIFACT: &str = "tumor-stage encoder";
        if self.categories.len() != StageGroup::ALL.len() {
            return Err(ArtifactError::FeatureCount {
                artifact: ARTIFACT,
                expected: StageGroup::ALL.len(),
                found: self.categories.len(),
            });
        }
        let fitted: HashSet<&str> = self.categories.iter().map(String::as_str).collect();
        let expected: HashSet<&str> = StageGroup::ALL.iter().map(|g| g.label()).collect();
        if fitted != expected {
            return Err(ArtifactError::Malformed {
                artifact: ARTIFACT,
                reason: format!(
                    "categories {:?} differ from the expected {:?}",
                    self.categories,
                    StageGroup::ALL.map(StageGroup::label)
                ),
            });
        }
        Ok(())
    }

    pub fn feature_name(&self) -> &str {
        &self.feature_name
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let encoder: Self = load_toml(path.as_ref())?;
        encoder.validate()?;
        Ok(encoder)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ArtifactError> {
        save_toml(self, path.as_ref())
    }
}

impl StageEncoder for OrdinalEncoder {
    fn encode_category(&self, label: &str) -> Result<f64, ArtifactError> {
        self.categories
            .iter()
            .position(|category| category == label)
            .map(|idx| idx as f64)
            .ok_or_else(|| ArtifactError::UnknownCategory(label.to_string()))
    }
}

/// The three fitted artifacts, loaded once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct FittedArtifacts {
    pub model: Arc<WeibullAftModel>,
    pub scaler: Arc<StandardScaler>,
    pub encoder: Arc<OrdinalEncoder>,
}

impl FittedArtifacts {
    pub fn new(model: WeibullAftModel, scaler: StandardScaler, encoder: OrdinalEncoder) -> Self {
        Self {
            model: Arc::new(model),
            scaler: Arc::new(scaler),
            encoder: Arc::new(encoder),
        }
    }

    /// Loads the three artifacts from their default file names inside `dir`.
    ///
    /// A missing or corrupt artifact is a deployment error, so this fails on the
    /// first problem instead of retrying.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let dir = dir.as_ref();
        log::info!("Loading fitted artifacts from {}", dir.display());

        let model = WeibullAftModel::load(dir.join(MODEL_FILE_NAME))?;
        let scaler = StandardScaler::load(dir.join(SCALER_FILE_NAME))?;
        let encoder = OrdinalEncoder::load(dir.join(ENCODER_FILE_NAME))?;

        log::info!(
            "Loaded Weibull AFT model over {} covariates, scaler over {:?}, encoder over {:?}",
            model.covariates().len(),
            scaler.feature_names(),
            encoder.categories()
        );
        Ok(Self::new(model, scaler, encoder))
    }

    /// Writes the three artifacts into `dir` under their default file names.
    pub fn save_dir(&self, dir: impl AsRef<Path>) -> Result<(), ArtifactError> {
        let dir = dir.as_ref();
        self.model.save(dir.join(MODEL_FILE_NAME))?;
        self.scaler.save(dir.join(SCALER_FILE_NAME))?;
        self.encoder.save(dir.join(ENCODER_FILE_NAME))?;
        Ok(())
    }
}

pub(crate) fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    log::debug!("Reading artifact {}", path.display());
    let toml_string = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
    toml::from_str(&toml_string).map_err(|source| ArtifactError::TomlParseError {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn save_toml<T: Serialize>(value: &T, path: &Path) -> Result<(), ArtifactError> {
    let toml_string = toml::to_string_pretty(value)?;
    let file = fs::File::create(path).map_err(|source| io_error(path, source))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(toml_string.as_bytes())
        .and_then(|()| writer.flush())
        .map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> ArtifactError {
    ArtifactError::IoError {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LinearPredictorParams;
    use crate::types::DerivedFeatureVector;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use tempfile::tempdir;

    fn reference_artifacts() -> FittedArtifacts {
        let model = WeibullAftModel::new(
            DerivedFeatureVector::FEATURE_NAMES
                .iter()
                .map(|name| name.to_string())
                .collect(),
            LinearPredictorParams::new(4.0, vec![-0.1, 0.05, -0.6, 0.01, -0.02, 0.003]),
            LinearPredictorParams::intercept_only(0.1),
        )
        .unwrap();
        let scaler = StandardScaler::for_age_and_bmi([68.0, 26.0], [11.0, 4.5]).unwrap();
        FittedArtifacts::new(model, scaler, OrdinalEncoder::tumor_stage())
    }

    #[test]
    fn scaler_standardizes_each_column() {
        let scaler = StandardScaler::for_age_and_bmi([60.0, 25.0], [10.0, 5.0]).unwrap();
        let out = scaler.transform_numeric(array![70.0, 20.0].view()).unwrap();
        assert_abs_diff_eq!(out[0], 1.0);
        assert_abs_diff_eq!(out[1], -1.0);
    }

    #[test]
    fn scaler_rejects_wrong_feature_count() {
        let scaler = StandardScaler::for_age_and_bmi([60.0, 25.0], [10.0, 5.0]).unwrap();
        let err = scaler
            .transform_numeric(array![70.0, 20.0, 1.0].view())
            .unwrap_err();
        assert!(matches!(
            err,
            ArtifactError::FeatureCount {
                expected: 2,
                found: 3,
                ..
            }
        ));
    }

    #[test]
    fn scaler_rejects_structural_problems() {
        assert!(StandardScaler::for_age_and_bmi([60.0, 25.0], [0.0, 5.0]).is_err());
        assert!(StandardScaler::for_age_and_bmi([f64::NAN, 25.0], [1.0, 5.0]).is_err());
        assert!(
            StandardScaler::new(
                vec!["BMI".to_string(), "age".to_string()],
                vec![25.0, 60.0],
                vec![5.0, 10.0]
            )
            .is_err(),
            "swapped column order must be rejected"
        );
        assert!(
            StandardScaler::new(
                vec!["age".to_string(), "BMI".to_string()],
                vec![60.0],
                vec![10.0, 5.0]
            )
            .is_err()
        );
    }

    #[test]
    fn encoder_codes_follow_category_position() {
        let encoder = OrdinalEncoder::tumor_stage();
        assert_eq!(encoder.encode_category("I-II").unwrap(), 0.0);
        assert_eq!(encoder.encode_category("III").unwrap(), 1.0);
        assert_eq!(encoder.encode_category("IV").unwrap(), 2.0);
        assert!(matches!(
            encoder.encode_category("II"),
            Err(ArtifactError::UnknownCategory(_))
        ));
    }

    #[test]
    fn encoder_must_cover_exactly_the_reduced_categories() {
        let four = OrdinalEncoder::new(
            "tumor_stage".to_string(),
            vec!["I".into(), "II".into(), "III".into(), "IV".into()],
        );
        assert!(matches!(four, Err(ArtifactError::FeatureCount { .. })));

        let wrong = OrdinalEncoder::new(
            "tumor_stage".to_string(),
            vec!["I".into(), "III".into(), "IV".into()],
        );
        assert!(matches!(wrong, Err(ArtifactError::Malformed { .. })));

        let reordered = OrdinalEncoder::new(
            "tumor_stage".to_string(),
            vec!["IV".into(), "III".into(), "I-II".into()],
        )
        .unwrap();
        assert_eq!(reordered.encode_category("IV").unwrap(), 0.0);
    }

    #[test]
    fn artifacts_survive_a_save_and_load_through_a_directory() {
        let dir = tempdir().unwrap();
        let artifacts = reference_artifacts();
        artifacts.save_dir(dir.path()).unwrap();

        let loaded = FittedArtifacts::load_dir(dir.path()).unwrap();
        assert_eq!(*loaded.model, *artifacts.model);
        assert_eq!(*loaded.scaler, *artifacts.scaler);
        assert_eq!(*loaded.encoder, *artifacts.encoder);
    }

    #[test]
    fn missing_artifact_fails_fast() {
        let dir = tempdir().unwrap();
        let artifacts = reference_artifacts();
        artifacts.model.save(dir.path().join(MODEL_FILE_NAME)).unwrap();

        let err = FittedArtifacts::load_dir(dir.path()).unwrap_err();
        assert!(
            matches!(&err, ArtifactError::IoError { path, .. } if path.ends_with(SCALER_FILE_NAME))
        );
        assert!(err.to_string().contains(SCALER_FILE_NAME), "{err}");

        let empty = tempdir().unwrap();
        let err = FittedArtifacts::load_dir(empty.path()).unwrap_err();
        assert!(err.to_string().contains(MODEL_FILE_NAME), "{err}");
    }

    #[test]
    fn tampered_scaler_file_is_rejected_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SCALER_FILE_NAME);
        fs::write(
            &path,
            "feature_names = [\"age\", \"BMI\"]\nmean = [60.0, 25.0]\nscale = [10.0, -1.0]\n",
        )
        .unwrap();
        assert!(matches!(
            StandardScaler::load(&path),
            Err(ArtifactError::Malformed { .. })
        ));

        fs::write(&path, "feature_names = 3").unwrap();
        assert!(matches!(
            StandardScaler::load(&path),
            Err(ArtifactError::TomlParseError { .. })
        ));
        let err = StandardScaler::load(&path).unwrap_err();
        assert!(err.to_string().contains(SCALER_FILE_NAME), "{err}");
    }
}
