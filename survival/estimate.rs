use crate::artifacts::{ArtifactError, FeatureScaler, FittedArtifacts, StageEncoder};
use crate::config::{ConfigError, CurvePolicy, EstimationConfig};
use crate::crossing::find_crossing;
use crate::features::transform;
use crate::model::{ModelError, SurvivalModel};
use crate::types::{DerivedFeatureVector, EstimationResult, RawClinicalInput, SurvivalCurve};
use std::sync::Arc;
use thiserror::Error;

/// Failure taxonomy of the estimation pipeline.
#[derive(Error, Debug, Clone)]
pub enum EstimationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Fitted artifact mismatch: {0}")]
    ArtifactMismatch(String),

    #[error("The model returned a non-finite median survival time ({value}).")]
    InvalidPrediction { value: f64 },

    #[error("Model evaluation failed: {0}")]
    EvaluationError(String),
}

impl From<ArtifactError> for EstimationError {
    fn from(err: ArtifactError) -> Self {
        Self::ArtifactMismatch(err.to_string())
    }
}

impl From<ConfigError> for EstimationError {
    fn from(err: ConfigError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl From<ModelError> for EstimationError {
    fn from(err: ModelError) -> Self {
        Self::EvaluationError(err.to_string())
    }
}

/// Everything one call to [`Estimator::estimate`] produces.
///
/// `curve` and `result` are decoupled: an invalid median fails `result` but,
/// under [`CurvePolicy::Independent`], the curve is still available for charting.
#[derive(Debug, Clone)]
pub struct Estimation {
    pub features: DerivedFeatureVector,
    pub curve: Option<SurvivalCurve>,
    pub result: Result<EstimationResult, EstimationError>,
}

/// The survival-estimation pipeline over a set of injected, read-only artifacts.
///
/// Cloning is cheap and clones share the artifacts, so one estimator built at
/// startup can serve concurrent requests.
#[derive(Clone)]
pub struct Estimator {
    model: Arc<dyn SurvivalModel>,
    scaler: Arc<dyn FeatureScaler>,
    encoder: Arc<dyn StageEncoder>,
    config: EstimationConfig,
}

impl Estimator {
    pub fn new(
        model: Arc<dyn SurvivalModel>,
        scaler: Arc<dyn FeatureScaler>,
        encoder: Arc<dyn StageEncoder>,
        config: EstimationConfig,
    ) -> Result<Self, EstimationError> {
        config.validate()?;
        Ok(Self {
            model,
            scaler,
            encoder,
            config,
        })
    }

    pub fn from_artifacts(
        artifacts: &FittedArtifacts,
        config: EstimationConfig,
    ) -> Result<Self, EstimationError> {
        Self::new(
            artifacts.model.clone(),
            artifacts.scaler.clone(),
            artifacts.encoder.clone(),
            config,
        )
    }

    pub fn config(&self) -> &EstimationConfig {
        &self.config
    }

    /// Runs transform, median, validation, curve and crossing search for one patient.
    ///
    /// Input and artifact problems, and any evaluation fault, fail the whole call.
    /// A non-finite median only fails [`Estimation::result`].
    pub fn estimate(&self, raw: &RawClinicalInput) -> Result<Estimation, EstimationError> {
        let features = transform(raw, self.scaler.as_ref(), self.encoder.as_ref())?;

        let median = self.model.median_survival_time(&features)?;
        let median_is_valid = median.is_finite();
        log::debug!("Median survival time: {median} months");

        let times = self.config.grid.times();
        let curve = match (median_is_valid, self.config.curve_policy) {
            (true, _) => Some(self.model.survival_curve(&features, times.view())?),
            (false, CurvePolicy::Independent) => {
                match self.model.survival_curve(&features, times.view()) {
                    Ok(curve) => Some(curve),
                    Err(err) => {
                        log::warn!("Survival curve unavailable alongside an invalid median: {err}");
                        None
                    }
                }
            }
            (false, CurvePolicy::GatedOnMedian) => None,
        };

        if !median_is_valid {
            log::warn!("Model returned a non-finite median ({median}); withholding the result.");
            return Ok(Estimation {
                features,
                curve,
                result: Err(EstimationError::InvalidPrediction { value: median }),
            });
        }

        let threshold = self.config.crossing_threshold;
        let threshold_crossing_time = curve
            .as_ref()
            .and_then(|curve| find_crossing(curve, threshold));
        if threshold_crossing_time.is_none() {
            log::info!(
                "Survival does not reach {threshold} within {}-{} months.",
                self.config.grid.start,
                self.config.grid.end
            );
        }

        Ok(Estimation {
            features,
            curve,
            result: Ok(EstimationResult {
                median_survival_time: median,
                threshold,
                threshold_crossing_time,
            }),
        })
    }
}
