use crate::artifacts::{ArtifactError, load_toml, save_toml};
use crate::types::{DerivedFeatureVector, SurvivalCurve};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Faults raised while evaluating a fitted survival model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("The time grid is empty.")]
    EmptyTimeGrid,
    #[error("Time grid value {value} at position {index} is not a finite, non-negative number.")]
    InvalidTime { index: usize, value: f64 },
    #[error("The time grid decreases at position {index}.")]
    UnorderedTimeGrid { index: usize },
    #[error("The survival curve has {times} time points but {probabilities} probabilities.")]
    CurveLengthMismatch { times: usize, probabilities: usize },
    #[error("Survival probability {value} at t = {time} lies outside [0, 1].")]
    ProbabilityOutOfRange { time: f64, value: f64 },
}

/// A pre-fitted parametric survival model.
///
/// Implementations are read-only after construction and may be shared across threads.
pub trait SurvivalModel: Send + Sync {
    /// Time at which predicted survival equals 0.5.
    ///
    /// A non-finite value is a legitimate output when the fitted parameters put the
    /// median out of reach for these covariates. Callers decide what to do with it.
    fn median_survival_time(&self, features: &DerivedFeatureVector) -> Result<f64, ModelError>;

    /// Survival probability at every time in `times`, evaluated in one pass.
    fn survival_curve(
        &self,
        features: &DerivedFeatureVector,
        times: ArrayView1<'_, f64>,
    ) -> Result<SurvivalCurve, ModelError>;
}

/// Checks that a time grid is non-empty, finite, non-negative and non-decreasing.
pub fn validate_time_grid(times: ArrayView1<'_, f64>) -> Result<(), ModelError> {
    if times.is_empty() {
        return Err(ModelError::EmptyTimeGrid);
    }
    let mut previous = 0.0f64;
    for (index, &value) in times.iter().enumerate() {
        if !value.is_finite() || value < 0.0 {
            return Err(ModelError::InvalidTime { index, value });
        }
        if index > 0 && value < previous {
            return Err(ModelError::UnorderedTimeGrid { index });
        }
        previous = value;
    }
    Ok(())
}

/// Intercept plus per-covariate coefficients of one distribution parameter on the log scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearPredictorParams {
    pub intercept: f64,
    /// Empty means the parameter does not depend on covariates.
    #[serde(default)]
    pub coefficients: Vec<f64>,
}

impl LinearPredictorParams {
    pub fn new(intercept: f64, coefficients: Vec<f64>) -> Self {
        Self {
            intercept,
            coefficients,
        }
    }

    pub fn intercept_only(intercept: f64) -> Self {
        Self::new(intercept, Vec::new())
    }

    #[inline]
    fn linear_predictor(&self, x: &Array1<f64>) -> f64 {
        if self.coefficients.is_empty() {
            return self.intercept;
        }
        self.intercept + ArrayView1::from(self.coefficients.as_slice()).dot(x)
    }
}

/// Scale and shape of the Weibull distribution for one covariate vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeibullParameters {
    /// Scale `lambda`, in months.
    pub scale: f64,
    /// Shape `rho`.
    pub shape: f64,
}

impl WeibullParameters {
    /// `S(t) = exp(-(t / lambda)^rho)`, with `S(0) = 1` for any parameters.
    ///
    /// The ratio is taken in log space so an underflowed `lambda` gives `S(t) = 0`
    /// for `t > 0` instead of `0 / 0`.
    #[inline]
    pub fn survival(&self, t: f64) -> f64 {
        if t == 0.0 {
            return 1.0;
        }
        (-(self.shape * (t.ln() - self.scale.ln())).exp()).exp()
    }

    /// Time at which survival equals `p`: `lambda * (-ln p)^(1 / rho)`.
    #[inline]
    pub fn inverse_survival(&self, p: f64) -> f64 {
        self.scale * (-p.ln()).powf(1.0 / self.shape)
    }
}

/// Weibull accelerated-failure-time model.
///
/// Both distribution parameters are log-linear in the covariates:
/// `lambda = exp(b0 + x.b)` and `rho = exp(c0 + x.c)`.
/// The covariates rescale time multiplicatively through `lambda`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeibullAftModel {
    covariates: Vec<String>,
    lambda: LinearPredictorParams,
    rho: LinearPredictorParams,
}

impl WeibullAftModel {
    pub fn new(
        covariates: Vec<String>,
        lambda: LinearPredictorParams,
        rho: LinearPredictorParams,
    ) -> Result<Self, ArtifactError> {
        let model = Self {
            covariates,
            lambda,
            rho,
        };
        model.validate()?;
        Ok(model)
    }

    /// The covariate layout must match [`DerivedFeatureVector::FEATURE_NAMES`] exactly,
    /// including order.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        const ARTIFACT: &str = "Weibull AFT model";
        let expected = DerivedFeatureVector::FEATURE_NAMES;
        if self.covariates.len() != expected.len() {
            return Err(ArtifactError::FeatureCount {
                artifact: ARTIFACT,
                expected: expected.len(),
                found: self.covariates.len(),
            });
        }
        if self.covariates.iter().map(String::as_str).ne(expected) {
            return Err(ArtifactError::Malformed {
                artifact: ARTIFACT,
                reason: format!(
                    "covariates {:?} do not match the expected order {:?}",
                    self.covariates, expected
                ),
            });
        }
        for (name, params, allow_empty) in [("lambda", &self.lambda, false), ("rho", &self.rho, true)]
        {
            let count = params.coefficients.len();
            if count != expected.len() && !(allow_empty && count == 0) {
                return Err(ArtifactError::FeatureCount {
                    artifact: ARTIFACT,
                    expected: expected.len(),
                    found: count,
                });
            }
            let all_finite = params.intercept.is_finite()
                && params.coefficients.iter().all(|c| c.is_finite());
            if !all_finite {
                return Err(ArtifactError::Malformed {
                    artifact: ARTIFACT,
                    reason: format!("{name} parameters contain non-finite values"),
                });
            }
        }
        Ok(())
    }

    pub fn covariates(&self) -> &[String] {
        &self.covariates
    }

    pub fn lambda(&self) -> &LinearPredictorParams {
        &self.lambda
    }

    pub fn rho(&self) -> &LinearPredictorParams {
        &self.rho
    }

    /// Evaluates both distribution parameters for one covariate vector.
    ///
    /// Overflow is not clamped: an infinite or NaN parameter flows through to the
    /// median so the caller can report it.
    pub fn parameters(&self, features: &DerivedFeatureVector) -> WeibullParameters {
        let x = features.as_array();
        WeibullParameters {
            scale: self.lambda.linear_predictor(&x).exp(),
            shape: self.rho.linear_predictor(&x).exp(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let model: Self = load_toml(path.as_ref())?;
        model.validate()?;
        Ok(model)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ArtifactError> {
        save_toml(self, path.as_ref())
    }
}

impl SurvivalModel for WeibullAftModel {
    fn median_survival_time(&self, features: &DerivedFeatureVector) -> Result<f64, ModelError> {
        let params = self.parameters(features);
        log::debug!(
            "Weibull parameters: lambda = {:.6}, rho = {:.6}",
            params.scale,
            params.shape
        );
        Ok(params.inverse_survival(0.5))
    }

    fn survival_curve(
        &self,
        features: &DerivedFeatureVector,
        times: ArrayView1<'_, f64>,
    ) -> Result<SurvivalCurve, ModelError> {
        validate_time_grid(times)?;
        let params = self.parameters(features);
        let probabilities = times.mapv(|t| params.survival(t));
        SurvivalCurve::new(times.to_owned(), probabilities)
    }
}
