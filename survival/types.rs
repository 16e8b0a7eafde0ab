// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

use crate::estimate::EstimationError;
use crate::model::ModelError;
use ndarray::{Array1, ArrayView1, array};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Accepted age range in completed years.
pub const AGE_RANGE_YEARS: RangeInclusive<u32> = 38..=90;
/// Accepted body weight range in kilograms.
pub const WEIGHT_RANGE_KG: RangeInclusive<f64> = 30.0..=200.0;
/// Accepted height range in meters.
pub const HEIGHT_RANGE_M: RangeInclusive<f64> = 1.0..=2.5;

/// AJCC tumor stage as collected from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TumorStage {
    I,
    II,
    III,
    IV,
}

impl TumorStage {
    pub const ALL: [TumorStage; 4] = [Self::I, Self::II, Self::III, Self::IV];

    /// Collapses the stage into the grouping the ordinal encoder was fitted on.
    /// Stages I and II share one category.
    pub fn group(self) -> StageGroup {
        match self {
            Self::I | Self::II => StageGroup::Early,
            Self::III => StageGroup::III,
            Self::IV => StageGroup::IV,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::I => "I",
            Self::II => "II",
            Self::III => "III",
            Self::IV => "IV",
        }
    }
}

impl fmt::Display for TumorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TumorStage {
    type Err = EstimationError;

    /// Accepts roman numerals (`"III"`) or the numeric form (`"3"`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let stage = match trimmed.to_ascii_uppercase().as_str() {
            "I" | "1" => Self::I,
            "II" | "2" => Self::II,
            "III" | "3" => Self::III,
            "IV" | "4" => Self::IV,
            _ => {
                return Err(EstimationError::InvalidInput(format!(
                    "Unknown tumor stage '{trimmed}'. Expected I, II, III or IV (or 1-4)."
                )));
            }
        };
        Ok(stage)
    }
}

/// Reduced tumor-stage category seen by the ordinal encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageGroup {
    Early,
    III,
    IV,
}

impl StageGroup {
    pub const ALL: [StageGroup; 3] = [Self::Early, Self::III, Self::IV];

    /// The category label stored in the fitted encoder.
    pub fn label(self) -> &'static str {
        match self {
            Self::Early => "I-II",
            Self::III => "III",
            Self::IV => "IV",
        }
    }
}

/// The four raw clinical values collected for one patient.
///
/// Fields are private so that every instance has passed through [`RawClinicalInput::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RawClinicalInput {
    age_years: u32,
    weight_kg: f64,
    height_m: f64,
    tumor_stage: TumorStage,
}

impl RawClinicalInput {
    pub fn new(
        age_years: u32,
        weight_kg: f64,
        height_m: f64,
        tumor_stage: TumorStage,
    ) -> Result<Self, EstimationError> {
        let input = Self {
            age_years,
            weight_kg,
            height_m,
            tumor_stage,
        };
        input.validate()?;
        Ok(input)
    }

    /// Checks every value against its declared domain. NaN fails every range check.
    pub fn validate(&self) -> Result<(), EstimationError> {
        if !AGE_RANGE_YEARS.contains(&self.age_years) {
            return Err(EstimationError::InvalidInput(format!(
                "Age {} is outside the accepted range of {}-{} years.",
                self.age_years,
                AGE_RANGE_YEARS.start(),
                AGE_RANGE_YEARS.end()
            )));
        }
        if !WEIGHT_RANGE_KG.contains(&self.weight_kg) {
            return Err(EstimationError::InvalidInput(format!(
                "Weight {} kg is outside the accepted range of {:.1}-{:.1} kg.",
                self.weight_kg,
                WEIGHT_RANGE_KG.start(),
                WEIGHT_RANGE_KG.end()
            )));
        }
        if !HEIGHT_RANGE_M.contains(&self.height_m) {
            return Err(EstimationError::InvalidInput(format!(
                "Height {} m is outside the accepted range of {:.2}-{:.2} m.",
                self.height_m,
                HEIGHT_RANGE_M.start(),
                HEIGHT_RANGE_M.end()
            )));
        }
        Ok(())
    }

    pub fn age_years(&self) -> u32 {
        self.age_years
    }

    pub fn weight_kg(&self) -> f64 {
        self.weight_kg
    }

    pub fn height_m(&self) -> f64 {
        self.height_m
    }

    pub fn tumor_stage(&self) -> TumorStage {
        self.tumor_stage
    }

    /// Body-mass index, `weight / height^2`.
    #[inline]
    pub fn bmi(&self) -> f64 {
        self.weight_kg / (self.height_m * self.height_m)
    }
}

/// The standardized covariate vector the survival model was fitted on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedFeatureVector {
    pub age_std: f64,
    pub bmi_std: f64,
    pub tumor_stage_code: f64,
    pub bmi_squared: f64,
    pub age_squared: f64,
    pub age_cubed: f64,
}

impl DerivedFeatureVector {
    /// Covariate names in the exact column order used at fit time.
    pub const FEATURE_NAMES: [&'static str; 6] = [
        "age",
        "BMI",
        "tumor_stage",
        "BMI_squared",
        "age_squared",
        "age_cubed",
    ];

    pub fn as_array(&self) -> Array1<f64> {
        array![
            self.age_std,
            self.bmi_std,
            self.tumor_stage_code,
            self.bmi_squared,
            self.age_squared,
            self.age_cubed
        ]
    }
}

/// Survival probabilities sampled on an ordered time grid (months).
#[derive(Debug, Clone, PartialEq)]
pub struct SurvivalCurve {
    times: Array1<f64>,
    probabilities: Array1<f64>,
}

impl SurvivalCurve {
    /// Pairs a time grid with its survival probabilities. Every probability must lie in `[0, 1]`.
    pub fn new(times: Array1<f64>, probabilities: Array1<f64>) -> Result<Self, ModelError> {
        if times.len() != probabilities.len() {
            return Err(ModelError::CurveLengthMismatch {
                times: times.len(),
                probabilities: probabilities.len(),
            });
        }
        for (&time, &value) in times.iter().zip(probabilities.iter()) {
            if !(0.0..=1.0).contains(&value) {
                return Err(ModelError::ProbabilityOutOfRange { time, value });
            }
        }
        Ok(Self {
            times,
            probabilities,
        })
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> ArrayView1<'_, f64> {
        self.times.view()
    }

    pub fn probabilities(&self) -> ArrayView1<'_, f64> {
        self.probabilities.view()
    }

    /// `(time, probability)` pairs in increasing time order.
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.times
            .iter()
            .copied()
            .zip(self.probabilities.iter().copied())
    }
}

/// Outcome of a successful estimation for one patient.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EstimationResult {
    /// Median survival time in months.
    pub median_survival_time: f64,
    /// Survival probability used for the crossing search.
    pub threshold: f64,
    /// First grid time at which survival drops to `threshold` or below, if any.
    pub threshold_crossing_time: Option<f64>,
}

impl EstimationResult {
    pub fn median_survival_years(&self) -> f64 {
        self.median_survival_time / 12.0
    }
}
