use crate::artifacts::{ArtifactError, FeatureScaler, StageEncoder};
use crate::estimate::EstimationError;
use crate::types::{DerivedFeatureVector, RawClinicalInput};
use ndarray::array;

/// Maps raw clinical inputs into the covariate space of the survival model.
///
/// The steps are:
/// 1. BMI from weight and height.
/// 2. Tumor stage collapsed to `I-II`, `III` or `IV` and ordinal-encoded.
/// 3. `[age, BMI]` standardized jointly by the fitted scaler.
/// 4. Polynomial terms built from the standardized values.
///
/// Pure: the same input and artifacts always produce a bit-identical vector.
pub fn transform(
    raw: &RawClinicalInput,
    scaler: &dyn FeatureScaler,
    encoder: &dyn StageEncoder,
) -> Result<DerivedFeatureVector, EstimationError> {
    raw.validate()?;

    let bmi = raw.bmi();
    let stage_group = raw.tumor_stage().group();
    let tumor_stage_code = encoder.encode_category(stage_group.label())?;

    let numeric = array![f64::from(raw.age_years()), bmi];
    let standardized = scaler.transform_numeric(numeric.view())?;
    if standardized.len() != numeric.len() {
        return Err(ArtifactError::FeatureCount {
            artifact: "standard scaler output",
            expected: numeric.len(),
            found: standardized.len(),
        }
        .into());
    }
    let age_std = standardized[0];
    let bmi_std = standardized[1];
    if !(age_std.is_finite() && bmi_std.is_finite() && tumor_stage_code.is_finite()) {
        return Err(EstimationError::ArtifactMismatch(format!(
            "Fitted artifacts produced non-finite covariates (age {age_std}, BMI {bmi_std}, stage {tumor_stage_code})."
        )));
    }

    let age_squared = age_std * age_std;
    let features = DerivedFeatureVector {
        age_std,
        bmi_std,
        tumor_stage_code,
        bmi_squared: bmi_std * bmi_std,
        age_squared,
        age_cubed: age_std * age_squared,
    };

    log::debug!(
        "Derived features for stage {} (group {}), BMI {:.3}: {:?}",
        raw.tumor_stage(),
        stage_group.label(),
        bmi,
        features
    );
    Ok(features)
}
