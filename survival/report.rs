// ========================================================================================
//                          Rendering Results for the Caller
// ========================================================================================

use crate::config::EstimationConfig;
use crate::estimate::EstimationError;
use crate::types::{EstimationResult, SurvivalCurve};
use std::io;

/// `"48.00 months ~ 4.00 years"`.
pub fn format_months(months: f64) -> String {
    format!("{:.2} months ~ {:.2} years", months, months / 12.0)
}

/// The crossing time, or a note that the grid never reached the threshold.
pub fn crossing_text(result: &EstimationResult, config: &EstimationConfig) -> String {
    match result.threshold_crossing_time {
        Some(months) => format_months(months),
        None => format!(
            "Not reached within range ({}-{} months)",
            config.grid.start, config.grid.end
        ),
    }
}

/// A short, non-technical sentence for each failure kind.
pub fn user_message(err: &EstimationError) -> String {
    match err {
        EstimationError::InvalidInput(detail) => {
            format!("Some of the clinical values are not valid. {detail}")
        }
        EstimationError::ArtifactMismatch(_) => {
            "The prediction model is not installed correctly. Please contact the model administrator."
                .to_string()
        }
        EstimationError::InvalidPrediction { .. } => {
            "The prediction is invalid (infinite or not a number). Please check the values entered or contact the model administrator."
                .to_string()
        }
        EstimationError::EvaluationError(detail) => format!("Error: {detail}"),
    }
}

/// Text card shown after a successful estimate.
pub fn render_card(result: &EstimationResult, config: &EstimationConfig) -> String {
    format!(
        "Estimated median survival: {}\nTime to {:.0}% survival probability: {}\n",
        format_months(result.median_survival_time),
        result.threshold * 100.0,
        crossing_text(result, config)
    )
}

/// Writes the curve as tab-separated `months` / `survival` columns.
pub fn write_curve_tsv<W: io::Write>(curve: &SurvivalCurve, writer: W) -> Result<(), csv::Error> {
    let mut tsv = csv::WriterBuilder::new().delimiter(b'\t').from_writer(writer);
    tsv.write_record(["months", "survival"])?;
    for (time, probability) in curve.points() {
        tsv.write_record([time.to_string(), probability.to_string()])?;
    }
    tsv.flush()?;
    Ok(())
}
