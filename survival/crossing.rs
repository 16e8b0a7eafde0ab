use crate::types::SurvivalCurve;

/// Earliest grid time whose survival probability is at or below `threshold`.
///
/// The grid is scanned forward and the first hit wins. The model curve is only
/// approximately monotone once sampled, so a bisection could skip the true first
/// crossing when there is local noise near the threshold.
///
/// `None` means the threshold is not reached on the grid; it is not an error.
pub fn find_crossing(curve: &SurvivalCurve, threshold: f64) -> Option<f64> {
    curve
        .points()
        .find(|&(_, probability)| probability <= threshold)
        .map(|(time, _)| time)
}
