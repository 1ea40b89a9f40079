//! Imperial/metric height conversion

pub const MM_PER_INCH: f64 = 25.4;
pub const INCHES_PER_FOOT: f64 = 12.0;
const SNAP_EPSILON: f64 = 1e-9;

/// Split a millimetre length into whole feet and the remaining inches.
///
/// Inches are in `[0, 12)`. Negative input clamps to zero.
pub fn mm_to_feet_and_inches(mm: f64) -> (u32, f64) {
    let total_inches = snap_whole_inches((mm / MM_PER_INCH).max(0.0));
    let feet = (total_inches / INCHES_PER_FOOT).floor();
    let inches = total_inches % INCHES_PER_FOOT;
    (feet as u32, inches)
}

/// Pull values within float noise of a whole inch onto it, so that
/// `mm_from(1, 0.0)` reads back as one foot rather than 0' 11.999..."
fn snap_whole_inches(inches: f64) -> f64 {
    let nearest = inches.round();
    if (inches - nearest).abs() < SNAP_EPSILON {
        nearest
    } else {
        inches
    }
}

/// Inverse of [`mm_to_feet_and_inches`]
pub fn mm_from(feet: u32, inches: f64) -> f64 {
    (f64::from(feet) * INCHES_PER_FOOT + inches) * MM_PER_INCH
}
