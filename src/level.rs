use crate::li::Calibration;

/// RMS voltage to decibels relative to 1 V. Silence gives `-inf`.
pub fn dbv(rms: f64) -> f64 {
    20.0 * libm::log10(rms)
}

/// Sound pressure level for a microphone output level of `dbv`.
pub fn sound_level(dbv: f64, calibration: &Calibration) -> f64 {
    dbv + calibration.reference_level - calibration.sensitivity - calibration.gain
}

/// Energy of an interval of `duration_ms` at level `li`.
pub fn interval_energy(li: f64, duration_ms: f64) -> f64 {
    duration_ms * libm::pow(10.0, 0.1 * li)
}

/// Level of `energy` spread evenly over `window_ms`.
pub fn equivalent_level(energy: f64, window_ms: f64) -> f64 {
    10.0 * libm::log10(energy / window_ms)
}
