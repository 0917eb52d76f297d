//! PID feedback around the force-to-angle plant.
//!
//! The loop is closed as `T = G / (1 + G K)`, computed directly on the
//! coefficient vectors. A controller that exactly cancels the plant leaves
//! an identically zero denominator, which surfaces as
//! [`Error::SingularDenominator`] instead of a division blowup later.

use nalgebra::DVector;

use crate::error::Result;
use crate::math::{convolve, polynomial_sum};
use crate::tf::TransferFunction;

/// `K(s) = (kd s^2 + kp s + ki) / s`
pub fn pid(kp: f64, ki: f64, kd: f64) -> TransferFunction {
    TransferFunction {
        num: DVector::from_vec(vec![kd, kp, ki]),
        den: DVector::from_vec(vec![1.0, 0.0]),
    }
}

/// Close the loop `T = G / (1 + G K)` for plant `G` and controller `K`.
pub fn feedback(
    plant: &TransferFunction,
    controller: &TransferFunction,
) -> Result<TransferFunction> {
    let num = convolve(&plant.num, &controller.den);
    let den = polynomial_sum(
        &convolve(&plant.den, &controller.den),
        &convolve(&plant.num, &controller.num),
    );
    TransferFunction::new(num, den)
}

/// Impulse response of `tf` on a uniform grid over `[t_start, t_end]`.
pub fn sample_impulse_response(
    tf: &TransferFunction,
    t_start: f64,
    t_end: f64,
    n_points: usize,
) -> Result<(DVector<f64>, DVector<f64>)> {
    assert!(n_points >= 2, "need at least two sample points");
    assert!(t_end > t_start, "time interval must be increasing");

    let dt = (t_end - t_start) / (n_points - 1) as f64;
    let t = DVector::from_fn(n_points, |i, _| t_start + i as f64 * dt);
    let y = tf.impulse_response(&t)?;

    Ok((t, y))
}

/// Convert a response in radians to degrees, element-wise.
pub fn to_degrees(y: &DVector<f64>) -> DVector<f64> {
    y.map(f64::to_degrees)
}
