// navfuse_core/src/utils/angles.rs

//! Angle helpers shared by the vehicle models and the map matcher.

use num_traits::{Float, FloatConst};

/// Wraps an angle into the half-open interval `(-π, π]`.
pub fn wrap_angle<T: Float + FloatConst>(angle: T) -> T {
    let pi = T::PI();
    let two_pi = pi + pi;
    let mut shifted = (angle + pi) % two_pi;
    // `%` keeps the sign of the dividend, so negative inputs land in (-2π, 0].
    if shifted <= T::zero() {
        shifted = shifted + two_pi;
    }
    shifted - pi
}

/// Signed shortest rotation taking `from` onto `to`, in `(-π, π]`.
pub fn angle_diff<T: Float + FloatConst>(to: T, from: T) -> T {
    wrap_angle(to - from)
}

/// Angular distance between two *undirected* lines, in `[0, π/2]`.
///
/// A road can be driven both ways, so a vehicle heading of 175° is
/// perfectly aligned with a segment whose `theta` is -5°.
pub fn line_angle_distance<T: Float + FloatConst>(a: T, b: T) -> T {
    let d = angle_diff(a, b).abs();
    d.min(T::PI() - d)
}

/// Circular weighted mean of a set of angles.
/// Returns `None` when the weights cancel out (no dominant direction).
pub fn weighted_circular_mean<T, I>(angles: I) -> Option<T>
where
    T: Float + FloatConst,
    I: IntoIterator<Item = (T, T)>,
{
    let (mut sin_sum, mut cos_sum) = (T::zero(), T::zero());
    for (angle, weight) in angles {
        sin_sum = sin_sum + weight * angle.sin();
        cos_sum = cos_sum + weight * angle.cos();
    }
    if sin_sum == T::zero() && cos_sum == T::zero() {
        return None;
    }
    Some(sin_sum.atan2(cos_sum))
}
