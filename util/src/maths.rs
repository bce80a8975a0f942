//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Clamp a value into the range `[min, max]`.
pub fn clamp<T>(value: T, min: T, max: T) -> T
where
    T: Float
{
    let mut ret = value;

    if ret > max {
        ret = max
    }
    if ret < min {
        ret = min
    }

    ret
}

/// Clamp a value into the symmetric range `[-limit, limit]`.
pub fn clip<T>(value: T, limit: T) -> T
where
    T: Float
{
    clamp(value, -limit, limit)
}

/// Sign of a value as `-1`, `0` or `1`.
///
/// Unlike `Float::signum` zero maps to zero, so that a stationary joint has
/// no direction.
pub fn sgn<T>(value: T) -> T
where
    T: Float
{
    if value > T::zero() {
        T::one()
    }
    else if value < T::zero() {
        -T::one()
    }
    else {
        T::zero()
    }
}

/// Wrap an angle which is at most one turn outside of `(-pi, pi]` back into
/// that range.
pub fn wrap_pi<T>(angle: T) -> T
where
    T: Float
{
    let pi_t: T = T::from(std::f64::consts::PI).unwrap_or_else(T::zero);
    let tau_t = pi_t + pi_t;

    if angle > pi_t {
        angle - tau_t
    }
    else if angle > -pi_t {
        angle
    }
    else {
        angle + tau_t
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const PI: f64 = std::f64::consts::PI;

    #[test]
    fn test_clip() {
        assert_eq!(clip(2.0, 1.0), 1.0);
        assert_eq!(clip(-2.0, 1.0), -1.0);
        assert_eq!(clip(0.3, 1.0), 0.3);
        assert_eq!(clamp(-0.5, 0.0, 1.0), 0.0);
    }

    #[test]
    fn test_sgn() {
        assert_eq!(sgn(3.0), 1.0);
        assert_eq!(sgn(-0.1), -1.0);
        assert_eq!(sgn(0.0), 0.0);
    }

    #[test]
    fn test_wrap_pi() {
        assert_eq!(wrap_pi(0.5), 0.5);
        assert_eq!(wrap_pi(PI), PI);
        assert!((wrap_pi(1.5 * PI) + 0.5 * PI).abs() < 1e-12);
        assert!((wrap_pi(-1.5 * PI) - 0.5 * PI).abs() < 1e-12);
        assert!((wrap_pi(-PI) - PI).abs() < 1e-12);
    }
}
