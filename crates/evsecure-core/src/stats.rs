//! Small float helpers shared by the analyzers and scorers.

/// Arithmetic mean, 0 for an empty input.
pub(crate) fn mean(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, count) = values.fold((0.0f32, 0u32), |(s, n), v| (s + v, n + 1));
    if count == 0 { 0.0 } else { sum / count as f32 }
}

/// Population variance, 0 for an empty input.
pub(crate) fn variance(values: impl Iterator<Item = f32> + Clone) -> f32 {
    let m = mean(values.clone());
    mean(values.map(|v| (v - m) * (v - m)))
}

pub(crate) fn std_dev(values: impl Iterator<Item = f32> + Clone) -> f32 {
    libm::sqrtf(variance(values))
}

/// Clamp into the unit interval. NaN maps to 1.0 so scores fail towards danger.
pub(crate) fn unit(value: f32) -> f32 {
    if value.is_nan() { 1.0 } else { value.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_variance() {
        let values = [2.0f32, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(values.iter().copied()), 5.0);
        assert_eq!(variance(values.iter().copied()), 4.0);
        assert_eq!(std_dev(values.iter().copied()), 2.0);
    }

    #[test]
    fn test_empty_inputs_are_zero() {
        assert_eq!(mean(core::iter::empty()), 0.0);
        assert_eq!(variance(core::iter::empty::<f32>()), 0.0);
    }

    #[test]
    fn test_unit_fails_high_on_nan() {
        assert_eq!(unit(f32::NAN), 1.0);
        assert_eq!(unit(-0.5), 0.0);
        assert_eq!(unit(1.5), 1.0);
        assert_eq!(unit(0.25), 0.25);
    }
}
