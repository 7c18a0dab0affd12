//! Small numeric helpers shared by the scoring stages.

/// Returns the index of the maximum element in a slice.
///
/// # Panics
///
/// If the input slice is empty this function will panic.
#[inline]
#[must_use]
pub fn argmax(v: &[f32]) -> usize {
    let mut max_index = 0;
    let mut max_value = v[0];

    for (i, &value) in v.iter().enumerate().skip(1) {
        if value > max_value {
            max_index = i;
            max_value = value;
        }
    }

    max_index
}

/// Returns the softmax of a slice.
///
/// The row maximum is subtracted before exponentiating, so large finite
/// scores do not overflow `exp` into infinity.
#[inline]
#[must_use]
pub fn softmax(v: &[f32]) -> Vec<f32> {
    let max = v.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps = v.iter().map(|f| (f - max).exp()).collect::<Vec<_>>();

    let sum: f32 = exps.iter().sum();
    exps.iter().map(|x| x / sum).collect()
}
