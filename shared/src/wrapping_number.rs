/// Signed distance from `reference` to `value` on a ring of `max` values,
/// in `[-max/2, max/2)`. `max` must be a power of two.
///
/// # Examples
/// ```
/// # use repnet_shared::best_signed_difference;
/// assert_eq!(best_signed_difference(2, 1, 16384), 1);
/// assert_eq!(best_signed_difference(0, 16383, 16384), 1);
/// assert_eq!(best_signed_difference(16383, 0, 16384), -1);
/// ```
pub fn best_signed_difference(value: i32, reference: i32, max: u32) -> i32 {
    let max = max as i32;
    (value.wrapping_sub(reference).wrapping_add(max / 2) & (max - 1)) - max / 2
}

/// Expands a wrapped wire value into the full-width counter closest to
/// `reference`.
///
/// # Examples
/// ```
/// # use repnet_shared::make_relative;
/// assert_eq!(make_relative(3, 16383, 16384), 16387);
/// assert_eq!(make_relative(16380, 16385, 16384), 16380);
/// ```
pub fn make_relative(value: i32, reference: i32, max: u32) -> i32 {
    reference.wrapping_add(best_signed_difference(value, reference, max))
}
