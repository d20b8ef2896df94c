use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

pub fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// `part / whole × 100`, or 0 when `whole` is zero.
pub fn percentage(part: Decimal, whole: Decimal) -> f64 {
    if whole.is_zero() {
        return 0.0;
    }
    decimal_to_f64(part / whole * Decimal::ONE_HUNDRED)
}

/// `count / total × 100`, or 0 when `total` is zero.
pub fn ratio_pct(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    count as f64 * 100.0 / total as f64
}

/// Arithmetic mean, or 0 for an empty input. Every element counts toward the
/// denominator.
pub fn mean(values: impl IntoIterator<Item = Decimal>) -> Decimal {
    let (sum, count) =
        values.into_iter().fold((Decimal::ZERO, 0u32), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        return Decimal::ZERO;
    }
    sum / Decimal::from(count)
}

/// Round half away from zero: 55.4 -> 55, 55.5 -> 56, -55.6 -> -56.
pub fn round_half_up(value: f64) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    let magnitude = (value.abs() + 0.5).floor() as i64;
    if value < 0.0 {
        -magnitude
    } else {
        magnitude
    }
}
