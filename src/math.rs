//! Fixed-point arithmetic with 18 decimals.
//!
//! Units and multipliers are integers scaled by [`PRECISE_UNIT`]. Products of
//! two scaled values overflow 128 bits long before the quotient does, so
//! every `a * b / d` goes through a full 256-bit intermediate.
//!
//! Signed results round toward negative infinity: a slightly negative unit
//! stays negative instead of rounding up to zero.

/// 1.0 in 18-decimal fixed point.
pub const PRECISE_UNIT: i128 = 1_000_000_000_000_000_000;

/// [`PRECISE_UNIT`] as unsigned.
pub const PRECISE_UNIT_U: u128 = PRECISE_UNIT as u128;

/// Full 256-bit product of two `u128` values as `(hi, lo)`.
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = u64::MAX as u128;
    let (a_hi, a_lo) = (a >> 64, a & MASK);
    let (b_hi, b_lo) = (b >> 64, b & MASK);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    // < 3 * 2^64, cannot overflow
    let mid = (ll >> 64) + (lh & MASK) + (hl & MASK);
    let lo = (ll & MASK) | (mid << 64);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (hi, lo)
}

/// Divide a 256-bit value by `d`. `None` if `d == 0` or the quotient does
/// not fit in 128 bits.
fn div_rem_wide(hi: u128, lo: u128, d: u128) -> Option<(u128, u128)> {
    if d == 0 || hi >= d {
        return None;
    }
    if hi == 0 {
        return Some((lo / d, lo % d));
    }

    // Restoring long division over the low 128 bits; hi < d keeps the
    // quotient within 128 bits.
    let mut rem = hi;
    let mut quot = 0u128;
    for i in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> i) & 1);
        quot <<= 1;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            quot |= 1;
        }
    }
    Some((quot, rem))
}

/// `floor(a * b / d)` for unsigned values.
#[inline]
pub fn mul_div_floor_u(a: u128, b: u128, d: u128) -> Option<u128> {
    let (hi, lo) = widening_mul(a, b);
    div_rem_wide(hi, lo, d).map(|(q, _)| q)
}

/// `ceil(a * b / d)` for unsigned values.
#[inline]
pub fn mul_div_ceil_u(a: u128, b: u128, d: u128) -> Option<u128> {
    let (hi, lo) = widening_mul(a, b);
    let (q, r) = div_rem_wide(hi, lo, d)?;
    if r == 0 { Some(q) } else { q.checked_add(1) }
}

/// `a * b / d` rounded toward negative infinity.
pub fn mul_div_floor(a: i128, b: i128, d: i128) -> Option<i128> {
    let negative = (a < 0) ^ (b < 0) ^ (d < 0);
    let (hi, lo) = widening_mul(a.unsigned_abs(), b.unsigned_abs());
    let (q, r) = div_rem_wide(hi, lo, d.unsigned_abs())?;

    if negative {
        let magnitude = if r != 0 { q.checked_add(1)? } else { q };
        if magnitude > i128::MIN.unsigned_abs() {
            None
        } else {
            // magnitude == 2^127 wraps to i128::MIN, which is the exact value
            Some((magnitude as i128).wrapping_neg())
        }
    } else {
        i128::try_from(q).ok()
    }
}

/// `a * b / PRECISE_UNIT`, floored.
#[inline]
pub fn precise_mul(a: i128, b: i128) -> Option<i128> {
    mul_div_floor(a, b, PRECISE_UNIT)
}

/// `a * PRECISE_UNIT / b`, floored.
#[inline]
pub fn precise_div(a: i128, b: i128) -> Option<i128> {
    mul_div_floor(a, PRECISE_UNIT, b)
}

/// `a * b / PRECISE_UNIT`, floored, unsigned.
#[inline]
pub fn precise_mul_u(a: u128, b: u128) -> Option<u128> {
    mul_div_floor_u(a, b, PRECISE_UNIT_U)
}

/// `a * b / PRECISE_UNIT`, rounded up, unsigned.
#[inline]
pub fn precise_mul_ceil_u(a: u128, b: u128) -> Option<u128> {
    mul_div_ceil_u(a, b, PRECISE_UNIT_U)
}

/// `a * PRECISE_UNIT / b`, floored, unsigned.
#[inline]
pub fn precise_div_u(a: u128, b: u128) -> Option<u128> {
    mul_div_floor_u(a, PRECISE_UNIT_U, b)
}

/// Parse a decimal string such as `"60.869565780223716593"` into an integer
/// scaled by `10^decimals`. Extra fractional digits are rejected rather than
/// rounded.
pub fn parse_fixed(s: &str, decimals: u32) -> Option<i128> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (whole, frac) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if frac.len() > decimals as usize {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let scale = 10i128.checked_pow(decimals)?;
    let whole_value: i128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac_value: i128 = if frac.is_empty() {
        0
    } else {
        let padding = 10i128.checked_pow(decimals - frac.len() as u32)?;
        frac.parse::<i128>().ok()?.checked_mul(padding)?
    };

    let value = whole_value.checked_mul(scale)?.checked_add(frac_value)?;
    Some(if negative { -value } else { value })
}

/// Format an integer scaled by `10^decimals` as a decimal string, trimming
/// trailing fractional zeros.
pub fn format_fixed(value: i128, decimals: u32) -> String {
    let scale = 10u128.pow(decimals);
    let magnitude = value.unsigned_abs();
    let whole = magnitude / scale;
    let frac = magnitude % scale;
    let sign = if value < 0 { "-" } else { "" };

    if frac == 0 {
        return format!("{sign}{whole}");
    }
    let frac_str = format!("{frac:0width$}", width = decimals as usize);
    format!("{sign}{whole}.{}", frac_str.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precise_mul_basic() {
        assert_eq!(precise_mul(2 * PRECISE_UNIT, 3 * PRECISE_UNIT), Some(6 * PRECISE_UNIT));
        assert_eq!(precise_mul(PRECISE_UNIT / 2, 3), Some(1)); // 1.5 floored
    }

    #[test]
    fn negative_rounds_toward_negative_infinity() {
        assert_eq!(mul_div_floor(-3, 1, 2), Some(-2));
        assert_eq!(mul_div_floor(3, -1, 2), Some(-2));
        assert_eq!(mul_div_floor(-4, 1, 2), Some(-2));
        assert_eq!(mul_div_floor(-1, 1, PRECISE_UNIT), Some(-1));
        assert_eq!(mul_div_floor(1, 1, PRECISE_UNIT), Some(0));
    }

    #[test]
    fn wide_intermediate_does_not_overflow() {
        // 1e27 supply * 1e20 unit = 1e47, far beyond i128, but / 1e18 fits.
        let supply = 1_000_000_000 * PRECISE_UNIT;
        let unit = 100 * PRECISE_UNIT;
        assert_eq!(precise_mul(unit, supply), Some(100_000_000_000 * PRECISE_UNIT));
        assert_eq!(
            precise_mul_u(unit as u128, supply as u128),
            Some(100_000_000_000 * PRECISE_UNIT_U)
        );
    }

    #[test]
    fn quotient_overflow_is_none() {
        assert_eq!(mul_div_floor_u(u128::MAX, u128::MAX, 1), None);
        assert_eq!(mul_div_floor(i128::MAX, 2, 1), None);
        assert_eq!(mul_div_floor_u(1, 1, 0), None);
    }

    #[test]
    fn i128_min_is_representable() {
        assert_eq!(mul_div_floor(i128::MIN, 1, 1), Some(i128::MIN));
        assert_eq!(mul_div_floor(i128::MIN, -1, 1), None);
    }

    #[test]
    fn wide_division_matches_narrow() {
        let cases = [
            (u128::MAX / 3, 7u128, 11u128),
            (123_456_789_012_345_678_901_234_567, 98_765_432_109_876_543_210, 1_000_000_007),
            (u128::MAX, 2, u128::MAX),
        ];
        for (a, b, d) in cases {
            let got = mul_div_floor_u(a, b, d).unwrap();
            // Check q*d <= a*b < (q+1)*d via the widening product.
            let (hi, lo) = widening_mul(got, d);
            let (phi, plo) = widening_mul(a, b);
            assert!((hi, lo) <= (phi, plo));
            let (hi2, lo2) = widening_mul(got + 1, d);
            assert!((hi2, lo2) > (phi, plo));
        }
        assert_eq!(mul_div_floor_u(u128::MAX, 2, u128::MAX), Some(2));
    }

    #[test]
    fn ceil_rounds_up_only_on_remainder() {
        assert_eq!(mul_div_ceil_u(10, 1, 3), Some(4));
        assert_eq!(mul_div_ceil_u(9, 1, 3), Some(3));
        assert_eq!(precise_mul_ceil_u(1, 1), Some(1));
    }

    #[test]
    fn parse_fixed_values() {
        assert_eq!(
            parse_fixed("60.869565780223716593", 18),
            Some(60_869_565_780_223_716_593)
        );
        assert_eq!(parse_fixed("100", 18), Some(100 * PRECISE_UNIT));
        assert_eq!(parse_fixed("0.01111111", 8), Some(1_111_111));
        assert_eq!(parse_fixed("-1.5", 18), Some(-3 * PRECISE_UNIT / 2));
        assert_eq!(parse_fixed(".5", 1), Some(5));
        assert_eq!(parse_fixed("1.123", 2), None);
        assert_eq!(parse_fixed("abc", 18), None);
        assert_eq!(parse_fixed("", 18), None);
        assert_eq!(parse_fixed("1e5", 18), None);
    }

    #[test]
    fn format_fixed_values() {
        assert_eq!(format_fixed(100 * PRECISE_UNIT, 18), "100");
        assert_eq!(format_fixed(86_956_521_700_000_000_000, 18), "86.9565217");
        assert_eq!(format_fixed(-PRECISE_UNIT / 4, 18), "-0.25");
        assert_eq!(format_fixed(1, 18), "0.000000000000000001");
    }
}
