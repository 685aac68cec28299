// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use alloy::primitives::{U256, U512};

/// 1.0 in 18-decimal fixed point.
pub const ONE_18: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Scale a token-decimal amount up to 18-decimal fixed point.
/// Tokens with more than 18 decimals scale down instead.
pub fn scale_18(amount: U256, decimals: u8) -> U256 {
    match decimals.cmp(&18) {
        std::cmp::Ordering::Less => {
            amount.saturating_mul(U256::from(10u8).pow(U256::from(18 - decimals)))
        }
        std::cmp::Ordering::Equal => amount,
        std::cmp::Ordering::Greater => amount / U256::from(10u8).pow(U256::from(decimals - 18)),
    }
}

/// Truncate an 18-decimal amount back to token decimals. Inverse of
/// [`scale_18`] for `decimals <= 18`.
pub fn scale_from_18(amount: U256, decimals: u8) -> U256 {
    match decimals.cmp(&18) {
        std::cmp::Ordering::Less => amount / U256::from(10u8).pow(U256::from(18 - decimals)),
        std::cmp::Ordering::Equal => amount,
        std::cmp::Ordering::Greater => {
            amount.saturating_mul(U256::from(10u8).pow(U256::from(decimals - 18)))
        }
    }
}

fn narrow(wide: U512) -> U256 {
    if wide > U512::from(U256::MAX) {
        U256::MAX
    } else {
        U256::from(wide)
    }
}

/// `a * b / 1e18` with a 512-bit intermediate so the product never truncates.
pub fn mul_18(a: U256, b: U256) -> U256 {
    narrow(U512::from(a) * U512::from(b) / U512::from(ONE_18))
}

/// `a * 1e18 / b` with a 512-bit intermediate. Zero divisor yields zero.
pub fn div_18(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::ZERO;
    }
    narrow(U512::from(a) * U512::from(ONE_18) / U512::from(b))
}

/// `amount * num / den` with a 512-bit intermediate. Zero divisor yields zero.
pub fn mul_div(amount: U256, num: U256, den: U256) -> U256 {
    if den.is_zero() {
        return U256::ZERO;
    }
    narrow(U512::from(amount) * U512::from(num) / U512::from(den))
}

/// Render an 18-decimal fixed-point amount as a human decimal string.
pub fn format_18(amount: U256) -> String {
    let whole = amount / ONE_18;
    let frac = amount % ONE_18;
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac_str = format!("{:0>18}", frac.to_string());
    format!("{}.{}", whole, frac_str.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_round_trips_for_all_token_decimals() {
        let x = U256::from(123_456_789u64);
        for d in 0u8..=18 {
            assert_eq!(scale_from_18(scale_18(x, d), d), x, "decimals {d}");
        }
    }

    #[test]
    fn scale_18_matches_manual_usdc_case() {
        // 1.5 USDC (6 decimals) is 1.5e18 in fixed space.
        let usdc = U256::from(1_500_000u64);
        assert_eq!(
            scale_18(usdc, 6),
            U256::from(1_500_000_000_000_000_000u64)
        );
    }

    #[test]
    fn mul_18_keeps_precision_on_wide_products() {
        // (2^200) * 1e18 / 1e18 round-trips exactly through the 512-bit path.
        let big = U256::from(1u8) << 200usize;
        assert_eq!(mul_18(big, ONE_18), big);
    }

    #[test]
    fn div_18_inverts_mul_18() {
        let price = U256::from(500_000_000_000_000_000u64); // 0.5
        let amount = U256::from(4_000_000_000_000_000_000u64); // 4.0
        let out = mul_18(amount, price);
        assert_eq!(out, U256::from(2_000_000_000_000_000_000u64));
        assert_eq!(div_18(out, amount), price);
    }

    #[test]
    fn div_18_by_zero_is_zero() {
        assert_eq!(div_18(ONE_18, U256::ZERO), U256::ZERO);
    }

    #[test]
    fn format_18_trims_trailing_zeroes() {
        assert_eq!(format_18(U256::from(1_500_000_000_000_000_000u64)), "1.5");
        assert_eq!(format_18(ONE_18), "1");
        assert_eq!(format_18(U256::ZERO), "0");
    }
}
