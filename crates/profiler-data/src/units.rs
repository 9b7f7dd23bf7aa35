//! Wei/gwei/ether conversions with exact integer arithmetic.

use alloy::primitives::U256;

pub const WEI_PER_GWEI: u64 = 1_000_000_000;
pub const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;

/// Formats wei as an exact decimal ether string without trailing zeros.
///
/// - `1_500_000_000_000_000_000` -> `"1.5"`
/// - `0` -> `"0"`
/// - `1` -> `"0.000000000000000001"`
pub fn format_ether(wei: U256) -> String {
    let unit = U256::from(WEI_PER_ETH);
    let whole = wei / unit;
    let fractional = (wei % unit).to::<u64>();
    if fractional == 0 {
        return whole.to_string();
    }
    let digits = format!("{fractional:018}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

/// Average gas price in gwei with four decimals, rounded half-up.
///
/// Computed from the raw wei sum at the end of a run so no rounding
/// accumulates while blocks are merged. Returns `"0"` for an empty type.
pub fn format_gwei_average(gas_price_wei_sum: U256, count: u64) -> String {
    if count == 0 {
        return "0".to_string();
    }
    let denom = U256::from(count) * U256::from(WEI_PER_GWEI);
    let scaled = (gas_price_wei_sum.saturating_mul(U256::from(10_000u64)) + denom / U256::from(2u64))
        / denom;
    let whole = scaled / U256::from(10_000u64);
    let fractional = (scaled % U256::from(10_000u64)).to::<u64>();
    format!("{whole}.{fractional:04}")
}

/// Whole-gwei average, rounded half-up. Used where a coarse figure is enough.
pub fn gwei_average(gas_price_wei_sum: U256, count: u64) -> u64 {
    if count == 0 {
        return 0;
    }
    let denom = U256::from(count) * U256::from(WEI_PER_GWEI);
    let avg = (gas_price_wei_sum + denom / U256::from(2u64)) / denom;
    avg.saturating_to::<u64>()
}

/// Parses a non-negative decimal string into an integer scaled by `10^decimals`.
///
/// Extra fractional digits beyond `decimals` are truncated. Returns `None`
/// for anything that is not a plain decimal number.
pub fn parse_scaled_decimal(text: &str, decimals: usize) -> Option<U256> {
    let text = text.trim();
    let (whole, fraction) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let whole = if whole.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole, 10).ok()?
    };
    let mut fraction: String = fraction.chars().take(decimals).collect();
    while fraction.len() < decimals {
        fraction.push('0');
    }
    let fraction = if fraction.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(&fraction, 10).ok()?
    };

    let scale = U256::from(10u64).pow(U256::from(decimals));
    whole.checked_mul(scale)?.checked_add(fraction)
}

/// Inverse of [`format_ether`].
pub fn parse_ether(text: &str) -> Option<U256> {
    parse_scaled_decimal(text, 18)
}
