//! Fixed-point money arithmetic: amounts are signed integers in minor units
//! (cents for USD, whole yen for JPY). No floating point anywhere in this module.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MoneyError {
    #[error("amounts use different currencies: {0} vs {1}")]
    CurrencyMismatch(String, String),

    #[error("amount must be non-negative")]
    NegativeAmount,

    #[error("exact split amounts ({exact}) exceed total ({total})")]
    ExactExceedsTotal { exact: i64, total: i64 },

    #[error("cannot split among zero parties")]
    EmptySplit,

    #[error("invalid amount string: {0}")]
    InvalidAmountString(String),

    #[error("unknown currency code: {0}")]
    UnknownCurrency(String),
}

pub type MoneyResult<T> = Result<T, MoneyError>;

/// Decimal places for a currency's minor unit. Unknown codes default to 2 and
/// are accepted (callers may be passing a currency this registry hasn't been
/// told about yet) but should be logged by the caller.
pub fn decimals_for(currency: &str) -> u32 {
    match currency {
        "JPY" | "KRW" | "VND" | "CLP" => 0,
        "BHD" | "KWD" | "OMR" | "TND" => 3,
        _ => 2,
    }
}

fn pow10(n: u32) -> i64 {
    10i64.pow(n)
}

/// Round half-to-even to the currency's minor-unit precision. Amounts are
/// already integers in minor units internally, so this is only meaningful
/// when collapsing a higher-precision intermediate (e.g. basis-point math)
/// down to the currency's native precision; kept for completeness and used
/// by callers that compute provisional shares at finer grain.
pub fn round_half_to_even(numerator: i64, denominator: i64) -> i64 {
    if denominator == 0 {
        return 0;
    }
    let quotient = numerator.div_euclid(denominator);
    let remainder = numerator.rem_euclid(denominator);
    let twice = remainder * 2;
    if twice < denominator {
        quotient
    } else if twice > denominator {
        quotient + 1
    } else if quotient % 2 == 0 {
        quotient
    } else {
        quotient + 1
    }
}

fn require_non_negative(amount: i64) -> MoneyResult<()> {
    if amount < 0 {
        Err(MoneyError::NegativeAmount)
    } else {
        Ok(())
    }
}

/// Splits `total` into `n` amounts whose sum is exactly `total`. The first
/// `total mod n` parties (by index) receive one extra minor unit. Callers
/// must pass splits in canonical member order so the allocation is
/// deterministic and reproducible.
pub fn split_even(total: i64, n: usize) -> MoneyResult<Vec<i64>> {
    require_non_negative(total)?;
    if n == 0 {
        return Err(MoneyError::EmptySplit);
    }
    let n_i64 = n as i64;
    let base = total / n_i64;
    let remainder = (total % n_i64) as usize;
    Ok((0..n)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect())
}

/// Splits `total` by `weights` using integer math: provisional shares are
/// `floor(total * w_i / sum_w)`, then the residual `total - sum(floors)` is
/// distributed one minor unit at a time to the parties with the largest
/// fractional remainder, ties broken by index.
pub fn split_weighted(total: i64, weights: &[i64]) -> MoneyResult<Vec<i64>> {
    require_non_negative(total)?;
    if weights.is_empty() {
        return Err(MoneyError::EmptySplit);
    }
    let sum_weights: i64 = weights.iter().sum();
    if sum_weights <= 0 {
        return Err(MoneyError::EmptySplit);
    }

    let mut shares = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    let mut allocated = 0i64;

    for &w in weights {
        let numerator = total * w;
        let floor_share = numerator / sum_weights;
        let remainder = numerator % sum_weights;
        shares.push(floor_share);
        remainders.push(remainder);
        allocated += floor_share;
    }

    let mut leftover = total - allocated;

    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|&a, &b| remainders[b].cmp(&remainders[a]).then(a.cmp(&b)));

    let mut idx = 0;
    while leftover > 0 && !order.is_empty() {
        let i = order[idx % order.len()];
        shares[i] += 1;
        leftover -= 1;
        idx += 1;
    }

    Ok(shares)
}

/// Distributes `total` where `exact_sum` is already claimed by exact-mode
/// parties; the residual `total - exact_sum` is split among
/// `other_weights` by `split_weighted`. Fails if `exact_sum > total`.
pub fn split_exact_plus_remainder(
    total: i64,
    exact_sum: i64,
    other_weights: &[i64],
) -> MoneyResult<Vec<i64>> {
    require_non_negative(total)?;
    require_non_negative(exact_sum)?;
    if exact_sum > total {
        return Err(MoneyError::ExactExceedsTotal {
            exact: exact_sum,
            total,
        });
    }
    let residual = total - exact_sum;
    if other_weights.is_empty() {
        return Ok(Vec::new());
    }
    split_weighted(residual, other_weights)
}

/// Parses a decimal string (e.g. "12.34") into minor units for `currency`.
pub fn parse_amount(input: &str, currency: &str) -> MoneyResult<i64> {
    let decimals = decimals_for(currency);
    let trimmed = input.trim();
    let negative = trimmed.starts_with('-');
    let unsigned = trimmed.trim_start_matches('-');

    let mut parts = unsigned.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next().unwrap_or("");

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(MoneyError::InvalidAmountString(input.to_string()));
    }
    if !int_part.chars().all(|c| c.is_ascii_digit()) && !int_part.is_empty() {
        return Err(MoneyError::InvalidAmountString(input.to_string()));
    }
    if !frac_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(MoneyError::InvalidAmountString(input.to_string()));
    }
    if frac_part.len() > decimals as usize {
        return Err(MoneyError::InvalidAmountString(input.to_string()));
    }

    let int_value: i64 = if int_part.is_empty() {
        0
    } else {
        int_part
            .parse()
            .map_err(|_| MoneyError::InvalidAmountString(input.to_string()))?
    };

    let padded_frac = format!("{:0<width$}", frac_part, width = decimals as usize);
    let frac_value: i64 = if decimals == 0 {
        0
    } else {
        padded_frac
            .parse()
            .map_err(|_| MoneyError::InvalidAmountString(input.to_string()))?
    };

    let minor = int_value * pow10(decimals) + frac_value;
    Ok(if negative { -minor } else { minor })
}

/// Formats minor units as a decimal string with exactly `decimals_for(currency)`
/// fractional digits.
pub fn format_amount(minor_units: i64, currency: &str) -> String {
    let decimals = decimals_for(currency) as usize;
    if decimals == 0 {
        return minor_units.to_string();
    }
    let scale = pow10(decimals as u32);
    let negative = minor_units < 0;
    let abs = minor_units.unsigned_abs() as i64;
    let int_part = abs / scale;
    let frac_part = abs % scale;
    let sign = if negative { "-" } else { "" };
    format!("{}{}.{:0width$}", sign, int_part, frac_part, width = decimals)
}

pub fn same_currency(a: &str, b: &str) -> MoneyResult<()> {
    if a != b {
        Err(MoneyError::CurrencyMismatch(a.to_string(), b.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_even_distributes_remainder_to_leading_indices() {
        let shares = split_even(100, 3).unwrap();
        assert_eq!(shares, vec![34, 33, 33]);
        assert_eq!(shares.iter().sum::<i64>(), 100);
    }

    #[test]
    fn split_even_one_cent_among_three() {
        let shares = split_even(1, 3).unwrap();
        assert_eq!(shares, vec![1, 0, 0]);
    }

    #[test]
    fn split_even_jpy_no_fractional_unit() {
        // 100 JPY among 3 people: everything stays integer yen.
        let shares = split_even(100, 3).unwrap();
        assert_eq!(shares.iter().sum::<i64>(), 100);
    }

    #[test]
    fn split_weighted_equal_weights_matches_scenario_3() {
        // A pays $10.00 (1000 cents), weighted 1:1:1. A's own share is 334
        // by largest-remainder-by-index (ties broken toward lower index).
        let shares = split_weighted(1000, &[1, 1, 1]).unwrap();
        assert_eq!(shares, vec![334, 333, 333]);
        assert_eq!(shares.iter().sum::<i64>(), 1000);
    }

    #[test]
    fn split_weighted_proportional() {
        let shares = split_weighted(100, &[1, 3]).unwrap();
        assert_eq!(shares.iter().sum::<i64>(), 100);
        assert!(shares[1] > shares[0]);
    }

    #[test]
    fn split_exact_plus_remainder_distributes_residual() {
        let shares = split_exact_plus_remainder(1000, 400, &[1, 1]).unwrap();
        assert_eq!(shares.iter().sum::<i64>(), 600);
    }

    #[test]
    fn split_exact_plus_remainder_fails_when_exact_exceeds_total() {
        let result = split_exact_plus_remainder(100, 200, &[1]);
        assert!(matches!(result, Err(MoneyError::ExactExceedsTotal { .. })));
    }

    #[test]
    fn round_trip_parse_format() {
        for raw in ["0.01", "100.00", "12.34", "0.00", "9999999.99"] {
            let parsed = parse_amount(raw, "USD").unwrap();
            let formatted = format_amount(parsed, "USD");
            assert_eq!(formatted, raw);
        }
    }

    #[test]
    fn round_trip_parse_format_jpy() {
        for raw in ["0", "100", "12"] {
            let parsed = parse_amount(raw, "JPY").unwrap();
            assert_eq!(format_amount(parsed, "JPY"), raw);
        }
    }

    #[test]
    fn parse_amount_rejects_too_many_fractional_digits() {
        assert!(parse_amount("1.234", "USD").is_err());
    }

    #[test]
    fn parse_amount_rejects_garbage() {
        assert!(parse_amount("not-a-number", "USD").is_err());
    }

    #[test]
    fn format_amount_pads_fractional_digits() {
        assert_eq!(format_amount(5, "USD"), "0.05");
        assert_eq!(format_amount(100, "USD"), "1.00");
    }

    #[test]
    fn same_currency_rejects_mismatch() {
        assert!(same_currency("USD", "EUR").is_err());
        assert!(same_currency("USD", "USD").is_ok());
    }

    #[test]
    fn split_weighted_single_party_gets_everything() {
        let shares = split_weighted(999, &[1]).unwrap();
        assert_eq!(shares, vec![999]);
    }
}
