//! Candle TVWAP - time and volume weighted average over recent candles
//!
//! ```text
//! TVWAP = sum(price_i * volume_i * tw_i) / sum(volume_i * tw_i)
//! tw_i  = max(1 - (now - ts_i) / window, MIN_TIME_WEIGHT)
//! ```
//!
//! Candles outside `[now - window, now]` are ignored.

use rust_decimal::Decimal;

use crate::types::CandlePrice;

/// Floor for the weight of the oldest candles in the window (0.2)
pub const MIN_TIME_WEIGHT: Decimal = Decimal::from_parts(2, 0, 0, false, 1);

/// Time weight of a candle `age` seconds old inside a `window` second lookback
fn time_weight(age: i64, window: i64) -> Decimal {
    let decay = Decimal::from(age) / Decimal::from(window);
    (Decimal::ONE - decay).max(MIN_TIME_WEIGHT)
}

/// Compute the TVWAP of a candle set.
///
/// Returns `None` when no candle in the window carries volume, or when the
/// weighted sums overflow.
pub fn compute_tvwap<'a, I>(candles: I, now: i64, window: i64) -> Option<Decimal>
where
    I: IntoIterator<Item = &'a CandlePrice>,
{
    if window <= 0 {
        return None;
    }

    let mut weighted_sum = Decimal::ZERO;
    let mut total_weight = Decimal::ZERO;

    for candle in candles {
        let age = now - candle.timestamp;
        if age < 0 || age > window {
            continue;
        }
        if candle.volume.is_sign_negative() || candle.price.is_sign_negative() {
            continue;
        }

        let weight = candle.volume.checked_mul(time_weight(age, window))?;
        weighted_sum = weighted_sum.checked_add(candle.price.checked_mul(weight)?)?;
        total_weight = total_weight.checked_add(weight)?;
    }

    if total_weight.is_zero() {
        return None;
    }

    weighted_sum.checked_div(total_weight)
}
