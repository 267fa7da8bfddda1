//! Monetary arithmetic helpers.
//!
//! All currency figures are `Decimal` and are rounded to 2 places at the point
//! they are computed, half away from zero.

pub use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;

/// Round a currency figure to 2 decimal places (half away from zero).
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `value × percent / 100`, rounded as money.
pub fn percent_of(value: Decimal, percent: Decimal) -> Decimal {
    round_money(value * percent / Decimal::ONE_HUNDRED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_money(dec!(330.225)), dec!(330.23));
        assert_eq!(round_money(dec!(-330.225)), dec!(-330.23));
        assert_eq!(round_money(dec!(215.8333)), dec!(215.83));
        assert_eq!(round_money(dec!(4.3166)), dec!(4.32));
    }

    #[test]
    fn percent_of_rounds_result() {
        assert_eq!(percent_of(dec!(215.83), dec!(2)), dec!(4.32));
        assert_eq!(percent_of(dec!(100), dec!(0)), dec!(0));
    }
}
