//! Tests for the amount helpers used by the posting rules

use core_kernel::amount::{allocate_by_ratios, allocate_pro_rata, floor_at_zero, round_amount, CURRENCY_SCALE};
use core_kernel::AmountError;
use rust_decimal_macros::dec;

mod allocation {
    use super::*;

    #[test]
    fn test_shipping_split_by_line_cost() {
        let shares = allocate_by_ratios(dec!(60), &[dec!(100), dec!(200), dec!(300)], CURRENCY_SCALE).unwrap();
        assert_eq!(shares, vec![dec!(10), dec!(20), dec!(30)]);
        assert_eq!(shares.iter().sum::<rust_decimal::Decimal>(), dec!(60));
    }

    #[test]
    fn test_single_weight_takes_everything() {
        let shares = allocate_by_ratios(dec!(12.34), &[dec!(7)], CURRENCY_SCALE).unwrap();
        assert_eq!(shares, vec![dec!(12.34)]);
    }

    #[test]
    fn test_zero_total_allocates_zeros() {
        let shares = allocate_by_ratios(dec!(0), &[dec!(1), dec!(3)], CURRENCY_SCALE).unwrap();
        assert_eq!(shares, vec![dec!(0), dec!(0)]);
    }

    #[test]
    fn test_empty_weights_rejected() {
        assert!(matches!(
            allocate_by_ratios(dec!(1), &[], CURRENCY_SCALE),
            Err(AmountError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_pro_rata_guards_division_by_zero() {
        assert_eq!(allocate_pro_rata(dec!(60), &[dec!(0)], CURRENCY_SCALE), vec![dec!(0)]);
    }
}

mod rounding_and_floor {
    use super::*;

    #[test]
    fn test_round_amount_four_places() {
        assert_eq!(round_amount(dec!(1.23456)), dec!(1.2346));
    }

    #[test]
    fn test_floor_at_zero_clamps_over_reversal() {
        assert_eq!(floor_at_zero(dec!(5) - dec!(8)), dec!(0));
    }
}
