//! Property-Based Test Generators
//!
//! Proptest strategies for invoice amounts and line shapes. Quantities and
//! prices stay within the precision the ledger stores so generated postings
//! are comparable to hand-computed expectations.

use proptest::prelude::*;
use rust_decimal::Decimal;

use domain_posting::{LineType, MethodType};

/// Positive quantity with up to two decimal places (0.01 to 1000)
pub fn quantity_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..100_000i64).prop_map(|n| Decimal::new(n, 2))
}

/// Unit price with two decimal places (0.00 to 10000)
pub fn price_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..1_000_000i64).prop_map(|n| Decimal::new(n, 2))
}

/// Fractional tax rate (0 to 0.25)
pub fn tax_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..=2500i64).prop_map(|n| Decimal::new(n, 4))
}

/// Exchange rate into base currency (0.5 to 2)
pub fn exchange_rate_strategy() -> impl Strategy<Value = Decimal> {
    (5000i64..=20000i64).prop_map(|n| Decimal::new(n, 4))
}

/// Invoice-level shipping (0.00 to 500)
pub fn shipping_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..50_000i64).prop_map(|n| Decimal::new(n, 2))
}

pub fn line_type_strategy() -> impl Strategy<Value = LineType> {
    prop_oneof![
        4 => Just(LineType::Part),
        1 => Just(LineType::Material),
        1 => Just(LineType::Consumable),
        2 => Just(LineType::Service),
        1 => Just(LineType::Comment),
    ]
}

pub fn method_type_strategy() -> impl Strategy<Value = MethodType> {
    prop_oneof![Just(MethodType::Pick), Just(MethodType::Buy), Just(MethodType::Make)]
}

/// Shape of one generated invoice line
#[derive(Debug, Clone)]
pub struct LineShape {
    pub line_type: LineType,
    pub method_type: MethodType,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub tax_percent: Decimal,
    /// Whether the line is linked to a sales order line
    pub linked: bool,
}

pub fn line_shape_strategy() -> impl Strategy<Value = LineShape> {
    (
        line_type_strategy(),
        method_type_strategy(),
        quantity_strategy(),
        price_strategy(),
        tax_strategy(),
        any::<bool>(),
    )
        .prop_map(|(line_type, method_type, quantity, unit_price, tax_percent, linked)| LineShape {
            line_type,
            method_type,
            quantity,
            unit_price,
            tax_percent,
            linked: linked && line_type != LineType::Comment && line_type != LineType::Service,
        })
}

/// One to `max` invoice lines
pub fn invoice_lines_strategy(max: usize) -> impl Strategy<Value = Vec<LineShape>> {
    prop::collection::vec(line_shape_strategy(), 1..=max)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_quantities_are_positive(quantity in quantity_strategy()) {
            prop_assert!(quantity > Decimal::ZERO);
        }

        #[test]
        fn test_service_and_comment_lines_are_never_linked(shape in line_shape_strategy()) {
            if matches!(shape.line_type, LineType::Service | LineType::Comment) {
                prop_assert!(!shape.linked);
            }
        }
    }
}
