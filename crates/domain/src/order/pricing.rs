//! Order amount calculation.
//!
//! Amounts are computed exactly once, when the order is placed. Items are
//! immutable afterwards, so nothing recomputes them later.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::Money;

use super::{OrderError, OrderItem};

/// The money breakdown of an order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAmounts {
    pub subtotal: Money,
    pub tax_amount: Money,
    pub shipping_amount: Money,
    pub discount_amount: Money,
    pub total_amount: Money,
}

impl OrderAmounts {
    /// Builds the breakdown, deriving the total.
    pub fn new(subtotal: Money, tax: Money, shipping: Money, discount: Money) -> Self {
        Self {
            subtotal,
            tax_amount: tax,
            shipping_amount: shipping,
            discount_amount: discount,
            total_amount: subtotal + tax + shipping - discount,
        }
    }

    /// Checks that the subtotal matches the items and the total matches its parts.
    pub fn verify(&self, items: &[OrderItem]) -> Result<(), OrderError> {
        let expected_subtotal = subtotal(items);
        if self.subtotal != expected_subtotal {
            return Err(OrderError::AmountMismatch(format!(
                "subtotal is {}, items sum to {}",
                self.subtotal, expected_subtotal
            )));
        }
        let expected_total =
            self.subtotal + self.tax_amount + self.shipping_amount - self.discount_amount;
        if self.total_amount != expected_total {
            return Err(OrderError::AmountMismatch(format!(
                "total is {}, parts sum to {}",
                self.total_amount, expected_total
            )));
        }
        if self.total_amount.is_negative() {
            return Err(OrderError::DiscountExceedsOrderValue {
                discount: self.discount_amount,
                order_value: self.total_amount + self.discount_amount,
            });
        }
        Ok(())
    }
}

/// Sum of `unit_price × quantity` over the items.
pub fn subtotal(items: &[OrderItem]) -> Money {
    items
        .iter()
        .map(|item| item.unit_price.multiply(item.quantity))
        .sum()
}

/// A discount a coupon code grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coupon {
    /// Fraction of the subtotal, e.g. `0.10` for ten percent.
    Percent(Decimal),
    /// A fixed amount off.
    Fixed(Money),
}

/// Tax and discount rules applied on top of the item subtotal.
pub trait PricingRules: Send + Sync {
    /// Tax owed on a subtotal.
    fn tax(&self, subtotal: Money) -> Money;

    /// Discount granted by a coupon code. Unknown codes are a validation error.
    fn discount(&self, subtotal: Money, coupon_code: Option<&str>) -> Result<Money, OrderError>;
}

/// Rules with no tax and no coupons.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPricingRules;

impl PricingRules for NoPricingRules {
    fn tax(&self, _subtotal: Money) -> Money {
        Money::zero()
    }

    fn discount(&self, _subtotal: Money, coupon_code: Option<&str>) -> Result<Money, OrderError> {
        match coupon_code {
            Some(code) => Err(OrderError::UnknownCoupon(code.to_string())),
            None => Ok(Money::zero()),
        }
    }
}

/// A flat tax rate and a table of coupon codes.
#[derive(Debug, Clone, Default)]
pub struct StandardPricingRules {
    tax_rate: Decimal,
    coupons: HashMap<String, Coupon>,
}

impl StandardPricingRules {
    /// Creates rules with the given tax rate (a fraction, `0.05` = 5%).
    pub fn new(tax_rate: Decimal) -> Self {
        Self {
            tax_rate,
            coupons: HashMap::new(),
        }
    }

    /// Registers a coupon. Codes match case-insensitively.
    pub fn with_coupon(mut self, code: impl AsRef<str>, coupon: Coupon) -> Self {
        self.coupons
            .insert(code.as_ref().trim().to_ascii_uppercase(), coupon);
        self
    }
}

impl PricingRules for StandardPricingRules {
    fn tax(&self, subtotal: Money) -> Money {
        subtotal.apply_rate(self.tax_rate)
    }

    fn discount(&self, subtotal: Money, coupon_code: Option<&str>) -> Result<Money, OrderError> {
        let Some(code) = coupon_code else {
            return Ok(Money::zero());
        };
        match self.coupons.get(&code.trim().to_ascii_uppercase()) {
            Some(Coupon::Percent(rate)) => Ok(subtotal.apply_rate(*rate)),
            Some(Coupon::Fixed(amount)) => Ok(*amount),
            None => Err(OrderError::UnknownCoupon(code.to_string())),
        }
    }
}

/// Computes order amounts from items, a coupon, a flat shipping fee, and pricing rules.
///
/// Fails if there are no items, an item is invalid, or the discount would make
/// the total negative.
pub fn compute_amounts(
    items: &[OrderItem],
    coupon_code: Option<&str>,
    flat_shipping: Money,
    rules: &dyn PricingRules,
) -> Result<OrderAmounts, OrderError> {
    if items.is_empty() {
        return Err(OrderError::NoItems);
    }
    for item in items {
        item.validate()?;
    }

    let subtotal = subtotal(items);
    let tax = rules.tax(subtotal);
    let discount = rules.discount(subtotal, coupon_code)?.max(Money::zero());
    let amounts = OrderAmounts::new(subtotal, tax, flat_shipping, discount);

    if amounts.total_amount.is_negative() {
        return Err(OrderError::DiscountExceedsOrderValue {
            discount,
            order_value: subtotal + tax + flat_shipping,
        });
    }

    Ok(amounts)
}

/// Settings for building an [`AmountCalculator`].
#[derive(Debug, Clone, Default)]
pub struct PricingConfig {
    /// Shipping charged on every order.
    pub flat_shipping: Money,
    /// Tax rate as a fraction.
    pub tax_rate: Decimal,
}

/// Prices orders with a flat shipping fee and pluggable pricing rules.
#[derive(Clone)]
pub struct AmountCalculator {
    flat_shipping: Money,
    rules: Arc<dyn PricingRules>,
}

impl AmountCalculator {
    pub fn new(flat_shipping: Money, rules: Arc<dyn PricingRules>) -> Self {
        Self {
            flat_shipping,
            rules,
        }
    }

    /// A calculator that charges flat shipping and nothing else.
    pub fn flat(flat_shipping: Money) -> Self {
        Self::new(flat_shipping, Arc::new(NoPricingRules))
    }

    pub fn flat_shipping(&self) -> Money {
        self.flat_shipping
    }

    /// Computes the amounts for a list of items.
    pub fn compute(
        &self,
        items: &[OrderItem],
        coupon_code: Option<&str>,
    ) -> Result<OrderAmounts, OrderError> {
        compute_amounts(items, coupon_code, self.flat_shipping, self.rules.as_ref())
    }
}

impl From<PricingConfig> for AmountCalculator {
    fn from(config: PricingConfig) -> Self {
        AmountCalculator::new(
            config.flat_shipping,
            Arc::new(StandardPricingRules::new(config.tax_rate)),
        )
    }
}

impl Default for AmountCalculator {
    fn default() -> Self {
        Self::flat(Money::zero())
    }
}

impl std::fmt::Debug for AmountCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmountCalculator")
            .field("flat_shipping", &self.flat_shipping)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(s: &str) -> Money {
        Money::parse(s).unwrap()
    }

    fn sample_items() -> Vec<OrderItem> {
        vec![
            OrderItem::new("P-1", "Kettle", 2, money("100.00")),
            OrderItem::new("P-2", "Mug", 1, money("50.00")),
        ]
    }

    #[test]
    fn test_flat_shipping_only() {
        let amounts = AmountCalculator::flat(money("5.00"))
            .compute(&sample_items(), None)
            .unwrap();

        assert_eq!(amounts.subtotal, money("250.00"));
        assert_eq!(amounts.tax_amount, Money::zero());
        assert_eq!(amounts.shipping_amount, money("5.00"));
        assert_eq!(amounts.discount_amount, Money::zero());
        assert_eq!(amounts.total_amount, money("255.00"));
        assert!(amounts.verify(&sample_items()).is_ok());
    }

    #[test]
    fn test_subtotal_is_exact_for_fractional_prices() {
        let items: Vec<_> = (0..10)
            .map(|i| OrderItem::new(format!("P-{i}"), "Sticker", 3, money("0.10")))
            .collect();

        let amounts = AmountCalculator::default().compute(&items, None).unwrap();

        assert_eq!(amounts.subtotal, money("3.00"));
        assert_eq!(amounts.total_amount, money("3.00"));
    }

    #[test]
    fn test_tax_and_percent_coupon() {
        let rules = StandardPricingRules::new(Decimal::new(15, 2))
            .with_coupon("save10", Coupon::Percent(Decimal::new(10, 2)));
        let calculator = AmountCalculator::new(money("5.00"), Arc::new(rules));

        let amounts = calculator.compute(&sample_items(), Some("SAVE10")).unwrap();

        assert_eq!(amounts.tax_amount, money("37.50"));
        assert_eq!(amounts.discount_amount, money("25.00"));
        // 250 + 37.50 + 5 - 25
        assert_eq!(amounts.total_amount, money("267.50"));
    }

    #[test]
    fn test_tax_rounds_to_cents() {
        let rules = StandardPricingRules::new(Decimal::new(5, 2));
        let items = vec![OrderItem::new("P-1", "Pen", 1, money("10.05"))];

        let amounts = AmountCalculator::new(Money::zero(), Arc::new(rules))
            .compute(&items, None)
            .unwrap();

        assert_eq!(amounts.tax_amount, money("0.50"));
        assert_eq!(amounts.total_amount, money("10.55"));
    }

    #[test]
    fn test_unknown_coupon_is_rejected() {
        let err = AmountCalculator::default()
            .compute(&sample_items(), Some("NOPE"))
            .unwrap_err();
        assert!(matches!(err, OrderError::UnknownCoupon(code) if code == "NOPE"));
    }

    #[test]
    fn test_discount_exceeding_order_value_is_rejected() {
        let rules = StandardPricingRules::new(Decimal::ZERO)
            .with_coupon("HUGE", Coupon::Fixed(money("1000.00")));
        let calculator = AmountCalculator::new(money("5.00"), Arc::new(rules));

        let err = calculator.compute(&sample_items(), Some("huge")).unwrap_err();

        assert!(matches!(
            err,
            OrderError::DiscountExceedsOrderValue { order_value, .. } if order_value == money("255.00")
        ));
    }

    #[test]
    fn test_discount_equal_to_order_value_is_free() {
        let rules = StandardPricingRules::new(Decimal::ZERO)
            .with_coupon("FREE", Coupon::Fixed(money("255.00")));
        let calculator = AmountCalculator::new(money("5.00"), Arc::new(rules));

        let amounts = calculator.compute(&sample_items(), Some("FREE")).unwrap();
        assert!(amounts.total_amount.is_zero());
    }

    #[test]
    fn test_empty_and_invalid_items() {
        let calculator = AmountCalculator::default();
        assert!(matches!(calculator.compute(&[], None), Err(OrderError::NoItems)));

        let items = vec![OrderItem::new("P-1", "Kettle", 0, money("1.00"))];
        assert!(matches!(
            calculator.compute(&items, None),
            Err(OrderError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn test_verify_detects_inconsistent_amounts() {
        let mut amounts = AmountCalculator::default()
            .compute(&sample_items(), None)
            .unwrap();
        amounts.total_amount = money("1.00");
        assert!(matches!(
            amounts.verify(&sample_items()),
            Err(OrderError::AmountMismatch(_))
        ));

        let amounts = OrderAmounts::new(money("249.99"), Money::zero(), Money::zero(), Money::zero());
        assert!(amounts.verify(&sample_items()).is_err());
    }

    #[test]
    fn test_calculator_from_config() {
        let calculator = AmountCalculator::from(PricingConfig {
            flat_shipping: money("7.00"),
            tax_rate: Decimal::new(10, 2),
        });

        let amounts = calculator.compute(&sample_items(), None).unwrap();
        assert_eq!(amounts.tax_amount, money("25.00"));
        assert_eq!(amounts.total_amount, money("282.00"));
    }
}
