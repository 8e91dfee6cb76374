//! Value objects for the order domain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

use super::OrderError;

/// Product identifier, as issued by the product catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Creates a new product ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the product ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// ISO-4217 style three-letter currency code, stored upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Currency used when neither the request nor the configuration names one.
    pub const DEFAULT_CODE: &'static str = "YER";

    /// Parses a currency code, normalizing it to upper case.
    pub fn parse(code: &str) -> Result<Self, OrderError> {
        let code = code.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(OrderError::InvalidCurrency(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self(Self::DEFAULT_CODE.to_string())
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Currency {
    type Error = OrderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// A line item, holding a snapshot of the product taken when the order was placed.
///
/// Later catalog changes never reach an existing item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The product this line refers to (not owned by the order).
    pub product_id: ProductId,

    /// Product name at order time.
    pub product_name: String,

    /// Arabic product name at order time.
    pub product_name_ar: Option<String>,

    /// Product SKU at order time.
    pub product_sku: Option<String>,

    /// Quantity ordered.
    pub quantity: u32,

    /// Price per unit at order time.
    pub unit_price: Money,

    /// `unit_price × quantity`.
    pub total_price: Money,

    /// Free-form item attributes (size, colour, ...), passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<serde_json::Value>,
}

impl OrderItem {
    /// Creates a new order item, computing its total price.
    pub fn new(
        product_id: impl Into<ProductId>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            product_name_ar: None,
            product_sku: None,
            quantity,
            unit_price,
            total_price: unit_price.multiply(quantity),
            attributes: None,
        }
    }

    pub fn with_name_ar(mut self, name_ar: Option<String>) -> Self {
        self.product_name_ar = name_ar;
        self
    }

    pub fn with_sku(mut self, sku: Option<String>) -> Self {
        self.product_sku = sku;
        self
    }

    pub fn with_attributes(mut self, attributes: Option<serde_json::Value>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Checks quantity, price, and the stored line total.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                product_id: self.product_id.to_string(),
                quantity: self.quantity,
            });
        }
        if !self.unit_price.is_positive() {
            return Err(OrderError::InvalidPrice {
                product_id: self.product_id.to_string(),
                price: self.unit_price,
            });
        }
        if self.total_price != self.unit_price.multiply(self.quantity) {
            return Err(OrderError::AmountMismatch(format!(
                "line total for {} is {}, expected {}",
                self.product_id,
                self.total_price,
                self.unit_price.multiply(self.quantity)
            )));
        }
        Ok(())
    }
}

/// Customer contact details captured on the order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerContact {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl CustomerContact {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Requires a name and a plausible email address.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.name.trim().is_empty() {
            return Err(OrderError::MissingField("customer name"));
        }
        let email = self.email.trim();
        let well_formed = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !well_formed {
            return Err(OrderError::InvalidEmail(self.email.clone()));
        }
        Ok(())
    }
}

/// Sync state with an external ERP (quotes and invoices).
///
/// Carried for other systems; never interpreted here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSync {
    pub quote_id: Option<String>,
    pub invoice_id: Option<String>,
    pub sync_status: Option<String>,
    pub synced_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_item_total_price() {
        let item = OrderItem::new("SKU-001", "Widget", 3, Money::from_minor(1050));
        assert_eq!(item.total_price, Money::from_minor(3150));
        assert!(item.validate().is_ok());
    }

    #[test]
    fn test_order_item_rejects_zero_quantity_and_price() {
        let item = OrderItem::new("SKU-001", "Widget", 0, Money::from_minor(100));
        assert!(matches!(
            item.validate(),
            Err(OrderError::InvalidQuantity { quantity: 0, .. })
        ));

        let item = OrderItem::new("SKU-001", "Widget", 1, Money::zero());
        assert!(matches!(item.validate(), Err(OrderError::InvalidPrice { .. })));
    }

    #[test]
    fn test_order_item_detects_tampered_total() {
        let mut item = OrderItem::new("SKU-001", "Widget", 2, Money::from_minor(100));
        item.total_price = Money::from_minor(150);
        assert!(matches!(item.validate(), Err(OrderError::AmountMismatch(_))));
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!(Currency::parse("usd").unwrap().as_str(), "USD");
        assert_eq!(Currency::default().as_str(), "YER");
        assert!(Currency::parse("US").is_err());
        assert!(Currency::parse("U5D").is_err());

        let parsed: Currency = serde_json::from_str("\"sar\"").unwrap();
        assert_eq!(parsed.as_str(), "SAR");
        assert!(serde_json::from_str::<Currency>("\"dollars\"").is_err());
    }

    #[test]
    fn test_customer_contact_validation() {
        assert!(CustomerContact::new("Amal", "amal@example.com").validate().is_ok());
        assert!(matches!(
            CustomerContact::new(" ", "amal@example.com").validate(),
            Err(OrderError::MissingField(_))
        ));
        assert!(matches!(
            CustomerContact::new("Amal", "not-an-email").validate(),
            Err(OrderError::InvalidEmail(_))
        ));
    }

    #[test]
    fn test_product_id() {
        let id = ProductId::new("SKU-001");
        assert_eq!(id.as_str(), "SKU-001");
        assert_eq!(id.to_string(), "SKU-001");
    }
}
