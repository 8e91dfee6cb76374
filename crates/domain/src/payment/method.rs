//! Payment methods, their processing routes, and wallet numbering plans.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::PaymentError;

/// An e-wallet provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletType {
    #[default]
    WalletA,
    WalletB,
    WalletC,
}

/// Length of a local mobile number, in digits.
const WALLET_PHONE_DIGITS: usize = 9;

impl WalletType {
    /// Mobile prefixes the wallet's numbering plan accepts.
    pub fn phone_prefixes(&self) -> &'static [&'static str] {
        match self {
            WalletType::WalletA => &["77"],
            WalletType::WalletB => &["73"],
            WalletType::WalletC => &["70", "71", "78"],
        }
    }

    /// Validates a wallet phone number, returning its digits.
    ///
    /// Everything except digits is stripped first, so `"77 000-0000"` is
    /// accepted as `"770000000"`.
    pub fn validate_phone(&self, phone: &str) -> Result<String, PaymentError> {
        let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
        let valid = digits.len() == WALLET_PHONE_DIGITS
            && self.phone_prefixes().iter().any(|p| digits.starts_with(p));
        if !valid {
            return Err(PaymentError::InvalidWalletPhone {
                wallet_type: *self,
                phone: phone.to_string(),
            });
        }
        Ok(digits)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WalletType::WalletA => "WALLET_A",
            WalletType::WalletB => "WALLET_B",
            WalletType::WalletC => "WALLET_C",
        }
    }
}

impl std::fmt::Display for WalletType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a payment method is processed once the payment exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentRoute {
    /// Charged through the wallet gateway in the background.
    Wallet(WalletType),
    /// Waits for a manual confirmation when the cash is collected.
    OnCollection,
    /// Waits for a manual confirmation against the bank reference.
    ManualReconciliation,
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[default]
    CashOnDelivery,
    BankTransfer,
    WalletA,
    WalletB,
    WalletC,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 5] = [
        PaymentMethod::CashOnDelivery,
        PaymentMethod::BankTransfer,
        PaymentMethod::WalletA,
        PaymentMethod::WalletB,
        PaymentMethod::WalletC,
    ];

    /// The dispatch table: each method maps to exactly one route and gateway.
    ///
    /// Adding a method means adding one row here.
    const fn dispatch(&self) -> (PaymentRoute, &'static str) {
        match self {
            PaymentMethod::CashOnDelivery => (PaymentRoute::OnCollection, "CASH"),
            PaymentMethod::BankTransfer => (PaymentRoute::ManualReconciliation, "BANK"),
            PaymentMethod::WalletA => (PaymentRoute::Wallet(WalletType::WalletA), "WALLET_A"),
            PaymentMethod::WalletB => (PaymentRoute::Wallet(WalletType::WalletB), "WALLET_B"),
            PaymentMethod::WalletC => (PaymentRoute::Wallet(WalletType::WalletC), "WALLET_C"),
        }
    }

    /// Returns how payments with this method are processed.
    pub const fn route(&self) -> PaymentRoute {
        self.dispatch().0
    }

    /// Returns the gateway name recorded on the payment.
    pub const fn gateway(&self) -> &'static str {
        self.dispatch().1
    }

    /// Returns the wallet provider for e-wallet methods.
    pub fn wallet_type(&self) -> Option<WalletType> {
        match self.route() {
            PaymentRoute::Wallet(wallet_type) => Some(wallet_type),
            _ => None,
        }
    }

    pub fn is_wallet(&self) -> bool {
        self.wallet_type().is_some()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CashOnDelivery => "CASH_ON_DELIVERY",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::WalletA => "WALLET_A",
            PaymentMethod::WalletB => "WALLET_B",
            PaymentMethod::WalletC => "WALLET_C",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PaymentError::UnknownPaymentMethod(s.to_string()))
    }
}
