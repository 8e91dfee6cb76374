//! Payment state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::PaymentError;

/// The status of a payment or wallet transaction.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Processing ──┬──► Completed ──► Refunded
///           │                 └──► Failed
///           ├──► Completed
///           ├──► Failed
///           └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Created, waiting for collection or dispatch.
    #[default]
    Pending,

    /// Handed to an external gateway, outcome unknown.
    Processing,

    /// Money collected (terminal, except for refunds).
    Completed,

    /// Attempt failed (terminal state).
    Failed,

    /// Abandoned before collection (terminal state).
    Cancelled,

    /// Collected money returned (terminal state).
    Refunded,
}

impl PaymentStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [PaymentStatus; 6] = [
        PaymentStatus::Pending,
        PaymentStatus::Processing,
        PaymentStatus::Completed,
        PaymentStatus::Failed,
        PaymentStatus::Cancelled,
        PaymentStatus::Refunded,
    ];

    /// Returns true if a manual confirmation is allowed.
    pub fn can_confirm(&self) -> bool {
        matches!(self, PaymentStatus::Pending)
    }

    /// Returns true if the payment can be handed to a gateway.
    pub fn can_start_processing(&self) -> bool {
        matches!(self, PaymentStatus::Pending)
    }

    /// Returns true if a gateway outcome can settle the payment.
    pub fn can_settle(&self) -> bool {
        matches!(self, PaymentStatus::Processing)
    }

    /// Returns true if the payment can still fail.
    pub fn can_reject(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if the payment can be refunded.
    pub fn can_refund(&self) -> bool {
        matches!(self, PaymentStatus::Completed)
    }

    /// Returns true if the payment can be abandoned.
    pub fn can_cancel(&self) -> bool {
        matches!(self, PaymentStatus::Pending)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed
                | PaymentStatus::Failed
                | PaymentStatus::Cancelled
                | PaymentStatus::Refunded
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PaymentError::UnknownStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(guard: fn(&PaymentStatus) -> bool) -> Vec<PaymentStatus> {
        PaymentStatus::ALL.into_iter().filter(|s| guard(s)).collect()
    }

    #[test]
    fn test_only_completed_can_refund() {
        assert_eq!(sources(PaymentStatus::can_refund), vec![PaymentStatus::Completed]);
    }

    #[test]
    fn test_reject_from_non_terminal_only() {
        assert_eq!(
            sources(PaymentStatus::can_reject),
            vec![PaymentStatus::Pending, PaymentStatus::Processing]
        );
    }

    #[test]
    fn test_settle_requires_processing() {
        assert_eq!(sources(PaymentStatus::can_settle), vec![PaymentStatus::Processing]);
        assert_eq!(sources(PaymentStatus::can_confirm), vec![PaymentStatus::Pending]);
    }

    #[test]
    fn test_terminal_states() {
        assert_eq!(
            sources(PaymentStatus::is_terminal),
            vec![
                PaymentStatus::Completed,
                PaymentStatus::Failed,
                PaymentStatus::Cancelled,
                PaymentStatus::Refunded
            ]
        );
    }

    #[test]
    fn test_display_and_parse() {
        for status in PaymentStatus::ALL {
            assert_eq!(status.to_string().parse::<PaymentStatus>().unwrap(), status);
        }
        assert!("SETTLED".parse::<PaymentStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Processing).unwrap(),
            "\"PROCESSING\""
        );
    }
}
