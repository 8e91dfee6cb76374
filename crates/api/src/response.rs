//! Bilingual response envelope.
//!
//! Every endpoint answers with the same shape:
//!
//! ```json
//! { "success": true, "message": "...", "messageAr": "...", "data": { ... } }
//! ```
//!
//! Errors replace `data` with `error: { code, details }`; see [`crate::error`].

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// A message in English and Arabic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub en: &'static str,
    pub ar: &'static str,
}

const fn message(en: &'static str, ar: &'static str) -> Message {
    Message { en, ar }
}

/// Success messages.
pub mod messages {
    use super::{Message, message};

    pub const ORDER_CREATED: Message = message("Order created successfully", "تم إنشاء الطلب بنجاح");
    pub const ORDER_RETRIEVED: Message = message("Order retrieved successfully", "تم جلب الطلب بنجاح");
    pub const ORDERS_RETRIEVED: Message = message("Orders retrieved successfully", "تم جلب الطلبات بنجاح");
    pub const ORDER_EVENTS_RETRIEVED: Message = message("Order history retrieved successfully", "تم جلب سجل الطلب بنجاح");
    pub const ORDER_STATUS_UPDATED: Message = message("Order status updated successfully", "تم تحديث حالة الطلب بنجاح");
    pub const ORDER_SHIPPED: Message = message("Order shipped successfully", "تم شحن الطلب بنجاح");
    pub const ORDER_DELIVERED: Message = message("Order delivered successfully", "تم تسليم الطلب بنجاح");
    pub const ORDER_CANCELLED: Message = message("Order cancelled successfully", "تم إلغاء الطلب بنجاح");

    pub const PAYMENT_CREATED: Message = message("Payment created successfully", "تم إنشاء الدفع بنجاح");
    pub const PAYMENT_ACCEPTED: Message = message(
        "Payment accepted for processing; check its status for the outcome",
        "تم قبول الدفع للمعالجة، يرجى متابعة حالته لمعرفة النتيجة",
    );
    pub const PAYMENT_RETRIEVED: Message = message("Payment retrieved successfully", "تم جلب الدفع بنجاح");
    pub const PAYMENTS_RETRIEVED: Message = message("Payments retrieved successfully", "تم جلب المدفوعات بنجاح");
    pub const PAYMENT_CONFIRMED: Message = message("Payment confirmed successfully", "تم تأكيد الدفع بنجاح");
    pub const PAYMENT_REJECTED: Message = message("Payment rejected", "تم رفض الدفع");
    pub const PAYMENT_REFUNDED: Message = message("Payment refunded successfully", "تم استرداد الدفع بنجاح");
    pub const PAYMENT_STATS_RETRIEVED: Message = message("Payment statistics retrieved successfully", "تم جلب إحصائيات المدفوعات بنجاح");
    pub const RECONCILIATION_FINISHED: Message = message("Reconciliation sweep finished", "اكتملت عملية التسوية");
}

/// Successful response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: &'static str,
    pub message_ar: &'static str,
    pub data: Option<T>,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    /// A `200 OK` response carrying `data`.
    pub fn ok(message: Message, data: T) -> Self {
        Self {
            success: true,
            message: message.en,
            message_ar: message.ar,
            data: Some(data),
            status: StatusCode::OK,
        }
    }

    /// A `201 Created` response carrying `data`.
    pub fn created(message: Message, data: T) -> Self {
        Self::ok(message, data).with_status(StatusCode::CREATED)
    }

    /// Overrides the status code.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_fields() {
        let response = ApiResponse::ok(messages::ORDER_RETRIEVED, serde_json::json!({"id": 1}));
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "Order retrieved successfully");
        assert_eq!(json["messageAr"], "تم جلب الطلب بنجاح");
        assert_eq!(json["data"]["id"], 1);
        assert!(json.get("status").is_none());
    }

    #[test]
    fn test_created_status() {
        let response = ApiResponse::created(messages::ORDER_CREATED, ()).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = ApiResponse::ok(messages::PAYMENT_ACCEPTED, ())
            .with_status(StatusCode::ACCEPTED)
            .into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
