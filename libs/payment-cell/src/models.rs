use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use booking_cell::models::BookingError;

// ==============================================================================
// PAYMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRecordStatus {
    Created,
    Captured,
    Failed,
}

/// One payment attempt against a booking, keyed by the gateway order id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub order_id: String,
    #[serde(default)]
    pub payment_id: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub advance_amount: Option<f64>,
    #[serde(default)]
    pub remaining_amount: Option<f64>,
    pub status: PaymentRecordStatus,
    pub created_at: DateTime<Utc>,
}

/// Order as returned by the payment gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub booking_id: Uuid,
    pub amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyPaymentRequest {
    pub booking_id: Uuid,
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
    pub advance_amount: f64,
    #[serde(default)]
    pub remaining_amount: f64,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum PaymentError {
    #[error("Booking not found")]
    BookingNotFound,

    #[error("Payment signature verification failed")]
    SignatureMismatch,

    #[error("Not authorized to pay for this booking")]
    Forbidden,

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
