// libs/booking-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::time::{hhmm, hhmm_option};

// ==============================================================================
// CORE BOOKING MODELS
// ==============================================================================

/// The central marketplace entity: one appointment request from a customer,
/// optionally routed to a therapist by a business, paid, and completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub therapist_id: Option<Uuid>,
    pub service_id: Uuid,
    pub business_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    #[serde(default)]
    pub original_date: Option<NaiveDate>,
    #[serde(default, with = "hhmm_option")]
    pub original_time: Option<NaiveTime>,
    pub status: BookingStatus,
    #[serde(default)]
    pub assigned_by_admin: bool,
    #[serde(default)]
    pub assigned_by: Option<Uuid>,
    // Defaults to false so legacy rows missing the column can never surface
    // as "phantom visible" responses.
    #[serde(default)]
    pub response_visible_to_business_only: bool,
    #[serde(default)]
    pub therapist_responded: bool,
    #[serde(default)]
    pub confirmed_by: Option<Uuid>,
    #[serde(default)]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_by: Option<Uuid>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rescheduled_by: Option<Uuid>,
    #[serde(default)]
    pub rescheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub advance_amount: Option<f64>,
    #[serde(default)]
    pub remaining_amount: Option<f64>,
    #[serde(default)]
    pub therapist_payout_status: Option<PayoutStatus>,
    #[serde(default)]
    pub therapist_payout_amount: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Human-facing booking code, derived from the stored id alone.
    pub fn reference(&self) -> String {
        booking_reference(&self.id)
    }

    /// The status a customer is allowed to see. While a business-assigned
    /// therapist response is awaiting business review, the customer reads
    /// `pending` instead of the raw therapist response.
    pub fn customer_facing_status(&self) -> BookingStatus {
        if self.assigned_by_admin
            && self.therapist_responded
            && self.response_visible_to_business_only
        {
            return BookingStatus::Pending;
        }

        match self.status {
            // Legacy rows written before responses were normalized.
            BookingStatus::TherapistConfirmed => BookingStatus::Confirmed,
            status => status,
        }
    }
}

/// Display-name mapping for a booking, computed from the stored id so it
/// never depends on process memory.
pub fn booking_reference(id: &Uuid) -> String {
    let hex = id.simple().to_string();
    format!("CAL-{}", hex[..8].to_uppercase())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Rescheduled,
    Completed,
    Cancelled,
    // Intermediate therapist responses, hidden from the customer until the
    // business relays them.
    TherapistConfirmed,
    TherapistRejected,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Pending => write!(f, "pending"),
            BookingStatus::Confirmed => write!(f, "confirmed"),
            BookingStatus::Rescheduled => write!(f, "rescheduled"),
            BookingStatus::Completed => write!(f, "completed"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
            BookingStatus::TherapistConfirmed => write!(f, "therapist_confirmed"),
            BookingStatus::TherapistRejected => write!(f, "therapist_rejected"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Partial,
    Completed,
    Paid,
    Failed,
}

impl PaymentStatus {
    /// True once money has actually been recorded against the booking.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Partial | PaymentStatus::Completed | PaymentStatus::Paid
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Partial => write!(f, "partial"),
            PaymentStatus::Completed => write!(f, "completed"),
            PaymentStatus::Paid => write!(f, "paid"),
            PaymentStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Paid,
}

/// Share of the service price owed to the therapist on completion. The
/// remaining share is settled outside this system.
pub const THERAPIST_PAYOUT_SHARE: f64 = 0.40;

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub therapist_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignBookingRequest {
    pub therapist_id: Uuid,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TherapistResponseAction {
    Confirm,
    Reject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TherapistResponseRequest {
    pub action: TherapistResponseAction,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RelayAction {
    Approve,
    RevertToPending,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayRequest {
    pub action: RelayAction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleBookingRequest {
    pub new_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub new_time: NaiveTime,
}

#[derive(Debug, Deserialize)]
pub struct BookingListQuery {
    pub status: Option<BookingStatus>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

/// What a customer is shown: assignment routing and business-review
/// bookkeeping stay internal, and the status is the masked one.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerBookingView {
    pub id: Uuid,
    pub reference: String,
    pub therapist_id: Option<Uuid>,
    pub service_id: Uuid,
    pub business_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomerBookingView {
    pub fn from_booking(booking: &Booking) -> Self {
        Self {
            id: booking.id,
            reference: booking.reference(),
            therapist_id: booking.therapist_id,
            service_id: booking.service_id,
            business_id: booking.business_id,
            date: booking.date,
            time: booking.time,
            status: booking.customer_facing_status(),
            payment_status: booking.payment_status,
            created_at: booking.created_at,
            updated_at: booking.updated_at,
        }
    }
}

// ==============================================================================
// RECORDS CONSUMED FROM OTHER TABLES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: Uuid,
    pub business_id: Uuid,
    pub price: f64,
    pub duration_minutes: i32,
    #[serde(default)]
    pub therapist_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssociationStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociationRecord {
    pub id: Uuid,
    pub therapist_id: Uuid,
    pub business_id: Uuid,
    pub status: AssociationStatus,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransitionError {
    #[error("booking in status {0} cannot accept this action")]
    InvalidState(BookingStatus),

    #[error("{0}")]
    NotAllowed(String),

    #[error("payment must be settled before completion")]
    PaymentNotSettled,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BookingError {
    #[error("Booking not found")]
    NotFound,

    #[error("Service not found")]
    ServiceNotFound,

    #[error("Requested slot is unavailable")]
    SlotUnavailable,

    #[error("Therapist is not approved for this business")]
    TherapistNotApproved,

    #[error("Not authorized to act on this booking")]
    Forbidden,

    #[error("Booking is in a terminal state and cannot be reassigned")]
    NotReassignable,

    #[error("Booking was modified concurrently")]
    ConcurrentModification,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booking_reference_is_a_pure_function_of_the_id() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();

        assert_eq!(booking_reference(&id), "CAL-550E8400");
        // Same id, same code, every time.
        assert_eq!(booking_reference(&id), booking_reference(&id));
    }
}
