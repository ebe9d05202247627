use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::{AuthUser, Role};

use booking_cell::models::{Booking, BookingError};
use booking_cell::services::booking::BookingService;
use booking_cell::services::transition::{transition, Actor, BookingAction};
use notification_cell::models::NewNotification;
use notification_cell::services::notify::NotificationService;

use crate::models::{
    CreateOrderRequest, GatewayOrder, PaymentError, PaymentRecord, PaymentRecordStatus,
    VerifyPaymentRequest,
};
use crate::services::gateway::PaymentGatewayClient;

const ORDER_CURRENCY: &str = "USD";

pub struct PaymentService {
    supabase: Arc<SupabaseClient>,
    gateway: PaymentGatewayClient,
    booking_service: BookingService,
    notification_service: NotificationService,
}

impl PaymentService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            gateway: PaymentGatewayClient::new(config),
            booking_service: BookingService::new(config),
            notification_service: NotificationService::new(config),
        }
    }

    /// Create a gateway order for a booking and persist the attempt.
    pub async fn create_order(
        &self,
        user: &AuthUser,
        request: CreateOrderRequest,
        auth_token: &str,
    ) -> Result<(GatewayOrder, PaymentRecord), PaymentError> {
        let booking = self.fetch_booking(request.booking_id, auth_token).await?;

        if booking.customer_id != user.id {
            return Err(PaymentError::Forbidden);
        }

        if booking.status.is_terminal() {
            return Err(PaymentError::Booking(BookingError::NotReassignable));
        }

        let order = self
            .gateway
            .create_order(request.amount, ORDER_CURRENCY, &booking.reference())
            .await?;

        let record_data = json!({
            "booking_id": booking.id,
            "order_id": order.id,
            "amount": request.amount,
            "status": PaymentRecordStatus::Created,
            "created_at": Utc::now().to_rfc3339(),
        });

        let records: Vec<PaymentRecord> = self
            .supabase
            .insert_returning("payments", record_data, auth_token)
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        let record = records.into_iter().next().ok_or_else(|| {
            PaymentError::DatabaseError("Failed to record payment attempt".to_string())
        })?;

        info!("Gateway order {} created for booking {}", order.id, booking.id);
        Ok((order, record))
    }

    /// Record a gateway-confirmed payment: verify the signature, advance the
    /// booking through the machine, and mark the payment row captured.
    pub async fn record_payment_success(
        &self,
        user: &AuthUser,
        request: VerifyPaymentRequest,
        auth_token: &str,
    ) -> Result<Booking, PaymentError> {
        if !self
            .gateway
            .verify_signature(&request.order_id, &request.payment_id, &request.signature)
        {
            warn!(
                "Signature mismatch for order {} on booking {}",
                request.order_id, request.booking_id
            );
            return Err(PaymentError::SignatureMismatch);
        }

        let booking = self.fetch_booking(request.booking_id, auth_token).await?;

        if booking.customer_id != user.id {
            return Err(PaymentError::Forbidden);
        }

        let next = transition(
            &booking,
            &Actor::System,
            &BookingAction::ConfirmPayment {
                advance_amount: request.advance_amount,
                remaining_amount: request.remaining_amount,
            },
            Utc::now(),
        )
        .map_err(BookingError::from)?;

        let updated = self
            .booking_service
            .persist_transition(&booking, next, auth_token)
            .await?;

        let payment_update = json!({
            "payment_id": request.payment_id,
            "advance_amount": request.advance_amount,
            "remaining_amount": request.remaining_amount,
            "status": PaymentRecordStatus::Captured,
        });

        let captured: Result<Vec<PaymentRecord>, _> = self
            .supabase
            .update_where(
                "payments",
                &format!("order_id=eq.{}", request.order_id),
                payment_update,
                auth_token,
            )
            .await;

        if let Err(e) = captured {
            // The booking transition already committed; the payment row is
            // bookkeeping, so log and keep going.
            warn!(
                "Failed to mark payment {} captured: {}",
                request.order_id, e
            );
        }

        self.notification_service
            .send(
                NewNotification::about_booking(
                    updated.business_id,
                    Role::Business,
                    updated.id,
                    "Payment received",
                    format!(
                        "Booking {} received a payment of {}",
                        updated.reference(),
                        request.advance_amount
                    ),
                ),
                auth_token,
            )
            .await;

        info!(
            "Payment {} captured for booking {}, status now {}",
            request.payment_id, updated.id, updated.status
        );
        Ok(updated)
    }

    async fn fetch_booking(
        &self,
        booking_id: Uuid,
        auth_token: &str,
    ) -> Result<Booking, PaymentError> {
        self.booking_service
            .get_booking(booking_id, auth_token)
            .await
            .map_err(|e| match e {
                BookingError::NotFound => PaymentError::BookingNotFound,
                other => PaymentError::Booking(other),
            })
    }
}
