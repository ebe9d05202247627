// libs/booking-cell/src/services/booking.rs
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::{AuthUser, Role};

use notification_cell::models::NewNotification;
use notification_cell::services::notify::NotificationService;
use therapist_cell::services::slots::SlotService;

use crate::models::{
    Booking, BookingError, BookingListQuery, BookingStatus, CreateBookingRequest,
    CustomerBookingView, RescheduleBookingRequest, ServiceRecord, TherapistResponseAction,
};
use crate::services::transition::{transition, Actor, BookingAction};

pub struct BookingService {
    supabase: Arc<SupabaseClient>,
    slot_service: SlotService,
    notification_service: NotificationService,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let slot_service = SlotService::with_client(Arc::clone(&supabase));
        let notification_service = NotificationService::new(config);

        Self {
            supabase,
            slot_service,
            notification_service,
        }
    }

    /// Direct customer booking: claim the covering Available slot and create
    /// the pending booking as one unit. The claim is the atomic step; if the
    /// insert fails afterwards the slot is released again.
    pub async fn create_direct_booking(
        &self,
        customer_id: Uuid,
        request: CreateBookingRequest,
        auth_token: &str,
    ) -> Result<Booking, BookingError> {
        info!(
            "Creating direct booking for customer {} with therapist {}",
            customer_id, request.therapist_id
        );

        let service = self.fetch_service(request.service_id, auth_token).await?;

        if !service.therapist_ids.is_empty()
            && !service.therapist_ids.contains(&request.therapist_id)
        {
            return Err(BookingError::ValidationError(
                "Therapist does not offer this service".to_string(),
            ));
        }

        let (end_time, wrapped) = request
            .time
            .overflowing_add_signed(ChronoDuration::minutes(service.duration_minutes as i64));
        if wrapped != 0 {
            return Err(BookingError::ValidationError(
                "Requested time does not fit in the business day".to_string(),
            ));
        }

        let claimed = self
            .slot_service
            .claim_slot(
                request.therapist_id,
                request.date,
                request.time,
                end_time,
                auth_token,
            )
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let slot = claimed.ok_or(BookingError::SlotUnavailable)?;

        let now = Utc::now();
        let booking_data = json!({
            "customer_id": customer_id,
            "therapist_id": request.therapist_id,
            "service_id": service.id,
            "business_id": service.business_id,
            "date": request.date,
            "time": request.time.format("%H:%M:%S").to_string(),
            "status": BookingStatus::Pending,
            "assigned_by_admin": false,
            "response_visible_to_business_only": false,
            "therapist_responded": false,
            "payment_status": "pending",
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });

        let inserted: Result<Vec<Booking>, _> = self
            .supabase
            .insert_returning("bookings", booking_data, auth_token)
            .await;

        let booking = match inserted {
            Ok(rows) => rows.into_iter().next().ok_or_else(|| {
                BookingError::DatabaseError("Failed to create booking".to_string())
            })?,
            Err(e) => {
                // Give the slot back so the failed attempt does not block it.
                if let Err(release_err) =
                    self.slot_service.release_slot(slot.id, auth_token).await
                {
                    warn!(
                        "Failed to release slot {} after booking insert error: {}",
                        slot.id, release_err
                    );
                }
                return Err(BookingError::DatabaseError(e.to_string()));
            }
        };

        self.notification_service
            .send(
                NewNotification::about_booking(
                    request.therapist_id,
                    Role::Therapist,
                    booking.id,
                    "New booking",
                    format!(
                        "Booking {} requested for {} at {}",
                        booking.reference(),
                        booking.date,
                        booking.time.format("%H:%M")
                    ),
                ),
                auth_token,
            )
            .await;

        info!("Booking {} created for customer {}", booking.id, customer_id);
        Ok(booking)
    }

    pub async fn get_booking(
        &self,
        booking_id: Uuid,
        auth_token: &str,
    ) -> Result<Booking, BookingError> {
        let result: Vec<Booking> = self
            .supabase
            .select("bookings", &format!("id=eq.{}", booking_id), auth_token)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(BookingError::NotFound)
    }

    /// Role-aware read. Customers get the masked view; the therapist and the
    /// owning business see the raw record.
    pub async fn get_booking_for(
        &self,
        user: &AuthUser,
        booking_id: Uuid,
        auth_token: &str,
    ) -> Result<Value, BookingError> {
        let booking = self.get_booking(booking_id, auth_token).await?;

        match user.role {
            Role::Customer if booking.customer_id == user.id => {
                Ok(json!(CustomerBookingView::from_booking(&booking)))
            }
            Role::Therapist if booking.therapist_id == Some(user.id) => Ok(json!(booking)),
            Role::Business if booking.business_id == user.id => Ok(json!(booking)),
            _ => Err(BookingError::Forbidden),
        }
    }

    pub async fn list_for(
        &self,
        user: &AuthUser,
        query: &BookingListQuery,
        auth_token: &str,
    ) -> Result<Vec<Booking>, BookingError> {
        let owner_filter = match user.role {
            Role::Customer => format!("customer_id=eq.{}", user.id),
            Role::Therapist => format!("therapist_id=eq.{}", user.id),
            Role::Business => format!("business_id=eq.{}", user.id),
        };

        let mut filters = format!("{}&order=date.desc,time.desc", owner_filter);
        if let Some(status) = query.status {
            filters.push_str(&format!("&status=eq.{}", status));
        }
        if let Some(from) = query.from_date {
            filters.push_str(&format!("&date=gte.{}", from));
        }
        if let Some(to) = query.to_date {
            filters.push_str(&format!("&date=lte.{}", to));
        }

        self.supabase
            .select("bookings", &filters, auth_token)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))
    }

    /// Therapist confirm/reject on a business-assigned booking.
    pub async fn respond(
        &self,
        user: &AuthUser,
        booking_id: Uuid,
        action: TherapistResponseAction,
        auth_token: &str,
    ) -> Result<Booking, BookingError> {
        let booking = self.get_booking(booking_id, auth_token).await?;
        let actor = Actor::from_user(user);

        let machine_action = match action {
            TherapistResponseAction::Confirm => BookingAction::Confirm,
            TherapistResponseAction::Reject => BookingAction::Reject,
        };

        let next = transition(&booking, &actor, &machine_action, Utc::now())?;
        let updated = self.persist_transition(&booking, next, auth_token).await?;

        self.notification_service
            .send(
                NewNotification::about_booking(
                    updated.business_id,
                    Role::Business,
                    updated.id,
                    "Therapist responded",
                    format!(
                        "Booking {} has a therapist response awaiting review",
                        updated.reference()
                    ),
                ),
                auth_token,
            )
            .await;

        Ok(updated)
    }

    /// Business relays a hidden therapist response to the customer.
    /// Relaying an already-visible response is a no-op.
    pub async fn relay(
        &self,
        user: &AuthUser,
        booking_id: Uuid,
        auth_token: &str,
    ) -> Result<Booking, BookingError> {
        let booking = self.get_booking(booking_id, auth_token).await?;
        let actor = Actor::from_user(user);

        let next = transition(&booking, &actor, &BookingAction::Relay, Utc::now())?;

        if next.status == booking.status
            && next.response_visible_to_business_only == booking.response_visible_to_business_only
        {
            debug!("Relay on booking {} changed nothing, skipping write", booking.id);
            return Ok(booking);
        }

        let updated = self.persist_transition(&booking, next, auth_token).await?;

        self.notification_service
            .send(
                NewNotification::about_booking(
                    updated.customer_id,
                    Role::Customer,
                    updated.id,
                    "Booking update",
                    format!(
                        "Booking {} is now {}",
                        updated.reference(),
                        updated.customer_facing_status()
                    ),
                ),
                auth_token,
            )
            .await;

        Ok(updated)
    }

    /// Business clears the therapist response and reopens the booking for
    /// assignment.
    pub async fn revert_to_pending(
        &self,
        user: &AuthUser,
        booking_id: Uuid,
        auth_token: &str,
    ) -> Result<Booking, BookingError> {
        let booking = self.get_booking(booking_id, auth_token).await?;
        let actor = Actor::from_user(user);

        let next = transition(&booking, &actor, &BookingAction::RevertToPending, Utc::now())?;
        self.persist_transition(&booking, next, auth_token).await
    }

    pub async fn reschedule(
        &self,
        user: &AuthUser,
        booking_id: Uuid,
        request: RescheduleBookingRequest,
        auth_token: &str,
    ) -> Result<Booking, BookingError> {
        let booking = self.get_booking(booking_id, auth_token).await?;
        let actor = Actor::from_user(user);

        let next = transition(
            &booking,
            &actor,
            &BookingAction::Reschedule {
                date: request.new_date,
                time: request.new_time,
            },
            Utc::now(),
        )?;

        let updated = self.persist_transition(&booking, next, auth_token).await?;

        if let Some(therapist_id) = updated.therapist_id {
            self.notification_service
                .send(
                    NewNotification::about_booking(
                        therapist_id,
                        Role::Therapist,
                        updated.id,
                        "Booking rescheduled",
                        format!(
                            "Booking {} moved to {} at {}",
                            updated.reference(),
                            updated.date,
                            updated.time.format("%H:%M")
                        ),
                    ),
                    auth_token,
                )
                .await;
        }

        Ok(updated)
    }

    pub async fn cancel(
        &self,
        user: &AuthUser,
        booking_id: Uuid,
        auth_token: &str,
    ) -> Result<Booking, BookingError> {
        let booking = self.get_booking(booking_id, auth_token).await?;
        let actor = Actor::from_user(user);

        let next = transition(&booking, &actor, &BookingAction::Cancel, Utc::now())?;
        let updated = self.persist_transition(&booking, next, auth_token).await?;

        let (recipient_id, recipient_role) = if user.role == Role::Business {
            (updated.customer_id, Role::Customer)
        } else {
            (updated.business_id, Role::Business)
        };

        self.notification_service
            .send(
                NewNotification::about_booking(
                    recipient_id,
                    recipient_role,
                    updated.id,
                    "Booking cancelled",
                    format!("Booking {} was cancelled", updated.reference()),
                ),
                auth_token,
            )
            .await;

        Ok(updated)
    }

    /// Therapist wraps up a delivered session; the machine computes the
    /// payout from the service price.
    pub async fn complete(
        &self,
        user: &AuthUser,
        booking_id: Uuid,
        auth_token: &str,
    ) -> Result<Booking, BookingError> {
        let booking = self.get_booking(booking_id, auth_token).await?;
        let service = self.fetch_service(booking.service_id, auth_token).await?;
        let actor = Actor::from_user(user);

        let next = transition(
            &booking,
            &actor,
            &BookingAction::Complete {
                service_price: service.price,
            },
            Utc::now(),
        )?;

        let updated = self.persist_transition(&booking, next, auth_token).await?;

        self.notification_service
            .send(
                NewNotification::about_booking(
                    updated.customer_id,
                    Role::Customer,
                    updated.id,
                    "Session completed",
                    format!("Booking {} was marked completed", updated.reference()),
                ),
                auth_token,
            )
            .await;

        Ok(updated)
    }

    /// Persist a machine transition with a conditional PATCH keyed on the
    /// previous status. An empty match means a concurrent writer got there
    /// first and nothing was changed.
    pub async fn persist_transition(
        &self,
        previous: &Booking,
        next: Booking,
        auth_token: &str,
    ) -> Result<Booking, BookingError> {
        let filters = format!("id=eq.{}&status=eq.{}", previous.id, previous.status);

        let updated: Vec<Booking> = self
            .supabase
            .update_where("bookings", &filters, update_payload(&next), auth_token)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        updated
            .into_iter()
            .next()
            .ok_or(BookingError::ConcurrentModification)
    }

    pub async fn fetch_service(
        &self,
        service_id: Uuid,
        auth_token: &str,
    ) -> Result<ServiceRecord, BookingError> {
        let result: Vec<ServiceRecord> = self
            .supabase
            .select("services", &format!("id=eq.{}", service_id), auth_token)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(BookingError::ServiceNotFound)
    }
}

/// Every mutable booking field, written in full on each transition so the
/// stored row always matches the machine's output.
pub fn update_payload(booking: &Booking) -> Value {
    json!({
        "therapist_id": booking.therapist_id,
        "date": booking.date,
        "time": booking.time.format("%H:%M:%S").to_string(),
        "original_date": booking.original_date,
        "original_time": booking
            .original_time
            .map(|t| t.format("%H:%M:%S").to_string()),
        "status": booking.status,
        "assigned_by_admin": booking.assigned_by_admin,
        "assigned_by": booking.assigned_by,
        "response_visible_to_business_only": booking.response_visible_to_business_only,
        "therapist_responded": booking.therapist_responded,
        "confirmed_by": booking.confirmed_by,
        "confirmed_at": booking.confirmed_at.map(|t| t.to_rfc3339()),
        "cancelled_by": booking.cancelled_by,
        "cancelled_at": booking.cancelled_at.map(|t| t.to_rfc3339()),
        "rescheduled_by": booking.rescheduled_by,
        "rescheduled_at": booking.rescheduled_at.map(|t| t.to_rfc3339()),
        "payment_status": booking.payment_status,
        "advance_amount": booking.advance_amount,
        "remaining_amount": booking.remaining_amount,
        "therapist_payout_status": booking.therapist_payout_status,
        "therapist_payout_amount": booking.therapist_payout_amount,
        "updated_at": booking.updated_at.to_rfc3339(),
    })
}
