// libs/booking-cell/src/services/assignment.rs
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::Role;

use notification_cell::models::NewNotification;
use notification_cell::services::notify::NotificationService;
use therapist_cell::services::slots::SlotService;

use crate::models::{AssociationRecord, Booking, BookingError};
use crate::services::booking::BookingService;
use crate::services::transition::{transition, Actor, BookingAction};

pub struct AssignmentService {
    supabase: Arc<SupabaseClient>,
    booking_service: BookingService,
    slot_service: SlotService,
    notification_service: NotificationService,
}

impl AssignmentService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        Self {
            slot_service: SlotService::with_client(Arc::clone(&supabase)),
            booking_service: BookingService::new(config),
            notification_service: NotificationService::new(config),
            supabase,
        }
    }

    /// Business routes a pending booking to an approved therapist. If an
    /// Available slot covers the booked time it is flipped Booked as well;
    /// its absence does not fail the assignment.
    pub async fn assign_booking_to_therapist(
        &self,
        business_id: Uuid,
        booking_id: Uuid,
        therapist_id: Uuid,
        auth_token: &str,
    ) -> Result<Booking, BookingError> {
        info!(
            "Business {} assigning booking {} to therapist {}",
            business_id, booking_id, therapist_id
        );

        let booking = self.booking_service.get_booking(booking_id, auth_token).await?;

        if booking.business_id != business_id {
            return Err(BookingError::Forbidden);
        }

        if booking.status.is_terminal() {
            return Err(BookingError::NotReassignable);
        }

        self.require_approved_association(therapist_id, business_id, auth_token)
            .await?;

        let actor = Actor::Business(business_id);
        let next = transition(
            &booking,
            &actor,
            &BookingAction::Assign { therapist_id },
            Utc::now(),
        )?;

        let updated = self
            .booking_service
            .persist_transition(&booking, next, auth_token)
            .await?;

        self.claim_slot_if_open(&updated, auth_token).await;

        self.notification_service
            .send(
                NewNotification::about_booking(
                    therapist_id,
                    Role::Therapist,
                    updated.id,
                    "Booking assigned",
                    format!(
                        "Booking {} on {} at {} awaits your response",
                        updated.reference(),
                        updated.date,
                        updated.time.format("%H:%M")
                    ),
                ),
                auth_token,
            )
            .await;

        Ok(updated)
    }

    async fn require_approved_association(
        &self,
        therapist_id: Uuid,
        business_id: Uuid,
        auth_token: &str,
    ) -> Result<(), BookingError> {
        let filters = format!(
            "therapist_id=eq.{}&business_id=eq.{}&status=eq.approved",
            therapist_id, business_id
        );

        let approved: Vec<AssociationRecord> = self
            .supabase
            .select("therapist_business_associations", &filters, auth_token)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        if approved.is_empty() {
            return Err(BookingError::TherapistNotApproved);
        }

        Ok(())
    }

    async fn claim_slot_if_open(&self, booking: &Booking, auth_token: &str) {
        let therapist_id = match booking.therapist_id {
            Some(id) => id,
            None => return,
        };

        let duration = match self
            .booking_service
            .fetch_service(booking.service_id, auth_token)
            .await
        {
            Ok(service) => service.duration_minutes,
            Err(e) => {
                debug!("Skipping slot claim for booking {}: {}", booking.id, e);
                return;
            }
        };

        let (end_time, wrapped) = booking
            .time
            .overflowing_add_signed(ChronoDuration::minutes(duration as i64));
        if wrapped != 0 {
            return;
        }

        match self
            .slot_service
            .claim_slot(therapist_id, booking.date, booking.time, end_time, auth_token)
            .await
        {
            Ok(Some(slot)) => debug!("Slot {} booked for assignment {}", slot.id, booking.id),
            Ok(None) => debug!("No open slot covers booking {}", booking.id),
            Err(e) => debug!("Slot claim failed for booking {}: {}", booking.id, e),
        }
    }
}
