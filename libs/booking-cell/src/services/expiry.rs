// libs/booking-cell/src/services/expiry.rs
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Booking, BookingError, PaymentStatus};
use crate::services::booking::update_payload;
use crate::services::transition::{transition, Actor, BookingAction};

pub struct ExpirySweepService {
    supabase: Arc<SupabaseClient>,
}

impl ExpirySweepService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    /// Cancel unpaid bookings whose date has passed. Bookings with any
    /// recorded payment are excluded by the query and guarded again in the
    /// conditional update, so the sweep can run concurrently with request
    /// handlers on any cron schedule.
    pub async fn expire_unpaid(&self, auth_token: &str) -> Result<usize, BookingError> {
        let today = Utc::now().date_naive();

        let filters = format!(
            "status=in.(pending,rescheduled)&payment_status=eq.pending&date=lt.{}",
            today
        );

        let stale: Vec<Booking> = self
            .supabase
            .select("bookings", &filters, auth_token)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        info!("Expiry sweep found {} unpaid past bookings", stale.len());

        let mut expired = 0;
        for booking in stale {
            let next = match transition(
                &booking,
                &Actor::System,
                &BookingAction::ExpireUnpaid,
                Utc::now(),
            ) {
                Ok(next) => next,
                Err(e) => {
                    warn!("Skipping booking {} in expiry sweep: {}", booking.id, e);
                    continue;
                }
            };

            // Repeat the unpaid guard in the update filter: a payment that
            // lands mid-sweep makes this PATCH match nothing.
            let update_filters = format!(
                "id=eq.{}&status=eq.{}&payment_status=eq.{}",
                booking.id,
                booking.status,
                PaymentStatus::Pending
            );

            let updated: Vec<Booking> = self
                .supabase
                .update_where("bookings", &update_filters, update_payload(&next), auth_token)
                .await
                .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

            if updated.is_empty() {
                warn!("Booking {} changed during expiry sweep, left untouched", booking.id);
            } else {
                expired += 1;
            }
        }

        info!("Expiry sweep cancelled {} bookings", expired);
        Ok(expired)
    }
}
