use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};
use urlencoding::encode;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{AvailabilitySlot, CreateSlotRequest, SlotStatus, SlotWindow, TherapistError};

/// Break inserted between consecutive generated slots when the caller does
/// not override it.
pub const DEFAULT_BREAK_MINUTES: i32 = 15;

/// Generate the ordered candidate slots that fit between `open` and `close`.
///
/// Each slot spans exactly `duration_min` minutes and consecutive slots are
/// separated by exactly `break_min` minutes. The last slot never ends past
/// `close`; a window too small for a single slot yields an empty sequence.
pub fn generate_slots(
    open: NaiveTime,
    close: NaiveTime,
    duration_min: i32,
    break_min: i32,
) -> Vec<SlotWindow> {
    let mut slots = Vec::new();

    if duration_min <= 0 || break_min < 0 || open >= close {
        return slots;
    }

    let duration = Duration::minutes(duration_min as i64);
    let step = Duration::minutes((duration_min + break_min) as i64);

    let mut current = open;
    loop {
        let (end, wrapped) = current.overflowing_add_signed(duration);
        if wrapped != 0 || end > close {
            break;
        }

        slots.push(SlotWindow {
            start_time: current,
            end_time: end,
        });

        let (next, wrapped) = current.overflowing_add_signed(step);
        if wrapped != 0 || next <= current {
            break;
        }
        current = next;
    }

    slots
}

/// Half-open interval overlap test shared by slot creation and filtering.
pub fn windows_overlap(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start < b_end && a_end > b_start
}

pub struct SlotService {
    supabase: Arc<SupabaseClient>,
}

impl SlotService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Create a concrete slot for a therapist, rejecting any `[start, end)`
    /// intersection with an existing slot on the same date.
    pub async fn create_slot(
        &self,
        therapist_id: Uuid,
        request: CreateSlotRequest,
        auth_token: &str,
    ) -> Result<AvailabilitySlot, TherapistError> {
        debug!(
            "Creating slot for therapist {} on {} {}-{}",
            therapist_id, request.date, request.start_time, request.end_time
        );

        if request.start_time >= request.end_time {
            return Err(TherapistError::ValidationError(
                "Start time must be before end time".to_string(),
            ));
        }

        let existing = self
            .slots_for_date(therapist_id, request.date, auth_token)
            .await?;

        for slot in &existing {
            if windows_overlap(
                request.start_time,
                request.end_time,
                slot.start_time,
                slot.end_time,
            ) {
                warn!(
                    "Slot {}-{} overlaps existing slot {} for therapist {}",
                    request.start_time, request.end_time, slot.id, therapist_id
                );
                return Err(TherapistError::SlotOverlap);
            }
        }

        let slot_data = json!({
            "therapist_id": therapist_id,
            "date": request.date,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "status": SlotStatus::Available,
            "created_at": Utc::now().to_rfc3339(),
        });

        let created: Vec<AvailabilitySlot> = self
            .supabase
            .insert_returning("therapist_slots", slot_data, auth_token)
            .await
            .map_err(|e| TherapistError::DatabaseError(e.to_string()))?;

        created
            .into_iter()
            .next()
            .ok_or_else(|| TherapistError::DatabaseError("Failed to create slot".to_string()))
    }

    pub async fn slots_for_date(
        &self,
        therapist_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<AvailabilitySlot>, TherapistError> {
        let filters = format!(
            "therapist_id=eq.{}&date=eq.{}&order=start_time.asc",
            therapist_id, date
        );

        self.supabase
            .select("therapist_slots", &filters, auth_token)
            .await
            .map_err(|e| TherapistError::DatabaseError(e.to_string()))
    }

    pub async fn list_slots(
        &self,
        therapist_id: Uuid,
        date: Option<NaiveDate>,
        status: Option<SlotStatus>,
        auth_token: &str,
    ) -> Result<Vec<AvailabilitySlot>, TherapistError> {
        let mut filters = format!("therapist_id=eq.{}&order=date.asc,start_time.asc", therapist_id);
        if let Some(date) = date {
            filters.push_str(&format!("&date=eq.{}", date));
        }
        if let Some(status) = status {
            filters.push_str(&format!("&status=eq.{}", status));
        }

        self.supabase
            .select("therapist_slots", &filters, auth_token)
            .await
            .map_err(|e| TherapistError::DatabaseError(e.to_string()))
    }

    /// Atomically flip the Available slot covering `[start, end)` to Booked.
    ///
    /// The flip is a single conditional PATCH keyed on `status=eq.available`;
    /// when two requests race for one slot, PostgREST matches the row for
    /// exactly one of them and the other receives an empty representation,
    /// reported here as `None`.
    pub async fn claim_slot(
        &self,
        therapist_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        auth_token: &str,
    ) -> Result<Option<AvailabilitySlot>, TherapistError> {
        let filters = format!(
            "therapist_id=eq.{}&date=eq.{}&start_time=lte.{}&end_time=gte.{}&status=eq.available",
            therapist_id,
            date,
            encode(&start.format("%H:%M:%S").to_string()),
            encode(&end.format("%H:%M:%S").to_string()),
        );

        let claimed: Vec<AvailabilitySlot> = self
            .supabase
            .update_where(
                "therapist_slots",
                &filters,
                json!({ "status": SlotStatus::Booked }),
                auth_token,
            )
            .await
            .map_err(|e| TherapistError::DatabaseError(e.to_string()))?;

        Ok(claimed.into_iter().next())
    }

    /// Compensating update for a claim whose follow-up write failed.
    pub async fn release_slot(
        &self,
        slot_id: Uuid,
        auth_token: &str,
    ) -> Result<(), TherapistError> {
        let filters = format!("id=eq.{}&status=eq.booked", slot_id);

        let _: Vec<AvailabilitySlot> = self
            .supabase
            .update_where(
                "therapist_slots",
                &filters,
                json!({ "status": SlotStatus::Available }),
                auth_token,
            )
            .await
            .map_err(|e| TherapistError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn generated_slots_span_the_requested_duration() {
        let slots = generate_slots(t(9, 0), t(12, 0), 60, 15);

        assert!(!slots.is_empty());
        for slot in &slots {
            assert_eq!(slot.end_time - slot.start_time, Duration::minutes(60));
        }
    }

    #[test]
    fn consecutive_slots_are_separated_by_the_break() {
        let slots = generate_slots(t(9, 0), t(13, 0), 60, 15);

        for pair in slots.windows(2) {
            assert_eq!(pair[1].start_time - pair[0].end_time, Duration::minutes(15));
        }
    }

    #[test]
    fn no_slot_ends_after_close() {
        let close = t(17, 30);
        let slots = generate_slots(t(9, 0), close, 45, 15);

        assert!(!slots.is_empty());
        for slot in &slots {
            assert!(slot.end_time <= close);
        }
    }

    #[test]
    fn slot_ending_exactly_at_close_is_kept() {
        let slots = generate_slots(t(9, 0), t(10, 0), 60, 15);

        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].start_time, t(9, 0));
        assert_eq!(slots[0].end_time, t(10, 0));
    }

    #[test]
    fn window_too_small_for_one_slot_yields_nothing() {
        assert!(generate_slots(t(9, 0), t(9, 30), 60, 15).is_empty());
    }

    #[test]
    fn degenerate_inputs_yield_nothing() {
        assert!(generate_slots(t(9, 0), t(9, 0), 30, 15).is_empty());
        assert!(generate_slots(t(12, 0), t(9, 0), 30, 15).is_empty());
        assert!(generate_slots(t(9, 0), t(17, 0), 0, 15).is_empty());
    }

    #[test]
    fn expected_sequence_for_a_morning_window() {
        let slots = generate_slots(t(9, 0), t(11, 0), 30, 15);

        let starts: Vec<NaiveTime> = slots.iter().map(|s| s.start_time).collect();
        assert_eq!(starts, vec![t(9, 0), t(9, 45), t(10, 30)]);
    }

    #[test]
    fn overlap_is_half_open() {
        // Touching boundaries do not overlap.
        assert!(!windows_overlap(t(9, 0), t(10, 0), t(10, 0), t(11, 0)));
        assert!(windows_overlap(t(9, 0), t(10, 1), t(10, 0), t(11, 0)));
        assert!(windows_overlap(t(9, 30), t(9, 45), t(9, 0), t(10, 0)));
    }
}
