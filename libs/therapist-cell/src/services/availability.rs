use chrono::{Datelike, NaiveDate, Weekday};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AvailabilityRule, AvailabilitySlot, BusinessHours, NewAvailabilityRule,
    ReplaceAvailabilityRequest, ServiceRecord, SlotStatus, SlotWindow, TherapistError,
};
use crate::services::slots::{generate_slots, windows_overlap, DEFAULT_BREAK_MINUTES};

/// Map a calendar date onto the 0 (Sunday) .. 6 (Saturday) scheme used by
/// the weekly-availability rows.
pub fn weekday_index(date: NaiveDate) -> i32 {
    match date.weekday() {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

/// True iff the candidate slot lies entirely within at least one window the
/// therapist declared for that date's weekday. Pure, no I/O.
pub fn fits_weekly_availability(
    slot: &SlotWindow,
    rules: &[AvailabilityRule],
    date: NaiveDate,
) -> bool {
    let day = weekday_index(date);

    rules.iter().any(|rule| {
        rule.day_of_week == day
            && rule.start_time <= slot.start_time
            && slot.end_time <= rule.end_time
    })
}

pub struct AvailabilityService {
    supabase: Arc<SupabaseClient>,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub async fn get_rules(
        &self,
        therapist_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityRule>, TherapistError> {
        let filters = format!(
            "therapist_id=eq.{}&order=day_of_week.asc,start_time.asc",
            therapist_id
        );

        self.supabase
            .select("therapist_availability", &filters, auth_token)
            .await
            .map_err(|e| TherapistError::DatabaseError(e.to_string()))
    }

    /// Replace a therapist's entire weekly schedule in one shot.
    pub async fn replace_rules(
        &self,
        therapist_id: Uuid,
        request: ReplaceAvailabilityRequest,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityRule>, TherapistError> {
        debug!(
            "Replacing availability for therapist {} with {} windows",
            therapist_id,
            request.rules.len()
        );

        for rule in &request.rules {
            self.validate_rule(rule)?;
        }

        self.supabase
            .delete_where(
                "therapist_availability",
                &format!("therapist_id=eq.{}", therapist_id),
                auth_token,
            )
            .await
            .map_err(|e| TherapistError::DatabaseError(e.to_string()))?;

        if request.rules.is_empty() {
            return Ok(vec![]);
        }

        let rows: Vec<serde_json::Value> = request
            .rules
            .iter()
            .map(|rule| {
                json!({
                    "therapist_id": therapist_id,
                    "day_of_week": rule.day_of_week,
                    "start_time": rule.start_time.format("%H:%M:%S").to_string(),
                    "end_time": rule.end_time.format("%H:%M:%S").to_string(),
                })
            })
            .collect();

        self.supabase
            .insert_returning("therapist_availability", json!(rows), auth_token)
            .await
            .map_err(|e| TherapistError::DatabaseError(e.to_string()))
    }

    /// Candidate slots a customer can request for a therapist/service/date:
    /// generated from the business day, kept when they fit the therapist's
    /// weekly windows, and dropped when they collide with an already-booked
    /// slot.
    pub async fn bookable_slots(
        &self,
        therapist_id: Uuid,
        service_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<SlotWindow>, TherapistError> {
        debug!(
            "Computing bookable slots for therapist {} service {} on {}",
            therapist_id, service_id, date
        );

        let service = self.fetch_service(service_id, auth_token).await?;

        if !service.therapist_ids.is_empty() && !service.therapist_ids.contains(&therapist_id) {
            return Err(TherapistError::ValidationError(
                "Therapist does not offer this service".to_string(),
            ));
        }

        let business = self.fetch_business_hours(service.business_id, auth_token).await?;
        let rules = self.get_rules(therapist_id, auth_token).await?;

        let booked: Vec<AvailabilitySlot> = {
            let filters = format!(
                "therapist_id=eq.{}&date=eq.{}&status=eq.{}",
                therapist_id,
                date,
                SlotStatus::Booked
            );
            self.supabase
                .select("therapist_slots", &filters, auth_token)
                .await
                .map_err(|e| TherapistError::DatabaseError(e.to_string()))?
        };

        let candidates = generate_slots(
            business.open_time,
            business.close_time,
            service.duration_minutes,
            DEFAULT_BREAK_MINUTES,
        );

        let slots = candidates
            .into_iter()
            .filter(|slot| fits_weekly_availability(slot, &rules, date))
            .filter(|slot| {
                !booked.iter().any(|taken| {
                    windows_overlap(
                        slot.start_time,
                        slot.end_time,
                        taken.start_time,
                        taken.end_time,
                    )
                })
            })
            .collect();

        Ok(slots)
    }

    async fn fetch_service(
        &self,
        service_id: Uuid,
        auth_token: &str,
    ) -> Result<ServiceRecord, TherapistError> {
        let result: Vec<ServiceRecord> = self
            .supabase
            .select("services", &format!("id=eq.{}", service_id), auth_token)
            .await
            .map_err(|e| TherapistError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(TherapistError::ServiceNotFound)
    }

    async fn fetch_business_hours(
        &self,
        business_id: Uuid,
        auth_token: &str,
    ) -> Result<BusinessHours, TherapistError> {
        let result: Vec<BusinessHours> = self
            .supabase
            .select("businesses", &format!("id=eq.{}", business_id), auth_token)
            .await
            .map_err(|e| TherapistError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(TherapistError::BusinessNotFound)
    }

    fn validate_rule(&self, rule: &NewAvailabilityRule) -> Result<(), TherapistError> {
        if rule.start_time >= rule.end_time {
            return Err(TherapistError::ValidationError(
                "Start time must be before end time".to_string(),
            ));
        }

        if rule.day_of_week < 0 || rule.day_of_week > 6 {
            return Err(TherapistError::ValidationError(
                "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn rule(day: i32, start: NaiveTime, end: NaiveTime) -> AvailabilityRule {
        AvailabilityRule {
            id: Uuid::new_v4(),
            therapist_id: Uuid::new_v4(),
            day_of_week: day,
            start_time: start,
            end_time: end,
        }
    }

    fn slot(start: NaiveTime, end: NaiveTime) -> SlotWindow {
        SlotWindow {
            start_time: start,
            end_time: end,
        }
    }

    // 2025-03-01 is a Saturday.
    const SATURDAY: (i32, u32, u32) = (2025, 3, 1);

    fn saturday() -> NaiveDate {
        NaiveDate::from_ymd_opt(SATURDAY.0, SATURDAY.1, SATURDAY.2).unwrap()
    }

    #[test]
    fn slot_inside_a_declared_window_fits() {
        let rules = vec![rule(6, t(9, 0), t(17, 0))];

        assert!(fits_weekly_availability(
            &slot(t(10, 0), t(11, 0)),
            &rules,
            saturday()
        ));
    }

    #[test]
    fn slot_matching_the_window_exactly_fits() {
        let rules = vec![rule(6, t(9, 0), t(10, 0))];

        assert!(fits_weekly_availability(
            &slot(t(9, 0), t(10, 0)),
            &rules,
            saturday()
        ));
    }

    #[test]
    fn slot_partially_outside_every_window_does_not_fit() {
        let rules = vec![rule(6, t(9, 0), t(12, 0))];

        assert!(!fits_weekly_availability(
            &slot(t(11, 30), t(12, 30)),
            &rules,
            saturday()
        ));
    }

    #[test]
    fn slot_on_a_different_weekday_does_not_fit() {
        // Window declared for Monday, date falls on Saturday.
        let rules = vec![rule(1, t(9, 0), t(17, 0))];

        assert!(!fits_weekly_availability(
            &slot(t(10, 0), t(11, 0)),
            &rules,
            saturday()
        ));
    }

    #[test]
    fn any_of_several_windows_can_accept_the_slot() {
        let rules = vec![
            rule(6, t(8, 0), t(9, 0)),
            rule(6, t(14, 0), t(18, 0)),
        ];

        assert!(fits_weekly_availability(
            &slot(t(15, 0), t(16, 0)),
            &rules,
            saturday()
        ));
        assert!(!fits_weekly_availability(
            &slot(t(10, 0), t(11, 0)),
            &rules,
            saturday()
        ));
    }

    #[test]
    fn weekday_index_is_sunday_based() {
        // 2025-03-02 is a Sunday.
        let sunday = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
        assert_eq!(weekday_index(sunday), 0);
        assert_eq!(weekday_index(saturday()), 6);
    }
}
