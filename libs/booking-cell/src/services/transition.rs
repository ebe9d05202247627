// libs/booking-cell/src/services/transition.rs
//
// Every status or visibility change in the marketplace goes through
// `transition`. Route handlers and sweeps build an action, call it, and
// persist the returned copy with a conditional update; nothing else writes
// `status` or `response_visible_to_business_only`.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use shared_models::auth::{AuthUser, Role};

use crate::models::{
    Booking, BookingStatus, PaymentStatus, PayoutStatus, TransitionError, THERAPIST_PAYOUT_SHARE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Customer(Uuid),
    Therapist(Uuid),
    Business(Uuid),
    System,
}

impl Actor {
    pub fn from_user(user: &AuthUser) -> Actor {
        match user.role {
            Role::Customer => Actor::Customer(user.id),
            Role::Therapist => Actor::Therapist(user.id),
            Role::Business => Actor::Business(user.id),
        }
    }

    fn id(&self) -> Option<Uuid> {
        match self {
            Actor::Customer(id) | Actor::Therapist(id) | Actor::Business(id) => Some(*id),
            Actor::System => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BookingAction {
    /// Business routes the booking to a therapist.
    Assign { therapist_id: Uuid },
    /// Therapist accepts a business-assigned booking.
    Confirm,
    /// Therapist declines a business-assigned booking.
    Reject,
    /// Business exposes the therapist's response to the customer.
    Relay,
    /// Business clears the therapist and reopens the booking for assignment.
    RevertToPending,
    Reschedule { date: NaiveDate, time: NaiveTime },
    Cancel,
    /// Recorded after the payment gateway confirmed funds.
    ConfirmPayment { advance_amount: f64, remaining_amount: f64 },
    /// Therapist wraps up a delivered session.
    Complete { service_price: f64 },
    /// Batch sweep over unpaid bookings whose date has passed.
    ExpireUnpaid,
}

/// Apply one action to a booking, returning the updated copy. No mutation
/// happens on failure; persistence is the caller's concern.
pub fn transition(
    booking: &Booking,
    actor: &Actor,
    action: &BookingAction,
    now: DateTime<Utc>,
) -> Result<Booking, TransitionError> {
    let mut next = booking.clone();

    match action {
        BookingAction::Assign { therapist_id } => {
            owning_business(booking, actor)?;

            if booking.status != BookingStatus::Pending {
                return Err(TransitionError::InvalidState(booking.status));
            }

            next.therapist_id = Some(*therapist_id);
            next.assigned_by_admin = true;
            next.assigned_by = actor.id();
            next.therapist_responded = false;
            next.response_visible_to_business_only = false;
            next.confirmed_by = None;
            next.confirmed_at = None;
        }

        BookingAction::Confirm => {
            let therapist_id = assigned_therapist(booking, actor)?;

            match booking.status {
                BookingStatus::Pending | BookingStatus::Rescheduled => {}
                status => return Err(TransitionError::InvalidState(status)),
            }

            next.status = BookingStatus::Confirmed;
            next.therapist_responded = true;
            next.response_visible_to_business_only = true;
            next.confirmed_by = Some(therapist_id);
            next.confirmed_at = Some(now);
        }

        BookingAction::Reject => {
            assigned_therapist(booking, actor)?;

            match booking.status {
                BookingStatus::Pending | BookingStatus::Rescheduled => {}
                status => return Err(TransitionError::InvalidState(status)),
            }

            next.status = BookingStatus::TherapistRejected;
            next.therapist_responded = true;
            next.response_visible_to_business_only = true;
        }

        BookingAction::Relay => {
            owning_business(booking, actor)?;

            if !(booking.assigned_by_admin && booking.therapist_responded) {
                return Err(TransitionError::NotAllowed(
                    "there is no therapist response to relay".to_string(),
                ));
            }

            match booking.status {
                BookingStatus::Confirmed
                | BookingStatus::TherapistConfirmed
                | BookingStatus::TherapistRejected
                | BookingStatus::Cancelled => {}
                status => return Err(TransitionError::InvalidState(status)),
            }

            // Relaying twice is a no-op, not an error.
            if booking.status == BookingStatus::TherapistConfirmed {
                next.status = BookingStatus::Confirmed;
            }
            next.response_visible_to_business_only = false;
        }

        BookingAction::RevertToPending => {
            owning_business(booking, actor)?;

            if !(booking.assigned_by_admin && booking.therapist_responded) {
                return Err(TransitionError::NotAllowed(
                    "there is no therapist response to revert".to_string(),
                ));
            }

            match booking.status {
                BookingStatus::Confirmed
                | BookingStatus::TherapistConfirmed
                | BookingStatus::TherapistRejected => {}
                status => return Err(TransitionError::InvalidState(status)),
            }

            next.status = BookingStatus::Pending;
            next.therapist_id = None;
            next.assigned_by_admin = false;
            next.assigned_by = None;
            next.therapist_responded = false;
            next.response_visible_to_business_only = false;
            next.confirmed_by = None;
            next.confirmed_at = None;
        }

        BookingAction::Reschedule { date, time } => {
            match actor {
                Actor::Customer(id) if *id == booking.customer_id => {}
                Actor::Business(id) if *id == booking.business_id => {}
                _ => {
                    return Err(TransitionError::NotAllowed(
                        "only the customer or the owning business may reschedule".to_string(),
                    ))
                }
            }

            match booking.status {
                BookingStatus::Pending | BookingStatus::Confirmed => {}
                status => return Err(TransitionError::InvalidState(status)),
            }

            // The original schedule survives only the first reschedule.
            if booking.original_date.is_none() {
                next.original_date = Some(booking.date);
                next.original_time = Some(booking.time);
            }

            next.date = *date;
            next.time = *time;
            next.status = BookingStatus::Rescheduled;
            next.rescheduled_by = actor.id();
            next.rescheduled_at = Some(now);

            // A business-assigned therapist has to answer for the new time.
            if booking.assigned_by_admin {
                next.therapist_responded = false;
                next.response_visible_to_business_only = false;
            }
        }

        BookingAction::Cancel => {
            match actor {
                Actor::Customer(id) if *id == booking.customer_id => match booking.status {
                    BookingStatus::Pending
                    | BookingStatus::Confirmed
                    | BookingStatus::Rescheduled => {}
                    status => return Err(TransitionError::InvalidState(status)),
                },
                Actor::Business(id) if *id == booking.business_id => match booking.status {
                    BookingStatus::Pending
                    | BookingStatus::Confirmed
                    | BookingStatus::Rescheduled => {}
                    status => return Err(TransitionError::InvalidState(status)),
                },
                Actor::Therapist(_) => {
                    assigned_therapist(booking, actor)?;
                    match booking.status {
                        BookingStatus::Pending | BookingStatus::Confirmed => {}
                        status => return Err(TransitionError::InvalidState(status)),
                    }
                    // The cancellation stays business-only until relayed.
                    next.therapist_responded = true;
                    next.response_visible_to_business_only = true;
                }
                _ => {
                    return Err(TransitionError::NotAllowed(
                        "actor may not cancel this booking".to_string(),
                    ))
                }
            }

            next.status = BookingStatus::Cancelled;
            next.cancelled_by = actor.id();
            next.cancelled_at = Some(now);
        }

        BookingAction::ConfirmPayment {
            advance_amount,
            remaining_amount,
        } => {
            if *actor != Actor::System {
                return Err(TransitionError::NotAllowed(
                    "payment confirmation is recorded by the system".to_string(),
                ));
            }

            match booking.status {
                BookingStatus::Pending
                | BookingStatus::Rescheduled
                | BookingStatus::Confirmed => {}
                status => return Err(TransitionError::InvalidState(status)),
            }

            next.status = BookingStatus::Confirmed;
            next.payment_status = if *remaining_amount > 0.0 {
                PaymentStatus::Partial
            } else {
                PaymentStatus::Completed
            };
            next.advance_amount = Some(*advance_amount);
            next.remaining_amount = Some(*remaining_amount);
            // Same visibility rule as a therapist response: business-assigned
            // bookings surface to the customer only after business review.
            next.response_visible_to_business_only = booking.assigned_by_admin;
            if next.confirmed_at.is_none() {
                next.confirmed_at = Some(now);
            }
        }

        BookingAction::Complete { service_price } => {
            match actor {
                Actor::Therapist(id) if booking.therapist_id == Some(*id) => {}
                _ => {
                    return Err(TransitionError::NotAllowed(
                        "only the booked therapist may complete a session".to_string(),
                    ))
                }
            }

            if booking.status != BookingStatus::Confirmed {
                return Err(TransitionError::InvalidState(booking.status));
            }

            if !booking.payment_status.is_settled() {
                return Err(TransitionError::PaymentNotSettled);
            }

            next.status = BookingStatus::Completed;
            next.payment_status = PaymentStatus::Paid;
            next.therapist_payout_amount = Some(service_price * THERAPIST_PAYOUT_SHARE);
            next.therapist_payout_status = Some(PayoutStatus::Pending);
        }

        BookingAction::ExpireUnpaid => {
            if *actor != Actor::System {
                return Err(TransitionError::NotAllowed(
                    "expiry is a system sweep".to_string(),
                ));
            }

            match booking.status {
                BookingStatus::Pending | BookingStatus::Rescheduled => {}
                status => return Err(TransitionError::InvalidState(status)),
            }

            // The sweep never touches a booking with recorded money.
            if booking.payment_status != PaymentStatus::Pending {
                return Err(TransitionError::NotAllowed(
                    "cannot expire a booking with a recorded payment".to_string(),
                ));
            }

            next.status = BookingStatus::Cancelled;
            next.cancelled_by = None;
            next.cancelled_at = Some(now);
        }
    }

    next.updated_at = now;
    Ok(next)
}

fn owning_business(booking: &Booking, actor: &Actor) -> Result<Uuid, TransitionError> {
    match actor {
        Actor::Business(id) if *id == booking.business_id => Ok(*id),
        _ => Err(TransitionError::NotAllowed(
            "only the owning business may perform this action".to_string(),
        )),
    }
}

fn assigned_therapist(booking: &Booking, actor: &Actor) -> Result<Uuid, TransitionError> {
    let id = match actor {
        Actor::Therapist(id) if booking.therapist_id == Some(*id) => *id,
        _ => {
            return Err(TransitionError::NotAllowed(
                "only the assigned therapist may respond".to_string(),
            ))
        }
    };

    if !booking.assigned_by_admin {
        return Err(TransitionError::NotAllowed(
            "direct bookings do not take a therapist response".to_string(),
        ));
    }

    Ok(id)
}
