use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{PaymentOutcome, PaymentRequestEvent};

/// Ticket status in the payment lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Booked,
    Pending,
    Paid,
    Failed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Booked => "booked",
            TicketStatus::Pending => "pending",
            TicketStatus::Paid => "paid",
            TicketStatus::Failed => "failed",
        }
    }

    /// A payment may start from `booked`, or again after a `failed` attempt.
    pub fn can_initiate_payment(&self) -> bool {
        matches!(self, TicketStatus::Booked | TicketStatus::Failed)
    }

    pub fn can_delete(&self) -> bool {
        *self != TicketStatus::Pending
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = TicketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "booked" => Ok(TicketStatus::Booked),
            "pending" => Ok(TicketStatus::Pending),
            "paid" => Ok(TicketStatus::Paid),
            "failed" => Ok(TicketStatus::Failed),
            other => Err(TicketError::UnknownStatus(other.to_string())),
        }
    }
}

impl From<PaymentOutcome> for TicketStatus {
    fn from(outcome: PaymentOutcome) -> Self {
        match outcome {
            PaymentOutcome::Paid => TicketStatus::Paid,
            PaymentOutcome::Failed => TicketStatus::Failed,
        }
    }
}

/// Result of applying a payment response to the ticket store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeApplication {
    /// `pending` moved to the outcome status.
    Applied,
    /// Ticket already holds the outcome status; redelivered event.
    Duplicate,
    /// Ticket is in a status the outcome cannot apply to.
    Stale(TicketStatus),
    UnknownTicket,
}

impl OutcomeApplication {
    /// Decide what a response means for a ticket currently in `current`.
    pub fn classify(current: TicketStatus, outcome: PaymentOutcome) -> Self {
        let target = TicketStatus::from(outcome);
        if current == TicketStatus::Pending {
            OutcomeApplication::Applied
        } else if current == target {
            OutcomeApplication::Duplicate
        } else {
            OutcomeApplication::Stale(current)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub id: String,
    pub flight_id: String,
    pub user_id: String,
    pub price: f64,
    pub status: TicketStatus,
    pub paid: bool,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn new(flight_id: String, user_id: String, price: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            flight_id,
            user_id,
            price,
            status: TicketStatus::Booked,
            paid: false,
            updated_at: Utc::now(),
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    /// Transition: Booked/Failed → Pending
    pub fn begin_payment(&mut self) -> Result<(), TicketError> {
        if !self.status.can_initiate_payment() {
            return Err(TicketError::InvalidTransition {
                from: self.status,
                to: TicketStatus::Pending,
            });
        }

        self.status = TicketStatus::Pending;
        self.paid = false;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transition: Pending → Paid/Failed. Anything else is left untouched.
    pub fn apply_outcome(&mut self, outcome: PaymentOutcome) -> OutcomeApplication {
        let application = OutcomeApplication::classify(self.status, outcome);
        if application == OutcomeApplication::Applied {
            self.status = TicketStatus::from(outcome);
            self.paid = self.status == TicketStatus::Paid;
            self.updated_at = Utc::now();
        }
        application
    }

    pub fn payment_request(&self) -> PaymentRequestEvent {
        PaymentRequestEvent {
            ticket_id: self.id.clone(),
            user_id: self.user_id.clone(),
            price: self.price,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TicketError {
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: TicketStatus, to: TicketStatus },

    #[error("Unknown ticket status: {0}")]
    UnknownStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket() -> Ticket {
        Ticket::new("FL-100".to_string(), "u1".to_string(), 2500.0)
    }

    #[test]
    fn test_ticket_lifecycle() {
        let mut ticket = ticket();
        assert_eq!(ticket.status, TicketStatus::Booked);

        // Booked → Pending
        ticket.begin_payment().unwrap();
        assert_eq!(ticket.status, TicketStatus::Pending);
        assert!(!ticket.paid);

        // Pending → Paid
        assert_eq!(ticket.apply_outcome(PaymentOutcome::Paid), OutcomeApplication::Applied);
        assert_eq!(ticket.status, TicketStatus::Paid);
        assert!(ticket.paid);
    }

    #[test]
    fn test_duplicate_outcome_is_noop() {
        let mut ticket = ticket();
        ticket.begin_payment().unwrap();
        ticket.apply_outcome(PaymentOutcome::Paid);
        let after_first = ticket.clone();

        assert_eq!(ticket.apply_outcome(PaymentOutcome::Paid), OutcomeApplication::Duplicate);
        assert_eq!(ticket, after_first);
    }

    #[test]
    fn test_booked_never_jumps_to_paid() {
        let mut ticket = ticket();

        let result = ticket.apply_outcome(PaymentOutcome::Paid);
        assert_eq!(result, OutcomeApplication::Stale(TicketStatus::Booked));
        assert_eq!(ticket.status, TicketStatus::Booked);
        assert!(!ticket.paid);
    }

    #[test]
    fn test_pending_and_paid_reject_new_payment() {
        let mut ticket = ticket();
        ticket.begin_payment().unwrap();
        assert!(ticket.begin_payment().is_err());

        ticket.apply_outcome(PaymentOutcome::Paid);
        assert_eq!(
            ticket.begin_payment(),
            Err(TicketError::InvalidTransition {
                from: TicketStatus::Paid,
                to: TicketStatus::Pending,
            })
        );
    }

    #[test]
    fn test_failed_payment_can_be_retried() {
        let mut ticket = ticket();
        ticket.begin_payment().unwrap();
        ticket.apply_outcome(PaymentOutcome::Failed);
        assert_eq!(ticket.status, TicketStatus::Failed);
        assert!(!ticket.paid);

        ticket.begin_payment().unwrap();
        assert_eq!(ticket.status, TicketStatus::Pending);
    }

    #[test]
    fn test_late_failure_does_not_undo_payment() {
        let mut ticket = ticket();
        ticket.begin_payment().unwrap();
        ticket.apply_outcome(PaymentOutcome::Paid);

        let result = ticket.apply_outcome(PaymentOutcome::Failed);
        assert_eq!(result, OutcomeApplication::Stale(TicketStatus::Paid));
        assert!(ticket.paid);
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [TicketStatus::Booked, TicketStatus::Pending, TicketStatus::Paid, TicketStatus::Failed] {
            assert_eq!(status.as_str().parse::<TicketStatus>().unwrap(), status);
        }
        assert!("payed".parse::<TicketStatus>().is_err());
    }
}
