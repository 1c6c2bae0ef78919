//! The inquiry lifecycle state machine.
//!
//! Every status change in the pipeline flows through [`transition`], the
//! single place that knows which moves are legal. Handlers never re-derive
//! legality themselves; they ask, then persist with a compare-and-swap on
//! the status they observed (see `InquiryStore::transition_inquiry`).

use serde::{Deserialize, Serialize};

/// Lifecycle status of an inquiry.
///
/// `Cancelled` is defined for completeness: it is reachable only by manual
/// or external intervention, never produced by a transition here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InquiryStatus {
    PendingOwner,
    Approved,
    AwaitingPayment,
    Paid,
    Declined,
    Cancelled,
}

impl InquiryStatus {
    pub const fn label(self) -> &'static str {
        match self {
            InquiryStatus::PendingOwner => "pending_owner",
            InquiryStatus::Approved => "approved",
            InquiryStatus::AwaitingPayment => "awaiting_payment",
            InquiryStatus::Paid => "paid",
            InquiryStatus::Declined => "declined",
            InquiryStatus::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            InquiryStatus::Paid | InquiryStatus::Declined | InquiryStatus::Cancelled
        )
    }
}

/// Events that drive the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    OwnerApproved,
    OwnerDeclined,
    CheckoutSessionCreated,
    PaymentCompleted,
    CheckoutExpired,
}

/// Attempted move that the transition table does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition: {event:?} while {from:?}")]
pub struct IllegalTransition {
    pub from: InquiryStatus,
    pub event: LifecycleEvent,
}

/// Resolve the next status for `event` applied to `current`.
///
/// Checkout expiry rolls back to `Approved`, not `PendingOwner`: the
/// approval decision still stands, only the payment attempt lapsed, and the
/// inquiry may re-enter `AwaitingPayment` when a fresh session is created.
pub fn transition(
    current: InquiryStatus,
    event: LifecycleEvent,
) -> Result<InquiryStatus, IllegalTransition> {
    use InquiryStatus::*;
    use LifecycleEvent::*;

    match (current, event) {
        (PendingOwner, OwnerApproved) => Ok(Approved),
        (PendingOwner, OwnerDeclined) => Ok(Declined),
        (Approved, CheckoutSessionCreated) => Ok(AwaitingPayment),
        (AwaitingPayment, PaymentCompleted) => Ok(Paid),
        (AwaitingPayment, CheckoutExpired) => Ok(Approved),
        (from, event) => Err(IllegalTransition { from, event }),
    }
}
