//! Delivery state machine shared by applications and campaign recipients.
//!
//! ```text
//! pending ──► sent ──► accepted
//!    │          └────► rejected
//!    └──────► failed
//! ```
//!
//! Transitions only move forward. Nothing re-enters `pending`, and `failed`
//! is left only by a fresh attempt under a new ledger reservation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Accepted,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid delivery transition {from} -> {to}")]
pub struct TransitionError {
    pub from: DeliveryStatus,
    pub to: DeliveryStatus,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Accepted => "accepted",
            DeliveryStatus::Rejected => "rejected",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        matches!(
            (self, next),
            (Pending, Sent) | (Pending, Failed) | (Sent, Accepted) | (Sent, Rejected)
        )
    }

    pub fn transition(self, next: DeliveryStatus) -> Result<DeliveryStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "sent" => Ok(DeliveryStatus::Sent),
            "accepted" => Ok(DeliveryStatus::Accepted),
            "rejected" => Ok(DeliveryStatus::Rejected),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(format!("unknown delivery status '{other}'")),
        }
    }
}

/// Why a unit of work ended in `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    JobNotFound,
    CompanyNotFound,
    CatalogUnavailable,
    MissingRecipient,
    InvalidAddress,
    Timeout,
    Connection,
    TransportUnavailable,
    Rejected,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::JobNotFound => "job_not_found",
            FailureKind::CompanyNotFound => "company_not_found",
            FailureKind::CatalogUnavailable => "catalog_unavailable",
            FailureKind::MissingRecipient => "missing_recipient",
            FailureKind::InvalidAddress => "invalid_address",
            FailureKind::Timeout => "timeout",
            FailureKind::Connection => "connection",
            FailureKind::TransportUnavailable => "transport_unavailable",
            FailureKind::Rejected => "rejected",
        }
    }

    /// Transient failures are retried by the dispatcher; everything else is final.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            FailureKind::Timeout | FailureKind::Connection | FailureKind::TransportUnavailable
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "job_not_found" => Ok(FailureKind::JobNotFound),
            "company_not_found" => Ok(FailureKind::CompanyNotFound),
            "catalog_unavailable" => Ok(FailureKind::CatalogUnavailable),
            "missing_recipient" => Ok(FailureKind::MissingRecipient),
            "invalid_address" => Ok(FailureKind::InvalidAddress),
            "timeout" => Ok(FailureKind::Timeout),
            "connection" => Ok(FailureKind::Connection),
            "transport_unavailable" => Ok(FailureKind::TransportUnavailable),
            "rejected" => Ok(FailureKind::Rejected),
            other => Err(format!("unknown failure kind '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeliveryStatus::*;

    const ALL: [DeliveryStatus; 5] = [Pending, Sent, Accepted, Rejected, Failed];

    #[test]
    fn test_forward_transitions_allowed() {
        assert_eq!(Pending.transition(Sent), Ok(Sent));
        assert_eq!(Pending.transition(Failed), Ok(Failed));
        assert_eq!(Sent.transition(Accepted), Ok(Accepted));
        assert_eq!(Sent.transition(Rejected), Ok(Rejected));
    }

    #[test]
    fn test_nothing_reenters_pending() {
        for from in ALL {
            assert!(!from.can_transition_to(Pending), "{from} -> pending allowed");
        }
    }

    #[test]
    fn test_terminal_states_have_no_successors() {
        for from in [Accepted, Rejected, Failed] {
            for to in ALL {
                assert!(from.transition(to).is_err(), "{from} -> {to} allowed");
            }
        }
    }

    #[test]
    fn test_sent_cannot_fail_or_skip_back() {
        assert_eq!(
            Sent.transition(Failed),
            Err(TransitionError {
                from: Sent,
                to: Failed
            })
        );
        assert!(Pending.transition(Accepted).is_err());
    }

    #[test]
    fn test_status_string_round_trip() {
        for s in ALL {
            assert_eq!(s.as_str().parse::<DeliveryStatus>(), Ok(s));
        }
        assert!("bounced".parse::<DeliveryStatus>().is_err());
    }

    #[test]
    fn test_transient_classification() {
        assert!(FailureKind::Timeout.is_transient());
        assert!(FailureKind::TransportUnavailable.is_transient());
        assert!(!FailureKind::InvalidAddress.is_transient());
        assert!(!FailureKind::Rejected.is_transient());
        assert!(!FailureKind::JobNotFound.is_transient());
    }
}
