//! Idempotency Ledger: one reservation per unit of work, taken before any
//! side effect happens.
//!
//! A unit is an (application: user, resume, job) triple or a
//! (campaign, company, address) recipient. The fingerprint is a SHA-256 over
//! the unit's fields, so the same unit always maps to the same ledger key no
//! matter which request carries it.
//!
//! Entry lifecycle: `in_flight` on reserve, then `completed` or `failed` once
//! the unit is persisted. `completed` entries are permanent. The owner of an
//! `in_flight` entry may release it when the unit never sent anything; a
//! deliberate retry may only release a `failed` entry it can name.

#[cfg(test)]
pub mod memory;
pub mod postgres;
pub mod redis;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ledger redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Corrupt ledger entry: {0}")]
    Corrupt(String),

    #[error("Reservation for {0} kept disappearing under contention")]
    Contended(String),
}

/// The unit of work a fingerprint identifies.
#[derive(Debug, Clone, Copy)]
pub enum UnitOfWork<'a> {
    Application {
        user_id: &'a str,
        resume_id: Uuid,
        job_id: &'a str,
    },
    CampaignRecipient {
        campaign_id: Uuid,
        company_name: &'a str,
        address: &'a str,
    },
}

impl UnitOfWork<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            UnitOfWork::Application { .. } => "application",
            UnitOfWork::CampaignRecipient { .. } => "campaign_recipient",
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(self.kind().as_bytes());
        match self {
            UnitOfWork::Application {
                user_id,
                resume_id,
                job_id,
            } => {
                let resume_id = resume_id.to_string();
                for part in [*user_id, resume_id.as_str(), *job_id] {
                    hasher.update([0x1f]);
                    hasher.update(part.as_bytes());
                }
            }
            UnitOfWork::CampaignRecipient {
                campaign_id,
                company_name,
                address,
            } => {
                // Company and address compare case-insensitively everywhere else too.
                let company = company_name.trim().to_lowercase();
                let address = address.trim().to_lowercase();
                for part in [campaign_id.to_string(), company, address] {
                    hasher.update([0x1f]);
                    hasher.update(part.as_bytes());
                }
            }
        }
        Fingerprint {
            kind: self.kind(),
            digest: hex::encode(hasher.finalize()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    kind: &'static str,
    digest: String,
}

impl Fingerprint {
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, &self.digest[..12.min(self.digest.len())])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerState {
    InFlight,
    Completed,
    Failed,
}

impl LedgerState {
    pub fn as_str(self) -> &'static str {
        match self {
            LedgerState::InFlight => "in_flight",
            LedgerState::Completed => "completed",
            LedgerState::Failed => "failed",
        }
    }
}

impl FromStr for LedgerState {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_flight" => Ok(LedgerState::InFlight),
            "completed" => Ok(LedgerState::Completed),
            "failed" => Ok(LedgerState::Failed),
            other => Err(LedgerError::Corrupt(format!("unknown state '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Acquired,
    /// Someone already owns this unit. `record_id` is the record they are
    /// writing (or wrote).
    AlreadyExists { record_id: Uuid, state: LedgerState },
}

#[async_trait]
pub trait IdempotencyLedger: Send + Sync {
    /// Atomically claims `fingerprint` for `record_id`. Exactly one of any
    /// number of concurrent callers gets `Acquired`.
    async fn reserve(
        &self,
        fingerprint: &Fingerprint,
        record_id: Uuid,
    ) -> Result<Reservation, LedgerError>;

    /// Moves an `in_flight` entry to its terminal ledger state.
    async fn finish(&self, fingerprint: &Fingerprint, state: LedgerState)
        -> Result<(), LedgerError>;

    /// Drops an `in_flight` or `failed` entry. Returns false when there was
    /// nothing releasable (missing or `completed`). Only the caller holding
    /// the reservation may use this on an `in_flight` entry.
    async fn release(&self, fingerprint: &Fingerprint) -> Result<bool, LedgerError>;

    /// Drops the entry only while it is `failed` and still points at
    /// `record_id`. An entry that was re-reserved in the meantime is left
    /// alone and false is returned.
    async fn release_failed(
        &self,
        fingerprint: &Fingerprint,
        record_id: Uuid,
    ) -> Result<bool, LedgerError>;
}
