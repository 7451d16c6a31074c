//! Ledger failure model.
//!
//! Every failure surfaced by an evaluate or submit call is a [`LedgerError`].
//! The raw backend shape (commit transaction code, per-peer endorsement
//! responses) is carried structurally in [`BackendError`] so classification
//! can pattern-match instead of probing fields.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ledgerq_core::TransactionId;

/// Commit status code reported when a transaction id was already committed.
pub const DUPLICATE_TXID: &str = "DUPLICATE_TXID";

/// Endorsement details prefix reported by peers for an already-seen id.
pub const DUPLICATE_TRANSACTION_FOUND: &str = "duplicate transaction found";

/// A failed evaluate or submit call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The contract rejected a create because the asset is already present.
    #[error("{message}")]
    AssetExists {
        message: String,
        transaction_id: TransactionId,
    },

    /// The contract could not find the asset it was asked to read or change.
    #[error("{message}")]
    AssetNotFound {
        message: String,
        transaction_id: TransactionId,
    },

    /// A transaction lookup found no such id in the ledger index.
    #[error("{message}")]
    TransactionNotFound {
        message: String,
        transaction_id: TransactionId,
    },

    /// Endorsement or commit confirmation did not finish in time.
    ///
    /// The transaction may still have been ordered.
    #[error("{message}")]
    Timeout {
        message: String,
        transaction_id: Option<TransactionId>,
    },

    /// Anything else reported by the network.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl LedgerError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(BackendError::new(message))
    }

    pub fn timeout(message: impl Into<String>, transaction_id: Option<TransactionId>) -> Self {
        Self::Timeout {
            message: message.into(),
            transaction_id,
        }
    }

    /// Raw message text, without any variant prefix.
    pub fn message(&self) -> &str {
        match self {
            LedgerError::AssetExists { message, .. }
            | LedgerError::AssetNotFound { message, .. }
            | LedgerError::TransactionNotFound { message, .. }
            | LedgerError::Timeout { message, .. } => message,
            LedgerError::Backend(backend) => &backend.message,
        }
    }

    pub fn transaction_id(&self) -> Option<&TransactionId> {
        match self {
            LedgerError::AssetExists { transaction_id, .. }
            | LedgerError::AssetNotFound { transaction_id, .. }
            | LedgerError::TransactionNotFound { transaction_id, .. } => Some(transaction_id),
            LedgerError::Timeout { transaction_id, .. } => transaction_id.as_ref(),
            LedgerError::Backend(_) => None,
        }
    }

    /// Errors raised by the smart contract itself; never worth retrying.
    pub fn is_domain_error(&self) -> bool {
        matches!(
            self,
            LedgerError::AssetExists { .. }
                | LedgerError::AssetNotFound { .. }
                | LedgerError::TransactionNotFound { .. }
        )
    }
}

/// Structured payload of a raw backend failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
#[serde(rename_all = "camelCase")]
pub struct BackendError {
    pub message: String,
    /// Validation code from a commit failure (e.g. `MVCC_READ_CONFLICT`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_code: Option<String>,
    /// Endorsement failures, one entry per failed proposal round.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<EndorsementFailure>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_transaction_code(mut self, code: impl Into<String>) -> Self {
        self.transaction_code = Some(code.into());
        self
    }

    pub fn with_failure(mut self, failure: EndorsementFailure) -> Self {
        self.failures.push(failure);
        self
    }
}

/// One failed endorsement round and the responses collected from peers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndorsementFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
    #[serde(default)]
    pub endorsements: Vec<EndorsementDetail>,
}

impl EndorsementFailure {
    pub fn new(endorsements: Vec<EndorsementDetail>) -> Self {
        Self {
            peer: None,
            endorsements,
        }
    }
}

/// A single peer's endorsement response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndorsementDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msp_id: Option<String>,
    pub details: String,
}

impl EndorsementDetail {
    pub fn new(details: impl Into<String>) -> Self {
        Self {
            address: None,
            msp_id: None,
            details: details.into(),
        }
    }
}
