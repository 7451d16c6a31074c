//! Error classification for ledger transactions.
//!
//! Contract errors are plain strings (they differ between chaincode
//! languages), so domain errors are recognised by lenient message families.
//! Retry decisions are then an exhaustive match over [`LedgerError`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ledgerq_core::TransactionId;

use crate::error::{BackendError, DUPLICATE_TRANSACTION_FOUND, DUPLICATE_TXID, LedgerError};

// "the asset %s already exists", "The asset ${id} already exists", "Asset %s already exists"
static ASSET_ALREADY_EXISTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(the )?asset \w* already exists").unwrap());

// "the asset %s does not exist", "The asset ${id} does not exist", "Asset %s does not exist"
static ASSET_DOES_NOT_EXIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(the )?asset \w* does not exist").unwrap());

// "Failed to get transaction with id %s, error Entry not found in index"
// "Failed to get transaction with id %s, error no such transaction ID [%s] in index"
static TRANSACTION_DOES_NOT_EXIST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"Failed to get transaction with id [^,]*, error (?:Entry not found|no such transaction ID \[[^\]]*\]) in index",
    )
    .unwrap()
});

/// How a failed submission may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryAction {
    /// Resubmit the same transaction; a new id could commit twice.
    SameTransactionId,
    /// Resubmit with a freshly minted transaction id.
    NewTransactionId,
    /// Terminal: duplicate transactions and contract errors.
    NoRetry,
}

impl RetryAction {
    pub fn is_retriable(self) -> bool {
        !matches!(self, RetryAction::NoRetry)
    }
}

/// Decide the retry action for a failed evaluate or submit.
pub fn classify(err: &LedgerError) -> RetryAction {
    match err {
        LedgerError::AssetExists { .. }
        | LedgerError::AssetNotFound { .. }
        | LedgerError::TransactionNotFound { .. } => RetryAction::NoRetry,
        LedgerError::Timeout { .. } => RetryAction::SameTransactionId,
        LedgerError::Backend(backend) if is_duplicate_backend(backend) => RetryAction::NoRetry,
        LedgerError::Backend(_) => RetryAction::NewTransactionId,
    }
}

/// Whether the failure means this transaction id was already committed.
///
/// A commit failure carries a transaction code; an endorsement failure only
/// carries per-peer detail strings, and any single peer reporting a duplicate
/// is enough.
pub fn is_duplicate_transaction(err: &LedgerError) -> bool {
    match err {
        LedgerError::Backend(backend) => is_duplicate_backend(backend),
        _ => false,
    }
}

fn is_duplicate_backend(backend: &BackendError) -> bool {
    debug!(error = %backend.message, "checking for duplicate transaction error");
    match &backend.transaction_code {
        Some(code) => code == DUPLICATE_TXID,
        None => backend.failures.iter().any(|failure| {
            failure
                .endorsements
                .iter()
                .any(|endorsement| endorsement.details.starts_with(DUPLICATE_TRANSACTION_FOUND))
        }),
    }
}

/// Translate a raw failure into a contract domain error when its message
/// matches a known family; otherwise return it unchanged.
pub fn to_domain_error(transaction_id: &TransactionId, err: LedgerError) -> LedgerError {
    if err.is_domain_error() {
        return err;
    }

    debug!(transaction_id = %transaction_id, error = %err, "processing error");

    if let Some(message) = find(&ASSET_ALREADY_EXISTS, err.message()) {
        return LedgerError::AssetExists {
            message,
            transaction_id: transaction_id.clone(),
        };
    }

    if let Some(message) = find(&ASSET_DOES_NOT_EXIST, err.message()) {
        return LedgerError::AssetNotFound {
            message,
            transaction_id: transaction_id.clone(),
        };
    }

    if let Some(message) = find(&TRANSACTION_DOES_NOT_EXIST, err.message()) {
        return LedgerError::TransactionNotFound {
            message,
            transaction_id: transaction_id.clone(),
        };
    }

    err
}

fn find(pattern: &Regex, message: &str) -> Option<String> {
    pattern.find(message).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::error::{EndorsementDetail, EndorsementFailure};

    fn txn1() -> TransactionId {
        TransactionId::new("txn1")
    }

    fn endorsement_error(details: &[&str]) -> LedgerError {
        let endorsements = details.iter().map(|d| EndorsementDetail::new(*d)).collect();
        LedgerError::Backend(
            BackendError::new("failed to endorse transaction")
                .with_failure(EndorsementFailure::new(endorsements)),
        )
    }

    #[test]
    fn duplicate_txid_transaction_code_is_duplicate() {
        let err = LedgerError::Backend(
            BackendError::new("commit failed").with_transaction_code(DUPLICATE_TXID),
        );
        assert!(is_duplicate_transaction(&err));
    }

    #[test]
    fn mvcc_read_conflict_transaction_code_is_not_duplicate() {
        let err = LedgerError::Backend(
            BackendError::new("commit failed").with_transaction_code("MVCC_READ_CONFLICT"),
        );
        assert!(!is_duplicate_transaction(&err));
    }

    #[test]
    fn transaction_code_takes_precedence_over_endorsements() {
        let err = LedgerError::Backend(
            BackendError::new("commit failed")
                .with_transaction_code("MVCC_READ_CONFLICT")
                .with_failure(EndorsementFailure::new(vec![EndorsementDetail::new(
                    "duplicate transaction found",
                )])),
        );
        assert!(!is_duplicate_transaction(&err));
    }

    #[test]
    fn all_endorsements_duplicate_is_duplicate() {
        let err = endorsement_error(&[
            "duplicate transaction found",
            "duplicate transaction found",
            "duplicate transaction found",
        ]);
        assert!(is_duplicate_transaction(&err));
    }

    #[test]
    fn one_duplicate_endorsement_is_enough() {
        let err = endorsement_error(&[
            "duplicate transaction found",
            "mock endorsement details",
            "mock endorsement details",
        ]);
        assert!(is_duplicate_transaction(&err));
    }

    #[test]
    fn duplicate_in_a_later_failure_entry_is_found() {
        let err = LedgerError::Backend(
            BackendError::new("failed to endorse transaction")
                .with_failure(EndorsementFailure::new(vec![EndorsementDetail::new("other")]))
                .with_failure(EndorsementFailure::new(vec![EndorsementDetail::new(
                    "duplicate transaction found: txn1",
                )])),
        );
        assert!(is_duplicate_transaction(&err));
    }

    #[test]
    fn no_duplicate_endorsement_is_not_duplicate() {
        let err = endorsement_error(&["mock endorsement details", "mock endorsement details"]);
        assert!(!is_duplicate_transaction(&err));
    }

    #[test]
    fn failure_without_endorsements_is_not_duplicate() {
        let err = LedgerError::Backend(
            BackendError::new("failed").with_failure(EndorsementFailure::default()),
        );
        assert!(!is_duplicate_transaction(&err));
    }

    #[test]
    fn plain_message_mentioning_duplicate_is_not_duplicate() {
        assert!(!is_duplicate_transaction(&LedgerError::backend(
            "duplicate transaction found"
        )));
    }

    #[test]
    fn duplicates_and_contract_errors_are_not_retried() {
        let duplicate = endorsement_error(&["duplicate transaction found"]);
        assert_eq!(classify(&duplicate), RetryAction::NoRetry);

        let not_found = LedgerError::TransactionNotFound {
            message: "Failed to get transaction with id txn, error Entry not found in index"
                .to_string(),
            transaction_id: txn1(),
        };
        assert_eq!(classify(&not_found), RetryAction::NoRetry);

        let exists = LedgerError::AssetExists {
            message: "The asset MOCK_ASSET already exists".to_string(),
            transaction_id: txn1(),
        };
        assert_eq!(classify(&exists), RetryAction::NoRetry);

        let missing = LedgerError::AssetNotFound {
            message: "the asset MOCK_ASSET does not exist".to_string(),
            transaction_id: txn1(),
        };
        assert_eq!(classify(&missing), RetryAction::NoRetry);
    }

    #[test]
    fn timeouts_reuse_the_transaction_id() {
        let err = LedgerError::timeout("MOCK TIMEOUT ERROR", Some(txn1()));
        assert_eq!(classify(&err), RetryAction::SameTransactionId);
    }

    #[test]
    fn other_errors_get_a_new_transaction_id() {
        let mvcc = LedgerError::Backend(
            BackendError::new("commit failed").with_transaction_code("MVCC_READ_CONFLICT"),
        );
        assert_eq!(classify(&mvcc), RetryAction::NewTransactionId);
        assert_eq!(
            classify(&LedgerError::backend("MOCK ERROR")),
            RetryAction::NewTransactionId
        );
    }

    #[test]
    fn asset_exists_messages_map_to_asset_exists() {
        for msg in [
            "the asset GOCHAINCODE already exists",
            "Asset JAVACHAINCODE already exists",
            "The asset JSCHAINCODE already exists",
        ] {
            assert_eq!(
                to_domain_error(&txn1(), LedgerError::backend(msg)),
                LedgerError::AssetExists {
                    message: msg.to_string(),
                    transaction_id: txn1(),
                }
            );
        }
    }

    #[test]
    fn asset_missing_messages_map_to_asset_not_found() {
        for msg in [
            "the asset GOCHAINCODE does not exist",
            "Asset JAVACHAINCODE does not exist",
            "The asset JSCHAINCODE does not exist",
        ] {
            assert_eq!(
                to_domain_error(&txn1(), LedgerError::backend(msg)),
                LedgerError::AssetNotFound {
                    message: msg.to_string(),
                    transaction_id: txn1(),
                }
            );
        }
    }

    #[test]
    fn transaction_lookup_messages_map_to_transaction_not_found() {
        for msg in [
            "Failed to get transaction with id txn, error Entry not found in index",
            "Failed to get transaction with id txn, error no such transaction ID [txn] in index",
        ] {
            assert_eq!(
                to_domain_error(&txn1(), LedgerError::backend(msg)),
                LedgerError::TransactionNotFound {
                    message: msg.to_string(),
                    transaction_id: txn1(),
                }
            );
        }
    }

    #[test]
    fn matched_text_is_extracted_from_wrapped_messages() {
        let err = LedgerError::backend(
            "error in simulation: transaction returned with failure: Error: The asset lote1 already exists",
        );
        assert_eq!(
            to_domain_error(&txn1(), err),
            LedgerError::AssetExists {
                message: "The asset lote1 already exists".to_string(),
                transaction_id: txn1(),
            }
        );
    }

    #[test]
    fn unmatched_errors_pass_through_unchanged() {
        let err = LedgerError::backend("MOCK ERROR");
        assert_eq!(to_domain_error(&txn1(), err.clone()), err);

        let timeout = LedgerError::timeout("MOCK TIMEOUT ERROR", None);
        assert_eq!(to_domain_error(&txn1(), timeout.clone()), timeout);
    }

    #[test]
    fn domain_errors_keep_their_original_transaction_id() {
        let err = LedgerError::AssetNotFound {
            message: "the asset A does not exist".to_string(),
            transaction_id: TransactionId::new("original"),
        };
        assert_eq!(to_domain_error(&txn1(), err.clone()), err);
    }

    proptest! {
        #[test]
        fn asset_exists_family_matches_article_and_case_variants(
            article in prop::sample::select(vec!["the asset", "The asset", "Asset", "asset", "THE ASSET"]),
            id in "[A-Za-z0-9_]{1,16}",
        ) {
            let msg = format!("{article} {id} already exists");
            let mapped = to_domain_error(&txn1(), LedgerError::backend(msg.clone()));
            prop_assert_eq!(mapped, LedgerError::AssetExists { message: msg, transaction_id: txn1() });
        }

        #[test]
        fn asset_missing_family_matches_article_and_case_variants(
            article in prop::sample::select(vec!["the asset", "The asset", "Asset", "asset"]),
            id in "[A-Za-z0-9_]{1,16}",
        ) {
            let msg = format!("{article} {id} does not exist");
            let mapped = to_domain_error(&txn1(), LedgerError::backend(msg.clone()));
            prop_assert_eq!(mapped, LedgerError::AssetNotFound { message: msg, transaction_id: txn1() });
        }

        #[test]
        fn classify_is_total_over_backend_messages(msg in ".*") {
            let action = classify(&LedgerError::backend(msg));
            prop_assert_eq!(action, RetryAction::NewTransactionId);
        }
    }
}
