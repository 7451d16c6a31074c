//! The narrow seam a ledger client implements.
//!
//! A transaction handle carries a single transaction identity. Serializing it
//! and later deserializing it yields the same identity, which is what lets a
//! timed-out submission be retried without risking a second commit.

use async_trait::async_trait;

use ledgerq_core::TransactionId;

use crate::error::LedgerError;

/// A proposed transaction and its identity.
pub trait Transaction: Send + Sync {
    fn transaction_id(&self) -> &TransactionId;

    /// Name of the contract function this transaction invokes.
    fn name(&self) -> &str;

    /// Opaque continuation state; feed it back to
    /// [`Contract::deserialize_transaction`] to rebuild the same handle.
    fn serialize(&self) -> Result<Vec<u8>, LedgerError>;
}

/// A smart contract bound to one organization's identity.
#[async_trait]
pub trait Contract: Send + Sync + 'static {
    type Transaction: Transaction + 'static;

    /// Create a handle with a freshly minted transaction id.
    fn create_transaction(&self, name: &str) -> Self::Transaction;

    fn deserialize_transaction(&self, state: &[u8]) -> Result<Self::Transaction, LedgerError>;

    /// Run the transaction on a peer without ordering it.
    async fn evaluate(&self, tx: &Self::Transaction, args: &[String])
    -> Result<Vec<u8>, LedgerError>;

    /// Endorse, order and wait for the commit of the transaction.
    async fn submit(&self, tx: &Self::Transaction, args: &[String]) -> Result<Vec<u8>, LedgerError>;
}

/// Read-only access to the network's system chaincode.
#[async_trait]
pub trait SystemContract: Send + Sync + 'static {
    async fn block_height(&self) -> Result<u64, LedgerError>;

    /// Validation code recorded for a committed transaction (e.g. `VALID`).
    async fn transaction_validation_code(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<String, LedgerError>;
}
