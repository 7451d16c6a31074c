//! `ledgerq-ledger`: everything that talks to the ledger network.
//!
//! - `error`: tagged-union failures surfaced by evaluate/submit
//! - `classify`: domain-error mapping and retry classification
//! - `contract`: the narrow seam a ledger client implements
//! - `gateway`: timeout-bounded evaluate/submit with error translation
//! - `memory`: in-process simulated network running the asset chaincode
//! - `asset`: the asset record stored by the chaincode

pub mod asset;
pub mod classify;
pub mod contract;
pub mod error;
pub mod gateway;
pub mod memory;

pub use asset::Asset;
pub use classify::{RetryAction, classify, is_duplicate_transaction, to_domain_error};
pub use contract::{Contract, SystemContract, Transaction};
pub use error::{BackendError, EndorsementDetail, EndorsementFailure, LedgerError};
pub use gateway::{Gateway, GatewayOptions, GatewayRegistry};
pub use memory::{InMemoryContract, InMemoryNetwork, InMemoryTransaction, SubmitFault};
