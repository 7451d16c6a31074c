//! `ledgerq-core`: identifiers and error primitives shared by every crate.
//!
//! This crate has **no infrastructure concerns**: no I/O, no runtime.

pub mod error;
pub mod id;

pub use error::DomainError;
pub use id::{OrgId, TransactionId};
