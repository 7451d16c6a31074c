//! Ledger gateway client.
//!
//! A [`Gateway`] is a long-lived binding of one organization to a contract.
//! Every call is bounded by the configured timeouts and every failure is
//! passed through [`to_domain_error`] before it reaches the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::debug;

use ledgerq_core::{OrgId, TransactionId};

use crate::classify::to_domain_error;
use crate::contract::{Contract, SystemContract, Transaction};
use crate::error::LedgerError;

/// Timeouts applied by a [`Gateway`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayOptions {
    pub endorse_timeout: Duration,
    pub commit_timeout: Duration,
    pub query_timeout: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            endorse_timeout: Duration::from_secs(30),
            commit_timeout: Duration::from_secs(300),
            query_timeout: Duration::from_secs(3),
        }
    }
}

impl GatewayOptions {
    /// Upper bound for a whole submit: endorsement plus commit wait.
    pub fn submit_timeout(&self) -> Duration {
        self.endorse_timeout + self.commit_timeout
    }
}

/// One organization's connection to a contract.
pub struct Gateway<C> {
    org: OrgId,
    contract: Arc<C>,
    options: GatewayOptions,
}

impl<C> Clone for Gateway<C> {
    fn clone(&self) -> Self {
        Self {
            org: self.org.clone(),
            contract: Arc::clone(&self.contract),
            options: self.options,
        }
    }
}

impl<C> std::fmt::Debug for Gateway<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("org", &self.org)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<C> Gateway<C> {
    pub fn new(org: OrgId, contract: Arc<C>, options: GatewayOptions) -> Self {
        Self {
            org,
            contract,
            options,
        }
    }

    pub fn org(&self) -> &OrgId {
        &self.org
    }

    pub fn contract(&self) -> &Arc<C> {
        &self.contract
    }

    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }
}

impl<C: Contract> Gateway<C> {
    pub fn create_transaction(&self, name: &str) -> C::Transaction {
        self.contract.create_transaction(name)
    }

    pub fn deserialize_transaction(&self, state: &[u8]) -> Result<C::Transaction, LedgerError> {
        self.contract.deserialize_transaction(state)
    }

    /// Evaluate a query transaction under the query timeout.
    pub async fn evaluate_transaction(
        &self,
        name: &str,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        let tx = self.contract.create_transaction(name);
        let transaction_id = tx.transaction_id().clone();
        debug!(org = %self.org, transaction = name, transaction_id = %transaction_id, "evaluating transaction");

        let result = match timeout(self.options.query_timeout, self.contract.evaluate(&tx, args)).await {
            Ok(result) => result,
            Err(_) => Err(elapsed(name, &transaction_id, self.options.query_timeout)),
        };

        result.map_err(|err| to_domain_error(&transaction_id, err))
    }

    /// Submit a transaction and wait for its commit.
    ///
    /// Exceeding endorse + commit timeouts yields [`LedgerError::Timeout`];
    /// the transaction may still commit later under the same id.
    pub async fn submit(&self, tx: &C::Transaction, args: &[String]) -> Result<Vec<u8>, LedgerError> {
        let transaction_id = tx.transaction_id().clone();
        let limit = self.options.submit_timeout();

        let result = match timeout(limit, self.contract.submit(tx, args)).await {
            Ok(result) => result,
            Err(_) => Err(elapsed(tx.name(), &transaction_id, limit)),
        };

        result.map_err(|err| to_domain_error(&transaction_id, err))
    }
}

impl<C: SystemContract> Gateway<C> {
    pub async fn block_height(&self) -> Result<u64, LedgerError> {
        match timeout(self.options.query_timeout, self.contract.block_height()).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::timeout(
                format!("GetChainInfo timed out after {:?}", self.options.query_timeout),
                None,
            )),
        }
    }

    pub async fn transaction_validation_code(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<String, LedgerError> {
        let result = match timeout(
            self.options.query_timeout,
            self.contract.transaction_validation_code(transaction_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(elapsed(
                "GetTransactionByID",
                transaction_id,
                self.options.query_timeout,
            )),
        };

        result.map_err(|err| to_domain_error(transaction_id, err))
    }
}

fn elapsed(name: &str, transaction_id: &TransactionId, limit: Duration) -> LedgerError {
    LedgerError::timeout(
        format!("{name} transaction {transaction_id} timed out after {limit:?}"),
        Some(transaction_id.clone()),
    )
}

/// Gateways keyed by organization id.
pub struct GatewayRegistry<C> {
    gateways: HashMap<OrgId, Gateway<C>>,
}

impl<C> Default for GatewayRegistry<C> {
    fn default() -> Self {
        Self {
            gateways: HashMap::new(),
        }
    }
}

impl<C> Clone for GatewayRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            gateways: self.gateways.clone(),
        }
    }
}

impl<C> std::fmt::Debug for GatewayRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.gateways.keys()).finish()
    }
}

impl<C> GatewayRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, gateway: Gateway<C>) {
        self.gateways.insert(gateway.org().clone(), gateway);
    }

    pub fn with(mut self, gateway: Gateway<C>) -> Self {
        self.insert(gateway);
        self
    }

    pub fn get(&self, org: &OrgId) -> Option<&Gateway<C>> {
        self.gateways.get(org)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Gateway<C>> {
        self.gateways.values()
    }

    pub fn len(&self) -> usize {
        self.gateways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }
}
