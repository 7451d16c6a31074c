//! In-process simulated ledger network.
//!
//! Runs the asset-transfer chaincode against an in-memory world state and
//! keeps a committed-transaction index, so duplicate ids are rejected the way
//! a real orderer rejects them. Faults can be queued to exercise timeouts and
//! transient failures.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use ledgerq_core::{OrgId, TransactionId};

use crate::asset::Asset;
use crate::contract::{Contract, SystemContract, Transaction};
use crate::error::{BackendError, DUPLICATE_TXID, LedgerError};

const VALID: &str = "VALID";

/// A fault applied to the next submission.
#[derive(Debug, Clone)]
pub enum SubmitFault {
    /// Fail with this error; nothing is committed.
    Reject(LedgerError),
    /// Commit, then report a timeout to the caller.
    CommitThenTimeout,
    /// Hold the submission this long before running it.
    Delay(Duration),
}

#[derive(Debug, Default)]
struct NetworkState {
    assets: BTreeMap<String, Asset>,
    committed: HashMap<TransactionId, String>,
    block_height: u64,
    faults: VecDeque<SubmitFault>,
    submissions: Vec<TransactionId>,
}

/// Shared simulated network. Each organization gets its own
/// [`InMemoryContract`] over the same world state.
#[derive(Debug)]
pub struct InMemoryNetwork {
    state: Mutex<NetworkState>,
}

impl Default for InMemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(NetworkState {
                block_height: 1,
                ..Default::default()
            }),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn contract(self: &Arc<Self>, org: OrgId) -> InMemoryContract {
        InMemoryContract {
            network: Arc::clone(self),
            org,
        }
    }

    /// Queue a fault for a future submission (FIFO).
    pub async fn inject_fault(&self, fault: SubmitFault) {
        self.state.lock().await.faults.push_back(fault);
    }

    /// Every transaction id that reached the network, in arrival order.
    pub async fn submissions(&self) -> Vec<TransactionId> {
        self.state.lock().await.submissions.clone()
    }

    pub async fn asset(&self, id: &str) -> Option<Asset> {
        self.state.lock().await.assets.get(id).cloned()
    }

    pub async fn is_committed(&self, transaction_id: &TransactionId) -> bool {
        self.state.lock().await.committed.contains_key(transaction_id)
    }
}

/// Transaction handle for the simulated network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InMemoryTransaction {
    transaction_id: TransactionId,
    name: String,
}

impl Transaction for InMemoryTransaction {
    fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn serialize(&self) -> Result<Vec<u8>, LedgerError> {
        serde_json::to_vec(self)
            .map_err(|e| LedgerError::backend(format!("failed to serialize transaction: {e}")))
    }
}

/// The asset-transfer contract as seen by one organization.
#[derive(Debug, Clone)]
pub struct InMemoryContract {
    network: Arc<InMemoryNetwork>,
    org: OrgId,
}

impl InMemoryContract {
    pub fn org(&self) -> &OrgId {
        &self.org
    }

    pub fn network(&self) -> &Arc<InMemoryNetwork> {
        &self.network
    }
}

#[async_trait]
impl Contract for InMemoryContract {
    type Transaction = InMemoryTransaction;

    fn create_transaction(&self, name: &str) -> InMemoryTransaction {
        InMemoryTransaction {
            transaction_id: TransactionId::new(Uuid::now_v7().simple().to_string()),
            name: name.to_string(),
        }
    }

    fn deserialize_transaction(&self, state: &[u8]) -> Result<InMemoryTransaction, LedgerError> {
        serde_json::from_slice(state)
            .map_err(|e| LedgerError::backend(format!("invalid transaction state: {e}")))
    }

    async fn evaluate(
        &self,
        tx: &InMemoryTransaction,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        // Queries run against a snapshot; nothing is written back.
        let mut snapshot = self.network.state.lock().await.assets.clone();
        invoke(&mut snapshot, &tx.name, args).map_err(endorsement_failure)
    }

    async fn submit(&self, tx: &InMemoryTransaction, args: &[String]) -> Result<Vec<u8>, LedgerError> {
        let fault = self.network.state.lock().await.faults.pop_front();
        let mut commit_then_timeout = false;
        let mut rejection = None;
        match fault {
            Some(SubmitFault::Delay(delay)) => tokio::time::sleep(delay).await,
            Some(SubmitFault::Reject(err)) => rejection = Some(err),
            Some(SubmitFault::CommitThenTimeout) => commit_then_timeout = true,
            None => {}
        }

        let mut state = self.network.state.lock().await;
        state.submissions.push(tx.transaction_id.clone());
        debug!(org = %self.org, transaction = %tx.name, transaction_id = %tx.transaction_id, "submission received");

        if let Some(err) = rejection {
            return Err(err);
        }

        if state.committed.contains_key(&tx.transaction_id) {
            return Err(LedgerError::Backend(
                BackendError::new(format!(
                    "transaction {} failed to commit with status code 30 ({DUPLICATE_TXID})",
                    tx.transaction_id
                ))
                .with_transaction_code(DUPLICATE_TXID),
            ));
        }

        let payload = invoke(&mut state.assets, &tx.name, args).map_err(endorsement_failure)?;
        state.committed.insert(tx.transaction_id.clone(), VALID.to_string());
        state.block_height += 1;

        if commit_then_timeout {
            return Err(LedgerError::timeout(
                format!("timed out waiting for commit status of {}", tx.transaction_id),
                Some(tx.transaction_id.clone()),
            ));
        }
        Ok(payload)
    }
}

#[async_trait]
impl SystemContract for InMemoryContract {
    async fn block_height(&self) -> Result<u64, LedgerError> {
        Ok(self.network.state.lock().await.block_height)
    }

    async fn transaction_validation_code(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<String, LedgerError> {
        self.network
            .state
            .lock()
            .await
            .committed
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| {
                LedgerError::backend(format!(
                    "Failed to get transaction with id {transaction_id}, error Entry not found in index"
                ))
            })
    }
}

fn endorsement_failure(message: String) -> LedgerError {
    LedgerError::backend(format!(
        "error in simulation: transaction returned with failure: Error: {message}"
    ))
}

fn expect_args(args: &[String], count: usize) -> Result<(), String> {
    if args.len() != count {
        return Err(format!(
            "Expected {count} parameters, but {} have been supplied",
            args.len()
        ));
    }
    Ok(())
}

fn read(assets: &BTreeMap<String, Asset>, id: &str) -> Result<Asset, String> {
    assets
        .get(id)
        .cloned()
        .ok_or_else(|| format!("The asset {id} does not exist"))
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, String> {
    serde_json::to_vec(value).map_err(|e| e.to_string())
}

/// Chaincode dispatch. Errors are the contract's plain messages.
fn invoke(
    assets: &mut BTreeMap<String, Asset>,
    name: &str,
    args: &[String],
) -> Result<Vec<u8>, String> {
    match name {
        "InitLedger" => {
            for asset in Asset::seed() {
                assets.insert(asset.id.clone(), asset);
            }
            Ok(Vec::new())
        }
        "CreateAsset" => {
            expect_args(args, 7)?;
            let id = &args[0];
            if assets.contains_key(id) {
                return Err(format!("The asset {id} already exists"));
            }
            let asset = Asset::from_args(args).ok_or("invalid asset")?;
            let payload = to_json(&asset)?;
            assets.insert(asset.id.clone(), asset);
            Ok(payload)
        }
        "ReadAsset" => {
            expect_args(args, 1)?;
            to_json(&read(assets, &args[0])?)
        }
        "UpdateAsset" => {
            expect_args(args, 7)?;
            read(assets, &args[0])?;
            let asset = Asset::from_args(args).ok_or("invalid asset")?;
            assets.insert(asset.id.clone(), asset);
            Ok(Vec::new())
        }
        "DeleteAsset" => {
            expect_args(args, 1)?;
            read(assets, &args[0])?;
            assets.remove(&args[0]);
            Ok(Vec::new())
        }
        "AssetExists" => {
            expect_args(args, 1)?;
            Ok(assets.contains_key(&args[0]).to_string().into_bytes())
        }
        "TransferAsset" => {
            expect_args(args, 2)?;
            let mut asset = read(assets, &args[0])?;
            let old_owner = std::mem::replace(&mut asset.owner, args[1].clone());
            assets.insert(asset.id.clone(), asset);
            Ok(old_owner.into_bytes())
        }
        "GetAllAssets" => {
            expect_args(args, 0)?;
            to_json(&assets.values().collect::<Vec<_>>())
        }
        other => Err(format!(
            "You've asked to invoke a function that does not exist: {other}"
        )),
    }
}
