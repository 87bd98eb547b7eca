//! External collaborator contracts (spec.md §6). Transport, persistence,
//! and the CLI are out of scope; only their traits live here, so the
//! wallet pipeline in [`crate::wallet`] can be driven against a fake in
//! tests and a real implementation in production without code changes.
use async_trait::async_trait;

use crate::{errors::Result, record::Record};

/// One block in the ledger's chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub number: i64,
    pub hash: String,
    pub parent_hash: Option<String>,
}

/// `(LockerID, ParticipantID, ID, BlockNumber, Operation, ImpressionID,
/// ContentType, Status)` (spec.md §3).
#[derive(Clone, Debug)]
pub struct RecordState {
    pub locker_id: String,
    pub participant_id: String,
    pub record_id: String,
    pub block_number: i64,
    pub operation: crate::record::OperationType,
    pub impression_id: Option<String>,
    pub content_type: Option<String>,
    pub status: crate::record::RecordStatus,
}

/// Whether a data asset has ever been bound into a record, as seen by the
/// ledger (spec.md §4.5 step (i): an empty access token is acceptable only
/// when the asset is brand new and nothing has published it yet).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataAssetState {
    NotFound,
    Active,
    Revoked,
}

#[async_trait]
pub trait LedgerService: Send + Sync {
    async fn genesis_block(&self) -> Result<Block>;
    async fn top_block(&self) -> Result<Block>;
    async fn block(&self, number: i64) -> Result<Block>;
    async fn chain(&self, start: i64, depth: i64) -> Result<Vec<Block>>;
    /// Record IDs in block order, one inner vec per block.
    async fn block_records(&self, number: i64) -> Result<Vec<Vec<String>>>;
    async fn record(&self, record_id: &str) -> Result<Record>;
    async fn submit_record(&self, record: &Record) -> Result<()>;
    async fn record_state(&self, record_id: &str) -> Result<RecordState>;
    async fn asset_head(&self, head_id: &str) -> Result<Record>;
    /// `GetDataAssetState`: whether `asset` has ever appeared in a
    /// published record's `DataAssets` list.
    async fn data_asset_state(&self, asset: &str) -> Result<DataAssetState>;
}

#[async_trait]
pub trait OffchainStore: Send + Sync {
    async fn get_operation(&self, address: &str) -> Result<Vec<u8>>;
    /// Addresses are content-derived: sending the same bytes twice MUST
    /// return the same address (callers rely on this for idempotent
    /// resubmission after a crash between vault upload and ledger submit).
    async fn send_operation(&self, payload: &[u8]) -> Result<String>;
    async fn purge_operation(&self, address: &str) -> Result<()>;
}

/// Capabilities a vault declares, used by the submit pipeline to decide
/// whether to encrypt a blob client-side before upload (spec.md §4.7).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VaultProperties {
    /// Server-side encryption: the vault encrypts at rest, so the wallet
    /// does not need to.
    pub sse: bool,
    /// Content-addressed storage: the vault itself derives the blob's
    /// address from its ciphertext.
    pub cas: bool,
}

#[derive(Clone, Debug)]
pub struct StoredResourceMeta {
    pub id: String,
    pub asset: String,
    pub size: u64,
}

#[async_trait]
pub trait VaultManager: Send + Sync {
    async fn get_blob(&self, resource_id: &str, access_token: &str) -> Result<Vec<u8>>;
    async fn send_blob(&self, vault_id: &str, data: Vec<u8>, cleartext: bool) -> Result<StoredResourceMeta>;
    async fn purge_blob(&self, resource_id: &str) -> Result<()>;
    async fn vault_map(&self) -> Result<std::collections::HashMap<String, VaultProperties>>;
}

#[async_trait]
pub trait DidProvider: Send + Sync {
    async fn create_did_document(&self, doc: &crate::identity::DidDocument) -> Result<()>;
    async fn get_did_document(&self, id: &str) -> Result<crate::identity::DidDocument>;
}

#[async_trait]
pub trait AccountBackend: Send + Sync {
    async fn store_envelope(&self, account_hash: &str, envelope: &crate::account::DataEnvelope) -> Result<()>;
    async fn get_envelope(&self, hash: &str) -> Result<crate::account::DataEnvelope>;
    async fn delete_envelope(&self, hash: &str) -> Result<()>;
    async fn list_envelopes(&self, account_hash: &str, level: crate::locker::AccessLevel) -> Result<Vec<String>>;
}

/// Pub/sub keyed by record ID or locker routing prefix (spec.md §6),
/// backing [`crate::wallet::SubmitFuture::wait`] so it need not poll.
#[async_trait]
pub trait NotificationBus: Send + Sync {
    async fn publish(&self, key: &str) -> Result<()>;
    /// Resolves the next time `key` is published, or never resolves if the
    /// bus is disconnected — callers race this against a timer.
    async fn subscribe_once(&self, key: &str) -> Result<()>;
}
