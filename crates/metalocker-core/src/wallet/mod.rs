//! The submit and replay pipelines (spec.md §4.7): the only place that
//! drives every other module (crypto, identity, locker, record, lease,
//! impression, rater) together against the external collaborator traits in
//! [`crate::interfaces`].
use std::collections::HashMap;

use chrono::Utc;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{
    cancel::CancelContext,
    config::WalletConfig,
    crypto::aead::AesKey,
    errors::{Error, Result},
    formatting, hash, identity,
    impression::{Impression, MetaResourceRef, NewImpression, Provenance},
    interfaces::{DidProvider, LedgerService, NotificationBus, OffchainStore, RecordState, VaultManager, VaultProperties},
    key::ed25519,
    lease,
    lease::{Lease, StoredResource},
    locker::Locker,
    rater::{DatasetRevision, RevisionRater},
    record::{OperationType, Record, RecordStatus},
};

const AUTHORISING_COMMITMENT_TAG: &str = "authorising commitment";
/// Not given an explicit preimage formula by spec.md (unlike the other two
/// commitments in §4.5); chosen as a tagged hash of the impression's own
/// Merkle ID for symmetry with `AuthorisingCommitment`/`RequestingCommitment`
/// — both likewise opaque binding hashes a verifier recomputes from
/// already-decrypted lease content rather than from secret material.
const IMPRESSION_COMMITMENT_TAG: &str = "impression commitment";

/// `AuthorisingCommitment = Hash("authorising commitment", xprv.String() ‖ operationAddress)`
/// (spec.md §4.7 step 6).
fn build_authorising_commitment(xprv_string: &str, operation_address: &str) -> [u8; 32] {
    let mut preimage = xprv_string.as_bytes().to_vec();
    preimage.extend_from_slice(operation_address.as_bytes());
    hash::tagged(AUTHORISING_COMMITMENT_TAG, &preimage)
}

fn build_impression_commitment(impression_id: &str) -> [u8; 32] {
    hash::tagged(IMPRESSION_COMMITMENT_TAG, impression_id.as_bytes())
}

/// Parent-record attachment mode (spec.md §4.7 step 2, §9 Open Questions):
/// only `None` is exercised by a conforming implementation; the others are
/// reserved and rejected fast rather than silently downgraded to `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyMode {
    None,
    DeepCopy,
    Shallow,
}

impl CopyMode {
    fn require_supported(self) -> Result<()> {
        match self {
            CopyMode::None => Ok(()),
            _ => Err(Error::invalid("parent record CopyMode other than None is reserved")),
        }
    }
}

/// A prior record this submission is conceptually attached to. `CopyMode`
/// governs how much of its content would be carried forward; only `None`
/// (carry nothing) is supported.
pub struct ParentRecord {
    pub record_id: String,
    pub copy_mode: CopyMode,
}

/// One blob to upload as part of a submission, before it becomes a
/// [`StoredResource`].
pub struct NewFile {
    pub vault_id: String,
    pub data: Vec<u8>,
    pub mime_type: Option<String>,
    /// Caller-requested cleartext upload, independent of the vault's own
    /// `SSE` capability (spec.md §4.7 step 3).
    pub cleartext: bool,
}

/// Everything the builder needs to assemble and submit one lease record.
pub struct SubmitRequest {
    pub files: Vec<NewFile>,
    /// Index into `files` of the resource that carries the dataset's own
    /// metadata blob (the impression's `MetaResource`).
    pub meta_file_index: usize,
    pub provenance: Option<Provenance>,
    pub revision_number: u64,
    pub was_revision_of: Option<String>,
    pub specialization_of: Option<String>,
    pub lease_expires_at: Option<chrono::DateTime<Utc>>,
    pub parent: Option<ParentRecord>,
}

async fn upload_file(vault: &dyn VaultManager, props: VaultProperties, file: NewFile, method: &str, cancel: &CancelContext) -> Result<StoredResource> {
    cancel.check()?;
    let asset = crate::ids::build_digital_asset_id(&file.data, method);

    let client_side_encrypt = !(props.sse || file.cleartext);
    let (payload, encryption_key) = if client_side_encrypt {
        let key = AesKey::generate();
        let ciphertext = key.seal(&file.data, asset.as_bytes())?;
        (ciphertext, Some(key))
    } else {
        (file.data, None)
    };

    let meta = cancel.race(vault.send_blob(&file.vault_id, payload, !client_side_encrypt)).await??;

    Ok(StoredResource {
        id: meta.id,
        asset,
        vault: file.vault_id,
        method: "GET".to_string(),
        params: HashMap::new(),
        encryption_key: encryption_key.map(|k| formatting::encode_base64(k.as_bytes())),
        mime_type: file.mime_type,
        size: meta.size,
    })
}

pub struct SubmitOutcome<'a> {
    pub record: Record,
    pub future: SubmitFuture<'a>,
}

/// Submits one lease record end-to-end (spec.md §4.7 "Submit"): uploads
/// blobs, builds and Merkle-signs the impression, assembles and encrypts
/// the lease, seals the record, and publishes it.
pub async fn submit<'a>(
    ledger: &'a dyn LedgerService,
    offchain: &dyn OffchainStore,
    vault: &dyn VaultManager,
    notifications: Option<&'a dyn NotificationBus>,
    config: &WalletConfig,
    locker: &Locker,
    identity_priv: &ed25519::PrivateKey,
    identity_id: &str,
    req: SubmitRequest,
    cancel: &CancelContext,
) -> Result<SubmitOutcome<'a>> {
    cancel.check()?;
    if let Some(parent) = &req.parent {
        parent.copy_mode.require_supported()?;
    }

    let participant = locker
        .us()
        .ok_or_else(|| Error::unauthorised("locker has no unambiguous self participant"))?;
    let root = participant
        .hydrated_root()
        .ok_or_else(|| Error::unauthorised("locker participant root key is not hydrated"))?;
    let xprv_string = root.to_extended_priv_string();

    let vault_map = cancel.race(vault.vault_map()).await??;

    let mut resources = Vec::with_capacity(req.files.len());
    for file in req.files {
        let props = vault_map.get(&file.vault_id).copied().unwrap_or_default();
        resources.push(upload_file(vault, props, file, &config.did_method, cancel).await?);
    }

    let meta_resource = resources
        .get(req.meta_file_index)
        .cloned()
        .ok_or_else(|| Error::invalid("meta_file_index out of range"))?;
    let meta_ref = MetaResourceRef {
        id: meta_resource.id.clone(),
        asset: meta_resource.asset.clone(),
    };

    let mut new_impression = NewImpression::blank(meta_resource.asset.clone(), meta_ref);
    new_impression.prov_graph = req.provenance.as_ref().map(|p| p.graph.clone());
    new_impression.was_attributed_to = Some(identity_id.to_string());
    new_impression.generated_at_time = Some(Utc::now());
    new_impression.revision_number = req.revision_number;
    new_impression.was_revision_of = req.was_revision_of;
    new_impression.specialization_of = req.specialization_of;

    let id_prefix = format!("did:{}:", config.did_method);
    let impression = Impression::create(&id_prefix, new_impression, identity_priv, identity_id, Utc::now());

    let lease_id = format!(
        "urn:metalocker:lease:{}",
        formatting::encode_base58(&hash::sha256(impression.id.as_bytes()))
    );
    let mut lease = Lease::new(lease_id.clone(), resources.clone(), impression)?;
    lease.expires_at = req.lease_expires_at;
    lease.provenance = req.provenance;

    let key_index = OsRng.next_u32() & 0x7fff_ffff;
    let routing_key = participant.routing_key(key_index)?;
    let (_, sym_key) = participant
        .is_record_owner(&routing_key, key_index)?
        .ok_or_else(|| Error::integrity("freshly derived routing key did not match its own index"))?;

    let lease_bytes = serde_json::to_vec(&lease).map_err(|e| Error::invalid(format!("failed to serialize lease: {e}")))?;
    let lease_ciphertext = sym_key.seal(&lease_bytes, routing_key.as_bytes())?;
    let operation_address = cancel.race(offchain.send_operation(&lease_ciphertext)).await??;

    let authorising_commitment = build_authorising_commitment(&xprv_string, &operation_address);
    let lease_exp = lease.expires_at.map(|t| t.timestamp()).unwrap_or(0);
    let access_signer = lease::access_key_for_lease(&lease_id);
    let requesting_commitment = lease::build_requesting_commitment(&access_signer.public_key(), lease_exp);
    let impression_commitment = build_impression_commitment(&lease.impression.id);

    let data_assets: Vec<String> = resources.iter().map(|r| r.asset.clone()).collect();

    // `subject_record` names a record being headed or revoked, a different
    // relationship from "this submission's conceptual parent" — the latter
    // only gates `ParentRecord::copy_mode` above and otherwise carries no
    // wire representation yet.
    let record = Record {
        id: String::new(),
        routing_key,
        key_index,
        operation: OperationType::Lease,
        operation_address,
        flags: 0,
        authorising_commitment: formatting::encode_base64(&authorising_commitment),
        requesting_commitment: formatting::encode_base64(&requesting_commitment),
        impression_commitment: formatting::encode_base64(&impression_commitment),
        data_assets,
        head_id: None,
        head_body: None,
        subject_record: None,
        revocation_proof: vec![],
        signature: String::new(),
        status: RecordStatus::Pending,
    };

    let signing_key = participant.record_signing_key(key_index)?;
    let sealed = record.seal(&signing_key)?;
    cancel.race(ledger.submit_record(&sealed)).await??;

    Ok(SubmitOutcome {
        future: SubmitFuture {
            record_id: sealed.id.clone(),
            ledger,
            notifications,
            config: config.clone(),
        },
        record: sealed,
    })
}

/// A submission's confirmation handle (spec.md §4.7 step 7, §9 "Futures/waits").
pub struct SubmitFuture<'a> {
    record_id: String,
    ledger: &'a dyn LedgerService,
    notifications: Option<&'a dyn NotificationBus>,
    config: WalletConfig,
}

impl<'a> SubmitFuture<'a> {
    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    /// Polls `GetRecordState` until the record leaves `Pending`, racing a
    /// notification-bus subscription against a 1 Hz polling fallback so
    /// confirmation is immediate when the bus is connected (spec.md §6).
    pub async fn wait(&self, cancel: &CancelContext) -> Result<RecordState> {
        let start = tokio::time::Instant::now();
        loop {
            cancel.check()?;
            let state = cancel.race(self.ledger.record_state(&self.record_id)).await??;
            if matches!(state.status, RecordStatus::Published | RecordStatus::Revoked | RecordStatus::Failed) {
                return Ok(state);
            }
            if start.elapsed() >= self.config.confirmation_timeout {
                return Err(Error::backend("timed out waiting for record confirmation", true));
            }
            match self.notifications {
                Some(bus) => {
                    let notified = bus.subscribe_once(&self.record_id);
                    let timeout = tokio::time::sleep(self.config.poll_interval);
                    tokio::select! {
                        _ = notified => {}
                        _ = timeout => {}
                    }
                }
                None => tokio::time::sleep(self.config.poll_interval).await,
            }
        }
    }
}

const HEAD_ID_TAG: &str = "asset head id";
/// Default head slot name, absent a richer per-record naming scheme (spec.md
/// §3 gives `Record` no wire field for it; the only named head seen in
/// spec.md's own test vectors, S2, is `"main"`).
pub const DEFAULT_HEAD_NAME: &str = "main";

/// Content-derived key for one `(assetID, lockerID, participantID,
/// headName)` head slot (spec.md §4.7 replay, `AssetHead` branch). Two
/// `AssetHead` records naming the same tuple land on the same key, so the
/// later one (by block order) simply overwrites the index entry for it.
fn head_key(asset: &str, locker_id: &str, participant_id: &str, head_name: &str) -> String {
    let preimage = format!("{asset}\u{0}{locker_id}\u{0}{participant_id}\u{0}{head_name}");
    let digest = hash::tagged(HEAD_ID_TAG, preimage.as_bytes());
    formatting::encode_base58(&digest)
}

/// One entry of the head index: the record currently heading
/// `(asset, locker, participant, head_name)`.
#[derive(Clone, Debug)]
pub struct HeadEntry {
    pub record_id: String,
    pub head_body: Vec<u8>,
    pub block_number: i64,
}

/// Tracks the current head record for every `(asset, locker, participant,
/// head_name)` tuple this wallet has replayed an `AssetHead` operation for.
#[derive(Default)]
pub struct HeadIndex {
    entries: HashMap<String, HeadEntry>,
}

impl HeadIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&mut self, asset: &str, locker_id: &str, participant_id: &str, head_name: &str, entry: HeadEntry) {
        self.entries.insert(head_key(asset, locker_id, participant_id, head_name), entry);
    }

    pub fn get(&self, asset: &str, locker_id: &str, participant_id: &str, head_name: &str) -> Option<&HeadEntry> {
        self.entries.get(&head_key(asset, locker_id, participant_id, head_name))
    }
}

/// The replay/index updater (spec.md §4.7 "Replay / indexing", §5
/// ordering guarantees): processes blocks strictly in ascending order,
/// tracking enough per-record state to resolve `LeaseRevocation`'s
/// `AddRevocation(ref)` call against the right variant.
pub struct IndexUpdater {
    pub rater: RevisionRater,
    pub heads: HeadIndex,
    record_variants: HashMap<String, String>,
}

impl IndexUpdater {
    pub fn new() -> Self {
        IndexUpdater {
            rater: RevisionRater::new(),
            heads: HeadIndex::new(),
            record_variants: HashMap::new(),
        }
    }

    /// Processes every record in block `block_number`, in ledger order,
    /// returning a [`RecordState`] for each one this locker's self
    /// participant owns.
    pub async fn process_block(
        &mut self,
        ledger: &dyn LedgerService,
        offchain: &dyn OffchainStore,
        did_provider: &dyn DidProvider,
        locker: &Locker,
        block_number: i64,
        cancel: &CancelContext,
    ) -> Result<Vec<RecordState>> {
        cancel.check()?;
        let positions = cancel.race(ledger.block_records(block_number)).await??;
        let mut states = Vec::new();
        for record_ids in positions {
            for record_id in record_ids {
                cancel.check()?;
                let record = cancel.race(ledger.record(&record_id)).await??;
                record.validate_shape()?;
                if let Some(state) = self
                    .process_record(offchain, did_provider, locker, &record, block_number, cancel)
                    .await?
                {
                    states.push(state);
                }
            }
        }
        Ok(states)
    }

    async fn process_record(
        &mut self,
        offchain: &dyn OffchainStore,
        did_provider: &dyn DidProvider,
        locker: &Locker,
        record: &Record,
        block_number: i64,
        cancel: &CancelContext,
    ) -> Result<Option<RecordState>> {
        let Some((participant, _pub_key, sym_key)) = locker.find_owner(&record.routing_key, record.key_index)? else {
            return Ok(None);
        };

        match record.operation {
            OperationType::Lease => {
                let ciphertext = cancel.race(offchain.get_operation(&record.operation_address)).await??;
                let lease_bytes = sym_key.open(&ciphertext, record.routing_key.as_bytes())?;
                let lease: Lease =
                    serde_json::from_slice(&lease_bytes).map_err(|e| Error::integrity(format!("malformed lease payload: {e}")))?;

                let creator = lease.impression.proof.creator.clone();
                let method = crate::ids::extract_method(&creator).unwrap_or("piprate").to_string();
                let id_prefix = format!("did:{method}:");
                let creator_doc = cancel.race(did_provider.get_did_document(&creator)).await??;
                let verifier_did = identity::extract_indy_style_did(&creator_doc, &method)?;
                lease.impression.verify(&id_prefix, verifier_did.ver_key())?;

                let variant_id = lease.impression.variant_id().to_string();
                self.record_variants.insert(record.id.clone(), variant_id.clone());

                let ds = DatasetRevision {
                    record_id: record.id.clone(),
                    variant_id,
                    revision_number: lease.impression.revision(),
                    generated_at: lease.impression.generated_at_time.unwrap_or_else(Utc::now),
                };
                self.rater.add_revision(ds, block_number);

                Ok(Some(RecordState {
                    locker_id: locker.id.clone(),
                    participant_id: participant.id.clone(),
                    record_id: record.id.clone(),
                    block_number,
                    operation: record.operation,
                    impression_id: Some(lease.impression.id.clone()),
                    content_type: None,
                    status: RecordStatus::Published,
                }))
            }
            OperationType::LeaseRevocation => {
                let subject = record
                    .subject_record
                    .clone()
                    .ok_or_else(|| Error::invalid("lease revocation record has no subject_record"))?;
                if let Some(variant_id) = self.record_variants.get(&subject).cloned() {
                    self.rater.add_revocation(&variant_id, &subject)?;
                }
                Ok(Some(RecordState {
                    locker_id: locker.id.clone(),
                    participant_id: participant.id.clone(),
                    record_id: record.id.clone(),
                    block_number,
                    operation: record.operation,
                    impression_id: None,
                    content_type: None,
                    status: RecordStatus::Revoked,
                }))
            }
            OperationType::AssetHead => {
                // spec.md §3/§4.7 give no wire field for "headName"; the
                // literal S2 test vector names the head "main", so that is
                // the default slot a bare AssetHead record updates absent a
                // richer naming scheme.
                let asset = record.data_assets.first().cloned().unwrap_or_default();
                self.heads.update(
                    &asset,
                    &locker.id,
                    &participant.id,
                    DEFAULT_HEAD_NAME,
                    HeadEntry {
                        record_id: record.id.clone(),
                        head_body: record.head_body.clone().unwrap_or_default(),
                        block_number,
                    },
                );
                Ok(Some(RecordState {
                    locker_id: locker.id.clone(),
                    participant_id: participant.id.clone(),
                    record_id: record.id.clone(),
                    block_number,
                    operation: record.operation,
                    impression_id: None,
                    content_type: None,
                    status: RecordStatus::Published,
                }))
            }
        }
    }
}

impl Default for IndexUpdater {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        identity::{Did, DidDocument},
        interfaces::{Block, StoredResourceMeta},
        locker::{AccessLevel, Party},
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[test]
    fn test_authorising_commitment_is_deterministic() {
        let a = build_authorising_commitment("xprv-fake", "addr-1");
        let b = build_authorising_commitment("xprv-fake", "addr-1");
        assert_eq!(a, b);
        let c = build_authorising_commitment("xprv-fake", "addr-2");
        assert_ne!(a, c);
    }

    #[test]
    fn test_copy_mode_requires_none() {
        assert!(CopyMode::None.require_supported().is_ok());
        assert!(CopyMode::DeepCopy.require_supported().is_err());
        assert!(CopyMode::Shallow.require_supported().is_err());
    }

    struct FakeLedger {
        records: Mutex<HashMap<String, Record>>,
        blocks: Mutex<Vec<Vec<String>>>,
    }

    impl FakeLedger {
        fn new() -> Self {
            FakeLedger {
                records: Mutex::new(HashMap::new()),
                blocks: Mutex::new(vec![vec![]]),
            }
        }
    }

    #[async_trait]
    impl LedgerService for FakeLedger {
        async fn genesis_block(&self) -> Result<Block> {
            Ok(Block {
                number: 0,
                hash: "genesis".to_string(),
                parent_hash: None,
            })
        }
        async fn top_block(&self) -> Result<Block> {
            let n = self.blocks.lock().unwrap().len() as i64 - 1;
            Ok(Block {
                number: n,
                hash: format!("block-{n}"),
                parent_hash: None,
            })
        }
        async fn block(&self, number: i64) -> Result<Block> {
            Ok(Block {
                number,
                hash: format!("block-{number}"),
                parent_hash: None,
            })
        }
        async fn chain(&self, _start: i64, _depth: i64) -> Result<Vec<Block>> {
            Ok(vec![])
        }
        async fn block_records(&self, number: i64) -> Result<Vec<Vec<String>>> {
            Ok(self
                .blocks
                .lock()
                .unwrap()
                .get(number as usize)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|id| vec![id])
                .collect())
        }
        async fn record(&self, record_id: &str) -> Result<Record> {
            self.records
                .lock()
                .unwrap()
                .get(record_id)
                .cloned()
                .ok_or_else(|| Error::not_found(crate::errors::NotFoundKind::Record, record_id))
        }
        async fn submit_record(&self, record: &Record) -> Result<()> {
            self.records.lock().unwrap().insert(record.id.clone(), record.clone());
            self.blocks.lock().unwrap().push(vec![record.id.clone()]);
            Ok(())
        }
        async fn record_state(&self, record_id: &str) -> Result<RecordState> {
            let record = self.record(record_id).await?;
            Ok(RecordState {
                locker_id: String::new(),
                participant_id: String::new(),
                record_id: record.id,
                block_number: 1,
                operation: record.operation,
                impression_id: None,
                content_type: None,
                status: RecordStatus::Published,
            })
        }
        async fn asset_head(&self, head_id: &str) -> Result<Record> {
            self.record(head_id).await
        }
        async fn data_asset_state(&self, asset: &str) -> Result<crate::interfaces::DataAssetState> {
            let published = self.records.lock().unwrap().values().any(|r| r.data_assets.iter().any(|a| a == asset));
            Ok(if published {
                crate::interfaces::DataAssetState::Active
            } else {
                crate::interfaces::DataAssetState::NotFound
            })
        }
    }

    struct FakeOffchain {
        store: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl FakeOffchain {
        fn new() -> Self {
            FakeOffchain { store: Mutex::new(HashMap::new()) }
        }
    }

    #[async_trait]
    impl OffchainStore for FakeOffchain {
        async fn get_operation(&self, address: &str) -> Result<Vec<u8>> {
            self.store
                .lock()
                .unwrap()
                .get(address)
                .cloned()
                .ok_or_else(|| Error::not_found(crate::errors::NotFoundKind::Operation, address))
        }
        async fn send_operation(&self, payload: &[u8]) -> Result<String> {
            let address = formatting::encode_base58(&hash::sha256(payload));
            self.store.lock().unwrap().insert(address.clone(), payload.to_vec());
            Ok(address)
        }
        async fn purge_operation(&self, address: &str) -> Result<()> {
            self.store.lock().unwrap().remove(address);
            Ok(())
        }
    }

    struct FakeVault;

    #[async_trait]
    impl VaultManager for FakeVault {
        async fn get_blob(&self, _resource_id: &str, _access_token: &str) -> Result<Vec<u8>> {
            Ok(vec![])
        }
        async fn send_blob(&self, _vault_id: &str, data: Vec<u8>, _cleartext: bool) -> Result<StoredResourceMeta> {
            Ok(StoredResourceMeta {
                id: formatting::encode_base58(&hash::sha256(&data)),
                asset: String::new(),
                size: data.len() as u64,
            })
        }
        async fn purge_blob(&self, _resource_id: &str) -> Result<()> {
            Ok(())
        }
        async fn vault_map(&self) -> Result<HashMap<String, VaultProperties>> {
            let mut map = HashMap::new();
            map.insert(
                "vault-1".to_string(),
                VaultProperties { sse: false, cas: true },
            );
            Ok(map)
        }
    }

    struct FakeDidProvider {
        docs: Mutex<HashMap<String, DidDocument>>,
    }

    impl FakeDidProvider {
        fn new() -> Self {
            FakeDidProvider { docs: Mutex::new(HashMap::new()) }
        }
    }

    #[async_trait]
    impl DidProvider for FakeDidProvider {
        async fn create_did_document(&self, doc: &DidDocument) -> Result<()> {
            self.docs.lock().unwrap().insert(doc.id.clone(), doc.clone());
            Ok(())
        }
        async fn get_did_document(&self, id: &str) -> Result<DidDocument> {
            self.docs
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| Error::not_found(crate::errors::NotFoundKind::Did, id))
        }
    }

    async fn build_test_locker() -> (Did, Locker) {
        let a = Did::generate("piprate", b"wallet locker party a");
        let b = Did::generate("piprate", b"wallet locker party b");
        let mut locker = Locker::generate(
            AccessLevel::Managed,
            "wallet test locker",
            None,
            0,
            &[Party { did: &a, is_self: true }, Party { did: &b, is_self: false }],
        )
        .unwrap();
        locker.hydrate(a.sign_key_for_proof().unwrap()).unwrap();
        (a, locker)
    }

    #[tokio::test]
    async fn test_submit_then_replay_round_trip() {
        let ledger = FakeLedger::new();
        let offchain = FakeOffchain::new();
        let vault = FakeVault;
        let did_provider = FakeDidProvider::new();
        let cancel = CancelContext::uncancellable();
        let config = WalletConfig::default();

        let identity = Did::generate("piprate", b"wallet test identity");
        let doc = DidDocument::create(&identity, vec![], Utc::now()).unwrap();
        did_provider.create_did_document(&doc).await.unwrap();

        let (_owner, locker) = build_test_locker().await;

        let req = SubmitRequest {
            files: vec![NewFile {
                vault_id: "vault-1".to_string(),
                data: b"dataset payload bytes".to_vec(),
                mime_type: Some("application/octet-stream".to_string()),
                cleartext: false,
            }],
            meta_file_index: 0,
            provenance: None,
            revision_number: 1,
            was_revision_of: None,
            specialization_of: None,
            lease_expires_at: None,
            parent: None,
        };

        let identity_id = identity.id();
        let outcome = submit(
            &ledger,
            &offchain,
            &vault,
            None,
            &config,
            &locker,
            identity.sign_key_for_proof().unwrap(),
            &identity_id,
            req,
            &cancel,
        )
        .await
        .unwrap();

        assert!(!outcome.record.id.is_empty());
        assert_eq!(outcome.record.operation, OperationType::Lease);

        let state = outcome.future.wait(&cancel).await.unwrap();
        assert_eq!(state.status, RecordStatus::Published);

        let mut updater = IndexUpdater::new();
        let states = updater
            .process_block(&ledger, &offchain, &did_provider, &locker, 1, &cancel)
            .await
            .unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].status, RecordStatus::Published);

        let variant_id = states[0].impression_id.clone().unwrap();
        // the freshly-replayed impression is its own variant root, so its
        // own ID is both the variant key and the current head's record
        assert_eq!(updater.rater.head(&variant_id).unwrap().record_id, outcome.record.id);
    }

    #[tokio::test]
    async fn test_reject_reserved_copy_mode() {
        let ledger = FakeLedger::new();
        let offchain = FakeOffchain::new();
        let vault = FakeVault;
        let cancel = CancelContext::uncancellable();
        let config = WalletConfig::default();

        let identity = Did::generate("piprate", b"wallet reject identity");
        let (_owner, locker) = build_test_locker().await;

        let req = SubmitRequest {
            files: vec![NewFile {
                vault_id: "vault-1".to_string(),
                data: b"payload".to_vec(),
                mime_type: None,
                cleartext: false,
            }],
            meta_file_index: 0,
            provenance: None,
            revision_number: 1,
            was_revision_of: None,
            specialization_of: None,
            lease_expires_at: None,
            parent: Some(ParentRecord {
                record_id: "some-prior-record".to_string(),
                copy_mode: CopyMode::DeepCopy,
            }),
        };

        let identity_id = identity.id();
        let result = submit(
            &ledger,
            &offchain,
            &vault,
            None,
            &config,
            &locker,
            identity.sign_key_for_proof().unwrap(),
            &identity_id,
            req,
            &cancel,
        )
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_head_key_is_deterministic_and_tuple_sensitive() {
        let a = head_key("asset-1", "locker-1", "participant-1", "main");
        let b = head_key("asset-1", "locker-1", "participant-1", "main");
        assert_eq!(a, b);

        let different_asset = head_key("asset-2", "locker-1", "participant-1", "main");
        let different_locker = head_key("asset-1", "locker-2", "participant-1", "main");
        let different_participant = head_key("asset-1", "locker-1", "participant-2", "main");
        let different_name = head_key("asset-1", "locker-1", "participant-1", "other");
        assert_ne!(a, different_asset);
        assert_ne!(a, different_locker);
        assert_ne!(a, different_participant);
        assert_ne!(a, different_name);
    }

    #[test]
    fn test_head_index_update_and_get_roundtrip() {
        let mut heads = HeadIndex::new();
        assert!(heads.get("asset-1", "locker-1", "participant-1", DEFAULT_HEAD_NAME).is_none());

        heads.update(
            "asset-1",
            "locker-1",
            "participant-1",
            DEFAULT_HEAD_NAME,
            HeadEntry {
                record_id: "record-a".to_string(),
                head_body: b"first head body".to_vec(),
                block_number: 3,
            },
        );
        let entry = heads.get("asset-1", "locker-1", "participant-1", DEFAULT_HEAD_NAME).unwrap();
        assert_eq!(entry.record_id, "record-a");
        assert_eq!(entry.block_number, 3);

        // a later AssetHead record for the same tuple overwrites the slot
        heads.update(
            "asset-1",
            "locker-1",
            "participant-1",
            DEFAULT_HEAD_NAME,
            HeadEntry {
                record_id: "record-b".to_string(),
                head_body: b"second head body".to_vec(),
                block_number: 9,
            },
        );
        let entry = heads.get("asset-1", "locker-1", "participant-1", DEFAULT_HEAD_NAME).unwrap();
        assert_eq!(entry.record_id, "record-b");
        assert_eq!(entry.block_number, 9);
    }

    #[tokio::test]
    async fn test_replay_asset_head_updates_head_index() {
        let ledger = FakeLedger::new();
        let offchain = FakeOffchain::new();
        let did_provider = FakeDidProvider::new();
        let cancel = CancelContext::uncancellable();

        let (_owner, locker) = build_test_locker().await;
        let us = locker.us().unwrap();
        let key_index = 11u32;
        let routing_key = us.routing_key(key_index).unwrap();
        let signing_key = us.record_signing_key(key_index).unwrap();

        let head_body = b"head body bytes".to_vec();
        let record = Record {
            id: String::new(),
            routing_key,
            key_index,
            operation: OperationType::AssetHead,
            operation_address: "addr-head".to_string(),
            flags: 0,
            authorising_commitment: formatting::encode_base64(&[0u8; 32]),
            requesting_commitment: formatting::encode_base64(&[0u8; 32]),
            impression_commitment: formatting::encode_base64(&[0u8; 32]),
            data_assets: vec!["did:piprate:head-asset".to_string()],
            head_id: Some(formatting::encode_base64(b"head-id-bytes")),
            head_body: Some(head_body.clone()),
            subject_record: None,
            revocation_proof: vec![],
            signature: String::new(),
            status: RecordStatus::Pending,
        }
        .seal(&signing_key)
        .unwrap();
        ledger.submit_record(&record).await.unwrap();

        let mut updater = IndexUpdater::new();
        let states = updater
            .process_block(&ledger, &offchain, &did_provider, &locker, 1, &cancel)
            .await
            .unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].operation, OperationType::AssetHead);

        let entry = updater
            .heads
            .get("did:piprate:head-asset", &locker.id, &us.id, DEFAULT_HEAD_NAME)
            .unwrap();
        assert_eq!(entry.record_id, record.id);
        assert_eq!(entry.head_body, head_body);
    }
}
