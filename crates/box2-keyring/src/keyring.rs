//! The key ring and its readiness gate.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::{watch, Mutex};

use box2_core::{
    derive_dm_key, derive_drop_box_receive_key, DropBoxId, DropBoxSecret, EncryptionKey, FeedId,
    GroupError, GroupId, GroupInfo, GroupKeyInfo, GroupMembership, KeyScheme, Keypair,
};
use box2_store::{KeyRecord, KeyStorage};

use crate::error::{KeyRingError, Result};

/// Label that marks the root of the actor's subfeed tree.
pub const ROOT_LABEL: &str = "root";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Readiness {
    Pending,
    Ready,
    Failed(String),
}

struct SigningEntry {
    keypair: Keypair,
    label: Option<String>,
}

#[derive(Default)]
struct KeyRingState {
    /// Oldest first; the last entry is the current self key.
    self_keys: Vec<EncryptionKey>,
    groups: BTreeMap<GroupId, GroupInfo>,
    drop_boxes: BTreeMap<DropBoxId, DropBoxSecret>,
    signing: HashMap<FeedId, SigningEntry>,
    root: Option<FeedId>,
    /// `(root, mirrored leaf) -> leaf of root`
    triangles: HashMap<(FeedId, FeedId), FeedId>,
    /// `(local, remote) -> DM key`. Never persisted.
    dm_pairs: HashMap<(FeedId, FeedId), EncryptionKey>,
}

impl KeyRingState {
    fn apply(&mut self, record: KeyRecord) {
        match record {
            KeyRecord::SelfKey { key } => {
                self.self_keys.retain(|k| !k.same_bytes(&key));
                self.self_keys.push(key);
            }
            KeyRecord::Group { id, info } => {
                self.groups.insert(id, info);
            }
            KeyRecord::DropBox { id, secret } => {
                self.drop_boxes.insert(id, DropBoxSecret::from_bytes(secret));
            }
            KeyRecord::Signing { id, seed, label } => {
                if label.as_deref() == Some(ROOT_LABEL) && self.root.is_none() {
                    self.root = Some(id);
                }
                let keypair = Keypair::from_seed(&seed);
                self.signing.insert(id, SigningEntry { keypair, label });
            }
            KeyRecord::Triangle { root, mirror, leaf } => {
                self.triangles.insert((root, mirror), leaf);
            }
        }
    }
}

/// Owner of all key material.
///
/// Mutating operations are `async`: they wait their turn on a FIFO queue,
/// write the change through to storage, and only then update the in-memory
/// stores. Queries and the DM helpers are synchronous and fail
/// with [`KeyRingError::NotReady`] until the initial load has finished.
pub struct KeyRing {
    state: RwLock<KeyRingState>,
    storage: Arc<dyn KeyStorage>,
    ready_rx: watch::Receiver<Readiness>,
    /// Held by the loader until the load completes, then by one operation at a time.
    queue: Arc<Mutex<()>>,
    closed: AtomicBool,
    dm_derivations: AtomicU64,
}

impl KeyRing {
    /// Create a key ring and start loading `storage` in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(storage: Arc<dyn KeyStorage>) -> Arc<KeyRing> {
        let queue = Arc::new(Mutex::new(()));
        let loader_turn = queue.clone().try_lock_owned().ok();
        let (ready_tx, ready_rx) = watch::channel(Readiness::Pending);

        let ring = Arc::new(KeyRing {
            state: RwLock::new(KeyRingState::default()),
            storage,
            ready_rx,
            queue,
            closed: AtomicBool::new(false),
            dm_derivations: AtomicU64::new(0),
        });

        let loader = ring.clone();
        tokio::spawn(async move {
            let _turn = loader_turn;
            let readiness = match loader.load().await {
                Ok(()) => {
                    tracing::info!("key ring ready");
                    Readiness::Ready
                }
                Err(e) => {
                    tracing::warn!("key ring failed to load: {}", e);
                    Readiness::Failed(e.to_string())
                }
            };
            let _ = ready_tx.send(readiness);
        });

        ring
    }

    async fn load(&self) -> Result<()> {
        let records = self.storage.load_all().await?;
        let count = records.len();

        let missing_self_key = {
            let mut state = self.write()?;
            for record in records {
                state.apply(record);
            }
            state.self_keys.is_empty()
        };

        if missing_self_key {
            let key = EncryptionKey::generate(KeyScheme::SelfDm);
            self.commit(KeyRecord::SelfKey { key }).await?;
            tracing::info!("generated new self key");
        }

        tracing::debug!(records = count, "loaded key records");
        Ok(())
    }

    /// Wait until the initial load has completed.
    pub async fn ready(&self) -> Result<()> {
        let mut rx = self.ready_rx.clone();
        let readiness = rx
            .wait_for(|r| *r != Readiness::Pending)
            .await
            .map_err(|_| KeyRingError::LoadFailed("loader exited without signalling".into()))?
            .clone();

        match readiness {
            Readiness::Ready => Ok(()),
            Readiness::Failed(reason) => Err(KeyRingError::LoadFailed(reason)),
            Readiness::Pending => Err(KeyRingError::NotReady),
        }
    }

    /// Whether the initial load has completed successfully.
    pub fn is_ready(&self) -> bool {
        *self.ready_rx.borrow() == Readiness::Ready
    }

    fn check_ready(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(KeyRingError::Closed);
        }
        match &*self.ready_rx.borrow() {
            Readiness::Ready => Ok(()),
            Readiness::Pending => Err(KeyRingError::NotReady),
            Readiness::Failed(reason) => Err(KeyRingError::LoadFailed(reason.clone())),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, KeyRingState>> {
        self.state
            .read()
            .map_err(|e| KeyRingError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, KeyRingState>> {
        self.state
            .write()
            .map_err(|e| KeyRingError::Poisoned(e.to_string()))
    }

    /// A ready-checked read of the in-memory stores.
    fn query(&self) -> Result<RwLockReadGuard<'_, KeyRingState>> {
        self.check_ready()?;
        self.read()
    }

    /// Write `record` through to storage, then apply it in memory.
    ///
    /// Nothing changes in memory when the write fails.
    async fn commit(&self, record: KeyRecord) -> Result<()> {
        if let Err(e) = self.storage.put(&record).await {
            tracing::warn!("failed to persist {:?}: {}", record, e);
            return Err(e.into());
        }
        self.write()?.apply(record);
        Ok(())
    }

    /// Wait for queued operations, then close the storage.
    pub async fn close(&self) -> Result<()> {
        let _turn = self.queue.lock().await;
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.storage.close().await?;
        tracing::debug!("key ring closed");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Self Keys
    // ─────────────────────────────────────────────────────────────────────────

    /// Make `key` the current self key. Earlier self keys stay readable.
    pub async fn set_self_key(&self, key: [u8; 32]) -> Result<()> {
        let _turn = self.queue.lock().await;
        self.check_ready()?;

        let key = EncryptionKey::new(key, KeyScheme::SelfDm);
        self.commit(KeyRecord::SelfKey { key }).await
    }

    /// The current self key.
    pub fn self_key(&self) -> Result<EncryptionKey> {
        self.query()?
            .self_keys
            .last()
            .cloned()
            .ok_or(KeyRingError::MissingSelfKey)
    }

    /// All self keys, newest first.
    pub fn self_keys(&self) -> Result<Vec<EncryptionKey>> {
        Ok(self.query()?.self_keys.iter().rev().cloned().collect())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Group Keys
    // ─────────────────────────────────────────────────────────────────────────

    /// Register key material for a group.
    ///
    /// An unknown group becomes Active with `info.key` as write and sole read
    /// key. A known Active group gains a read key; its write key is unchanged.
    /// An Excluded group cannot be re-added.
    pub async fn add_group_info(&self, id: GroupId, info: GroupKeyInfo) -> Result<()> {
        let _turn = self.queue.lock().await;
        self.check_ready()?;

        let existing = self.read()?.groups.get(&id).cloned();
        let updated = match existing {
            Some(mut group) => {
                if !group.add_read_key(info.key).map_err(|e| group_error(e, id))? {
                    return Ok(());
                }
                group
            }
            None => GroupInfo::new(info),
        };

        let read_keys = updated.read_keys().len();
        self.commit(KeyRecord::Group { id, info: updated }).await?;
        tracing::debug!(group = %id, read_keys, "added group key");
        Ok(())
    }

    /// Promote one of a group's read keys to write key.
    pub async fn pick_group_write_key(&self, id: GroupId, key: [u8; 32]) -> Result<()> {
        let _turn = self.queue.lock().await;
        self.check_ready()?;

        let mut updated = self.known_group(&id)?;
        updated
            .pick_write_key(&key)
            .map_err(|e| group_error(e, id))?;

        self.commit(KeyRecord::Group { id, info: updated }).await
    }

    /// Move a group to Excluded. Its read keys are retained.
    pub async fn exclude_group(&self, id: GroupId) -> Result<()> {
        let _turn = self.queue.lock().await;
        self.check_ready()?;

        let mut updated = self.known_group(&id)?;
        updated.exclude();

        self.commit(KeyRecord::Group { id, info: updated }).await?;
        tracing::info!(group = %id, "excluded from group");
        Ok(())
    }

    fn known_group(&self, id: &GroupId) -> Result<GroupInfo> {
        self.read()?
            .groups
            .get(id)
            .cloned()
            .ok_or(KeyRingError::UnknownGroup(*id))
    }

    pub fn has_group(&self, id: &GroupId) -> Result<bool> {
        Ok(self.query()?.groups.contains_key(id))
    }

    pub fn get_group_info(&self, id: &GroupId) -> Result<Option<GroupInfo>> {
        Ok(self.query()?.groups.get(id).cloned())
    }

    /// Ids of groups in the given state: Active when `excluded` is false.
    pub fn list_group_ids(&self, excluded: bool) -> Result<Vec<GroupId>> {
        Ok(self
            .query()?
            .groups
            .iter()
            .filter(|(_, info)| info.is_excluded() == excluded)
            .map(|(id, _)| *id)
            .collect())
    }

    /// The current write key of a group, checking existence and state in one step.
    pub fn group_write_key(&self, id: &GroupId) -> Result<EncryptionKey> {
        let state = self.query()?;
        let group = state.groups.get(id).ok_or(KeyRingError::UnknownGroup(*id))?;
        group
            .write_key()
            .cloned()
            .ok_or(KeyRingError::GroupExcluded(*id))
    }

    /// Every read key of every group, Active and Excluded.
    pub fn group_read_keys(&self) -> Result<Vec<EncryptionKey>> {
        Ok(self
            .query()?
            .groups
            .values()
            .flat_map(|info| info.read_keys().iter().cloned())
            .collect())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Drop Boxes
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn add_drop_box(&self, id: DropBoxId, secret: DropBoxSecret) -> Result<()> {
        if secret.id() != id {
            return Err(KeyRingError::InvalidDropBox(format!(
                "secret does not belong to {}",
                id
            )));
        }

        let _turn = self.queue.lock().await;
        self.check_ready()?;

        self.commit(KeyRecord::DropBox {
            id,
            secret: *secret.as_bytes(),
        })
        .await
    }

    pub fn has_drop_box(&self, id: &DropBoxId) -> Result<bool> {
        Ok(self.query()?.drop_boxes.contains_key(id))
    }

    /// The secret of a held drop box, tagged with the drop box scheme.
    pub fn get_drop_box(&self, id: &DropBoxId) -> Result<Option<EncryptionKey>> {
        Ok(self
            .query()?
            .drop_boxes
            .get(id)
            .map(|secret| EncryptionKey::new(*secret.as_bytes(), KeyScheme::DropBox)))
    }

    pub fn list_drop_box_ids(&self) -> Result<Vec<DropBoxId>> {
        Ok(self.query()?.drop_boxes.keys().copied().collect())
    }

    /// One receive key per held drop box for messages from `author`.
    pub fn drop_box_receive_keys(&self, author: &FeedId) -> Result<Vec<EncryptionKey>> {
        let secrets: Vec<DropBoxSecret> = self.query()?.drop_boxes.values().cloned().collect();

        Ok(secrets
            .iter()
            .filter_map(|secret| match derive_drop_box_receive_key(secret, author) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::debug!("skipping drop box {}: {}", secret.id(), e);
                    None
                }
            })
            .collect())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Signing Identities
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a local signing identity.
    ///
    /// Returns `true` when this call assigned the root label, which happens
    /// only for the first identity registered with label `"root"`.
    pub async fn add_signing_identity(&self, keypair: Keypair, label: Option<&str>) -> Result<bool> {
        let _turn = self.queue.lock().await;
        self.check_ready()?;

        let id = keypair.id();
        let (record, became_root) = {
            let state = self.read()?;
            let became_root = label == Some(ROOT_LABEL) && state.root.is_none();

            let existing_label = state.signing.get(&id).and_then(|e| e.label.clone());
            let label = match label {
                // the root keeps its label
                _ if state.root == Some(id) => existing_label,
                Some(ROOT_LABEL) if !became_root => existing_label,
                Some(l) => Some(l.to_string()),
                None => existing_label,
            };
            if state
                .signing
                .get(&id)
                .is_some_and(|e| e.label == label)
            {
                return Ok(false);
            }

            let record = KeyRecord::Signing {
                id,
                seed: keypair.seed(),
                label,
            };
            (record, became_root)
        };

        self.commit(record).await?;
        if became_root {
            tracing::info!(root = %id, "root signing identity registered");
        }
        Ok(became_root)
    }

    /// The identity labelled root, if one is known.
    pub fn root_signing_identity(&self) -> Result<Option<Keypair>> {
        let state = self.query()?;
        Ok(state
            .root
            .and_then(|root| state.signing.get(&root))
            .map(|entry| entry.keypair.clone()))
    }

    pub fn signing_identity(&self, id: &FeedId) -> Result<Option<Keypair>> {
        Ok(self
            .query()?
            .signing
            .get(id)
            .map(|entry| entry.keypair.clone()))
    }

    /// Whether `id` is one of this actor's signing identities.
    pub fn is_local_identity(&self, id: &FeedId) -> Result<bool> {
        Ok(self.query()?.signing.contains_key(id))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Triangulation
    // ─────────────────────────────────────────────────────────────────────────

    /// Record that under `root`, the leaf mirroring `mirrored_leaf` is `leaf_of_root`.
    pub async fn add_triangle(
        &self,
        root: FeedId,
        leaf_of_root: FeedId,
        mirrored_leaf: FeedId,
    ) -> Result<()> {
        let _turn = self.queue.lock().await;
        self.check_ready()?;

        if self.read()?.triangles.get(&(root, mirrored_leaf)) == Some(&leaf_of_root) {
            return Ok(());
        }

        self.commit(KeyRecord::Triangle {
            root,
            mirror: mirrored_leaf,
            leaf: leaf_of_root,
        })
        .await
    }

    /// The leaf under `root` that mirrors `leaf`.
    pub fn triangulate(&self, root: &FeedId, leaf: &FeedId) -> Result<Option<FeedId>> {
        Ok(self.query()?.triangles.get(&(*root, *leaf)).copied())
    }

    /// Whether a DM key is available between `my_leaf` and the mirrored leaf
    /// under `their_root`.
    pub fn can_dm(&self, my_leaf: &FeedId, their_root: &FeedId) -> Result<bool> {
        let state = self.query()?;
        Ok(state
            .triangles
            .get(&(*their_root, *my_leaf))
            .is_some_and(|their_leaf| state.dm_pairs.contains_key(&(*my_leaf, *their_leaf))))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // DM Keys
    // ─────────────────────────────────────────────────────────────────────────

    /// The DM key between `local` and `remote`, derived and cached on first use.
    pub fn dm_key(&self, local: &Keypair, remote: &FeedId) -> Result<EncryptionKey> {
        let pair = (local.id(), *remote);
        if let Some(key) = self.query()?.dm_pairs.get(&pair) {
            return Ok(key.clone());
        }

        let key = self.derive_dm(local, remote)?;
        Ok(self.write()?.dm_pairs.entry(pair).or_insert(key).clone())
    }

    /// Derive and cache the DM key between `local` and `remote`.
    ///
    /// Returns `true` when the pair was not cached before.
    pub fn add_dm_pair(&self, local: &Keypair, remote: &FeedId) -> Result<bool> {
        let pair = (local.id(), *remote);
        if self.query()?.dm_pairs.contains_key(&pair) {
            return Ok(false);
        }

        let key = self.derive_dm(local, remote)?;
        let mut state = self.write()?;
        if state.dm_pairs.contains_key(&pair) {
            return Ok(false);
        }
        state.dm_pairs.insert(pair, key);
        Ok(true)
    }

    fn derive_dm(&self, local: &Keypair, remote: &FeedId) -> Result<EncryptionKey> {
        let key = derive_dm_key(local, remote)
            .map_err(|e| KeyRingError::TriangulationFailed(e.to_string()))?;
        self.dm_derivations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(local = %local.id(), remote = %remote, "derived DM key");
        Ok(key)
    }

    /// Number of DM key derivations performed so far.
    pub fn dm_derivations(&self) -> u64 {
        self.dm_derivations.load(Ordering::Relaxed)
    }
}

fn group_error(e: GroupError, id: GroupId) -> KeyRingError {
    match e {
        GroupError::UnknownKey => KeyRingError::UnknownKey,
        GroupError::Excluded => KeyRingError::GroupExcluded(id),
    }
}

impl GroupMembership for KeyRing {
    type Error = KeyRingError;

    fn is_group(&self, id: &GroupId) -> Result<bool> {
        self.has_group(id)
    }

    fn is_drop_box(&self, id: &DropBoxId) -> Result<bool> {
        self.has_drop_box(id)
    }
}
