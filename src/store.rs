//! Persistence store for the campaign snapshot, admin metadata and the
//! instance's own purchase history.

use crate::error::StoreError;
use crate::models::{CampaignMetadata, PurchaseRecord};
use crate::snapshot::RaffleSnapshot;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable key/value storage that survives restarts.
///
/// `load_*` returns `Ok(None)` when nothing was saved and
/// `Err(StoreError::Corrupt)` when saved bytes cannot be trusted.
pub trait RaffleStore: Send + Sync {
    fn save_snapshot(&self, snapshot: &RaffleSnapshot) -> StoreResult<()>;
    fn load_snapshot(&self) -> StoreResult<Option<RaffleSnapshot>>;

    fn save_metadata(&self, metadata: &CampaignMetadata) -> StoreResult<()>;
    fn load_metadata(&self) -> StoreResult<Option<CampaignMetadata>>;

    fn save_purchases(&self, purchases: &[PurchaseRecord]) -> StoreResult<()>;
    fn load_purchases(&self) -> StoreResult<Vec<PurchaseRecord>>;

    /// Remove everything this store holds
    fn clear(&self) -> StoreResult<()>;
}

const SNAPSHOT_FILE: &str = "raffle_state.json";
const METADATA_FILE: &str = "campaign_metadata.json";
const PURCHASES_FILE: &str = "my_purchases.json";

/// JSON files in a data directory, written through a temp file and rename
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a data directory
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            StoreError::Unavailable(format!("cannot create {}: {}", dir.display(), e))
        })?;
        info!("File store opened at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write through a per-call temp file so concurrent writers never share one
    fn write(&self, name: &str, bytes: &[u8]) -> StoreResult<()> {
        let path = self.dir.join(name);
        let tmp = self
            .dir
            .join(format!("{}.{}.tmp", name, Uuid::new_v4().simple()));
        if let Err(e) = fs::write(&tmp, bytes).and_then(|_| fs::rename(&tmp, &path)) {
            fs::remove_file(&tmp).ok();
            return Err(StoreError::Unavailable(format!(
                "write {}: {}",
                path.display(),
                e
            )));
        }
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    fn read(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.dir.join(name);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Unavailable(format!(
                "read {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

impl RaffleStore for FileStore {
    fn save_snapshot(&self, snapshot: &RaffleSnapshot) -> StoreResult<()> {
        self.write(SNAPSHOT_FILE, &snapshot.encode()?)
    }

    fn load_snapshot(&self) -> StoreResult<Option<RaffleSnapshot>> {
        match self.read(SNAPSHOT_FILE)? {
            Some(bytes) => Ok(Some(RaffleSnapshot::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save_metadata(&self, metadata: &CampaignMetadata) -> StoreResult<()> {
        self.write(METADATA_FILE, &serde_json::to_vec(metadata)?)
    }

    fn load_metadata(&self) -> StoreResult<Option<CampaignMetadata>> {
        match self.read(METADATA_FILE)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save_purchases(&self, purchases: &[PurchaseRecord]) -> StoreResult<()> {
        self.write(PURCHASES_FILE, &serde_json::to_vec(purchases)?)
    }

    fn load_purchases(&self) -> StoreResult<Vec<PurchaseRecord>> {
        match self.read(PURCHASES_FILE)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    fn clear(&self) -> StoreResult<()> {
        for name in [SNAPSHOT_FILE, METADATA_FILE, PURCHASES_FILE] {
            match fs::remove_file(self.dir.join(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::Unavailable(format!("clear {}: {}", name, e))),
            }
        }
        info!("File store cleared at {}", self.dir.display());
        Ok(())
    }
}

#[derive(Default)]
struct MemorySlots {
    snapshot: Option<Vec<u8>>,
    metadata: Option<Vec<u8>>,
    purchases: Option<Vec<u8>>,
}

/// In-memory store holding encoded bytes, used for tests and as the
/// fallback when no data directory is usable.
#[derive(Default)]
pub struct MemoryStore {
    slots: Mutex<MemorySlots>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `Unavailable`
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Overwrite the saved snapshot with arbitrary bytes
    pub fn put_raw_snapshot(&self, bytes: Vec<u8>) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.snapshot = Some(bytes);
        }
    }

    fn with_slots<T>(&self, f: impl FnOnce(&mut MemorySlots) -> T) -> StoreResult<T> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        Ok(f(&mut slots))
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

impl RaffleStore for MemoryStore {
    fn save_snapshot(&self, snapshot: &RaffleSnapshot) -> StoreResult<()> {
        self.check_writable()?;
        let bytes = snapshot.encode()?;
        self.with_slots(|s| s.snapshot = Some(bytes))
    }

    fn load_snapshot(&self) -> StoreResult<Option<RaffleSnapshot>> {
        match self.with_slots(|s| s.snapshot.clone())? {
            Some(bytes) => Ok(Some(RaffleSnapshot::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save_metadata(&self, metadata: &CampaignMetadata) -> StoreResult<()> {
        self.check_writable()?;
        let bytes = serde_json::to_vec(metadata)?;
        self.with_slots(|s| s.metadata = Some(bytes))
    }

    fn load_metadata(&self) -> StoreResult<Option<CampaignMetadata>> {
        match self.with_slots(|s| s.metadata.clone())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save_purchases(&self, purchases: &[PurchaseRecord]) -> StoreResult<()> {
        self.check_writable()?;
        let bytes = serde_json::to_vec(purchases)?;
        self.with_slots(|s| s.purchases = Some(bytes))
    }

    fn load_purchases(&self) -> StoreResult<Vec<PurchaseRecord>> {
        match self.with_slots(|s| s.purchases.clone())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    fn clear(&self) -> StoreResult<()> {
        self.check_writable()?;
        self.with_slots(|s| *s = MemorySlots::default())
    }
}
