use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Local;
use log::{error, info};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{OpsError, OpsResult};
use crate::services::types::{MiniProgramType, RecordStatus, UploadMode, UploadRecord};

/// Fields the caller supplies for a new record; id and timestamps are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub name: String,
    pub org_name: String,
    pub last_commit_user: String,
    pub commit: String,
    pub mode: UploadMode,
    pub status: RecordStatus,
    pub version: String,
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedRecords {
    #[serde(default = "default_next_id")]
    next_id: u64,
    #[serde(default)]
    records: Vec<UploadRecord>,
}

fn default_next_id() -> u64 {
    1
}

/// Durable history of upload outcomes, one JSON file per mini-program type.
///
/// Records are held newest-first in memory and the whole per-type collection
/// is rewritten on every append. Appends for one type are serialized behind
/// a per-type mutex so concurrent pipelines cannot lose updates.
#[derive(Debug)]
pub struct RecordStore {
    data_dir: PathBuf,
    stores: HashMap<MiniProgramType, Mutex<PersistedRecords>>,
}

impl RecordStore {
    /// Load any existing record files from the data directory.
    pub fn load(data_dir: PathBuf) -> OpsResult<Self> {
        std::fs::create_dir_all(&data_dir)?;

        let mut stores = HashMap::new();
        for mp_type in MiniProgramType::ALL {
            let path = record_file(&data_dir, mp_type);
            let persisted = if path.exists() {
                let raw = std::fs::read_to_string(&path)?;
                serde_json::from_str(&raw).map_err(|e| {
                    OpsError::Storage(format!("corrupt record file {}: {}", path.display(), e))
                })?
            } else {
                PersistedRecords {
                    next_id: 1,
                    records: Vec::new(),
                }
            };
            stores.insert(mp_type, Mutex::new(persisted));
        }

        Ok(Self { data_dir, stores })
    }

    /// Append a record, persisting the type's collection before returning.
    /// A failed persist is logged but does not fail the append; the upload
    /// outcome has already happened and must stay reportable.
    pub async fn append(&self, mp_type: MiniProgramType, new: NewRecord) -> UploadRecord {
        let mut store = self.stores[&mp_type].lock().await;

        let now = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let record = UploadRecord {
            id: store.next_id,
            name: new.name,
            org_name: new.org_name,
            last_commit_user: new.last_commit_user,
            commit: new.commit,
            upload_time: now.clone(),
            mode: new.mode,
            status: new.status,
            version: new.version,
            error: new.error,
            mp_type,
            created_at: now,
        };
        store.next_id += 1;
        store.records.insert(0, record.clone());

        let path = record_file(&self.data_dir, mp_type);
        match serde_json::to_string_pretty(&*store) {
            Ok(raw) => {
                if let Err(e) = std::fs::write(&path, raw) {
                    error!("failed to persist records to {}: {}", path.display(), e);
                }
            }
            Err(e) => error!("failed to serialize records for {}: {}", mp_type, e),
        }

        info!("upload record saved: {} - {:?}", record.name, record.status);
        record
    }

    /// Newest-first page of records plus the type's total count.
    pub async fn query(
        &self,
        mp_type: MiniProgramType,
        page: usize,
        size: usize,
    ) -> (Vec<UploadRecord>, usize) {
        let store = self.stores[&mp_type].lock().await;
        let total = store.records.len();
        let offset = page.saturating_sub(1) * size;
        let slice = store
            .records
            .iter()
            .skip(offset)
            .take(size)
            .cloned()
            .collect();
        (slice, total)
    }

    /// All records for one project name, newest-first. Linear scan; record
    /// volumes are small.
    pub async fn query_by_name(&self, mp_type: MiniProgramType, name: &str) -> Vec<UploadRecord> {
        let store = self.stores[&mp_type].lock().await;
        store
            .records
            .iter()
            .filter(|r| r.name == name)
            .cloned()
            .collect()
    }
}

fn record_file(data_dir: &std::path::Path, mp_type: MiniProgramType) -> PathBuf {
    data_dir.join(format!("upload_records.{}.json", mp_type.dir_name()))
}
