use crate::error::StoreError;
use crate::models::{IndexStatus, PaperIndexRecord};
use crate::store::{RecordPage, RecordStore};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Default, Clone)]
struct RecordTable {
    rows: BTreeMap<String, PaperIndexRecord>,
}

impl RecordTable {
    fn insert(&mut self, mut record: PaperIndexRecord) -> bool {
        if self.rows.contains_key(&record.paper_id) {
            return false;
        }
        record.version = 1;
        self.rows.insert(record.paper_id.clone(), record);
        true
    }

    fn compare_and_swap(&mut self, expected_version: u64, mut record: PaperIndexRecord) -> bool {
        match self.rows.get_mut(&record.paper_id) {
            Some(current) if current.version == expected_version => {
                record.version = expected_version + 1;
                *current = record;
                true
            }
            _ => false,
        }
    }

    fn page(&self, status: IndexStatus, cursor: Option<&str>, limit: usize) -> RecordPage {
        let limit = limit.max(1);
        let mut matching = self
            .rows
            .iter()
            .filter(|(id, _)| cursor.map_or(true, |cursor| id.as_str() > cursor))
            .filter(|(_, record)| record.status == status)
            .map(|(_, record)| record.clone());

        let records = matching.by_ref().take(limit).collect::<Vec<_>>();
        let more = matching.next().is_some();
        RecordPage {
            next_cursor: if more {
                records.last().map(|record| record.paper_id.clone())
            } else {
                None
            },
            records,
        }
    }
}

/// Process-local store. State is lost on exit.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    table: RwLock<RecordTable>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a record regardless of version. Test and migration helper.
    pub async fn put(&self, record: PaperIndexRecord) {
        self.table
            .write()
            .await
            .rows
            .insert(record.paper_id.clone(), record);
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, paper_id: &str) -> Result<Option<PaperIndexRecord>, StoreError> {
        Ok(self.table.read().await.rows.get(paper_id).cloned())
    }

    async fn insert(&self, record: PaperIndexRecord) -> Result<bool, StoreError> {
        Ok(self.table.write().await.insert(record))
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        record: PaperIndexRecord,
    ) -> Result<bool, StoreError> {
        Ok(self.table.write().await.compare_and_swap(expected_version, record))
    }

    async fn list_by_status(
        &self,
        status: IndexStatus,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<RecordPage, StoreError> {
        Ok(self.table.read().await.page(status, cursor, limit))
    }
}

/// Records persisted as one JSON document, rewritten through a temp file
/// and rename after every successful mutation. Writers within a process are
/// serialized by the mutex; separate processes must not share a file.
#[derive(Debug)]
pub struct JsonFileRecordStore {
    path: PathBuf,
    table: Mutex<RecordTable>,
}

impl JsonFileRecordStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let rows = match tokio::fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str::<Vec<PaperIndexRecord>>(&raw)?
                .into_iter()
                .map(|record| (record.paper_id.clone(), record))
                .collect(),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(error) => return Err(error.into()),
        };

        Ok(Self {
            path,
            table: Mutex::new(RecordTable { rows }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, table: &RecordTable) -> Result<(), StoreError> {
        let rows = table.rows.values().collect::<Vec<_>>();
        let encoded = serde_json::to_vec_pretty(&rows)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, encoded).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn get(&self, paper_id: &str) -> Result<Option<PaperIndexRecord>, StoreError> {
        Ok(self.table.lock().await.rows.get(paper_id).cloned())
    }

    async fn insert(&self, record: PaperIndexRecord) -> Result<bool, StoreError> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        if !next.insert(record) {
            return Ok(false);
        }
        self.persist(&next).await?;
        *table = next;
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        record: PaperIndexRecord,
    ) -> Result<bool, StoreError> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        if !next.compare_and_swap(expected_version, record) {
            return Ok(false);
        }
        self.persist(&next).await?;
        *table = next;
        Ok(true)
    }

    async fn list_by_status(
        &self,
        status: IndexStatus,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<RecordPage, StoreError> {
        Ok(self.table.lock().await.page(status, cursor, limit))
    }
}
