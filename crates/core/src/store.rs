use crate::error::StoreError;
use crate::models::{IndexStatus, PaperIndexRecord};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<PaperIndexRecord>,
    /// Cursor for the following page; `None` once the listing is exhausted.
    pub next_cursor: Option<String>,
}

/// Document store holding one [`PaperIndexRecord`] per paper.
///
/// Every write after the first insert goes through [`RecordStore::compare_and_swap`],
/// which only succeeds while the stored version still equals the one the
/// caller read. That is the only coordination between concurrent jobs.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, paper_id: &str) -> Result<Option<PaperIndexRecord>, StoreError>;

    /// Inserts a new record at version 1. Returns `false` if the paper already has one.
    async fn insert(&self, record: PaperIndexRecord) -> Result<bool, StoreError>;

    /// Stores `record` at `expected_version + 1` if the current version is
    /// `expected_version`. Returns `false` on a version mismatch or a missing record.
    async fn compare_and_swap(
        &self,
        expected_version: u64,
        record: PaperIndexRecord,
    ) -> Result<bool, StoreError>;

    /// Records with `status`, ordered by paper id, strictly after `cursor`.
    async fn list_by_status(
        &self,
        status: IndexStatus,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<RecordPage, StoreError>;
}

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    async fn get(&self, paper_id: &str) -> Result<Option<PaperIndexRecord>, StoreError> {
        (**self).get(paper_id).await
    }

    async fn insert(&self, record: PaperIndexRecord) -> Result<bool, StoreError> {
        (**self).insert(record).await
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        record: PaperIndexRecord,
    ) -> Result<bool, StoreError> {
        (**self).compare_and_swap(expected_version, record).await
    }

    async fn list_by_status(
        &self,
        status: IndexStatus,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<RecordPage, StoreError> {
        (**self).list_by_status(status, cursor, limit).await
    }
}

/// Lazy walk over all records with one status, one bounded page at a time.
/// A failed page read leaves the cursor in place, so calling
/// [`StatusPages::next_page`] again retries that same page.
pub struct StatusPages<'a, S: ?Sized> {
    store: &'a S,
    status: IndexStatus,
    limit: usize,
    cursor: Option<String>,
    done: bool,
}

impl<'a, S: RecordStore + ?Sized> StatusPages<'a, S> {
    pub fn new(store: &'a S, status: IndexStatus, limit: usize) -> Self {
        Self {
            store,
            status,
            limit: limit.max(1),
            cursor: None,
            done: false,
        }
    }

    pub async fn next_page(&mut self) -> Result<Option<Vec<PaperIndexRecord>>, StoreError> {
        if self.done {
            return Ok(None);
        }

        let page = self
            .store
            .list_by_status(self.status, self.cursor.as_deref(), self.limit)
            .await?;

        match page.next_cursor {
            Some(cursor) => self.cursor = Some(cursor),
            None => self.done = true,
        }

        if page.records.is_empty() {
            self.done = true;
            return Ok(None);
        }
        Ok(Some(page.records))
    }
}
