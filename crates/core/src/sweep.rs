use crate::config::chrono_duration;
use crate::embeddings::Embedder;
use crate::error::Result;
use crate::indexer::{IndexCoordinator, WRITE_ATTEMPTS};
use crate::models::{IndexStatus, PaperIndexRecord, SweepReport};
use crate::store::{RecordStore, StatusPages};
use crate::traits::SearchEngine;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

impl<S, E, V> IndexCoordinator<S, E, V>
where
    S: RecordStore,
    E: Embedder,
    V: SearchEngine,
{
    pub async fn sweep_stale_entries(&self) -> Result<SweepReport> {
        self.sweep_stale_entries_at(Utc::now()).await
    }

    /// Evicts `ready` papers whose last activity is older than the stale
    /// window at `now`. The record is reset to `not_indexed` first; its entry
    /// is deleted best-effort only once that reset has won.
    pub async fn sweep_stale_entries_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let cutoff = now - chrono_duration(self.indexing.stale_after);
        let mut report = SweepReport::default();
        let mut pages = StatusPages::new(&self.records, IndexStatus::Ready, self.indexing.sweep_page_size);

        while let Some(page) = self.next_sweep_page(&mut pages).await? {
            for record in page {
                report.scanned += 1;
                if record.last_activity() > cutoff {
                    continue;
                }
                if self.evict(record, now).await? {
                    report.cleaned += 1;
                }
            }
        }

        info!(scanned = report.scanned, cleaned = report.cleaned, "stale index sweep finished");
        Ok(report)
    }

    async fn next_sweep_page(
        &self,
        pages: &mut StatusPages<'_, S>,
    ) -> Result<Option<Vec<PaperIndexRecord>>> {
        let mut attempt = 1;
        loop {
            match pages.next_page().await {
                Ok(page) => return Ok(page),
                Err(error) if attempt < WRITE_ATTEMPTS => {
                    warn!(%error, attempt, "reading sweep page failed, retrying");
                    attempt += 1;
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    async fn evict(&self, record: PaperIndexRecord, now: DateTime<Utc>) -> Result<bool> {
        let mut reset = record.clone();
        reset.reset_to_not_indexed(now);
        if !self.records.compare_and_swap(record.version, reset).await? {
            debug!(paper_id = %record.paper_id, "record changed during sweep, left alone");
            return Ok(false);
        }

        if let Some(entry_id) = &record.entry_id {
            if let Err(error) = self.engine.delete(entry_id).await {
                warn!(paper_id = %record.paper_id, %entry_id, %error, "failed to delete stale entry");
            }
        }
        debug!(paper_id = %record.paper_id, last_activity = %record.last_activity(), "evicted stale index");
        Ok(true)
    }
}
