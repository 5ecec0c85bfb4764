use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing one ingestion run.
#[derive(Default)]
pub struct IngestMetrics {
    files_found: AtomicU64,
    documents_parsed: AtomicU64,
    documents_skipped: AtomicU64,
    chunks_total: AtomicU64,
    chunks_empty: AtomicU64,
    chunks_rejected: AtomicU64,
    chunks_failed: AtomicU64,
    points_upserted: AtomicU64,
    points_failed: AtomicU64,
    windows_total: AtomicU64,
    windows_degraded: AtomicU64,
}

impl IngestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the number of supported files found during enumeration.
    pub fn record_files_found(&self, count: u64) {
        self.files_found.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a document that was parsed and chunked, along with its chunk count.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_parsed.fetch_add(1, Ordering::Relaxed);
        self.chunks_total.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a document dropped during parsing or chunking.
    pub fn record_skipped_document(&self) {
        self.documents_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a chunk dropped because its body was blank.
    pub fn record_empty_chunk(&self) {
        self.chunks_empty.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a chunk whose point id could not be encoded.
    pub fn record_rejected_chunk(&self) {
        self.chunks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a chunk whose embedding or summary could not be produced.
    pub fn record_failed_chunk(&self) {
        self.chunks_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record points acknowledged by the vector index.
    pub fn record_upserted(&self, count: u64) {
        self.points_upserted.fetch_add(count, Ordering::Relaxed);
    }

    /// Record points the vector index refused.
    pub fn record_failed_points(&self, count: u64) {
        self.points_failed.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a processed window and whether it needed the degraded upsert path.
    pub fn record_window(&self, degraded: bool) {
        self.windows_total.fetch_add(1, Ordering::Relaxed);
        if degraded {
            self.windows_degraded.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_found: self.files_found.load(Ordering::Relaxed),
            documents_parsed: self.documents_parsed.load(Ordering::Relaxed),
            documents_skipped: self.documents_skipped.load(Ordering::Relaxed),
            chunks_total: self.chunks_total.load(Ordering::Relaxed),
            chunks_empty: self.chunks_empty.load(Ordering::Relaxed),
            chunks_rejected: self.chunks_rejected.load(Ordering::Relaxed),
            chunks_failed: self.chunks_failed.load(Ordering::Relaxed),
            points_upserted: self.points_upserted.load(Ordering::Relaxed),
            points_failed: self.points_failed.load(Ordering::Relaxed),
            windows_total: self.windows_total.load(Ordering::Relaxed),
            windows_degraded: self.windows_degraded.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of ingestion counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Supported files found in the input directory.
    pub files_found: u64,
    /// Documents that were parsed and chunked.
    pub documents_parsed: u64,
    /// Documents skipped because parsing or chunking failed.
    pub documents_skipped: u64,
    /// Chunks produced across all parsed documents.
    pub chunks_total: u64,
    /// Chunks dropped because their body was blank.
    pub chunks_empty: u64,
    /// Chunks rejected because their point id would collide.
    pub chunks_rejected: u64,
    /// Chunks whose inference failed after retries.
    pub chunks_failed: u64,
    /// Points acknowledged by the vector index.
    pub points_upserted: u64,
    /// Points the vector index refused.
    pub points_failed: u64,
    /// Windows processed by the batch loop.
    pub windows_total: u64,
    /// Windows that fell back to sub-batch upserts.
    pub windows_degraded: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = IngestMetrics::new();
        metrics.record_document(2);
        metrics.record_document(3);
        metrics.record_skipped_document();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_parsed, 2);
        assert_eq!(snapshot.chunks_total, 5);
        assert_eq!(snapshot.documents_skipped, 1);
    }

    #[test]
    fn degraded_windows_are_a_subset_of_all_windows() {
        let metrics = IngestMetrics::new();
        metrics.record_window(false);
        metrics.record_window(true);
        metrics.record_upserted(7);
        metrics.record_failed_points(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.windows_total, 2);
        assert_eq!(snapshot.windows_degraded, 1);
        assert_eq!(snapshot.points_upserted, 7);
        assert_eq!(snapshot.points_failed, 3);
    }

    #[test]
    fn snapshot_starts_empty() {
        let metrics = IngestMetrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
