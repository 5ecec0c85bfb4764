//! Upload pipeline coordinating parsing, chunking, inference, and Qdrant writes.

use crate::{
    document::{Chunk, DocType, Document, DocumentParser},
    inference::InferenceClient,
    metrics::IngestMetrics,
    processing::{
        chunking::Chunker,
        types::{
            IngestReport, SkipStage, SkippedDocument, UploadError, UploadRequest, UploadSettings,
        },
    },
    qdrant::{ChunkPayload, Distance, IndexPoint, PointId, QdrantError, VectorIndex},
};
use indicatif::ProgressBar;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// One chunk queued for inference and upsert, with its owning document's metadata.
struct WorkItem {
    id: PointId,
    doc_title: Arc<str>,
    doc_source: Arc<str>,
    chunk: Chunk,
}

impl WorkItem {
    fn into_point(self, max_chars: usize) -> IndexPoint {
        let Self {
            id,
            doc_title,
            doc_source,
            chunk,
        } = self;
        IndexPoint {
            id,
            vector: chunk.embedding,
            payload: ChunkPayload::new(
                &doc_title,
                &doc_source,
                &chunk.body,
                chunk.summary,
                max_chars,
            ),
        }
    }
}

/// Ingests a directory of Word and PDF files into a Qdrant collection.
///
/// Every dependency is injected so the pipeline can run against doubles. Windows of
/// `embed_batch_size` chunks are processed strictly one after another: all inference for a
/// window completes before its upsert, and a failing upsert falls back to small sub-batches
/// when splitting can help. Per-document and per-chunk failures are recorded in the returned
/// [`IngestReport`] instead of aborting the run.
pub struct UploadPipeline {
    parser: Arc<dyn DocumentParser>,
    chunker: Arc<dyn Chunker>,
    inference: InferenceClient,
    index: Arc<dyn VectorIndex>,
    settings: UploadSettings,
    progress: ProgressBar,
}

impl UploadPipeline {
    /// Assemble a pipeline from its collaborators.
    pub fn new(
        parser: Arc<dyn DocumentParser>,
        chunker: Arc<dyn Chunker>,
        inference: InferenceClient,
        index: Arc<dyn VectorIndex>,
        settings: UploadSettings,
    ) -> Self {
        Self {
            parser,
            chunker,
            inference,
            index,
            settings,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report upsert progress on `progress`.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Execute one upload run.
    pub async fn run(&self, request: UploadRequest) -> Result<IngestReport, UploadError> {
        self.settings.validate()?;
        if !request.db_path.is_dir() {
            return Err(UploadError::MissingDirectory(request.db_path));
        }

        let collection = self.settings.collection(request.target).to_string();
        tracing::info!(
            collection = %collection,
            db_path = %request.db_path.display(),
            recreate = request.recreate,
            "Starting upload"
        );

        let metrics = IngestMetrics::new();
        self.prepare_collection(&collection, request.recreate).await?;

        let files = enumerate_documents(&request.db_path)?;
        metrics.record_files_found(files.len() as u64);
        tracing::info!(files = files.len(), "Enumerated input documents");

        let mut skipped_documents = Vec::new();
        let documents = self
            .load_documents(files, &metrics, &mut skipped_documents)
            .await;
        let items = pair_chunks(documents, &metrics);

        self.progress.set_length(items.len() as u64);
        let batch_size = self.settings.embed_batch_size;
        let mut remaining = items.into_iter();
        let mut window_index = 0usize;
        loop {
            let window: Vec<WorkItem> = remaining.by_ref().take(batch_size).collect();
            if window.is_empty() {
                break;
            }
            self.process_window(&collection, window_index, window, &metrics)
                .await;
            window_index += 1;
        }
        self.progress.finish();

        let report = IngestReport {
            collection,
            counts: metrics.snapshot(),
            skipped_documents,
        };
        tracing::info!(report = %report, "Upload finished");
        Ok(report)
    }

    async fn prepare_collection(&self, collection: &str, recreate: bool) -> Result<(), UploadError> {
        let vector_size = self.settings.vector_size;
        let prepared = if recreate {
            tracing::warn!(collection, "Recreating collection; existing points will be removed");
            self.index
                .recreate_collection(collection, vector_size, Distance::Cosine)
                .await
        } else {
            self.index
                .ensure_collection(collection, vector_size, Distance::Cosine)
                .await
        };
        prepared.map_err(|source| UploadError::Collection {
            collection: collection.to_string(),
            source,
        })
    }

    async fn load_documents(
        &self,
        files: Vec<(PathBuf, DocType)>,
        metrics: &IngestMetrics,
        skipped: &mut Vec<SkippedDocument>,
    ) -> Vec<Document> {
        let mut documents = Vec::with_capacity(files.len());
        for (position, (path, doc_type)) in files.into_iter().enumerate() {
            let doc_id = position as u64;
            let parsed = match self.parser.parse(&path, doc_type).await {
                Ok(parsed) => parsed,
                Err(error) => {
                    tracing::warn!(path = %path.display(), error = %error, "Skipping unparseable document");
                    metrics.record_skipped_document();
                    skipped.push(SkippedDocument {
                        path,
                        stage: SkipStage::Parse,
                        reason: error.to_string(),
                    });
                    continue;
                }
            };

            let mut document = Document::new(doc_id, doc_type, parsed);
            match self.chunker.chunk(&document) {
                Ok(chunks) => {
                    metrics.record_document(chunks.len() as u64);
                    tracing::debug!(
                        doc_id,
                        doc_title = %document.doc_title,
                        doc_type = %doc_type,
                        chunks = chunks.len(),
                        "Document chunked"
                    );
                    document.chunk_list = chunks;
                    documents.push(document);
                }
                Err(error) => {
                    tracing::warn!(path = %path.display(), error = %error, "Skipping document that failed to chunk");
                    metrics.record_skipped_document();
                    skipped.push(SkippedDocument {
                        path,
                        stage: SkipStage::Chunk,
                        reason: error.to_string(),
                    });
                }
            }
        }
        documents
    }

    async fn process_window(
        &self,
        collection: &str,
        window_index: usize,
        window: Vec<WorkItem>,
        metrics: &IngestMetrics,
    ) {
        let inputs: Vec<(PointId, &str)> = window
            .iter()
            .map(|item| (item.id, item.chunk.body.as_str()))
            .collect();
        let mut results = self.inference.infer_window(&inputs).await;

        let mut points = Vec::with_capacity(window.len());
        for mut item in window {
            match results.remove(&item.id) {
                Some(Ok(inference)) => {
                    item.chunk.embedding = inference.embedding;
                    item.chunk.summary = inference.summary;
                    points.push(item.into_point(self.settings.max_chunk_length));
                }
                Some(Err(error)) => {
                    tracing::warn!(
                        window = window_index,
                        point_id = %item.id,
                        doc_title = %item.doc_title,
                        error = %error,
                        "Chunk inference failed; leaving it out of the window"
                    );
                    metrics.record_failed_chunk();
                }
                None => {
                    tracing::error!(window = window_index, point_id = %item.id, "No inference result for chunk");
                    metrics.record_failed_chunk();
                }
            }
        }

        if points.is_empty() {
            tracing::warn!(window = window_index, "Window produced no points to upsert");
            metrics.record_window(false);
            return;
        }

        self.upsert_window(collection, window_index, &points, metrics)
            .await;
    }

    async fn upsert_window(
        &self,
        collection: &str,
        window_index: usize,
        points: &[IndexPoint],
        metrics: &IngestMetrics,
    ) {
        let error = match self.upsert_bounded(collection, points).await {
            Ok(()) => {
                metrics.record_window(false);
                self.advance(points.len(), metrics);
                tracing::debug!(window = window_index, points = points.len(), "Window upserted");
                return;
            }
            Err(error) => error,
        };

        if !error.splitting_may_help() {
            tracing::error!(
                window = window_index,
                points = points.len(),
                error = %error,
                "Window upsert rejected; not retrying"
            );
            metrics.record_window(false);
            metrics.record_failed_points(points.len() as u64);
            return;
        }

        let fallback = self.settings.fallback_batch_size;
        tracing::warn!(
            window = window_index,
            points = points.len(),
            sub_batch_size = fallback,
            error = %error,
            "Window upsert failed; retrying in sub-batches"
        );
        metrics.record_window(true);

        for (sub_index, batch) in points.chunks(fallback).enumerate() {
            match self.upsert_bounded(collection, batch).await {
                Ok(()) => self.advance(batch.len(), metrics),
                Err(error) => {
                    let first_id = batch.first().map(|point| point.id.get());
                    tracing::error!(
                        window = window_index,
                        sub_batch = sub_index,
                        first_point_id = ?first_id,
                        points = batch.len(),
                        error = %error,
                        "Sub-batch upsert failed"
                    );
                    metrics.record_failed_points(batch.len() as u64);
                }
            }
        }
    }

    async fn upsert_bounded(
        &self,
        collection: &str,
        points: &[IndexPoint],
    ) -> Result<(), QdrantError> {
        let after = self.settings.upsert_timeout;
        tokio::time::timeout(after, self.index.upsert(collection, points))
            .await
            .unwrap_or_else(|_| Err(QdrantError::Timeout { after }))
    }

    fn advance(&self, count: usize, metrics: &IngestMetrics) {
        metrics.record_upserted(count as u64);
        self.progress.inc(count as u64);
    }
}

/// Supported files directly inside `dir`, sorted by file name.
fn enumerate_documents(dir: &Path) -> Result<Vec<(PathBuf, DocType)>, UploadError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        // Follows symlinks.
        if !entry.path().is_file() {
            continue;
        }
        match DocType::from_path(entry.path()) {
            Some(doc_type) => files.push((entry.into_path(), doc_type)),
            None => tracing::debug!(path = %entry.path().display(), "Ignoring unsupported file"),
        }
    }
    Ok(files)
}

/// Flatten documents into one ordered work list, dropping blank, unaddressable and
/// duplicate chunks.
///
/// Point ids are unique across the returned list; a later chunk repeating an id is rejected.
fn pair_chunks(documents: Vec<Document>, metrics: &IngestMetrics) -> Vec<WorkItem> {
    let mut items = Vec::new();
    let mut seen = HashSet::new();
    for mut document in documents {
        let doc_title: Arc<str> = Arc::from(document.doc_title.as_str());
        let doc_source: Arc<str> = Arc::from(document.doc_source.as_str());
        for chunk in std::mem::take(&mut document.chunk_list) {
            if chunk.body.trim().is_empty() {
                metrics.record_empty_chunk();
                continue;
            }
            match PointId::new(chunk.doc_id, chunk.chunk_id) {
                Ok(id) if !seen.insert(id) => {
                    tracing::warn!(
                        doc_title = %doc_title,
                        point_id = %id,
                        "Rejecting chunk with duplicate id"
                    );
                    metrics.record_rejected_chunk();
                }
                Ok(id) => items.push(WorkItem {
                    id,
                    doc_title: Arc::clone(&doc_title),
                    doc_source: Arc::clone(&doc_source),
                    chunk,
                }),
                Err(error) => {
                    tracing::warn!(doc_title = %doc_title, error = %error, "Rejecting chunk");
                    metrics.record_rejected_chunk();
                }
            }
        }
    }
    items
}
