//! The orchestrator ties the stores, the upload directory and the generation
//! workers together. Every operation of the HTTP API and the CLI goes through
//! it.

mod library;
mod locks;

pub use library::ChronicleInput;

use locks::ChronicleLocks;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;

use crate::composition::{CompositionStore, CompositionView, GenerationPipeline, SCHEMA_VERSION};
use crate::config::ChroniclerConfig;
use crate::db::queries::QueryBuilder;
use crate::db::{create_connection, ensure_schema, DatabaseConfig, Db};
use crate::error::{AdmissionError, ServiceError, ServiceResult};
use crate::jobs::{GenerationJob, GenerationQueue, JobOutcome};
use crate::media::{is_audio, FfmpegThumbnailer, Thumbnailer, UploadStore};
use crate::page::{Page, PageParams};
use crate::recognition::{default_recognizer, SpeechRecognizer};
use crate::types::{ChronicleId, CompositionId};

/// Title format of generated compositions.
const COMPOSITION_TITLE: &str = "Composition %d.%m.%Y %H:%M";

pub struct Orchestrator {
    db: Db,
    config: Arc<ChroniclerConfig>,
    compositions: CompositionStore,
    uploads: UploadStore,
    queue: GenerationQueue,
    locks: ChronicleLocks,
}

impl Orchestrator {
    /// Connect to the database and start the generation workers with the
    /// default recognizer and ffmpeg thumbnails.
    pub async fn new(db_config: DatabaseConfig, config: Arc<ChroniclerConfig>) -> Result<Self> {
        let db = create_connection(db_config).await?;
        ensure_schema(&db).await?;

        let recognizer = default_recognizer(&config);
        let thumbnailer = Arc::new(FfmpegThumbnailer::from_config(&config.uploads));
        Self::with_parts(db, config, recognizer, thumbnailer)
    }

    /// Assemble an orchestrator from an initialised database and explicit
    /// collaborators. Must be called inside a Tokio runtime.
    pub fn with_parts(
        db: Db,
        config: Arc<ChroniclerConfig>,
        recognizer: Arc<dyn SpeechRecognizer>,
        thumbnailer: Arc<dyn Thumbnailer>,
    ) -> Result<Self> {
        let uploads = UploadStore::new(&config.uploads, thumbnailer);
        uploads.ensure_dir()?;

        let compositions = CompositionStore::new(db.clone());
        let pipeline = Arc::new(GenerationPipeline::new(config.clone(), recognizer));
        let queue = GenerationQueue::start(config.workers, pipeline, compositions.clone());

        tracing::info!(
            "Orchestrator ready with {} generation workers, uploads in {}",
            queue.worker_count(),
            uploads.dir().display()
        );

        Ok(Self {
            db,
            config,
            compositions,
            uploads,
            queue,
            locks: ChronicleLocks::default(),
        })
    }

    pub fn config(&self) -> &Arc<ChroniclerConfig> {
        &self.config
    }

    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }

    /// Outcomes of generation jobs finished from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobOutcome> {
        self.queue.subscribe()
    }

    /// Admit a generation request for a chronicle.
    ///
    /// Returns as soon as the pending composition is stored and the job is
    /// queued; the composition becomes ready (or failed) later.
    pub async fn request_generation(&self, chronicle_id: &ChronicleId) -> ServiceResult<CompositionId> {
        let _guard = self.locks.acquire(chronicle_id).await;

        let chronicle = QueryBuilder::find_chronicle(&self.db, chronicle_id)
            .await?
            .ok_or_else(|| AdmissionError::ChronicleNotFound(chronicle_id.clone()))?;

        let audio_files: Vec<_> = QueryBuilder::files_for_chronicle(&self.db, chronicle_id)
            .await?
            .into_iter()
            .filter(|f| is_audio(&f.mime))
            .collect();
        let [audio] = audio_files.as_slice() else {
            return Err(AdmissionError::AudioFileCount {
                chronicle: chronicle_id.clone(),
                found: audio_files.len(),
            }
            .into());
        };

        let title = chrono::Local::now().format(COMPOSITION_TITLE).to_string();
        let id = self
            .compositions
            .create_pending(chronicle_id, &title, SCHEMA_VERSION)
            .await?;

        let job = GenerationJob {
            composition_id: id.clone(),
            chronicle_id: chronicle_id.clone(),
            audio_path: PathBuf::from(&audio.path),
            language: chronicle.language,
        };
        if let Err(err) = self.queue.submit(job) {
            tracing::error!("Could not queue composition {}: {}", id, err);
            self.compositions
                .fail(&id, "generation queue is closed")
                .await?;
            return Err(ServiceError::Internal(err.to_string()));
        }

        tracing::info!(
            "Accepted generation of composition {} for chronicle {}",
            id,
            chronicle_id
        );
        Ok(id)
    }

    pub async fn get_composition(
        &self,
        chronicle_id: &ChronicleId,
        composition_id: &CompositionId,
    ) -> ServiceResult<CompositionView> {
        self.get_chronicle(chronicle_id).await?;

        let record = self
            .compositions
            .get(composition_id)
            .await?
            .filter(|r| &r.chronicle_id == chronicle_id)
            .ok_or_else(|| composition_not_found(composition_id))?;

        Ok(CompositionView::from_record(record)?)
    }

    /// Compositions of a chronicle, newest first and without their data.
    pub async fn list_compositions(
        &self,
        chronicle_id: &ChronicleId,
        page: PageParams,
    ) -> ServiceResult<Page<CompositionView>> {
        page.validate()?;
        self.get_chronicle(chronicle_id).await?;

        let records = self.compositions.list(chronicle_id, &page).await?;
        let total = self.compositions.count(chronicle_id).await?;
        Ok(Page::new(records, total, page).map(CompositionView::summary))
    }

    /// Delete a ready or failed composition.
    pub async fn delete_composition(
        &self,
        chronicle_id: &ChronicleId,
        composition_id: &CompositionId,
    ) -> ServiceResult<()> {
        self.get_composition(chronicle_id, composition_id).await?;
        self.compositions.delete(composition_id).await?;

        tracing::info!("Deleted composition {}", composition_id);
        Ok(())
    }
}

fn composition_not_found(id: &CompositionId) -> ServiceError {
    ServiceError::NotFound(format!("Composition {} not found", id))
}
