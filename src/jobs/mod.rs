// Background generation workers.
//
// Accepted requests are sent through a channel to a fixed number of workers.
// Each worker owns the composition rows of the jobs it pulls and is the only
// writer of their pending -> ready/failed transition. Outcomes are broadcast
// so that callers (tests, the CLI) can observe the otherwise invisible
// completion.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::composition::{encode, CompositionStore, GenerationPipeline};
use crate::db::schema::CompositionStatus;
use crate::error::{GenerationError, StoreError};
use crate::types::{ChronicleId, CompositionId};

const OUTCOME_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub composition_id: CompositionId,
    pub chronicle_id: ChronicleId,
    pub audio_path: PathBuf,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatus {
    Ready { notes: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub composition_id: CompositionId,
    pub chronicle_id: ChronicleId,
    pub status: JobStatus,
    pub elapsed_ms: u64,
}

pub struct GenerationQueue {
    sender: mpsc::UnboundedSender<GenerationJob>,
    outcomes: broadcast::Sender<JobOutcome>,
    workers: Vec<JoinHandle<()>>,
}

impl GenerationQueue {
    /// Spawn `workers` workers on the current runtime.
    pub fn start(
        workers: usize,
        pipeline: Arc<GenerationPipeline>,
        store: CompositionStore,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<GenerationJob>();
        let receiver = Arc::new(Mutex::new(receiver));
        let (outcomes, _) = broadcast::channel(OUTCOME_CAPACITY);

        let workers = (0..workers.max(1))
            .map(|worker_id| {
                let receiver = receiver.clone();
                let pipeline = pipeline.clone();
                let store = store.clone();
                let outcomes = outcomes.clone();
                tokio::spawn(async move {
                    Self::worker_loop(worker_id, receiver, pipeline, store, outcomes).await;
                })
            })
            .collect();

        Self {
            sender,
            outcomes,
            workers,
        }
    }

    pub fn submit(&self, job: GenerationJob) -> Result<()> {
        self.sender.send(job)?;
        Ok(())
    }

    /// Receive the outcome of every job finished from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobOutcome> {
        self.outcomes.subscribe()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    async fn worker_loop(
        worker_id: usize,
        receiver: Arc<Mutex<mpsc::UnboundedReceiver<GenerationJob>>>,
        pipeline: Arc<GenerationPipeline>,
        store: CompositionStore,
        outcomes: broadcast::Sender<JobOutcome>,
    ) {
        tracing::debug!("Generation worker {} started", worker_id);

        loop {
            let job = {
                let mut rx = receiver.lock().await;
                rx.recv().await
            };
            let Some(job) = job else {
                break;
            };

            tracing::debug!(
                "Worker {} generating composition {} of chronicle {}",
                worker_id,
                job.composition_id,
                job.chronicle_id
            );
            let started = Instant::now();

            let status = match Self::execute(&job, &pipeline, &store).await {
                Ok(notes) => {
                    tracing::info!(
                        "Composition {} is ready with {} notes",
                        job.composition_id,
                        notes
                    );
                    JobStatus::Ready { notes }
                }
                Err(err) => {
                    tracing::error!(
                        "Generating composition {} failed: {}",
                        job.composition_id,
                        err
                    );
                    let reason = err.to_string();
                    if let Err(e) = store.fail(&job.composition_id, &reason).await {
                        tracing::error!(
                            "Could not mark composition {} as failed: {}",
                            job.composition_id,
                            e
                        );
                    }
                    JobStatus::Failed { reason }
                }
            };

            // Nobody listening is fine.
            let _ = outcomes.send(JobOutcome {
                composition_id: job.composition_id,
                chronicle_id: job.chronicle_id,
                status,
                elapsed_ms: started.elapsed().as_millis() as u64,
            });
        }

        tracing::debug!("Generation worker {} stopped", worker_id);
    }

    async fn execute(
        job: &GenerationJob,
        pipeline: &Arc<GenerationPipeline>,
        store: &CompositionStore,
    ) -> Result<usize, GenerationError> {
        match store.get(&job.composition_id).await? {
            Some(record) if record.status == CompositionStatus::Pending => {}
            Some(_) => return Err(StoreError::NotPending(job.composition_id.to_string()).into()),
            None => {
                return Err(StoreError::NotFound(format!(
                    "Composition {} not found",
                    job.composition_id
                ))
                .into());
            }
        }

        let pipeline = pipeline.clone();
        let audio_path = job.audio_path.clone();
        let language = job.language.clone();
        let document = tokio::task::spawn_blocking(move || pipeline.run(&audio_path, &language))
            .await
            .map_err(|e| GenerationError::Worker(e.to_string()))??;

        let encoded = encode(&document)?;
        store.complete(&job.composition_id, &encoded).await?;
        Ok(document.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{CompositionView, SCHEMA_VERSION};
    use crate::testing::{memory_db, speech_wav, test_config, FixedRecognizer};

    async fn setup(dir: &std::path::Path) -> (GenerationQueue, CompositionStore, PathBuf) {
        let config = Arc::new(test_config(dir));
        let pipeline = Arc::new(GenerationPipeline::new(
            config,
            Arc::new(FixedRecognizer::new(vec![0.5, 1.0, 1.02, 2.0])),
        ));
        let store = CompositionStore::new(memory_db().await);
        let queue = GenerationQueue::start(2, pipeline, store.clone());

        let audio = dir.join("speech.wav");
        std::fs::write(&audio, speech_wav()).unwrap();
        (queue, store, audio)
    }

    #[tokio::test]
    async fn test_job_completes_composition() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, store, audio) = setup(dir.path()).await;
        let chronicle = ChronicleId::new("c1");
        let id = store.create_pending(&chronicle, "t", SCHEMA_VERSION).await.unwrap();

        let mut outcomes = queue.subscribe();
        queue
            .submit(GenerationJob {
                composition_id: id.clone(),
                chronicle_id: chronicle,
                audio_path: audio,
                language: "en".to_string(),
            })
            .unwrap();

        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(outcome.composition_id, id);
        assert_eq!(outcome.status, JobStatus::Ready { notes: 3 });

        let view = CompositionView::from_record(store.get(&id).await.unwrap().unwrap()).unwrap();
        assert!(view.is_ready);
        assert_eq!(view.data.unwrap().notes.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_job_marks_row_failed() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, store, audio) = setup(dir.path()).await;
        let chronicle = ChronicleId::new("c1");
        let id = store.create_pending(&chronicle, "t", SCHEMA_VERSION).await.unwrap();

        let mut outcomes = queue.subscribe();
        queue
            .submit(GenerationJob {
                composition_id: id.clone(),
                chronicle_id: chronicle,
                audio_path: audio,
                language: "xx".to_string(),
            })
            .unwrap();

        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(
            outcome.status,
            JobStatus::Failed {
                reason: "Unsupported language: xx".to_string()
            }
        );

        let record = store.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, CompositionStatus::Failed);
        assert!(record.data.is_none());
        assert_eq!(record.error.as_deref(), Some("Unsupported language: xx"));
    }

    #[tokio::test]
    async fn test_job_for_missing_row_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, _store, audio) = setup(dir.path()).await;
        assert_eq!(queue.worker_count(), 2);

        let mut outcomes = queue.subscribe();
        queue
            .submit(GenerationJob {
                composition_id: CompositionId::new("gone"),
                chronicle_id: ChronicleId::new("c1"),
                audio_path: audio,
                language: "en".to_string(),
            })
            .unwrap();

        let outcome = outcomes.recv().await.unwrap();
        assert!(matches!(outcome.status, JobStatus::Failed { .. }));
    }
}
