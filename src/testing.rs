//! Fixtures shared by the unit and integration tests.

use std::f32::consts::PI;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex};

use tempfile::TempDir;

use crate::config::ChroniclerConfig;
use crate::db::{create_connection, ensure_schema, DatabaseConfig, Db};
use crate::error::RecognitionError;
use crate::media::{MediaCategory, MediaError, Thumbnailer};
use crate::orchestrator::Orchestrator;
use crate::recognition::{AudioBuffer, ModelHandle, RecognizedEvent, SpeechRecognizer};

/// Mono signal of `total_secs` silence with 440 Hz bursts at the given
/// `(start, length)` positions.
pub fn tone_bursts(sample_rate: u32, total_secs: f64, bursts: &[(f64, f64)]) -> Vec<f32> {
    let rate = sample_rate as f64;
    let mut samples = vec![0.0f32; (total_secs * rate).round() as usize];

    for &(start, len) in bursts {
        let first = (start * rate).round() as usize;
        let last = ((start + len) * rate).round() as usize;
        for (n, sample) in samples
            .iter_mut()
            .enumerate()
            .take(last)
            .skip(first)
        {
            let t = (n - first) as f32 / sample_rate as f32;
            *sample = 0.5 * (2.0 * PI * 440.0 * t).sin();
        }
    }

    samples
}

/// 16-bit PCM mono WAV file contents.
pub fn wav_bytes(sample_rate: u32, samples: &[f32]) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + data_len as usize);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());

    for sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }

    out
}

/// A short recording with speech-like bursts at 0.5, 1.0 and 2.0 seconds.
pub fn speech_wav() -> Vec<u8> {
    let samples = tone_bursts(16_000, 2.5, &[(0.5, 0.2), (1.0, 0.2), (2.0, 0.2)]);
    wav_bytes(16_000, &samples)
}

/// Recognizer that ignores the audio and reports fixed event starts.
pub struct FixedRecognizer {
    starts: Vec<f64>,
}

impl FixedRecognizer {
    pub fn new(starts: Vec<f64>) -> Self {
        Self { starts }
    }
}

impl SpeechRecognizer for FixedRecognizer {
    fn recognize(
        &self,
        _model: &ModelHandle,
        _audio: &AudioBuffer,
    ) -> Result<Vec<RecognizedEvent>, RecognitionError> {
        Ok(self
            .starts
            .iter()
            .map(|&start| RecognizedEvent {
                start,
                end: start + 0.1,
                text: None,
            })
            .collect())
    }
}

/// Blocks every recognition until `open` is called.
#[derive(Clone, Default)]
pub struct Gate {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    pub fn open(&self) {
        let (lock, cvar) = &*self.state;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    fn wait(&self) {
        let (lock, cvar) = &*self.state;
        let mut open = lock.lock().unwrap();
        while !*open {
            open = cvar.wait(open).unwrap();
        }
    }
}

/// Wraps another recognizer behind a [`Gate`].
pub struct GatedRecognizer<R> {
    gate: Gate,
    inner: R,
}

impl<R> GatedRecognizer<R> {
    pub fn new(gate: Gate, inner: R) -> Self {
        Self { gate, inner }
    }
}

impl<R: SpeechRecognizer> SpeechRecognizer for GatedRecognizer<R> {
    fn recognize(
        &self,
        model: &ModelHandle,
        audio: &AudioBuffer,
    ) -> Result<Vec<RecognizedEvent>, RecognitionError> {
        self.gate.wait();
        self.inner.recognize(model, audio)
    }
}

/// Writes a placeholder instead of calling ffmpeg.
pub struct StubThumbnailer;

impl Thumbnailer for StubThumbnailer {
    fn render(
        &self,
        _source: &Path,
        _category: MediaCategory,
        dest: &Path,
    ) -> Result<(), MediaError> {
        std::fs::write(dest, b"thumbnail").map_err(|e| MediaError::Io(e.to_string()))
    }
}

/// Always fails, like ffmpeg choking on a corrupt upload.
pub struct FailingThumbnailer;

impl Thumbnailer for FailingThumbnailer {
    fn render(
        &self,
        _source: &Path,
        _category: MediaCategory,
        _dest: &Path,
    ) -> Result<(), MediaError> {
        Err(MediaError::Thumbnail("unreadable input".to_string()))
    }
}

pub async fn memory_db() -> Db {
    let config = DatabaseConfig {
        url: "memory".to_string(),
        ..Default::default()
    };
    let db = create_connection(config).await.unwrap();
    ensure_schema(&db).await.unwrap();
    db
}

/// Configuration whose models live in `dir` and whose uploads go to
/// `dir/uploads`.
pub fn test_config(dir: &Path) -> ChroniclerConfig {
    let models_dir = dir.join("models");
    std::fs::create_dir_all(models_dir.join("en")).unwrap();
    std::fs::create_dir_all(models_dir.join("de")).unwrap();

    let mut config = ChroniclerConfig::default();
    config.models = [
        ("en".to_string(), models_dir.join("en")),
        ("de".to_string(), models_dir.join("de")),
        // Configured but never installed.
        ("fr".to_string(), models_dir.join("fr")),
    ]
    .into_iter()
    .collect();
    config.uploads.dir = dir.join("uploads");
    config
}

/// Orchestrator on an in-memory database with stubbed thumbnails.
pub async fn test_orchestrator(recognizer: Arc<dyn SpeechRecognizer>) -> (Orchestrator, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(dir.path()));
    let orchestrator =
        Orchestrator::with_parts(memory_db().await, config, recognizer, Arc::new(StubThumbnailer))
            .unwrap();
    (orchestrator, dir)
}
