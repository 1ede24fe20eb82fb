// Word-level recognition with Vosk (Kaldi) models.
//
// Each configured model directory is loaded once and shared by every job of
// that language. Events are the recognized words with their start and end
// times.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ::vosk::{Model, Recognizer};

use crate::error::RecognitionError;
use crate::recognition::{AudioBuffer, ModelHandle, RecognizedEvent, SpeechRecognizer};

/// Samples handed to the decoder per call.
const CHUNK_SAMPLES: usize = 4000;

#[derive(Default)]
pub struct VoskRecognizer {
    models: Mutex<HashMap<PathBuf, Arc<Model>>>,
}

impl VoskRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn model(&self, language: &str, path: &Path) -> Result<Arc<Model>, RecognitionError> {
        let mut models = self
            .models
            .lock()
            .map_err(|_| RecognitionError::Recognizer("model cache poisoned".to_string()))?;
        if let Some(model) = models.get(path) {
            return Ok(model.clone());
        }

        let unavailable = || RecognitionError::ModelUnavailable {
            language: language.to_string(),
            path: path.to_path_buf(),
        };
        let location = path.to_str().ok_or_else(unavailable)?;
        let model = Arc::new(Model::new(location).ok_or_else(unavailable)?);

        tracing::info!("Loaded recognition model for '{}' from {}", language, location);
        models.insert(path.to_path_buf(), model.clone());
        Ok(model)
    }
}

impl SpeechRecognizer for VoskRecognizer {
    fn load_model(&self, language: &str, path: &Path) -> Result<ModelHandle, RecognitionError> {
        self.model(language, path)?;
        Ok(ModelHandle {
            language: language.to_string(),
            path: path.to_path_buf(),
        })
    }

    fn recognize(
        &self,
        model: &ModelHandle,
        audio: &AudioBuffer,
    ) -> Result<Vec<RecognizedEvent>, RecognitionError> {
        if audio.is_empty() {
            return Ok(Vec::new());
        }

        let vosk_model = self.model(&model.language, &model.path)?;
        let mut recognizer = Recognizer::new(&vosk_model, audio.sample_rate as f32)
            .ok_or_else(|| {
                RecognitionError::Recognizer(format!(
                    "cannot create recognizer at {} Hz",
                    audio.sample_rate
                ))
            })?;
        recognizer.set_words(true);

        let pcm = to_pcm16(&audio.samples);
        for chunk in pcm.chunks(CHUNK_SAMPLES) {
            recognizer
                .accept_waveform(chunk)
                .map_err(|e| RecognitionError::Recognizer(format!("{:?}", e)))?;
        }

        let result = recognizer.final_result().single().ok_or_else(|| {
            RecognitionError::Recognizer("recognizer returned alternatives".to_string())
        })?;
        let events: Vec<RecognizedEvent> = result
            .result
            .iter()
            .map(|word| RecognizedEvent {
                start: word.start as f64,
                end: word.end as f64,
                text: Some(word.word.to_string()),
            })
            .collect();

        tracing::debug!(
            "Recognized {} words in {:.2}s of audio (language {})",
            events.len(),
            audio.duration(),
            model.language
        );
        Ok(events)
    }
}

/// Convert normalized samples to the 16-bit PCM the decoder expects.
fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_conversion_clamps() {
        assert_eq!(to_pcm16(&[0.0, 1.0, -1.0, 2.0, -3.0]), vec![0, 32767, -32767, 32767, -32767]);
    }

    #[test]
    fn test_missing_model_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = VoskRecognizer::new()
            .load_model("en", &dir.path().join("missing"))
            .unwrap_err();
        assert!(matches!(err, RecognitionError::ModelUnavailable { .. }));
    }
}
