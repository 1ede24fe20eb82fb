//! Speech recognition seam: audio decoding plus a pluggable recognizer that
//! turns samples into timed events.

pub mod audio;
pub mod energy;
#[cfg(feature = "vosk")]
pub mod vosk;

pub use audio::{decode_file, AudioBuffer};
pub use energy::EnergyRecognizer;
#[cfg(feature = "vosk")]
pub use self::vosk::VoskRecognizer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ChroniclerConfig;
use crate::error::RecognitionError;

/// A detected event (a word or utterance) with start and end in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedEvent {
    pub start: f64,
    pub end: f64,
    /// Recognized text, when the recognizer produces one.
    pub text: Option<String>,
}

/// A language model resolved from the model table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelHandle {
    pub language: String,
    pub path: PathBuf,
}

/// Produces time-stamped events from an audio signal using a language model.
///
/// Both methods are blocking; callers run them on the blocking thread pool.
pub trait SpeechRecognizer: Send + Sync {
    /// Resolve the model stored at `path`.
    fn load_model(&self, language: &str, path: &Path) -> Result<ModelHandle, RecognitionError> {
        if !path.exists() {
            return Err(RecognitionError::ModelUnavailable {
                language: language.to_string(),
                path: path.to_path_buf(),
            });
        }
        Ok(ModelHandle {
            language: language.to_string(),
            path: path.to_path_buf(),
        })
    }

    fn recognize(
        &self,
        model: &ModelHandle,
        audio: &AudioBuffer,
    ) -> Result<Vec<RecognizedEvent>, RecognitionError>;
}

/// The recognizer used by the server and the CLI: Vosk when built with the
/// `vosk` feature, the energy detector otherwise.
pub fn default_recognizer(config: &ChroniclerConfig) -> Arc<dyn SpeechRecognizer> {
    #[cfg(feature = "vosk")]
    {
        let _ = config;
        Arc::new(VoskRecognizer::new())
    }
    #[cfg(not(feature = "vosk"))]
    {
        Arc::new(EnergyRecognizer::new(config.recognizer.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "vosk"))]
    #[test]
    fn test_default_recognizer_accepts_any_existing_model_dir() {
        let dir = tempfile::tempdir().unwrap();
        let recognizer = default_recognizer(&ChroniclerConfig::default());
        let model = recognizer.load_model("en", dir.path()).unwrap();
        assert_eq!(model.path, dir.path());
    }
}
