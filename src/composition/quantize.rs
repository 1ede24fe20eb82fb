// Grid quantization: recognized events -> grid-aligned onsets.

use std::path::Path;
use std::sync::Arc;

use crate::config::ChroniclerConfig;
use crate::error::RecognitionError;
use crate::recognition::{decode_file, SpeechRecognizer};

/// Slack for float noise when comparing distances in grid units.
const GRID_EPSILON: f64 = 1e-9;

/// Index of the grid line nearest to `t`; exact midpoints go to the lower
/// line.
pub fn grid_index(t: f64, grid: f64) -> i64 {
    let x = t / grid;
    let lower = x.floor();
    if x - lower > 0.5 + GRID_EPSILON {
        lower as i64 + 1
    } else {
        lower as i64
    }
}

pub fn snap(t: f64, grid: f64) -> f64 {
    grid_index(t, grid) as f64 * grid
}

/// Turn raw event start times into ascending, duplicate-free onsets.
///
/// Every event is snapped to its nearest grid line; events landing on the
/// same line as the previous one collapse into a single onset.
pub fn snap_onsets(times: &[f64], grid: f64) -> Vec<f64> {
    let mut raw: Vec<f64> = times
        .iter()
        .copied()
        .filter(|t| t.is_finite())
        .map(|t| t.max(0.0))
        .collect();
    raw.sort_by(f64::total_cmp);

    let mut indices: Vec<i64> = raw.into_iter().map(|t| grid_index(t, grid)).collect();
    indices.dedup();

    indices.into_iter().map(|i| i as f64 * grid).collect()
}

/// Runs recognition on an audio file and quantizes the event starts.
#[derive(Clone)]
pub struct GridQuantizer {
    config: Arc<ChroniclerConfig>,
    recognizer: Arc<dyn SpeechRecognizer>,
}

impl GridQuantizer {
    pub fn new(config: Arc<ChroniclerConfig>, recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        Self { config, recognizer }
    }

    /// Blocking: decodes and recognizes the whole file.
    pub fn quantize(&self, audio_path: &Path, language: &str) -> Result<Vec<f64>, RecognitionError> {
        let model_path = self
            .config
            .model_path(language)
            .ok_or_else(|| RecognitionError::UnsupportedLanguage(language.to_string()))?;
        let model = self.recognizer.load_model(language, model_path)?;

        let audio = decode_file(audio_path)?;
        if audio.is_empty() {
            return Ok(Vec::new());
        }

        let events = self.recognizer.recognize(&model, &audio)?;
        let starts: Vec<f64> = events.iter().map(|e| e.start).collect();
        let onsets = snap_onsets(&starts, self.config.grid_size);

        tracing::debug!(
            "Quantized {} events from {} into {} onsets",
            events.len(),
            audio_path.display(),
            onsets.len()
        );
        Ok(onsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::EnergyRecognizer;
    use crate::testing::{speech_wav, test_config, wav_bytes, FixedRecognizer};

    const G: f64 = 0.0625;

    #[test]
    fn test_ties_go_to_lower_line() {
        assert_eq!(snap(0.03125, G), 0.0);
        assert_eq!(snap(0.09375, G), 0.0625);
        assert_eq!(snap(0.0313, G), 0.0625);
        assert_eq!(snap(0.20, G), 0.1875);
    }

    #[test]
    fn test_snap_is_idempotent() {
        for t in [0.0, 0.01, 0.03125, 0.2, 1.337, 42.9999] {
            let once = snap(t, G);
            assert_eq!(snap(once, G), once);
        }
    }

    #[test]
    fn test_same_line_events_collapse() {
        // 0.04 / G = 0.64, which rounds up to the first line.
        assert_eq!(snap_onsets(&[0.03, 0.04, 0.20], G), vec![0.0, 0.0625, 0.1875]);
        assert_eq!(snap_onsets(&[0.01, 0.02, 0.03], G), vec![0.0]);
    }

    #[test]
    fn test_close_events_on_distinct_lines_are_kept() {
        assert_eq!(snap_onsets(&[0.0, 0.06], G), vec![0.0, 0.0625]);
        assert_eq!(snap_onsets(&[1.0, 1.05, 1.1], G), vec![1.0, 1.0625, 1.125]);
    }

    #[test]
    fn test_onsets_sorted_and_unique() {
        let onsets = snap_onsets(&[1.0, 0.5, 0.5, f64::NAN, -0.2, 0.75], G);
        assert_eq!(onsets, vec![0.0, 0.5, 0.75, 1.0]);
        assert!(snap_onsets(&[], G).is_empty());
    }

    #[test]
    fn test_snapped_onsets_are_stable() {
        let onsets = snap_onsets(&[0.1, 0.26, 0.4, 0.41, 0.9], G);
        assert_eq!(snap_onsets(&onsets, G), onsets);
    }

    fn write_speech(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("speech.wav");
        std::fs::write(&path, speech_wav()).unwrap();
        path
    }

    #[test]
    fn test_quantize_with_energy_recognizer() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(test_config(dir.path()));
        let recognizer = Arc::new(EnergyRecognizer::new(config.recognizer.clone()));
        let quantizer = GridQuantizer::new(config, recognizer);

        let onsets = quantizer.quantize(&write_speech(dir.path()), "en").unwrap();
        assert_eq!(onsets, vec![0.5, 1.0, 2.0]);
    }

    #[test]
    fn test_quantize_snaps_recognizer_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(test_config(dir.path()));
        let quantizer = GridQuantizer::new(
            config,
            Arc::new(FixedRecognizer::new(vec![0.03, 0.04, 0.20, 0.21])),
        );

        let onsets = quantizer.quantize(&write_speech(dir.path()), "de").unwrap();
        assert_eq!(onsets, vec![0.0, 0.0625, 0.1875]);
    }

    #[test]
    fn test_empty_audio_is_empty_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(test_config(dir.path()));
        let quantizer = GridQuantizer::new(config, Arc::new(FixedRecognizer::new(vec![0.5])));

        let path = dir.path().join("empty.wav");
        std::fs::write(&path, wav_bytes(16_000, &[])).unwrap();
        assert!(quantizer.quantize(&path, "en").unwrap().is_empty());
    }

    #[test]
    fn test_quantize_errors() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(test_config(dir.path()));
        let quantizer = GridQuantizer::new(config, Arc::new(FixedRecognizer::new(vec![])));
        let audio = write_speech(dir.path());

        assert_eq!(
            quantizer.quantize(&audio, "xx").unwrap_err(),
            RecognitionError::UnsupportedLanguage("xx".to_string())
        );
        assert!(matches!(
            quantizer.quantize(&audio, "fr").unwrap_err(),
            RecognitionError::ModelUnavailable { .. }
        ));

        let broken = dir.path().join("broken.mp3");
        std::fs::write(&broken, b"not an mp3").unwrap();
        assert!(matches!(
            quantizer.quantize(&broken, "en").unwrap_err(),
            RecognitionError::AudioDecode(_)
        ));
    }
}
