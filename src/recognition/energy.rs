// Built-in recognizer that detects utterances from short-time energy.
//
// It needs no acoustic model, so it works for every configured language; the
// model table is still consulted so that a missing model is reported the same
// way a neural recognizer would report it.

use crate::config::RecognizerConfig;
use crate::error::RecognitionError;
use crate::recognition::{AudioBuffer, ModelHandle, RecognizedEvent, SpeechRecognizer};

/// Peak RMS below which a recording is treated as silence.
const SILENCE_FLOOR: f32 = 1e-4;

#[derive(Debug, Clone)]
pub struct EnergyRecognizer {
    config: RecognizerConfig,
}

impl EnergyRecognizer {
    pub fn new(config: RecognizerConfig) -> Self {
        Self { config }
    }

    /// Split the signal into utterances separated by at least
    /// `min_silence_ms` of quiet.
    pub fn detect(&self, audio: &AudioBuffer) -> Vec<RecognizedEvent> {
        if audio.is_empty() || audio.sample_rate == 0 {
            return Vec::new();
        }

        let rate = audio.sample_rate as f64;
        let frame_len =
            ((audio.sample_rate as u64 * self.config.frame_ms as u64) / 1000).max(1) as usize;
        let energies: Vec<f32> = audio.samples.chunks(frame_len).map(rms).collect();

        let peak = energies.iter().copied().fold(0.0f32, f32::max);
        if peak < SILENCE_FLOOR {
            return Vec::new();
        }
        let threshold = peak * 10f32.powf(self.config.threshold_db / 20.0);
        let min_silence_frames = self
            .config
            .min_silence_ms
            .div_ceil(self.config.frame_ms.max(1)) as usize;

        let mut events: Vec<RecognizedEvent> = Vec::new();
        let mut last_loud: Option<usize> = None;

        for (i, energy) in energies.iter().enumerate() {
            if *energy < threshold {
                continue;
            }

            let start = (i * frame_len) as f64 / rate;
            let end = ((i + 1) * frame_len).min(audio.samples.len()) as f64 / rate;

            match (last_loud, events.last_mut()) {
                (Some(prev), Some(event)) if i - prev <= min_silence_frames => event.end = end,
                _ => events.push(RecognizedEvent {
                    start,
                    end,
                    text: None,
                }),
            }
            last_loud = Some(i);
        }

        events
    }
}

impl SpeechRecognizer for EnergyRecognizer {
    fn recognize(
        &self,
        model: &ModelHandle,
        audio: &AudioBuffer,
    ) -> Result<Vec<RecognizedEvent>, RecognitionError> {
        let events = self.detect(audio);
        tracing::debug!(
            "Detected {} events in {:.2}s of audio (language {})",
            events.len(),
            audio.duration(),
            model.language
        );
        Ok(events)
    }
}

fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::tone_bursts;

    fn recognizer() -> EnergyRecognizer {
        EnergyRecognizer::new(RecognizerConfig::default())
    }

    #[test]
    fn test_detects_burst_starts() {
        let samples = tone_bursts(16_000, 3.0, &[(0.5, 0.2), (1.0, 0.2), (2.0, 0.4)]);
        let audio = AudioBuffer::new(samples, 16_000);

        let events = recognizer().detect(&audio);
        let starts: Vec<f64> = events.iter().map(|e| e.start).collect();
        assert_eq!(starts, vec![0.5, 1.0, 2.0]);
        assert!((events[2].end - 2.4).abs() < 1e-9);
    }

    #[test]
    fn test_short_gap_joins_events() {
        // 40ms of silence is below the 80ms separation.
        let samples = tone_bursts(16_000, 1.0, &[(0.2, 0.2), (0.44, 0.2)]);
        let audio = AudioBuffer::new(samples, 16_000);

        let events = recognizer().detect(&audio);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start, 0.2);
    }

    #[test]
    fn test_silence_and_empty_audio() {
        let silent = AudioBuffer::new(vec![0.0; 16_000], 16_000);
        assert!(recognizer().detect(&silent).is_empty());

        let empty = AudioBuffer::new(Vec::new(), 16_000);
        assert!(recognizer().detect(&empty).is_empty());
    }

    #[test]
    fn test_default_model_loading_checks_path() {
        let dir = tempfile::tempdir().unwrap();
        let model = recognizer().load_model("en", dir.path()).unwrap();
        assert_eq!(model.language, "en");

        let missing = dir.path().join("missing-model");
        let err = recognizer().load_model("en", &missing).unwrap_err();
        assert!(matches!(err, RecognitionError::ModelUnavailable { .. }));
    }
}
