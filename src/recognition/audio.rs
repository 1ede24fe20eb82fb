//! Audio decoding to mono `f32` samples.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::RecognitionError;

/// Decoded mono audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

fn decode_error(err: impl std::fmt::Display) -> RecognitionError {
    RecognitionError::AudioDecode(err.to_string())
}

/// Decode an audio file (WAV or MP3) and down-mix it to mono.
pub fn decode_file(path: &Path) -> Result<AudioBuffer, RecognitionError> {
    let file = File::open(path)
        .map_err(|e| RecognitionError::AudioDecode(format!("{}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(decode_error)?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_error("no audio track"))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(decode_error)?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(decode_error(e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A corrupt frame is skipped, the stream itself is still usable.
            Err(SymphoniaError::DecodeError(msg)) => {
                tracing::debug!("Skipping undecodable packet in {}: {}", path.display(), msg);
                continue;
            }
            Err(e) => return Err(decode_error(e)),
        };

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        let channels = spec.channels.count().max(1);

        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);

        samples.extend(
            buf.samples()
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    let sample_rate = sample_rate.ok_or_else(|| decode_error("unknown sample rate"))?;
    Ok(AudioBuffer::new(samples, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{tone_bursts, wav_bytes};

    #[test]
    fn test_decode_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speech.wav");
        let samples = tone_bursts(16_000, 1.0, &[(0.5, 0.2)]);
        std::fs::write(&path, wav_bytes(16_000, &samples)).unwrap();

        let audio = decode_file(&path).unwrap();
        assert_eq!(audio.sample_rate, 16_000);
        assert_eq!(audio.samples.len(), 16_000);
        assert!((audio.duration() - 1.0).abs() < 1e-9);

        // Silence stays silent, the burst is loud.
        assert!(audio.samples[..8_000].iter().all(|s| s.abs() < 1e-3));
        assert!(audio.samples[8_000..11_200].iter().any(|s| s.abs() > 0.3));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"definitely not audio").unwrap();

        let err = decode_file(&path).unwrap_err();
        assert!(matches!(err, RecognitionError::AudioDecode(_)));
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        let err = decode_file(Path::new("/nonexistent/file.wav")).unwrap_err();
        assert!(matches!(err, RecognitionError::AudioDecode(_)));
    }
}
