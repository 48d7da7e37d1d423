//! Audio chunk types and utilities

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Supported audio sample rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SampleRate {
    /// 8kHz - telephony
    Hz8000,
    /// 16kHz - standard speech recognition
    #[default]
    Hz16000,
    /// 22.05kHz - TTS output
    Hz22050,
    /// 44.1kHz - CD quality
    Hz44100,
    /// 48kHz - professional audio
    Hz48000,
}

impl SampleRate {
    pub fn as_u32(&self) -> u32 {
        match self {
            SampleRate::Hz8000 => 8000,
            SampleRate::Hz16000 => 16000,
            SampleRate::Hz22050 => 22050,
            SampleRate::Hz44100 => 44100,
            SampleRate::Hz48000 => 48000,
        }
    }

    /// Samples in a chunk of the given duration.
    pub fn samples_for_ms(&self, ms: u32) -> usize {
        (self.as_u32() as usize * ms as usize) / 1000
    }

    pub fn samples_per_ms(&self) -> usize {
        self.as_u32() as usize / 1000
    }
}

/// One chunk of PCM audio with metadata.
///
/// Samples are f32 normalized to [-1.0, 1.0]. The voice pipeline consumes
/// mono chunks of roughly 100 ms and tolerates ±50% jitter.
#[derive(Clone)]
pub struct AudioChunk {
    /// Raw audio samples
    pub samples: Arc<[f32]>,
    /// Sample rate
    pub sample_rate: SampleRate,
    /// Chunk sequence number for ordering
    pub sequence: u64,
    /// Timestamp when the chunk was captured or generated
    pub timestamp: Instant,
    /// Duration of this chunk
    pub duration: Duration,
    /// RMS energy in dB
    pub energy_db: f32,
}

impl std::fmt::Debug for AudioChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioChunk")
            .field("samples_len", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .field("sequence", &self.sequence)
            .field("duration", &self.duration)
            .field("energy_db", &self.energy_db)
            .finish()
    }
}

/// Reported for empty or all-zero chunks.
const SILENCE_FLOOR_DB: f32 = -100.0;

impl AudioChunk {
    pub fn new(samples: Vec<f32>, sample_rate: SampleRate, sequence: u64) -> Self {
        let duration =
            Duration::from_secs_f64(samples.len() as f64 / sample_rate.as_u32() as f64);
        let energy_db = rms_dbfs(&samples);

        Self {
            samples: samples.into(),
            sample_rate,
            sequence,
            timestamp: Instant::now(),
            duration,
            energy_db,
        }
    }

    /// Convert from PCM16 bytes (little-endian)
    pub fn from_pcm16(bytes: &[u8], sample_rate: SampleRate, sequence: u64) -> Self {
        const PCM16_NORMALIZE: f32 = 32768.0;

        let samples: Vec<f32> = bytes
            .chunks_exact(2)
            .map(|chunk| {
                let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
                sample as f32 / PCM16_NORMALIZE
            })
            .collect();

        Self::new(samples, sample_rate, sequence)
    }

    /// Convert to PCM16 bytes (little-endian)
    pub fn to_pcm16(&self) -> Vec<u8> {
        const PCM16_SCALE: f32 = 32767.0;

        self.samples
            .iter()
            .flat_map(|&sample| {
                let clamped = sample.clamp(-1.0, 1.0);
                let pcm16 = (clamped * PCM16_SCALE) as i16;
                pcm16.to_le_bytes()
            })
            .collect()
    }

    /// Resample to `target_rate`.
    ///
    /// Whole-chunk FFT resampling via Rubato; chunks too small for a
    /// useful FFT block go through linear interpolation instead, as does
    /// any Rubato error.
    pub fn resample(&self, target_rate: SampleRate) -> Self {
        use rubato::{FftFixedIn, Resampler};

        if self.sample_rate == target_rate {
            return self.clone();
        }

        const MIN_FFT_INPUT: usize = 128;
        if self.samples.len() < MIN_FFT_INPUT {
            return self.interpolate_to(target_rate);
        }

        let resampler = FftFixedIn::<f32>::new(
            self.sample_rate.as_u32() as usize,
            target_rate.as_u32() as usize,
            self.samples.len(),
            1,
            1,
        );
        match resampler {
            Ok(mut resampler) => {
                let input = vec![self.samples.to_vec()];
                match resampler.process(&input, None) {
                    Ok(mut output) => Self::new(output.remove(0), target_rate, self.sequence),
                    Err(e) => {
                        tracing::warn!(error = %e, "FFT resample failed; interpolating instead");
                        self.interpolate_to(target_rate)
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "FFT resampler unavailable; interpolating instead");
                self.interpolate_to(target_rate)
            }
        }
    }

    fn interpolate_to(&self, target_rate: SampleRate) -> Self {
        let step = self.sample_rate.as_u32() as f64 / target_rate.as_u32() as f64;
        let out_len = (self.samples.len() as f64 / step).round() as usize;
        let last = self.samples.len().saturating_sub(1);

        let mut out = Vec::with_capacity(out_len);
        let mut pos = 0.0f64;
        for _ in 0..out_len {
            let lo = (pos as usize).min(last);
            let hi = (lo + 1).min(last);
            let t = (pos - lo as f64) as f32;
            out.push(self.samples[lo] + (self.samples[hi] - self.samples[lo]) * t);
            pos += step;
        }

        Self::new(out, target_rate, self.sequence)
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }

    /// Check if the chunk is likely silence based on energy
    pub fn is_likely_silence(&self, threshold_db: f32) -> bool {
        self.energy_db < threshold_db
    }

    /// Split into smaller chunks of at most `chunk_samples` samples.
    pub fn split(&self, chunk_samples: usize) -> Vec<AudioChunk> {
        let mut chunks = Vec::new();
        let mut seq = self.sequence;

        for chunk in self.samples.chunks(chunk_samples) {
            chunks.push(AudioChunk::new(chunk.to_vec(), self.sample_rate, seq));
            seq += 1;
        }

        chunks
    }
}

/// Mean-square level of a chunk expressed in dBFS.
fn rms_dbfs(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return SILENCE_FLOOR_DB;
    }

    let mean_square = samples
        .iter()
        .fold(0.0f64, |acc, &s| acc + s as f64 * s as f64)
        / samples.len() as f64;
    if mean_square <= 0.0 {
        return SILENCE_FLOOR_DB;
    }

    // 10*log10 of the mean square equals 20*log10 of the RMS.
    (10.0 * mean_square.log10()).max(SILENCE_FLOOR_DB as f64) as f32
}

/// Accumulation buffer for the STT stage.
///
/// Bounded by a maximum duration; older samples are dropped from the front
/// once the cap is exceeded.
#[derive(Debug)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: SampleRate,
    max_duration: Duration,
}

impl AudioBuffer {
    pub fn new(sample_rate: SampleRate, max_duration: Duration) -> Self {
        let max_samples =
            (sample_rate.as_u32() as f64 * max_duration.as_secs_f64()) as usize;
        Self {
            samples: Vec::with_capacity(max_samples),
            sample_rate,
            max_duration,
        }
    }

    pub fn push(&mut self, chunk: &AudioChunk) {
        let chunk = if chunk.sample_rate != self.sample_rate {
            chunk.resample(self.sample_rate)
        } else {
            chunk.clone()
        };

        self.samples.extend(chunk.samples.iter());

        let max_samples =
            (self.sample_rate.as_u32() as f64 * self.max_duration.as_secs_f64()) as usize;
        if self.samples.len() > max_samples {
            let excess = self.samples.len() - max_samples;
            self.samples.drain(0..excess);
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate.as_u32() as f64)
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration().as_millis() as u64
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Take the accumulated samples, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rate_conversions() {
        assert_eq!(SampleRate::Hz16000.as_u32(), 16000);
        assert_eq!(SampleRate::Hz16000.samples_for_ms(100), 1600);
        assert_eq!(SampleRate::Hz16000.samples_per_ms(), 16);
    }

    #[test]
    fn test_chunk_from_pcm16() {
        let pcm16: Vec<u8> = vec![0x00, 0x40, 0x00, 0xC0]; // two samples
        let chunk = AudioChunk::from_pcm16(&pcm16, SampleRate::Hz16000, 0);

        assert_eq!(chunk.samples.len(), 2);
        assert!(chunk.samples[0] > 0.0);
        assert!(chunk.samples[1] < 0.0);
    }

    #[test]
    fn test_resample_short_chunk_interpolates() {
        // Below the FFT block size: deterministic interpolation path.
        let chunk = AudioChunk::new(vec![0.25f32; 100], SampleRate::Hz16000, 0);
        let down = chunk.resample(SampleRate::Hz8000);
        assert_eq!(down.samples.len(), 50);
        assert_eq!(down.sample_rate, SampleRate::Hz8000);
    }

    #[test]
    fn test_resample_full_chunk_halves_length() {
        let chunk = AudioChunk::new(vec![0.1f32; 1600], SampleRate::Hz16000, 0);
        let down = chunk.resample(SampleRate::Hz8000);
        let len = down.samples.len() as i64;
        assert!((len - 800).abs() <= 16, "unexpected length {len}");
    }

    #[test]
    fn test_energy_calculation() {
        let silent = AudioChunk::new(vec![0.0; 160], SampleRate::Hz16000, 0);
        assert!(silent.energy_db <= -90.0);

        let loud = AudioChunk::new(vec![0.5; 160], SampleRate::Hz16000, 0);
        assert!(loud.energy_db > -10.0);

        assert_eq!(rms_dbfs(&[]), SILENCE_FLOOR_DB);
    }

    #[test]
    fn test_audio_buffer_accumulation() {
        let mut buffer = AudioBuffer::new(SampleRate::Hz16000, Duration::from_secs(1));

        let chunk = AudioChunk::new(vec![0.1; 1600], SampleRate::Hz16000, 0);
        buffer.push(&chunk);
        assert_eq!(buffer.samples().len(), 1600);
        assert_eq!(buffer.duration_ms(), 100);

        let taken = buffer.take();
        assert_eq!(taken.len(), 1600);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_audio_buffer_caps_duration() {
        let mut buffer = AudioBuffer::new(SampleRate::Hz16000, Duration::from_millis(100));
        for seq in 0..5 {
            buffer.push(&AudioChunk::new(vec![0.2; 1600], SampleRate::Hz16000, seq));
        }
        assert_eq!(buffer.samples().len(), 1600);
    }
}
