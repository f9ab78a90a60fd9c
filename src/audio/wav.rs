//! WAV file storage using hound
//!
//! Voicemails are written as 16-bit signed PCM, mono, 44.1kHz. Reading
//! accepts any WAV hound understands and normalizes it to mono 16-bit.

use super::{float_to_pcm16, AudioBuffer, StreamFormat};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs::{self, OpenOptions};
use std::io::BufWriter;
use std::path::Path;

fn pcm16_spec(format: StreamFormat) -> WavSpec {
    WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Write `buffer` to a new file at `path`.
///
/// The file is created exclusively: an existing file is never touched and
/// surfaces as an `AlreadyExists` I/O error. A failed write removes the
/// partial file.
pub fn write_new(path: &Path, buffer: &AudioBuffer) -> Result<(), hound::Error> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;

    let result = (|| {
        let mut writer = WavWriter::new(BufWriter::new(file), pcm16_spec(buffer.format()))?;
        for &sample in buffer.samples() {
            writer.write_sample(sample)?;
        }
        writer.finalize()
    })();

    if result.is_err() {
        let _ = fs::remove_file(path);
    }
    result
}

/// Read a WAV file into a mono 16-bit buffer
pub fn read(path: &Path) -> Result<AudioBuffer, hound::Error> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader.into_samples::<i16>().collect::<Result<_, _>>()?,
        (SampleFormat::Int, bits) => {
            let max_value = (1i64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| float_to_pcm16(v as f32 / max_value)))
                .collect::<Result<_, _>>()?
        }
        (SampleFormat::Float, _) => reader
            .into_samples::<f32>()
            .map(|s| s.map(float_to_pcm16))
            .collect::<Result<_, _>>()?,
    };

    let samples = downmix(&interleaved, spec.channels);
    Ok(AudioBuffer::new(
        samples,
        StreamFormat {
            sample_rate: spec.sample_rate,
            channels: 1,
        },
    ))
}

/// Average interleaved frames down to a single channel
fn downmix(interleaved: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(usize::from(channels))
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            (sum / i32::from(channels)) as i16
        })
        .collect()
}

/// Duration in seconds, read from the WAV header only
pub fn duration_seconds(path: &Path) -> Option<f64> {
    let reader = WavReader::open(path).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return None;
    }
    Some(f64::from(reader.duration()) / f64::from(spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SAMPLE_RATE;

    #[test]
    fn test_write_then_read_preserves_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.wav");
        let buffer = AudioBuffer::new(vec![0, 1, -1, 32767, -32768], StreamFormat::default());

        write_new(&path, &buffer).unwrap();
        let loaded = read(&path).unwrap();

        assert_eq!(loaded, buffer);
    }

    #[test]
    fn test_header_describes_pcm16_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec.wav");
        let buffer = AudioBuffer::new(vec![0; 4410], StreamFormat::default());
        write_new(&path, &buffer).unwrap();

        let spec = WavReader::open(&path).unwrap().spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, SAMPLE_RATE);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, SampleFormat::Int);
        assert_eq!(duration_seconds(&path), Some(0.1));
    }

    #[test]
    fn test_write_new_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taken.wav");
        fs::write(&path, b"keep me").unwrap();

        let buffer = AudioBuffer::new(vec![1, 2, 3], StreamFormat::default());
        let err = write_new(&path, &buffer).unwrap_err();

        assert!(matches!(
            err,
            hound::Error::IoError(ref e) if e.kind() == std::io::ErrorKind::AlreadyExists
        ));
        assert_eq!(fs::read(&path).unwrap(), b"keep me");
    }

    #[test]
    fn test_read_downmixes_stereo_float() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for sample in [0.5f32, 0.5, 1.0, 0.0] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let loaded = read(&path).unwrap();
        assert_eq!(loaded.format().sample_rate, 48000);
        assert_eq!(loaded.format().channels, 1);
        assert_eq!(loaded.samples(), &[16384, 16383]);
    }

    #[test]
    fn test_read_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read(&dir.path().join("absent.wav")).is_err());
        assert_eq!(duration_seconds(&dir.path().join("absent.wav")), None);
    }
}
