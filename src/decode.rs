//! Decoder adapter. Wraps `hound` for WAV input and yields per-channel
//! `f32` PCM plus the sample rate and a content hash of the source bytes.
//!
//! Container decoding beyond WAV is out of scope (spec.md §1): a real
//! deployment would plug in a fuller decoder here (e.g. `symphonia`)
//! behind the same `decode_file` signature.

use std::fs;
use std::path::Path;

use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// Decoded audio: one `Vec<f32>` per channel, on the source's native
/// integer amplitude scale (e.g. `[-32768, 32767]` for 16-bit PCM) rather
/// than normalized to `[-1.0, 1.0]` — see the scale note below.
pub struct Decoded {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

/// SHA-1 of the raw file bytes, used as the content-dedup key.
///
/// Matches the reference implementation's `unique_hash`, which hashes the
/// whole file rather than the decoded samples: two different
/// `fingerprint_limit` values over the same file therefore produce the
/// same content hash and are treated as the same track (see DESIGN.md).
pub fn unique_hash(path: impl AsRef<Path>) -> Result<String> {
    let bytes = fs::read(path.as_ref())?;
    let mut hasher = Sha1::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Decodes a WAV file into per-channel float PCM.
///
/// `limit_secs`, if given, truncates every channel to that many seconds
/// of audio (spec.md §6 `fingerprint_limit`).
pub fn decode_wav(path: impl AsRef<Path>, limit_secs: Option<f64>) -> Result<Decoded> {
    let path = path.as_ref();
    let mut reader = hound::WavReader::open(path).map_err(|e| Error::Decode {
        path: path.to_path_buf(),
        source: Box::new(e),
    })?;
    let spec = reader.spec();
    let num_channels = spec.channels as usize;
    if num_channels == 0 {
        return Err(Error::Decode {
            path: path.to_path_buf(),
            source: "wav file declares zero channels".into(),
        });
    }

    // Kept on their native integer scale (e.g. [-32768, 32767] for 16-bit
    // PCM) rather than normalized to [-1.0, 1.0]: the reference
    // implementation's decoder (`dejavu.decoder.read`) yields raw
    // `np.int16` amplitudes, and the default `amp_min` floor used by the
    // peak picker is calibrated against that scale. Normalizing here would
    // shift every spectrogram value by the bit depth's dynamic range and
    // make peaks unreachable under the default floor.
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Decode {
                path: path.to_path_buf(),
                source: Box::new(e),
            })?,
        hound::SampleFormat::Float => {
            // IEEE float WAV samples are already in [-1.0, 1.0]; rescale
            // to the same 16-bit dynamic range the int path above yields,
            // since that is the scale `amp_min` and friends are calibrated
            // against, independent of the float format's own bit depth.
            const INT16_SCALE: f32 = 32_768.0;
            reader
                .samples::<f32>()
                .map(|s| s.map(|v| v * INT16_SCALE))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::Decode {
                    path: path.to_path_buf(),
                    source: Box::new(e),
                })?
        }
    };

    let mut channels: Vec<Vec<f32>> = vec![Vec::new(); num_channels];
    let frames = interleaved.len() / num_channels;
    for c in channels.iter_mut() {
        c.reserve(frames);
    }
    for frame in interleaved.chunks_exact(num_channels) {
        for (c, &sample) in channels.iter_mut().zip(frame) {
            c.push(sample);
        }
    }

    if let Some(secs) = limit_secs {
        let max_frames = (secs.max(0.0) * spec.sample_rate as f64) as usize;
        for c in channels.iter_mut() {
            c.truncate(max_frames);
        }
    }

    Ok(Decoded {
        channels,
        sample_rate: spec.sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_wav(path: &Path, channels: u16, sample_rate: u32, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn decodes_mono_on_native_integer_scale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_test_wav(&path, 1, 44_100, &[i16::MAX, i16::MIN, 0]);

        let decoded = decode_wav(&path, None).unwrap();
        assert_eq!(decoded.sample_rate, 44_100);
        assert_eq!(decoded.channels.len(), 1);
        assert_eq!(decoded.channels[0].len(), 3);
        assert_eq!(decoded.channels[0][0], i16::MAX as f32);
        assert_eq!(decoded.channels[0][1], i16::MIN as f32);
    }

    #[test]
    fn splits_stereo_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        // L,R,L,R
        write_test_wav(&path, 2, 44_100, &[1, 2, 3, 4]);

        let decoded = decode_wav(&path, None).unwrap();
        assert_eq!(decoded.channels.len(), 2);
        assert_eq!(decoded.channels[0].len(), 2);
        assert_eq!(decoded.channels[1].len(), 2);
    }

    #[test]
    fn applies_fingerprint_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        let samples: Vec<i16> = (0..44_100).map(|i| (i % 100) as i16).collect();
        write_test_wav(&path, 1, 44_100, &samples);

        let decoded = decode_wav(&path, Some(0.5)).unwrap();
        assert_eq!(decoded.channels[0].len(), 22_050);
    }

    #[test]
    fn unique_hash_is_stable_and_content_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        write_test_wav(&a, 1, 44_100, &[1, 2, 3]);
        write_test_wav(&b, 1, 44_100, &[1, 2, 4]);

        let ha1 = unique_hash(&a).unwrap();
        let ha2 = unique_hash(&a).unwrap();
        let hb = unique_hash(&b).unwrap();

        assert_eq!(ha1, ha2);
        assert_ne!(ha1, hb);
        assert_eq!(ha1.len(), 40);
    }

    #[test]
    fn missing_file_is_decode_error() {
        let err = decode_wav("/nonexistent/path/does/not/exist.wav", None);
        assert!(err.is_err());
    }
}
