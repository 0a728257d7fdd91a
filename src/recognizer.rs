//! Public recognition façade: owns the store handle, configuration, and
//! the "already-seen" content-hash cache, and coordinates
//! decode → fingerprint → match → align for a single query.

use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};

use log::info;

use crate::align::{self, AlignOptions, RecognitionResult};
use crate::config::Config;
use crate::decode;
use crate::error::{Error, RecognizeError, Result, Stage};
use crate::hasher;
use crate::ingest::{self, IngestOptions, IngestSummary};
use crate::matcher;
use crate::peaks::{self, Connectivity};
use crate::spectrogram;
use crate::store::sqlite::SqliteStore;
use crate::store::FingerprintStore;

/// Timing breakdown for one recognition request, mirroring spec.md §6's
/// response envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timings {
    pub total_time: Duration,
    pub fingerprint_time: Duration,
    pub query_time: Duration,
    pub align_time: Duration,
}

/// A recognition response: ranked results plus timing.
#[derive(Debug, Clone, Default)]
pub struct RecognitionResponse {
    pub results: Vec<RecognitionResult>,
    pub timings: Timings,
}

/// Owns a store and the fingerprinting configuration; the single entry
/// point for ingesting and recognizing audio.
pub struct Engine {
    store: Box<dyn FingerprintStore>,
    config: Config,
    seen: HashSet<String>,
}

impl Engine {
    /// Opens (or creates) the store named by `config.database` and loads
    /// the seen-content-hash cache.
    pub fn open(config: Config) -> Result<Self> {
        let mut store: Box<dyn FingerprintStore> = match config.database.database_type.as_str() {
            "sqlite" => {
                if config.database.path == ":memory:" {
                    Box::new(SqliteStore::open_in_memory()?)
                } else {
                    Box::new(SqliteStore::open(&config.database.path)?)
                }
            }
            other => {
                return Err(Error::Config(format!(
                    "unsupported database_type '{other}'"
                )))
            }
        };
        store.setup()?;
        let seen = load_seen_hashes(store.as_mut())?;
        Ok(Engine {
            store,
            config,
            seen,
        })
    }

    fn ingest_options(&self, nproc: Option<usize>) -> IngestOptions {
        IngestOptions {
            params: self.config.fingerprint.clone(),
            fingerprint_limit: self.config.fingerprint_limit,
            batch_size: crate::config::DEFAULT_BATCH_SIZE,
            workers: nproc.unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            }),
            worker_timeout: None,
        }
    }

    /// Ingests a single file; see `ingest::ingest_file`. `name`, if
    /// given, overrides the track name derived from the path's file
    /// stem (spec.md's `ingest_file(path, name?)`).
    pub fn ingest_file(&mut self, path: &Path, name: Option<&str>) -> Result<bool> {
        let opts = self.ingest_options(None);
        let inserted =
            ingest::ingest_file(self.store.as_mut(), &mut self.seen, path, name, &opts)?;
        self.refresh_seen_hashes()?;
        Ok(inserted)
    }

    /// Ingests every matching file under `dir`; see
    /// `ingest::ingest_directory`. `nproc`, if given, overrides the
    /// worker pool size (spec.md's `ingest_directory(path, extensions,
    /// nproc?)`); `None` defaults to the available parallelism.
    pub fn ingest_directory(
        &mut self,
        dir: &Path,
        extensions: &[&str],
        nproc: Option<usize>,
    ) -> Result<IngestSummary> {
        let opts = self.ingest_options(nproc);
        let summary = ingest::ingest_directory(
            self.store.as_mut(),
            &mut self.seen,
            dir,
            extensions,
            &opts,
        )?;
        self.refresh_seen_hashes()?;
        Ok(summary)
    }

    fn refresh_seen_hashes(&mut self) -> Result<()> {
        self.seen = load_seen_hashes(self.store.as_mut())?;
        Ok(())
    }

    /// Recognizes a WAV file: decode → fingerprint → query → align.
    pub fn recognize_file(&mut self, path: &Path) -> std::result::Result<RecognitionResponse, RecognizeError> {
        let total_start = Instant::now();

        let decoded = decode::decode_wav(path, self.config.fingerprint_limit)
            .map_err(|e| RecognizeError::new(Stage::Decode, e))?;

        self.recognize_decoded(decoded.channels, decoded.sample_rate, total_start)
    }

    /// Recognizes raw mono (or multi-channel) samples already in memory,
    /// e.g. a microphone capture buffer.
    pub fn recognize_samples(
        &mut self,
        channels: Vec<Vec<f32>>,
        sample_rate: u32,
    ) -> std::result::Result<RecognitionResponse, RecognizeError> {
        self.recognize_decoded(channels, sample_rate, Instant::now())
    }

    fn recognize_decoded(
        &mut self,
        channels: Vec<Vec<f32>>,
        sample_rate: u32,
        total_start: Instant,
    ) -> std::result::Result<RecognitionResponse, RecognizeError> {
        let params = self.config.fingerprint.clone();

        let fp_start = Instant::now();
        // True set union across channels (spec.md: "unions the resulting
        // hash sets across channels", matching the reference
        // implementation's `hashes |= set(fingerprints)`), not
        // concatenation: two channels can produce the same (hash, offset)
        // pair and must not double-count it.
        let mut union: HashSet<hasher::Fingerprint> = HashSet::new();
        for channel in &channels {
            let samples_f64: Vec<f64> = channel.iter().map(|&s| s as f64).collect();
            let spec = spectrogram::stft_log_power(
                &samples_f64,
                sample_rate,
                params.window_size,
                params.overlap_ratio,
            );
            let connectivity = Connectivity::from_mask(params.connectivity_mask);
            let found = peaks::find_peaks(
                &spec,
                params.amp_min,
                params.peak_neighborhood_size,
                connectivity,
                params.peak_sort,
            );
            union.extend(hasher::generate_hashes(
                &found,
                params.fan_value,
                params.min_hash_time_delta,
                params.max_hash_time_delta,
                params.fingerprint_reduction,
            ));
        }
        let mut all_hashes: Vec<hasher::Fingerprint> = union.into_iter().collect();
        all_hashes.sort_by_key(|f| f.offset);
        let fingerprint_time = fp_start.elapsed();

        let query_start = Instant::now();
        let match_result = matcher::find_matches(
            self.store.as_mut(),
            &all_hashes,
            crate::config::DEFAULT_BATCH_SIZE,
        )
        .map_err(|e| RecognizeError::new(Stage::Query, e))?;
        let query_time = query_start.elapsed();

        let align_start = Instant::now();
        let align_opts = AlignOptions {
            topn: params.topn,
            sample_rate,
            window_size: params.window_size,
            overlap_ratio: params.overlap_ratio,
            min_hits: 0,
        };
        let results = align::align_matches(
            self.store.as_mut(),
            &match_result.matches,
            &match_result.hit_counts,
            all_hashes.len() as i64,
            &align_opts,
        )
        .map_err(|e| RecognizeError::new(Stage::Align, e))?;
        let align_time = align_start.elapsed();

        let timings = Timings {
            total_time: total_start.elapsed(),
            fingerprint_time,
            query_time,
            align_time,
        };

        info!(
            "recognition complete: {} result(s) in {:?}",
            results.len(),
            timings.total_time
        );

        Ok(RecognitionResponse { results, timings })
    }
}

fn load_seen_hashes(store: &mut dyn FingerprintStore) -> Result<HashSet<String>> {
    Ok(store
        .get_tracks()?
        .into_iter()
        .map(|t| t.content_sha1)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DatabaseConfig};

    fn memory_config() -> Config {
        Config {
            database: DatabaseConfig {
                database_type: "sqlite".to_string(),
                path: ":memory:".to_string(),
            },
            ..Config::default()
        }
    }

    fn write_sine_wav(path: &Path, seconds: f64, freq: f64) {
        let sample_rate = 44_100u32;
        let n = (seconds * sample_rate as f64) as usize;
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..n {
            let t = i as f64 / sample_rate as f64;
            let s = (2.0 * std::f64::consts::PI * freq * t).sin();
            writer.write_sample((s * i16::MAX as f64) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn identity_recognition_returns_zero_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, 3.0, 440.0);

        let mut engine = Engine::open(memory_config()).unwrap();
        engine.ingest_file(&path, None).unwrap();

        let response = engine.recognize_file(&path).unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].offset, 0);
        assert!(response.results[0].input_confidence >= 0.9);
    }

    #[test]
    fn ingest_file_uses_caller_supplied_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, 1.0, 440.0);

        let mut engine = Engine::open(memory_config()).unwrap();
        engine.ingest_file(&path, Some("renamed-track")).unwrap();

        let response = engine.recognize_file(&path).unwrap();
        assert_eq!(response.results[0].song_name, "renamed-track");
    }

    #[test]
    fn empty_store_yields_no_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, 1.0, 300.0);

        let mut engine = Engine::open(memory_config()).unwrap();
        let response = engine.recognize_file(&path).unwrap();
        assert!(response.results.is_empty());
    }

    #[test]
    fn reingesting_same_file_does_not_duplicate_track() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, 1.0, 250.0);

        let mut engine = Engine::open(memory_config()).unwrap();
        engine.ingest_file(&path, None).unwrap();
        let inserted_again = engine.ingest_file(&path, None).unwrap();
        assert!(!inserted_again);
    }
}
