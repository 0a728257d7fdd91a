//! Configuration keys, matching the reference implementation's JSON
//! config file and the constants in its `config/settings.py`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sampling rate assumed for stored fingerprints.
pub const DEFAULT_FS: u32 = 44_100;
/// Size of the FFT window, affects frequency granularity.
pub const DEFAULT_WINDOW_SIZE: usize = 4_096;
/// Fraction by which sequential windows overlap.
pub const DEFAULT_OVERLAP_RATIO: f64 = 0.5;
/// Degree to which a peak can be paired with its neighbors.
pub const DEFAULT_FAN_VALUE: usize = 5;
/// Minimum amplitude in the spectrogram to be considered a peak.
pub const DEFAULT_AMP_MIN: f64 = 10.0;
/// Number of cells around an amplitude peak considered its neighborhood.
pub const PEAK_NEIGHBORHOOD_SIZE: usize = 10;
/// Lower bound (inclusive) on the anchor-target time delta, in frames.
pub const MIN_HASH_TIME_DELTA: i64 = 0;
/// Upper bound (inclusive) on the anchor-target time delta, in frames.
pub const MAX_HASH_TIME_DELTA: i64 = 200;
/// Whether peaks are sorted temporally before hashing.
pub const PEAK_SORT: bool = true;
/// Number of hex characters (of the SHA-1 digest) kept per hash.
pub const FINGERPRINT_REDUCTION: usize = 20;
/// Structuring-element connectivity: 1 = diamond, 2 = square.
pub const CONNECTIVITY_MASK: u8 = 2;
/// Number of results returned for a recognition request.
pub const TOPN: usize = 2;
/// Batch size for store inserts/queries.
pub const DEFAULT_BATCH_SIZE: usize = 1_000;

/// Fingerprinting parameters, overridable per spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintParams {
    pub fs: u32,
    pub window_size: usize,
    pub overlap_ratio: f64,
    pub fan_value: usize,
    pub amp_min: f64,
    pub peak_neighborhood_size: usize,
    pub min_hash_time_delta: i64,
    pub max_hash_time_delta: i64,
    pub peak_sort: bool,
    pub fingerprint_reduction: usize,
    pub connectivity_mask: u8,
    pub topn: usize,
}

impl Default for FingerprintParams {
    fn default() -> Self {
        FingerprintParams {
            fs: DEFAULT_FS,
            window_size: DEFAULT_WINDOW_SIZE,
            overlap_ratio: DEFAULT_OVERLAP_RATIO,
            fan_value: DEFAULT_FAN_VALUE,
            amp_min: DEFAULT_AMP_MIN,
            peak_neighborhood_size: PEAK_NEIGHBORHOOD_SIZE,
            min_hash_time_delta: MIN_HASH_TIME_DELTA,
            max_hash_time_delta: MAX_HASH_TIME_DELTA,
            peak_sort: PEAK_SORT,
            fingerprint_reduction: FINGERPRINT_REDUCTION,
            connectivity_mask: CONNECTIVITY_MASK,
            topn: TOPN,
        }
    }
}

/// Which store implementation to open and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Selects the store implementation. Only "sqlite" is built in.
    #[serde(default = "default_database_type")]
    pub database_type: String,
    /// Path to the SQLite file (":memory:" for an in-memory store).
    #[serde(default = "default_database_path")]
    pub path: String,
}

fn default_database_type() -> String {
    "sqlite".to_string()
}

fn default_database_path() -> String {
    "waveid.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            database_type: default_database_type(),
            path: default_database_path(),
        }
    }
}

/// Top-level configuration, matching spec.md §6's configuration keys.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    /// Seconds of input to fingerprint; `None` means the entire track.
    /// `-1` is accepted on the wire for JSON compatibility with the
    /// reference implementation and normalized to `None` on load.
    pub fingerprint_limit: Option<f64>,
    pub fingerprint: FingerprintParams,
}

impl Config {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let mut cfg: Config =
            serde_json::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        if cfg.fingerprint_limit == Some(-1.0) {
            cfg.fingerprint_limit = None;
        }
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip() {
        let cfg = Config::default();
        assert_eq!(cfg.fingerprint.fs, DEFAULT_FS);
        assert_eq!(cfg.database.database_type, "sqlite");
    }

    #[test]
    fn negative_one_limit_means_entire_track() {
        let cfg = Config::from_json_str(r#"{"fingerprint_limit": -1}"#).unwrap();
        assert_eq!(cfg.fingerprint_limit, None);
    }

    #[test]
    fn explicit_limit_is_kept() {
        let cfg = Config::from_json_str(r#"{"fingerprint_limit": 30}"#).unwrap();
        assert_eq!(cfg.fingerprint_limit, Some(30.0));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(Config::from_json_str("{not json").is_err());
    }
}
