//! Abstract store contract (spec.md §4.7). Any implementation satisfying
//! this trait can back the recognition engine; `sqlite` is the reference
//! implementation.

pub mod sqlite;

use crate::error::Result;
use crate::hasher::Fingerprint;

/// A persisted track row.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: i64,
    pub name: String,
    pub content_sha1: String,
    pub fingerprinted: bool,
    pub total_hashes: i64,
}

/// Store-side counts, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub tracks: i64,
    pub hashes: i64,
}

/// The persistence contract described in spec.md §4.7.
pub trait FingerprintStore: Send {
    /// Ensures tables exist and purges any partial (unfingerprinted) tracks.
    fn setup(&mut self) -> Result<()>;

    /// Drops and recreates all tables.
    fn empty(&mut self) -> Result<()>;

    /// Inserts a new track row, returning its id. `fingerprinted` starts false.
    fn insert_track(&mut self, name: &str, content_sha1: &str) -> Result<i64>;

    /// Sets the fingerprinted flag and total-hashes count for a track.
    fn set_track_fingerprinted(&mut self, track_id: i64, total_hashes: i64) -> Result<()>;

    /// Bulk-inserts fingerprints for a track, batching by `batch_size`,
    /// silently ignoring duplicates on `(track_id, offset, hash)`.
    fn insert_hashes(
        &mut self,
        track_id: i64,
        hashes: &[Fingerprint],
        batch_size: usize,
    ) -> Result<()>;

    /// Fetches a track row by id.
    fn get_track(&mut self, track_id: i64) -> Result<Option<Track>>;

    /// Fetches every fingerprinted track.
    fn get_tracks(&mut self) -> Result<Vec<Track>>;

    /// Deletes tracks by id, cascading to their fingerprints.
    fn delete_tracks(&mut self, track_ids: &[i64]) -> Result<()>;

    /// Purges track rows whose fingerprinted flag was never set.
    fn delete_unfingerprinted(&mut self) -> Result<()>;

    /// Looks up every stored `(track_id, offset)` for each hash in
    /// `hashes`, batching the lookup by `batch_size`. Returns the raw
    /// `(hash, track_id, stored_offset)` rows; the matcher is
    /// responsible for combining them with query offsets.
    fn return_matches(
        &mut self,
        hashes: &[Vec<u8>],
        batch_size: usize,
    ) -> Result<Vec<(Vec<u8>, i64, i64)>>;

    /// Returns `(track_count, hash_count)`.
    fn counts(&mut self) -> Result<Counts>;
}
