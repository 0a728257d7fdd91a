//! Joins a query's hash set against the store and emits raw
//! `(track_id, offset_difference)` matches for the aligner to histogram.

use std::collections::HashMap;

use crate::error::Result;
use crate::hasher::Fingerprint;
use crate::store::FingerprintStore;

/// One `(track_id, stored_offset - query_offset)` observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub track_id: i64,
    pub offset_diff: i64,
}

/// Result of a match query: the raw match list plus, per track, how many
/// stored hash rows were returned (distinct hits, not multiplied out by
/// query-side hash repetition).
pub struct MatchResult {
    pub matches: Vec<Match>,
    pub hit_counts: HashMap<i64, i64>,
}

/// Builds `hash -> [query_offset]` (a hash may repeat in the query),
/// queries the store in batches of `batch_size`, and for each returned
/// `(hash, track_id, stored_offset)` row emits a match per query offset
/// sharing that hash.
pub fn find_matches(
    store: &mut dyn FingerprintStore,
    hashes: &[Fingerprint],
    batch_size: usize,
) -> Result<MatchResult> {
    let mut offsets_by_hash: HashMap<&[u8], Vec<i64>> = HashMap::new();
    for fp in hashes {
        offsets_by_hash
            .entry(fp.hash.as_slice())
            .or_default()
            .push(fp.offset);
    }

    let query_hashes: Vec<Vec<u8>> = offsets_by_hash.keys().map(|h| h.to_vec()).collect();
    let rows = store.return_matches(&query_hashes, batch_size)?;

    let mut matches = Vec::new();
    let mut hit_counts: HashMap<i64, i64> = HashMap::new();

    for (hash, track_id, stored_offset) in rows {
        *hit_counts.entry(track_id).or_insert(0) += 1;
        if let Some(query_offsets) = offsets_by_hash.get(hash.as_slice()) {
            for &q in query_offsets {
                matches.push(Match {
                    track_id,
                    offset_diff: stored_offset - q,
                });
            }
        }
    }

    Ok(MatchResult { matches, hit_counts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::SqliteStore;

    fn fp(hash: u8, offset: i64) -> Fingerprint {
        Fingerprint {
            hash: vec![hash; 10],
            offset,
        }
    }

    #[test]
    fn matches_emit_one_row_per_shared_query_offset() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_track("t", "sha1").unwrap();
        store.insert_hashes(id, &[fp(1, 100)], 1000).unwrap();
        store.set_track_fingerprinted(id, 1).unwrap();

        let query = vec![fp(1, 0), fp(1, 5)];
        let result = find_matches(&mut store, &query, 1000).unwrap();

        assert_eq!(result.matches.len(), 2);
        assert_eq!(result.hit_counts.get(&id), Some(&1));
        let diffs: Vec<i64> = result.matches.iter().map(|m| m.offset_diff).collect();
        assert!(diffs.contains(&100));
        assert!(diffs.contains(&95));
    }

    #[test]
    fn unmatched_hashes_produce_empty_result() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let query = vec![fp(9, 0)];
        let result = find_matches(&mut store, &query, 1000).unwrap();
        assert!(result.matches.is_empty());
        assert!(result.hit_counts.is_empty());
    }

    #[test]
    fn distinct_tracks_both_counted() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let a = store.insert_track("a", "sha1-a").unwrap();
        let b = store.insert_track("b", "sha1-b").unwrap();
        store.insert_hashes(a, &[fp(1, 10)], 1000).unwrap();
        store.insert_hashes(b, &[fp(1, 20)], 1000).unwrap();
        store.set_track_fingerprinted(a, 1).unwrap();
        store.set_track_fingerprinted(b, 1).unwrap();

        let query = vec![fp(1, 0)];
        let result = find_matches(&mut store, &query, 1000).unwrap();
        assert_eq!(result.matches.len(), 2);
        assert_eq!(result.hit_counts.len(), 2);
    }
}
