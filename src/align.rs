//! Offset-histogram alignment: turns raw `(track_id, offset_diff)`
//! matches into a ranked, confidence-scored identification.

use std::collections::HashMap;

use crate::matcher::Match;
use crate::store::FingerprintStore;
use crate::error::Result;

/// Tunables for `align_matches`.
#[derive(Debug, Clone, Copy)]
pub struct AlignOptions {
    pub topn: usize,
    pub sample_rate: u32,
    pub window_size: usize,
    pub overlap_ratio: f64,
    /// Minimum histogram count a track must clear to be reported. `0`
    /// (the default) means no floor: the top `topn` tracks are reported
    /// regardless of how small their count is, matching the reference
    /// implementation.
    pub min_hits: i64,
}

/// A single ranked identification.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub song_id: i64,
    pub song_name: String,
    pub file_sha1: String,
    pub input_total_hashes: i64,
    pub fingerprinted_hashes_in_db: i64,
    pub hashes_matched_in_input: i64,
    pub input_confidence: f64,
    pub fingerprinted_confidence: f64,
    pub offset: i64,
    pub offset_seconds: f64,
}

fn round5(v: f64) -> f64 {
    (v * 100_000.0).round() / 100_000.0
}

/// Matches the reference implementation's confidence rounding (2 decimal
/// places), distinct from the 5-decimal rounding used for `offset_seconds`.
fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Groups `matches` by `(track_id, offset_diff)`, keeps each track's
/// best-supported offset (ties broken by the smaller offset), ranks
/// tracks by that count descending, and reports the top `opts.topn`.
pub fn align_matches(
    store: &mut dyn FingerprintStore,
    matches: &[Match],
    hit_counts: &HashMap<i64, i64>,
    queried_hashes: i64,
    opts: &AlignOptions,
) -> Result<Vec<RecognitionResult>> {
    let mut sorted = matches.to_vec();
    sorted.sort_by_key(|m| (m.track_id, m.offset_diff));

    let mut counts: HashMap<(i64, i64), i64> = HashMap::new();
    for m in &sorted {
        *counts.entry((m.track_id, m.offset_diff)).or_insert(0) += 1;
    }

    let mut best_per_track: HashMap<i64, (i64, i64)> = HashMap::new();
    for (&(track_id, offset), &count) in &counts {
        best_per_track
            .entry(track_id)
            .and_modify(|best| {
                if count > best.1 || (count == best.1 && offset < best.0) {
                    *best = (offset, count);
                }
            })
            .or_insert((offset, count));
    }

    let mut ranked: Vec<(i64, i64, i64)> = best_per_track
        .into_iter()
        .map(|(track_id, (offset, count))| (track_id, offset, count))
        .filter(|&(_, _, count)| count >= opts.min_hits)
        .collect();
    ranked.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));

    let mut results = Vec::new();
    for &(track_id, offset, _) in ranked.iter().take(opts.topn) {
        let Some(track) = store.get_track(track_id)? else {
            continue;
        };
        let hashes_matched = *hit_counts.get(&track_id).unwrap_or(&0);
        let input_confidence = if queried_hashes > 0 {
            hashes_matched as f64 / queried_hashes as f64
        } else {
            0.0
        };
        let fingerprinted_confidence = if track.total_hashes > 0 {
            hashes_matched as f64 / track.total_hashes as f64
        } else {
            0.0
        };
        let offset_seconds = offset as f64 * opts.window_size as f64 * opts.overlap_ratio
            / opts.sample_rate as f64;

        results.push(RecognitionResult {
            song_id: track.id,
            song_name: track.name,
            file_sha1: track.content_sha1,
            input_total_hashes: queried_hashes,
            fingerprinted_hashes_in_db: track.total_hashes,
            hashes_matched_in_input: hashes_matched,
            input_confidence: round2(input_confidence),
            fingerprinted_confidence: round2(fingerprinted_confidence),
            offset,
            offset_seconds: round5(offset_seconds),
        });
    }

    Ok(results)
}
