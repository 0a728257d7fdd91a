//! Anchor-fan hasher: pairs each anchor peak with the next `F` peaks
//! within a time-delta band and derives a 20-hex-character SHA-1 prefix
//! per pair.

use sha1::{Digest, Sha1};

use crate::peaks::Peak;

/// A `(hash, anchor-time-offset)` tuple. `hash` is stored as raw bytes
/// (`fingerprint_reduction / 2` of them); hex encoding only happens at
/// the store boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub hash: Vec<u8>,
    pub offset: i64,
}

/// Generates fingerprints from a temporally sorted peak sequence.
///
/// For each anchor `i`, pairs with peaks `i+1 ..= i+fan_value`, keeping
/// pairs whose time delta falls in `[min_delta, max_delta]`. The
/// canonical hash input is `format!("{f1}|{f2}|{dt}")` — decimal, no
/// padding, pipe-separated — hashed with SHA-1 and truncated to
/// `hash_len_hex / 2` bytes. This is a pure function of `(peaks,
/// parameters)`: identical inputs always produce bitwise-identical
/// output, which is the cross-implementation compatibility contract.
pub fn generate_hashes(
    peaks: &[Peak],
    fan_value: usize,
    min_delta: i64,
    max_delta: i64,
    hash_len_hex: usize,
) -> Vec<Fingerprint> {
    let hash_bytes = hash_len_hex / 2;
    let mut hashes = Vec::new();

    for i in 0..peaks.len() {
        for j in 1..=fan_value {
            let Some(target_idx) = i.checked_add(j) else {
                break;
            };
            if target_idx >= peaks.len() {
                break;
            }

            let anchor = peaks[i];
            let target = peaks[target_idx];
            let dt = target.time_frame as i64 - anchor.time_frame as i64;

            if dt < min_delta || dt > max_delta {
                continue;
            }

            let canonical = format!("{}|{}|{}", anchor.freq_bin, target.freq_bin, dt);
            let mut hasher = Sha1::new();
            hasher.update(canonical.as_bytes());
            let digest = hasher.finalize();
            let hash = digest[..hash_bytes.min(digest.len())].to_vec();

            hashes.push(Fingerprint {
                hash,
                offset: anchor.time_frame as i64,
            });
        }
    }

    hashes
}
