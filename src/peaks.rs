//! Peak picker: locates local maxima in the log-power spectrogram above
//! an amplitude floor, using a 2-D neighborhood dilation/erosion.
//!
//! The reference implementation builds its neighborhood by iterating a
//! 3x3 structuring element `P` times (`scipy.ndimage.iterate_structure`).
//! That construction has a closed form which this module uses directly
//! (sanctioned by spec.md §9: "implementations may substitute an
//! equivalent algorithm... so long as the resulting peak set is
//! identical"): connectivity 1 (diamond) keeps neighbors with Manhattan
//! distance `<= P`; connectivity 2 (square) keeps neighbors with
//! Chebyshev distance `<= P`.

use crate::spectrogram::Spectrogram;

/// Structuring-element connectivity for the neighborhood footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// Diamond (von Neumann) neighborhood.
    Diamond,
    /// Square (Moore) neighborhood.
    Square,
}

impl Connectivity {
    pub fn from_mask(mask: u8) -> Self {
        if mask == 1 {
            Connectivity::Diamond
        } else {
            Connectivity::Square
        }
    }

    fn in_footprint(self, df: i64, dt: i64, radius: i64) -> bool {
        match self {
            Connectivity::Diamond => df.abs() + dt.abs() <= radius,
            Connectivity::Square => df.abs().max(dt.abs()) <= radius,
        }
    }
}

/// A peak's location in the spectrogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peak {
    pub freq_bin: usize,
    pub time_frame: usize,
}

/// Finds local maxima. When `sort` is true (the reference `PEAK_SORT`
/// default) the result is temporally sorted (`time_frame` ascending, then
/// `freq_bin` ascending); otherwise peaks are returned in scan order.
pub fn find_peaks(
    spec: &Spectrogram,
    amp_min: f64,
    neighborhood_size: usize,
    connectivity: Connectivity,
    sort: bool,
) -> Vec<Peak> {
    let radius = neighborhood_size as i64;
    let f_bins = spec.num_freq_bins as i64;
    let t_frames = spec.num_frames as i64;

    let mut peaks = Vec::new();

    // The reference algorithm masks local maxima by
    // `local_max XOR eroded_background`, where `eroded_background` marks
    // cells whose value is zero and whose entire neighborhood is also
    // zero. A cell surviving the `value > amp_min` filter below is never
    // zero for any non-negative `amp_min` (the only sensible range —
    // spec.md's default is 10), so it can never be part of the eroded
    // background; the XOR collapses to plain `local_max` and the erosion
    // pass is redundant once the amplitude filter is applied.
    for t in 0..t_frames {
        for f in 0..f_bins {
            let value = spec.get(f as usize, t as usize);
            if value <= amp_min {
                continue;
            }

            let mut is_local_max = true;

            'neighbors: for df in -radius..=radius {
                for dt in -radius..=radius {
                    if df == 0 && dt == 0 {
                        continue;
                    }
                    if !connectivity.in_footprint(df, dt, radius) {
                        continue;
                    }

                    let nf = f + df;
                    let nt = t + dt;

                    let in_bounds = nf >= 0 && nf < f_bins && nt >= 0 && nt < t_frames;
                    if !in_bounds {
                        // Out-of-bounds neighbors are excluded from the
                        // comparison, so border cells can still be peaks
                        // relative to their in-bounds neighbors.
                        continue;
                    }

                    let neighbor = spec.get(nf as usize, nt as usize);
                    if neighbor > value {
                        is_local_max = false;
                        break 'neighbors;
                    }
                }
            }

            if is_local_max {
                peaks.push(Peak {
                    freq_bin: f as usize,
                    time_frame: t as usize,
                });
            }
        }
    }

    if sort {
        peaks.sort_by_key(|p| (p.time_frame, p.freq_bin));
    }
    peaks
}
