//! Power spectrogram stage: Hanning-windowed STFT, magnitude squared,
//! density-scaled, log-power transformed.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// A `[frequency_bin, time_frame]` grid of log-power values. Stored frame
/// by frame (`data[t * num_freq_bins + f]`) since peak picking scans
/// neighboring frames together.
pub struct Spectrogram {
    pub(crate) data: Vec<f64>,
    pub num_freq_bins: usize,
    pub num_frames: usize,
}

impl Spectrogram {
    pub fn get(&self, freq_bin: usize, frame: usize) -> f64 {
        self.data[frame * self.num_freq_bins + freq_bin]
    }

    fn set(&mut self, freq_bin: usize, frame: usize, value: f64) {
        self.data[frame * self.num_freq_bins + freq_bin] = value;
    }

    #[cfg(test)]
    pub(crate) fn from_parts(data: Vec<f64>, num_freq_bins: usize, num_frames: usize) -> Self {
        Spectrogram {
            data,
            num_freq_bins,
            num_frames,
        }
    }
}

fn hanning_window(size: usize) -> Vec<f64> {
    if size <= 1 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|n| {
            0.5 - 0.5 * (2.0 * std::f64::consts::PI * n as f64 / (size - 1) as f64).cos()
        })
        .collect()
}

/// Computes the log-power spectrogram of a mono signal.
///
/// `window_size` is the STFT window `W`; `overlap_ratio` is `r` so that
/// `noverlap = floor(W * r)`. One-sided power is density-scaled by
/// `1 / (Fs * sum(window^2))`, doubled for every bin except DC and
/// Nyquist, matching a standard scientific-computing `specgram` with no
/// detrending. `T = floor((N - W) / (W - noverlap)) + 1` frames are
/// produced; a signal shorter than one window produces zero frames.
pub fn stft_log_power(
    samples: &[f64],
    sample_rate: u32,
    window_size: usize,
    overlap_ratio: f64,
) -> Spectrogram {
    let n = samples.len();
    let w = window_size;
    let num_freq_bins = w / 2 + 1;

    if n < w || w == 0 {
        return Spectrogram {
            data: Vec::new(),
            num_freq_bins,
            num_frames: 0,
        };
    }

    let noverlap = ((w as f64) * overlap_ratio).floor() as usize;
    let hop = w.saturating_sub(noverlap).max(1);
    let num_frames = (n - w) / hop + 1;

    let window = hanning_window(w);
    let window_sq_sum: f64 = window.iter().map(|v| v * v).sum();
    let scale = if window_sq_sum > 0.0 {
        1.0 / (sample_rate as f64 * window_sq_sum)
    } else {
        0.0
    };

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(w);

    let mut spec = Spectrogram {
        data: vec![0.0; num_freq_bins * num_frames],
        num_freq_bins,
        num_frames,
    };

    let mut buffer: Vec<Complex<f64>> = vec![Complex::new(0.0, 0.0); w];
    for t in 0..num_frames {
        let start = t * hop;
        for i in 0..w {
            buffer[i] = Complex::new(samples[start + i] * window[i], 0.0);
        }
        fft.process(&mut buffer);

        for f in 0..num_freq_bins {
            let mag_sq = buffer[f].norm_sqr();
            let density = if f == 0 || (w % 2 == 0 && f == num_freq_bins - 1) {
                mag_sq * scale
            } else {
                mag_sq * scale * 2.0
            };
            let log_power = if density > 0.0 {
                10.0 * density.log10()
            } else {
                0.0
            };
            spec.set(f, t, log_power);
        }
    }

    spec
}
