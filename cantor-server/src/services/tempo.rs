//! Tempo inference from note timing
//!
//! Used by the import pipeline when a score carries no tempo of its own.
//! Note occupancy is sampled into a binary signal, the signal's
//! autocorrelation is scanned for peaks, and the most common distance
//! between peaks is taken as the beat period.
//!
//! Pure and deterministic: the same notes always give the same value.

use crate::models::score::NoteEvent;

/// Returned for empty input
pub const DEFAULT_BPM: f64 = 120.0;

/// Inferred values are folded into `[MIN_BPM, MAX_BPM]` by octaves
pub const MIN_BPM: f64 = 30.0;
pub const MAX_BPM: f64 = 300.0;

/// Ticks per occupancy sample
pub const SAMPLE_STEP: u64 = 10;

/// Standard MIDI File default tempo (120 bpm), used to convert ticks to time
const DEFAULT_US_PER_QUARTER: f64 = 500_000.0;

/// Longest occupancy signal analysed, in samples
///
/// Notes starting past this window do not take part in the periodicity
/// search.
pub const MAX_SIGNAL_LEN: u64 = 1 << 16;

/// Infer a tempo in beats per minute from note timing
///
/// `ticks_per_quarter` is the resolution the note positions are expressed
/// in. Returns [`DEFAULT_BPM`] when there is nothing to measure.
pub fn infer_bpm(notes: &[NoteEvent], ticks_per_quarter: u32) -> f64 {
    if notes.is_empty() || ticks_per_quarter == 0 {
        return DEFAULT_BPM;
    }

    let start = notes.iter().map(|n| n.start as u64).min().unwrap_or(0);
    let end = notes.iter().map(NoteEvent::end).max().unwrap_or(0);
    let span = end.saturating_sub(start);
    if span == 0 {
        return DEFAULT_BPM;
    }

    let us_per_tick = DEFAULT_US_PER_QUARTER / ticks_per_quarter as f64;

    let full_len = span.div_ceil(SAMPLE_STEP) + 1;
    if full_len > MAX_SIGNAL_LEN {
        tracing::debug!(span, samples = full_len, "Score longer than analysis window, truncating");
    }
    let len = full_len.min(MAX_SIGNAL_LEN) as usize;

    let runs = occupancy_runs(notes, start, len);
    let autocorr = autocorrelation(&runs, len / 2);
    let peaks = find_peaks(&autocorr);

    let bpm = match dominant_interval(&peaks) {
        Some(interval) => {
            60_000_000.0 / (interval as f64 * SAMPLE_STEP as f64 * us_per_tick)
        }
        None => {
            // Whole span taken as 4/4 bars
            let beats = span as f64 / (ticks_per_quarter as f64 * 4.0);
            let seconds = span as f64 * us_per_tick / 1_000_000.0;
            beats * 60.0 / seconds
        }
    };

    fold_into_range(bpm)
}

/// Binary occupancy as sorted, disjoint `[from, to)` sample runs
///
/// Sample `i` covers ticks `[start + step*i, start + step*(i+1))` and is set
/// when any note overlaps it. Samples at or past `len` are dropped. Touching
/// runs are merged.
fn occupancy_runs(notes: &[NoteEvent], start: u64, len: usize) -> Vec<(usize, usize)> {
    let mut runs: Vec<(usize, usize)> = notes
        .iter()
        .filter_map(|note| {
            let from = (note.start as u64 - start) / SAMPLE_STEP;
            let to = (note.end() - start).div_ceil(SAMPLE_STEP);
            let from = from.min(len as u64) as usize;
            let to = to.min(len as u64) as usize;
            (from < to).then_some((from, to))
        })
        .collect();
    runs.sort_unstable();

    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(runs.len());
    for (from, to) in runs {
        match merged.last_mut() {
            Some(last) if from <= last.1 => last.1 = last.1.max(to),
            _ => merged.push((from, to)),
        }
    }
    merged
}

/// Unnormalized autocorrelation for lags `0 .. max_lag`
///
/// Each ordered pair of runs adds a trapezoid in lag. The trapezoids are
/// accumulated as second differences, so the cost follows the number of
/// runs rather than the signal length squared.
fn autocorrelation(runs: &[(usize, usize)], max_lag: usize) -> Vec<u64> {
    if max_lag == 0 {
        return Vec::new();
    }

    let mut second = vec![0i64; max_lag];
    let mut value = 0i64;
    let mut slope = 0i64;

    // Adds weight * max(0, lag - corner) for every lag >= 0
    let mut ramp = |weight: i64, corner: i64| {
        if corner < 0 {
            value -= weight * corner;
            slope += weight;
        } else if corner + 1 < max_lag as i64 {
            second[(corner + 1) as usize] += weight;
        }
    };

    for (i, &(a0, a1)) in runs.iter().enumerate() {
        let (a0, a1) = (a0 as i64, a1 as i64);
        for &(b0, b1) in &runs[i..] {
            let (b0, b1) = (b0 as i64, b1 as i64);
            if b0 - a1 >= max_lag as i64 {
                break;
            }
            ramp(1, b0 - a1);
            ramp(-1, b0 - a0);
            ramp(-1, b1 - a1);
            ramp(1, b1 - a0);
        }
    }

    let mut autocorr = Vec::with_capacity(max_lag);
    for (lag, step) in second.iter().enumerate() {
        if lag > 0 {
            slope += step;
            value += slope;
        }
        autocorr.push(value.max(0) as u64);
    }
    autocorr
}

/// Peak lags, in increasing order
///
/// Lag 0 counts as a peak whenever the signal is non-empty. Interior lags must
/// strictly exceed both neighbours on each side.
fn find_peaks(autocorr: &[u64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if autocorr.first().is_some_and(|&v| v > 0) {
        peaks.push(0);
    }

    for i in 2..autocorr.len().saturating_sub(2) {
        let v = autocorr[i];
        if v > autocorr[i - 2] && v > autocorr[i - 1] && v > autocorr[i + 1] && v > autocorr[i + 2]
        {
            peaks.push(i);
        }
    }

    peaks
}

/// Most frequent distance between consecutive peaks
///
/// Ties go to the value seen first.
fn dominant_interval(peaks: &[usize]) -> Option<usize> {
    let mut counts: Vec<(usize, usize)> = Vec::new();
    for pair in peaks.windows(2) {
        let interval = pair[1] - pair[0];
        match counts.iter_mut().find(|(value, _)| *value == interval) {
            Some((_, count)) => *count += 1,
            None => counts.push((interval, 1)),
        }
    }

    let mut best: Option<(usize, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value)
}

/// Relative slack at the range edges; rounding noise is clamped, not folded
const FOLD_TOLERANCE: f64 = 1e-9;

/// Double or halve until the value lies in `[MIN_BPM, MAX_BPM]`
fn fold_into_range(bpm: f64) -> f64 {
    if !bpm.is_finite() || bpm <= 0.0 {
        return DEFAULT_BPM;
    }
    let mut bpm = bpm;
    while bpm < MIN_BPM * (1.0 - FOLD_TOLERANCE) {
        bpm *= 2.0;
    }
    while bpm > MAX_BPM * (1.0 + FOLD_TOLERANCE) {
        bpm /= 2.0;
    }
    bpm.clamp(MIN_BPM, MAX_BPM)
}
