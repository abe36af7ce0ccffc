//! Curve math for automation segments.
//!
//! A segment runs from one automation point to the next. Progress `p` is in
//! `[0.0, 1.0]` across the segment; the curve is the one stored on the
//! segment's starting point.

use std::f64::consts::PI;

use crate::content::Curve;

fn lerp(start: f64, end: f64, t: f64) -> f64 {
    start * (1.0 - t) + end * t
}

/// Read a normalized shape table at progress `p`, interpolating between entries.
fn shape_at(shape: &[f32], p: f64) -> f64 {
    match shape.len() {
        0 => p,
        1 => shape[0] as f64,
        n => {
            let pos = p * (n - 1) as f64;
            let i = (pos.floor() as usize).min(n - 2);
            let frac = pos - i as f64;
            lerp(shape[i] as f64, shape[i + 1] as f64, frac)
        }
    }
}

/// Value of a segment from `start` to `end` at progress `p`.
///
/// Returns `None` for exponential and logarithmic segments unless both
/// values are positive.
pub fn interpolate(curve: Curve, start: f64, end: f64, p: f64, shape: Option<&[f32]>) -> Option<f64> {
    let p = p.clamp(0.0, 1.0);
    let value = match curve {
        Curve::Instant | Curve::Step | Curve::Hold => {
            if p >= 1.0 {
                end
            } else {
                start
            }
        }
        Curve::Linear => lerp(start, end, p),
        Curve::Exponential => {
            if start <= 0.0 || end <= 0.0 {
                return None;
            }
            start * (end / start).powf(p)
        }
        Curve::Logarithmic => {
            if start <= 0.0 || end <= 0.0 {
                return None;
            }
            lerp(start.ln(), end.ln(), p).exp()
        }
        Curve::Sine => lerp(start, end, (1.0 - (p * PI).cos()) / 2.0),
        Curve::Cosine => lerp(start, end, (1.0 + (p * PI).cos()) / 2.0),
        Curve::Custom => lerp(start, end, shape_at(shape.unwrap_or(&[]), p)),
    };
    Some(value)
}

/// Number of samples for a value curve lasting `duration` seconds.
pub fn sample_count(duration: f64, samples_per_second: f64) -> usize {
    ((duration * samples_per_second).round() as usize).max(2)
}

/// Sample the part of a segment between progress `from_p` and `to_p` as a value curve.
pub fn sample_segment(
    curve: Curve,
    start: f64,
    end: f64,
    shape: Option<&[f32]>,
    (from_p, to_p): (f64, f64),
    samples: usize,
) -> Option<Vec<f64>> {
    let samples = samples.max(2);
    (0..samples)
        .map(|i| {
            let t = i as f64 / (samples - 1) as f64;
            interpolate(curve, start, end, lerp(from_p, to_p, t), shape)
        })
        .collect()
}
