//! Unweighted running averages.
//!
//! Both helpers fold one more value into an average over `samples` values and
//! return the new average together with the new sample count.

/// Integer running average, floor-divided.
pub fn update_avg_int(avg: i64, val: i64, samples: u32) -> (i64, u32) {
    let n = i64::from(samples);
    ((avg * n + val).div_euclid(n + 1), samples + 1)
}

pub fn update_avg_float(avg: f64, val: f64, samples: u32) -> (f64, u32) {
    let n = f64::from(samples);
    ((avg * n + val) / (n + 1.0), samples + 1)
}
