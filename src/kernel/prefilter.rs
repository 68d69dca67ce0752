//! Recursive B-spline interpolation prefilter with mirror boundaries.
//!
//! Turns samples into spline coefficients such that the spline reproduces
//! the samples at the grid points. Each pole runs one causal and one
//! anticausal first-order recursion.

use crate::image::Size2D;

/// Relative precision of the causal initialization sum.
const TOLERANCE: f64 = 1e-12;

/// Converts one line of samples to coefficients in place.
pub fn prefilter_line(line: &mut [f64], poles: &[f64]) {
    let n = line.len();
    if n < 2 || poles.is_empty() {
        return;
    }
    let gain: f64 = poles.iter().map(|&z| (1.0 - z) * (1.0 - 1.0 / z)).product();
    for v in line.iter_mut() {
        *v *= gain;
    }
    for &z in poles {
        line[0] = causal_init(line, z);
        for k in 1..n {
            line[k] += z * line[k - 1];
        }
        line[n - 1] = anticausal_init(line, z);
        for k in (0..n - 1).rev() {
            line[k] = z * (line[k + 1] - line[k]);
        }
    }
}

/// Converts a row-major grid of samples to coefficients in place.
pub fn prefilter_2d(data: &mut [f64], size: Size2D, poles: &[f64]) {
    if poles.is_empty() {
        return;
    }
    for row in data.chunks_mut(size.width()) {
        prefilter_line(row, poles);
    }
    let mut column = vec![0.0; size.height()];
    for x in 0..size.width() {
        for (y, c) in column.iter_mut().enumerate() {
            *c = data[y * size.width() + x];
        }
        prefilter_line(&mut column, poles);
        for (y, c) in column.iter().enumerate() {
            data[y * size.width() + x] = *c;
        }
    }
}

fn causal_init(line: &[f64], z: f64) -> f64 {
    let n = line.len();
    let horizon = (TOLERANCE.ln() / z.abs().ln()).ceil() as usize;
    if horizon < n {
        let mut zn = z;
        let mut sum = line[0];
        for &v in &line[1..horizon] {
            sum += zn * v;
            zn *= z;
        }
        return sum;
    }
    // Exact mirror-symmetric sum over the full period.
    let iz = 1.0 / z;
    let mut zn = z;
    let mut z2n = z.powi(n as i32 - 1);
    let mut sum = line[0] + z2n * line[n - 1];
    z2n *= z2n * iz;
    for &v in &line[1..n - 1] {
        sum += (zn + z2n) * v;
        zn *= z;
        z2n *= iz;
    }
    sum / (1.0 - zn * zn)
}

fn anticausal_init(line: &[f64], z: f64) -> f64 {
    let n = line.len();
    (z / (z * z - 1.0)) * (z * line[n - 2] + line[n - 1])
}
