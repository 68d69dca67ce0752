//! Iterative solvers for sparse linear systems `A x = b`.
//!
//! Operators apply `A` matrix-free. Indices within `boundary` of either
//! end are identity rows, so those entries of `x` keep the values of `b`.

use crate::image::Size2D;
use crate::minimizer::{OptimizationOutcome, StopReason};
use crate::util::math::dot;
use crate::util::{VoxRegError, VoxRegResult};

/// Matrix-free linear operator.
pub trait LinearOperator {
    /// Number of unknowns.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes `A x` into `out`; boundary rows copy `x`.
    fn apply(&self, x: &[f64], boundary: usize, out: &mut [f64]);
}

/// Stopping rule of the iterative solvers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolverParams {
    /// Stop once `‖b - A x‖² < tolerance`.
    pub tolerance: f64,
    /// Iteration budget.
    pub max_iter: usize,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iter: 100,
        }
    }
}

/// Tri-diagonal stencil `x_i - α (x_{i-1} + x_{i+1})` on a line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stencil1D {
    len: usize,
    alpha: f64,
}

impl Stencil1D {
    pub fn new(len: usize, alpha: f64) -> Self {
        Self { len, alpha }
    }
}

impl LinearOperator for Stencil1D {
    fn len(&self) -> usize {
        self.len
    }

    fn apply(&self, x: &[f64], boundary: usize, out: &mut [f64]) {
        let n = self.len;
        for i in 0..n {
            if i < boundary || i + boundary >= n {
                out[i] = x[i];
                continue;
            }
            let left = if i > 0 { x[i - 1] } else { 0.0 };
            let right = if i + 1 < n { x[i + 1] } else { 0.0 };
            out[i] = x[i] - self.alpha * (left + right);
        }
    }
}

/// Screened Poisson operator `(I - μΔ)` on a 2D grid.
///
/// Missing neighbours at the grid edge are left out, which keeps the
/// operator symmetric positive definite. `boundary` counts grid cells from
/// each edge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Helmholtz2D {
    size: Size2D,
    mu: f64,
}

impl Helmholtz2D {
    pub fn new(size: Size2D, mu: f64) -> Self {
        Self { size, mu }
    }
}

impl LinearOperator for Helmholtz2D {
    fn len(&self) -> usize {
        self.size.len()
    }

    fn apply(&self, x: &[f64], boundary: usize, out: &mut [f64]) {
        let (w, h) = (self.size.width(), self.size.height());
        for y in 0..h {
            for x_ in 0..w {
                let i = y * w + x_;
                let on_boundary = x_ < boundary
                    || y < boundary
                    || x_ + boundary >= w
                    || y + boundary >= h;
                if on_boundary {
                    out[i] = x[i];
                    continue;
                }
                let mut lap = 0.0;
                if x_ > 0 {
                    lap += x[i] - x[i - 1];
                }
                if x_ + 1 < w {
                    lap += x[i] - x[i + 1];
                }
                if y > 0 {
                    lap += x[i] - x[i - w];
                }
                if y + 1 < h {
                    lap += x[i] - x[i + w];
                }
                out[i] = x[i] + self.mu * lap;
            }
        }
    }
}

fn check_system(op: &dyn LinearOperator, b: &[f64], x: &[f64]) -> VoxRegResult<()> {
    if b.len() != op.len() || x.len() != op.len() {
        return Err(VoxRegError::invalid(format!(
            "linear system of size {} given b of {} and x of {} values",
            op.len(),
            b.len(),
            x.len()
        )));
    }
    Ok(())
}

fn residual(op: &dyn LinearOperator, b: &[f64], x: &[f64], boundary: usize, r: &mut [f64]) -> f64 {
    op.apply(x, boundary, r);
    for (ri, bi) in r.iter_mut().zip(b) {
        *ri = bi - *ri;
    }
    dot(r, r)
}

fn outcome(x: &[f64], residual2: f64, iterations: usize, stop: StopReason) -> OptimizationOutcome {
    OptimizationOutcome {
        converged: stop.is_converged(),
        iterations: iterations as u32,
        best_params: x.to_vec(),
        value: residual2,
        stop,
    }
}

/// Fixed-point (Richardson) iteration `x ← x + (b - A x)`.
///
/// Converges when the spectral radius of `I - A` is below one, as for
/// diagonally dominant stencils with unit diagonal.
pub fn solve_fixed_point(
    op: &dyn LinearOperator,
    b: &[f64],
    x: &mut [f64],
    boundary: usize,
    params: &SolverParams,
) -> VoxRegResult<OptimizationOutcome> {
    check_system(op, b, x)?;
    let mut r = vec![0.0; op.len()];
    let mut res2 = residual(op, b, x, boundary, &mut r);
    let mut iterations = 0;
    while res2 >= params.tolerance {
        if iterations >= params.max_iter {
            return Ok(outcome(x, res2, iterations, StopReason::MaxIterations));
        }
        for (xi, ri) in x.iter_mut().zip(&r) {
            *xi += ri;
        }
        iterations += 1;
        res2 = residual(op, b, x, boundary, &mut r);
    }
    Ok(outcome(x, res2, iterations, StopReason::ResidualTolerance))
}

/// Conjugate gradients for symmetric positive definite operators.
pub fn solve_cg(
    op: &dyn LinearOperator,
    b: &[f64],
    x: &mut [f64],
    boundary: usize,
    params: &SolverParams,
) -> VoxRegResult<OptimizationOutcome> {
    check_system(op, b, x)?;
    let n = op.len();
    let mut r = vec![0.0; n];
    let mut res2 = residual(op, b, x, boundary, &mut r);
    let mut p = r.clone();
    let mut ap = vec![0.0; n];
    let mut iterations = 0;
    while res2 >= params.tolerance {
        if iterations >= params.max_iter {
            return Ok(outcome(x, res2, iterations, StopReason::MaxIterations));
        }
        op.apply(&p, boundary, &mut ap);
        let curvature = dot(&p, &ap);
        if curvature <= 0.0 {
            return Ok(outcome(x, res2, iterations, StopReason::NoProgress));
        }
        let alpha = res2 / curvature;
        for i in 0..n {
            x[i] += alpha * p[i];
            r[i] -= alpha * ap[i];
        }
        let next = dot(&r, &r);
        let beta = next / res2;
        for (pi, ri) in p.iter_mut().zip(&r) {
            *pi = ri + beta * *pi;
        }
        res2 = next;
        iterations += 1;
    }
    Ok(outcome(x, res2, iterations, StopReason::ResidualTolerance))
}
