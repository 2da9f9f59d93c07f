//! Rational timestamps and the small numerical primitives the physics and
//! classifier stages build on: quadratic least-squares fit and 2D vector ops.

use nalgebra::{SMatrix, SVector};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::Sub;

use crate::error::RallyError;

/// A timestamp expressed as a rational number of seconds (`num / den`).
///
/// Comparisons use exact cross-multiplication when it fits in `i128`,
/// falling back to `f64` comparison otherwise.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Time {
    pub num: i64,
    pub den: i64,
}

impl Time {
    pub fn new(num: i64, den: i64) -> Self {
        debug_assert!(den > 0, "Time denominator must be positive");
        Time { num, den }
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        // Fixed-point rational with a large denominator keeps comparisons
        // exact for the sub-millisecond precision this pipeline needs.
        const DEN: i64 = 1_000_000_000;
        Time {
            num: (secs * DEN as f64).round() as i64,
            den: DEN,
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    pub fn zero() -> Self {
        Time { num: 0, den: 1 }
    }
}

impl PartialEq for Time {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Time {}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.num as i128 * other.den as i128;
        let rhs = other.num as i128 * self.den as i128;
        match lhs.cmp(&rhs) {
            Ordering::Equal => Ordering::Equal,
            other_ord => {
                if lhs.checked_sub(rhs).is_some() {
                    other_ord
                } else {
                    self.as_secs_f64()
                        .partial_cmp(&other.as_secs_f64())
                        .unwrap_or(Ordering::Equal)
                }
            }
        }
    }
}

impl Sub for Time {
    type Output = f64;

    fn sub(self, rhs: Self) -> f64 {
        self.as_secs_f64() - rhs.as_secs_f64()
    }
}

/// Minimal 2D vector used by speed-direction and displacement math.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Vec2 { x, y }
    }

    pub fn sub(&self, other: &Vec2) -> Vec2 {
        Vec2::new(self.x - other.x, self.y - other.y)
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn dot(&self, other: &Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }
}

/// Coefficients of `y = a*t^2 + b*t + c`.
#[derive(Debug, Clone, Copy)]
pub struct Quadratic {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Quadratic {
    pub fn eval(&self, t: f64) -> f64 {
        self.a * t * t + self.b * t + self.c
    }
}

/// Ordinary-least-squares fit of `y = a*t^2 + b*t + c` over `points`.
///
/// Returns `FitDegenerate` when the normal-equations Gram matrix is singular
/// (collinear `t`, e.g. fewer than 3 distinct timestamps).
pub fn fit_quadratic(points: &[(f64, f64)]) -> Result<Quadratic, RallyError> {
    if points.len() < 3 {
        return Err(RallyError::FitDegenerate);
    }

    // Normal equations for the design matrix [t^2, t, 1].
    let mut ata = SMatrix::<f64, 3, 3>::zeros();
    let mut aty = SVector::<f64, 3>::zeros();

    for &(t, y) in points {
        let row = SVector::<f64, 3>::new(t * t, t, 1.0);
        ata += row * row.transpose();
        aty += row * y;
    }

    let decomp = ata.try_inverse().ok_or(RallyError::FitDegenerate)?;
    let coeffs = decomp * aty;

    if !coeffs.iter().all(|v| v.is_finite()) {
        return Err(RallyError::FitDegenerate);
    }

    Ok(Quadratic {
        a: coeffs[0],
        b: coeffs[1],
        c: coeffs[2],
    })
}

/// Coefficient of determination for `fit` against `points`.
pub fn r_squared(points: &[(f64, f64)], fit: &Quadratic) -> f64 {
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / points.len() as f64;
    let ss_tot: f64 = points.iter().map(|(_, y)| (y - mean_y).powi(2)).sum();
    if ss_tot == 0.0 {
        return 1.0;
    }
    let ss_res: f64 = points
        .iter()
        .map(|&(t, y)| (y - fit.eval(t)).powi(2))
        .sum();
    (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
}
