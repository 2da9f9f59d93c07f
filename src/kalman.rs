//! Constant-velocity Kalman filter primitive. State is `[x, y, vx, vy]`;
//! measurement is `[x, y]`. Built directly on `nalgebra` so the predict/update
//! math and the innovation covariance used for gating stay explicit.

use nalgebra::{SMatrix, SVector};

pub type State4 = SVector<f64, 4>;
pub type Cov4 = SMatrix<f64, 4, 4>;
pub type Meas2 = SVector<f64, 2>;
pub type MeasCov2 = SMatrix<f64, 2, 2>;
pub type ObsMatrix = SMatrix<f64, 2, 4>;

/// Mean and covariance of a track's kinematic state.
#[derive(Debug, Clone, Copy)]
pub struct KalmanState {
    pub x: State4,
    pub p: Cov4,
}

impl KalmanState {
    pub fn new(center: (f32, f32), initial_p: f64, initial_p_vel: f64) -> Self {
        let x = State4::new(center.0 as f64, center.1 as f64, 0.0, 0.0);
        let p = Cov4::from_diagonal(&SVector::<f64, 4>::new(
            initial_p,
            initial_p,
            initial_p_vel,
            initial_p_vel,
        ));
        KalmanState { x, p }
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x[0], self.x[1])
    }
}

/// Builds the constant-velocity transition matrix embedding `dt` into the
/// position-from-velocity block. This is the only place `dt` enters the
/// dynamics.
pub fn build_f(dt: f64) -> Cov4 {
    let mut f = Cov4::identity();
    f[(0, 2)] = dt;
    f[(1, 3)] = dt;
    f
}

/// Diagonal process noise scaled by the configured position/velocity
/// variances.
pub fn build_q(q_pos: f64, q_vel: f64) -> Cov4 {
    Cov4::from_diagonal(&SVector::<f64, 4>::new(q_pos, q_pos, q_vel, q_vel))
}

pub fn observation_matrix() -> ObsMatrix {
    let mut h = ObsMatrix::zeros();
    h[(0, 0)] = 1.0;
    h[(1, 1)] = 1.0;
    h
}

pub fn build_r(r_meas: f64) -> MeasCov2 {
    MeasCov2::from_diagonal(&SVector::<f64, 2>::new(r_meas, r_meas))
}

impl KalmanState {
    /// Advances the state estimate in place: `x <- F x`, `P <- F P F^T + Q`.
    pub fn predict(&mut self, f: &Cov4, q: &Cov4) {
        self.x = f * self.x;
        self.p = f * self.p * f.transpose() + q;
    }

    /// Innovation covariance `S = H P H^T + R`, used by the tracker's gating
    /// step before committing to an association.
    pub fn innovation_covariance(&self, h: &ObsMatrix, r: &MeasCov2) -> MeasCov2 {
        h * self.p * h.transpose() + r
    }

    /// Standard Kalman measurement update from residual `z - H x`.
    pub fn update(&mut self, z: Meas2, h: &ObsMatrix, r: &MeasCov2) {
        let y = z - h * self.x;
        let s = self.innovation_covariance(h, r);
        let s_inv = match s.try_inverse() {
            Some(inv) => inv,
            None => return,
        };
        let k = self.p * h.transpose() * s_inv;
        self.x += k * y;
        let i = Cov4::identity();
        self.p = (i - k * h) * self.p;
    }
}

/// Squared Mahalanobis distance of `residual` under covariance `s`.
pub fn mahalanobis_sq(residual: &Meas2, s: &MeasCov2) -> f64 {
    match s.try_inverse() {
        Some(s_inv) => (residual.transpose() * s_inv * residual)[(0, 0)],
        None => f64::INFINITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn predict_advances_position_by_velocity() {
        let mut state = KalmanState::new((0.0, 0.0), 0.1, 1.0);
        state.x[2] = 1.0; // vx
        let f = build_f(2.0);
        let q = build_q(1e-4, 1e-2);
        state.predict(&f, &q);
        assert_relative_eq!(state.x[0], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn update_pulls_state_toward_measurement() {
        let mut state = KalmanState::new((0.0, 0.0), 1.0, 1.0);
        let h = observation_matrix();
        let r = build_r(0.01);
        state.update(Meas2::new(1.0, 1.0), &h, &r);
        assert!(state.x[0] > 0.0 && state.x[0] <= 1.0);
    }

    #[test]
    fn mahalanobis_zero_for_identical_points() {
        let r = build_r(0.1);
        let d = mahalanobis_sq(&Meas2::new(0.0, 0.0), &r);
        assert_relative_eq!(d, 0.0, epsilon = 1e-12);
    }
}
