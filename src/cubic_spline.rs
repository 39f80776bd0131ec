// Cubic spline reference curve
//
// Fits natural cubic splines through rough waypoints and exposes position,
// heading and curvature as functions of arc length.

extern crate nalgebra as na;

use crate::common::{PlannerError, PlannerResult, ReferenceCurve};

/// One-dimensional natural cubic spline
#[derive(Debug, Clone)]
pub struct CubicSpline {
    x: Vec<f64>,
    a: Vec<f64>,
    b: Vec<f64>,
    c: Vec<f64>,
    d: Vec<f64>,
}

impl CubicSpline {
    pub fn new(x: &[f64], y: &[f64]) -> PlannerResult<Self> {
        if x.len() != y.len() {
            return Err(PlannerError::InvalidParameter(format!(
                "spline knot count mismatch: {} vs {}",
                x.len(),
                y.len()
            )));
        }
        if x.len() < 2 {
            return Err(PlannerError::InvalidParameter(
                "spline needs at least 2 knots".to_string(),
            ));
        }

        let nx = x.len();
        let mut h: Vec<f64> = Vec::with_capacity(nx - 1);
        for i in 0..nx - 1 {
            let hi = x[i + 1] - x[i];
            if hi <= 0.0 {
                return Err(PlannerError::InvalidParameter(
                    "spline knots must be strictly increasing".to_string(),
                ));
            }
            h.push(hi);
        }

        let a = y.to_vec();
        let a_mat = Self::calc_a(&h);
        let b_vec = Self::calc_b(&h, &a);

        let a_mat_inv = a_mat.try_inverse().ok_or_else(|| {
            PlannerError::NumericalError("spline coefficient matrix is singular".to_string())
        })?;
        let c_na = a_mat_inv * b_vec;
        let c: Vec<f64> = c_na.iter().cloned().collect();

        let mut b: Vec<f64> = Vec::with_capacity(nx - 1);
        let mut d: Vec<f64> = Vec::with_capacity(nx - 1);
        for i in 0..nx - 1 {
            d.push((c[i + 1] - c[i]) / (3.0 * h[i]));
            b.push((a[i + 1] - a[i]) / h[i] - h[i] * (c[i + 1] + 2.0 * c[i]) / 3.0);
        }

        Ok(CubicSpline { x: x.to_vec(), a, b, c, d })
    }

    pub fn calc(&self, t: f64) -> f64 {
        let i = self.search_index(t);
        let dx = t - self.x[i];
        self.a[i] + self.b[i] * dx + self.c[i] * dx.powi(2) + self.d[i] * dx.powi(3)
    }

    pub fn calc_d(&self, t: f64) -> f64 {
        let i = self.search_index(t);
        let dx = t - self.x[i];
        self.b[i] + 2.0 * self.c[i] * dx + 3.0 * self.d[i] * dx.powi(2)
    }

    pub fn calc_dd(&self, t: f64) -> f64 {
        let i = self.search_index(t);
        let dx = t - self.x[i];
        2.0 * self.c[i] + 6.0 * self.d[i] * dx
    }

    fn search_index(&self, t: f64) -> usize {
        // Binary search for the segment containing t, clamped to the ends.
        let n = self.x.len();
        if t <= self.x[0] {
            return 0;
        }
        if t >= self.x[n - 1] {
            return n - 2;
        }
        let (mut lo, mut hi) = (0, n - 1);
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if t >= self.x[mid] {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        lo
    }

    fn calc_a(h: &[f64]) -> na::DMatrix<f64> {
        let nx = h.len() + 1;
        let mut a = na::DMatrix::zeros(nx, nx);
        a[(0, 0)] = 1.0;
        for i in 0..nx - 1 {
            if i != nx - 2 {
                a[(i + 1, i + 1)] = 2.0 * (h[i] + h[i + 1]);
            }
            a[(i + 1, i)] = h[i];
            a[(i, i + 1)] = h[i];
        }
        a[(0, 1)] = 0.0;
        a[(nx - 1, nx - 2)] = 0.0;
        a[(nx - 1, nx - 1)] = 1.0;
        a
    }

    fn calc_b(h: &[f64], a: &[f64]) -> na::DVector<f64> {
        let nx = h.len() + 1;
        let mut b = na::DVector::zeros(nx);
        for i in 0..nx - 2 {
            b[i + 1] =
                3.0 * (a[i + 2] - a[i + 1]) / h[i + 1] - 3.0 * (a[i + 1] - a[i]) / h[i];
        }
        b
    }
}

/// Two-dimensional spline curve parameterized by chord-length arc length
#[derive(Debug, Clone)]
pub struct Spline2D {
    pub s: Vec<f64>,
    sx: CubicSpline,
    sy: CubicSpline,
}

impl Spline2D {
    pub fn new(x: &[f64], y: &[f64]) -> PlannerResult<Self> {
        let s = Self::calc_s(x, y)?;
        let sx = CubicSpline::new(&s, x)?;
        let sy = CubicSpline::new(&s, y)?;
        Ok(Spline2D { s, sx, sy })
    }

    fn calc_s(x: &[f64], y: &[f64]) -> PlannerResult<Vec<f64>> {
        if x.len() != y.len() || x.len() < 2 {
            return Err(PlannerError::InvalidParameter(
                "spline needs at least 2 waypoints with matching coordinates".to_string(),
            ));
        }
        let mut s = Vec::with_capacity(x.len());
        s.push(0.0);
        for i in 0..x.len() - 1 {
            let ds = ((x[i + 1] - x[i]).powi(2) + (y[i + 1] - y[i]).powi(2)).sqrt();
            if ds <= 1e-9 {
                return Err(PlannerError::InvalidParameter(format!(
                    "duplicate waypoint at index {}",
                    i + 1
                )));
            }
            s.push(s[i] + ds);
        }
        Ok(s)
    }

    pub fn calc_position(&self, s: f64) -> (f64, f64) {
        let s = self.clamp_s(s);
        (self.sx.calc(s), self.sy.calc(s))
    }

    pub fn calc_yaw(&self, s: f64) -> f64 {
        let s = self.clamp_s(s);
        let dx = self.sx.calc_d(s);
        let dy = self.sy.calc_d(s);
        dy.atan2(dx)
    }

    pub fn calc_curvature(&self, s: f64) -> f64 {
        let s = self.clamp_s(s);
        let dx = self.sx.calc_d(s);
        let ddx = self.sx.calc_dd(s);
        let dy = self.sy.calc_d(s);
        let ddy = self.sy.calc_dd(s);
        (ddy * dx - ddx * dy) / (dx.powi(2) + dy.powi(2)).powf(1.5)
    }

    pub fn total_length(&self) -> f64 {
        *self.s.last().unwrap()
    }

    fn clamp_s(&self, s: f64) -> f64 {
        s.max(0.0).min(self.total_length())
    }
}

impl ReferenceCurve for Spline2D {
    fn length(&self) -> f64 {
        self.total_length()
    }

    fn position(&self, s: f64) -> (f64, f64) {
        self.calc_position(s)
    }

    fn heading(&self, s: f64) -> f64 {
        self.calc_yaw(s)
    }

    fn curvature(&self, s: f64) -> f64 {
        self.calc_curvature(s)
    }
}
