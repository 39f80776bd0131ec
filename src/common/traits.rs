//! Collaborator interfaces consumed by the optimization pipeline

/// A smooth reference curve parameterized by arc length.
pub trait ReferenceCurve {
    /// Total arc length of the curve [m]
    fn length(&self) -> f64;

    /// Cartesian position at arc length `s`
    fn position(&self, s: f64) -> (f64, f64);

    /// Tangent direction at arc length `s` [rad]
    fn heading(&self, s: f64) -> f64;

    /// Signed curvature at arc length `s` [1/m]
    fn curvature(&self, s: f64) -> f64;
}

/// Free-space queries against the environment model.
pub trait FreeSpace {
    /// Whether the point lies in known free space
    fn is_free(&self, x: f64, y: f64) -> bool;

    /// Whether a disc of `radius` around the point is entirely free
    fn clear_of_obstacle(&self, x: f64, y: f64, radius: f64) -> bool;

    /// Distance the disc can be shifted along `direction` before it hits an
    /// obstacle or the map boundary, probed in `step` increments and capped
    /// at `max_range`.
    fn directional_clearance(
        &self,
        x: f64,
        y: f64,
        direction: f64,
        radius: f64,
        step: f64,
        max_range: f64,
    ) -> f64 {
        let (dx, dy) = (direction.cos(), direction.sin());
        let mut t = 0.0;
        while t + step <= max_range {
            if !self.clear_of_obstacle(x + (t + step) * dx, y + (t + step) * dy, radius) {
                return t;
            }
            t += step;
        }
        t
    }
}
