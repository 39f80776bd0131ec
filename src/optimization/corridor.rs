// Drivable corridor construction
//
// Walks the smoothed reference curve at fixed arc-length steps, samples
// curvature, and probes lateral clearance against the environment model.

use crate::common::{
    CarGeometry, ClearanceBound, FreeSpace, PlannerConfig, PlannerError, PlannerResult,
    ReferenceCurve, State,
};

/// Discretized corridor around the reference curve: six parallel sequences,
/// one entry per arc-length step.
#[derive(Debug, Clone, Default)]
pub struct DividedSegments {
    pub s_list: Vec<f64>,
    pub k_list: Vec<f64>,
    pub x_list: Vec<f64>,
    pub y_list: Vec<f64>,
    pub angle_list: Vec<f64>,
    pub clearance_list: Vec<ClearanceBound>,
}

impl DividedSegments {
    pub fn len(&self) -> usize {
        self.s_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.s_list.is_empty()
    }

    /// New instance retaining only the first `target_index` entries of every
    /// sequence. Used when shortening the horizon for sampling.
    pub fn copy_prefix(&self, target_index: usize) -> DividedSegments {
        assert!(
            target_index <= self.len(),
            "prefix length {} exceeds segment count {}",
            target_index,
            self.len()
        );
        DividedSegments {
            s_list: self.s_list[..target_index].to_vec(),
            k_list: self.k_list[..target_index].to_vec(),
            x_list: self.x_list[..target_index].to_vec(),
            y_list: self.y_list[..target_index].to_vec(),
            angle_list: self.angle_list[..target_index].to_vec(),
            clearance_list: self.clearance_list[..target_index].to_vec(),
        }
    }

    /// Index of the first degenerate clearance interval, if any.
    pub fn degenerate_index(&self) -> Option<usize> {
        self.clearance_list.iter().position(|c| c.is_degenerate())
    }

    /// All six sequences must have identical length. Violations are
    /// programming errors, not runtime conditions.
    pub fn assert_consistent(&self) {
        let n = self.s_list.len();
        assert_eq!(self.k_list.len(), n, "k_list length mismatch");
        assert_eq!(self.x_list.len(), n, "x_list length mismatch");
        assert_eq!(self.y_list.len(), n, "y_list length mismatch");
        assert_eq!(self.angle_list.len(), n, "angle_list length mismatch");
        assert_eq!(self.clearance_list.len(), n, "clearance_list length mismatch");
    }
}

/// Builds a [`DividedSegments`] corridor from a reference curve and an
/// environment model. Per-circle probe bounds are kept for visualization.
pub struct CorridorBuilder<'a, C: ReferenceCurve, F: FreeSpace> {
    curve: &'a C,
    map: &'a F,
    config: &'a PlannerConfig,
    car: &'a CarGeometry,
    /// Clearance endpoints of the rear footprint circle, two per segment
    /// (left endpoint then right endpoint). Filled by 4-circle probing.
    pub rear_bounds: Vec<State>,
    /// Clearance endpoints of the first center footprint circle.
    pub center_bounds: Vec<State>,
    /// Clearance endpoints of the front footprint circle.
    pub front_bounds: Vec<State>,
}

impl<'a, C: ReferenceCurve, F: FreeSpace> CorridorBuilder<'a, C, F> {
    pub fn new(curve: &'a C, map: &'a F, config: &'a PlannerConfig, car: &'a CarGeometry) -> Self {
        CorridorBuilder {
            curve,
            map,
            config,
            car,
            rear_bounds: Vec::new(),
            center_bounds: Vec::new(),
            front_bounds: Vec::new(),
        }
    }

    /// Walk the curve from 0 to `horizon` in `delta_s` steps and probe
    /// clearance at each step. `safety_margin` selects 4-circle footprint
    /// probing (with the configured margin); otherwise a single
    /// direction-strict probe per segment is used.
    pub fn build(&mut self, horizon: f64, safety_margin: bool) -> PlannerResult<DividedSegments> {
        let step = self.config.delta_s;
        if horizon <= step {
            return Err(PlannerError::MalformedHorizon(format!(
                "horizon {:.3} not longer than step {:.3}",
                horizon, step
            )));
        }
        if horizon > self.curve.length() + 1e-6 {
            return Err(PlannerError::MalformedHorizon(format!(
                "horizon {:.3} exceeds reference length {:.3}",
                horizon,
                self.curve.length()
            )));
        }

        self.rear_bounds.clear();
        self.center_bounds.clear();
        self.front_bounds.clear();

        let n = (horizon / step).floor() as usize + 1;
        let mut segments = DividedSegments::default();
        for i in 0..n {
            // The final point lands on the horizon itself, so the last
            // interval may differ from the nominal step.
            let s = if i == n - 1 { horizon } else { i as f64 * step };
            let (x, y) = self.curve.position(s);
            let angle = self.curve.heading(s);
            let clearance = if safety_margin {
                self.clearance_for_4_circles(x, y, angle)
            } else {
                self.clearance_with_direction_strict(x, y, angle, self.car.circle_radius)
            };

            segments.s_list.push(s);
            segments.k_list.push(self.curve.curvature(s));
            segments.x_list.push(x);
            segments.y_list.push(y);
            segments.angle_list.push(angle);
            segments.clearance_list.push(clearance);
        }
        segments.assert_consistent();

        if segments.clearance_list[0].is_degenerate() {
            return Err(PlannerError::DegenerateCorridor(
                "no clearance at the corridor start".to_string(),
            ));
        }
        Ok(segments)
    }

    /// Probe strictly along the local normal on each side until the footprint
    /// circle hits an obstacle or the map boundary.
    fn clearance_with_direction_strict(
        &self,
        x: f64,
        y: f64,
        angle: f64,
        radius: f64,
    ) -> ClearanceBound {
        if !self.map.clear_of_obstacle(x, y, radius) {
            return ClearanceBound::new(0.0, 0.0);
        }
        let left = self.map.directional_clearance(
            x,
            y,
            angle + std::f64::consts::FRAC_PI_2,
            radius,
            self.config.probe_step,
            self.config.max_clearance,
        );
        let right = self.map.directional_clearance(
            x,
            y,
            angle - std::f64::consts::FRAC_PI_2,
            radius,
            self.config.probe_step,
            self.config.max_clearance,
        );
        ClearanceBound::new(-right, left)
    }

    /// Approximate the vehicle footprint by four circles along the heading
    /// and intersect their admissible lateral ranges, shrunk by the safety
    /// margin. Rear/center/front circle bounds are retained for
    /// visualization.
    fn clearance_for_4_circles(&mut self, x: f64, y: f64, angle: f64) -> ClearanceBound {
        let radius = self.car.circle_radius;
        let mut combined = ClearanceBound::new(-self.config.max_clearance, self.config.max_clearance);
        let mut per_circle = [ClearanceBound::new(0.0, 0.0); 4];

        for (j, &offset) in self.car.circle_offsets.iter().enumerate() {
            let cx = x + offset * angle.cos();
            let cy = y + offset * angle.sin();
            let bound = self.clearance_with_direction_strict(cx, cy, angle, radius);
            per_circle[j] = bound;
            combined = combined.intersect(&bound);
        }

        let offsets = self.car.circle_offsets;
        Self::push_circle_bound(&mut self.rear_bounds, x, y, angle, offsets[0], per_circle[0]);
        Self::push_circle_bound(&mut self.center_bounds, x, y, angle, offsets[1], per_circle[1]);
        Self::push_circle_bound(&mut self.front_bounds, x, y, angle, offsets[3], per_circle[3]);

        combined.shrink(self.config.safety_margin)
    }

    fn push_circle_bound(
        buffer: &mut Vec<State>,
        x: f64,
        y: f64,
        angle: f64,
        offset: f64,
        bound: ClearanceBound,
    ) {
        let cx = x + offset * angle.cos();
        let cy = y + offset * angle.sin();
        let normal = angle + std::f64::consts::FRAC_PI_2;
        buffer.push(State::new(
            cx + bound.upper * normal.cos(),
            cy + bound.upper * normal.sin(),
            angle,
        ));
        buffer.push(State::new(
            cx + bound.lower * normal.cos(),
            cy + bound.lower * normal.sin(),
            angle,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cubic_spline::Spline2D;
    use crate::utils::GridMap;

    fn straight_spline(length: f64) -> Spline2D {
        let n = 5;
        let x: Vec<f64> = (0..n).map(|i| length * i as f64 / (n - 1) as f64).collect();
        let y = vec![0.0; n];
        Spline2D::new(&x, &y).unwrap()
    }

    fn small_car() -> CarGeometry {
        CarGeometry {
            wheel_base: 1.0,
            rear_axle_to_center: 0.5,
            width: 0.8,
            circle_radius: 0.4,
            circle_offsets: [-0.2, 0.3, 0.8, 1.3],
        }
    }

    #[test]
    fn test_segment_count_and_monotone_s() {
        let spline = straight_spline(20.0);
        let map = GridMap::with_bounds(-5.0, -8.0, 25.0, 8.0, 0.2);
        let config = PlannerConfig::default();
        let car = small_car();
        let mut builder = CorridorBuilder::new(&spline, &map, &config, &car);

        let segments = builder.build(20.0, false).unwrap();
        let expected = (20.0 / config.delta_s).floor() as usize + 1;
        assert_eq!(segments.len(), expected);
        segments.assert_consistent();

        for w in segments.s_list.windows(2) {
            assert!(w[1] > w[0]);
        }
        // Constant step except possibly the last interval.
        for w in segments.s_list[..segments.len() - 1].windows(2) {
            assert!((w[1] - w[0] - config.delta_s).abs() < 1e-9);
        }
        assert!((segments.s_list.last().unwrap() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_fractional_horizon_last_interval() {
        let spline = straight_spline(20.0);
        let map = GridMap::with_bounds(-5.0, -8.0, 25.0, 8.0, 0.2);
        let config = PlannerConfig::default();
        let car = small_car();
        let mut builder = CorridorBuilder::new(&spline, &map, &config, &car);

        let segments = builder.build(10.3, false).unwrap();
        let expected = (10.3f64 / config.delta_s).floor() as usize + 1;
        assert_eq!(segments.len(), expected);
        assert!((segments.s_list.last().unwrap() - 10.3).abs() < 1e-9);
    }

    #[test]
    fn test_clearance_brackets_zero_in_free_space() {
        let spline = straight_spline(20.0);
        let map = GridMap::with_bounds(-5.0, -3.0, 25.0, 3.0, 0.2);
        let config = PlannerConfig::default();
        let car = small_car();
        let mut builder = CorridorBuilder::new(&spline, &map, &config, &car);

        let segments = builder.build(20.0, false).unwrap();
        for c in &segments.clearance_list {
            assert!(c.lower < 0.0 && c.upper > 0.0, "bound {:?}", c);
            // Free band is |y| < 3 and the probe disc has radius 0.4.
            assert!(c.upper < 3.0);
        }
    }

    #[test]
    fn test_blocked_start_fails() {
        let spline = straight_spline(20.0);
        let mut map = GridMap::with_bounds(-5.0, -3.0, 25.0, 3.0, 0.2);
        map.add_obstacle_rect(-1.0, -1.0, 1.0, 1.0);
        let config = PlannerConfig::default();
        let car = small_car();
        let mut builder = CorridorBuilder::new(&spline, &map, &config, &car);

        match builder.build(20.0, false) {
            Err(PlannerError::DegenerateCorridor(_)) => {}
            other => panic!("expected degenerate corridor, got {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn test_zero_horizon_fails() {
        let spline = straight_spline(20.0);
        let map = GridMap::with_bounds(-5.0, -3.0, 25.0, 3.0, 0.2);
        let config = PlannerConfig::default();
        let car = small_car();
        let mut builder = CorridorBuilder::new(&spline, &map, &config, &car);
        assert!(matches!(builder.build(0.0, false), Err(PlannerError::MalformedHorizon(_))));
    }

    #[test]
    fn test_copy_prefix_law() {
        let spline = straight_spline(20.0);
        let map = GridMap::with_bounds(-5.0, -3.0, 25.0, 3.0, 0.2);
        let config = PlannerConfig::default();
        let car = small_car();
        let mut builder = CorridorBuilder::new(&spline, &map, &config, &car);
        let segments = builder.build(20.0, false).unwrap();

        for k in [0, 1, segments.len() / 2, segments.len()] {
            let prefix = segments.copy_prefix(k);
            assert_eq!(prefix.len(), k);
            prefix.assert_consistent();
            for i in 0..k {
                assert_eq!(prefix.s_list[i], segments.s_list[i]);
                assert_eq!(prefix.k_list[i], segments.k_list[i]);
                assert_eq!(prefix.x_list[i], segments.x_list[i]);
                assert_eq!(prefix.y_list[i], segments.y_list[i]);
                assert_eq!(prefix.angle_list[i], segments.angle_list[i]);
                assert_eq!(prefix.clearance_list[i], segments.clearance_list[i]);
            }
        }
    }

    #[test]
    #[should_panic]
    fn test_copy_prefix_too_long_panics() {
        let segments = DividedSegments::default();
        let _ = segments.copy_prefix(1);
    }

    #[test]
    fn test_four_circle_probing_fills_viz_buffers() {
        let spline = straight_spline(20.0);
        let map = GridMap::with_bounds(-5.0, -4.0, 25.0, 4.0, 0.2);
        let config = PlannerConfig::default();
        let car = small_car();
        let mut builder = CorridorBuilder::new(&spline, &map, &config, &car);

        let segments = builder.build(20.0, true).unwrap();
        assert_eq!(builder.rear_bounds.len(), 2 * segments.len());
        assert_eq!(builder.center_bounds.len(), 2 * segments.len());
        assert_eq!(builder.front_bounds.len(), 2 * segments.len());
        // Margin-shrunk bounds are tighter than the raw direction-strict ones.
        let mut strict = CorridorBuilder::new(&spline, &map, &config, &car);
        let raw = strict.build(20.0, false).unwrap();
        for (a, b) in segments.clearance_list.iter().zip(raw.clearance_list.iter()) {
            assert!(a.upper <= b.upper + 1e-9);
            assert!(a.lower >= b.lower - 1e-9);
        }
    }
}
