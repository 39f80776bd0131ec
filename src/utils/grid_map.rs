// Occupancy grid map for clearance probing

use crate::common::FreeSpace;

/// Occupancy grid over a rectangular region. Points outside the region
/// count as blocked, so probes stop at the map boundary.
#[derive(Debug, Clone)]
pub struct GridMap {
    pub resolution: f64,
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    x_width: i32,
    y_width: i32,
    occupancy: Vec<Vec<bool>>,
}

impl GridMap {
    /// Build a map whose extent covers the given obstacle points, marking
    /// one cell per point.
    pub fn new(ox: &[f64], oy: &[f64], resolution: f64) -> Self {
        let min_x = ox.iter().fold(f64::INFINITY, |a, &b| a.min(b)).floor();
        let min_y = oy.iter().fold(f64::INFINITY, |a, &b| a.min(b)).floor();
        // Pad the upper edge by one cell so extreme points land inside.
        let max_x = ox.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)).ceil() + resolution;
        let max_y = oy.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)).ceil() + resolution;

        let mut map = Self::with_bounds(min_x, min_y, max_x, max_y, resolution);
        for (&x, &y) in ox.iter().zip(oy.iter()) {
            map.add_obstacle(x, y);
        }
        map
    }

    /// Build an all-free map over an explicit region.
    pub fn with_bounds(min_x: f64, min_y: f64, max_x: f64, max_y: f64, resolution: f64) -> Self {
        assert!(resolution > 0.0, "grid resolution must be positive");
        assert!(max_x > min_x && max_y > min_y, "empty grid extent");

        let x_width = ((max_x - min_x) / resolution).round() as i32;
        let y_width = ((max_y - min_y) / resolution).round() as i32;
        let occupancy = vec![vec![false; y_width as usize]; x_width as usize];

        GridMap { resolution, min_x, min_y, max_x, max_y, x_width, y_width, occupancy }
    }

    /// Mark the cell containing the point as occupied. Out-of-range points
    /// are ignored.
    pub fn add_obstacle(&mut self, x: f64, y: f64) {
        let ix = self.calc_index(x, self.min_x);
        let iy = self.calc_index(y, self.min_y);
        if ix >= 0 && ix < self.x_width && iy >= 0 && iy < self.y_width {
            self.occupancy[ix as usize][iy as usize] = true;
        }
    }

    /// Mark every cell in the axis-aligned rectangle as occupied.
    pub fn add_obstacle_rect(&mut self, x0: f64, y0: f64, x1: f64, y1: f64) {
        let mut x = x0;
        while x <= x1 {
            let mut y = y0;
            while y <= y1 {
                self.add_obstacle(x, y);
                y += self.resolution;
            }
            x += self.resolution;
        }
    }

    pub fn is_inside(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x < self.max_x && y >= self.min_y && y < self.max_y
    }

    fn calc_index(&self, position: f64, min_position: f64) -> i32 {
        ((position - min_position) / self.resolution).floor() as i32
    }

    fn is_cell_occupied(&self, ix: i32, iy: i32) -> bool {
        if ix < 0 || ix >= self.x_width || iy < 0 || iy >= self.y_width {
            return true;
        }
        self.occupancy[ix as usize][iy as usize]
    }
}

impl FreeSpace for GridMap {
    fn is_free(&self, x: f64, y: f64) -> bool {
        if !self.is_inside(x, y) {
            return false;
        }
        !self.is_cell_occupied(self.calc_index(x, self.min_x), self.calc_index(y, self.min_y))
    }

    fn clear_of_obstacle(&self, x: f64, y: f64, radius: f64) -> bool {
        if !self.is_inside(x - radius, y - radius) || !self.is_inside(x + radius, y + radius) {
            return false;
        }
        let ix0 = self.calc_index(x - radius, self.min_x);
        let ix1 = self.calc_index(x + radius, self.min_x);
        let iy0 = self.calc_index(y - radius, self.min_y);
        let iy1 = self.calc_index(y + radius, self.min_y);
        for ix in ix0..=ix1 {
            for iy in iy0..=iy1 {
                if !self.is_cell_occupied(ix, iy) {
                    continue;
                }
                // Distance from the query point to the cell center.
                let cx = self.min_x + (ix as f64 + 0.5) * self.resolution;
                let cy = self.min_y + (iy as f64 + 0.5) * self.resolution;
                let d = ((x - cx).powi(2) + (y - cy).powi(2)).sqrt();
                if d <= radius + 0.5 * self.resolution {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_from_obstacle_points() {
        let ox = [0.0, 5.0, 10.0];
        let oy = [0.0, 2.0, 0.0];
        let map = GridMap::new(&ox, &oy, 0.5);
        assert!(!map.is_free(5.1, 2.1));
        assert!(map.is_free(5.0, 1.0));
        assert!(map.is_inside(9.0, 1.5));
    }

    #[test]
    fn test_empty_map_is_free() {
        let map = GridMap::with_bounds(0.0, -5.0, 20.0, 5.0, 0.5);
        assert!(map.is_free(10.0, 0.0));
        assert!(map.clear_of_obstacle(10.0, 0.0, 2.0));
    }

    #[test]
    fn test_outside_is_blocked() {
        let map = GridMap::with_bounds(0.0, -5.0, 20.0, 5.0, 0.5);
        assert!(!map.is_free(-1.0, 0.0));
        assert!(!map.clear_of_obstacle(0.5, 0.0, 2.0));
    }

    #[test]
    fn test_obstacle_blocks_disc() {
        let mut map = GridMap::with_bounds(0.0, -5.0, 20.0, 5.0, 0.5);
        map.add_obstacle(10.0, 2.0);
        assert!(!map.is_free(10.1, 2.1));
        assert!(map.clear_of_obstacle(10.0, 0.0, 1.0));
        assert!(!map.clear_of_obstacle(10.0, 1.5, 1.0));
    }

    #[test]
    fn test_directional_clearance_toward_wall() {
        use std::f64::consts::FRAC_PI_2;
        let mut map = GridMap::with_bounds(0.0, -5.0, 20.0, 5.0, 0.1);
        map.add_obstacle_rect(8.0, 3.0, 12.0, 4.0);
        // Probe upward from (10, 0) with a 0.5 m disc: the wall starts at
        // y = 3, so the disc center can reach roughly y = 2.5.
        let c = map.directional_clearance(10.0, 0.0, FRAC_PI_2, 0.5, 0.1, 10.0);
        assert!((c - 2.4).abs() < 0.2, "clearance {}", c);
    }
}
