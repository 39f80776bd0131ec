// Path optimization demo
//
// Builds a synthetic obstacle scenario, runs the QP path optimizer and the
// candidate sampler, and saves the result as an SVG plot.

use gnuplot::{AxesCommon, Caption, Color, Figure, PointSize, PointSymbol};

use path_optimizer::{GridMap, PathOptimizer, SampleOutcome, State};

fn main() {
    println!("QP path optimization start!");

    // Rough waypoints of an S-shaped maneuver.
    let waypoints = [
        (0.0, 0.0),
        (8.0, 1.0),
        (16.0, 4.0),
        (26.0, 4.5),
        (36.0, 1.0),
        (45.0, 0.0),
    ];
    let points: Vec<State> = waypoints.iter().map(|&(x, y)| State::new(x, y, 0.0)).collect();

    // Environment: open area with two obstacle blocks near the path.
    let mut map = GridMap::with_bounds(-10.0, -15.0, 60.0, 20.0, 0.2);
    map.add_obstacle_rect(12.0, 6.5, 18.0, 9.0);
    map.add_obstacle_rect(28.0, -2.0, 33.0, 0.5);

    let start_state = State::new(0.0, 0.0, 0.1);
    let end_state = State::new(45.0, 0.0, 0.0);

    let mut optimizer = PathOptimizer::new(&points, start_state, end_state, &map, true)
        .expect("optimizer setup");

    let path = match optimizer.solve() {
        Ok(path) => {
            println!("Optimized path with {} points", path.len());
            path
        }
        Err(e) => {
            println!("Optimization failed: {}", e);
            return;
        }
    };

    let lon_set = [15.0, 30.0, 45.0];
    let lat_set = [-2.0, -1.0, 0.0, 1.0, 2.0];
    match optimizer.sample_paths(&lon_set, &lat_set) {
        Ok(candidates) => {
            let accepted = candidates.len();
            let total = lon_set.len() * lat_set.len();
            println!("Sampled {} candidate paths out of {} trials", accepted, total);
            if let Some(best) = optimizer.best_sampling_index() {
                let trial = &optimizer.sample_outcomes()[best];
                println!("Preferred candidate: lon = {:.1}, lat = {:.1}", trial.lon, trial.lat);
            }
        }
        Err(e) => println!("Sampling failed: {}", e),
    }

    // Plot reference, corridor bounds, candidates and the optimized path.
    let mut fig = Figure::new();
    {
        let smoothed_x: Vec<f64> = optimizer.smoothed_path().iter().map(|p| p.x).collect();
        let smoothed_y: Vec<f64> = optimizer.smoothed_path().iter().map(|p| p.y).collect();
        let left_x: Vec<f64> = optimizer.left_bound().iter().map(|p| p.x).collect();
        let left_y: Vec<f64> = optimizer.left_bound().iter().map(|p| p.y).collect();
        let right_x: Vec<f64> = optimizer.right_bound().iter().map(|p| p.x).collect();
        let right_y: Vec<f64> = optimizer.right_bound().iter().map(|p| p.y).collect();
        let path_x: Vec<f64> = path.iter().map(|p| p.x).collect();
        let path_y: Vec<f64> = path.iter().map(|p| p.y).collect();

        let axes = fig
            .axes2d()
            .set_title("QP Path Optimization", &[])
            .set_x_label("x [m]", &[])
            .set_y_label("y [m]", &[])
            .set_aspect_ratio(gnuplot::AutoOption::Fix(1.0));

        axes.lines(&smoothed_x, &smoothed_y, &[Caption("Reference"), Color("gray")])
            .lines(&left_x, &left_y, &[Caption("Left bound"), Color("orange")])
            .lines(&right_x, &right_y, &[Caption("Right bound"), Color("orange")]);

        for trial in optimizer.sample_outcomes() {
            if let SampleOutcome::Accepted { path, .. } = &trial.outcome {
                let cx: Vec<f64> = path.iter().map(|p| p.x).collect();
                let cy: Vec<f64> = path.iter().map(|p| p.y).collect();
                axes.lines(&cx, &cy, &[Color("light-green")]);
            }
        }

        axes.lines(&path_x, &path_y, &[Caption("Optimized"), Color("blue")])
            .points(
                &[start_state.x],
                &[start_state.y],
                &[Caption("Start"), Color("red"), PointSymbol('*'), PointSize(2.0)],
            )
            .points(
                &[end_state.x],
                &[end_state.y],
                &[Caption("Goal"), Color("magenta"), PointSymbol('O'), PointSize(2.0)],
            );
    }

    fig.save_to_svg("./path_optimization.svg", 800, 600).unwrap();
    println!("Plot saved to ./path_optimization.svg");

    println!("Done!");
}
