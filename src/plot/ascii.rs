//! ASCII/Unicode plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks of a complex's fit in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - observed flux: `o`
//! - total model: `-` line
//! - optional individual Gaussians (plus continuum): `.` line

use crate::domain::{Complex, SpectralWindow, Spectrum};
use crate::models::CompositeModel;
use crate::report::TargetRecord;

/// Plot layout and content switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlotConfig {
    pub width: usize,
    pub height: usize,
    /// Also draw each Gaussian component on top of the continuum.
    pub components: bool,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: 72,
            height: 16,
            components: false,
        }
    }
}

/// Render one complex: observed window plus model.
pub fn render_ascii_plot(window: &SpectralWindow, model: &CompositeModel, config: &PlotConfig) -> String {
    let width = config.width.max(10);
    let height = config.height.max(5);
    let (x_min, x_max) = wavelength_range(window).unwrap_or((0.0, 1.0));

    let curve = sample_curve(|x| model.evaluate(x), x_min, x_max, width * 2);
    let components: Vec<Vec<(f64, f64)>> = if config.components {
        let base = model.continuum.unwrap_or(0.0);
        model
            .components
            .iter()
            .map(|c| sample_curve(|x| base + c.profile.evaluate(x), x_min, x_max, width * 2))
            .collect()
    } else {
        Vec::new()
    };

    let points: Vec<(f64, f64)> = window
        .wavelength
        .iter()
        .zip(&window.flux)
        .zip(&window.ivar)
        .filter(|(_, iv)| **iv > 0.0)
        .map(|((&w, &f), _)| (w, f))
        .collect();

    let all_y = points
        .iter()
        .chain(curve.iter())
        .chain(components.iter().flatten())
        .map(|&(_, y)| y);
    let (y_min, y_max) = y_range(all_y).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];
    let frame = Frame {
        x_min,
        x_max,
        y_min,
        y_max,
    };

    // Total model first, component lines only fill blanks, data overlays both.
    draw_curve(&mut grid, &curve, &frame, '-');
    for c in &components {
        draw_curve(&mut grid, c, &frame, '.');
    }
    for &(x, y) in &points {
        let col = map_x(x, x_min, x_max, width);
        let row = map_y(y, y_min, y_max, height);
        grid[row][col] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: λ=[{x_min:.1}, {x_max:.1}] Å | flux=[{y_min:.2}, {y_max:.2}]\n"
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

/// Render the four complexes of a target from its rebuilt models.
pub fn render_record_plots(
    spectrum: &Spectrum,
    record: &TargetRecord,
    windows: &crate::domain::WindowSet,
    config: &PlotConfig,
) -> String {
    let mut out = String::new();
    for (complex, model) in record.rebuild_models() {
        let window = spectrum.window(complex, windows.get(complex));
        out.push_str(&format!("{} ({})\n", complex.display_name(), rchi2_label(record, complex)));
        out.push_str(&render_ascii_plot(&window, &model, config));
        out.push('\n');
    }
    out
}

fn rchi2_label(record: &TargetRecord, complex: Complex) -> String {
    match record.complex(complex).and_then(|c| c.rchi2) {
        Some(v) => format!("rchi2={v:.3}"),
        None => "rchi2=-".to_string(),
    }
}

struct Frame {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

fn wavelength_range(window: &SpectralWindow) -> Option<(f64, f64)> {
    let mut min_x = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    for &w in &window.wavelength {
        min_x = min_x.min(w);
        max_x = max_x.max(w);
    }
    if min_x.is_finite() && max_x.is_finite() && max_x > min_x {
        Some((min_x, max_x))
    } else {
        None
    }
}

fn sample_curve(f: impl Fn(f64) -> f64, x_min: f64, x_max: f64, n: usize) -> Vec<(f64, f64)> {
    let n = n.max(2);
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let u = i as f64 / (n as f64 - 1.0);
        let x = x_min + u * (x_max - x_min);
        out.push((x, f(x)));
    }
    out
}

fn y_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for y in values.filter(|y| y.is_finite()) {
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }
    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], frame: &Frame, ch: char) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(x, y) in curve {
        let col = map_x(x, frame.x_min, frame.x_max, width);
        let row = map_y(y, frame.y_min, frame.y_max, height);
        if let Some((c0, r0)) = prev {
            draw_line(grid, c0, r0, col, row, ch);
        } else if grid[row][col] == ' ' {
            grid[row][col] = ch;
        }
        prev = Some((col, row));
    }
}

/// Integer line drawing (Bresenham-ish); only fills blank cells.
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
