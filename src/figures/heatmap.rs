//! Grey-scale heatmap rendering for the DMA figures.

use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use std::path::Path;

use super::dma::Heatmap;
use super::units::format_bytes_label;

const WIDTH: u32 = 900;
const HEIGHT: u32 = 700;
const FONT_SIZE: i32 = 22;

/// Dark cells are slow, light cells fast.
fn grey_level(value: f64, max: f64) -> u8 {
    let frac = if max > 0.0 { (value / max).max(0.0).min(1.0) } else { 0.0 };
    (frac * 255.0).round() as u8
}

/// Draw `map` as an SVG. Rows are buffer sizes, smallest at the bottom; columns are
/// batch sizes. The best cell carries its throughput in `map.unit`.
pub fn render(path: &Path, map: &Heatmap) -> Result<(), failure::Error> {
    let rows: Vec<u64> = map.scaled.rows().copied().collect();
    let cols: Vec<u64> = map.scaled.columns().copied().collect();
    let (nrows, ncols) = (rows.len() as f64, cols.len() as f64);
    let top = map.scaled.max_cell().map_or(1.0, |(_, _, v)| v);

    let root = SVGBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Throughput (GiB/s)", ("sans-serif", FONT_SIZE + 10))
        .margin(20)
        .x_label_area_size(80)
        .y_label_area_size(140)
        .build_cartesian_2d(0f64..ncols, 0f64..nrows)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Batch Size")
        .y_desc("Buffer Size")
        .axis_desc_style(("sans-serif", FONT_SIZE + 4))
        .x_label_formatter(&|_| String::new())
        .y_label_formatter(&|_| String::new())
        .draw()?;

    let mut cells = vec![];
    for (ri, row) in rows.iter().enumerate() {
        for (ci, col) in cols.iter().enumerate() {
            if let Some(v) = map.scaled.get(row, col).filter(|v| !v.is_nan()) {
                let (x, y) = (ci as f64, ri as f64);
                cells.push(Rectangle::new(
                    [(x, y), (x + 1.0, y + 1.0)],
                    {
                        let level = grey_level(v, top);
                        RGBColor(level, level, level).filled()
                    },
                ));
            }
        }
    }
    chart.draw_series(cells)?;

    let best_row = rows.iter().position(|&r| r == map.best_buffer);
    let best_col = cols.iter().position(|&c| c == map.best_jobs);
    if let (Some(ri), Some(ci)) = (best_row, best_col) {
        chart.draw_series(std::iter::once(Text::new(
            map.label.clone(),
            (ci as f64 + 0.5, ri as f64 + 0.5),
            ("sans-serif", FONT_SIZE * 2)
                .into_font()
                .color(&BLACK)
                .pos(Pos::new(HPos::Center, VPos::Center)),
        )))?;
    }

    // Tick labels sit at cell centres.
    for (ci, col) in cols.iter().enumerate() {
        let (px, py) = chart
            .plotting_area()
            .map_coordinate(&(ci as f64 + 0.5, 0.0));
        root.draw(&Text::new(
            col.to_string(),
            (px, py + 8),
            ("sans-serif", FONT_SIZE)
                .into_font()
                .color(&BLACK)
                .pos(Pos::new(HPos::Center, VPos::Top)),
        ))?;
    }
    for (ri, row) in rows.iter().enumerate() {
        let (px, py) = chart
            .plotting_area()
            .map_coordinate(&(0.0, ri as f64 + 0.5));
        root.draw(&Text::new(
            format_bytes_label(*row as f64),
            (px - 8, py),
            ("sans-serif", FONT_SIZE)
                .into_font()
                .color(&BLACK)
                .pos(Pos::new(HPos::Right, VPos::Center)),
        ))?;
    }

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grey_scale_clamps() {
        assert_eq!(grey_level(0.0, 10.0), 0);
        assert_eq!(grey_level(5.0, 10.0), 128);
        assert_eq!(grey_level(10.0, 10.0), 255);
        assert_eq!(grey_level(20.0, 10.0), 255);
        assert_eq!(grey_level(5.0, 0.0), 0);
    }
}
