//! Combined S–OW distance histogram (SVG via plotters)

use crate::analysis::AnalysisResults;
use anyhow::Result;
use plotters::prelude::*;
use plotters_svg::SVGBackend;
use std::path::Path;

/// Draw every residue's normalised histogram as one line series.
///
/// `bins` defaults to the histogram's 0.01 nm bin width over `[0, cutoff]`.
pub fn plot_combined_histograms(path: &Path, results: &AnalysisResults, bins: Option<usize>) -> Result<()> {
    let svg_path = if path.extension().map(|e| e != "svg").unwrap_or(true) {
        path.with_extension("svg")
    } else {
        path.to_path_buf()
    };

    let root = SVGBackend::new(&svg_path, (800, 500)).into_drawing_area();
    root.fill(&WHITE)?;

    let curves: Vec<(&str, Vec<(f64, f64)>)> = results
        .iter()
        .filter(|(_, m)| !m.is_empty())
        .map(|(label, m)| {
            let h = m.histogram(bins);
            let points = h.midpoints().into_iter().zip(h.density()).collect();
            (label, points)
        })
        .collect();

    if curves.is_empty() {
        root.draw(&Text::new(
            "No distance data",
            (400, 250),
            ("sans-serif", 20).into_font().color(&BLACK),
        ))?;
        root.present()?;
        return Ok(());
    }

    let max_density = curves
        .iter()
        .flat_map(|(_, pts)| pts.iter().map(|(_, y)| *y))
        .fold(0.0f64, f64::max)
        .max(1e-9);

    let mut chart = ChartBuilder::on(&root)
        .caption("Minimum distance S-OW", ("sans-serif", 20))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..results.cutoff(), 0.0..max_density * 1.1)?;

    chart
        .configure_mesh()
        .x_desc("distance (nm)")
        .y_desc("P(d) (1/nm)")
        .draw()?;

    for (i, (label, points)) in curves.into_iter().enumerate() {
        let color = Palette99::pick(i).to_rgba();
        chart
            .draw_series(LineSeries::new(points, &color))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    log::info!("Wrote {}", svg_path.display());
    Ok(())
}
