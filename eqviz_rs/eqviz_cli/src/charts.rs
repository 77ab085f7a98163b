use std::panic;
use std::path::Path;

use anyhow::Result;
use eqviz::view::{hex_rgb, ChartModel, Histogram};
use plotters::coord::Shift;
use plotters::element::Pie;
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};

const PANEL_SIZE: (u32, u32) = (640, 520);

#[derive(Clone, Copy, Debug)]
pub enum ChartKind {
    Png,
    Svg,
}

/// Renders the dashboard charts side by side: distribution bars, type share
/// doughnut, and the optional histogram.
pub fn render_chart_guard(
    model: &ChartModel,
    histogram: Option<&Histogram>,
    path: &Path,
    kind: ChartKind,
) -> Result<(), String> {
    let render = || -> Result<(), String> {
        render_dashboard(model, histogram, path, kind).map_err(|e| format!("plotting error: {}", e))
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn render_dashboard(
    model: &ChartModel,
    histogram: Option<&Histogram>,
    path: &Path,
    kind: ChartKind,
) -> Result<()> {
    let panels = if histogram.is_some() { 3 } else { 2 };
    let size = (PANEL_SIZE.0 * panels as u32, PANEL_SIZE.1);
    match kind {
        ChartKind::Png => {
            let root = BitMapBackend::new(path, size).into_drawing_area();
            draw_panels(root, model, histogram, panels)
        }
        ChartKind::Svg => {
            let root = SVGBackend::new(path, size).into_drawing_area();
            draw_panels(root, model, histogram, panels)
        }
    }
}

fn draw_panels<DB>(
    root: DrawingArea<DB, Shift>,
    model: &ChartModel,
    histogram: Option<&Histogram>,
    panels: usize,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let areas = root.split_evenly((1, panels));
    draw_bar_chart(&areas[0], model)?;
    draw_doughnut(&areas[1], model)?;
    if let (Some(hist), Some(area)) = (histogram, areas.get(2)) {
        draw_histogram(area, hist)?;
    }
    root.present()?;
    Ok(())
}

fn title_font() -> FontDesc<'static> {
    FontDesc::new(FontFamily::SansSerif, 22.0, FontStyle::Bold)
}

fn label_font() -> FontDesc<'static> {
    FontDesc::new(FontFamily::SansSerif, 15.0, FontStyle::Normal)
}

fn rgb(hex: &str) -> RGBColor {
    hex_rgb(hex)
        .map(|(r, g, b)| RGBColor(r, g, b))
        .unwrap_or(BLACK)
}

fn draw_bar_chart<DB>(area: &DrawingArea<DB, Shift>, model: &ChartModel) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let labels = model.labels();
    let count = model.slices.len().max(1);
    let y_max = model.max_value() + 1;

    let mut chart = ChartBuilder::on(area)
        .caption("Equipment Distribution", title_font())
        .margin(20)
        .set_label_area_size(LabelAreaPosition::Left, 45)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d((0..count).into_segmented(), 0u64..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .light_line_style(&TRANSPARENT)
        .x_label_formatter(&|v| match v {
            SegmentValue::CenterOf(idx) => labels.get(*idx).map(|s| s.to_string()).unwrap_or_default(),
            _ => String::new(),
        })
        .y_label_formatter(&|v| format!("{}", v))
        .label_style(label_font().color(&BLACK.mix(0.85)))
        .draw()?;

    chart.draw_series(model.slices.iter().enumerate().map(|(idx, slice)| {
        let mut bar = Rectangle::new(
            [
                (SegmentValue::Exact(idx), 0),
                (SegmentValue::Exact(idx + 1), slice.value),
            ],
            rgb(slice.color).filled(),
        );
        bar.set_margin(0, 0, 12, 12);
        bar
    }))?;
    Ok(())
}

fn draw_doughnut<DB>(area: &DrawingArea<DB, Shift>, model: &ChartModel) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let area = area.titled("Type Share (%)", title_font())?;
    if model.total == 0 {
        return Ok(());
    }
    let (width, height) = area.dim_in_pixel();
    let center = (width as i32 / 2, height as i32 / 2);
    let radius = (width.min(height) as f64 / 2.0 - 60.0).max(20.0);

    let sizes: Vec<f64> = model.slices.iter().map(|s| s.value as f64).collect();
    let colors: Vec<RGBColor> = model.slices.iter().map(|s| rgb(s.color)).collect();
    let labels: Vec<String> = model
        .slices
        .iter()
        .map(|s| format!("{} ({})", s.label, s.percent_label()))
        .collect();

    let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
    pie.label_style(label_font().color(&BLACK));
    area.draw(&pie)?;
    // Doughnut hole at 60% of the radius.
    area.draw(&Circle::new(center, (radius * 0.6) as i32, WHITE.filled()))?;
    Ok(())
}

fn draw_histogram<DB>(area: &DrawingArea<DB, Shift>, hist: &Histogram) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (Some(first), Some(last)) = (hist.bins.first(), hist.bins.last()) else {
        return Ok(());
    };
    let mut chart = ChartBuilder::on(area)
        .caption(format!("{} Histogram", hist.title), title_font())
        .margin(20)
        .set_label_area_size(LabelAreaPosition::Left, 45)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(first.start..last.end, 0usize..hist.max_count() + 1)?;

    chart
        .configure_mesh()
        .light_line_style(&TRANSPARENT)
        .x_label_formatter(&|v| format!("{:.1}", v))
        .label_style(label_font().color(&BLACK.mix(0.85)))
        .draw()?;

    let fill = rgb(eqviz::view::palette_color(0));
    chart.draw_series(hist.bins.iter().map(|bin| {
        Rectangle::new([(bin.start, 0), (bin.end, bin.count)], fill.mix(0.8).filled())
    }))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_parses_palette_and_falls_back() {
        assert_eq!(rgb("#3b82f6"), RGBColor(0x3b, 0x82, 0xf6));
        assert_eq!(rgb("blue"), BLACK);
    }
}
