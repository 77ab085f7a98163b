//! Render models derived from a [`Summary`]. Every front end draws from these
//! so the numbers, labels and colours agree everywhere.

use serde_json::Value as JsonValue;

use crate::{PreviewRow, Summary};

pub const CHART_PALETTE: [&str; 6] = [
    "#3b82f6", "#22c55e", "#f97316", "#ef4444", "#a855f7", "#14b8a6",
];

pub const TABLE_PLACEHOLDER: &str = "Upload a dataset to view the table preview here.";

pub const HISTOGRAM_BINS: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatCard {
    pub label: &'static str,
    pub value: String,
}

pub fn stat_cards(summary: Option<&Summary>) -> [StatCard; 4] {
    let total = summary.and_then(|s| s.total_count).unwrap_or(0);
    let flow = summary.and_then(|s| s.avg_flowrate).unwrap_or(0.0);
    let pressure = summary.and_then(|s| s.avg_pressure).unwrap_or(0.0);
    let temperature = summary.and_then(|s| s.avg_temperature).unwrap_or(0.0);
    [
        StatCard {
            label: "Total Equipment",
            value: total.to_string(),
        },
        StatCard {
            label: "Average Flowrate",
            value: format!("{flow:.1}"),
        },
        StatCard {
            label: "Average Pressure",
            value: format!("{pressure:.2}"),
        },
        StatCard {
            label: "Average Temperature",
            value: format!("{temperature:.2}"),
        },
    ]
}

/// `• Pump: 3` style lines, empty when there is no distribution.
pub fn distribution_lines(summary: Option<&Summary>) -> Vec<String> {
    summary
        .and_then(Summary::distribution)
        .map(|dist| {
            dist.iter()
                .map(|(name, count)| format!("• {name}: {count}"))
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TableView {
    Placeholder,
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
}

impl TableView {
    pub fn from_summary(summary: Option<&Summary>) -> Self {
        let Some(rows) = summary.and_then(|s| s.data_preview.as_ref()) else {
            return TableView::Placeholder;
        };
        let columns = summary
            .map(|s| s.preview_columns.clone())
            .unwrap_or_default();
        let rows = rows.iter().map(|row| table_row(&columns, row)).collect();
        TableView::Table { columns, rows }
    }
}

fn table_row(columns: &[String], row: &PreviewRow) -> Vec<String> {
    columns
        .iter()
        .map(|col| row.get(col).map(cell_text).unwrap_or_default())
        .collect()
}

pub fn cell_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChartSlice {
    pub label: String,
    pub value: u64,
    pub color: &'static str,
    pub share_pct: f64,
}

impl ChartSlice {
    pub fn percent_label(&self) -> String {
        format!("{:.1}%", self.share_pct)
    }
}

/// Shared data for the bar and doughnut charts.
#[derive(Clone, Debug, PartialEq)]
pub struct ChartModel {
    pub slices: Vec<ChartSlice>,
    pub total: u64,
}

impl ChartModel {
    /// `None` when the summary carries no distribution.
    pub fn from_summary(summary: Option<&Summary>) -> Option<Self> {
        let dist = summary?.distribution()?;
        let total: u64 = dist.values().sum();
        let slices = dist
            .iter()
            .enumerate()
            .map(|(idx, (label, &value))| ChartSlice {
                label: label.clone(),
                value,
                color: palette_color(idx),
                share_pct: share_pct(value, total),
            })
            .collect();
        Some(Self { slices, total })
    }

    pub fn labels(&self) -> Vec<&str> {
        self.slices.iter().map(|s| s.label.as_str()).collect()
    }

    pub fn values(&self) -> Vec<u64> {
        self.slices.iter().map(|s| s.value).collect()
    }

    pub fn max_value(&self) -> u64 {
        self.slices.iter().map(|s| s.value).max().unwrap_or(0)
    }
}

pub fn palette_color(idx: usize) -> &'static str {
    CHART_PALETTE[idx % CHART_PALETTE.len()]
}

fn share_pct(value: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    value as f64 * 100.0 / total as f64
}

/// Parses `#rrggbb` into its components.
pub fn hex_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Measure {
    Flowrate,
    Pressure,
    Temperature,
}

impl Measure {
    pub fn title(self) -> &'static str {
        match self {
            Measure::Flowrate => "Flowrate",
            Measure::Pressure => "Pressure",
            Measure::Temperature => "Temperature",
        }
    }

    pub fn values(self, summary: &Summary) -> &[f64] {
        match self {
            Measure::Flowrate => &summary.flowrate_list,
            Measure::Pressure => &summary.pressure_list,
            Measure::Temperature => &summary.temperature_list,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    pub title: String,
    pub bins: Vec<HistogramBin>,
}

impl Histogram {
    /// Equal-width bins over the finite values; `None` if there are none.
    pub fn from_values(title: impl Into<String>, values: &[f64], bins: usize) -> Option<Self> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() || bins == 0 {
            return None;
        }
        let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        // A constant series still gets a unit-wide range so the bins are not degenerate.
        let (lo, hi) = if max > min {
            (min, max)
        } else {
            (min - 0.5, max + 0.5)
        };
        let width = (hi - lo) / bins as f64;
        let mut out: Vec<HistogramBin> = (0..bins)
            .map(|i| HistogramBin {
                start: lo + width * i as f64,
                end: lo + width * (i + 1) as f64,
                count: 0,
            })
            .collect();
        for v in finite {
            let idx = (((v - lo) / width) as usize).min(bins - 1);
            out[idx].count += 1;
        }
        Some(Self {
            title: title.into(),
            bins: out,
        })
    }

    pub fn for_measure(summary: &Summary, measure: Measure) -> Option<Self> {
        Self::from_values(measure.title(), measure.values(summary), HISTOGRAM_BINS)
    }

    pub fn max_count(&self) -> usize {
        self.bins.iter().map(|b| b.count).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn summary(value: JsonValue) -> Summary {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_doughnut_percentages() {
        let s = summary(json!({ "type_distribution": { "A": 3, "B": 1 } }));
        let model = ChartModel::from_summary(Some(&s)).unwrap();
        let labels: Vec<String> = model.slices.iter().map(ChartSlice::percent_label).collect();
        assert_eq!(labels, vec!["75.0%", "25.0%"]);
        assert_eq!(model.total, 4);
        assert_eq!(model.labels(), vec!["A", "B"]);
        assert_eq!(model.values(), vec![3, 1]);
    }

    #[test]
    fn test_percentages_round_to_one_decimal() {
        let s = summary(json!({ "type_distribution": { "A": 1, "B": 1, "C": 1 } }));
        let model = ChartModel::from_summary(Some(&s)).unwrap();
        assert_eq!(model.slices[0].percent_label(), "33.3%");
    }

    #[test]
    fn test_zero_total_labels_zero() {
        let s = summary(json!({ "type_distribution": { "A": 0 } }));
        let model = ChartModel::from_summary(Some(&s)).unwrap();
        assert_eq!(model.slices[0].percent_label(), "0.0%");
    }

    #[test]
    fn test_charts_absent_without_distribution() {
        assert!(ChartModel::from_summary(None).is_none());
        assert!(ChartModel::from_summary(Some(&Summary::default())).is_none());
    }

    #[test]
    fn test_palette_cycles() {
        let dist: serde_json::Map<String, JsonValue> =
            (0..8).map(|i| (format!("T{i}"), json!(1))).collect();
        let s = summary(json!({ "type_distribution": dist }));
        let model = ChartModel::from_summary(Some(&s)).unwrap();
        assert_eq!(model.slices[6].color, CHART_PALETTE[0]);
        assert_eq!(model.slices[7].color, CHART_PALETTE[1]);
    }

    #[test]
    fn test_table_placeholder_without_preview() {
        let s = summary(json!({ "preview_columns": ["Type"] }));
        assert_eq!(TableView::from_summary(Some(&s)), TableView::Placeholder);
        assert_eq!(TableView::from_summary(None), TableView::Placeholder);
    }

    #[test]
    fn test_table_cells_follow_columns() {
        let s = summary(json!({
            "preview_columns": ["Equipment Name", "Type", "Flowrate"],
            "data_preview": [
                { "Equipment Name": "Pump-1", "Type": "Pump", "Flowrate": 120.5 },
                { "Type": "Valve", "Flowrate": null }
            ]
        }));
        assert_eq!(
            TableView::from_summary(Some(&s)),
            TableView::Table {
                columns: vec!["Equipment Name".into(), "Type".into(), "Flowrate".into()],
                rows: vec![
                    vec!["Pump-1".into(), "Pump".into(), "120.5".into()],
                    vec!["".into(), "Valve".into(), "".into()],
                ],
            }
        );
    }

    #[test]
    fn test_stat_cards_format() {
        let s = summary(json!({
            "total_count": 15,
            "avg_flowrate": 119.8,
            "avg_pressure": 6.1,
            "avg_temperature": 117.456
        }));
        let values: Vec<String> = stat_cards(Some(&s)).into_iter().map(|c| c.value).collect();
        assert_eq!(values, vec!["15", "119.8", "6.10", "117.46"]);

        let empty: Vec<String> = stat_cards(None).into_iter().map(|c| c.value).collect();
        assert_eq!(empty, vec!["0", "0.0", "0.00", "0.00"]);
    }

    #[test]
    fn test_distribution_lines() {
        let s = summary(json!({ "type_distribution": { "Pump": 3, "Valve": 1 } }));
        assert_eq!(distribution_lines(Some(&s)), vec!["• Pump: 3", "• Valve: 1"]);
        assert!(distribution_lines(None).is_empty());
    }

    #[test]
    fn test_equipment_distribution_preferred_for_charts_and_lines() {
        let s = summary(json!({
            "type_distribution": { "Pump": 3, "Valve": 1 },
            "equipment_distribution": { "Pump": 1, "Valve": 1 }
        }));
        assert_eq!(distribution_lines(Some(&s)), vec!["• Pump: 1", "• Valve: 1"]);
        let model = ChartModel::from_summary(Some(&s)).unwrap();
        assert_eq!(model.total, 2);
        assert_eq!(model.slices[0].percent_label(), "50.0%");
    }

    #[test]
    fn test_hex_rgb() {
        assert_eq!(hex_rgb("#3b82f6"), Some((0x3b, 0x82, 0xf6)));
        assert_eq!(hex_rgb("3b82f6"), None);
        assert_eq!(hex_rgb("#3b82"), None);
    }

    #[test]
    fn test_histogram_bins_cover_all_values() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let hist = Histogram::from_values("Flowrate", &values, HISTOGRAM_BINS).unwrap();
        assert_eq!(hist.bins.len(), HISTOGRAM_BINS);
        assert_eq!(hist.bins.iter().map(|b| b.count).sum::<usize>(), values.len());
        assert_eq!(hist.bins.last().unwrap().count, 2);
        assert_eq!(hist.bins[0].start, 1.0);
        assert_eq!(hist.bins.last().unwrap().end, 9.0);
    }

    #[test]
    fn test_histogram_constant_and_empty_series() {
        let hist = Histogram::from_values("P", &[4.0, 4.0], 8).unwrap();
        assert_eq!(hist.max_count(), 2);
        assert!(Histogram::from_values("P", &[], 8).is_none());
        assert!(Histogram::from_values("P", &[f64::NAN], 8).is_none());
    }

    #[test]
    fn test_histogram_for_measure() {
        let s = summary(json!({ "pressure_list": [5.0, 6.0, 7.0] }));
        let hist = Histogram::for_measure(&s, Measure::Pressure).unwrap();
        assert_eq!(hist.title, "Pressure");
        assert!(Histogram::for_measure(&s, Measure::Flowrate).is_none());
    }
}
