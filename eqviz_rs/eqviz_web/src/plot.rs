//! Plotly rendering and browser downloads.

use eqviz::view::ChartModel;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Blob, HtmlAnchorElement, Url};

pub const BAR_DIV: &str = "distribution_plot";
pub const DOUGHNUT_DIV: &str = "share_plot";

fn colors(model: &ChartModel) -> Vec<&'static str> {
    model.slices.iter().map(|s| s.color).collect()
}

pub fn bar_traces(model: &ChartModel) -> JsonValue {
    json!([{
        "type": "bar",
        "name": "Count",
        "x": model.labels(),
        "y": model.values(),
        "marker": { "color": colors(model) },
    }])
}

/// Doughnut slices are labelled with their share of the total, one decimal.
pub fn doughnut_traces(model: &ChartModel) -> JsonValue {
    let text: Vec<String> = model.slices.iter().map(|s| s.percent_label()).collect();
    json!([{
        "type": "pie",
        "hole": 0.6,
        "sort": false,
        "labels": model.labels(),
        "values": model.values(),
        "text": text,
        "textinfo": "text",
        "hoverinfo": "label+value+text",
        "marker": { "colors": colors(model) },
    }])
}

pub fn chart_layout(title: &str, show_legend: bool) -> JsonValue {
    json!({
        "title": { "text": title },
        "margin": { "t": 48, "r": 16, "b": 40, "l": 40 },
        "showlegend": show_legend,
        "legend": { "orientation": "h" },
    })
}

fn to_js(value: &JsonValue) -> Option<JsValue> {
    // Plain objects, not ES Maps, so Plotly can read them.
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .ok()
}

fn plot(div_id: &str, traces: &JsonValue, layout: &JsonValue) {
    let (Some(traces), Some(layout)) = (to_js(traces), to_js(layout)) else {
        return;
    };
    if let Some(window) = web_sys::window() {
        if let Some(document) = window.document() {
            if let Some(div) = document.get_element_by_id(div_id) {
                let plotly = js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str("Plotly"))
                    .unwrap_or(JsValue::UNDEFINED);
                if let Ok(func) = js_sys::Reflect::get(&plotly, &JsValue::from_str("react"))
                    .or_else(|_| js_sys::Reflect::get(&plotly, &JsValue::from_str("newPlot")))
                    .and_then(|v| v.dyn_into::<js_sys::Function>())
                {
                    let _ = func.call3(&JsValue::NULL, &JsValue::from(div), &traces, &layout);
                }
            }
        }
    }
}

pub fn render_charts(model: &ChartModel) {
    plot(
        BAR_DIV,
        &bar_traces(model),
        &chart_layout("Equipment Distribution", false),
    );
    plot(
        DOUGHNUT_DIV,
        &doughnut_traces(model),
        &chart_layout("Type Share (%)", true),
    );
}

/// Saves `bytes` through a temporary object URL and anchor click.
pub fn trigger_download(bytes: &[u8], file_name: &str) -> Result<(), JsValue> {
    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| JsValue::from_str("no document"))?;
    let body = document
        .body()
        .ok_or_else(|| JsValue::from_str("no document body"))?;

    let parts = js_sys::Array::new();
    parts.push(&js_sys::Uint8Array::from(bytes));
    let blob = Blob::new_with_u8_array_sequence(&parts)?;
    let url = Url::create_object_url_with_blob(&blob)?;

    let anchor: HtmlAnchorElement = document
        .create_element("a")?
        .dyn_into()
        .map_err(JsValue::from)?;
    anchor.set_href(&url);
    anchor.set_download(file_name);
    body.append_child(&anchor)?;
    anchor.click();
    anchor.remove();
    Url::revoke_object_url(&url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use eqviz::Summary;

    fn model() -> ChartModel {
        let summary: Summary =
            serde_json::from_str(r#"{"type_distribution": {"Pump": 3, "Valve": 1}}"#).unwrap();
        ChartModel::from_summary(Some(&summary)).unwrap()
    }

    #[test]
    fn test_bar_trace_uses_counts_and_palette() {
        let traces = bar_traces(&model());
        assert_eq!(traces[0]["x"], json!(["Pump", "Valve"]));
        assert_eq!(traces[0]["y"], json!([3, 1]));
        assert_eq!(traces[0]["marker"]["color"], json!(["#3b82f6", "#22c55e"]));
    }

    #[test]
    fn test_doughnut_trace_labels_shares() {
        let traces = doughnut_traces(&model());
        assert_eq!(traces[0]["hole"], json!(0.6));
        assert_eq!(traces[0]["text"], json!(["75.0%", "25.0%"]));
        assert_eq!(traces[0]["sort"], json!(false));
    }

    #[test]
    fn test_layout_title() {
        let layout = chart_layout("Type Share (%)", true);
        assert_eq!(layout["title"]["text"], "Type Share (%)");
        assert_eq!(layout["showlegend"], true);
    }
}
