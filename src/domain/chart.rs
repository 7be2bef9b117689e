//! Chart artifacts and their persisted metadata.
//!
//! A [`ChartSpec`] is what analysis code produces; it only lives for the
//! duration of one execution call. Exporting it yields an HTML file in the
//! charts directory plus a [`ChartRecord`] keyed by that file's name.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

/// Plotly CDN bundle referenced by exported charts
pub const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

/// Visual type of a chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
    Histogram,
    Pie,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::Line => "line",
            Self::Scatter => "scatter",
            Self::Histogram => "histogram",
            Self::Pie => "pie",
        }
    }
}

/// One data series of a chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// X values (categories for bar/pie labels)
    #[serde(default)]
    pub x: Vec<JsonValue>,

    /// Y values (slice sizes for pie); empty for histograms
    #[serde(default)]
    pub y: Vec<JsonValue>,
}

/// A chart object produced by analysis code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub kind: ChartKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_label: Option<String>,

    pub traces: Vec<Trace>,
}

impl ChartSpec {
    /// Create an empty chart of the given kind
    pub fn new(kind: ChartKind) -> Self {
        Self {
            kind,
            title: None,
            x_label: None,
            y_label: None,
            traces: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_trace(mut self, trace: Trace) -> Self {
        self.traces.push(trace);
        self
    }

    /// Plotly figure JSON (`{data, layout}`)
    pub fn to_plotly(&self) -> JsonValue {
        let data: Vec<JsonValue> = self
            .traces
            .iter()
            .map(|trace| {
                let mut entry = match self.kind {
                    ChartKind::Pie => json!({
                        "type": "pie",
                        "labels": trace.x,
                        "values": trace.y,
                    }),
                    ChartKind::Histogram => json!({
                        "type": "histogram",
                        "x": trace.x,
                    }),
                    ChartKind::Line => json!({
                        "type": "scatter",
                        "mode": "lines",
                        "x": trace.x,
                        "y": trace.y,
                    }),
                    ChartKind::Scatter => json!({
                        "type": "scatter",
                        "mode": "markers",
                        "x": trace.x,
                        "y": trace.y,
                    }),
                    ChartKind::Bar => json!({
                        "type": "bar",
                        "x": trace.x,
                        "y": trace.y,
                    }),
                };
                if let Some(name) = &trace.name {
                    entry["name"] = json!(name);
                }
                entry
            })
            .collect();

        let mut layout = json!({});
        if let Some(title) = &self.title {
            layout["title"] = json!({ "text": title });
        }
        if let Some(label) = &self.x_label {
            layout["xaxis"] = json!({ "title": { "text": label } });
        }
        if let Some(label) = &self.y_label {
            layout["yaxis"] = json!({ "title": { "text": label } });
        }

        json!({ "data": data, "layout": layout })
    }

    /// Standalone HTML document rendering this chart
    pub fn to_html(&self) -> String {
        let figure = self.to_plotly();
        let title = self.title.as_deref().unwrap_or("Chart");
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\" />\n<title>{}</title>\n\
             <script src=\"{}\"></script>\n</head>\n<body>\n\
             <div id=\"chart\" style=\"width:100%;height:100%;\"></div>\n\
             <script>\nvar figure = {};\nPlotly.newPlot('chart', figure.data, figure.layout, {{responsive: true}});\n</script>\n\
             </body>\n</html>\n",
            escape_html(title),
            PLOTLY_CDN,
            figure
        )
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Metadata kept for every exported chart file.
///
/// Timestamps are stored as strings so a hand-edited or corrupted table
/// still loads; unparseable values are treated as expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRecord {
    pub created_at: String,
    pub last_accessed: String,
}

impl ChartRecord {
    /// A record created (and last accessed) at `at`
    pub fn created(at: DateTime<Utc>) -> Self {
        let stamp = format_timestamp(at);
        Self {
            created_at: stamp.clone(),
            last_accessed: stamp,
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.created_at)
    }

    pub fn last_accessed_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.last_accessed)
    }
}

/// The whole metadata table: filename -> record
pub type ChartTable = BTreeMap<String, ChartRecord>;

/// Render a timestamp the way the metadata table stores it (RFC 3339, UTC)
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

/// Parse a stored timestamp; naive ISO-8601 values are read as UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_creation_sets_both_timestamps() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let record = ChartRecord::created(at);
        assert_eq!(record.created_at, record.last_accessed);
        assert_eq!(record.created_at(), Some(at));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-01T12:30:00+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T12:30:00.000000"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T12:30:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn test_metadata_table_json_shape() {
        let mut table = ChartTable::new();
        table.insert(
            "a.html".to_string(),
            ChartRecord {
                created_at: "2024-05-01T12:00:00+00:00".into(),
                last_accessed: "2024-05-01T12:05:00+00:00".into(),
            },
        );
        let json: JsonValue = serde_json::to_value(&table).unwrap();
        assert_eq!(
            json["a.html"]["last_accessed"],
            json!("2024-05-01T12:05:00+00:00")
        );
    }

    #[test]
    fn test_plotly_figure_for_bar_chart() {
        let chart = ChartSpec::new(ChartKind::Bar)
            .with_title("Sales")
            .with_trace(Trace {
                name: None,
                x: vec![json!("north"), json!("south")],
                y: vec![json!(10.0), json!(4.5)],
            });
        let figure = chart.to_plotly();
        assert_eq!(figure["data"][0]["type"], json!("bar"));
        assert_eq!(figure["layout"]["title"]["text"], json!("Sales"));

        let html = chart.to_html();
        assert!(html.contains("Plotly.newPlot"));
        assert!(html.contains("<title>Sales</title>"));
    }

    #[test]
    fn test_pie_uses_labels_and_values() {
        let chart = ChartSpec::new(ChartKind::Pie).with_trace(Trace {
            name: None,
            x: vec![json!("a")],
            y: vec![json!(1)],
        });
        let figure = chart.to_plotly();
        assert_eq!(figure["data"][0]["labels"], json!(["a"]));
        assert_eq!(figure["data"][0]["values"], json!([1]));
    }
}
