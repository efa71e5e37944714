use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;

static DATE_LIKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}|^\d{2}/\d{2}/\d{4}").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VizKind {
    Table,
    Bar,
    Line,
    Pie,
}

/// A chart recommendation for a result set. Pure function of the result;
/// no independent lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationConfig {
    #[serde(rename = "type")]
    pub kind: VizKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_key: Option<String>,
}

impl VisualizationConfig {
    pub fn table() -> Self {
        Self {
            kind: VizKind::Table,
            x_key: None,
            y_key: None,
        }
    }
}

/// Classifies a result shape into a chart recommendation.
///
/// Numeric and categorical columns are partitioned on the first row's
/// values; ties always resolve to the first matching column in declared
/// order, so the outcome is deterministic for a fixed column order.
pub fn select(columns: &[String], rows: &[Map<String, Value>]) -> VisualizationConfig {
    if rows.is_empty() || columns.is_empty() {
        return VisualizationConfig::table();
    }

    let first_row = &rows[0];

    let numeric: Vec<&String> = columns
        .iter()
        .filter(|col| matches!(first_row.get(col.as_str()), Some(Value::Number(_))))
        .collect();

    let categorical: Vec<&String> = columns
        .iter()
        .filter(|col| !matches!(first_row.get(col.as_str()), Some(Value::Number(_))))
        .collect();

    if numeric.is_empty() || categorical.is_empty() {
        return VisualizationConfig::table();
    }

    let date_col = categorical.iter().find(|col| {
        matches!(first_row.get(col.as_str()), Some(Value::String(s)) if DATE_LIKE_RE.is_match(s))
    });

    if let Some(date_col) = date_col {
        return VisualizationConfig {
            kind: VizKind::Line,
            x_key: Some((*date_col).clone()),
            y_key: Some(numeric[0].clone()),
        };
    }

    VisualizationConfig {
        kind: VizKind::Bar,
        x_key: Some(categorical[0].clone()),
        y_key: Some(numeric[0].clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn empty_result_is_a_table() {
        assert_eq!(select(&[], &[]), VisualizationConfig::table());
        assert_eq!(
            select(&["a".to_string()], &[]),
            VisualizationConfig::table()
        );
    }

    #[test]
    fn date_column_yields_line_chart() {
        let columns = vec!["month".to_string(), "revenue".to_string()];
        let rows = vec![row(&[("month", json!("2024-01-01")), ("revenue", json!(100))])];

        let viz = select(&columns, &rows);
        assert_eq!(viz.kind, VizKind::Line);
        assert_eq!(viz.x_key.as_deref(), Some("month"));
        assert_eq!(viz.y_key.as_deref(), Some("revenue"));
    }

    #[test]
    fn slash_dates_also_yield_line_chart() {
        let columns = vec!["day".to_string(), "total".to_string()];
        let rows = vec![row(&[("day", json!("01/31/2024")), ("total", json!(7))])];
        assert_eq!(select(&columns, &rows).kind, VizKind::Line);
    }

    #[test]
    fn categorical_and_numeric_yield_bar_chart() {
        let columns = vec!["country".to_string(), "users".to_string()];
        let rows = vec![row(&[("country", json!("DE")), ("users", json!(42))])];

        let viz = select(&columns, &rows);
        assert_eq!(viz.kind, VizKind::Bar);
        assert_eq!(viz.x_key.as_deref(), Some("country"));
        assert_eq!(viz.y_key.as_deref(), Some("users"));
    }

    #[test]
    fn numeric_only_result_is_a_table() {
        let columns = vec!["count".to_string()];
        let rows = vec![row(&[("count", json!(12))])];
        assert_eq!(select(&columns, &rows), VisualizationConfig::table());
    }

    #[test]
    fn categorical_only_result_is_a_table() {
        let columns = vec!["name".to_string()];
        let rows = vec![row(&[("name", json!("alice"))])];
        assert_eq!(select(&columns, &rows), VisualizationConfig::table());
    }

    #[test]
    fn first_matching_column_wins_ties() {
        let columns = vec![
            "region".to_string(),
            "day".to_string(),
            "a".to_string(),
            "b".to_string(),
        ];
        let rows = vec![row(&[
            ("region", json!("emea")),
            ("day", json!("2024-02-02")),
            ("a", json!(1)),
            ("b", json!(2)),
        ])];

        let viz = select(&columns, &rows);
        // "day" is the first date-like column; "a" the first numeric one.
        assert_eq!(viz.kind, VizKind::Line);
        assert_eq!(viz.x_key.as_deref(), Some("day"));
        assert_eq!(viz.y_key.as_deref(), Some("a"));
    }

    #[test]
    fn config_serializes_with_type_tag() {
        let viz = VisualizationConfig {
            kind: VizKind::Line,
            x_key: Some("month".to_string()),
            y_key: Some("revenue".to_string()),
        };
        let json = serde_json::to_value(&viz).unwrap();
        assert_eq!(json["type"], "line");
        assert_eq!(json["xKey"], "month");
        assert_eq!(json["yKey"], "revenue");
    }
}
