//! Charts built from query results
//!
//! The model supplies a query plus a description of the columns it returns.
//! The first declared column labels the categories; every numeric declared
//! column after it becomes a series.

use super::{
    parse_fields, OutputBlock, Processor, ProcessorContext, ProcessorError, ProcessorOutput,
};
use crate::data::{display_value, QueryResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const DEFAULT_TITLE: &str = "Chart";

/// Declared column types treated as numeric
const NUMERIC_TYPES: &[&str] = &[
    "double", "float", "int", "integer", "long", "number", "decimal",
];

/// Structured chart, ready for any renderer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub title: String,
    pub categories: Vec<String>,
    pub series: Vec<ChartSeries>,
    /// Renderer-specific script supplied by the model, passed through untouched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renderer_script: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub name: String,
    /// One value per category; `None` where the cell was not numeric
    pub values: Vec<Option<f64>>,
}

pub struct ChartProcessor;

#[derive(Debug, Deserialize)]
struct ChartInput {
    sql: String,
    #[serde(rename = "resultSchema", alias = "result_set_schema")]
    result_schema: Vec<ColumnSpec>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    function: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ColumnSpec {
    name: String,
    #[serde(rename = "type")]
    ty: String,
}

impl ColumnSpec {
    fn is_numeric(&self) -> bool {
        NUMERIC_TYPES
            .iter()
            .any(|t| t.eq_ignore_ascii_case(self.ty.trim()))
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn build_chart(
    title: String,
    schema: &[ColumnSpec],
    result: &QueryResult,
    renderer_script: Option<String>,
) -> Result<ChartSpec, ProcessorError> {
    let Some((label, rest)) = schema.split_first() else {
        return Err(ProcessorError::InvalidField {
            field: "resultSchema",
            reason: "no columns declared".to_string(),
        });
    };

    let index_of = |name: &str| {
        result
            .column_index(name)
            .ok_or_else(|| ProcessorError::InvalidField {
                field: "resultSchema",
                reason: format!("column '{name}' is not in the query result"),
            })
    };

    let label_index = index_of(&label.name)?;
    let resolved = rest
        .iter()
        .map(|column| index_of(&column.name).map(|index| (column, index)))
        .collect::<Result<Vec<_>, _>>()?;

    let categories = result.column(label_index).map(display_value).collect();
    let series: Vec<ChartSeries> = resolved
        .into_iter()
        .filter(|(column, _)| column.is_numeric())
        .map(|(column, index)| ChartSeries {
            name: column.name.clone(),
            values: result.column(index).map(numeric).collect(),
        })
        .collect();
    if series.is_empty() {
        return Err(ProcessorError::InvalidField {
            field: "resultSchema",
            reason: "no numeric column to plot".to_string(),
        });
    }

    Ok(ChartSpec {
        title,
        categories,
        series,
        renderer_script,
    })
}

#[async_trait]
impl Processor for ChartProcessor {
    fn kind(&self) -> &'static str {
        "chart"
    }

    fn description(&self) -> String {
        "Builds bar or pie charts from the data.".to_string()
    }

    fn prompt_info(&self) -> String {
        r#"
== Responses of type 'chart' ==
  Use this type for any request that involves building a bar or pie chart.
  The 'type' field must be "chart".
  Produce the answer in three steps:
  1. An SQL query that returns the data the chart needs, in the 'sql' field.
     The first column holds the category labels; the following columns hold the values.
  2. A description of the columns the query returns, in the 'resultSchema' field.
     It is a JSON array with one object per column:
       { "name": "column_name", "type": "String|int|double", "source_sql_type": "VARCHAR" }
  3. Optionally, a 'function' field with a script that draws the chart from the result.
  Put a short descriptive title (at most 100 characters) in the 'title' field.
  Example:
  {
    "type": "chart",
    "sql": "SELECT \"MODEL\", COUNT(*) AS \"USES\" FROM \"SUPPORTS\" GROUP BY \"MODEL\" LIMIT 1000;",
    "resultSchema": [
      { "name": "MODEL", "type": "String", "source_sql_type": "VARCHAR" },
      { "name": "USES", "type": "double", "source_sql_type": "BIGINT" }
    ],
    "title": "Uses per support model"
  }
"#
        .to_string()
    }

    async fn handle(
        &self,
        ctx: &ProcessorContext,
        _user_text: &str,
        fields: &Map<String, Value>,
    ) -> Result<ProcessorOutput, ProcessorError> {
        let input: ChartInput = parse_fields(fields)?;
        let data = ctx.require_data()?;
        let title = input
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());

        tracing::info!(context_id = %data.id, columns = input.result_schema.len(), "Building chart");
        let result = data.source.query(&input.sql).await?;
        let chart = build_chart(title, &input.result_schema, &result, input.function)?;

        Ok(ProcessorOutput::block(OutputBlock::Chart(chart)))
    }
}
