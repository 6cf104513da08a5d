//! Natural-language queries answered with SQL

use super::{
    parse_fields, OutputBlock, Processor, ProcessorContext, ProcessorError, ProcessorOutput,
};
use crate::data::display_value;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};

const DEFAULT_TITLE: &str = "Query results";
const NO_RESULTS: &str = "No results were returned.";

pub struct SqlProcessor;

#[derive(Debug, Deserialize)]
struct SqlInput {
    sql: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "isScalar", alias = "esValorEscalar", alias = "is_scalar")]
    is_scalar: bool,
}

#[async_trait]
impl Processor for SqlProcessor {
    fn kind(&self) -> &'static str {
        "sql"
    }

    fn description(&self) -> String {
        "Answers questions about the data by running SQL queries.".to_string()
    }

    fn prompt_info(&self) -> String {
        r#"
== Responses of type 'sql' ==
  Use this type for any request that needs an SQL query against the tables you have access to.
  The 'type' field must be "sql".
  Include an 'sql' field holding only the SQL statement: no comments or explanations.
  The statement must be a SELECT and must limit the number of results to 1000.
  Never use DISTINCT; use GROUP BY instead when it is a valid alternative.
  Prefer joins over subselects whenever possible.
  Set 'isScalar' to true when the query returns a single value and to false otherwise.
  Quote table and column names with double quotes. Do not qualify names with a schema.
  Unless the user asks for it explicitly, do not show them the SQL you generated.
  When a value looks categorized but you do not have its dictionary, do not invent values for it.
  Compare categorized values case-insensitively and with approximate matching.
  Put a short descriptive title (at most 100 characters) in the 'title' field.
  Example:
  {
    "type": "sql",
    "sql": "SELECT \"EMPLOYEE_ID\", \"FIRST_NAME\" FROM \"EMPLOYEES\" WHERE \"DEPARTMENT_ID\" = 10 LIMIT 1000;",
    "title": "Employees by department",
    "isScalar": false
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
        let input: SqlInput = parse_fields(fields)?;
        if input.sql.trim().is_empty() {
            return Err(ProcessorError::InvalidField {
                field: "sql",
                reason: "statement is empty".to_string(),
            });
        }
        let data = ctx.require_data()?;
        let title = input
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());

        tracing::info!(context_id = %data.id, scalar = input.is_scalar, "Running SQL");
        let result = data.source.query(&input.sql).await?;

        if input.is_scalar {
            let text = match result.scalar().map(display_value) {
                Some(value) if !value.is_empty() => format!("{title}: {value}"),
                _ => NO_RESULTS.to_string(),
            };
            return Ok(ProcessorOutput::text(text));
        }

        Ok(ProcessorOutput::block(OutputBlock::Table {
            title,
            columns: result.columns,
            rows: result.rows,
            produced_at: Utc::now(),
        }))
    }
}
