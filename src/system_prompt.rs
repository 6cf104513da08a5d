//! Initial prompt construction
//!
//! The initial prompt is sent once per conversation, ahead of the first user
//! turn. It is a template with four placeholders: the supported kinds, each
//! kind's detailed section, the schema of the open data and the bounds of
//! the current view.

use crate::data::DataContext;
use crate::processors::ProcessorRegistry;

/// Placeholder names, without braces
pub const PLACEHOLDER_SUPPORTED_KINDS: &str = "supported_kinds";
pub const PLACEHOLDER_KIND_DETAILS: &str = "kind_details";
pub const PLACEHOLDER_SCHEMA_INFO: &str = "schema_info";
pub const PLACEHOLDER_VIEW_BOUNDS: &str = "view_bounds";

/// Every placeholder a template must contain
pub const PLACEHOLDERS: [&str; 4] = [
    PLACEHOLDER_SUPPORTED_KINDS,
    PLACEHOLDER_KIND_DETAILS,
    PLACEHOLDER_SCHEMA_INFO,
    PLACEHOLDER_VIEW_BOUNDS,
];

/// Shown when no bounds are known
const UNKNOWN_BOUNDS: &str = "(currently unknown)";

/// Built-in template
pub const DEFAULT_PROMPT_TEMPLATE: &str = r#"You are a chat assistant specialised in working with data stored in spatially enabled databases.
Your goal is to answer the user's questions using the information in the available tables,
by generating SQL queries, charts or diagrams depending on what the user wants.

The current view covers the area described by the following WKT:
{view_bounds}
Do not filter by the area of the view unless explicitly asked to.

These are the response types you can use:
{supported_kinds}
The following DDL describes the tables available to you:
DDL:
{schema_info}

When building SQL keep in mind:
- Do not qualify names with a schema.
- Use only features present in SQL-92.
- For spatial support stick to "SQL/MM Part 3: Spatial (2016)" and "OGC SFS 1.2.1 (2011)";
  do not use vendor-specific extensions.

Detailed description of each supported response type:
{kind_details}
Your answer must contain a JSON object, inside a ```json fenced block, with this structure:
{
  "type": "response_type",
  "additional_field_1": "value",
  "additional_field_2": "value"
}

Where "response_type" is one of the supported response types.
The additional fields depend on the response type.
"#;

/// Placeholders `template` does not contain
pub fn missing_placeholders(template: &str) -> Vec<&'static str> {
    PLACEHOLDERS
        .iter()
        .copied()
        .filter(|name| !template.contains(&format!("{{{name}}}")))
        .collect()
}

/// Substitute `{name}` placeholders in a single pass.
///
/// Substituted text is never scanned again, so values may safely contain
/// placeholder-looking text. Unknown `{...}` sequences are kept verbatim.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some((before, after)) = rest.split_once('{') {
        out.push_str(before);
        let matched = values.iter().find_map(|(name, value)| {
            after
                .strip_prefix(name)
                .and_then(|r| r.strip_prefix('}'))
                .map(|remainder| (*value, remainder))
        });
        match matched {
            Some((value, remainder)) => {
                out.push_str(value);
                rest = remainder;
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Build the initial prompt for a conversation about `data`
pub async fn build_initial_prompt(
    template: &str,
    registry: &ProcessorRegistry,
    data: &DataContext,
) -> String {
    let contribution = registry.build_prompt_contribution();

    let schema = match data.source.describe_schema().await {
        Ok(schema) => schema,
        Err(e) => {
            tracing::warn!(context_id = %data.id, error = %e, "Could not describe schema");
            format!("(schema unavailable: {e})")
        }
    };
    let bounds = data.bounds.as_deref().unwrap_or(UNKNOWN_BOUNDS);

    fill_template(
        template,
        &[
            (PLACEHOLDER_SUPPORTED_KINDS, contribution.summary.as_str()),
            (PLACEHOLDER_KIND_DETAILS, contribution.details.as_str()),
            (PLACEHOLDER_SCHEMA_INFO, schema.as_str()),
            (PLACEHOLDER_VIEW_BOUNDS, bounds),
        ],
    )
}
