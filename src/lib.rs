pub mod area;
pub mod builder;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod expression;
pub mod grid;
pub mod logging;
pub mod render;
pub mod transform;
pub mod utils;
pub mod workbook;

pub use area::Area;
pub use builder::{AreaBuilder, CommandMarkup, CommandRegistry, parse_markup};
pub use command::{
    CellRefGenerator, Command, CommandData, Direction, EachCommand, IfCommand,
    MergeCellsCommand, SortOrder,
};
pub use config::{CliArgs, OverlapPolicy, RenderConfig};
pub use context::{Context, ContextConfig, VarMap, VarScope};
pub use error::{ErrorCode, Result, TemplateError};
pub use expression::{ExpressionEvaluator, JsonExpressionEvaluator};
pub use grid::{AreaRef, CellRef, Size};
pub use logging::{LoggingConfig, init_logging};
pub use render::{AreaSummary, RenderSummary, TemplateRenderer};
pub use transform::{CellComment, CellValue, MemoryGrid, Transformer};
pub use workbook::XlsxTransformer;

use anyhow::Context as _;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Renders the configured template against its data file and saves the result.
pub fn run(config: &RenderConfig) -> anyhow::Result<RenderSummary> {
    let template = config.template.display().to_string();
    let span = logging::render_span(&template);
    let _enter = span.enter();

    let vars = match config.data.as_deref() {
        Some(path) => load_data(path)?,
        None => VarMap::new(),
    };
    let mut context = Context::from_vars(vars).with_config(ContextConfig {
        overlap_policy: config.overlap_policy,
    });

    let mut workbook = XlsxTransformer::open(&config.template)?;
    let renderer = TemplateRenderer::from_transformer(&AreaBuilder::new(), &workbook)?;
    if renderer.areas().is_empty() {
        tracing::warn!(template = %template, "template has no areas; writing it unchanged");
    }
    let summary = renderer.render(&mut context, &mut workbook)?;
    workbook.save(&config.output)?;

    tracing::info!(
        output = %config.output.display(),
        areas = summary.areas.len(),
        "template rendered"
    );
    Ok(summary)
}

/// Reads a JSON or YAML document whose top-level object keys become template variables.
pub fn load_data(path: &Path) -> anyhow::Result<VarMap> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read data file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let value: Value = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML data {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON data {:?}", path))?,
        other => anyhow::bail!("unsupported data extension: {other}"),
    };

    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => anyhow::bail!(
            "data file {:?} must contain an object at the top level, found {}",
            path,
            json_kind(&other)
        ),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
