use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const TEMPLATE_EXTENSIONS: &[&str] = &["xlsx", "xlsm"];
const OUTPUT_SUFFIX: &str = "out";

/// What to do when a custom cell-ref generator places a step over an earlier one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    #[default]
    Ignore,
    Warn,
    Fail,
}

impl std::fmt::Display for OverlapPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverlapPolicy::Ignore => write!(f, "ignore"),
            OverlapPolicy::Warn => write!(f, "warn"),
            OverlapPolicy::Fail => write!(f, "fail"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub template: PathBuf,
    pub data: Option<PathBuf>,
    pub output: PathBuf,
    pub overlap_policy: OverlapPolicy,
}

impl RenderConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            template: cli_template,
            data: cli_data,
            output: cli_output,
            overlap_policy: cli_overlap_policy,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            template: file_template,
            data: file_data,
            output: file_output,
            overlap_policy: file_overlap_policy,
        } = file_config;

        let template = cli_template
            .or(file_template)
            .context("no template workbook configured (use --template)")?;

        anyhow::ensure!(
            template.exists(),
            "template workbook {:?} does not exist",
            template
        );
        anyhow::ensure!(
            template.is_file(),
            "template workbook {:?} is not a file",
            template
        );
        let allowed = template
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .map(|ext| TEMPLATE_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false);
        anyhow::ensure!(
            allowed,
            "template workbook {:?} does not match allowed extensions {:?}",
            template,
            TEMPLATE_EXTENSIONS
        );

        let data = cli_data.or(file_data);
        if let Some(data_path) = data.as_ref() {
            anyhow::ensure!(
                data_path.is_file(),
                "data file {:?} does not exist or is not a file",
                data_path
            );
        }

        let output = cli_output
            .or(file_output)
            .unwrap_or_else(|| default_output_path(&template));
        anyhow::ensure!(
            output != template,
            "output path {:?} would overwrite the template",
            output
        );

        let overlap_policy = cli_overlap_policy
            .or(file_overlap_policy)
            .unwrap_or_default();

        Ok(Self {
            template,
            data,
            output,
            overlap_policy,
        })
    }
}

/// `reports/template.xlsx` renders to `reports/template.out.xlsx`.
pub fn default_output_path(template: &Path) -> PathBuf {
    let stem = template
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("template");
    let ext = template
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("xlsx");
    template.with_file_name(format!("{stem}.{OUTPUT_SUFFIX}.{ext}"))
}

#[derive(Parser, Debug, Default, Clone)]
#[command(
    name = "spreadsheet-template",
    about = "Render an annotated spreadsheet template against a data set",
    version
)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "SPREADSHEET_TEMPLATE_TEMPLATE",
        value_name = "FILE",
        help = "Template workbook carrying jx: command markup in cell comments"
    )]
    pub template: Option<PathBuf>,

    #[arg(
        long,
        env = "SPREADSHEET_TEMPLATE_DATA",
        value_name = "FILE",
        help = "JSON or YAML object whose top-level keys become template variables"
    )]
    pub data: Option<PathBuf>,

    #[arg(
        long,
        env = "SPREADSHEET_TEMPLATE_OUTPUT",
        value_name = "FILE",
        help = "Where to write the rendered workbook (default: <template>.out.xlsx)"
    )]
    pub output: Option<PathBuf>,

    #[arg(
        long,
        env = "SPREADSHEET_TEMPLATE_OVERLAP_POLICY",
        value_enum,
        value_name = "POLICY",
        help = "Handling of overlapping steps placed by custom generators"
    )]
    pub overlap_policy: Option<OverlapPolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    template: Option<PathBuf>,
    data: Option<PathBuf>,
    output: Option<PathBuf>,
    overlap_policy: Option<OverlapPolicy>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_sits_beside_template() {
        assert_eq!(
            default_output_path(Path::new("reports/payroll.xlsx")),
            PathBuf::from("reports/payroll.out.xlsx")
        );
    }

    #[test]
    fn test_overlap_policy_display_matches_serde() {
        for policy in [OverlapPolicy::Ignore, OverlapPolicy::Warn, OverlapPolicy::Fail] {
            let json = serde_json::to_string(&policy).unwrap();
            assert_eq!(json, format!("\"{policy}\""));
        }
        assert_eq!(OverlapPolicy::default(), OverlapPolicy::Ignore);
    }

    #[test]
    fn test_missing_template_is_rejected() {
        let err = RenderConfig::from_args(CliArgs::default()).unwrap_err();
        assert!(err.to_string().contains("no template workbook"));
    }
}
