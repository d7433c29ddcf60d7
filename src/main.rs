use clap::Parser;
use spreadsheet_template::{
    CliArgs, LoggingConfig, RenderConfig, TemplateError, init_logging, run,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    let logging_config = LoggingConfig::from_env();
    let _guard = match init_logging(logging_config) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let cli = CliArgs::parse();
    let result = RenderConfig::from_args(cli).and_then(|config| run(&config));

    match result {
        Ok(summary) => match serde_json::to_string_pretty(&summary) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("error: failed to serialize summary: {err}");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "render failed");
            eprintln!("error: {err:#}");
            // engine failures exit with their stable error code
            match err.downcast_ref::<TemplateError>() {
                Some(template_error) => ExitCode::from(template_error.code().code() as u8),
                None => ExitCode::FAILURE,
            }
        }
    }
}
