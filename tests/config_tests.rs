mod support;

use spreadsheet_template::{CliArgs, OverlapPolicy, RenderConfig, load_data};
use support::TestWorkspace;

fn template(workspace: &TestWorkspace) -> std::path::PathBuf {
    workspace.create_workbook("report.xlsx", |_| {})
}

#[test]
fn cli_values_override_config_file() {
    let workspace = TestWorkspace::new();
    let template = template(&workspace);
    let config_path = workspace.write_file(
        "render.yaml",
        &format!(
            "template: {}\noutput: {}\noverlap_policy: fail\n",
            template.display(),
            workspace.path("from-file.xlsx").display()
        ),
    );

    let config = RenderConfig::from_args(CliArgs {
        config: Some(config_path),
        output: Some(workspace.path("from-cli.xlsx")),
        ..CliArgs::default()
    })
    .unwrap();

    assert_eq!(config.template, template);
    assert_eq!(config.output, workspace.path("from-cli.xlsx"));
    assert_eq!(config.overlap_policy, OverlapPolicy::Fail);
    assert!(config.data.is_none());
}

#[test]
fn output_defaults_beside_template() {
    let workspace = TestWorkspace::new();
    let config = RenderConfig::from_args(CliArgs {
        template: Some(template(&workspace)),
        ..CliArgs::default()
    })
    .unwrap();

    assert_eq!(config.output, workspace.path("report.out.xlsx"));
    assert_eq!(config.overlap_policy, OverlapPolicy::Ignore);
}

#[test]
fn invalid_paths_are_rejected() {
    let workspace = TestWorkspace::new();
    let missing = RenderConfig::from_args(CliArgs {
        template: Some(workspace.path("nope.xlsx")),
        ..CliArgs::default()
    });
    assert!(missing.unwrap_err().to_string().contains("does not exist"));

    let text = workspace.write_file("notes.txt", "hello");
    let wrong_ext = RenderConfig::from_args(CliArgs {
        template: Some(text),
        ..CliArgs::default()
    });
    assert!(wrong_ext.unwrap_err().to_string().contains("allowed extensions"));

    let missing_data = RenderConfig::from_args(CliArgs {
        template: Some(template(&workspace)),
        data: Some(workspace.path("data.json")),
        ..CliArgs::default()
    });
    assert!(missing_data.is_err());
}

#[test]
fn unsupported_config_extension_is_rejected() {
    let workspace = TestWorkspace::new();
    let config_path = workspace.write_file("render.toml", "template = 'x'");
    let err = RenderConfig::from_args(CliArgs {
        config: Some(config_path),
        ..CliArgs::default()
    })
    .unwrap_err();
    assert!(err.to_string().contains("unsupported config extension"));
}

#[test]
fn data_file_must_be_an_object() {
    let workspace = TestWorkspace::new();
    let object = workspace.write_file("data.json", r#"{"b": 1, "a": [1, 2]}"#);
    let vars = load_data(&object).unwrap();
    assert_eq!(vars.len(), 2);
    assert_eq!(vars.get("b"), Some(&serde_json::json!(1)));

    let array = workspace.write_file("list.json", "[1, 2]");
    let err = load_data(&array).unwrap_err();
    assert!(err.to_string().contains("an array"));
}
