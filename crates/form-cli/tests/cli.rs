use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use serde_json::{Value, json};

fn schema() -> Value {
    json!({
        "name": "signup", "title": "Signup", "path": "signup",
        "components": [
            { "type": "textfield", "key": "name", "label": "Name", "input": true, "validate": { "required": true } },
            { "type": "checkbox", "key": "newsletter", "input": true },
            { "type": "email", "key": "email", "input": true,
              "conditional": { "show": true, "when": "newsletter", "eq": "true" } }
        ]
    })
}

fn write(dir: &TempDir, name: &str, value: &Value) -> std::path::PathBuf {
    let file = dir.child(name);
    file.write_str(&value.to_string()).unwrap();
    file.path().to_path_buf()
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn validate_valid_submission() {
    let dir = TempDir::new().unwrap();
    let schema = write(&dir, "schema.json", &schema());
    let submission = write(&dir, "submission.json", &json!({ "data": { "name": "Ada" } }));

    let output = Command::cargo_bin("form-check")
        .unwrap()
        .args(["validate", "--schema"])
        .arg(&schema)
        .arg("--submission")
        .arg(&submission)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("valid"));
}

#[test]
fn validate_reports_issues_as_json_and_fails() {
    let dir = TempDir::new().unwrap();
    let schema = write(&dir, "schema.json", &schema());
    let submission = write(
        &dir,
        "submission.json",
        &json!({ "data": { "newsletter": true, "email": "nope" } }),
    );

    let output = Command::cargo_bin("form-check")
        .unwrap()
        .args(["validate", "--format", "json", "--user", "u-7", "--role", "editor", "--schema"])
        .arg(&schema)
        .arg("--submission")
        .arg(&submission)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert_eq!(
        stdout_json(&output),
        json!([
            { "message": "Name is required", "type": "any.required", "path": ["name"] },
            { "message": "email must be a valid email.", "type": "string.email", "path": ["email"] }
        ])
    );
}

#[test]
fn validate_without_data_reports_single_issue() {
    let dir = TempDir::new().unwrap();
    let schema = write(&dir, "schema.json", &schema());
    let submission = write(&dir, "submission.json", &json!({}));

    let output = Command::cargo_bin("form-check")
        .unwrap()
        .args(["validate", "--format", "json", "--schema"])
        .arg(&schema)
        .arg("--submission")
        .arg(&submission)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let issues = stdout_json(&output);
    assert_eq!(issues.as_array().map(Vec::len), Some(1));
    assert_eq!(issues[0]["type"], "required");
    assert_eq!(issues[0]["path"], json!(["data"]));
}

#[test]
fn config_can_drop_hidden_issues() {
    let dir = TempDir::new().unwrap();
    let schema = write(
        &dir,
        "schema.json",
        &json!({
            "name": "f", "title": "f", "path": "f",
            "components": [
                { "type": "textfield", "key": "a", "input": true, "validate": { "required": true },
                  "customConditional": "show = false" }
            ]
        }),
    );
    let submission = write(&dir, "submission.json", &json!({ "data": {} }));
    let config = write(&dir, "config.json", &json!({ "dropHiddenIssues": true }));

    Command::cargo_bin("form-check")
        .unwrap()
        .args(["validate", "--schema"])
        .arg(&schema)
        .arg("--submission")
        .arg(&submission)
        .arg("--config")
        .arg(&config)
        .assert()
        .success();
}

#[test]
fn check_schema_flags_duplicate_keys() {
    let dir = TempDir::new().unwrap();
    let schema = write(
        &dir,
        "schema.json",
        &json!({
            "name": "A", "title": "A", "path": "A",
            "components": [{ "input": true, "key": "A" }, { "input": true, "key": "A" }]
        }),
    );

    let output = Command::cargo_bin("form-check")
        .unwrap()
        .args(["check-schema", "--format", "json", "--schema"])
        .arg(&schema)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert_eq!(
        stdout_json(&output),
        json!([{ "message": "Component keys must be unique: A", "type": "unique component keys", "path": ["A"] }])
    );
}

#[test]
fn visibility_prints_map() {
    let dir = TempDir::new().unwrap();
    let schema = write(&dir, "schema.json", &schema());
    let data = write(&dir, "data.json", &json!({ "newsletter": false }));

    let output = Command::cargo_bin("form-check")
        .unwrap()
        .args(["visibility", "--schema"])
        .arg(&schema)
        .arg("--data")
        .arg(&data)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        stdout_json(&output),
        json!({ "email": false, "name": true, "newsletter": true })
    );
}

#[test]
fn issues_schema_is_printed() {
    let output = Command::cargo_bin("form-check")
        .unwrap()
        .arg("issues-schema")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["type"], "array");
}

#[test]
fn missing_file_is_an_error() {
    Command::cargo_bin("form-check")
        .unwrap()
        .args(["check-schema", "--schema", "/nonexistent/schema.json"])
        .assert()
        .failure();
}
