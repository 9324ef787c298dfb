//! Integration tests for the ragflow CLI

use assert_cmd::Command;
use predicates::prelude::*;

const MANDATORY_VARS: [&str; 3] = [
    "AZURE_SUBSCRIPTION_ID",
    "AZURE_RESOURCE_GROUP",
    "AZUREAI_PROJECT_NAME",
];

fn ragflow_cmd() -> Command {
    let mut cmd = Command::cargo_bin("ragflow").unwrap();
    for var in MANDATORY_VARS {
        cmd.env_remove(var);
    }
    cmd
}

/// Command with enough environment to resolve config without any network
fn configured_cmd() -> Command {
    let mut cmd = Command::cargo_bin("ragflow").unwrap();
    cmd.env("AZURE_SUBSCRIPTION_ID", "sub-test")
        .env("AZURE_RESOURCE_GROUP", "rg-test")
        .env("AZUREAI_PROJECT_NAME", "proj-test")
        .env("AZURE_OPENAI_ENDPOINT", "https://aoai.openai.azure.com")
        .env("AZURE_SEARCH_ENDPOINT", "https://idx.search.windows.net")
        .env("AZURE_OPENAI_API_KEY", "test-key")
        .env("AZURE_ACCESS_TOKEN", "test-token");
    cmd
}

#[test]
fn help_lists_subcommands() {
    ragflow_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("eval"))
        .stdout(predicate::str::contains("deploy"));
}

#[test]
fn chat_help_shows_default_question() {
    ragflow_cmd()
        .args(["chat", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("telehealth"));
}

#[test]
fn missing_mandatory_vars_fail_fast_and_are_named() {
    ragflow_cmd()
        .arg("chat")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("AZURE_SUBSCRIPTION_ID"))
        .stderr(predicate::str::contains("AZURE_RESOURCE_GROUP"))
        .stderr(predicate::str::contains("AZUREAI_PROJECT_NAME"));
}

#[test]
fn eval_reports_unreadable_dataset() {
    configured_cmd()
        .args(["eval", "--data", "does-not-exist.jsonl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read dataset"));
}

#[test]
fn chat_rejects_unreadable_template() {
    configured_cmd()
        .args(["chat", "--template", "missing-template.yaml", "hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read template"));
}
