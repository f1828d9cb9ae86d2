use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const CONFIG: &str = r#"
site:
  title: "Cookbook"
  url: "https://cookbook.example.com"
docs:
  path: docs
  route_base: docs
"#;

fn write_site(dir: &Path, intro: &str) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(dir.join("docs/guide"))?;
    fs::write(dir.join("pagewright.yml"), CONFIG)?;
    fs::write(dir.join("docs/intro.md"), intro)?;
    fs::write(
        dir.join("docs/guide/setup.md"),
        "# Setup\n\nInstall the toolchain before anything else.\n",
    )?;
    Ok(())
}

#[allow(deprecated)]
fn pagewright(dir: &Path) -> Result<Command, Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("pagewright")?;
    cmd.current_dir(dir).env_remove("PAGEWRIGHT_CONFIG");
    Ok(cmd)
}

#[test]
fn build_writes_core_artifacts() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write_site(dir.path(), "# Intro\n\nStart with [setup](./guide/setup.md).\n")?;

    pagewright(dir.path())?
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("Built 2 pages"));

    let build = dir.path().join("build");
    for file in ["search-index.json", "pages.json", "navigation.json", "link-graph.json"] {
        assert!(build.join(file).is_file(), "missing {}", file);
    }
    let pages: Value = serde_json::from_str(&fs::read_to_string(build.join("pages.json"))?)?;
    assert!(pages.to_string().contains("guide/setup"));
    Ok(())
}

#[test]
fn broken_link_fails_with_location() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write_site(dir.path(), "# Intro\n\nSee [nowhere](/docs/nowhere).\n")?;

    pagewright(dir.path())?
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("docs/intro.md:3"))
        .stderr(predicate::str::contains("[broken-link]"))
        .stderr(predicate::str::contains("/docs/nowhere"));

    assert!(!dir.path().join("build").exists());
    Ok(())
}

#[test]
fn policy_override_turns_failure_into_warning() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write_site(dir.path(), "# Intro\n\nSee [nowhere](/docs/nowhere).\n")?;

    pagewright(dir.path())?
        .args(["build", "--on-broken-links", "warn", "--out-dir", "public"])
        .assert()
        .success()
        .stderr(predicate::str::contains("warning [broken-link]"));

    assert!(dir.path().join("public/search-index.json").is_file());
    Ok(())
}

#[test]
fn verify_json_reports_counts() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write_site(dir.path(), "# Intro\n\nSee [nowhere](/docs/nowhere).\n")?;

    let assert = pagewright(dir.path())?
        .args(["verify", "--json", "--on-broken-links", "warn"])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    let start = stdout.find('{').expect("json object");
    let summary: Value = serde_json::from_str(&stdout[start..])?;
    assert_eq!(summary["pages"], 2);
    assert_eq!(summary["errors"], 0);
    assert_eq!(summary["warnings"], 1);
    assert_eq!(summary["diagnostics"][0]["code"], "broken-link");
    assert!(!dir.path().join("build").exists());
    Ok(())
}

#[test]
fn search_queries_built_index() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write_site(dir.path(), "# Intro\n\nWelcome.\n")?;

    pagewright(dir.path())?.arg("build").assert().success();

    let assert = pagewright(dir.path())?
        .args(["search", "toolchain", "--json", "--limit", "1"])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    let start = stdout.find('[').expect("json array");
    let value: Value = serde_json::from_str(&stdout[start..])?;
    let arr = value.as_array().expect("json array");
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["id"], "guide/setup");
    assert_eq!(arr[0]["url"], "/docs/guide/setup");
    Ok(())
}

#[test]
fn search_without_index_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write_site(dir.path(), "# Intro\n")?;

    pagewright(dir.path())?
        .args(["search", "anything"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Search index not found"));
    Ok(())
}

#[test]
fn missing_config_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;

    pagewright(dir.path())?
        .args(["--config", "absent.yml", "build"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
    Ok(())
}
