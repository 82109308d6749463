use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const TEMPLATE: &str = "<html><body>\n<!-- STATIONS:BEGIN -->\n<!-- STATIONS:END -->\n</body></html>\n";

struct TestEnv {
    tmp: TempDir,
    config: PathBuf,
}

impl TestEnv {
    fn new() -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let root = tmp.path();
        let config = root.join("config.toml");

        fs::write(
            &config,
            format!(
                r#"
[source]
retry_delay_ms = 0
politeness_delay_ms = 0

[paths]
snapshot = "{snapshot}"
template = "{template}"
output = "{output}"
mirror = "{mirror}"

[render]
utc_offset_minutes = 60

[[stations]]
code = "XJ"
name = "GIRONA"
display_name = "GIRONA"

[[stations]]
code = "VK"
name = "LLEIDA"
display_name = "LLEIDA - RAIMAT"
"#,
                snapshot = toml_path(&root.join("data/latest_weather.json")),
                template = toml_path(&root.join("template.html")),
                output = toml_path(&root.join("out/banner_output.html")),
                mirror = toml_path(&root.join("docs/index.html")),
            ),
        )
        .expect("write config");

        Self { tmp, config }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.tmp.path().join(rel)
    }

    fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("banner");
        cmd.current_dir(self.tmp.path())
            .env("RUST_LOG", "info")
            .arg("--config")
            .arg(&self.config);
        cmd
    }

    fn write_template(&self) {
        fs::write(self.path("template.html"), TEMPLATE).expect("write template");
    }

    fn write_snapshot(&self) {
        let snapshot = json!({
            "metadata": {
                "last_updated": "2026-10-19T09:00:00Z",
                "source": "meteocat_web_scraping",
                "stations_count": 2
            },
            "stations": {
                "XJ": {
                    "success": true,
                    "values": { "TX": 11.8, "TN": 3.5, "PPT": 0.6 },
                    "metadata": {
                        "name": "GIRONA",
                        "last_fetched": "2026-10-19T09:00:00Z",
                        "url": "https://www.meteo.cat/observacions/xema/dades?codi=XJ"
                    }
                },
                "VK": {
                    "success": false,
                    "values": { "TX": "-", "TN": "-", "PPT": "-" },
                    "metadata": {
                        "name": "LLEIDA - RAIMAT",
                        "last_fetched": "2026-10-19T09:00:02Z",
                        "url": "https://www.meteo.cat/observacions/xema/dades?codi=VK",
                        "error": "No recognizable TX/TN/PPT values in page"
                    }
                }
            }
        });
        let path = self.path("data/latest_weather.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string_pretty(&snapshot).unwrap()).unwrap();
    }
}

fn toml_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

#[test]
fn stations_lists_configured_order() {
    let env = TestEnv::new();

    env.cmd()
        .arg("stations")
        .assert()
        .success()
        .stdout(predicate::str::contains("Stations: 2"))
        .stdout(predicate::str::contains(" 1. XJ - GIRONA"))
        .stdout(predicate::str::contains(" 2. VK - LLEIDA - RAIMAT"));
}

#[test]
fn render_writes_output_and_mirror() {
    let env = TestEnv::new();
    env.write_template();
    env.write_snapshot();

    env.cmd().arg("render").assert().success();

    let html = fs::read_to_string(env.path("out/banner_output.html")).unwrap();
    assert!(html.contains("11.8°C"));
    assert!(html.contains("3.5°C"));
    assert!(html.contains("0.6mm"));
    assert!(html.contains("LLEIDA - RAIMAT"));
    assert_eq!(html, fs::read_to_string(env.path("docs/index.html")).unwrap());
}

#[test]
fn render_without_template_fails() {
    let env = TestEnv::new();
    env.write_snapshot();

    env.cmd()
        .arg("render")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Template not found"));

    assert!(!env.path("out/banner_output.html").exists());
}

#[test]
fn render_without_snapshot_needs_flag() {
    let env = TestEnv::new();
    env.write_template();

    env.cmd().arg("render").assert().failure();
    assert!(!env.path("out/banner_output.html").exists());

    env.cmd().args(["render", "--allow-missing-snapshot"]).assert().success();
    let html = fs::read_to_string(env.path("out/banner_output.html")).unwrap();
    assert!(html.contains("Sense dades disponibles"));
}

#[test]
fn run_reports_render_status() {
    let env = TestEnv::new();
    env.write_template();
    env.write_snapshot();

    env.cmd()
        .arg("run")
        .assert()
        .success()
        .stderr(predicate::str::contains("Stage 'render' finished successfully"));
    assert!(env.path("out/banner_output.html").exists());

    fs::remove_file(env.path("template.html")).unwrap();
    env.cmd()
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Stage 'render' failed"));
}

#[test]
fn invalid_config_is_rejected() {
    let env = TestEnv::new();
    fs::write(&env.config, "[[stations]]\ncode = \"XJ\"\nname = \"GIRONA\"\n").unwrap();

    env.cmd()
        .arg("stations")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[test]
fn configure_force_writes_defaults_and_template() {
    let env = TestEnv::new();
    let config = env.path("fresh/config.toml");

    let mut cmd = cargo_bin_cmd!("banner");
    cmd.current_dir(env.path(""))
        .arg("--config")
        .arg(&config)
        .args(["configure", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config written to"));

    let text = fs::read_to_string(&config).unwrap();
    assert!(text.contains("code = \"XJ\""));
    assert!(env.path("banner_template.html").exists());

    let mut cmd = cargo_bin_cmd!("banner");
    cmd.arg("--config")
        .arg(&config)
        .arg("stations")
        .assert()
        .success()
        .stdout(predicate::str::contains("Stations: 25"));
}

#[test]
fn missing_explicit_config_is_rejected() {
    let env = TestEnv::new();
    env.write_template();
    env.write_snapshot();

    let mut cmd = cargo_bin_cmd!("banner");
    cmd.current_dir(env.path(""))
        .arg("--config")
        .arg(env.path("typo.toml"))
        .arg("render")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));

    assert!(!env.path("banner_output.html").exists());
    assert!(!env.path("docs/index.html").exists());
}

#[test]
fn log_file_receives_stage_logs() {
    let env = TestEnv::new();
    env.write_template();
    env.write_snapshot();
    let log = env.path("logs/banner.log");

    env.cmd()
        .arg("--log-file")
        .arg(&log)
        .arg("run")
        .assert()
        .success()
        .stderr(predicate::str::contains("Stage 'render' finished successfully"));

    let text = fs::read_to_string(&log).unwrap();
    assert!(text.contains("Stage 'render' finished successfully"));
    assert!(text.contains("Banner written"), "child stage logs land in the same file: {text}");
}
