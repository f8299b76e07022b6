use cli_test_dir::*;
use std::{env, fs};

/// A BigQuery dataset to use for live tests, as `project.dataset`.
fn bq_test_dataset() -> String {
    env::var("BQ_TEST_DATASET").expect("BQ_TEST_DATASET must be set")
}

/// Point `bqscript` at a config directory inside `testdir`.
fn config_dir(testdir: &TestDir) -> String {
    testdir.path("config").display().to_string()
}

#[test]
fn help_flag() {
    let testdir = TestDir::new("bqscript", "help_flag");
    let output = testdir.cmd().arg("--help").expect_success();
    assert!(output.stdout_str().contains("bqscript"));
    assert!(output.stdout_str().contains("how-much"));
}

#[test]
fn version_flag() {
    let testdir = TestDir::new("bqscript", "version_flag");
    let output = testdir.cmd().arg("--version").expect_success();
    assert!(output.stdout_str().contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn run_help_flag() {
    let testdir = TestDir::new("bqscript", "run_help_flag");
    let output = testdir.cmd().args(["run", "--help"]).expect_success();
    assert!(output.stdout_str().contains("SCRIPT FORMAT:"));
    assert!(output.stdout_str().contains("--dry-run"));
}

#[test]
fn split_lists_statements() {
    let testdir = TestDir::new("bqscript", "split_lists_statements");
    let src = testdir.src_path("fixtures/example.sql");
    let output = testdir
        .cmd()
        .arg("split")
        .arg(&src)
        .expect_success();
    let stdout = output.stdout_str();
    assert!(stdout.contains("-- Statement 1: table daily_totals"));
    assert!(stdout.contains("-- Statement 2: table top_days"));
    assert!(!stdout.contains("Statement 3"));
    assert!(!stdout.contains("A note about"));
}

#[test]
fn split_applies_replacements_in_order() {
    let testdir = TestDir::new("bqscript", "split_applies_replacements_in_order");
    let src = testdir.src_path("fixtures/example.sql");
    let output = testdir
        .cmd()
        .arg("split")
        .arg(&src)
        .args([
            "--replace",
            "PROJECT.DATASET=staging.tmp",
            "--replace",
            "staging=my-proj",
        ])
        .expect_success();
    let stdout = output.stdout_str();
    assert!(stdout.contains("`my-proj.tmp.events`"));
    assert!(!stdout.contains("PROJECT"));
}

#[test]
fn split_reports_missing_target_table() {
    let testdir = TestDir::new("bqscript", "split_reports_missing_target_table");
    let src = testdir.src_path("fixtures/no_target.sql");
    let output = testdir.cmd().arg("split").arg(&src).expect_success();
    assert!(output.stdout_str().contains("(no target table)"));
}

#[test]
fn split_missing_file_fails() {
    let testdir = TestDir::new("bqscript", "split_missing_file_fails");
    testdir
        .cmd()
        .args(["split", "does_not_exist.sql"])
        .expect_failure();
}

#[test]
fn split_rejects_bad_replacement() {
    let testdir = TestDir::new("bqscript", "split_rejects_bad_replacement");
    let src = testdir.src_path("fixtures/example.sql");
    testdir
        .cmd()
        .arg("split")
        .arg(&src)
        .args(["--replace", "no-equals-sign"])
        .expect_failure();
}

#[test]
fn split_ignores_malformed_config() {
    let testdir = TestDir::new("bqscript", "split_ignores_malformed_config");
    let config_dir = config_dir(&testdir);
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(testdir.path("config/bqscript.toml"), "dataset = [unclosed\n").unwrap();
    let src = testdir.src_path("fixtures/example.sql");

    let output = testdir
        .cmd()
        .env("BQSCRIPT_CONFIG_DIR", &config_dir)
        .arg("split")
        .arg(&src)
        .expect_success();
    assert!(output.stdout_str().contains("-- Statement 1: table daily_totals"));

    testdir
        .cmd()
        .env("BQSCRIPT_CONFIG_DIR", &config_dir)
        .args(["config", "show"])
        .expect_failure();
}

#[test]
fn config_set_show_unset() {
    let testdir = TestDir::new("bqscript", "config_set_show_unset");
    let config_dir = config_dir(&testdir);

    testdir
        .cmd()
        .env("BQSCRIPT_CONFIG_DIR", &config_dir)
        .args(["config", "set", "dataset", "my-proj.analytics"])
        .expect_success();
    testdir
        .cmd()
        .env("BQSCRIPT_CONFIG_DIR", &config_dir)
        .args(["config", "set", "usd_per_tb", "6.25"])
        .expect_success();

    let output = testdir
        .cmd()
        .env("BQSCRIPT_CONFIG_DIR", &config_dir)
        .args(["config", "show"])
        .expect_success();
    assert!(output.stdout_str().contains(r#"dataset = "my-proj.analytics""#));
    assert!(output.stdout_str().contains("usd_per_tb = 6.25"));

    testdir
        .cmd()
        .env("BQSCRIPT_CONFIG_DIR", &config_dir)
        .args(["config", "unset", "usd_per_tb"])
        .expect_success();
    let written = fs::read_to_string(testdir.path("config/bqscript.toml")).unwrap();
    assert!(written.contains("dataset"));
    assert!(!written.contains("usd_per_tb"));
}

#[test]
fn config_rejects_unknown_keys_and_bad_values() {
    let testdir = TestDir::new("bqscript", "config_rejects_unknown_keys_and_bad_values");
    let config_dir = config_dir(&testdir);
    testdir
        .cmd()
        .env("BQSCRIPT_CONFIG_DIR", &config_dir)
        .args(["config", "set", "temporary", "gs://bucket/"])
        .expect_failure();
    testdir
        .cmd()
        .env("BQSCRIPT_CONFIG_DIR", &config_dir)
        .args(["config", "set", "dataset", "no_project"])
        .expect_failure();
    testdir
        .cmd()
        .env("BQSCRIPT_CONFIG_DIR", &config_dir)
        .args(["config", "set", "usd_per_tb", "free"])
        .expect_failure();
}

#[test]
#[ignore]
fn how_much_bigquery() {
    let testdir = TestDir::new("bqscript", "how_much_bigquery");
    let src = testdir.src_path("fixtures/example.sql");
    let dataset = bq_test_dataset();
    let output = testdir
        .cmd()
        .env("BQSCRIPT_CONFIG_DIR", config_dir(&testdir))
        .arg("how-much")
        .arg(&src)
        .args(["--dataset", &dataset])
        .args(["--replace", &format!("PROJECT.DATASET={}", dataset)])
        .tee_output()
        .expect_success();
    assert!(output.stdout_str().contains("These queries will process"));
}

#[test]
#[ignore]
fn run_bigquery() {
    let testdir = TestDir::new("bqscript", "run_bigquery");
    let src = testdir.src_path("fixtures/example.sql");
    let dataset = bq_test_dataset();

    // The first statement reads from `events`, so create it.
    testdir.create_file(
        "events.sql",
        "-- output: events\nselect date '2024-01-01' as day from unnest([1, 2, 3]);\n",
    );
    testdir
        .cmd()
        .env("BQSCRIPT_CONFIG_DIR", config_dir(&testdir))
        .args(["run", "events.sql", "--no-view", "--dataset", &dataset])
        .tee_output()
        .expect_success();

    let output = testdir
        .cmd()
        .env("BQSCRIPT_CONFIG_DIR", config_dir(&testdir))
        .arg("run")
        .arg(&src)
        .args(["--dataset", &dataset])
        .args(["--replace", &format!("PROJECT.DATASET={}", dataset)])
        .args(["--label", "purpose=bqscript-test"])
        .tee_output()
        .expect_success();
    let stdout = output.stdout_str();
    assert!(stdout.contains("Successfully created view at"));
    assert!(stdout.contains("daily_totals_view"));
    assert!(stdout.contains("Number of rows: 1"));
}
