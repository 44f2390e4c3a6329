use std::path::Path;

use anyhow::Result;
use assert_cmd::Command;
use tempfile::tempdir;

fn bmi(data_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("bmi-ledger").expect("binary built");
    cmd.env("BMI_LEDGER_FAKE_APPDATA", data_dir)
        .env_remove("BMI_LEDGER_DB")
        .env("BMI_LEDGER_LOG", "off");
    cmd
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn calc_prints_category_and_bmi() -> Result<()> {
    let dir = tempdir()?;
    let output = bmi(dir.path())
        .args(["calc", "--height", "180", "--weight", "75"])
        .output()?;
    assert!(output.status.success());
    assert_eq!(stdout(&output), "Normal weight\nYour BMI is 23.15 kg/m²\n");
    assert!(!dir.path().join("bmi_ledger.sqlite3").exists());
    Ok(())
}

#[test]
fn calc_json_reports_fields() -> Result<()> {
    let dir = tempdir()?;
    let output = bmi(dir.path())
        .args(["calc", "--height", "160", "--weight", "90", "--json"])
        .output()?;
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value["bmi"], 35.16);
    assert_eq!(value["category"], "obese");
    Ok(())
}

#[test]
fn bad_input_exits_with_code_two() -> Result<()> {
    let dir = tempdir()?;
    let output = bmi(dir.path())
        .args(["calc", "--height", "-5", "--weight", "70"])
        .output()?;
    assert_eq!(output.status.code(), Some(2));
    assert!(stdout(&output).is_empty());
    assert!(stderr(&output).contains("Input Error: The height must be greater than 0 and at most 300."));

    let output = bmi(dir.path())
        .args(["calc", "--height", "180", "--weight", "heavy"])
        .output()?;
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("Input Error: Please enter a valid number for weight."));
    Ok(())
}

#[test]
fn save_then_history() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("data").join("ledger.sqlite3");
    let db_arg = db.to_str().unwrap();

    let output = bmi(dir.path())
        .args(["--db", db_arg, "save", "--name", "John Doe", "--height", "180", "--weight", "75"])
        .output()?;
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Your BMI is 23.15 kg/m²"));
    assert!(out.contains("Saved record #1 for John Doe."));
    assert!(db.exists());

    let output = bmi(dir.path())
        .args(["history", "--name", "john doe", "--db", db_arg])
        .output()?;
    assert!(output.status.success());
    let out = stdout(&output);
    let mut lines = out.lines();
    let header = lines.next().unwrap_or_default();
    assert!(header.starts_with("Record Time"));
    assert!(header.ends_with("Category"));
    let row = lines.next().unwrap_or_default();
    assert!(row.contains("180"));
    assert!(row.contains("23.15"));
    assert!(row.ends_with("Normal weight"));
    assert!(lines.next().is_none());

    let output = bmi(dir.path())
        .args(["--db", db_arg, "history", "--name", "John Doe", "--json"])
        .output()?;
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(rows.as_array().map(Vec::len), Some(1));
    assert_eq!(rows[0]["weight_kg"], 75.0);
    Ok(())
}

#[test]
fn history_for_unknown_subject_is_empty() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("ledger.sqlite3");
    let output = bmi(dir.path())
        .args(["--db", db.to_str().unwrap(), "history", "--name", "Nobody"])
        .output()?;
    assert!(output.status.success());
    assert_eq!(stdout(&output), "No records for Nobody.\n");
    Ok(())
}

#[test]
fn save_rejects_invalid_name() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("ledger.sqlite3");
    let output = bmi(dir.path())
        .args(["--db", db.to_str().unwrap(), "save", "--name", "John_Doe!", "--height", "180", "--weight", "75"])
        .output()?;
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).starts_with("Input Error:"));

    let output = bmi(dir.path())
        .args(["--db", db.to_str().unwrap(), "subjects"])
        .output()?;
    assert_eq!(stdout(&output), "No subjects yet.\n");
    Ok(())
}

#[test]
fn default_database_lives_in_data_dir() -> Result<()> {
    let dir = tempdir()?;
    let output = bmi(dir.path())
        .args(["save", "--name", "Ann", "--height", "165", "--weight", "60"])
        .output()?;
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(dir.path().join("bmi_ledger.sqlite3").exists());
    assert!(dir.path().join("logs").is_dir());
    Ok(())
}

fn bytes_under(dir: &Path) -> u64 {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok()?.metadata().ok())
                .filter(|meta| meta.is_file())
                .map(|meta| meta.len())
                .sum()
        })
        .unwrap_or(0)
}

#[test]
fn db_flag_only_moves_the_database() -> Result<()> {
    let appdata = tempdir()?;
    let elsewhere = tempdir()?;
    let db = elsewhere.path().join("ledger.sqlite3");

    let output = bmi(appdata.path())
        .args(["--db", db.to_str().unwrap(), "save", "--name", "Ann", "--height", "165", "--weight", "60"])
        .output()?;
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(db.exists());
    assert!(!elsewhere.path().join("logs").exists());
    assert!(!appdata.path().join("bmi_ledger.sqlite3").exists());

    // BMI_LEDGER_LOG=off silences the file sink too.
    let logs = appdata.path().join("logs");
    assert!(logs.is_dir());
    assert_eq!(bytes_under(&logs), 0);
    Ok(())
}

#[test]
fn vanishing_height_is_an_input_error() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("ledger.sqlite3");
    let output = bmi(dir.path())
        .args(["calc", "--height", "1e-200", "--weight", "70", "--json"])
        .output()?;
    assert_eq!(output.status.code(), Some(2));
    assert!(stdout(&output).is_empty());
    assert!(stderr(&output).contains("Input Error: The height is too small to compute a BMI."));

    let output = bmi(dir.path())
        .args(["--db", db.to_str().unwrap(), "save", "--name", "Tiny", "--height", "1e-200", "--weight", "70"])
        .output()?;
    assert_eq!(output.status.code(), Some(2));

    let output = bmi(dir.path())
        .args(["--db", db.to_str().unwrap(), "history", "--name", "Tiny"])
        .output()?;
    assert_eq!(stdout(&output), "No records for Tiny.\n");
    Ok(())
}

#[test]
fn interactive_session_calculates_and_saves() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("ledger.sqlite3");
    let script = "save\nname Jane Roe\nheight 160\nweight 90\ncalculate\nsave\nweight 80\nsave\nhistory\nquit\n";

    let output = bmi(dir.path())
        .args(["--db", db.to_str().unwrap()])
        .write_stdin(script)
        .output()?;
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("Input Error: Please calculate your BMI before saving."));
    assert!(out.contains("Obese\nYour BMI is 35.16 kg/m²"));
    assert!(out.contains("Saved record #1 for Jane Roe."));
    // Changing the weight drops the previous result.
    assert_eq!(out.matches("Please calculate your BMI before saving.").count(), 2);
    assert!(out.contains("35.16"));
    Ok(())
}
