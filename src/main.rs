use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;

use bmi_ledger_lib::controller::{calculate_text, HISTORY_HEADERS};
use bmi_ledger_lib::util::dispatch_async_app_result;
use bmi_ledger_lib::{
    AppError, AppResult, CalculationResult, Config, Controller, HistoryRow, RecordStore,
    SubjectSummary, UiMessage,
};

const EXIT_INPUT_ERROR: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "bmi-ledger", about = "BMI calculator with per-subject history", version)]
struct Cli {
    /// Use this database file instead of the per-user default.
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compute BMI without saving anything.
    Calc {
        /// Height in centimetres.
        #[arg(long, allow_hyphen_values = true)]
        height: String,
        /// Weight in kilograms.
        #[arg(long, allow_hyphen_values = true)]
        weight: String,
        #[arg(long)]
        json: bool,
    },
    /// Compute BMI and store it under a subject name.
    Save {
        #[arg(long)]
        name: String,
        #[arg(long, allow_hyphen_values = true)]
        height: String,
        #[arg(long, allow_hyphen_values = true)]
        weight: String,
    },
    /// Show the saved records for a subject, oldest first.
    History {
        #[arg(long)]
        name: String,
        /// Emit JSON instead of the table view.
        #[arg(long)]
        json: bool,
    },
    /// List every subject with saved records.
    Subjects {
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => match &cli.db {
            Some(path) => config.with_db_override(path),
            None => config,
        },
        Err(err) => {
            bmi_ledger_lib::init_logging();
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    };

    let _log_guard = match bmi_ledger_lib::init_file_logging(&config) {
        Ok(guard) => Some(guard),
        Err(err) => {
            bmi_ledger_lib::init_logging();
            tracing::warn!(target: "bmi_ledger", event = "file_logging_unavailable", error = %err);
            None
        }
    };
    tracing::debug!(target: "bmi_ledger", event = "app_booted");

    let code = match run(cli.command, &config) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            1
        }
    };
    drop(_log_guard);
    process::exit(code);
}

fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("start async runtime")
}

fn run(command: Option<Commands>, config: &Config) -> Result<i32> {
    match command {
        // Pure arithmetic: never touch the database.
        Some(Commands::Calc {
            height,
            weight,
            json,
        }) => Ok(match calculate_text(&height, &weight) {
            Ok(result) => {
                print_calculation(&result, json)?;
                0
            }
            Err(err) => show_error(&err),
        }),
        Some(Commands::Save {
            name,
            height,
            weight,
        }) => with_controller(config, |rt, controller| {
            let outcome = rt.block_on(async {
                let result = controller.calculate(&height, &weight)?;
                let stored = controller.save(&name, &result).await?;
                AppResult::Ok((result, stored))
            });
            Ok(match outcome {
                Ok((result, stored)) => {
                    println!("{}", result.summary());
                    println!("Saved record #{} for {}.", stored.id, stored.subject_name);
                    0
                }
                Err(err) => show_error(&err),
            })
        }),
        Some(Commands::History { name, json }) => with_controller(config, |rt, controller| {
            Ok(match rt.block_on(controller.history(&name)) {
                Ok(rows) => {
                    if json {
                        print_json(&rows)?;
                    } else {
                        print_history(&name, &rows);
                    }
                    0
                }
                Err(err) => show_error(&err),
            })
        }),
        Some(Commands::Subjects { json }) => with_controller(config, |rt, controller| {
            Ok(match rt.block_on(controller.subjects()) {
                Ok(subjects) => {
                    if json {
                        print_json(&subjects)?;
                    } else {
                        print_subjects(&subjects);
                    }
                    0
                }
                Err(err) => show_error(&err),
            })
        }),
        None => with_controller(config, interactive),
    }
}

/// Open the record store and hand it to `action`. A store that cannot be
/// opened is reported like any other storage error.
fn with_controller<F>(config: &Config, action: F) -> Result<i32>
where
    F: FnOnce(&Runtime, &Controller) -> Result<i32>,
{
    let rt = runtime()?;
    match rt.block_on(RecordStore::open(config)) {
        Ok(store) => action(&rt, &Controller::new(store)),
        Err(err) => Ok(show_error(&AppError::from(err))),
    }
}

fn show_error(err: &AppError) -> i32 {
    eprintln!("{}", UiMessage::from(err));
    if err.is_input() {
        EXIT_INPUT_ERROR
    } else {
        1
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{json}");
    Ok(())
}

fn print_calculation(result: &CalculationResult, json: bool) -> Result<()> {
    if json {
        print_json(result.calculation())
    } else {
        println!("{}", result.summary());
        Ok(())
    }
}

fn print_history(name: &str, rows: &[HistoryRow]) {
    if rows.is_empty() {
        println!("No records for {}.", name.trim());
        return;
    }
    println!(
        "{:<19}  {:>8}  {:>8}  {:>6}  {}",
        HISTORY_HEADERS[0], HISTORY_HEADERS[1], HISTORY_HEADERS[2], HISTORY_HEADERS[3], HISTORY_HEADERS[4]
    );
    for row in rows {
        let [time, height, weight, bmi, category] = row.cells();
        println!("{time:<19}  {height:>8}  {weight:>8}  {bmi:>6}  {category}");
    }
}

fn print_subjects(subjects: &[SubjectSummary]) {
    if subjects.is_empty() {
        println!("No subjects yet.");
        return;
    }
    println!("{:<24} {:>7}  Name", "Key", "Records");
    for subject in subjects {
        println!(
            "{:<24} {:>7}  {}",
            subject.key,
            subject.observations,
            subject.display_name.as_deref().unwrap_or("-")
        );
    }
}

const INTERACTIVE_HELP: &str = "Commands: name <text>, height <cm>, weight <kg>, calculate, save, history, help, quit";

/// Form state for the prompt loop. Editing height or weight drops the last
/// result, so a save always matches what is on screen.
#[derive(Default)]
struct Form {
    name: String,
    height: String,
    weight: String,
    result: Option<CalculationResult>,
}

fn interactive(rt: &Runtime, controller: &Controller) -> Result<i32> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut form = Form::default();

    println!("BMI Calculator");
    println!("{INTERACTIVE_HELP}");

    loop {
        print!("> ");
        stdout.flush().context("flush prompt")?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("read input")? == 0 {
            break;
        }
        let line = line.trim();
        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };

        match command.to_ascii_lowercase().as_str() {
            "" => {}
            "quit" | "exit" => break,
            "help" => println!("{INTERACTIVE_HELP}"),
            "name" => form.name = arg.to_string(),
            "height" => {
                form.height = arg.to_string();
                form.result = None;
            }
            "weight" => {
                form.weight = arg.to_string();
                form.result = None;
            }
            "calculate" => match controller.calculate(&form.height, &form.weight) {
                Ok(result) => {
                    println!("{}", result.summary());
                    form.result = Some(result);
                }
                Err(err) => println!("{}", UiMessage::from(&err)),
            },
            "save" => {
                let Some(result) = form.result else {
                    let err = AppError::new(
                        "INPUT/NOT_CALCULATED",
                        "Please calculate your BMI before saving.",
                    );
                    println!("{}", UiMessage::from(&err));
                    continue;
                };
                let name = form.name.clone();
                let outcome = rt.block_on(dispatch_async_app_result(|| async move {
                    controller.save(&name, &result).await
                }));
                match outcome {
                    Ok(stored) => println!("Saved record #{} for {}.", stored.id, stored.subject_name),
                    Err(err) => println!("{}", UiMessage::from(&err)),
                }
            }
            "history" => {
                let name = if arg.is_empty() { form.name.clone() } else { arg.to_string() };
                let outcome = rt.block_on(dispatch_async_app_result(|| controller.history(&name)));
                match outcome {
                    Ok(rows) => print_history(&name, &rows),
                    Err(err) => println!("{}", UiMessage::from(&err)),
                }
            }
            other => println!("Unknown command `{other}`. {INTERACTIVE_HELP}"),
        }
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn db_flag_is_accepted_after_subcommand() {
        let cli = Cli::try_parse_from(["bmi-ledger", "history", "--name", "Ann", "--db", "x.sqlite3"])
            .expect("parse");
        assert_eq!(cli.db, Some(PathBuf::from("x.sqlite3")));
        assert!(matches!(cli.command, Some(Commands::History { json: false, .. })));
    }

    #[test]
    fn input_errors_use_dedicated_exit_code() {
        let err = calculate_text("0", "70").unwrap_err();
        assert_eq!(show_error(&err), EXIT_INPUT_ERROR);
        assert_eq!(show_error(&AppError::new("STORAGE/QUERY", "boom")), 1);
    }
}
