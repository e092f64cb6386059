//! CLI for running scripts with jsweave
//!
//! Usage: jsweave [options] <file.js>
//!
//! Options:
//!   --max-steps <n>    Step budget; the run fails when it is exhausted
//!   --timeout <ms>     Wall-clock budget in milliseconds
//!   --strict           Evaluate the script as strict code
//!   --module           Evaluate the file as a module; sibling `.js` files
//!                      are importable as `./name` or `./name.js`
//!   --config <file>    RuntimeConfig as JSON; flags override its fields
//!
//! Set `RUST_LOG=jsweave=debug` to see driver events.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use jsweave::value::describe;
use jsweave::{JsValue, Outcome, RunOptions, RunReport, Runtime, RuntimeConfig};
use tracing_subscriber::EnvFilter;

struct Config {
    entry_path: PathBuf,
    runtime: RuntimeConfig,
    module: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn parse_args() -> Result<Config, String> {
    let args: Vec<String> = env::args().collect();
    let program_name = args.first().map_or("jsweave", |s| s.as_str());

    let mut max_steps: Option<u64> = None;
    let mut timeout_ms: Option<u64> = None;
    let mut strict = false;
    let mut module = false;
    let mut config_path: Option<&str> = None;
    let mut entry_arg: Option<&str> = None;

    let mut i = 1;
    while i < args.len() {
        let Some(arg) = args.get(i) else {
            break;
        };
        match arg.as_str() {
            "--max-steps" => {
                i += 1;
                max_steps = Some(
                    args.get(i)
                        .ok_or_else(|| "--max-steps requires a value".to_string())?
                        .parse::<u64>()
                        .map_err(|_| "--max-steps must be a positive integer".to_string())?,
                );
            }
            "--timeout" => {
                i += 1;
                timeout_ms = Some(
                    args.get(i)
                        .ok_or_else(|| "--timeout requires a value".to_string())?
                        .parse::<u64>()
                        .map_err(|_| "--timeout must be a positive integer".to_string())?,
                );
            }
            "--config" => {
                i += 1;
                config_path = Some(
                    args.get(i)
                        .ok_or_else(|| "--config requires a file".to_string())?
                        .as_str(),
                );
            }
            "--strict" => strict = true,
            "--module" => module = true,
            other if other.starts_with('-') => return Err(format!("Unknown option: {}", other)),
            other => entry_arg = Some(other),
        }
        i += 1;
    }

    let entry_arg = entry_arg.ok_or_else(|| {
        format!(
            "Usage: {} [--max-steps <n>] [--timeout <ms>] [--strict] [--module] [--config <file>] <file.js>",
            program_name
        )
    })?;

    let mut runtime = match config_path {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|e| format!("Cannot read {}: {}", path, e))?;
            RuntimeConfig::from_json_str(&text).map_err(|e| format!("Invalid config {}: {}", path, e))?
        }
        None => RuntimeConfig::default(),
    };
    if max_steps.is_some() {
        runtime.default_max_steps = max_steps;
    }
    if timeout_ms.is_some() {
        runtime.default_max_wall_time_ms = timeout_ms;
    }
    runtime.strict |= strict;

    Ok(Config {
        entry_path: PathBuf::from(entry_arg),
        runtime,
        module,
    })
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = parse_args()?;
    let entry_file = config.entry_path.display().to_string();
    let source =
        fs::read_to_string(&config.entry_path).map_err(|e| format!("Cannot read {}: {}", entry_file, e))?;

    let started = Instant::now();
    let mut runtime = Runtime::with_config(config.runtime);
    let options = RunOptions::default();

    let report = if config.module {
        let dir = config
            .entry_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        register_siblings(&mut runtime, &dir, &config.entry_path)?;
        runtime.register_module(&entry_file, &source);
        runtime.eval_module(&entry_file, &options)
    } else {
        runtime.eval(&source, &options)
    }
    .map_err(|e| format!("{}\n\n  File: {}", e, entry_file))?;

    tracing::debug!(steps = report.steps, elapsed = ?started.elapsed(), "finished");
    report_outcome(&mut runtime, report)
}

/// Register every `.js`/`.mjs` file next to the entry point under
/// `./name` and `./name.ext`
fn register_siblings(runtime: &mut Runtime, dir: &Path, entry: &Path) -> Result<(), Box<dyn std::error::Error>> {
    for item in fs::read_dir(dir)? {
        let path = item?.path();
        if path == entry {
            continue;
        }
        let is_script = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "js" || ext == "mjs");
        if !is_script {
            continue;
        }
        let (Some(stem), Some(name)) = (
            path.file_stem().and_then(|s| s.to_str()),
            path.file_name().and_then(|s| s.to_str()),
        ) else {
            continue;
        };
        let source = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to load module '{}': {}", path.display(), e))?;
        runtime.register_module(&format!("./{}", stem), &source);
        runtime.register_module(&format!("./{}", name), &source);
    }
    Ok(())
}

fn report_outcome(runtime: &mut Runtime, report: RunReport) -> Result<(), Box<dyn std::error::Error>> {
    for reason in &report.unhandled_rejections {
        eprintln!("Unhandled rejection: {}", describe(reason));
    }
    match report.outcome {
        Outcome::Completed(JsValue::Undefined) => Ok(()),
        Outcome::Completed(value) => {
            print_value(runtime, &value);
            Ok(())
        }
        Outcome::Rejected(reason) => Err(format!("Uncaught {}", describe(&reason)).into()),
        Outcome::Paused => Err(format!("Budget exhausted after {} steps", report.steps).into()),
        Outcome::Suspended => Err("Evaluation is waiting on a promise nothing will settle".into()),
        Outcome::Yielded(value) => Err(format!("Unexpected yield of {}", describe(&value)).into()),
        Outcome::Aborted => Err("Aborted".into()),
    }
}

fn print_value(runtime: &mut Runtime, value: &JsValue) {
    match value {
        JsValue::String(s) => println!("{}", s),
        JsValue::Object(obj) if !obj.is_callable() => match runtime.value_to_json(value) {
            Ok(json) => println!(
                "{}",
                serde_json::to_string_pretty(&json).unwrap_or_else(|_| describe(value))
            ),
            Err(_) => println!("{}", describe(value)),
        },
        other => println!("{}", describe(other)),
    }
}
