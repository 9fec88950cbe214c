//! ecm-prep entry point: CLI wiring around batch measure preparation.

use std::path::Path;
use std::process;

use serde::Serialize;
use tracing_subscriber::EnvFilter;

use ecm_prep::baseline::InMemoryBaseline;
use ecm_prep::config::ParamsConfig;
use ecm_prep::convert::TableCostConverter;
use ecm_prep::io::export::{export_csv, export_json};
use ecm_prep::measure::{Measure, Prepared};
use ecm_prep::package::MeasurePackage;
use ecm_prep::params::GlobalParams;
use ecm_prep::runner::{load_measure_specs, load_package_specs, prepare_measures, prepare_packages};
use ecm_prep::summary::Summary;

/// Parsed CLI arguments.
struct CliArgs {
    params_path: Option<String>,
    preset: Option<String>,
    baseline_path: Option<String>,
    measures_path: Option<String>,
    packages_path: Option<String>,
    seed_override: Option<u64>,
    out: Option<String>,
    summary_out: Option<String>,
}

#[derive(Serialize)]
struct Output<'a> {
    measures: &'a [Measure],
    packages: &'a [MeasurePackage<'a>],
}

fn print_help() {
    eprintln!("ecm-prep - prepare efficiency-measure markets");
    eprintln!();
    eprintln!("Usage: ecm-prep --baseline <json> --measures <json> [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --params <path>          Load global parameters from a TOML file");
    eprintln!("  --preset <name>          Use built-in parameters (reference, technical_potential)");
    eprintln!("  --baseline <path>        Baseline and cost/performance/lifetime JSON");
    eprintln!("  --measures <path>        JSON array of measure definitions");
    eprintln!("  --packages <path>        JSON array of package definitions");
    eprintln!("  --seed <u64>             Override the sampling seed");
    eprintln!("  --out <path>             Write prepared measures and packages as JSON");
    eprintln!("  --summary-out <path>     Write yearly summaries as CSV");
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --params or --preset is given, the reference preset is used.");
    eprintln!("Log verbosity follows RUST_LOG (default: info).");
}

fn required(args: &[String], i: usize, flag: &str, what: &str) -> String {
    match args.get(i) {
        Some(v) => v.clone(),
        None => {
            eprintln!("error: {flag} requires {what}");
            process::exit(1);
        }
    }
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        params_path: None,
        preset: None,
        baseline_path: None,
        measures_path: None,
        packages_path: None,
        seed_override: None,
        out: None,
        summary_out: None,
    };

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--params" => {
                i += 1;
                cli.params_path = Some(required(&args, i, flag, "a path argument"));
            }
            "--preset" => {
                i += 1;
                cli.preset = Some(required(&args, i, flag, "a name argument"));
            }
            "--baseline" => {
                i += 1;
                cli.baseline_path = Some(required(&args, i, flag, "a path argument"));
            }
            "--measures" => {
                i += 1;
                cli.measures_path = Some(required(&args, i, flag, "a path argument"));
            }
            "--packages" => {
                i += 1;
                cli.packages_path = Some(required(&args, i, flag, "a path argument"));
            }
            "--seed" => {
                i += 1;
                let raw = required(&args, i, flag, "a u64 argument");
                if let Ok(s) = raw.parse::<u64>() {
                    cli.seed_override = Some(s);
                } else {
                    eprintln!("error: --seed value \"{raw}\" is not a valid u64");
                    process::exit(1);
                }
            }
            "--out" => {
                i += 1;
                cli.out = Some(required(&args, i, flag, "a path argument"));
            }
            "--summary-out" => {
                i += 1;
                cli.summary_out = Some(required(&args, i, flag, "a path argument"));
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn exit_with(message: impl std::fmt::Display) -> ! {
    eprintln!("{message}");
    process::exit(1);
}

fn load_params(cli: &CliArgs) -> GlobalParams {
    let mut cfg = if let Some(ref path) = cli.params_path {
        ParamsConfig::from_toml_file(Path::new(path)).unwrap_or_else(|e| exit_with(e))
    } else if let Some(ref name) = cli.preset {
        ParamsConfig::from_preset(name).unwrap_or_else(|e| exit_with(e))
    } else {
        ParamsConfig::reference()
    };

    if let Some(seed) = cli.seed_override {
        cfg.general.seed = seed;
    }

    match GlobalParams::from_config(&cfg) {
        Ok(p) => p,
        Err(errors) => {
            for e in &errors {
                eprintln!("{e}");
            }
            process::exit(1);
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = parse_args();
    let params = load_params(&cli);

    let (Some(baseline_path), Some(measures_path)) = (&cli.baseline_path, &cli.measures_path) else {
        eprintln!("error: --baseline and --measures are required");
        print_help();
        process::exit(1);
    };
    let baseline = InMemoryBaseline::from_json_file(Path::new(baseline_path)).unwrap_or_else(|e| exit_with(e));
    let specs = load_measure_specs(Path::new(measures_path)).unwrap_or_else(|e| exit_with(e));
    let converter = TableCostConverter::new(&params);

    let batch = prepare_measures(specs, &params, &baseline, &converter).unwrap_or_else(|e| exit_with(e));
    for f in &batch.failures {
        eprintln!("excluded: \"{}\": {}", f.name, f.error);
    }
    for name in &batch.removed {
        eprintln!("removed: \"{name}\" (sub-market scaling lacks a source)");
    }

    let package_specs = match cli.packages_path {
        Some(ref path) => load_package_specs(Path::new(path)).unwrap_or_else(|e| exit_with(e)),
        None => Vec::new(),
    };
    let (packages, package_failures) =
        prepare_packages(&package_specs, &batch.measures, &params).unwrap_or_else(|e| exit_with(e));
    for f in &package_failures {
        eprintln!("package excluded: \"{}\": {}", f.name, f.error);
    }

    let mut items: Vec<&dyn Prepared> = batch.measures.iter().map(|m| m as &dyn Prepared).collect();
    items.extend(packages.iter().map(|p| p as &dyn Prepared));
    let summary = Summary::from_prepared(&items).unwrap_or_else(|e| exit_with(e));
    println!("{summary}");

    if let Some(ref path) = cli.out {
        let output = Output {
            measures: &batch.measures,
            packages: &packages,
        };
        if let Err(e) = export_json(&output, Path::new(path)) {
            exit_with(format!("error: failed to write JSON: {e}"));
        }
        eprintln!("Prepared measures written to {path}");
    }

    if let Some(ref path) = cli.summary_out {
        if let Err(e) = export_csv(&summary, Path::new(path)) {
            exit_with(format!("error: failed to write CSV: {e}"));
        }
        eprintln!("Summary written to {path}");
    }
}
