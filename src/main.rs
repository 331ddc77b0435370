use std::io::{self, BufRead, Write};
use std::process;

use crystalfield::prelude::*;
use tracing::{error, info};

struct Options {
    config: Option<String>,
    json: bool,
    test_mode: bool,
    pairs_only: bool,
}

fn main() {
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let opts = match take_options(&mut args) {
        Ok(o) => o,
        Err(msg) => {
            eprintln!("{msg}");
            print_help();
            process::exit(2);
        }
    };

    let mut field = match build_field(&opts) {
        Ok(f) => f,
        Err(msg) => {
            error!("{msg}");
            eprintln!("{msg}");
            process::exit(1);
        }
    };

    let command = args.first().map(String::as_str).unwrap_or("shell");
    let result = match command {
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        "demo" => run_demo(&opts),
        "run" => run_once(&mut field, &args[1..], &opts),
        "shell" => run_shell(&mut field, &opts),
        other => {
            eprintln!("Unknown command: {other}");
            print_help();
            process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn print_help() {
    println!("crystalfield: a signal field that crystallizes recurring token patterns\n");
    println!("Usage: crystalfield [--config file.json] [--json] [--test] [--pairs] <command>\n");
    println!("Commands:");
    println!("  demo                 Scripted run: crystallize, predict, mispredict + relearn");
    println!("  run <tokens...>      Run one episode and print its board");
    println!("  shell                Interactive: one episode per line (default)");
    println!("  help                 Show this help\n");
    println!("Options:");
    println!("  --config <file>      Load FieldConfig overrides from JSON");
    println!("  --json               Print episode reports as JSON");
    println!("  --test               Start with learning disabled");
    println!("  --pairs              Only show pair structures on the board");
}

fn take_options(args: &mut Vec<String>) -> Result<Options, String> {
    let mut opts = Options {
        config: None,
        json: false,
        test_mode: false,
        pairs_only: false,
    };
    let mut rest = Vec::with_capacity(args.len());
    let mut it = args.drain(..);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => {
                opts.config = Some(it.next().ok_or("--config needs a file path")?);
            }
            "--json" => opts.json = true,
            "--test" => opts.test_mode = true,
            "--pairs" => opts.pairs_only = true,
            _ => rest.push(arg),
        }
    }
    drop(it);
    *args = rest;
    Ok(opts)
}

fn load_config(path: Option<&str>) -> Result<FieldConfig, String> {
    let Some(path) = path else {
        return Ok(FieldConfig::default());
    };
    let text = std::fs::read_to_string(path).map_err(|e| format!("cannot read {path}: {e}"))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid config {path}: {e}"))
}

fn build_field(opts: &Options) -> Result<Field, String> {
    let cfg = load_config(opts.config.as_deref())?;
    let mut field = Field::with_config(cfg).map_err(|e| e.to_string())?;
    if opts.test_mode {
        field.set_modes(Modes::test());
    }
    info!(config = ?opts.config, "field ready");
    Ok(field)
}

fn filter(opts: &Options) -> BoardFilter {
    BoardFilter {
        pairs_only: opts.pairs_only,
    }
}

fn print_episode(field: &Field, report: &EpisodeReport, filter: BoardFilter, json: bool) -> Result<(), String> {
    if json {
        let text = serde_json::to_string_pretty(report).map_err(|e| e.to_string())?;
        println!("{text}");
        return Ok(());
    }
    for event in report.events().filter(|e| !matches!(e, FieldEvent::SensorRegistered { .. })) {
        println!("{event}");
    }
    println!("{}", Board::build(field, report, filter));
    Ok(())
}

fn run_once(field: &mut Field, tokens: &[String], opts: &Options) -> Result<(), String> {
    if tokens.is_empty() {
        return Err("run needs at least one token".to_string());
    }
    let report = field.run_episode(tokens).map_err(|e| e.to_string())?;
    print_episode(field, &report, filter(opts), opts.json)
}

fn run_shell(field: &mut Field, opts: &Options) -> Result<(), String> {
    println!("Commands: train | test | reset | board | pairs on | pairs off | demo | quit");
    println!("Anything else is an episode, e.g.: 1 2 1 2 1 2 3 1 2 3 1 2 4");

    let mut board_filter = filter(opts);
    let mut last = EpisodeReport::default();
    let stdin = io::stdin();

    loop {
        print!("> ");
        io::stdout().flush().map_err(|e| e.to_string())?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).map_err(|e| e.to_string())? == 0 {
            return Ok(());
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.to_lowercase().as_str() {
            "quit" | "exit" => return Ok(()),
            "train" => {
                field.set_modes(Modes::train());
                println!("MODE = TRAIN (learning enabled)");
            }
            "test" => {
                field.set_modes(Modes::test());
                println!("MODE = TEST (learning disabled)");
            }
            "reset" => {
                field.reset_episode();
                last = EpisodeReport::default();
                println!("Reset episode boundary");
            }
            "board" => println!("{}", Board::build(field, &last, board_filter)),
            "pairs on" => {
                board_filter.pairs_only = true;
                println!("Pairs-only board = ON");
            }
            "pairs off" => {
                board_filter.pairs_only = false;
                println!("Pairs-only board = OFF");
            }
            "demo" => run_demo(opts)?,
            _ => {
                let tokens: Vec<&str> = line.split_whitespace().collect();
                match field.run_episode(&tokens) {
                    Ok(report) => {
                        print_episode(field, &report, board_filter, opts.json)?;
                        last = report;
                    }
                    Err(e) => eprintln!("rejected: {e}"),
                }
            }
        }
    }
}

/// Scripted episodes on a fresh field. Each step runs under its own modes.
const DEMO: &[(&str, &str, Modes)] = &[
    (
        "DEMO STEP 1/3: ACCUMULATION -> CRYSTALLIZATION",
        "1 2 1 2 1 2 2 3 2 3 2 3",
        Modes {
            learning_enabled: true,
            learn_structure: true,
            learn_prediction: true,
        },
    ),
    (
        "DEMO STEP 2/3: STRUCTURES -> PREDICTION",
        "1 2 3 1 2 3 1 2 3",
        Modes {
            learning_enabled: true,
            learn_structure: false,
            learn_prediction: true,
        },
    ),
    (
        "DEMO STEP 3/3: prime",
        "1 2 3",
        Modes {
            learning_enabled: false,
            learn_structure: false,
            learn_prediction: false,
        },
    ),
    (
        "DEMO STEP 3/3: MISPREDICTION -> INHIBITION + ERROR-BOOST -> RE-LEARN",
        "1 2 4",
        Modes {
            learning_enabled: true,
            learn_structure: false,
            learn_prediction: true,
        },
    ),
    (
        "DEMO STEP 3/3: verify",
        "1 2 4",
        Modes {
            learning_enabled: false,
            learn_structure: false,
            learn_prediction: false,
        },
    ),
];

fn run_demo(opts: &Options) -> Result<(), String> {
    let mut field = build_field(opts)?;
    let board_filter = BoardFilter { pairs_only: true };

    for (title, line, modes) in DEMO {
        println!("{title}");
        field.set_modes(*modes);
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let report = field.run_episode(&tokens).map_err(|e| e.to_string())?;
        print_episode(&field, &report, board_filter, opts.json)?;
        println!();
    }

    let d = field.diagnostics();
    println!(
        "DEMO SUMMARY: learned pairs={} | seqs={} | composes={} | actionLinks={} | blocks={}",
        d.pairs,
        d.sequences,
        d.compositions,
        d.actions,
        field.registry().len()
    );
    Ok(())
}
