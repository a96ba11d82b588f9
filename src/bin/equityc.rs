//! Equity contract compiler CLI.
//!
//! Compiles a contract source file, with its imports, and prints the
//! compiled artifacts.
//!
//! # Usage
//! ```text
//! equityc <FILE> [OPTIONS]
//! ```
//!
//! # Options
//! - `--bin`: Print each contract's body bytecode as hex
//! - `--shift`: Print each contract's clause selectors
//! - `--instance <ARG>...`: Instantiate a contract and print the program hex
//! - `--contract <NAME>`: Contract to instantiate (defaults to the last one)
//! - `--steps`: Include stack snapshots in the JSON output
//! - `-o, --output <PATH>`: Write the JSON to a file instead of stdout
//! - `--no-timestamps`: Omit timestamps from log lines
//! - `-q, --quiet`: Only log warnings and errors
//!
//! # Examples
//! ```text
//! equityc trade.equity
//! equityc trade.equity --bin --shift
//! equityc lock.equity --instance 0x3a1f...
//! ```

use clap::Parser;
use equity::compiler::errors::render_diagnostic;
use equity::compiler::{CompileError, CompileOptions, CompiledContract, ContractArg, compile_file};
use equity::utils::log::{Level, SHOW_TIMESTAMP, set_min_level};
use equity::{error, info};
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::Ordering;

#[derive(Parser, Debug)]
#[command(
    name = "equityc",
    about = "Compiles Equity contracts to stack VM bytecode",
    version
)]
struct Cli {
    /// Contract source file
    file: PathBuf,
    /// Print each contract's body bytecode as hex
    #[arg(long)]
    bin: bool,
    /// Print the value a spender pushes to select each clause
    #[arg(long)]
    shift: bool,
    /// Instantiate a contract with these arguments, in parameter order
    #[arg(long, num_args = 0.., value_name = "ARG", allow_hyphen_values = true)]
    instance: Option<Vec<String>>,
    /// Contract to instantiate (defaults to the last one in the file)
    #[arg(long, value_name = "NAME")]
    contract: Option<String>,
    /// Include the stack snapshot after every emission
    #[arg(long)]
    steps: bool,
    /// Write the JSON artifacts to a file instead of stdout
    #[arg(long, short, value_name = "PATH")]
    output: Option<PathBuf>,
    /// Omit timestamps from log lines
    #[arg(long)]
    no_timestamps: bool,
    /// Only log warnings and errors
    #[arg(long, short)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();
    if cli.no_timestamps {
        SHOW_TIMESTAMP.store(false, Ordering::Relaxed);
    }
    if cli.quiet {
        set_min_level(Level::Warn);
    }

    let options = CompileOptions { steps: cli.steps };
    let contracts = match compile_file(&cli.file, &options) {
        Ok(contracts) => contracts,
        Err(e) => {
            report(&cli, &e);
            process::exit(1);
        }
    };

    if cli.output.is_some() || !(cli.bin || cli.shift || cli.instance.is_some()) {
        write_json(&cli, &contracts);
    }
    if cli.bin {
        for contract in &contracts {
            println!("{}: {}", contract.name, hex::encode(&contract.body_bytecode));
        }
    }
    if cli.shift {
        print_selectors(&contracts);
    }
    if let Some(args) = &cli.instance {
        print_instance(&cli, &contracts, args);
    }
}

/// Prints a compile error, with a source excerpt when it points into the file.
fn report(cli: &Cli, err: &CompileError) {
    let path = cli.file.display().to_string();
    match (err, fs::read_to_string(&cli.file)) {
        (CompileError::Lex { .. } | CompileError::Parse { .. }, Ok(source)) => {
            eprint!("{}", render_diagnostic(err, &path, &source));
        }
        _ => error!("{path}: {err}"),
    }
}

fn write_json(cli: &Cli, contracts: &[CompiledContract]) {
    let json = match serde_json::to_string_pretty(contracts) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize artifacts: {e}");
            process::exit(1);
        }
    };
    match &cli.output {
        Some(path) => {
            if let Err(e) = fs::write(path, json + "\n") {
                error!("Failed to write {}: {e}", path.display());
                process::exit(1);
            }
            info!("Wrote {} contracts to {}", contracts.len(), path.display());
        }
        None => println!("{json}"),
    }
}

fn print_selectors(contracts: &[CompiledContract]) {
    for contract in contracts {
        let selectors = contract.clause_selectors();
        if selectors.is_empty() {
            println!("{}: single clause, no selector", contract.name);
            continue;
        }
        println!("{}:", contract.name);
        for s in selectors {
            println!("  {} {} {}", s.name, s.index, hex::encode(&s.selector));
        }
    }
}

fn print_instance(cli: &Cli, contracts: &[CompiledContract], args: &[String]) {
    let contract = match &cli.contract {
        Some(name) => contracts.iter().find(|c| c.name == *name),
        None => contracts.last(),
    };
    let Some(contract) = contract else {
        error!(
            "No contract {} in {}",
            cli.contract.as_deref().unwrap_or("at all"),
            cli.file.display()
        );
        process::exit(1);
    };

    if args.len() != contract.params.len() {
        error!(
            "{} takes {} arguments, got {}",
            contract.name,
            contract.params.len(),
            args.len()
        );
        process::exit(1);
    }
    let parsed: Result<Vec<ContractArg>, CompileError> = contract
        .params
        .iter()
        .zip(args)
        .map(|(param, text)| ContractArg::parse(text, &param.declared_type))
        .collect();
    match parsed.and_then(|args| contract.instantiate(&args)) {
        Ok(program) => println!("{}", hex::encode(program)),
        Err(e) => {
            error!("Cannot instantiate {}: {e}", contract.name);
            process::exit(1);
        }
    }
}
