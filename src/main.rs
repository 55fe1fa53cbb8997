//! fspulse CLI entry point

use anyhow::Result;
use fspulse::config::cli::Cli;
use fspulse::driver::{self, DriverConfig};
use fspulse::engine::EngineError;
use fspulse::output::{json, text, Report};
use fspulse::{probe, scenario, EXIT_CAPABILITY_UNSUPPORTED};

fn main() {
    let cli = Cli::parse_args();

    println!("fspulse v{}", env!("CARGO_PKG_VERSION"));
    println!("Asynchronous direct IO qualification");
    println!();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {:#}", e);
        let code = match e.downcast_ref::<EngineError>() {
            Some(EngineError::Unsupported(_)) => EXIT_CAPABILITY_UNSUPPORTED,
            _ => 1,
        };
        std::process::exit(code);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = DriverConfig::from(cli);

    // Fail before any scenario runs if the requested submission mode does
    // not exist on this kernel: a battery without it measures nothing.
    if cli.nowait {
        probe::verify_nowait(&config.directory)?;
    }

    let alignment = probe::probe_alignment(&config.directory);
    let fs_block_size = match probe::fs_block_size(&config.directory) {
        Ok(bsize) => Some(bsize),
        Err(e) => {
            eprintln!("Warning: could not determine filesystem block size: {:#}", e);
            None
        }
    };
    text::print_probe_header(&alignment, fs_block_size);

    let mut report = Report::new(alignment, fs_block_size);

    text::print_table_header();
    for scenario in scenario::battery(&alignment) {
        let result = driver::run_scenario(&scenario, &alignment, &config)?;
        text::print_scenario_row(&scenario, &result);
        report.push(scenario, result);
    }

    if cli.json {
        println!();
        println!("{}", json::to_string(&report)?);
    }

    Ok(())
}
