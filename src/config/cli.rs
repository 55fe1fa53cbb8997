//! CLI argument parsing using clap

use clap::Parser;
use std::path::PathBuf;

/// fspulse - filesystem qualification for asynchronous direct IO
///
/// Runs a fixed battery of kernel-AIO workloads against an unlinked
/// O_DIRECT file and reports, per scenario, whether submitting IO blocked
/// the submitting thread and whether written data leaked into the page
/// cache.
#[derive(Parser, Debug)]
#[command(name = "fspulse")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Submit IO with RWF_NOWAIT (non-blocking direct IO mode)
    ///
    /// Fatal if the running kernel does not support the flag: results
    /// without it would not measure what was asked for.
    #[arg(long)]
    pub nowait: bool,

    /// Directory to create (and immediately unlink) backing files in
    #[arg(long, default_value = ".")]
    pub directory: PathBuf,

    /// Operations per scenario
    #[arg(long, default_value = "10000")]
    pub ops: usize,

    /// Fix the submission shuffle seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Also emit the report as JSON after the text rows
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["fspulse"]);
        assert!(!cli.nowait);
        assert!(!cli.json);
        assert_eq!(cli.ops, 10_000);
        assert_eq!(cli.directory, PathBuf::from("."));
        assert_eq!(cli.seed, None);
    }

    #[test]
    fn test_all_flags() {
        let cli = Cli::parse_from([
            "fspulse",
            "--nowait",
            "--json",
            "--ops",
            "500",
            "--seed",
            "7",
            "--directory",
            "/mnt/xfs",
        ]);
        assert!(cli.nowait);
        assert!(cli.json);
        assert_eq!(cli.ops, 500);
        assert_eq!(cli.seed, Some(7));
        assert_eq!(cli.directory, PathBuf::from("/mnt/xfs"));
    }
}
