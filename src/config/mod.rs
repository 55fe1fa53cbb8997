//! Configuration module
//!
//! CLI argument parsing and conversion into the driver's run parameters.

pub mod cli;

use crate::driver::DriverConfig;
use cli::Cli;

impl From<&Cli> for DriverConfig {
    fn from(cli: &Cli) -> Self {
        DriverConfig {
            directory: cli.directory.clone(),
            ops: cli.ops,
            nowait: cli.nowait,
            seed: cli.seed,
            ..DriverConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::GOOD_CTXSW_PER_IO;
    use clap::Parser;

    #[test]
    fn test_cli_to_driver_config() {
        let cli = Cli::parse_from(["fspulse", "--nowait", "--ops", "100", "--seed", "9"]);
        let config = DriverConfig::from(&cli);
        assert!(config.nowait);
        assert_eq!(config.ops, 100);
        assert_eq!(config.seed, Some(9));
        // Production invariants the CLI does not touch
        assert!(config.direct_io);
        assert_eq!(config.good_threshold, GOOD_CTXSW_PER_IO);
    }
}
