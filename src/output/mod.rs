//! Report output
//!
//! Human-readable text on stdout is the primary interface; `--json` adds a
//! machine-readable dump of the same data. Scenario rows are emitted in
//! battery order; operators compare them positionally against known-good
//! expectations.

pub mod json;
pub mod text;

use crate::driver::RunResult;
use crate::probe::AlignmentInfo;
use crate::scenario::ScenarioConfig;
use serde::Serialize;

/// One scenario's configuration and measured outcome
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScenarioOutcome {
    pub config: ScenarioConfig,
    pub result: RunResult,
}

/// The full battery report
#[derive(Debug, Serialize)]
pub struct Report {
    pub memory_alignment: usize,
    pub disk_alignment: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fs_block_size: Option<u64>,
    /// In battery order
    pub scenarios: Vec<ScenarioOutcome>,
}

impl Report {
    pub fn new(alignment: AlignmentInfo, fs_block_size: Option<u64>) -> Self {
        Self {
            memory_alignment: alignment.memory_alignment,
            disk_alignment: alignment.disk_alignment,
            fs_block_size,
            scenarios: Vec::new(),
        }
    }

    pub fn push(&mut self, config: ScenarioConfig, result: RunResult) {
        self.scenarios.push(ScenarioOutcome { config, result });
    }
}
