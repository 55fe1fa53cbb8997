//! JSON report output
//!
//! Serializes the same report the text renderer prints, for consumption by
//! scripts that track filesystem behavior across kernel or filesystem
//! upgrades.

use super::Report;
use crate::Result;
use anyhow::Context;

/// Render the report as pretty-printed JSON.
pub fn to_string(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize report to JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{RunResult, Verdict};
    use crate::engine::Direction;
    use crate::probe::AlignmentInfo;
    use crate::scenario::ScenarioConfig;

    #[test]
    fn test_json_shape() {
        let mut report = Report::new(
            AlignmentInfo {
                memory_alignment: 512,
                disk_alignment: 4096,
            },
            Some(4096),
        );
        report.push(
            ScenarioConfig {
                queue_depth: 30,
                buffer_size: 4096,
                pretruncate: false,
                prezero: false,
                use_sync_flag: false,
                direction: Direction::Read,
            },
            RunResult {
                ctxsw_per_io: 0.1,
                background_ctxsw_per_io: 1.5,
                verdict: Verdict::Bad,
                page_cache_hit: true,
            },
        );

        let json = to_string(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["memory_alignment"], 512);
        assert_eq!(value["disk_alignment"], 4096);
        assert_eq!(value["fs_block_size"], 4096);

        let scenario = &value["scenarios"][0];
        assert_eq!(scenario["config"]["queue_depth"], 30);
        assert_eq!(scenario["config"]["direction"], "read");
        assert_eq!(scenario["result"]["verdict"], "BAD");
        assert_eq!(scenario["result"]["page_cache_hit"], true);
    }

    #[test]
    fn test_fs_block_size_omitted_when_unknown() {
        let report = Report::new(
            AlignmentInfo {
                memory_alignment: 512,
                disk_alignment: 512,
            },
            None,
        );
        let json = to_string(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("fs_block_size").is_none());
    }
}
