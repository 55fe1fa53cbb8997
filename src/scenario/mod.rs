//! Scenario battery
//!
//! The published battery covers the combinations that historically separate
//! well-behaved async filesystems from pretenders: small and large queue
//! depths, size-changing appends vs size-unchanging overwrites, page-sized
//! vs disk-alignment-sized buffers, with and without O_DSYNC, and one
//! large-queue-depth read pass. Battery order is fixed and preserved all
//! the way to the report, because operators compare rows against known
//! expectations by position.

use crate::engine::Direction;
use crate::probe::AlignmentInfo;
use serde::Serialize;

/// Parameters that fully determine one benchmark run
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScenarioConfig {
    /// Maximum in-flight requests
    pub queue_depth: usize,
    /// Bytes per IO operation
    pub buffer_size: usize,
    /// Extend the file to a large logical size before any IO, so writes do
    /// not change the file size
    pub pretruncate: bool,
    /// Zero-fill the IO range synchronously first, so writes overwrite
    /// allocated blocks instead of growing the file
    pub prezero: bool,
    /// Open the file with O_DSYNC
    pub use_sync_flag: bool,
    /// Read back or write out
    pub direction: Direction,
}

impl ScenarioConfig {
    /// Short human label for the file-growth/write-mode policy
    pub fn mode_label(&self) -> &'static str {
        match self.direction {
            Direction::Read => "read",
            Direction::Write => {
                if self.pretruncate {
                    "size-unchanging"
                } else if self.prezero && self.use_sync_flag {
                    "overwrite+dsync"
                } else if self.prezero {
                    "overwrite"
                } else {
                    "size-changing"
                }
            }
        }
    }
}

/// The fixed, ordered scenario battery.
///
/// The fifth (write) and final (read) scenarios size their buffers to the
/// probed disk alignment, deliberately exercising filesystem-block-sized
/// IO rather than page-sized IO.
pub fn battery(alignment: &AlignmentInfo) -> Vec<ScenarioConfig> {
    let append = ScenarioConfig {
        queue_depth: 1,
        buffer_size: 4096,
        pretruncate: false,
        prezero: false,
        use_sync_flag: false,
        direction: Direction::Write,
    };

    vec![
        append,
        ScenarioConfig {
            queue_depth: 3,
            ..append
        },
        ScenarioConfig {
            queue_depth: 3,
            pretruncate: true,
            ..append
        },
        ScenarioConfig {
            queue_depth: 7,
            pretruncate: true,
            ..append
        },
        ScenarioConfig {
            buffer_size: alignment.disk_alignment,
            pretruncate: true,
            ..append
        },
        ScenarioConfig {
            prezero: true,
            ..append
        },
        ScenarioConfig {
            prezero: true,
            use_sync_flag: true,
            ..append
        },
        ScenarioConfig {
            queue_depth: 30,
            buffer_size: alignment.disk_alignment,
            direction: Direction::Read,
            ..append
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_alignment() -> AlignmentInfo {
        AlignmentInfo {
            memory_alignment: 512,
            disk_alignment: 512,
        }
    }

    #[test]
    fn test_battery_size_and_order() {
        let battery = battery(&test_alignment());
        assert_eq!(battery.len(), 8);

        // Order is significant: operators read the report by row position
        assert_eq!(battery[0].queue_depth, 1);
        assert!(!battery[0].pretruncate);
        assert_eq!(battery[1].queue_depth, 3);
        assert!(battery[2].pretruncate);
        assert_eq!(battery[3].queue_depth, 7);
        assert_eq!(battery[7].queue_depth, 30);
        assert_eq!(battery[7].direction, Direction::Read);
        assert_eq!(battery[7].buffer_size, 512);
    }

    #[test]
    fn test_disk_alignment_scenario_uses_probed_size() {
        let alignment = AlignmentInfo {
            memory_alignment: 4096,
            disk_alignment: 4096,
        };
        let battery = battery(&alignment);
        assert_eq!(battery[4].buffer_size, 4096);

        let small = AlignmentInfo {
            memory_alignment: 512,
            disk_alignment: 512,
        };
        assert_eq!(super::battery(&small)[4].buffer_size, 512);
    }

    #[test]
    fn test_exactly_one_read_scenario() {
        let battery = battery(&test_alignment());
        let reads = battery
            .iter()
            .filter(|s| s.direction == Direction::Read)
            .count();
        assert_eq!(reads, 1);
    }

    #[test]
    fn test_dsync_scenario_present() {
        let battery = battery(&test_alignment());
        assert!(battery.iter().any(|s| s.use_sync_flag && s.prezero));
    }

    #[test]
    fn test_mode_labels() {
        let battery = battery(&test_alignment());
        assert_eq!(battery[0].mode_label(), "size-changing");
        assert_eq!(battery[2].mode_label(), "size-unchanging");
        assert_eq!(battery[5].mode_label(), "overwrite");
        assert_eq!(battery[6].mode_label(), "overwrite+dsync");
        assert_eq!(battery[7].mode_label(), "read");
    }
}
