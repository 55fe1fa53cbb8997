//! Human-readable text output

use crate::driver::RunResult;
use crate::probe::AlignmentInfo;
use crate::scenario::ScenarioConfig;

/// Print the probed filesystem characteristics before any scenario runs.
pub fn print_probe_header(alignment: &AlignmentInfo, fs_block_size: Option<u64>) {
    println!("memory DMA alignment:    {}", alignment.memory_alignment);
    println!("disk DMA alignment:      {}", alignment.disk_alignment);
    match fs_block_size {
        Some(bsize) => println!("filesystem block size:   {}", bsize),
        None => println!("filesystem block size:   unknown"),
    }
    println!();
}

/// Print the scenario table header.
pub fn print_table_header() {
    println!(
        "{:>3}  {:>7}  {:<16}{:<7}{:>10}  {:>10}  {:<9}{}",
        "qd", "buffer", "mode", "dir", "ctxsw/io", "bg/io", "verdict", "page cache"
    );
    println!("{}", "─".repeat(78));
}

/// Print one scenario row. Rows appear as each scenario finishes, in
/// battery order.
pub fn print_scenario_row(config: &ScenarioConfig, result: &RunResult) {
    println!(
        "{:>3}  {:>7}  {:<16}{:<7}{:>10.4}  {:>10.4}  {:<9}{}",
        config.queue_depth,
        config.buffer_size,
        config.mode_label(),
        config.direction,
        result.ctxsw_per_io,
        result.background_ctxsw_per_io,
        result.verdict,
        if result.page_cache_hit { "polluted (BAD)" } else { "clean" }
    );
}
