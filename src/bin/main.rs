#![forbid(unsafe_code)]

use colored::*;

fn main() {
    println!("{}", "powledger CLI".bright_cyan().bold());
    println!("{}", "-------------".bright_cyan());
    println!();
    println!(
        "{}",
        "This is the main entry point, but the simulation lives in a separate binary.".yellow()
    );
    println!(
        "{}",
        "Use 'cargo run --bin <binary_name>' to run a specific command.".yellow()
    );
    println!();
    println!("{}", "Available binaries:".bright_green().underline());
    println!("  - {}", "powledger-sim".bright_white());
    println!();
    println!("{}", "Options (powledger-sim):".bright_green().underline());
    println!("  --config <path>      {}", "TOML configuration (default powledger.toml)".dimmed());
    println!("  --agents <n>         {}", "number of miner agents".dimmed());
    println!("  --difficulty <n>     {}", "leading zero hex digits".dimmed());
    println!("  --timeout <secs>     {}", "wait limit for the expected chain length".dimmed());
    println!("  --no-fixture-file    {}", "keep fixtures in memory".dimmed());
    println!("  --display            {}", "print both pools at the end".dimmed());
    println!();
    println!("{}", "Example:".bright_green().underline());
    println!("{}", "  RUST_LOG=debug cargo run --bin powledger-sim -- --agents 4 --difficulty 3".italic());
}
