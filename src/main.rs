//! # media-dedup CLI
//!
//! ## Usage
//! ```bash
//! media-dedup scan /mnt/photos --extensions jpg,png --workers 8
//! media-dedup duplicates --threshold 5
//! media-dedup stats --output json
//! ```

mod cli;

use console::style;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{} {}", style("error:").red().bold(), e);
        std::process::exit(e.exit_code());
    }
}
