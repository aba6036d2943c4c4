//! # photoboss CLI
//!
//! ## Usage
//! ```bash
//! photoboss scan ~/Photos --recursive
//! photoboss scan ~/Photos -r --methods "Perceptual Hash" --output json
//! photoboss cache-stats
//! ```

mod cli;

use photoboss::Result;

fn main() -> Result<()> {
    cli::run()
}
