//! Command-line interface definitions.
//!
//! Options can be given as flags; the config path can also come from the
//! environment.

use clap::{Parser, Subcommand};

/// Command-line arguments for the scraper.
///
/// # Examples
///
/// ```sh
/// # Scrape news every five minutes until Ctrl-C
/// web_news_scraper news
///
/// # One news cycle with a custom config
/// web_news_scraper -c scraper.yaml news --once
///
/// # Company directories, written to ./data
/// web_news_scraper -o ./data companies
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file
    #[arg(short, long, global = true, env = "SCRAPER_CONFIG")]
    pub config: Option<String>,

    /// Directory the JSON batches are written to
    #[arg(short, long, global = true, default_value = "output")]
    pub output_dir: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Scrape news listings and write article batches
    News {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,

        /// Seconds to wait between cycles
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
    },
    /// Scrape company directories and job boards once
    Companies,
}
