use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sitemapper", about = "Same-site crawler & HTML document mapper")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl a site starting from seed URLs
    Crawl {
        /// Seed URLs; the first seed fixes the main host, scheme, and port
        #[arg(required = true)]
        seeds: Vec<String>,

        /// Host treated as an alias of the main host (repeatable)
        #[arg(long = "additional-host", value_name = "HOST")]
        additional_hosts: Vec<String>,

        /// Follow rel="nofollow" links too
        #[arg(long)]
        follow_all: bool,

        /// Skip the heuristic text scan over scripts and styles
        #[arg(long)]
        content_only: bool,

        /// Keep query parameters in their original order
        #[arg(long)]
        preserve_query_order: bool,

        /// Concurrent fetch workers
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Retries for transient failures
        #[arg(long)]
        max_retries: Option<u32>,

        /// Response cache directory
        #[arg(long)]
        cache_dir: Option<String>,

        /// Raw body directory, keyed like the cache
        #[arg(long)]
        body_dir: Option<String>,

        /// External main-content extractor command
        #[arg(long)]
        extractor: Option<String>,

        /// Directory for extractor output
        #[arg(long)]
        extractor_dir: Option<String>,

        /// Discovered-URL list file
        #[arg(short, long)]
        output: Option<String>,

        /// Failed-URL report file (YAML)
        #[arg(long)]
        failed_output: Option<String>,
    },
    /// Re-probe previously failed URLs from a file
    Recheck {
        /// File with one URL per line (# comments allowed)
        file: String,

        /// Concurrent fetch workers
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,
    },
}
