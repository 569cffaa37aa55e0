use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Directory holding config.yaml, members.json and the image cache
    #[clap(long, default_value = "./")]
    pub data_dir: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch new records from the remote tables, enrich and cache them
    Sync {
        /// Server-side named view to fetch members from
        /// (overrides airtable.member_view)
        #[clap(long)]
        view: Option<String>,

        /// Worker threads for enrichment (overrides sync_max_threads)
        #[clap(long)]
        max_threads: Option<u16>,
    },

    /// Start memberbase as a service
    Daemon {},

    /// Semantic search over the cached directory
    Search {
        /// Free-text query
        query: String,

        /// Maximum number of results
        #[clap(short, long, default_value = "10")]
        limit: usize,

        /// Comma-separated skills a member must carry
        #[clap(short, long)]
        skills: Option<String>,

        /// Search build updates instead of members
        #[clap(long, default_value = "false")]
        updates: bool,
    },

    /// List distinct member skills
    Skills {},
}
