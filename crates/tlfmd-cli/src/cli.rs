use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tlfmd",
    about = "Inspect, verify, and reset the metadata storage of a TLF",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Folder id (32 hex characters)
    #[arg(long, global = true)]
    pub tlf: Option<String>,

    /// Storage root; overrides the config file
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// TOML storage config
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the latest revision of a branch
    Head(HeadArgs),
    /// Show a range of revisions of a branch
    Range(RangeArgs),
    /// Show a key-bundle pair
    Bundles(BundlesArgs),
    /// Check every journal and object for integrity
    Verify(VerifyArgs),
    /// Write a new merged revision with the folder's contents cleared
    Reset(ResetArgs),
}

#[derive(Args)]
pub struct HeadArgs {
    /// Reading user
    #[arg(short, long)]
    pub user: String,
    /// Branch id; the merged history when omitted
    #[arg(short, long)]
    pub branch: Option<String>,
}

#[derive(Args)]
pub struct RangeArgs {
    #[arg(short, long)]
    pub user: String,
    #[arg(short, long)]
    pub branch: Option<String>,
    #[arg(long, default_value = "1")]
    pub start: u64,
    #[arg(long, default_value_t = u64::MAX)]
    pub stop: u64,
}

#[derive(Args)]
pub struct BundlesArgs {
    /// Writer bundle id
    #[arg(long)]
    pub writer: String,
    /// Reader bundle id
    #[arg(long)]
    pub reader: String,
}

#[derive(Args)]
pub struct VerifyArgs {}

#[derive(Args)]
pub struct ResetArgs {
    /// User performing the reset
    #[arg(short, long)]
    pub user: String,
    /// File holding the user's 32-byte signing key in hex
    #[arg(short, long)]
    pub key_file: PathBuf,
    /// Show what would be written without writing it
    #[arg(long)]
    pub dry_run: bool,
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub force: bool,
}
