use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_MONGO_URI: &str = "mongodb://localhost:27017";

#[derive(Parser, Debug)]
#[command(
    name = "meshdb-init",
    version,
    about = "Bootstrap the MeshCentral MongoDB database, user, collection and indexes"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Init(InitArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    #[arg(long, env = "MONGO_URI", default_value = DEFAULT_MONGO_URI, hide_env_values = true)]
    pub mongo_uri: String,

    #[arg(long, env = "MONGO_INITDB_DATABASE", default_value = "")]
    pub database: String,

    #[arg(long, env = "MESHCENTRAL_USER", default_value = "")]
    pub username: String,
}

#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[arg(long, env = "MESHCENTRAL_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Run every step against an in-memory store instead of MongoDB.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[arg(long)]
    pub report_path: Option<PathBuf>,

    /// Exit non-zero when any step failed. Steps skipped because the object
    /// already exists do not count as failures.
    #[arg(long, default_value_t = false)]
    pub strict: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}
