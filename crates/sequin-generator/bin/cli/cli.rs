use clap::{Args, Parser, Subcommand, ValueEnum};
use sequin_core::options::DEFAULT_YEAR_FORMAT;
use std::fmt::{Display, Formatter};

pub const STORAGE_BACKEND_ENV: &str = "SEQUIN_STORAGE_BACKEND";
pub const MYSQL_DSN_ENV: &str = "SEQUIN_MYSQL_DSN";
pub const REDIS_URL_ENV: &str = "SEQUIN_REDIS_URL";
pub const START_VALUE_ENV: &str = "SEQUIN_START_VALUE";
pub const YEAR_FORMAT_ENV: &str = "SEQUIN_YEAR_FORMAT";
pub const MAX_ATTEMPTS_ENV: &str = "SEQUIN_MAX_ATTEMPTS";
pub const LOG_FORMAT_ENV: &str = "SEQUIN_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "mysql")]
    Mysql,
    #[value(name = "redis")]
    Redis,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::Mysql => write!(f, "mysql"),
            StorageBackendArg::Redis => write!(f, "redis"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "sequin", about = "Issue formatted sequence numbers")]
pub struct Cli {
    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::InMemory
    )]
    pub storage: StorageBackendArg,

    #[arg(long, env = MYSQL_DSN_ENV, required_if_eq("storage", "mysql"))]
    pub mysql_dsn: Option<String>,

    #[arg(long, env = REDIS_URL_ENV, required_if_eq("storage", "redis"))]
    pub redis_url: Option<String>,

    /// Value issued by the first allocation of a fresh key.
    #[arg(long, env = START_VALUE_ENV, default_value_t = 1)]
    pub start_value: i64,

    /// strftime pattern for the fallback prefix.
    #[arg(long, env = YEAR_FORMAT_ENV, default_value = DEFAULT_YEAR_FORMAT)]
    pub year_format: String,

    /// Allocation attempts before giving up on a conflicting counter.
    #[arg(long, env = MAX_ATTEMPTS_ENV, default_value_t = 10)]
    pub max_attempts: u32,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormatArg::Text)]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Allocate and print the next formatted sequence values.
    Next(NextArgs),
    /// Print the counter for a key as JSON.
    Current(KeyArgs),
    /// Overwrite the counter for a key and print it as JSON.
    Reset(ResetArgs),
}

#[derive(Debug, Args)]
pub struct KeyArgs {
    #[arg(long)]
    pub namespace: String,
    /// Defaults to the current year.
    #[arg(long)]
    pub prefix: Option<String>,
    #[arg(long)]
    pub suffix: Option<String>,
}

#[derive(Debug, Args)]
pub struct NextArgs {
    #[command(flatten)]
    pub key: KeyArgs,
    #[arg(long)]
    pub increment: Option<i64>,
    #[arg(long)]
    pub length: Option<usize>,
    #[arg(long)]
    pub pad: Option<char>,
    #[arg(long)]
    pub separator: Option<String>,
    /// How many values to allocate.
    #[arg(long, default_value_t = 1)]
    pub count: usize,
}

#[derive(Debug, Args)]
pub struct ResetArgs {
    #[command(flatten)]
    pub key: KeyArgs,
    #[arg(long)]
    pub sequence: i64,
}
