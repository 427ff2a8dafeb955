use clap::{Parser, ValueEnum};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use voucher_generator::settings::{DEFAULT_BATCH_SIZE, DEFAULT_COLLISION_THRESHOLD};

pub const COUNT_ENV: &str = "VOUCHER_ISSUER_COUNT";
pub const CODE_LENGTH_ENV: &str = "VOUCHER_ISSUER_CODE_LENGTH";
pub const BATCH_SIZE_ENV: &str = "VOUCHER_ISSUER_BATCH_SIZE";
pub const COLLISION_THRESHOLD_ENV: &str = "VOUCHER_ISSUER_COLLISION_THRESHOLD";
pub const LENGTH_FILE_ENV: &str = "VOUCHER_ISSUER_LENGTH_FILE";
pub const STORAGE_BACKEND_ENV: &str = "VOUCHER_ISSUER_STORAGE_BACKEND";
pub const MYSQL_DSN_ENV: &str = "VOUCHER_ISSUER_MYSQL_DSN";
pub const REDIS_URL_ENV: &str = "VOUCHER_ISSUER_REDIS_URL";

pub const DEFAULT_CODE_LENGTH: usize = 6;

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

/// Issues voucher codes and prints them to stdout, one per line.
#[derive(Debug, Parser)]
#[command(name = "voucher-issuer")]
pub struct CLI {
    /// Number of codes to issue.
    #[arg(long, env = COUNT_ENV)]
    pub count: usize,

    /// Code length to start from when no length file is available.
    #[arg(long, env = CODE_LENGTH_ENV, default_value_t = DEFAULT_CODE_LENGTH)]
    pub code_length: usize,

    #[arg(long, env = BATCH_SIZE_ENV, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    #[arg(long, env = COLLISION_THRESHOLD_ENV, default_value_t = DEFAULT_COLLISION_THRESHOLD)]
    pub collision_threshold: f64,

    /// File holding the code length reached by the previous run.
    ///
    /// Read before generating, rewritten afterwards.
    #[arg(long, env = LENGTH_FILE_ENV)]
    pub length_file: Option<PathBuf>,

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
}
