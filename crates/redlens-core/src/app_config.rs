use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Executable that launches the external crawler.
    pub crawler_program: String,
    /// Arguments passed to `crawler_program`, whitespace separated in env.
    pub crawler_args: Vec<String>,
    pub crawler_workdir: PathBuf,
    /// Directory the crawler writes its JSON artifacts into. Relative paths
    /// resolve against `crawler_workdir`.
    pub crawler_data_dir: PathBuf,
    /// Crawler config file to patch for the duration of one invocation.
    pub crawler_config_file: Option<PathBuf>,
    pub notes_target: i32,
    pub batch_size: usize,
    pub secs_per_note: u64,
    pub overhead_per_blogger_secs: u64,
    pub timeout_multiplier: f64,
    pub timeout_floor_secs: u64,
    pub timeout_ceiling_secs: u64,
    pub batch_delay_min_secs: u64,
    pub batch_delay_max_secs: u64,
    pub exclusion_cap: usize,
    pub outlier_multiplier: f64,
    pub outlier_min_likes: i64,
}

impl AppConfig {
    /// The data directory as the crawler sees it.
    #[must_use]
    pub fn resolved_data_dir(&self) -> PathBuf {
        if self.crawler_data_dir.is_absolute() {
            self.crawler_data_dir.clone()
        } else {
            self.crawler_workdir.join(&self.crawler_data_dir)
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("crawler_program", &self.crawler_program)
            .field("crawler_args", &self.crawler_args)
            .field("crawler_workdir", &self.crawler_workdir)
            .field("crawler_data_dir", &self.crawler_data_dir)
            .field("crawler_config_file", &self.crawler_config_file)
            .field("notes_target", &self.notes_target)
            .field("batch_size", &self.batch_size)
            .field("secs_per_note", &self.secs_per_note)
            .field("overhead_per_blogger_secs", &self.overhead_per_blogger_secs)
            .field("timeout_multiplier", &self.timeout_multiplier)
            .field("timeout_floor_secs", &self.timeout_floor_secs)
            .field("timeout_ceiling_secs", &self.timeout_ceiling_secs)
            .field("batch_delay_min_secs", &self.batch_delay_min_secs)
            .field("batch_delay_max_secs", &self.batch_delay_max_secs)
            .field("exclusion_cap", &self.exclusion_cap)
            .field("outlier_multiplier", &self.outlier_multiplier)
            .field("outlier_min_likes", &self.outlier_min_likes)
            .finish()
    }
}
