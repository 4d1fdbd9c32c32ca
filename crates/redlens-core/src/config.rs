use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn invalid(var: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: reason.to_string(),
    }
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
#[allow(clippy::too_many_lines)] // One block per variable; splitting it scatters the defaults.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e))
    };

    let parse_f64 = |var: &str, default: &str| -> Result<f64, ConfigError> {
        let value = or_default(var, default)
            .parse::<f64>()
            .map_err(|e| invalid(var, e))?;
        if value.is_finite() && value >= 0.0 {
            Ok(value)
        } else {
            Err(invalid(var, "must be a non-negative finite number"))
        }
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("REDLENS_ENV", "development"))?;
    let log_level = or_default("REDLENS_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("REDLENS_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("REDLENS_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("REDLENS_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let crawler_program = or_default("REDLENS_CRAWLER_PROGRAM", "uv");
    let crawler_args = or_default(
        "REDLENS_CRAWLER_ARGS",
        "run main.py --platform xhs --lt qrcode",
    )
    .split_whitespace()
    .map(str::to_string)
    .collect();
    let crawler_workdir = PathBuf::from(or_default("REDLENS_CRAWLER_WORKDIR", "."));
    let crawler_data_dir = PathBuf::from(or_default("REDLENS_CRAWLER_DATA_DIR", "data/xhs/json"));
    let crawler_config_file = lookup("REDLENS_CRAWLER_CONFIG_FILE")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from);

    let notes_target_raw = parse_u32("REDLENS_NOTES_TARGET", "100")?;
    let notes_target = i32::try_from(notes_target_raw)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| invalid("REDLENS_NOTES_TARGET", "must be between 1 and i32::MAX"))?;

    let batch_size = parse_usize("REDLENS_BATCH_SIZE", "5")?;
    if batch_size == 0 {
        return Err(invalid("REDLENS_BATCH_SIZE", "must be at least 1"));
    }

    let secs_per_note = parse_u64("REDLENS_SECS_PER_NOTE", "4")?;
    let overhead_per_blogger_secs = parse_u64("REDLENS_OVERHEAD_PER_BLOGGER_SECS", "60")?;
    let timeout_multiplier = parse_f64("REDLENS_TIMEOUT_MULTIPLIER", "1.5")?;
    let timeout_floor_secs = parse_u64("REDLENS_TIMEOUT_FLOOR_SECS", "300")?;
    let timeout_ceiling_secs = parse_u64("REDLENS_TIMEOUT_CEILING_SECS", "7200")?;
    if timeout_floor_secs > timeout_ceiling_secs {
        return Err(invalid(
            "REDLENS_TIMEOUT_FLOOR_SECS",
            "must not exceed REDLENS_TIMEOUT_CEILING_SECS",
        ));
    }

    let batch_delay_min_secs = parse_u64("REDLENS_BATCH_DELAY_MIN_SECS", "10")?;
    let batch_delay_max_secs = parse_u64("REDLENS_BATCH_DELAY_MAX_SECS", "30")?;
    if batch_delay_min_secs > batch_delay_max_secs {
        return Err(invalid(
            "REDLENS_BATCH_DELAY_MIN_SECS",
            "must not exceed REDLENS_BATCH_DELAY_MAX_SECS",
        ));
    }

    let exclusion_cap = parse_usize("REDLENS_EXCLUSION_CAP", "1000")?;
    let outlier_multiplier = parse_f64("REDLENS_OUTLIER_MULTIPLIER", "3.0")?;
    let outlier_min_likes = or_default("REDLENS_OUTLIER_MIN_LIKES", "500")
        .parse::<i64>()
        .map_err(|e| invalid("REDLENS_OUTLIER_MIN_LIKES", e))?;

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        crawler_program,
        crawler_args,
        crawler_workdir,
        crawler_data_dir,
        crawler_config_file,
        notes_target,
        batch_size,
        secs_per_note,
        overhead_per_blogger_secs,
        timeout_multiplier,
        timeout_floor_secs,
        timeout_ceiling_secs,
        batch_delay_min_secs,
        batch_delay_max_secs,
        exclusion_cap,
        outlier_multiplier,
        outlier_min_likes,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnvVar`] for unrecognized values.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(invalid(
            "REDLENS_ENV",
            format!("unknown environment '{other}'"),
        )),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
