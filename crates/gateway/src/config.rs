use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crimestat_engine::PgStoreConfig;
use sqlx::postgres::PgConnectOptions;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub db_connect_options: PgConnectOptions,
    pub db_max_connections: u32,
    pub db_acquire_timeout_ms: u64,
    pub db_max_lifetime_secs: u64,
    pub query_timeout_ms: u64,
    pub validate_schema: bool,
    pub metrics_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StartupError {}

impl GatewayConfig {
    pub fn load() -> Result<Self, StartupError> {
        let mut merged = HashMap::new();

        if let Ok(config_path) = std::env::var("CRIMESTAT_CONFIG_PATH") {
            let config_path = config_path.trim();
            if !config_path.is_empty() {
                let file_kv = parse_env_file(config_path)?;
                merged.extend(file_kv);
            }
        }

        merged.extend(std::env::vars());

        Self::from_kv(&merged)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, StartupError> {
        let bind_addr = parse_socket_addr(
            kv.get("CRIMESTAT_BIND_ADDR"),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5001),
            "CRIMESTAT_BIND_ADDR",
        )?;

        let db_connect_options = match optional_nonempty(kv, "CRIMESTAT_DB_URL") {
            Some(url) => url.parse::<PgConnectOptions>().map_err(|_| StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "CRIMESTAT_DB_URL must be a valid PostgreSQL connection URL".to_string(),
            })?,
            None => connect_options_from_parts(kv)?,
        };

        let db_max_connections = parse_u32(
            kv.get("CRIMESTAT_DB_MAX_CONNECTIONS"),
            8,
            "CRIMESTAT_DB_MAX_CONNECTIONS",
        )?;
        if db_max_connections == 0 {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "CRIMESTAT_DB_MAX_CONNECTIONS must be >= 1".to_string(),
            });
        }

        let db_acquire_timeout_ms = parse_u64(
            kv.get("CRIMESTAT_DB_ACQUIRE_TIMEOUT_MS"),
            30_000,
            "CRIMESTAT_DB_ACQUIRE_TIMEOUT_MS",
        )?;
        let db_max_lifetime_secs = parse_u64(
            kv.get("CRIMESTAT_DB_MAX_LIFETIME_SECS"),
            1800,
            "CRIMESTAT_DB_MAX_LIFETIME_SECS",
        )?;
        let query_timeout_ms = parse_u64(
            kv.get("CRIMESTAT_QUERY_TIMEOUT_MS"),
            5000,
            "CRIMESTAT_QUERY_TIMEOUT_MS",
        )?;
        if query_timeout_ms == 0 {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "CRIMESTAT_QUERY_TIMEOUT_MS must be >= 1".to_string(),
            });
        }

        let validate_schema = parse_bool_strict(
            kv.get("CRIMESTAT_VALIDATE_SCHEMA"),
            true,
            "CRIMESTAT_VALIDATE_SCHEMA",
        )?;
        let metrics_enabled = parse_bool_strict(
            kv.get("CRIMESTAT_METRICS_ENABLED"),
            true,
            "CRIMESTAT_METRICS_ENABLED",
        )?;

        Ok(Self {
            bind_addr,
            db_connect_options,
            db_max_connections,
            db_acquire_timeout_ms,
            db_max_lifetime_secs,
            query_timeout_ms,
            validate_schema,
            metrics_enabled,
        })
    }

    pub fn store_config(&self) -> PgStoreConfig {
        PgStoreConfig {
            connect_options: self.db_connect_options.clone(),
            max_connections: self.db_max_connections,
            acquire_timeout: Duration::from_millis(self.db_acquire_timeout_ms),
            max_lifetime: Duration::from_secs(self.db_max_lifetime_secs),
            statement_timeout: Duration::from_millis(self.query_timeout_ms),
        }
    }
}

/// Connection settings from the discrete `DB_*` keys used by existing
/// deployments.
fn connect_options_from_parts(
    kv: &HashMap<String, String>,
) -> Result<PgConnectOptions, StartupError> {
    let Some(name) = optional_nonempty(kv, "DB_NAME") else {
        return Err(StartupError {
            code: "ERR_MISSING_CONFIG",
            message: "missing required config key CRIMESTAT_DB_URL (or DB_NAME)".to_string(),
        });
    };

    let user = optional_nonempty(kv, "DB_USER").unwrap_or_else(|| "admin".to_string());
    let host = optional_nonempty(kv, "DB_HOST").unwrap_or_else(|| "localhost".to_string());
    let port = parse_u32(kv.get("DB_PORT"), 5432, "DB_PORT")?;
    let port = u16::try_from(port)
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: "DB_PORT must be a valid TCP port".to_string(),
        })?;

    let options = PgConnectOptions::new()
        .host(&host)
        .port(port)
        .username(&user)
        .database(&name);

    Ok(match optional_nonempty(kv, "DB_PASSWORD") {
        Some(password) => options.password(&password),
        None => options,
    })
}

fn parse_env_file(path: &str) -> Result<HashMap<String, String>, StartupError> {
    let contents = std::fs::read_to_string(path).map_err(|_| StartupError {
        code: "ERR_CONFIG_FILE_READ",
        message: format!("failed to read config file at {}", path),
    })?;

    let mut kv = HashMap::new();

    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| StartupError {
            code: "ERR_CONFIG_FILE_PARSE",
            message: format!("invalid config line {} (expected KEY=VALUE)", idx + 1),
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(StartupError {
                code: "ERR_CONFIG_FILE_PARSE",
                message: format!("invalid config line {} (empty key)", idx + 1),
            });
        }

        kv.insert(key.to_string(), strip_quotes(value.trim()));
    }

    Ok(kv)
}

fn strip_quotes(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return s[1..bytes.len() - 1].to_string();
        }
    }
    s.to_string()
}

fn optional_nonempty(kv: &HashMap<String, String>, key: &str) -> Option<String> {
    kv.get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn parse_socket_addr(
    value: Option<&String>,
    default: SocketAddr,
    key: &'static str,
) -> Result<SocketAddr, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<SocketAddr>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be a valid host:port socket address", key),
        }),
    }
}

fn parse_u64(value: Option<&String>, default: u64, key: &'static str) -> Result<u64, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<u64>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an integer", key),
        }),
    }
}

fn parse_u32(value: Option<&String>, default: u32, key: &'static str) -> Result<u32, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<u32>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an integer", key),
        }),
    }
}

fn parse_bool_strict(
    value: Option<&String>,
    default: bool,
    key: &'static str,
) -> Result<bool, StartupError> {
    let Some(value) = value.map(|v| v.trim()).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };

    match value {
        "1" | "true" | "TRUE" | "yes" | "YES" => Ok(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Ok(false),
        _ => Err(StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be a boolean", key),
        }),
    }
}
