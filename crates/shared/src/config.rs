//! Layered configuration resolution.
//!
//! The effective [`Config`] is assembled once per invocation from, highest
//! precedence first:
//!
//! 1. values supplied explicitly on the command line ([`ArgSource`])
//! 2. `PGMGR_*` environment variables (and `PGPORT` for the port)
//! 3. values already present in the config (typically from `.pgmgr.json`)
//! 4. compiled-in defaults
//!
//! A connection URL, once known, is parsed last and overwrites every
//! connection field it carries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

static DSN_PASSWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"password\s*=\s*(?:'(?:[^'\\]|\\.)*'?|\S*)").expect("valid password pattern")
});

/// Config file read when no other path is given.
pub const DEFAULT_CONFIG_FILE: &str = ".pgmgr.json";
/// Host used when no source supplies one.
pub const DEFAULT_HOST: &str = "localhost";
/// Port used when no source supplies one.
pub const DEFAULT_PORT: u16 = 5432;
/// Dump file used when no source supplies one.
pub const DEFAULT_DUMP_FILE: &str = "dump.sql";
/// Migration folder used when no source supplies one.
pub const DEFAULT_MIGRATION_FOLDER: &str = "migrations";
/// Bookkeeping table used when no source supplies one.
pub const DEFAULT_MIGRATION_TABLE: &str = "schema_migrations";

/// Keys looked up in an [`ArgSource`]. They match the long CLI flag names.
pub mod keys {
    /// Path of the JSON config file.
    pub const CONFIG_FILE: &str = "config-file";
    /// Target database name.
    pub const DATABASE: &str = "database";
    /// Login role.
    pub const USERNAME: &str = "username";
    /// Login password.
    pub const PASSWORD: &str = "password";
    /// Server host.
    pub const HOST: &str = "host";
    /// Server port.
    pub const PORT: &str = "port";
    /// Connection URL or DSN.
    pub const URL: &str = "url";
    /// Dump file path.
    pub const DUMP_FILE: &str = "dump-file";
    /// Migration folder path.
    pub const MIGRATION_FOLDER: &str = "migration-folder";
    /// Bookkeeping table name.
    pub const MIGRATION_TABLE: &str = "migration-table";
    /// Table globs whose data is dumped.
    pub const SEED_TABLES: &str = "seed-tables";
}

/// Environment variables consulted during resolution.
pub mod env_vars {
    /// Path of the JSON config file.
    pub const CONFIG_FILE: &str = "PGMGR_CONFIG_FILE";
    /// Target database name.
    pub const DATABASE: &str = "PGMGR_DATABASE";
    /// Login role.
    pub const USERNAME: &str = "PGMGR_USERNAME";
    /// Login password.
    pub const PASSWORD: &str = "PGMGR_PASSWORD";
    /// Server host.
    pub const HOST: &str = "PGMGR_HOST";
    /// Server port.
    pub const PORT: &str = "PGMGR_PORT";
    /// libpq's own port variable, consulted after `PGMGR_PORT`.
    pub const NATIVE_PORT: &str = "PGPORT";
    /// Connection URL or DSN.
    pub const URL: &str = "PGMGR_URL";
    /// Dump file path.
    pub const DUMP_FILE: &str = "PGMGR_DUMP_FILE";
    /// Migration folder path.
    pub const MIGRATION_FOLDER: &str = "PGMGR_MIGRATION_FOLDER";
    /// Bookkeeping table name.
    pub const MIGRATION_TABLE: &str = "PGMGR_MIGRATION_TABLE";
    /// Comma-separated table globs.
    pub const SEED_TABLES: &str = "PGMGR_SEED_TABLES";

    /// Every variable above, for callers that need to isolate the environment.
    pub const ALL: [&str; 12] = [
        CONFIG_FILE,
        DATABASE,
        USERNAME,
        PASSWORD,
        HOST,
        PORT,
        NATIVE_PORT,
        URL,
        DUMP_FILE,
        MIGRATION_FOLDER,
        MIGRATION_TABLE,
        SEED_TABLES,
    ];
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The connection URL or DSN could not be parsed.
    #[error("Invalid connection URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending value, with any password masked.
        url: String,
        /// Why parsing failed.
        reason: String,
    },

    /// The config file exists but could not be read or parsed.
    #[error("Failed to read config file {}: {source}", path.display())]
    File {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: config::ConfigError,
    },

    /// A port value is not a valid TCP port.
    #[error("Invalid port '{value}' from {origin}")]
    InvalidPort {
        /// Where the value came from (flag or variable name).
        origin: String,
        /// The offending value.
        value: String,
    },

    /// No database name was supplied by any source.
    #[error("Database name is not set; use --database, PGMGR_DATABASE, or a connection URL")]
    MissingDatabase,
}

/// Capability set through which explicitly supplied values are looked up.
///
/// Implemented by the CLI arguments and by [`StaticArgs`] in tests. Missing
/// values are `None` (or an empty list); an empty string or a zero port is
/// treated as "not supplied".
pub trait ArgSource {
    /// Looks up a string value.
    fn string(&self, key: &str) -> Option<String>;
    /// Looks up an integer value.
    fn int(&self, key: &str) -> Option<i64>;
    /// Looks up a list of strings.
    fn string_list(&self, key: &str) -> Vec<String>;
}

/// In-memory [`ArgSource`] built from explicit maps.
#[derive(Debug, Clone, Default)]
pub struct StaticArgs {
    strings: HashMap<String, String>,
    ints: HashMap<String, i64>,
    lists: HashMap<String, Vec<String>>,
}

impl StaticArgs {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a string value.
    #[must_use]
    pub fn with_string(mut self, key: &str, value: impl Into<String>) -> Self {
        self.strings.insert(key.to_string(), value.into());
        self
    }

    /// Adds an integer value.
    #[must_use]
    pub fn with_int(mut self, key: &str, value: i64) -> Self {
        self.ints.insert(key.to_string(), value);
        self
    }

    /// Adds a list value.
    #[must_use]
    pub fn with_list<I, S>(mut self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lists
            .insert(key.to_string(), values.into_iter().map(Into::into).collect());
        self
    }
}

impl ArgSource for StaticArgs {
    fn string(&self, key: &str) -> Option<String> {
        self.strings.get(key).cloned()
    }

    fn int(&self, key: &str) -> Option<i64> {
        self.ints.get(key).copied()
    }

    fn string_list(&self, key: &str) -> Vec<String> {
        self.lists.get(key).cloned().unwrap_or_default()
    }
}

/// Effective connection and operation parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Target database name.
    pub database: String,
    /// Login role.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Connection URL or DSN; overrides the individual fields when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// File written by `dump` and read by `load`.
    pub dump_file: PathBuf,
    /// Folder holding the migration files.
    pub migration_folder: PathBuf,
    /// Name of the bookkeeping table.
    pub migration_table: String,
    /// Table globs whose data is included in dumps; empty means everything.
    pub seed_tables: Vec<String>,
}

/// Shape of `.pgmgr.json`; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct FileConfig {
    database: Option<String>,
    #[serde(alias = "user")]
    username: Option<String>,
    password: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    url: Option<String>,
    #[serde(alias = "dump_file")]
    dump_file: Option<PathBuf>,
    #[serde(alias = "migration_folder")]
    migration_folder: Option<PathBuf>,
    #[serde(alias = "migration_table")]
    migration_table: Option<String>,
    #[serde(alias = "seed_tables")]
    seed_tables: Option<Vec<String>>,
}

impl FileConfig {
    fn apply(self, mut config: Config) -> Config {
        if let Some(database) = self.database {
            config.database = database;
        }
        if let Some(username) = self.username {
            config.username = username;
        }
        if let Some(password) = self.password {
            config.password = password;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(url) = self.url {
            config.url = Some(url);
        }
        if let Some(dump_file) = self.dump_file {
            config.dump_file = dump_file;
        }
        if let Some(migration_folder) = self.migration_folder {
            config.migration_folder = migration_folder;
        }
        if let Some(migration_table) = self.migration_table {
            config.migration_table = migration_table;
        }
        if let Some(seed_tables) = self.seed_tables {
            config.seed_tables = seed_tables;
        }
        config
    }
}

/// Connection components extracted from a URL or DSN.
#[derive(Debug, Default, PartialEq, Eq)]
struct ConnectionParts {
    username: Option<String>,
    password: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    query: Option<String>,
}

impl ConnectionParts {
    fn apply(self, config: &mut Config) {
        if let Some(username) = self.username {
            config.username = username;
        }
        if let Some(password) = self.password {
            config.password = password;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(database) = self.database {
            config.database = database;
        }
    }
}

impl Config {
    /// Returns the database name, or an error when no source supplied one.
    pub fn require_database(&self) -> Result<&str, ConfigError> {
        if self.database.trim().is_empty() {
            Err(ConfigError::MissingDatabase)
        } else {
            Ok(&self.database)
        }
    }

    /// Builds the URL used to open a database connection.
    ///
    /// Built from the resolved fields so that flags and URL agree; query
    /// parameters of an explicit URL (e.g. `sslmode`) are carried over.
    pub fn connection_url(&self) -> Result<String, ConfigError> {
        let database = self.require_database()?;
        let invalid = |reason: &str| ConfigError::InvalidUrl {
            url: format!("postgres://{}:{}/{}", self.host, self.port, database),
            reason: reason.to_string(),
        };

        let mut url =
            Url::parse("postgres://localhost").map_err(|e| invalid(&e.to_string()))?;
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        url.set_host(Some(&host))
            .map_err(|e| invalid(&e.to_string()))?;
        url.set_port(Some(self.port))
            .map_err(|()| invalid("port cannot be set"))?;
        if !self.username.is_empty() {
            url.set_username(&self.username)
                .map_err(|()| invalid("username cannot be set"))?;
        }
        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|()| invalid("password cannot be set"))?;
        }
        url.set_path(&format!("/{database}"));

        if let Some(query) = self.explicit_url_query() {
            url.set_query(Some(&query));
        }

        Ok(url.into())
    }

    /// Returns a copy safe to print: passwords are masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.password.is_empty() {
            copy.password = "****".to_string();
        }
        copy.url = copy.url.as_deref().map(mask_url_password);
        copy
    }

    fn explicit_url_query(&self) -> Option<String> {
        let raw = self.url.as_deref()?;
        if raw.contains("://") {
            parse_url(raw).ok()?.query
        } else {
            None
        }
    }
}

/// Resolves the config file path: flag, then `PGMGR_CONFIG_FILE`, then the
/// default `.pgmgr.json`.
pub fn config_file_path(source: &impl ArgSource) -> PathBuf {
    non_empty(source.string(keys::CONFIG_FILE))
        .or_else(|| env_value(env_vars::CONFIG_FILE))
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from)
}

/// Overlays the fields present in a JSON config file onto `existing`.
///
/// A missing file leaves `existing` unchanged; an unreadable or malformed one
/// is an error.
pub fn load_config_file(existing: Config, path: &Path) -> Result<Config, ConfigError> {
    let settings = config::Config::builder()
        .add_source(
            config::File::from(path)
                .format(config::FileFormat::Json)
                .required(false),
        )
        .build()
        .map_err(|source| ConfigError::File {
            path: path.to_path_buf(),
            source,
        })?;

    let file: FileConfig = settings
        .try_deserialize()
        .map_err(|source| ConfigError::File {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(file.apply(existing))
}

/// Resolves the effective configuration.
///
/// `existing` holds values loaded earlier (config file or caller-built);
/// `source` holds values supplied explicitly at invocation time.
pub fn load_config(existing: Config, source: &impl ArgSource) -> Result<Config, ConfigError> {
    let mut config = existing;

    config.database = overlay_string(config.database, source, keys::DATABASE, env_vars::DATABASE);
    config.username = overlay_string(config.username, source, keys::USERNAME, env_vars::USERNAME);
    config.password = overlay_string(config.password, source, keys::PASSWORD, env_vars::PASSWORD);
    config.host = overlay_string(config.host, source, keys::HOST, env_vars::HOST);
    config.port = resolve_port(config.port, source)?;
    config.url = non_empty(source.string(keys::URL))
        .or_else(|| env_value(env_vars::URL))
        .or_else(|| non_empty(config.url));
    config.dump_file = overlay_path(config.dump_file, source, keys::DUMP_FILE, env_vars::DUMP_FILE);
    config.migration_folder = overlay_path(
        config.migration_folder,
        source,
        keys::MIGRATION_FOLDER,
        env_vars::MIGRATION_FOLDER,
    );
    config.migration_table = overlay_string(
        config.migration_table,
        source,
        keys::MIGRATION_TABLE,
        env_vars::MIGRATION_TABLE,
    );
    config.seed_tables = resolve_seed_tables(config.seed_tables, source);

    apply_defaults(&mut config);

    if let Some(raw) = config.url.clone() {
        let parts = if raw.contains("://") {
            parse_url(&raw)?
        } else {
            parse_dsn(&raw)?
        };
        parts.apply(&mut config);
    }

    Ok(config)
}

fn env_value(name: &str) -> Option<String> {
    non_empty(std::env::var(name).ok())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn overlay_string(current: String, source: &impl ArgSource, key: &str, env_name: &str) -> String {
    non_empty(source.string(key))
        .or_else(|| env_value(env_name))
        .unwrap_or(current)
}

fn overlay_path(current: PathBuf, source: &impl ArgSource, key: &str, env_name: &str) -> PathBuf {
    non_empty(source.string(key))
        .or_else(|| env_value(env_name))
        .map_or(current, PathBuf::from)
}

fn resolve_port(current: u16, source: &impl ArgSource) -> Result<u16, ConfigError> {
    // An explicit 0 means the flag was not given.
    if let Some(port) = source.int(keys::PORT).filter(|p| *p != 0) {
        return u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| ConfigError::InvalidPort {
                origin: format!("--{}", keys::PORT),
                value: port.to_string(),
            });
    }

    for name in [env_vars::PORT, env_vars::NATIVE_PORT] {
        if let Some(value) = env_value(name) {
            return value
                .trim()
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| ConfigError::InvalidPort {
                    origin: name.to_string(),
                    value,
                });
        }
    }

    Ok(if current == 0 { DEFAULT_PORT } else { current })
}

fn resolve_seed_tables(current: Vec<String>, source: &impl ArgSource) -> Vec<String> {
    let from_flag = split_patterns(source.string_list(keys::SEED_TABLES));
    if !from_flag.is_empty() {
        return from_flag;
    }

    if let Some(value) = env_value(env_vars::SEED_TABLES) {
        let from_env = split_patterns(vec![value]);
        if !from_env.is_empty() {
            return from_env;
        }
    }

    current
}

/// Flattens comma-separated entries and drops blanks.
fn split_patterns(values: Vec<String>) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

fn apply_defaults(config: &mut Config) {
    if config.host.trim().is_empty() {
        config.host = DEFAULT_HOST.to_string();
    }
    if config.port == 0 {
        config.port = DEFAULT_PORT;
    }
    if config.dump_file.as_os_str().is_empty() {
        config.dump_file = PathBuf::from(DEFAULT_DUMP_FILE);
    }
    if config.migration_folder.as_os_str().is_empty() {
        config.migration_folder = PathBuf::from(DEFAULT_MIGRATION_FOLDER);
    }
    if config.migration_table.trim().is_empty() {
        config.migration_table = DEFAULT_MIGRATION_TABLE.to_string();
    }
}

fn decode(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}

/// Parses `scheme://[user[:pass]@]host[:port]/database[?query]`.
fn parse_url(raw: &str) -> Result<ConnectionParts, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: mask_url_password(raw),
        reason: e.to_string(),
    })?;

    let database = decode(url.path().trim_start_matches('/'));
    if database.contains('/') {
        return Err(ConfigError::InvalidUrl {
            url: mask_url_password(raw),
            reason: "path must contain only the database name".to_string(),
        });
    }

    Ok(ConnectionParts {
        username: Some(decode(url.username())).filter(|u| !u.is_empty()),
        password: url.password().map(decode),
        host: url
            .host_str()
            .filter(|h| !h.is_empty())
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string()),
        port: url.port(),
        database: Some(database).filter(|d| !d.is_empty()),
        query: url.query().filter(|q| !q.is_empty()).map(String::from),
    })
}

/// Parses a libpq keyword/value string such as `host=db port=5433 dbname=app`.
///
/// Values containing spaces must be single-quoted (`password='a b'`).
fn parse_dsn(raw: &str) -> Result<ConnectionParts, ConfigError> {
    let pairs = dsn_pairs(raw).map_err(|reason| ConfigError::InvalidUrl {
        url: mask_dsn_password(raw),
        reason,
    })?;

    let mut parts = ConnectionParts::default();
    for (key, value) in pairs {
        match key.as_str() {
            "host" => parts.host = Some(value),
            "port" => {
                let port = value.parse::<u16>().map_err(|_| ConfigError::InvalidPort {
                    origin: "connection DSN".to_string(),
                    value: value.clone(),
                })?;
                parts.port = Some(port);
            }
            "user" => parts.username = Some(value),
            "password" => parts.password = Some(value),
            "dbname" => parts.database = Some(value),
            // sslmode, connect_timeout and friends are not modelled
            _ => {}
        }
    }

    Ok(parts)
}

/// Splits a keyword/value string into pairs, following libpq quoting: a value
/// may be wrapped in single quotes, and `\` escapes the next character.
fn dsn_pairs(raw: &str) -> Result<Vec<(String, String)>, String> {
    let mut pairs = Vec::new();
    let mut chars = raw.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            return Ok(pairs);
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
            key.push(c);
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if key.is_empty() || chars.next_if_eq(&'=').is_none() {
            return Err(format!("expected key=value, found '{key}'"));
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'\'').is_some() {
            loop {
                match chars.next() {
                    Some('\'') => break,
                    Some('\\') => value.extend(chars.next()),
                    Some(c) => value.push(c),
                    None => return Err(format!("unterminated quoted value for '{key}'")),
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                if c == '\\' {
                    value.extend(chars.next());
                } else {
                    value.push(c);
                }
            }
        }
        pairs.push((key, value));
    }
}

fn mask_url_password(raw: &str) -> String {
    if !raw.contains("://") {
        return mask_dsn_password(raw);
    }
    match Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some("****")).is_ok() {
                url.to_string()
            } else {
                raw.to_string()
            }
        }
        _ => raw.to_string(),
    }
}

fn mask_dsn_password(raw: &str) -> String {
    DSN_PASSWORD.replace_all(raw, "password=****").into_owned()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
