//! Configuration file loading.
//!
//! The file is a `key = value` subset of TOML: double-quoted strings,
//! unsigned integers, `true`/`false`, and `#` comments. Unknown keys and
//! out-of-range values are rejected.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::download::DEFAULT_CONCURRENCY;
use crate::download::constants::{DOWNLOAD_TIMEOUT_SECS, PROBE_TIMEOUT_SECS};

/// Directory name the songs are cached under.
pub const MUSIC_DIR_NAME: &str = "Boombox Music";

/// Ledger file name, stored next to the music directory.
pub const LEDGER_FILE_NAME: &str = "downloadedFiles.txt";

/// Values read from the config file; `None` means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Source links, from the comma-separated `download_urls` string.
    pub download_urls: Option<Vec<String>>,
    /// Destination root for all writes.
    pub output_dir: Option<PathBuf>,
    /// Ledger file location.
    pub ledger_path: Option<PathBuf>,
    /// Decoder hint: stream tracks from disk instead of loading them fully.
    pub stream_from_disk: Option<bool>,
    /// Byte transfer timeout in seconds.
    pub download_timeout_secs: Option<u64>,
    /// Metadata / negotiation timeout in seconds.
    pub probe_timeout_secs: Option<u64>,
    /// Transfers running at once.
    pub concurrency: Option<usize>,
    /// Default log verbosity.
    pub verbosity: Option<Verbosity>,
}

impl FileConfig {
    /// Validates config values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first out-of-range key.
    pub fn validate(&self) -> Result<()> {
        validate_timeout_secs("download_timeout_secs", self.download_timeout_secs)?;
        validate_timeout_secs("probe_timeout_secs", self.probe_timeout_secs)?;
        if let Some(concurrency) = self.concurrency
            && !(1..=100).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=100");
        }
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    /// `info`
    #[default]
    Default,
    /// `debug`
    Verbose,
    /// `error`
    Quiet,
    /// `trace`
    Debug,
}

impl Verbosity {
    /// Returns the stable string label for display output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Verbose => "verbose",
            Self::Quiet => "quiet",
            Self::Debug => "debug",
        }
    }

    /// Log filter directive for this verbosity.
    #[must_use]
    pub fn log_level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// Settings after defaults have been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Source links (may be empty).
    pub download_urls: Vec<String>,
    /// Destination root.
    pub output_dir: PathBuf,
    /// Ledger file.
    pub ledger_path: PathBuf,
    /// Decoder hint surfaced in the library listing.
    pub stream_from_disk: bool,
    /// Byte transfer timeout in seconds.
    pub download_timeout_secs: u64,
    /// Metadata / negotiation timeout in seconds.
    pub probe_timeout_secs: u64,
    /// Transfers running at once.
    pub concurrency: usize,
    /// Default log verbosity.
    pub verbosity: Verbosity,
}

impl AppConfig {
    /// Applies defaults to whatever the file set.
    ///
    /// Without an explicit ledger path the ledger sits next to the output
    /// directory, as `<output_dir>/../downloadedFiles.txt`.
    #[must_use]
    pub fn resolve(file: Option<&FileConfig>) -> Self {
        let file = file.cloned().unwrap_or_default();
        let output_dir = file.output_dir.unwrap_or_else(default_output_dir);
        let ledger_path = file
            .ledger_path
            .unwrap_or_else(|| default_ledger_path(&output_dir));
        Self {
            download_urls: file.download_urls.unwrap_or_default(),
            output_dir,
            ledger_path,
            stream_from_disk: file.stream_from_disk.unwrap_or(false),
            download_timeout_secs: file.download_timeout_secs.unwrap_or(DOWNLOAD_TIMEOUT_SECS),
            probe_timeout_secs: file.probe_timeout_secs.unwrap_or(PROBE_TIMEOUT_SECS),
            concurrency: file.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
            verbosity: file.verbosity.unwrap_or_default(),
        }
    }
}

/// `<output_dir>/../downloadedFiles.txt`.
#[must_use]
pub fn default_ledger_path(output_dir: &Path) -> PathBuf {
    output_dir
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(LEDGER_FILE_NAME)
}

/// Default cache directory.
///
/// Priority:
/// 1. `$XDG_DATA_HOME/songcache/Boombox Music`
/// 2. `$HOME/.local/share/songcache/Boombox Music`
/// 3. `./Boombox Music`
#[must_use]
pub fn default_output_dir() -> PathBuf {
    data_dir_from(env_var_non_empty_os("XDG_DATA_HOME"), env_var_non_empty_os("HOME"))
        .map_or_else(|| PathBuf::from(MUSIC_DIR_NAME), |dir| dir.join(MUSIC_DIR_NAME))
}

fn data_dir_from(xdg_data_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    if let Some(xdg) = xdg_data_home {
        return Some(PathBuf::from(xdg).join("songcache"));
    }
    home.map(|home| {
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("songcache")
    })
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
    /// Indicates whether configuration was loaded from disk.
    pub loaded_from_file: bool,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/songcache/config.toml`
/// 2. `$HOME/.config/songcache/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    config_path_from(
        env_var_non_empty_os("XDG_CONFIG_HOME"),
        env_var_non_empty_os("HOME"),
    )
}

fn config_path_from(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    if let Some(xdg) = xdg_config_home {
        return Some(PathBuf::from(xdg).join("songcache").join("config.toml"));
    }
    let home = home?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("songcache")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist; the default path is optional.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not parse.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
            loaded_from_file: true,
        });
    }

    let path = resolve_default_config_path();
    let Some(path_ref) = path.as_deref().filter(|p| p.exists()) else {
        return Ok(LoadedConfig {
            path,
            config: None,
            loaded_from_file: false,
        });
    };

    let config = load_file_config(path_ref)?;
    Ok(LoadedConfig {
        path,
        config: Some(config),
        loaded_from_file: true,
    })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

/// Parses config file contents.
///
/// # Errors
///
/// Returns an error on bad syntax, unknown keys, or invalid values.
pub fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {}", line_index + 1);

        match key {
            "download_urls" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.download_urls = Some(split_url_list(&parsed));
            }
            "output_dir" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.output_dir = Some(PathBuf::from(parsed));
            }
            "ledger_path" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.ledger_path = Some(PathBuf::from(parsed));
            }
            "stream_from_disk" => {
                cfg.stream_from_disk = Some(parse_boolean(value).with_context(invalid)?);
            }
            "download_timeout_secs" => {
                cfg.download_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "probe_timeout_secs" => {
                cfg.probe_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "concurrency" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let n = usize::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("concurrency out of range for usize"))?;
                cfg.concurrency = Some(n);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!(
                        "Invalid `verbosity` value '{}' on line {}",
                        parsed,
                        line_index + 1
                    )
                })?);
            }
            unknown => {
                bail!(
                    "Unknown configuration key: '{}' on line {}",
                    unknown,
                    line_index + 1
                );
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Splits a comma- or newline-separated link list, trimming entries and dropping empties.
#[must_use]
pub fn split_url_list(raw: &str) -> Vec<String> {
    raw.split([',', '\n', '\r'])
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_verbosity(value: &str) -> Result<Verbosity> {
    match value {
        "default" => Ok(Verbosity::Default),
        "verbose" => Ok(Verbosity::Verbose),
        "quiet" => Ok(Verbosity::Quiet),
        "debug" => Ok(Verbosity::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
