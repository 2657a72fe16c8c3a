use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use fuzzytail_color::Color;
use fuzzytail_logs::{DEFAULT_BUFFER_SIZE, DEFAULT_RETRY_INTERVAL};

/// Theme used when nothing else selects one
pub const DEFAULT_THEME: &str = "catppuccin";

/// System-wide theme directory
pub const DEFAULT_BUILTIN_THEME_DIR: &str = "/etc/fuzzytail/themes";

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FileConfig {
    pub general: GeneralConfig,
    pub themes: ThemeDirs,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneralConfig {
    pub theme: Option<String>,
    pub buffer_size: Option<usize>,
    /// Milliseconds
    pub follow_retry_interval: Option<u64>,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ThemeDirs {
    pub builtin_path: Option<PathBuf>,
    pub user_path: Option<PathBuf>,
}

impl FileConfig {
    /// Load the config file.
    ///
    /// A missing file at the default location means defaults; a missing file
    /// that was asked for explicitly is an error. The file is never created.
    pub fn load(path: &Path, explicit: bool) -> Result<Self> {
        if !explicit && !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

/// Environment variables that influence settings, read once at startup
#[derive(Debug, Default, Clone)]
pub struct EnvVars {
    pub config: Option<String>,
    pub theme: Option<String>,
    pub buffer_size: Option<String>,
    pub retry_interval_ms: Option<String>,
    pub base_color: Option<String>,
    pub no_color: Option<String>,
    pub xdg_config_home: Option<String>,
    pub home: Option<String>,
}

impl EnvVars {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            config: var("FT_CONFIG"),
            theme: var("FT_THEME"),
            buffer_size: var("FT_BUFFER_SIZE"),
            retry_interval_ms: var("FT_RETRY_INTERVAL_MS"),
            base_color: var("FT_BASE_COLOR"),
            no_color: var("NO_COLOR"),
            xdg_config_home: var("XDG_CONFIG_HOME"),
            home: var("HOME"),
        }
    }

    /// `$XDG_CONFIG_HOME/fuzzytail`, falling back to `$HOME/.config/fuzzytail`
    pub fn config_dir(&self) -> Option<PathBuf> {
        let base = match (&self.xdg_config_home, &self.home) {
            (Some(xdg), _) => PathBuf::from(xdg),
            (None, Some(home)) => Path::new(home).join(".config"),
            (None, None) => return None,
        };
        Some(base.join("fuzzytail"))
    }

    /// Expand a leading `~/`
    fn expand_home(&self, path: &Path) -> PathBuf {
        match (path.strip_prefix("~"), &self.home) {
            (Ok(rest), Some(home)) => Path::new(home).join(rest),
            _ => path.to_path_buf(),
        }
    }
}

/// Values given on the command line
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub config: Option<PathBuf>,
    pub theme: Option<String>,
    pub buffer_size: Option<usize>,
    pub retry_interval_ms: Option<u64>,
    pub no_color: bool,
}

/// Where the config file comes from and whether it was asked for
pub fn config_path(cli: &CliOverrides, env: &EnvVars) -> Option<(PathBuf, bool)> {
    if let Some(path) = &cli.config {
        return Some((path.clone(), true));
    }
    if let Some(path) = &env.config {
        return Some((env.expand_home(Path::new(path)), true));
    }
    env.config_dir().map(|dir| (dir.join("config.toml"), false))
}

/// Fully resolved settings. Built once, then passed by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub theme: String,
    pub buffer_size: usize,
    pub retry_interval: Duration,
    pub user_theme_dir: Option<PathBuf>,
    pub builtin_theme_dir: PathBuf,
    pub base_color: Option<Color>,
    pub color: bool,
}

impl Settings {
    /// Merge every layer: flag, then environment, then file, then default
    pub fn resolve(cli: &CliOverrides, env: &EnvVars, file: &FileConfig) -> Result<Self> {
        let theme = cli
            .theme
            .clone()
            .or_else(|| env.theme.clone())
            .or_else(|| file.general.theme.clone())
            .unwrap_or_else(|| DEFAULT_THEME.to_string());

        let env_buffer_size = env
            .buffer_size
            .as_deref()
            .map(|v| parse_env::<usize>("FT_BUFFER_SIZE", v))
            .transpose()?;
        let buffer_size = cli
            .buffer_size
            .or(env_buffer_size)
            .or(file.general.buffer_size)
            .unwrap_or(DEFAULT_BUFFER_SIZE);
        if buffer_size == 0 {
            bail!("buffer size must be greater than zero");
        }

        let env_interval = env
            .retry_interval_ms
            .as_deref()
            .map(|v| parse_env::<u64>("FT_RETRY_INTERVAL_MS", v))
            .transpose()?;
        let retry_interval = cli
            .retry_interval_ms
            .or(env_interval)
            .or(file.general.follow_retry_interval)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_RETRY_INTERVAL);

        let base_color = env
            .base_color
            .as_deref()
            .map(|v| {
                v.parse::<Color>()
                    .with_context(|| format!("invalid FT_BASE_COLOR `{}`", v))
            })
            .transpose()?;

        let user_theme_dir = match &file.themes.user_path {
            Some(path) => Some(env.expand_home(path)),
            None => env.config_dir().map(|dir| dir.join("themes")),
        };
        let builtin_theme_dir = file
            .themes
            .builtin_path
            .as_deref()
            .map(|path| env.expand_home(path))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BUILTIN_THEME_DIR));

        Ok(Self {
            theme,
            buffer_size,
            retry_interval,
            user_theme_dir,
            builtin_theme_dir,
            base_color,
            color: !cli.no_color && env.no_color.is_none(),
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid {} `{}`", name, value))
}
