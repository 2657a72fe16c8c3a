use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::debug;

use fuzzytail_color::RuleSet;

use crate::config::Settings;

/// Themes compiled into the binary
const BUILTIN_THEMES: &[(&str, &str)] = &[
    ("catppuccin", include_str!("../themes/ft.conf.catppuccin")),
    ("dracula", include_str!("../themes/ft.conf.dracula")),
    ("tokyo-night", include_str!("../themes/ft.conf.tokyo-night")),
];

pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTIN_THEMES.iter().map(|(name, _)| *name)
}

fn builtin(name: &str) -> Option<&'static str> {
    BUILTIN_THEMES
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|(_, contents)| *contents)
}

/// Where a theme's rules are read from
#[derive(Debug, PartialEq, Eq)]
pub enum ThemeSource {
    File(PathBuf),
    Builtin(&'static str),
}

fn theme_file_name(name: &str) -> String {
    format!("ft.conf.{}", name)
}

/// Find a theme by name: user directory, then system directory, then the
/// compiled-in set
pub fn locate(name: &str, settings: &Settings) -> Result<ThemeSource> {
    if name.is_empty() || name.contains(['/', '\\']) {
        bail!("invalid theme name `{}`", name);
    }

    let file_name = theme_file_name(name);
    let dirs = settings
        .user_theme_dir
        .iter()
        .chain(std::iter::once(&settings.builtin_theme_dir));
    for dir in dirs {
        let candidate = dir.join(&file_name);
        if candidate.is_file() {
            return Ok(ThemeSource::File(candidate));
        }
    }

    match builtin(name) {
        Some(contents) => Ok(ThemeSource::Builtin(contents)),
        None => bail!(
            "unknown theme `{}` (built-in themes: {})",
            name,
            builtin_names().collect::<Vec<_>>().join(", ")
        ),
    }
}

/// Compile the rules for this run. `theme_file` bypasses the lookup.
///
/// The base color override from the settings replaces whatever the theme
/// declares.
pub fn load_rules(settings: &Settings, theme_file: Option<&Path>) -> Result<RuleSet> {
    let source = match theme_file {
        Some(path) => ThemeSource::File(path.to_path_buf()),
        None => locate(&settings.theme, settings)?,
    };

    let rules = match &source {
        ThemeSource::File(path) => {
            debug!(path = %path.display(), "loading theme file");
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read theme file {}", path.display()))?;
            RuleSet::parse(&contents)
                .with_context(|| format!("invalid theme file {}", path.display()))?
        }
        ThemeSource::Builtin(contents) => {
            debug!(theme = %settings.theme, "using built-in theme");
            RuleSet::parse(contents)
                .with_context(|| format!("invalid built-in theme `{}`", settings.theme))?
        }
    };

    Ok(match settings.base_color {
        Some(color) => rules.with_base_color(Some(color)),
        None => rules,
    })
}
