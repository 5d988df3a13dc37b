use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::Deserialize;

use crate::compose::DEFAULT_ROW_LIMIT;
use crate::scan::{default_styles, BracketStyle};

pub const CONFIG_FILENAME: &str = "docmerge.toml";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub merge: MergeSection,
    #[serde(default)]
    pub scan: ScanSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct MergeSection {
    /// Upper bound on merged rows. Excess input is truncated, not an error.
    #[serde(default)]
    pub row_limit: Option<usize>,

    /// Suffix for default output names: <stem><suffix>.docx
    #[serde(default)]
    pub output_suffix: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ScanSection {
    /// Recognized token conventions: "curly", "square", "angle".
    /// `{{name}}` is always recognized even when omitted here.
    #[serde(default)]
    pub conventions: Option<Vec<String>>,
}

impl AppConfig {
    pub fn row_limit(&self) -> usize {
        self.merge.row_limit.unwrap_or(DEFAULT_ROW_LIMIT)
    }

    pub fn output_suffix(&self) -> &str {
        self.merge.output_suffix.as_deref().unwrap_or("_merged")
    }

    pub fn styles(&self) -> anyhow::Result<Vec<BracketStyle>> {
        let list = match &self.scan.conventions {
            None => return Ok(default_styles()),
            Some(list) => list,
        };
        let mut styles: Vec<BracketStyle> = Vec::new();
        for name in list {
            let style = BracketStyle::from_name(name)
                .ok_or_else(|| anyhow!("unknown scan convention: {name:?}"))?;
            if !styles.contains(&style) {
                styles.push(style);
            }
        }
        if !styles.contains(&BracketStyle::DoubleCurly) {
            styles.insert(0, BracketStyle::DoubleCurly);
        }
        Ok(styles)
    }
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, CONFIG_FILENAME, 8) {
            return Some(p);
        }
    }
    if let Some(p) = find_file_upwards(workdir, CONFIG_FILENAME, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, CONFIG_FILENAME, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}

const DEFAULT_CONFIG_TOML: &str = r#"# docmerge configuration.

[merge]
# Upper bound on merged rows; excess data rows are dropped, not an error.
row_limit = 100

# Default output name: <template stem><suffix>.docx
output_suffix = "_merged"

[scan]
# Token conventions recognized in template text. "curly" ({{name}}) is
# always on; "square" ([name]) and "angle" (<<name>>) are optional.
conventions = ["curly", "square", "angle"]
"#;

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILENAME);
    if cfg_path.exists() && !force {
        return Err(anyhow!(
            "config exists: {} (use --force to overwrite)",
            cfg_path.display()
        ));
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("parse empty");
        assert_eq!(cfg.row_limit(), DEFAULT_ROW_LIMIT);
        assert_eq!(cfg.output_suffix(), "_merged");
        assert_eq!(cfg.styles().expect("styles"), default_styles());
    }

    #[test]
    fn default_config_text_parses_back() {
        let cfg: AppConfig = toml::from_str(DEFAULT_CONFIG_TOML).expect("parse default");
        assert_eq!(cfg.row_limit(), 100);
        assert_eq!(cfg.styles().expect("styles").len(), 3);
    }

    #[test]
    fn curly_is_always_recognized() {
        let cfg: AppConfig =
            toml::from_str("[scan]\nconventions = [\"square\"]\n").expect("parse");
        let styles = cfg.styles().expect("styles");
        assert_eq!(
            styles,
            vec![BracketStyle::DoubleCurly, BracketStyle::Square]
        );
    }

    #[test]
    fn unknown_convention_is_rejected() {
        let cfg: AppConfig =
            toml::from_str("[scan]\nconventions = [\"guillemet\"]\n").expect("parse");
        assert!(cfg.styles().is_err());
    }
}
