// ⚙️ Configuration
// TOML file describing the delivery logs, column names, spacing and palette

use crate::layout::LayoutConfig;
use crate::loader::{ColumnMap, DataSource, RecordLoader};
use crate::render::{Palette, RenderOptions, Renderer};
use crate::rules::{LabelNormalizer, RewriteRule};
use crate::session::{AuthGate, Credentials};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub label: String,
    pub path: PathBuf,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Hex SHA-256 of the shared password; no password when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub columns: ColumnMap,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub render: RenderOptions,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Replaces the built-in label rules, in order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<RewriteRule>>,
}

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            label: "CMH116".to_string(),
            path: PathBuf::from("03. CMH116 OFCI Log REV2.0.xlsx"),
            color: "darkblue".to_string(),
            sheet: None,
        },
        SourceConfig {
            label: "CMH120".to_string(),
            path: PathBuf::from("03. CMH120 OFCI Log REV2.0.xlsx"),
            color: "darkred".to_string(),
            sheet: None,
        },
    ]
}

impl Default for Config {
    fn default() -> Self {
        Config {
            columns: ColumnMap::default(),
            layout: LayoutConfig::default(),
            render: RenderOptions::default(),
            sources: default_sources(),
            auth: AuthConfig::default(),
            rules: None,
        }
    }
}

impl Config {
    /// Default location: `<config dir>/delivery-calendar/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "delivery-calendar").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from an explicit path (must exist) or the default location
    /// (defaults when absent). Relative source paths are resolved against
    /// the config file's directory.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Config::default()),
            },
        };

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;

        let mut config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }

        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for source in &mut self.sources {
            if source.path.is_relative() {
                source.path = base.join(&source.path);
            }
        }
    }

    pub fn data_sources(&self) -> Vec<DataSource> {
        self.sources
            .iter()
            .map(|s| DataSource {
                label: s.label.clone(),
                path: s.path.clone(),
                sheet: s.sheet.clone(),
            })
            .collect()
    }

    pub fn palette(&self) -> Palette {
        Palette::new(
            self.sources
                .iter()
                .map(|s| (s.label.clone(), s.color.clone()))
                .collect(),
        )
    }

    pub fn normalizer(&self) -> Result<LabelNormalizer> {
        match &self.rules {
            Some(rules) => LabelNormalizer::from_rules(rules.clone()).context("Invalid label rules"),
            None => Ok(LabelNormalizer::new()),
        }
    }

    pub fn loader(&self) -> Result<RecordLoader> {
        Ok(RecordLoader::new()
            .with_columns(self.columns.clone())
            .with_normalizer(self.normalizer()?))
    }

    pub fn renderer(&self) -> Renderer {
        Renderer::new(self.palette()).with_options(self.render)
    }

    pub fn auth_gate(&self) -> Result<AuthGate> {
        let credentials = self
            .auth
            .password_sha256
            .as_deref()
            .map(Credentials::from_hex)
            .transpose()
            .context("Invalid auth.password_sha256")?;
        Ok(AuthGate::new(credentials))
    }
}
