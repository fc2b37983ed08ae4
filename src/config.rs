//! TOML configuration.
//!
//! Every section is optional; a missing file section falls back to the
//! built-in defaults. See `config/gedfix.example.toml`.
//!
//! ```toml
//! [engine]
//! profile = "aggressive"
//! note_prefix = "AutoFix:"
//!
//! [profiles.careful]
//! base = "aggressive"
//! auto_merge_threshold = 99.0
//! review_threshold = 94.0
//!
//! [schema]
//! INDI = ["NAME", "SEX"]
//!
//! [report]
//! format = "text"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use gedfix_core::{ProfileOverrides, ProfileTable, StageToggles};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
    /// Required child tags per record tag; replaces the profile's schema.
    #[serde(default)]
    pub schema: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default)]
    pub note_prefix: Option<String>,
    #[serde(default)]
    pub strict: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            note_prefix: None,
            strict: false,
        }
    }
}

fn default_profile() -> String {
    "standard".to_string()
}

/// A custom profile derived from an existing one.
#[derive(Debug, Deserialize, Clone)]
pub struct ProfileConfig {
    #[serde(default = "default_base")]
    pub base: String,
    #[serde(default)]
    pub auto_merge_threshold: Option<f64>,
    #[serde(default)]
    pub review_threshold: Option<f64>,
    #[serde(default)]
    pub note_prefix: Option<String>,
    /// Stage names to switch off: dates, standardize, facts, persons, links, validate.
    #[serde(default)]
    pub disable: Vec<String>,
}

fn default_base() -> String {
    "aggressive".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Text,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    #[serde(default = "default_format")]
    pub format: ReportFormat,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
        }
    }
}

fn default_format() -> ReportFormat {
    ReportFormat::Json
}

impl Config {
    /// Built-in profiles plus the `[profiles.*]` entries.
    ///
    /// A custom profile may build on another custom profile regardless of
    /// the order they appear in.
    pub fn profile_table(&self) -> Result<ProfileTable> {
        let mut table = ProfileTable::new();
        let mut pending: Vec<(&String, &ProfileConfig)> = self.profiles.iter().collect();
        while !pending.is_empty() {
            let before = pending.len();
            let mut waiting = Vec::new();
            for (name, custom) in pending {
                let Some(base) = table.get(&custom.base) else {
                    waiting.push((name, custom));
                    continue;
                };
                let mut stages = base.stages;
                for stage in &custom.disable {
                    disable_stage(&mut stages, stage)
                        .with_context(|| format!("profiles.{}.disable", name))?;
                }
                let overrides = ProfileOverrides {
                    auto_merge_threshold: custom.auto_merge_threshold,
                    review_threshold: custom.review_threshold,
                    note_prefix: custom.note_prefix.clone(),
                    stages: Some(stages),
                    ..Default::default()
                };
                let profile = base.derive(name.as_str()).apply(&overrides);
                profile
                    .validate()
                    .with_context(|| format!("Invalid profile '{}'", name))?;
                table.insert(profile);
            }
            if waiting.len() == before {
                let (name, custom) = waiting[0];
                anyhow::bail!(
                    "profiles.{}: unknown base profile '{}'",
                    name,
                    custom.base
                );
            }
            pending = waiting;
        }
        Ok(table)
    }

    /// Overrides implied by `[engine]` and `[schema]`.
    pub fn overrides(&self) -> ProfileOverrides {
        ProfileOverrides {
            note_prefix: self.engine.note_prefix.clone(),
            strict: self.engine.strict.then_some(true),
            schema: self.schema.clone(),
            ..Default::default()
        }
    }
}

fn disable_stage(stages: &mut StageToggles, name: &str) -> Result<()> {
    match name {
        "dates" => stages.dates = false,
        "standardize" => stages.standardize = false,
        "facts" => stages.fact_dedup = false,
        "persons" => stages.person_dedup = false,
        "links" => stages.link_dedup = false,
        "validate" => stages.validate = false,
        other => anyhow::bail!(
            "Unknown stage '{}'. Must be dates, standardize, facts, persons, links, or validate.",
            other
        ),
    }
    Ok(())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate profiles and the engine's selection against them
    let table = config.profile_table()?;
    table
        .resolve(&config.engine.profile, &config.overrides())
        .with_context(|| format!("engine.profile '{}'", config.engine.profile))?;

    Ok(config)
}
