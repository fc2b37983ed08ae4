//! The `fix` and `scan` commands.
//!
//! Reads the input bytes, decodes them, runs the engine and writes the
//! transformed document (unless `--dry-run`) and the report. All
//! transformation logic lives in `gedfix-core`; this module only does I/O.
//!
//! # Encoding
//!
//! Input is taken as UTF-8 when it decodes as such (a byte-order mark is
//! stripped and written back), otherwise as Latin-1 (a leading BOM is
//! still dropped). Output uses the input
//! encoding; if a Latin-1 document ends up with characters Latin-1 cannot
//! carry, it is written as UTF-8 instead.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gedfix_core::{Engine, Report, StageToggles};
use tracing::{info, warn};

use crate::config::{Config, ReportFormat};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8 { bom: bool },
    Latin1,
}

#[derive(Debug)]
pub struct Decoded {
    pub text: String,
    pub encoding: Encoding,
}

pub fn decode(bytes: &[u8]) -> Decoded {
    let (bom, body) = match bytes.strip_prefix(UTF8_BOM) {
        Some(rest) => (true, rest),
        None => (false, bytes),
    };
    match std::str::from_utf8(body) {
        Ok(text) => Decoded {
            text: text.to_string(),
            encoding: Encoding::Utf8 { bom },
        },
        Err(_) => Decoded {
            text: body.iter().map(|&b| b as char).collect(),
            encoding: Encoding::Latin1,
        },
    }
}

pub fn encode(text: &str, encoding: Encoding) -> Vec<u8> {
    match encoding {
        Encoding::Utf8 { bom } => {
            let mut out = Vec::with_capacity(text.len() + 3);
            if bom {
                out.extend_from_slice(UTF8_BOM);
            }
            out.extend_from_slice(text.as_bytes());
            out
        }
        Encoding::Latin1 => {
            if text.chars().all(|c| (c as u32) <= 0xFF) {
                text.chars().map(|c| c as u8).collect()
            } else {
                warn!("output contains characters outside Latin-1; writing UTF-8");
                text.as_bytes().to_vec()
            }
        }
    }
}

/// Options for `gedfix fix`, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct FixOptions {
    pub input: PathBuf,
    pub out: Option<PathBuf>,
    pub profile: Option<String>,
    pub dry_run: bool,
    pub report: Option<PathBuf>,
    pub format: Option<ReportFormat>,
    pub note_prefix: Option<String>,
    pub auto_merge_threshold: Option<f64>,
    pub review_threshold: Option<f64>,
    pub strict: bool,
}

/// `family.ged` → `family.fixed.ged`
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ged".to_string());
    input.with_file_name(format!("{}.fixed.{}", stem, ext))
}

fn read_input(path: &Path) -> Result<Decoded> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;
    Ok(decode(&bytes))
}

pub fn run_fix(config: &Config, opts: &FixOptions) -> Result<()> {
    let input = read_input(&opts.input)?;

    let table = config.profile_table()?;
    let name = opts
        .profile
        .clone()
        .unwrap_or_else(|| config.engine.profile.clone());
    let mut overrides = config.overrides();
    if opts.note_prefix.is_some() {
        overrides.note_prefix = opts.note_prefix.clone();
    }
    if opts.auto_merge_threshold.is_some() {
        overrides.auto_merge_threshold = opts.auto_merge_threshold;
    }
    if opts.review_threshold.is_some() {
        overrides.review_threshold = opts.review_threshold;
    }
    if opts.strict {
        overrides.strict = Some(true);
    }
    let engine = Engine::from_table(&table, &name, &overrides)?;

    let output = engine
        .run(&input.text, opts.dry_run)
        .with_context(|| format!("Failed to process {}", opts.input.display()))?;

    if opts.dry_run {
        info!("dry run: no output written");
    } else {
        let out = opts
            .out
            .clone()
            .unwrap_or_else(|| default_output_path(&opts.input));
        std::fs::write(&out, encode(&output.text, input.encoding))
            .with_context(|| format!("Failed to write output file: {}", out.display()))?;
        info!(path = %out.display(), "wrote transformed document");
    }

    let format = opts.format.unwrap_or(config.report.format);
    emit_report(&output.report, format, opts.report.as_deref())
}

/// Date classification and validation only; never writes the document.
pub fn run_scan(
    config: &Config,
    input_path: &Path,
    report: Option<&Path>,
    format: Option<ReportFormat>,
) -> Result<()> {
    let input = read_input(input_path)?;
    let table = config.profile_table()?;
    let mut overrides = config.overrides();
    overrides.stages = Some(StageToggles::scan());
    let engine = Engine::from_table(&table, &config.engine.profile, &overrides)?;
    let output = engine
        .run(&input.text, true)
        .with_context(|| format!("Failed to process {}", input_path.display()))?;
    emit_report(&output.report, format.unwrap_or(config.report.format), report)
}

fn emit_report(report: &Report, format: ReportFormat, dest: Option<&Path>) -> Result<()> {
    let rendered = match format {
        ReportFormat::Json => report.to_json().context("Failed to serialize report")?,
        ReportFormat::Text => report.to_text(),
    };
    match dest {
        Some(path) => {
            std::fs::write(path, rendered.as_bytes())
                .with_context(|| format!("Failed to write report: {}", path.display()))?;
            info!(path = %path.display(), "wrote report");
        }
        None => println!("{}", rendered.trim_end()),
    }
    Ok(())
}

/// `gedfix profiles`
pub fn list_profiles(config: &Config) -> Result<()> {
    let table = config.profile_table()?;
    println!("{:<16} {:>6} {:>7}  STAGES", "PROFILE", "AUTO", "REVIEW");
    for profile in table.iter() {
        let s = profile.stages;
        let stages: Vec<&str> = [
            (s.dates, "dates"),
            (s.standardize, "standardize"),
            (s.fact_dedup, "facts"),
            (s.person_dedup, "persons"),
            (s.link_dedup, "links"),
            (s.validate, "validate"),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, name)| *name)
        .collect();
        let marker = if profile.name == config.engine.profile {
            "*"
        } else {
            " "
        };
        println!(
            "{}{:<15} {:>6.1} {:>7.1}  {}",
            marker,
            profile.name,
            profile.auto_merge_threshold,
            profile.review_threshold,
            stages.join(", ")
        );
    }
    Ok(())
}
