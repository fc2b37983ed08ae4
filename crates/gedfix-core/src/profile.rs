//! Rule profiles.
//!
//! A [`Profile`] is an immutable bundle of everything that tunes a run:
//! which stages are enabled, the merge thresholds, the annotation prefix,
//! and the scoring weights. Profiles live in a [`ProfileTable`] that the
//! caller owns and may extend; nothing here reads files.
//!
//! # Built-in profiles
//!
//! | Name            | Stages                         | Auto merge | Review |
//! |-----------------|--------------------------------|-----------:|-------:|
//! | `standard`      | dates, standardize             |        n/a |    n/a |
//! | `aggressive`    | all                            |         98 |     92 |
//! | `ultra`         | all                            |         95 |     88 |
//! | `comprehensive` | all                            |        100 |     85 |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ProfileError;

/// Events and attributes deduplicated per owner; `MARR` is the family event.
pub const DEFAULT_FACT_TAGS: [&str; 23] = [
    "BIRT", "DEAT", "CHR", "BAPM", "BURI", "CREM", "ADOP", "CONF", "FCOM", "ORDN", "NATU", "EMIG",
    "IMMI", "CENS", "PROB", "WILL", "GRAD", "RETI", "EVEN", "OCCU", "RESI", "EDUC", "MARR",
];

pub const DEFAULT_NOTE_PREFIX: &str = "AutoFix:";

/// Per-stage on/off switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageToggles {
    pub dates: bool,
    pub standardize: bool,
    pub fact_dedup: bool,
    pub person_dedup: bool,
    pub link_dedup: bool,
    pub validate: bool,
}

impl StageToggles {
    pub fn all() -> Self {
        Self {
            dates: true,
            standardize: true,
            fact_dedup: true,
            person_dedup: true,
            link_dedup: true,
            validate: true,
        }
    }

    pub fn normalizers_only() -> Self {
        Self {
            dates: true,
            standardize: true,
            fact_dedup: false,
            person_dedup: false,
            link_dedup: false,
            validate: false,
        }
    }

    /// Read-only inspection: date classification and validation.
    pub fn scan() -> Self {
        Self {
            dates: true,
            standardize: false,
            fact_dedup: false,
            person_dedup: false,
            link_dedup: false,
            validate: true,
        }
    }
}

/// Completeness Score weights for one fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletenessWeights {
    pub existence: u32,
    pub date: u32,
    pub place: u32,
    pub source: u32,
    pub note: u32,
    /// Per descendant two or more levels below the fact.
    pub deep_descendant: u32,
}

impl Default for CompletenessWeights {
    fn default() -> Self {
        Self {
            existence: 1,
            date: 10,
            place: 5,
            source: 3,
            note: 2,
            deep_descendant: 1,
        }
    }
}

/// Similarity Score weights for a pair of persons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityWeights {
    pub same_birth_year: f64,
    pub near_birth_year: f64,
    /// Largest year difference still counted as near.
    pub near_year_window: u32,
    /// Added (usually negative) when the years differ by more than `far_year_window`.
    pub far_birth_year: f64,
    pub far_year_window: u32,
    pub same_sex: f64,
    pub different_sex: f64,
    pub cap: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            same_birth_year: 20.0,
            near_birth_year: 10.0,
            near_year_window: 2,
            far_birth_year: -15.0,
            far_year_window: 10,
            same_sex: 5.0,
            different_sex: -10.0,
            cap: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub stages: StageToggles,
    pub auto_merge_threshold: f64,
    pub review_threshold: f64,
    pub note_prefix: String,
    /// Fail the whole run on an unverifiable merge.
    pub strict: bool,
    pub fact_tags: Vec<String>,
    pub standardized_tags: Vec<String>,
    pub completeness: CompletenessWeights,
    pub similarity: SimilarityWeights,
    /// Required child tags per record tag.
    pub schema: BTreeMap<String, Vec<String>>,
}

impl Profile {
    fn builtin(name: &str, stages: StageToggles, auto: f64, review: f64) -> Self {
        Self {
            name: name.to_string(),
            stages,
            auto_merge_threshold: auto,
            review_threshold: review,
            note_prefix: DEFAULT_NOTE_PREFIX.to_string(),
            strict: false,
            fact_tags: strings(&DEFAULT_FACT_TAGS),
            standardized_tags: strings(&["NAME", "SURN", "PLAC"]),
            completeness: CompletenessWeights::default(),
            similarity: SimilarityWeights::default(),
            schema: BTreeMap::from([("INDI".to_string(), strings(&["NAME"]))]),
        }
    }

    /// Derive a new profile from this one under another name.
    pub fn derive(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    pub fn is_fact_tag(&self, tag: &str) -> bool {
        self.fact_tags.iter().any(|t| t == tag)
    }

    pub fn is_standardized_tag(&self, tag: &str) -> bool {
        self.standardized_tags.iter().any(|t| t == tag)
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        check_threshold("auto_merge_threshold", self.auto_merge_threshold)?;
        check_threshold("review_threshold", self.review_threshold)?;
        if self.review_threshold > self.auto_merge_threshold {
            return Err(ProfileError::InvertedThresholds {
                review: self.review_threshold,
                auto: self.auto_merge_threshold,
            });
        }
        if self.note_prefix.trim().is_empty() {
            return Err(ProfileError::EmptyNotePrefix);
        }
        Ok(())
    }

    pub fn apply(&self, overrides: &ProfileOverrides) -> Self {
        let mut profile = self.clone();
        if let Some(v) = overrides.auto_merge_threshold {
            profile.auto_merge_threshold = v;
        }
        if let Some(v) = overrides.review_threshold {
            profile.review_threshold = v;
        }
        if let Some(v) = &overrides.note_prefix {
            profile.note_prefix = v.clone();
        }
        if let Some(v) = overrides.strict {
            profile.strict = v;
        }
        if let Some(v) = overrides.stages {
            profile.stages = v;
        }
        if let Some(v) = &overrides.schema {
            profile.schema = v.clone();
        }
        profile
    }
}

fn check_threshold(name: &'static str, value: f64) -> Result<(), ProfileError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ProfileError::InvalidThreshold { name, value })
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Caller-supplied adjustments applied on top of a named profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileOverrides {
    pub auto_merge_threshold: Option<f64>,
    pub review_threshold: Option<f64>,
    pub note_prefix: Option<String>,
    pub strict: Option<bool>,
    pub stages: Option<StageToggles>,
    pub schema: Option<BTreeMap<String, Vec<String>>>,
}

/// Ordered name → profile table.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileTable {
    profiles: Vec<Profile>,
}

impl Default for ProfileTable {
    fn default() -> Self {
        Self {
            profiles: vec![
                Profile::builtin("standard", StageToggles::normalizers_only(), 98.0, 92.0),
                Profile::builtin("aggressive", StageToggles::all(), 98.0, 92.0),
                Profile::builtin("ultra", StageToggles::all(), 95.0, 88.0),
                Profile::builtin("comprehensive", StageToggles::all(), 100.0, 85.0),
            ],
        }
    }
}

impl ProfileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.iter()
    }

    /// Insert or replace by name; returns the replaced profile.
    pub fn insert(&mut self, profile: Profile) -> Option<Profile> {
        match self.profiles.iter_mut().find(|p| p.name == profile.name) {
            Some(slot) => Some(std::mem::replace(slot, profile)),
            None => {
                self.profiles.push(profile);
                None
            }
        }
    }

    /// Look up `name`, apply `overrides`, and validate the result.
    pub fn resolve(&self, name: &str, overrides: &ProfileOverrides) -> Result<Profile, ProfileError> {
        let base = self
            .get(name)
            .ok_or_else(|| ProfileError::UnknownProfile(name.to_string()))?;
        let profile = base.apply(overrides);
        profile.validate()?;
        Ok(profile)
    }
}
