//! Name and place standardizer.
//!
//! For each standardized tag a [`FrequencyIndex`] groups every attested
//! value by its folded key (Unicode NFD, combining marks dropped, lowercase,
//! collapsed whitespace; for `PLAC` also no spaces around commas). A key
//! with more than one surface form has all its values rewritten to the most
//! frequent form, ties going to the form seen first. Nothing is invented:
//! the chosen spelling always occurs somewhere in the document.

use std::collections::HashMap;

use tracing::debug;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::profile::Profile;
use crate::report::ReportBuilder;
use crate::tree::Document;

pub const STAGE: &str = "standardize";

/// Fold a value into its comparison key.
pub fn fold(tag: &str, value: &str) -> String {
    let stripped: String = value.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let collapsed = stripped
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if tag == "PLAC" {
        collapsed
            .split(',')
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(",")
    } else {
        collapsed
    }
}

#[derive(Debug)]
struct SurfaceForm {
    value: String,
    count: usize,
    first_seen: usize,
}

/// Scoped `(tag, folded key) → surface forms` table for one run.
#[derive(Debug, Default)]
pub struct FrequencyIndex {
    forms: HashMap<(String, String), Vec<SurfaceForm>>,
    seen: usize,
}

impl FrequencyIndex {
    pub fn build(doc: &Document, profile: &Profile) -> Self {
        let mut index = Self::default();
        doc.walk(|_, node| {
            if profile.is_standardized_tag(node.tag()) {
                index.record(node.tag(), node.value());
            }
        });
        index
    }

    fn record(&mut self, tag: &str, value: &str) {
        let key = fold(tag, value);
        if key.is_empty() {
            return;
        }
        let order = self.seen;
        self.seen += 1;
        let forms = self.forms.entry((tag.to_string(), key)).or_default();
        match forms.iter_mut().find(|f| f.value == value) {
            Some(form) => form.count += 1,
            None => forms.push(SurfaceForm {
                value: value.to_string(),
                count: 1,
                first_seen: order,
            }),
        }
    }

    /// The spelling `value` should be written as, when it differs.
    pub fn canonical(&self, tag: &str, value: &str) -> Option<&str> {
        let forms = self.forms.get(&(tag.to_string(), fold(tag, value)))?;
        if forms.len() < 2 {
            return None;
        }
        let best = forms.iter().fold(None::<&SurfaceForm>, |best, form| match best {
            Some(b) if b.count > form.count || (b.count == form.count && b.first_seen < form.first_seen) => {
                Some(b)
            }
            _ => Some(form),
        })?;
        (best.value != value).then_some(best.value.as_str())
    }

    /// Keys that carry more than one spelling.
    pub fn variant_keys(&self) -> usize {
        self.forms.values().filter(|f| f.len() > 1).count()
    }
}

pub fn standardize(doc: &mut Document, profile: &Profile, report: &mut ReportBuilder) {
    let index = FrequencyIndex::build(doc, profile);
    debug!(variant_keys = index.variant_keys(), "standardize: frequency index built");
    if index.variant_keys() == 0 {
        return;
    }
    let mut stage = report.stage(STAGE);
    doc.walk_mut(|owner, node| {
        if !profile.is_standardized_tag(node.tag()) {
            return;
        }
        if let Some(canonical) = index.canonical(node.tag(), node.value()) {
            let canonical = canonical.to_string();
            let before = node.value().to_string();
            node.set_value(canonical.clone());
            stage.change("spelling_variant", owner, node.tag(), Some(before), Some(canonical));
        }
    });
}
