// 🏷️ Label Rules - Rules as Data
// Ordered whole-word rewrites that turn raw equipment text into short labels

use crate::table::CellValue;
use regex::{NoExpand, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static PHASE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Phase\s+\d+$").unwrap());

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRule {
    /// Rule ID for tracking
    pub id: String,

    /// Word or phrase to match (whole words, case-insensitive)
    pub phrase: String,

    /// Inserted verbatim; empty deletes the phrase
    #[serde(default)]
    pub replacement: String,
}

impl RewriteRule {
    pub fn new(id: &str, phrase: &str, replacement: &str) -> Self {
        RewriteRule {
            id: id.to_string(),
            phrase: phrase.to_string(),
            replacement: replacement.to_string(),
        }
    }

    fn compile(&self) -> Result<Regex, RuleError> {
        if self.phrase.trim().is_empty() {
            return Err(RuleError::EmptyPhrase(self.id.clone()));
        }

        RegexBuilder::new(&format!(r"\b{}\b", regex::escape(&self.phrase)))
            .case_insensitive(true)
            .build()
            .map_err(|source| RuleError::InvalidPattern {
                id: self.id.clone(),
                source,
            })
    }
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule '{0}' has an empty phrase")]
    EmptyPhrase(String),

    #[error("rule '{id}' does not compile: {source}")]
    InvalidPattern {
        id: String,
        #[source]
        source: regex::Error,
    },
}

/// The built-in rule list. Order matters: the duplicate collapses must run
/// after the rules that produce the duplicates.
pub fn default_rules() -> Vec<RewriteRule> {
    vec![
        RewriteRule::new("switchgear", "SWITCHGEAR", "SWGR"),
        // Never fires after "switchgear"; kept so reordering stays safe
        RewriteRule::new("lv-switchgear", "LV SWITCHGEAR", "LV SWGR"),
        RewriteRule::new("mv-switchgear", "MV SWITCHGEAR", "MV SWGR"),
        RewriteRule::new("generator", "GENERATOR", ""),
        // Keeps numbered gens like "GEN 1.3A"
        RewriteRule::new("gen", "GEN", "GEN"),
        RewriteRule::new("transformer", "TRANSFORMER", ""),
        RewriteRule::new("panels", "PANELS", ""),
        RewriteRule::new("swgr-dup", "SWGR SWGR", "SWGR"),
        RewriteRule::new("lv-dup", "LV LV", "LV"),
        RewriteRule::new("mars", "MARS", "Racking"),
    ]
}

/// True when a label is just "Phase N" (any case), which marks a schedule
/// phase rather than a piece of equipment.
pub fn is_phase_marker(label: &str) -> bool {
    PHASE_MARKER.is_match(label)
}

// ============================================================================
// NORMALIZER
// ============================================================================

#[derive(Debug, Clone)]
pub struct LabelNormalizer {
    rules: Vec<(RewriteRule, Regex)>,
}

impl LabelNormalizer {
    /// Normalizer with the built-in rule list
    pub fn new() -> Self {
        // The built-in phrases are literals and always compile
        Self::from_rules(default_rules()).unwrap()
    }

    /// Build a normalizer from an ordered rule list.
    ///
    /// Rules are applied in the given order. Rules that can never fire are
    /// reported at debug level but kept.
    pub fn from_rules(rules: Vec<RewriteRule>) -> Result<Self, RuleError> {
        let compiled = rules
            .into_iter()
            .map(|rule| {
                let regex = rule.compile()?;
                Ok((rule, regex))
            })
            .collect::<Result<Vec<_>, RuleError>>()?;

        let normalizer = LabelNormalizer { rules: compiled };

        for (shadowed, by) in normalizer.shadowed_rules() {
            debug!(rule = %shadowed, shadowed_by = %by, "label rule can never match");
        }

        Ok(normalizer)
    }

    /// Build the label for a category and unit tag
    pub fn normalize(&self, category: &str, unit_tag: &str) -> String {
        self.rewrite(&format!("{} {}", category, unit_tag))
    }

    /// Apply the rule list to an already joined label
    pub fn rewrite(&self, text: &str) -> String {
        let mut label = text.to_string();

        for (rule, regex) in &self.rules {
            label = regex
                .replace_all(&label, NoExpand(&rule.replacement))
                .into_owned();
        }

        WHITESPACE.replace_all(&label, " ").trim().to_string()
    }

    /// Rewrite a text cell; any other cell comes back unchanged
    pub fn normalize_value(&self, value: &CellValue) -> CellValue {
        match value {
            CellValue::Text(text) => CellValue::Text(self.rewrite(text)),
            other => other.clone(),
        }
    }

    /// Pairs of (rule id, earlier rule id) where the earlier rule rewrites a
    /// word inside the later rule's phrase, so the later one never matches.
    pub fn shadowed_rules(&self) -> Vec<(String, String)> {
        let mut shadowed = Vec::new();

        for (idx, (rule, _)) in self.rules.iter().enumerate() {
            let earlier = self.rules[..idx].iter().find(|(prior, regex)| {
                regex.is_match(&rule.phrase)
                    && !prior.replacement.eq_ignore_ascii_case(&prior.phrase)
            });

            if let Some((prior, _)) = earlier {
                shadowed.push((rule.id.clone(), prior.id.clone()));
            }
        }

        shadowed
    }

    /// Rules in application order
    pub fn rules(&self) -> impl Iterator<Item = &RewriteRule> {
        self.rules.iter().map(|(rule, _)| rule)
    }

    /// Get number of rules loaded
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for LabelNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
