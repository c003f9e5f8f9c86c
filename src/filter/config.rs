use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// FilterRule / RuleSet
// ---------------------------------------------------------------------------

/// One named, switchable rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    pub name: String,
    /// Rule text, e.g. `NumSources greater than 2`.
    pub rule: String,
    pub description: String,
    pub enabled: bool,
}

impl FilterRule {
    pub fn new(name: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rule: rule.into(),
            description: String::new(),
            enabled: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// On-disk shape of a rule; the name is the mapping key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RuleEntry {
    rule: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    description: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Ordered rules with unique names. Insertion order is application order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<FilterRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule; names must be unique.
    pub fn insert(&mut self, rule: FilterRule) -> Result<(), ConfigError> {
        if self.get(&rule.name).is_some() {
            return Err(ConfigError::DuplicateRule(rule.name));
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FilterRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FilterRule> {
        let idx = self.rules.iter().position(|r| r.name == name)?;
        Some(self.rules.remove(idx))
    }

    /// Returns `false` if no rule has that name.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.rules.iter_mut().find(|r| r.name == name) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.rules.iter().filter(|r| r.enabled).count()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a FilterRule;
    type IntoIter = std::slice::Iter<'a, FilterRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

impl Serialize for RuleSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.rules.len()))?;
        for rule in &self.rules {
            let entry = RuleEntry {
                rule: rule.rule.clone(),
                description: rule.description.clone(),
                enabled: rule.enabled,
            };
            map.serialize_entry(&rule.name, &entry)?;
        }
        map.end()
    }
}

struct RuleSetVisitor;

impl<'de> Visitor<'de> for RuleSetVisitor {
    type Value = RuleSet;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a mapping from rule name to {rule, description, enabled}")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RuleSet, A::Error> {
        let mut set = RuleSet::new();
        while let Some((name, entry)) = access.next_entry::<String, RuleEntry>()? {
            let rule = FilterRule {
                name,
                rule: entry.rule,
                description: entry.description,
                enabled: entry.enabled,
            };
            set.insert(rule).map_err(de::Error::custom)?;
        }
        Ok(set)
    }

    fn visit_unit<E: de::Error>(self) -> Result<RuleSet, E> {
        Ok(RuleSet::new())
    }
}

impl<'de> Deserialize<'de> for RuleSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RuleSetVisitor)
    }
}

// ---------------------------------------------------------------------------
// Default rules
// ---------------------------------------------------------------------------

/// The rule set used when no configuration file is given.
pub fn default_rules() -> RuleSet {
    let rules = [
        FilterRule::new("high_mention_events", "NumMentions greater than or equal 5")
            .with_description("Keep only events with 5+ mentions"),
        FilterRule::new("has_location", "ActionGeo_Lat is not null")
            .with_description("Keep only events with geographic coordinates"),
        FilterRule::new("has_actors", "Actor1Name is not null")
            .with_description("Keep only events with identified actors"),
        FilterRule::new("goldstein_range", "GoldsteinScale between -10 and 10")
            .with_description("Keep events with moderate Goldstein scale"),
        FilterRule::new("specific_countries", "ActionGeo_CountryCode in [US, UK, FR, DE, CN]")
            .with_description("Keep only events in specific countries")
            .disabled(),
        FilterRule::new("exclude_event_types", "EventRootCode not in [20, 21, 22, 23]")
            .with_description("Exclude certain event types")
            .disabled(),
        FilterRule::new("recent_sources", "NumSources greater than 2")
            .with_description("Keep events with multiple sources"),
    ];
    RuleSet {
        rules: Vec::from(rules),
    }
}

// ---------------------------------------------------------------------------
// Loading / saving
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleFormat {
    Json,
    Yaml,
}

impl RuleFormat {
    /// Pick the encoding from the file extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "json" => Ok(RuleFormat::Json),
            "yaml" | "yml" => Ok(RuleFormat::Yaml),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

#[derive(Serialize)]
struct RulesFile<'a> {
    filter_rules: &'a RuleSet,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError {
    let path: PathBuf = path.to_path_buf();
    move |source| ConfigError::Io { path, source }
}

/// Load rules from a `.json`, `.yaml` or `.yml` file.
///
/// The rules are read from the top-level `filter_rules` mapping; a file
/// without that key is treated as a bare rule mapping. Document order is
/// kept and duplicate names are rejected.
pub fn load_rules(path: &Path) -> Result<RuleSet, ConfigError> {
    let format = RuleFormat::from_path(path)?;
    let text = std::fs::read_to_string(path).map_err(io_error(path))?;

    // Both encodings go through the YAML value model, whose mappings keep
    // insertion order and reject repeated keys. The visitor's own duplicate
    // check covers rule sets deserialized directly.
    let document: serde_yml::Value = match format {
        RuleFormat::Json => serde_json::from_str(&text)?,
        RuleFormat::Yaml => serde_yml::from_str(&text)?,
    };
    let wrapped = document.get("filter_rules").cloned();
    let rules = wrapped.unwrap_or(document);

    let set: RuleSet = serde_yml::from_value(rules)?;
    log::debug!(
        "loaded {} filter rules ({} enabled) from {}",
        set.len(),
        set.enabled_count(),
        path.display()
    );
    Ok(set)
}

/// Write `rules` under a top-level `filter_rules` key.
pub fn save_rules(path: &Path, rules: &RuleSet) -> Result<(), ConfigError> {
    let file = RulesFile { filter_rules: rules };
    let text = match RuleFormat::from_path(path)? {
        RuleFormat::Json => serde_json::to_string_pretty(&file)?,
        RuleFormat::Yaml => serde_yml::to_string(&file)?,
    };
    std::fs::write(path, text).map_err(io_error(path))
}

#[derive(Serialize)]
struct TemplateExamples {
    numeric_comparisons: &'static [&'static str],
    text_operations: &'static [&'static str],
    null_checks: &'static [&'static str],
    ranges: &'static [&'static str],
}

#[derive(Serialize)]
struct Template<'a> {
    filter_rules: &'a RuleSet,
    examples: TemplateExamples,
}

/// Rules written by [`save_template`].
pub fn template_rules() -> RuleSet {
    let rules = [
        FilterRule::new("high_mention_events", "NumMentions greater than or equal 5")
            .with_description("Keep only events with 5+ mentions"),
        FilterRule::new("has_location", "ActionGeo_Lat is not null")
            .with_description("Keep only events with geographic coordinates"),
        FilterRule::new("tone_filter", "AvgTone between -15 and 15")
            .with_description("Remove extreme tone outliers")
            .disabled(),
        FilterRule::new("country_filter", "ActionGeo_CountryCode in [US, UK, FR]")
            .with_description("Keep only specific countries")
            .disabled(),
    ];
    RuleSet {
        rules: Vec::from(rules),
    }
}

/// Write an annotated starting point for a rule file.
pub fn save_template(path: &Path) -> Result<(), ConfigError> {
    let rules = template_rules();
    let template = Template {
        filter_rules: &rules,
        examples: TemplateExamples {
            numeric_comparisons: &[
                "NumMentions greater than 10",
                "GoldsteinScale less than -5",
                "NumSources greater than or equal 3",
            ],
            text_operations: &[
                "Actor1Name contains protest",
                "Actor1Name not contains military",
                "EventCode in [030, 031, 032]",
            ],
            null_checks: &["ActionGeo_Lat is not null", "Actor2Name is null"],
            ranges: &[
                "SQLDATE between 20250301 and 20250331",
                "AvgTone between -10 and 10",
            ],
        },
    };
    let text = match RuleFormat::from_path(path)? {
        RuleFormat::Json => serde_json::to_string_pretty(&template)?,
        RuleFormat::Yaml => serde_yml::to_string(&template)?,
    };
    std::fs::write(path, text).map_err(io_error(path))?;
    log::info!("Filter rules template saved to: {}", path.display());
    Ok(())
}
