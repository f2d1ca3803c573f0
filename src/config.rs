//! Host configuration loaded from a TOML file.
//!
//! Every section is optional; a missing section or field takes its
//! default. A minimal file only lists `[[sources]]`.
//!
//! ```toml
//! [engine]
//! pool_size = 4
//! per_source_timeout_ms = 20000
//!
//! [[sources]]
//! id = "gudvin"
//! kind = "selector"
//! search_url = "https://gudvin.example/?search={query}"
//! base_url = "https://gudvin.example/"
//! card = "div.product-card"
//! name = { selector = "a.product-title" }
//! link = { selector = "a", attrs = ["href"] }
//!
//! [[sources]]
//! id = "stock"
//! kind = "fixture"
//! path = "fixtures/stock.json"
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use procura_search::{EngineConfig, HttpConfig, LexiconConfig, SelectorSpec};
use serde::{Deserialize, Serialize};

use crate::error::{ProcuraError, Result};

/// Default warm-up interval: three hours.
pub const DEFAULT_WARMUP_INTERVAL_SECS: u64 = 3 * 60 * 60;

/// Complete host configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcuraConfig {
    /// Search engine settings.
    pub engine: EngineConfig,
    /// HTTP session settings.
    pub http: HttpConfig,
    /// Catalogues to search.
    pub sources: Vec<SourceConfig>,
    /// Ranking vocabulary overrides.
    pub lexicon: LexiconConfig,
    /// Periodic cache warm-up.
    pub warmup: WarmupConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

/// One catalogue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Stable source key, e.g. `"gudvin"`.
    pub id: String,
    /// Disabled sources are not registered.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// How listings are obtained.
    #[serde(flatten)]
    pub kind: SourceKind,
}

fn default_true() -> bool {
    true
}

/// Adapter backing a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// Scrape an HTML search page with CSS selectors.
    Selector(SelectorSpec),
    /// Serve a JSON file of listings.
    Fixture {
        /// JSON array of listings. Relative paths resolve against the
        /// config file's directory.
        path: PathBuf,
        /// Artificial latency per fetch.
        #[serde(default)]
        delay_ms: u64,
    },
}

/// Periodic refresh of popular queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupConfig {
    /// Whether `procura warmup` keeps running.
    pub enabled: bool,
    /// Pause between rounds in seconds.
    pub interval_secs: u64,
    /// Run the first round at startup instead of after one interval.
    pub run_immediately: bool,
    /// Queries refreshed each round.
    pub queries: Vec<String>,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: DEFAULT_WARMUP_INTERVAL_SECS,
            run_immediately: false,
            queries: Vec::new(),
        }
    }
}

/// Log output settings. `RUST_LOG` overrides `filter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives.
    pub filter: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
    /// Also write a daily rolling log file into this directory.
    pub directory: Option<PathBuf>,
    /// File name prefix for the rolling log.
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "procura=info,procura_search=info".into(),
            json: false,
            directory: None,
            file_prefix: "procura.log".into(),
        }
    }
}

impl ProcuraConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing fields. Relative fixture and morphology paths are resolved
    /// against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ProcuraError::Config`] if the text is not valid TOML for
    /// this schema.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ProcuraError::Config(e.to_string()))
    }

    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid engine or HTTP settings, no enabled
    /// sources, duplicate source ids, or an enabled warm-up with a zero
    /// interval or no queries.
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.http.validate()?;

        let mut seen = BTreeSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(ProcuraError::Config("source id must not be empty".into()));
            }
            if !seen.insert(source.id.as_str()) {
                return Err(ProcuraError::Config(format!(
                    "source {} is listed twice",
                    source.id
                )));
            }
        }
        if !self.sources.iter().any(|s| s.enabled) {
            return Err(ProcuraError::Config("no enabled sources configured".into()));
        }

        if self.warmup.enabled {
            if self.warmup.interval_secs == 0 {
                return Err(ProcuraError::Config(
                    "warmup.interval_secs must be greater than 0".into(),
                ));
            }
            if self.warmup.queries.is_empty() {
                return Err(ProcuraError::Config(
                    "warmup is enabled but warmup.queries is empty".into(),
                ));
            }
        }
        Ok(())
    }

    /// Sources that should be registered.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let fixtures = self
            .sources
            .iter_mut()
            .filter_map(|source| match &mut source.kind {
                SourceKind::Fixture { path, .. } => Some(path),
                _ => None,
            });
        for path in fixtures.chain(self.lexicon.morphology.as_mut()) {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [engine]
        pool_size = 4
        per_source_timeout_ms = 20000

        [http]
        user_agent = "ProcuraTest/1.0"

        [[sources]]
        id = "gudvin"
        kind = "selector"
        search_url = "https://gudvin.example/?search={query}"
        base_url = "https://gudvin.example/"
        card = "div.product-card"
        name = { selector = "a.product-title" }
        link = { selector = "a", attrs = ["href"] }
        pack = { selector = ".qty" }
        pack_pattern = 'уп[:\s]*(\d+)\s*шт'

        [[sources]]
        id = "stock"
        kind = "fixture"
        path = "stock.json"
        delay_ms = 25

        [[sources]]
        id = "old"
        kind = "fixture"
        path = "/srv/old.json"
        enabled = false

        [warmup]
        enabled = true
        queries = ["стакан", "крышка"]

        [lexicon]
        morphology = "dict.opcorpora.txt"

        [lexicon.boost_terms]
        "бумажный" = 5.0
    "#;

    #[test]
    fn defaults_are_valid_except_for_sources() {
        let config = ProcuraConfig::default();
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.warmup.interval_secs, 10_800);
        assert!(!config.warmup.enabled);
        assert_eq!(config.logging.filter, "procura=info,procura_search=info");
        assert!(matches!(config.validate(), Err(ProcuraError::Config(_))));
    }

    #[test]
    fn parses_every_section() {
        let config = ProcuraConfig::from_toml(SAMPLE).expect("parse");
        assert_eq!(config.engine.pool_size, 4);
        let defaults = EngineConfig::default();
        assert_eq!(config.engine.cache_ttl_secs, defaults.cache_ttl_secs);
        assert_eq!(config.http.user_agent.as_deref(), Some("ProcuraTest/1.0"));
        assert_eq!(config.sources.len(), 3);

        let SourceKind::Selector(spec) = &config.sources[0].kind else {
            panic!("expected selector source");
        };
        assert_eq!(spec.card, "div.product-card");
        assert_eq!(spec.link.attrs, ["href"]);
        assert!(spec.price.is_none());
        assert!(config.sources[0].enabled);

        assert_eq!(
            config.sources[1].kind,
            SourceKind::Fixture {
                path: PathBuf::from("stock.json"),
                delay_ms: 25
            }
        );
        assert!(!config.sources[2].enabled);
        assert_eq!(config.enabled_sources().count(), 2);

        assert_eq!(config.warmup.queries, ["стакан", "крышка"]);
        let boosts = config.lexicon.boost_terms.as_ref().expect("boosts");
        assert_eq!(boosts.get("бумажный"), Some(&5.0));
        assert!(config.lexicon.synonyms.is_none());
        let morphology = config.lexicon.morphology.as_deref();
        assert_eq!(morphology, Some(Path::new("dict.opcorpora.txt")));

        config.validate().expect("valid");
    }

    #[test]
    fn from_file_resolves_relative_fixture_paths() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("procura.toml");
        let mut file = std::fs::File::create(&path).expect("create");
        file.write_all(SAMPLE.as_bytes()).expect("write");

        let config = ProcuraConfig::from_file(&path).expect("load");
        assert_eq!(
            config.sources[1].kind,
            SourceKind::Fixture {
                path: dir.path().join("stock.json"),
                delay_ms: 25
            }
        );
        let SourceKind::Fixture { path: absolute, .. } = &config.sources[2].kind else {
            panic!("expected fixture source");
        };
        assert_eq!(absolute, Path::new("/srv/old.json"));
        let morphology = config.lexicon.morphology.expect("morphology");
        assert_eq!(morphology, dir.path().join("dict.opcorpora.txt"));
    }

    #[test]
    fn from_file_errors() {
        let missing = ProcuraConfig::from_file(Path::new("/nonexistent/procura.toml"));
        assert!(matches!(missing, Err(ProcuraError::Io(_))));

        let invalid = ProcuraConfig::from_toml("this is not valid toml {{{");
        assert!(matches!(invalid, Err(ProcuraError::Config(_))));

        let unknown_kind = ProcuraConfig::from_toml(
            r#"
            [[sources]]
            id = "x"
            kind = "database"
            "#,
        );
        assert!(unknown_kind.is_err());
    }

    #[test]
    fn validation_rejects_bad_sections() {
        let base = ProcuraConfig::from_toml(SAMPLE).expect("parse");

        let mut duplicate = base.clone();
        duplicate.sources[1].id = "gudvin".into();
        assert!(duplicate.validate().is_err());

        let mut zero_pool = base.clone();
        zero_pool.engine.pool_size = 0;
        assert!(matches!(zero_pool.validate(), Err(ProcuraError::Search(_))));

        let mut no_queries = base.clone();
        no_queries.warmup.queries.clear();
        assert!(no_queries.validate().is_err());

        let mut zero_interval = base.clone();
        zero_interval.warmup.interval_secs = 0;
        assert!(zero_interval.validate().is_err());

        let mut all_disabled = base;
        for source in &mut all_disabled.sources {
            source.enabled = false;
        }
        assert!(all_disabled.validate().is_err());
    }
}
