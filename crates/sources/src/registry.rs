use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chrome::{ChromeSource, CHROME_SOURCE};
use crate::dummy::{DummySource, DUMMY_SOURCE};
use crate::traits::{SourceAdapter, SourceError};

/// Every adapter this build knows how to construct.
pub const KNOWN_SOURCES: &[&str] = &[CHROME_SOURCE, DUMMY_SOURCE];

/// The `[sources]` table of the config file.
///
/// ```toml
/// [sources]
/// enabled = ["chrome"]
///
/// [sources.chrome]
/// history_paths = ["~/.config/google-chrome/Default/History"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Sources to run, in order.
    #[serde(default)]
    pub enabled: Vec<String>,
    /// Per-source option tables, keyed by source name.
    #[serde(flatten)]
    pub options: IndexMap<String, serde_json::Value>,
}

impl SourcesConfig {
    /// Options for `name`, or `null` when the file has no table for it.
    pub fn options_for(&self, name: &str) -> serde_json::Value {
        self.options
            .get(name)
            .cloned()
            .unwrap_or(serde_json::Value::Null)
    }
}

/// A fresh, unconfigured adapter for `name`.
pub fn create_adapter(name: &str) -> Option<Box<dyn SourceAdapter>> {
    match name {
        CHROME_SOURCE => Some(Box::new(ChromeSource::new())),
        DUMMY_SOURCE => Some(Box::new(DummySource)),
        _ => None,
    }
}

/// An enabled source that could not be set up.
#[derive(Debug)]
pub struct ConfigFailure {
    pub source_name: String,
    pub error: SourceError,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("source '{0}' is already registered")]
    DuplicateName(String),
}

/// Configured adapters, kept in enabled order.
#[derive(Default)]
pub struct SourceRegistry {
    adapters: IndexMap<String, Box<dyn SourceAdapter>>,
    failures: Vec<ConfigFailure>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and configure every enabled source.
    ///
    /// A source that is unknown or rejects its options is recorded in
    /// [`failures`](Self::failures) and left out; the others still load.
    pub fn from_config(config: &SourcesConfig) -> Self {
        let mut registry = Self::new();

        for name in &config.enabled {
            if registry.adapters.contains_key(name)
                || registry.failures.iter().any(|f| &f.source_name == name)
            {
                warn!(source = %name, "source listed twice in enabled, ignoring repeat");
                continue;
            }

            let Some(mut adapter) = create_adapter(name) else {
                registry.fail(
                    name,
                    SourceError::config(
                        name,
                        format!("unknown source (known: {})", KNOWN_SOURCES.join(", ")),
                    ),
                );
                continue;
            };

            match adapter.configure(&config.options_for(name)) {
                Ok(()) => {
                    debug!(source = %name, "source configured");
                    registry.adapters.insert(name.clone(), adapter);
                }
                Err(e) => registry.fail(name, e),
            }
        }

        for name in config.options.keys() {
            if !config.enabled.contains(name) {
                debug!(source = %name, "options present for a source that is not enabled");
            }
        }

        registry
    }

    fn fail(&mut self, name: &str, error: SourceError) {
        warn!(source = %name, error = %error, "source disabled");
        self.failures.push(ConfigFailure {
            source_name: name.to_string(),
            error,
        });
    }

    /// Register an already configured adapter under its identifier.
    pub fn register(&mut self, adapter: Box<dyn SourceAdapter>) -> Result<(), RegistryError> {
        let name = adapter.identifier().to_string();
        if self.adapters.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        self.adapters.insert(name, adapter);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn SourceAdapter> {
        self.adapters.get(name).map(|a| a.as_ref())
    }

    /// Names of the usable sources, in enabled order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    pub fn failures(&self) -> &[ConfigFailure] {
        &self.failures
    }

    pub fn failure(&self, name: &str) -> Option<&ConfigFailure> {
        self.failures.iter().find(|f| f.source_name == name)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enabled: &[&str], options: serde_json::Value) -> SourcesConfig {
        let mut cfg = SourcesConfig {
            enabled: enabled.iter().map(|s| s.to_string()).collect(),
            options: IndexMap::new(),
        };
        if let serde_json::Value::Object(map) = options {
            cfg.options.extend(map);
        }
        cfg
    }

    #[test]
    fn test_from_config_keeps_enabled_order() {
        let cfg = config(
            &["dummy", "chrome"],
            serde_json::json!({ "chrome": { "history_paths": ["/tmp/History"] } }),
        );
        let registry = SourceRegistry::from_config(&cfg);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["dummy", "chrome"]);
        assert!(registry.failures().is_empty());
    }

    #[test]
    fn test_bad_options_disable_only_that_source() {
        let cfg = config(&["chrome", "dummy"], serde_json::json!({}));
        let registry = SourceRegistry::from_config(&cfg);

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["dummy"]);
        let failure = registry.failure("chrome").unwrap();
        assert!(failure.error.is_config());
        assert!(registry.get("chrome").is_none());
    }

    #[test]
    fn test_unknown_source_is_config_failure() {
        let cfg = config(&["firefox", "dummy"], serde_json::json!({}));
        let registry = SourceRegistry::from_config(&cfg);

        assert_eq!(registry.len(), 1);
        let failure = registry.failure("firefox").unwrap();
        assert!(failure.error.to_string().contains("chrome, dummy"));
    }

    #[test]
    fn test_repeated_enabled_entry_loads_once() {
        let cfg = config(&["dummy", "dummy"], serde_json::json!({}));
        let registry = SourceRegistry::from_config(&cfg);
        assert_eq!(registry.len(), 1);
        assert!(registry.failures().is_empty());
    }

    #[test]
    fn test_register_rejects_duplicate() {
        let mut registry = SourceRegistry::new();
        registry.register(Box::new(DummySource)).unwrap();
        assert!(matches!(
            registry.register(Box::new(DummySource)),
            Err(RegistryError::DuplicateName(name)) if name == "dummy"
        ));
    }

    #[test]
    fn test_sources_config_from_toml_shape() {
        let cfg: SourcesConfig = serde_json::from_value(serde_json::json!({
            "enabled": ["chrome"],
            "chrome": { "history_paths": ["~/History"] },
        }))
        .unwrap();
        assert_eq!(cfg.enabled, vec!["chrome".to_string()]);
        assert_eq!(
            cfg.options_for("chrome"),
            serde_json::json!({ "history_paths": ["~/History"] })
        );
        assert_eq!(cfg.options_for("dummy"), serde_json::Value::Null);
    }
}
