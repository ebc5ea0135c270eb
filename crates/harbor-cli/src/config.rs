//! CLI configuration from environment.

use std::env;
use std::path::PathBuf;

pub const DEFAULT_LOG_FILTER: &str = "harbor_core=info,harbor_cli=info";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Harbor definition (obstacles and rule overrides), JSON
    pub definition_path: Option<PathBuf>,
    /// Committed routes to plan against, JSON array
    pub committed_routes_path: Option<PathBuf>,
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            definition_path: get("HARBOR_DEFINITION").map(PathBuf::from),
            committed_routes_path: get("HARBOR_COMMITTED_ROUTES").map(PathBuf::from),
            log_filter: get("HARBOR_LOG")
                .or_else(|| get("RUST_LOG"))
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        }
    }

    /// Command-line values take precedence over the environment.
    pub fn with_overrides(
        mut self,
        definition_path: Option<PathBuf>,
        committed_routes_path: Option<PathBuf>,
        log_filter: Option<String>,
    ) -> Self {
        if definition_path.is_some() {
            self.definition_path = definition_path;
        }
        if committed_routes_path.is_some() {
            self.committed_routes_path = committed_routes_path;
        }
        if let Some(filter) = log_filter {
            self.log_filter = filter;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config.definition_path, None);
        assert_eq!(config.committed_routes_path, None);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn reads_harbor_variables() {
        let config = Config::from_lookup(lookup(&[
            ("HARBOR_DEFINITION", "/etc/harbor/guryongpo.json"),
            ("HARBOR_COMMITTED_ROUTES", "routes.json"),
            ("RUST_LOG", "debug"),
            ("HARBOR_LOG", "harbor_core=trace"),
        ]));
        assert_eq!(
            config.definition_path,
            Some(PathBuf::from("/etc/harbor/guryongpo.json"))
        );
        assert_eq!(config.committed_routes_path, Some(PathBuf::from("routes.json")));
        assert_eq!(config.log_filter, "harbor_core=trace");
    }

    #[test]
    fn empty_values_are_ignored() {
        let config = Config::from_lookup(lookup(&[("HARBOR_LOG", "  "), ("RUST_LOG", "warn")]));
        assert_eq!(config.log_filter, "warn");
    }

    #[test]
    fn flags_override_environment() {
        let config = Config::from_lookup(lookup(&[
            ("HARBOR_DEFINITION", "env.json"),
            ("HARBOR_COMMITTED_ROUTES", "env-routes.json"),
        ]))
        .with_overrides(Some(PathBuf::from("flag.json")), None, Some("info".to_string()));

        assert_eq!(config.definition_path, Some(PathBuf::from("flag.json")));
        assert_eq!(config.committed_routes_path, Some(PathBuf::from("env-routes.json")));
        assert_eq!(config.log_filter, "info");
    }
}
