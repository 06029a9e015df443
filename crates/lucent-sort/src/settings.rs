use serde::{Deserialize, Serialize};

/// User-facing sort behavior. Consulted when a strategy is selected and when
/// a chunk is registered for triggering; the core never stores it globally.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Never sort; every chunk gets the no-sorting strategy.
    Off,
    /// Restrict to strategies that sort at most once per build.
    Static,
    /// Full heuristic, including continuously re-sorted strategies.
    #[default]
    Dynamic,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SortSettings {
    #[serde(default)]
    pub mode: SortMode,
    /// Skip BSP construction and use the topo/distance sorter for all
    /// dynamically sorted chunks. Diagnostic aid, off by default.
    #[serde(default)]
    pub only_topo_sort: bool,
}

impl SortSettings {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mode_from_toml() {
        let s = SortSettings::from_toml_str("mode = \"static\"").unwrap();
        assert_eq!(s.mode, SortMode::Static);
        assert!(!s.only_topo_sort);
    }

    #[test]
    fn empty_config_defaults_to_dynamic() {
        let s = SortSettings::from_toml_str("").unwrap();
        assert_eq!(s.mode, SortMode::Dynamic);
    }
}
