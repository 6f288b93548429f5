use serde::Deserialize;

use crate::error::GridError;

/// Root configuration, parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ListGridConfig {
    /// Backing list store.
    pub store: StoreConfig,

    /// Base list and view shown by the grid.
    pub grid: GridConfig,

    /// Expiry status column.
    #[serde(default)]
    pub status: StatusConfig,

    /// Related child list opened from a parent row.
    #[serde(default)]
    pub related: Option<RelatedConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// `"memory"` (built-in, seeded from `settings`) or `"sharepoint"`.
    #[serde(default = "default_store_kind")]
    pub kind: String,
    /// Store-specific settings, passed through untouched.
    #[serde(default)]
    pub settings: Option<toml::Value>,
}

fn default_store_kind() -> String {
    "sharepoint".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GridConfig {
    pub list_id: String,
    #[serde(default)]
    pub view_id: Option<String>,
    /// Boolean field flipped by the toggle action.
    #[serde(default)]
    pub toggle_field: Option<String>,
    /// Members of this group may edit.
    #[serde(default = "default_edit_group")]
    pub edit_group: String,
}

fn default_edit_group() -> String {
    "Editores".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Row field whose value selects the rule (e.g. a document type).
    #[serde(default)]
    pub type_field: Option<String>,
    /// Title of the list holding `key → (date field, warn days)` rules.
    #[serde(default)]
    pub rules_list: Option<String>,
    #[serde(default = "default_rules_key_field")]
    pub rules_key_field: String,
    #[serde(default = "default_warn_days")]
    pub default_warn_days: i64,
    /// Date field used when no rule matches.
    #[serde(default)]
    pub fallback_date_field: Option<String>,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            type_field: None,
            rules_list: None,
            rules_key_field: default_rules_key_field(),
            default_warn_days: default_warn_days(),
            fallback_date_field: None,
        }
    }
}

fn default_rules_key_field() -> String {
    "Title".into()
}
fn default_warn_days() -> i64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelatedConfig {
    pub child_list_id: String,
    /// Field of the parent row whose value is matched.
    pub parent_field: String,
    /// Field of the child list compared against the parent value.
    pub child_field: String,
    #[serde(default)]
    pub child_view_id: Option<String>,
}

impl ListGridConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, GridError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| GridError::Config(format!("{path}: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, GridError> {
        toml::from_str(toml_str).map_err(|e| GridError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_sections() {
        let cfg = ListGridConfig::parse(
            r#"
            [store]
            kind = "memory"

            [grid]
            list_id = "vehiculos"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.store.kind, "memory");
        assert_eq!(cfg.grid.edit_group, "Editores");
        assert!(!cfg.status.enabled);
        assert_eq!(cfg.status.default_warn_days, 30);
        assert_eq!(cfg.status.rules_key_field, "Title");
        assert!(cfg.related.is_none());
    }

    #[test]
    fn missing_grid_section_is_config_error() {
        let err = ListGridConfig::parse("[store]\nkind = \"memory\"\n").unwrap_err();
        assert!(matches!(err, GridError::Config(_)));
    }
}
