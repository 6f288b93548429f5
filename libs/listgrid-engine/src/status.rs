//! Expiry status ("semaforo") derived from a per-row date and a warning window.

use std::collections::HashMap;

use chrono::{Local, NaiveDate};
use listgrid_api::{ListStore, Row};
use serde::Serialize;
use serde_json::Value;

use crate::config::StatusConfig;
use crate::error::GridError;
use crate::value::{calendar_date, parse_number, scalar_text};

/// Items read from the rule list.
pub const RULES_TOP: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExpiryStatus {
    Current,
    ExpiringSoon,
    Expired,
}

impl ExpiryStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ExpiryStatus::Current => "Vigente",
            ExpiryStatus::ExpiringSoon => "Por vencer",
            ExpiryStatus::Expired => "Vencido",
        }
    }
}

impl std::fmt::Display for ExpiryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Status of a date relative to `today`, by calendar day.
///
/// Missing or unparseable dates count as expired.
pub fn expiry_status(raw_date: Option<&str>, warn_days: i64, today: NaiveDate) -> ExpiryStatus {
    let Some(date) = raw_date.and_then(calendar_date) else {
        return ExpiryStatus::Expired;
    };
    if date < today {
        return ExpiryStatus::Expired;
    }
    if (date - today).num_days() <= warn_days {
        ExpiryStatus::ExpiringSoon
    } else {
        ExpiryStatus::Current
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRule {
    pub date_field: String,
    pub warn_days: i64,
}

/// Rules keyed by the trimmed, lowercased rule key.
#[derive(Debug, Clone, Default)]
pub struct StatusRules {
    rules: HashMap<String, StatusRule>,
}

impl StatusRules {
    /// Build from rule-list rows: `key_field` (falling back to `Title`) selects,
    /// `campo` names the date field, `amarillo` holds the warning days.
    pub fn from_rows(rows: &[Row], key_field: &str) -> Self {
        let mut rules = HashMap::new();
        for row in rows {
            let key = [key_field, "Title"]
                .iter()
                .filter_map(|k| row.get(*k))
                .find(|v| !v.is_null())
                .and_then(scalar_text)
                .unwrap_or_default()
                .trim()
                .to_lowercase();
            let date_field = row
                .get("campo")
                .and_then(scalar_text)
                .unwrap_or_default()
                .trim()
                .to_string();
            if key.is_empty() || date_field.is_empty() {
                continue;
            }
            let warn_days = row
                .get("amarillo")
                .and_then(parse_number)
                .filter(|n| n.is_finite())
                .map_or(0, |n| n.trunc() as i64);
            rules.insert(key, StatusRule { date_field, warn_days });
        }
        Self { rules }
    }

    /// Read the rule list named `list_title`.
    pub async fn load(
        store: &dyn ListStore,
        list_title: &str,
        key_field: &str,
    ) -> Result<Self, GridError> {
        let list = store
            .find_list(list_title)
            .await
            .map_err(|e| GridError::Store(e.with_context(format!("rule list '{list_title}'"))))?;
        let select: Vec<String> = ["Id", "Title", "campo", "amarillo", key_field]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = store.items(&list.id, &select, RULES_TOP).await?;
        let rules = Self::from_rows(&rows, key_field);
        tracing::debug!(list = %list_title, rules = rules.len(), "loaded status rules");
        Ok(rules)
    }

    pub fn get(&self, key: &str) -> Option<&StatusRule> {
        self.rules.get(&key.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Everything needed to compute a row's status.
#[derive(Debug, Clone)]
pub struct StatusPolicy {
    pub type_field: Option<String>,
    pub rules: StatusRules,
    pub default_warn_days: i64,
    pub fallback_date_field: Option<String>,
}

impl StatusPolicy {
    pub fn new(config: &StatusConfig, rules: StatusRules) -> Self {
        Self {
            type_field: config.type_field.clone(),
            rules,
            default_warn_days: config.default_warn_days,
            fallback_date_field: config.fallback_date_field.clone(),
        }
    }

    /// Load the rules `config` points to; no rule list means fallback-only.
    pub async fn load(store: &dyn ListStore, config: &StatusConfig) -> Result<Self, GridError> {
        let rules = match &config.rules_list {
            Some(title) => StatusRules::load(store, title, &config.rules_key_field).await?,
            None => StatusRules::default(),
        };
        Ok(Self::new(config, rules))
    }

    pub fn status_for(&self, row: &Row, today: NaiveDate) -> ExpiryStatus {
        let rule = self
            .type_field
            .as_deref()
            .and_then(|f| row.get(f))
            .and_then(cell_text)
            .and_then(|key| self.rules.get(&key));
        let date_field = rule
            .map(|r| r.date_field.as_str())
            .or(self.fallback_date_field.as_deref());
        let warn_days = rule.map_or(self.default_warn_days, |r| r.warn_days);
        let raw = date_field.and_then(|f| row.get(f)).and_then(Value::as_str);
        expiry_status(raw, warn_days, today)
    }

    /// Stamp `status` onto every row, as of the local calendar day.
    pub fn annotate(&self, rows: &mut [Row]) {
        let today = Local::now().date_naive();
        for row in rows.iter_mut() {
            let status = self.status_for(row, today);
            row.insert("status".to_string(), Value::String(status.label().to_string()));
        }
    }
}

/// Key text of a type cell; resolved lookups may already be a display string
/// or a one-element array.
fn cell_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Array(items) => items.first().and_then(scalar_text),
        other => scalar_text(other),
    };
    text.filter(|s| !s.trim().is_empty())
}
