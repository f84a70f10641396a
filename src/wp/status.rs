//! Status View: a schema-independent projection of the WordPress custom
//! status endpoint.
//!
//! Two wire shapes exist in the field. The legacy one lists plugins as an
//! array of `{name, plugin_file, version, latest_version, update_available,
//! active}` rows; the newer one wraps them as `{list: [{name, slug, file,
//! installed, available, has_update}]}` and reports core as `{installed,
//! updates: [...]}`. Everything downstream consumes the unified view built
//! here; new shapes are added only in this module.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unified plugin row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PluginRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_file: Option<String>,
    /// Installed version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Available version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
    pub update_available: bool,
    pub active: bool,
}

/// Unified theme row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ThemeRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
    pub update_available: bool,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CoreView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
    pub update_available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PhpMysql {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub php_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mysql_version: Option<String>,
}

/// The canonical view. Unrecognised input coerces to the empty view
/// rather than an error; the coercion is total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StatusView {
    pub plugins: Vec<PluginRow>,
    pub themes: Vec<ThemeRow>,
    pub core: CoreView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub php_mysql: Option<PhpMysql>,
}

impl StatusView {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty() && self.themes.is_empty() && self.core == CoreView::default()
    }
}

/// Coerce anything that might be a status payload into the unified view:
/// a dict at status shape, wrappers (`{raw}`, `{result: {raw}}`,
/// `{result: {plugins, themes}}`), or a JSON string body.
pub fn coerce_status(status_like: &Value) -> StatusView {
    let body = unwrap_status(status_like);
    let Some(obj) = body.as_object() else {
        return StatusView::default();
    };

    let plugins = rows_of(obj.get("plugins"))
        .iter()
        .filter_map(|row| plugin_row(row))
        .collect();
    let themes = rows_of(obj.get("themes"))
        .iter()
        .filter_map(|row| theme_row(row))
        .collect();
    let core = core_view(obj.get("core"));
    let php_mysql = obj.get("php_mysql").and_then(|env| {
        let env = env.as_object()?;
        Some(PhpMysql {
            php_version: string_of(env.get("php_version")),
            mysql_version: string_of(env.get("mysql_version")),
        })
    });

    StatusView {
        plugins,
        themes,
        core,
        php_mysql,
    }
}

/// `plugin_file` entries with an update available, minus blocklisted
/// items. Rows without a `plugin_file` never select. Blocklist matches by
/// exact `plugin_file`.
pub fn select_outdated_plugins(status: &StatusView, blocklist: Option<&[String]>) -> Vec<String> {
    let block: Vec<&str> = blocklist
        .unwrap_or(&[])
        .iter()
        .map(|s| s.as_str())
        .collect();
    status
        .plugins
        .iter()
        .filter(|row| row.update_available)
        .filter_map(|row| row.plugin_file.as_deref())
        .filter(|file| !file.is_empty() && !block.contains(file))
        .map(|file| file.to_string())
        .collect()
}

/// True when a caller token is already a plugin file (`dir/file.php`).
pub fn is_plugin_file(token: &str) -> bool {
    token.contains('/') && token.ends_with(".php")
}

/// Resolve caller-supplied human names or slugs against the status
/// snapshot. Resolution order: exact slug, exact name (case-insensitive),
/// `plugin_file` prefixed by `{slug}/`; unresolved tokens pass through
/// unchanged.
pub fn normalize_selection(selection: &[String], status: &StatusView) -> Vec<String> {
    let mut by_slug: HashMap<String, &str> = HashMap::new();
    let mut by_name: HashMap<String, &str> = HashMap::new();
    let mut plugin_files: Vec<&str> = Vec::new();

    for row in &status.plugins {
        let Some(file) = row.plugin_file.as_deref().filter(|f| !f.is_empty()) else {
            continue;
        };
        plugin_files.push(file);
        let slug = row
            .slug
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_else(|| file.split('/').next().unwrap_or("").to_lowercase());
        if !slug.is_empty() {
            by_slug.entry(slug).or_insert(file);
        }
        if let Some(name) = row.name.as_deref() {
            let name = name.trim().to_lowercase();
            if !name.is_empty() {
                by_name.entry(name).or_insert(file);
            }
        }
    }

    let mut out = Vec::new();
    for token in selection {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if is_plugin_file(token) {
            out.push(token.to_string());
            continue;
        }

        let key = token.to_lowercase();
        if let Some(file) = by_slug.get(&key).or_else(|| by_name.get(&key)) {
            out.push(file.to_string());
            continue;
        }
        if !key.contains('/') {
            if let Some(file) = plugin_files
                .iter()
                .find(|file| file.starts_with(&format!("{key}/")))
            {
                out.push(file.to_string());
                continue;
            }
        }
        // keep the raw token; the blocklist / updater decide its fate
        out.push(token.to_string());
    }
    out
}

/// `plugin_file -> (installed, available)` for update verification.
pub fn plugin_versions_map(status: &StatusView) -> HashMap<String, (Option<String>, Option<String>)> {
    status
        .plugins
        .iter()
        .filter_map(|row| {
            let file = row.plugin_file.clone().filter(|f| !f.is_empty())?;
            Some((file, (row.version.clone(), row.latest_version.clone())))
        })
        .collect()
}

/// A plugin counts as updated when its installed version changed, or its
/// post-update installed version equals its latest.
pub fn looks_updated(
    before: &HashMap<String, (Option<String>, Option<String>)>,
    after: &HashMap<String, (Option<String>, Option<String>)>,
    plugin_file: &str,
) -> bool {
    let before_current = before.get(plugin_file).and_then(|v| v.0.clone());
    let (after_current, after_latest) = after
        .get(plugin_file)
        .cloned()
        .unwrap_or((None, None));
    before_current != after_current
        || (after_current.is_some() && after_current == after_latest)
}

// ---------- coercion internals ----------

fn unwrap_status(status_like: &Value) -> Value {
    match status_like {
        Value::Object(obj) => {
            if obj.contains_key("plugins") && obj.contains_key("themes") {
                return status_like.clone();
            }
            if let Some(raw @ Value::Object(_)) = obj.get("raw") {
                return unwrap_status(raw);
            }
            if let Some(Value::Object(inner)) = obj.get("result") {
                if let Some(raw @ Value::Object(_)) = inner.get("raw") {
                    return unwrap_status(raw);
                }
                if inner.contains_key("plugins") && inner.contains_key("themes") {
                    return Value::Object(inner.clone());
                }
            }
            status_like.clone()
        }
        Value::String(body) => {
            let body = body.trim_start_matches('\u{feff}').trim();
            match serde_json::from_str::<Value>(body) {
                Ok(parsed) => unwrap_status(&parsed),
                Err(_) => Value::Object(Default::default()),
            }
        }
        _ => Value::Object(Default::default()),
    }
}

/// Rows for both schemas: a bare list, or `{list: [...]}`.
fn rows_of(value: Option<&Value>) -> Vec<Value> {
    let rows = match value {
        Some(Value::Array(rows)) => rows.clone(),
        Some(Value::Object(obj)) => match obj.get("list") {
            Some(Value::Array(rows)) => rows.clone(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    rows.into_iter().filter(|row| row.is_object()).collect()
}

fn plugin_row(row: &Value) -> Option<PluginRow> {
    let obj = row.as_object()?;

    let plugin_file = string_of(obj.get("plugin_file"))
        .or_else(|| string_of(obj.get("file")))
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty());
    let slug = string_of(obj.get("slug"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            plugin_file
                .as_deref()
                .and_then(|f| f.split('/').next())
                .map(str::to_string)
        });
    let version = string_of(obj.get("version")).or_else(|| string_of(obj.get("installed")));
    let latest_version =
        string_of(obj.get("latest_version")).or_else(|| string_of(obj.get("available")));
    let update_available = explicit_flag(obj, &["update_available", "has_update"])
        .unwrap_or_else(|| derived_update(&version, &latest_version));
    let active = obj.get("active").and_then(Value::as_bool).unwrap_or(false);

    Some(PluginRow {
        name: string_of(obj.get("name")),
        slug,
        plugin_file,
        version,
        latest_version,
        update_available,
        active,
    })
}

fn theme_row(row: &Value) -> Option<ThemeRow> {
    let obj = row.as_object()?;

    let version = string_of(obj.get("version")).or_else(|| string_of(obj.get("installed")));
    let latest_version =
        string_of(obj.get("latest_version")).or_else(|| string_of(obj.get("available")));
    let update_available = explicit_flag(obj, &["update_available", "has_update"])
        .unwrap_or_else(|| derived_update(&version, &latest_version));
    let active = obj.get("active").and_then(Value::as_bool).unwrap_or(false);

    Some(ThemeRow {
        name: string_of(obj.get("name")),
        version,
        latest_version,
        update_available,
        active,
    })
}

fn core_view(core: Option<&Value>) -> CoreView {
    let Some(obj) = core.and_then(Value::as_object) else {
        return CoreView::default();
    };

    let current_version =
        string_of(obj.get("current_version")).or_else(|| string_of(obj.get("installed")));
    let latest_version = string_of(obj.get("latest_version")).or_else(|| {
        obj.get("updates")
            .and_then(Value::as_array)
            .and_then(|updates| updates.first())
            .and_then(|update| string_of(update.get("version")))
    });
    let update_available = explicit_flag(obj, &["update_available"])
        .unwrap_or_else(|| derived_update(&current_version, &latest_version));

    CoreView {
        current_version,
        latest_version,
        update_available,
    }
}

fn explicit_flag(
    obj: &serde_json::Map<String, Value>,
    keys: &[&str],
) -> Option<bool> {
    keys.iter()
        .find_map(|key| obj.get(*key))
        .and_then(Value::as_bool)
}

/// `installed != latest` when both are present and no explicit flag given.
fn derived_update(current: &Option<String>, latest: &Option<String>) -> bool {
    match (current, latest) {
        (Some(current), Some(latest)) => current != latest,
        _ => false,
    }
}

fn string_of(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
