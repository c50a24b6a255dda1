//! Effects catalog reference
//!
//! Read-only table of effect types the amp knows about, with their parameter lists
//! and default values. Used to fill in display names and to repopulate a slot when
//! its effect type changes.

use crate::fx_id::FxIdNormalizer;
use crate::tone::{ToneFx, ToneFxParam};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

/// Default parameter of a catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogParam {
    pub index: u32,
    pub name: String,
    /// Default value
    pub value: f32,
}

/// One effect type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// Effect type id; qualified once loaded
    #[serde(rename = "dspId")]
    pub type_id: String,
    pub name: String,
    /// Signal chain stage (gate, comp, drive, amp, mod, delay, reverb)
    #[serde(rename = "type")]
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub params: Vec<CatalogParam>,
}

impl CatalogEntry {
    /// Default parameter set for a freshly selected effect of this type
    pub fn default_params(&self) -> Vec<ToneFxParam> {
        self.params
            .iter()
            .map(|p| ToneFxParam {
                param_id: p.index.to_string(),
                value: p.value,
                name: Some(p.name.clone()),
                enabled: true,
            })
            .collect()
    }

    /// A slot holding this effect with catalog defaults
    pub fn instantiate(&self, enabled: bool) -> ToneFx {
        ToneFx {
            type_id: self.type_id.clone(),
            name: self.name.clone(),
            enabled,
            params: self.default_params(),
        }
    }

    pub fn param_name(&self, index: u32) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.index == index)
            .map(|p| p.name.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogFile {
    catalog: Vec<CatalogEntry>,
}

/// Catalog table keyed by qualified type id
#[derive(Debug, Clone)]
pub struct FxCatalog {
    entries: Vec<CatalogEntry>,
    by_type: HashMap<String, usize>,
    ids: FxIdNormalizer,
}

impl FxCatalog {
    /// Build a catalog, qualifying bare ids with the normalizer's namespace
    pub fn new(entries: Vec<CatalogEntry>, ids: FxIdNormalizer) -> Self {
        let mut qualified = Vec::with_capacity(entries.len());
        let mut by_type = HashMap::new();

        for mut entry in entries {
            entry.type_id = ids.expand(&entry.type_id);
            by_type.insert(entry.type_id.clone(), qualified.len());
            qualified.push(entry);
        }

        Self {
            entries: qualified,
            by_type,
            ids,
        }
    }

    /// Parse catalog JSON (`{"catalog": [...]}`)
    pub fn from_json(json: &str, ids: FxIdNormalizer) -> Result<Self> {
        let file: CatalogFile =
            serde_json::from_str(json).context("Failed to parse effects catalog JSON")?;
        Ok(Self::new(file.catalog, ids))
    }

    /// Load a catalog file from disk
    pub async fn load_from_path(path: impl AsRef<Path>, ids: FxIdNormalizer) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;

        let catalog = Self::from_json(&json, ids)
            .with_context(|| format!("Invalid catalog file: {}", path.display()))?;
        info!(
            "Loaded {} catalog entries from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Look up an effect type; bare ids are qualified first
    pub fn lookup(&self, type_id: &str) -> Option<&CatalogEntry> {
        self.by_type
            .get(type_id)
            .or_else(|| self.by_type.get(&self.ids.expand(type_id)))
            .map(|&idx| &self.entries[idx])
    }

    /// Like [`lookup`](Self::lookup), falling back to the folded family entry
    /// (reverb variants share one catalog entry)
    pub fn resolve(&self, type_id: &str) -> Option<&CatalogEntry> {
        self.lookup(type_id)
            .or_else(|| self.lookup(&self.ids.normalize(type_id)))
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Entries of a signal chain stage
    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a CatalogEntry> {
        self.entries.iter().filter(move |e| e.category == category)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Catalog shipped with the binary
pub const DEFAULT_CATALOG_JSON: &str = include_str!("../assets/fx_catalog.json");

static DEFAULT_ENTRIES: OnceLock<Vec<CatalogEntry>> = OnceLock::new();

/// Load the embedded catalog (parsed once, qualified per call)
pub fn load_default_catalog(ids: FxIdNormalizer) -> Result<FxCatalog> {
    if let Some(entries) = DEFAULT_ENTRIES.get() {
        return Ok(FxCatalog::new(entries.clone(), ids));
    }

    let file: CatalogFile = serde_json::from_str(DEFAULT_CATALOG_JSON)
        .context("Failed to parse embedded effects catalog")?;
    // Ignore error if another thread set it first
    let _ = DEFAULT_ENTRIES.set(file.catalog.clone());
    Ok(FxCatalog::new(file.catalog, ids))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_is_qualified() {
        let catalog = load_default_catalog(FxIdNormalizer::default()).unwrap();
        assert!(!catalog.is_empty());
        assert!(catalog
            .entries()
            .iter()
            .all(|e| e.type_id.starts_with("pg.spark40.")));
    }

    #[test]
    fn test_lookup_accepts_bare_and_qualified() {
        let catalog = load_default_catalog(FxIdNormalizer::default()).unwrap();
        let qualified = catalog.lookup("pg.spark40.Twin").unwrap();
        let bare = catalog.lookup("Twin").unwrap();
        assert_eq!(qualified, bare);
        assert_eq!(qualified.category, "amp");
    }

    #[test]
    fn test_resolve_reverb_variant() {
        let catalog = load_default_catalog(FxIdNormalizer::default()).unwrap();
        assert!(catalog.lookup("pg.spark40.bias.reverb.2").is_none());
        let entry = catalog.resolve("pg.spark40.bias.reverb.2").unwrap();
        assert_eq!(entry.type_id, "pg.spark40.bias.reverb");
    }

    #[test]
    fn test_lookup_miss() {
        let catalog = load_default_catalog(FxIdNormalizer::default()).unwrap();
        assert!(catalog.lookup("pg.spark40.NotAnEffect").is_none());
    }

    #[test]
    fn test_default_params_follow_catalog() {
        let json = r#"{"catalog": [{
            "dspId": "DelayMono", "name": "Digital Delay", "type": "delay",
            "params": [
                {"index": 0, "name": "Level", "value": 0.2},
                {"index": 1, "name": "Time", "value": 0.4}
            ]
        }]}"#;
        let catalog = FxCatalog::from_json(json, FxIdNormalizer::default()).unwrap();
        let entry = catalog.lookup("DelayMono").unwrap();
        assert_eq!(entry.type_id, "pg.spark40.DelayMono");

        let fx = entry.instantiate(true);
        assert_eq!(fx.params.len(), 2);
        assert_eq!(fx.params[1].param_id, "1");
        assert_eq!(fx.params[1].value, 0.4);
        assert_eq!(fx.params[1].name.as_deref(), Some("Time"));
        assert_eq!(entry.param_name(0), Some("Level"));
    }

    #[test]
    fn test_in_category() {
        let catalog = load_default_catalog(FxIdNormalizer::default()).unwrap();
        assert!(catalog.in_category("reverb").count() >= 1);
        assert_eq!(catalog.in_category("no-such-stage").count(), 0);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(FxCatalog::from_json("{", FxIdNormalizer::default()).is_err());
    }
}
