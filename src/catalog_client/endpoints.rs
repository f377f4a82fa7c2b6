use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

use crate::catalog::contribution::{ContributionRecord, PropertyClass};
use crate::catalog::source::OwnerFilter;
use crate::material::{
    AntiNutrientValues, Catalog, EnzymeValues, FieldSet, Level, Material, NutritionalValues, ProteinComposition,
    Rating,
};

pub const REST_PATH: &str = "rest/v1";

pub fn table_url(base_url: &str, table: &str) -> String {
    format!("{}/{}/{}", base_url.trim_end_matches('/'), REST_PATH, table)
}

/// Query string for a full-table read, narrowed to one owner when filtered.
pub fn table_query(owner: Option<&OwnerFilter>) -> Vec<(String, String)> {
    let mut query = vec![("select".to_string(), "*".to_string())];
    if let Some(filter) = owner {
        query.push((filter.column.to_string(), format!("eq.{}", filter.owner_id)));
    }
    query
}

/// Backoff between attempts at reading a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): base doubled each time, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// A contribution table row as the REST catalog returns it: the nested
/// object plus whatever flat columns the table has.
#[derive(Debug, Clone, Deserialize)]
pub struct ContributionRow {
    #[serde(alias = "flour_id")]
    pub material_id: String,
    #[serde(default)]
    pub all_values: Option<BTreeMap<String, Value>>,
    #[serde(flatten)]
    pub columns: BTreeMap<String, Value>,
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

impl ContributionRow {
    pub fn into_record(self, class: PropertyClass, catalog: Catalog) -> ContributionRecord {
        let mut record = ContributionRecord::new(self.material_id, catalog);
        record.all_values = self.all_values.map(|nested| {
            nested
                .iter()
                .filter_map(|(field, value)| numeric(value).map(|v| (field.clone(), v)))
                .collect()
        });
        for field in class.fields() {
            if let Some(value) = self.columns.get(*field).and_then(numeric) {
                record.values.insert(field.to_string(), value);
            }
        }
        record
    }
}

/// A material table row as the REST catalog returns it: one flat column per
/// property, the same layout as the local `<table>.csv` files.
#[derive(Debug, Clone, Deserialize)]
pub struct MaterialRow {
    pub id: Value,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub columns: BTreeMap<String, Value>,
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl MaterialRow {
    fn numbers(&self) -> BTreeMap<String, f64> {
        self.columns
            .iter()
            .filter_map(|(column, value)| numeric(value).map(|v| (column.clone(), v)))
            .collect()
    }

    fn level(&self, column: &str) -> Option<Level> {
        let raw = self.columns.get(column).and_then(text)?;
        match raw.parse::<Level>() {
            Ok(level) => Some(level),
            Err(e) => {
                warn!(column, "ignoring rating: {}", e);
                None
            }
        }
    }

    fn rating(&self, column: &str) -> Option<Rating> {
        match self.columns.get(column)? {
            Value::Number(n) => n.as_f64().map(Rating::Value),
            Value::String(raw) if !raw.trim().is_empty() => match raw.parse::<Rating>() {
                Ok(rating) => Some(rating),
                Err(e) => {
                    warn!(column, "ignoring rating: {}", e);
                    None
                }
            },
            _ => None,
        }
    }

    /// `None` when the row has no usable id.
    pub fn into_material(self, catalog: Catalog) -> Option<Material> {
        let id = text(&self.id)?;
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&id)
            .to_string();

        let mut material = Material::new(id, name, catalog);
        let numbers = self.numbers();
        material.nutritional = NutritionalValues::from_map(&numbers).unwrap_or_default();
        material.proteins = ProteinComposition::from_map(&numbers).unwrap_or_default();
        material.enzymes = EnzymeValues::from_map(&numbers);
        for field in AntiNutrientValues::FIELDS {
            if let Some(rating) = self.rating(field) {
                material.anti_nutrients.set(field, rating);
            }
        }
        material.mechanical.binding = self.level("binding");
        material.mechanical.stickiness = self.level("stickiness");
        material.mechanical.water_absorption = self.level("water_absorption");
        material.solubility = self.level("solubility");
        material.owner_id = self.user_id.filter(|owner| !owner.trim().is_empty());
        Some(material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{AntiNutrientValues, EnzymeValues};

    #[test]
    fn test_retry_delays_double_and_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(10), Duration::from_secs(8));
        assert_eq!(policy.delay_for(40), Duration::from_secs(8));
        assert_eq!(policy.max_attempts, 3);
    }

    #[test]
    fn test_table_url_and_query() {
        assert_eq!(
            table_url("https://catalog.example.com/", "flours"),
            "https://catalog.example.com/rest/v1/flours"
        );
        assert_eq!(table_query(None), vec![("select".to_string(), "*".to_string())]);

        let filter = OwnerFilter {
            column: "user_id",
            owner_id: "abc".to_string(),
        };
        let query = table_query(Some(&filter));
        assert_eq!(query[1], ("user_id".to_string(), "eq.abc".to_string()));
    }

    #[test]
    fn test_contribution_row_keeps_class_fields_only() {
        let row: ContributionRow = serde_json::from_str(
            r#"{
                "flour_id": "oat",
                "id": 17,
                "lectins": 0.4,
                "tannins": "0.25",
                "amylases": 3.0,
                "all_values": {"lectins": 0.38, "note": "lab"}
            }"#,
        )
        .unwrap();
        let record = row.into_record(PropertyClass::AntiNutrient, Catalog::Public);
        assert_eq!(record.material_id, "oat");
        assert_eq!(record.values.len(), 2);
        assert_eq!(record.flat::<AntiNutrientValues>().unwrap().tannins, 0.25);
        assert_eq!(record.nested::<AntiNutrientValues>().unwrap().lectins, 0.38);
        assert!(record.flat::<EnzymeValues>().is_none());
    }

    #[test]
    fn test_contribution_row_without_nested_object() {
        let row: ContributionRow =
            serde_json::from_str(r#"{"material_id": "rye", "phytases": 0.6, "all_values": null}"#).unwrap();
        let record = row.into_record(PropertyClass::Enzyme, Catalog::Enterprise);
        assert!(record.all_values.is_none());
        assert_eq!(record.catalog, Catalog::Enterprise);
        assert_eq!(record.flat::<EnzymeValues>().unwrap().phytases, 0.6);
    }

    #[test]
    fn test_material_row_reads_flat_columns() {
        let row: MaterialRow = serde_json::from_str(
            r#"{
                "id": "wheat",
                "name": "Wheat",
                "proteins": 12.0,
                "lipids": "2.5",
                "albumins": 10,
                "prolamins": 40,
                "lectins": "high",
                "tannins": 0.4,
                "saponins": "plenty",
                "binding": "High",
                "water_absorption": null,
                "solubility": "low",
                "user_id": "baker-1",
                "created_at": "2024-01-01"
            }"#,
        )
        .unwrap();
        let material = row.into_material(Catalog::Private).unwrap();
        assert_eq!(material.id, "wheat");
        assert_eq!(material.catalog, Catalog::Private);
        assert_eq!(material.nutritional.proteins, 12.0);
        assert_eq!(material.nutritional.lipids, 2.5);
        assert_eq!(material.proteins.albumins, 10.0);
        assert_eq!(material.proteins.prolamins, 40.0);
        assert!(material.enzymes.is_none());
        assert_eq!(material.anti_nutrients.lectins, Some(Rating::Level(Level::High)));
        assert_eq!(material.anti_nutrients.tannins, Some(Rating::Value(0.4)));
        assert_eq!(material.anti_nutrients.saponins, None);
        assert_eq!(material.mechanical.binding, Some(Level::High));
        assert_eq!(material.mechanical.water_absorption, None);
        assert_eq!(material.solubility, Some(Level::Low));
        assert_eq!(material.owner_id.as_deref(), Some("baker-1"));
    }

    #[test]
    fn test_material_row_numeric_id_and_missing_name() {
        let row: MaterialRow = serde_json::from_str(r#"{"id": 42, "amylases": 1.1}"#).unwrap();
        let material = row.into_material(Catalog::Public).unwrap();
        assert_eq!(material.id, "42");
        assert_eq!(material.name, "42");
        assert_eq!(material.enzymes.unwrap().amylases, 1.1);

        let row: MaterialRow = serde_json::from_str(r#"{"id": null, "name": "Ghost"}"#).unwrap();
        assert!(row.into_material(Catalog::Public).is_none());
    }
}
