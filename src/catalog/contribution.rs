//! Contribution records and the fallback chain that turns them into numbers.
//!
//! Catalogs fill their contribution tables with different precision, so the
//! per-unit anti-nutrient and enzyme values of a component are resolved by
//! trying, in order:
//!
//! 1. the nested `all_values` object of the attached record,
//! 2. the flat numeric fields of the attached record,
//! 3. the material's own data (qualitative anti-nutrient ratings mapped to
//!    `low 0.5 / medium 1.5 / high 2.5`, or the numeric enzyme composition),
//!
//! and falling back to zeros when none of them has anything.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

use crate::blend::MixComponent;
use crate::material::{AntiNutrientValues, Catalog, EnzymeValues, FieldSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyClass {
    AntiNutrient,
    Enzyme,
}

impl PropertyClass {
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            PropertyClass::AntiNutrient => AntiNutrientValues::FIELDS,
            PropertyClass::Enzyme => EnzymeValues::FIELDS,
        }
    }
}

impl fmt::Display for PropertyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyClass::AntiNutrient => f.write_str("anti-nutrient"),
            PropertyClass::Enzyme => f.write_str("enzyme"),
        }
    }
}

/// Precomputed per-material snapshot from one of the contribution tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionRecord {
    #[serde(alias = "flour_id")]
    pub material_id: String,
    #[serde(default)]
    pub catalog: Catalog,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_values: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, f64>,
}

impl ContributionRecord {
    pub fn new(material_id: impl Into<String>, catalog: Catalog) -> Self {
        ContributionRecord {
            material_id: material_id.into(),
            catalog,
            all_values: None,
            values: BTreeMap::new(),
        }
    }

    /// A record whose nested object holds exactly `values`.
    pub fn from_values<V: FieldSet>(material_id: impl Into<String>, catalog: Catalog, values: &V) -> Self {
        let mut record = ContributionRecord::new(material_id, catalog);
        record.all_values = Some(values.to_map());
        record
    }

    pub fn nested<V: FieldSet>(&self) -> Option<V> {
        self.all_values.as_ref().and_then(V::from_map)
    }

    pub fn flat<V: FieldSet>(&self) -> Option<V> {
        V::from_map(&self.values)
    }

    /// What the record itself knows, nested object first.
    pub fn recorded<V: FieldSet>(&self) -> Option<V> {
        self.nested().or_else(|| self.flat())
    }
}

/// A value class that can be resolved through the fallback chain.
pub trait ContributionClass: FieldSet {
    const CLASS: PropertyClass;

    /// The record attached to the component for this class.
    fn attached(component: &MixComponent) -> Option<&ContributionRecord>;

    /// The component's own material data for this class.
    fn from_material_data(component: &MixComponent) -> Option<Self>;
}

impl ContributionClass for AntiNutrientValues {
    const CLASS: PropertyClass = PropertyClass::AntiNutrient;

    fn attached(component: &MixComponent) -> Option<&ContributionRecord> {
        component.anti_nutrient_contribution.as_ref()
    }

    fn from_material_data(component: &MixComponent) -> Option<Self> {
        component
            .anti_nutrient_ratings
            .as_ref()
            .and_then(|ratings| ratings.to_values())
    }
}

impl ContributionClass for EnzymeValues {
    const CLASS: PropertyClass = PropertyClass::Enzyme;

    fn attached(component: &MixComponent) -> Option<&ContributionRecord> {
        component.enzyme_contribution.as_ref()
    }

    fn from_material_data(component: &MixComponent) -> Option<Self> {
        component.enzymes
    }
}

/// Which step of the chain produced a value set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Nested,
    Flat,
    Material,
    Default,
}

pub type Strategy<V> = fn(&MixComponent, Option<&ContributionRecord>) -> Option<V>;

pub fn nested_values<V: ContributionClass>(
    _component: &MixComponent,
    record: Option<&ContributionRecord>,
) -> Option<V> {
    record?.nested()
}

pub fn flat_values<V: ContributionClass>(
    _component: &MixComponent,
    record: Option<&ContributionRecord>,
) -> Option<V> {
    record?.flat()
}

pub fn material_values<V: ContributionClass>(
    component: &MixComponent,
    _record: Option<&ContributionRecord>,
) -> Option<V> {
    V::from_material_data(component)
}

/// The chain, in priority order.
pub fn strategies<V: ContributionClass>() -> [(ResolutionSource, Strategy<V>); 3] {
    [
        (ResolutionSource::Nested, nested_values::<V>),
        (ResolutionSource::Flat, flat_values::<V>),
        (ResolutionSource::Material, material_values::<V>),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved<V> {
    pub values: V,
    pub source: ResolutionSource,
}

pub fn resolve_with<V: ContributionClass>(
    component: &MixComponent,
    record: Option<&ContributionRecord>,
) -> Resolved<V> {
    for (source, strategy) in strategies::<V>() {
        if let Some(values) = strategy(component, record) {
            debug!(
                material_id = %component.material_id,
                catalog = %component.source_catalog,
                class = %V::CLASS,
                ?source,
                "resolved contribution values"
            );
            return Resolved { values, source };
        }
    }
    debug!(
        material_id = %component.material_id,
        catalog = %component.source_catalog,
        class = %V::CLASS,
        "no contribution data, using zeros"
    );
    Resolved {
        values: V::default(),
        source: ResolutionSource::Default,
    }
}

/// Resolves a component's values from the record attached to it.
pub fn resolve<V: ContributionClass>(component: &MixComponent) -> V {
    resolve_with::<V>(component, V::attached(component)).values
}

/// All contribution records of one class from one catalog, keyed by material id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContributionTable {
    records: HashMap<String, ContributionRecord>,
}

impl ContributionTable {
    pub fn new(records: impl IntoIterator<Item = ContributionRecord>) -> Self {
        ContributionTable {
            records: records
                .into_iter()
                .map(|record| (record.material_id.clone(), record))
                .collect(),
        }
    }

    pub fn get(&self, material_id: &str) -> Option<&ContributionRecord> {
        self.records.get(material_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{AntiNutrientRatings, Level, Rating};

    fn component_with_ratings() -> MixComponent {
        let mut component = MixComponent::bare("soy", "Soy", 100.0, Catalog::Enterprise);
        component.anti_nutrient_ratings = Some(AntiNutrientRatings {
            lectins: Some(Rating::Level(Level::High)),
            tannins: Some(Rating::Level(Level::Low)),
            saponins: Some(Rating::Value(0.9)),
            phytic_acid: None,
            trypsin_inhibitors: Some(Rating::Level(Level::Medium)),
        });
        component.enzymes = Some(EnzymeValues {
            amylases: 0.4,
            proteases: 0.2,
            lipases: 0.1,
            phytases: 0.05,
        });
        component
    }

    fn record_with(nested: Option<&[(&str, f64)]>, flat: &[(&str, f64)]) -> ContributionRecord {
        let mut record = ContributionRecord::new("soy", Catalog::Public);
        record.all_values = nested.map(|pairs| {
            pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
        });
        record.values = flat.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        record
    }

    #[test]
    fn test_nested_values_win_over_flat_fields() {
        let component = component_with_ratings();
        let record = record_with(Some(&[("lectins", 3.0), ("tannins", 1.0)]), &[("lectins", 7.0), ("tannins", 8.0)]);

        let resolved = resolve_with::<AntiNutrientValues>(&component, Some(&record));
        assert_eq!(resolved.source, ResolutionSource::Nested);
        assert_eq!(resolved.values.lectins, 3.0);
        assert_eq!(resolved.values.tannins, 1.0);
        // Fields missing from the winning source are zero, not taken from later sources.
        assert_eq!(resolved.values.saponins, 0.0);
    }

    #[test]
    fn test_flat_fields_used_without_nested_object() {
        let component = component_with_ratings();
        let record = record_with(None, &[("amylases", 1.2), ("phytases", 0.3)]);

        let resolved = resolve_with::<EnzymeValues>(&component, Some(&record));
        assert_eq!(resolved.source, ResolutionSource::Flat);
        assert_eq!(resolved.values.amylases, 1.2);
        assert_eq!(resolved.values.phytases, 0.3);
        assert_eq!(resolved.values.proteases, 0.0);
    }

    #[test]
    fn test_empty_nested_object_falls_through_to_flat() {
        let component = component_with_ratings();
        let record = record_with(Some(&[("unrelated", 2.0)]), &[("lectins", 4.0)]);

        let resolved = resolve_with::<AntiNutrientValues>(&component, Some(&record));
        assert_eq!(resolved.source, ResolutionSource::Flat);
        assert_eq!(resolved.values.lectins, 4.0);
    }

    #[test]
    fn test_material_ratings_used_without_record() {
        let component = component_with_ratings();

        let resolved = resolve_with::<AntiNutrientValues>(&component, None);
        assert_eq!(resolved.source, ResolutionSource::Material);
        assert_eq!(resolved.values.lectins, 2.5);
        assert_eq!(resolved.values.tannins, 0.5);
        assert_eq!(resolved.values.saponins, 0.9);
        assert_eq!(resolved.values.phytic_acid, 0.0);
        assert_eq!(resolved.values.trypsin_inhibitors, 1.5);

        let enzymes = resolve_with::<EnzymeValues>(&component, None);
        assert_eq!(enzymes.source, ResolutionSource::Material);
        assert_eq!(enzymes.values.amylases, 0.4);
    }

    #[test]
    fn test_record_without_class_fields_falls_back_to_material() {
        let component = component_with_ratings();
        let record = record_with(None, &[]);

        let resolved = resolve_with::<AntiNutrientValues>(&component, Some(&record));
        assert_eq!(resolved.source, ResolutionSource::Material);
    }

    #[test]
    fn test_nothing_resolves_to_zero() {
        let component = MixComponent::bare("teff", "Teff", 100.0, Catalog::Private);

        let resolved = resolve_with::<AntiNutrientValues>(&component, None);
        assert_eq!(resolved.source, ResolutionSource::Default);
        assert_eq!(resolved.values, AntiNutrientValues::default());
        assert_eq!(resolve::<EnzymeValues>(&component), EnzymeValues::default());
    }

    #[test]
    fn test_resolve_uses_attached_record_for_each_class() {
        let mut component = component_with_ratings();
        component.enzyme_contribution = Some(record_with(Some(&[("lipases", 0.7)]), &[]));

        let enzymes = resolve::<EnzymeValues>(&component);
        assert_eq!(enzymes.lipases, 0.7);
        assert_eq!(enzymes.amylases, 0.0);

        // No anti-nutrient record attached, so the ratings are used.
        let anti = resolve::<AntiNutrientValues>(&component);
        assert_eq!(anti.lectins, 2.5);
    }

    #[test]
    fn test_record_deserializes_flour_id_alias() {
        let record: ContributionRecord = serde_json::from_str(
            r#"{"flour_id": "oat", "catalog": "public", "all_values": {"tannins": 0.2}}"#,
        )
        .unwrap();
        assert_eq!(record.material_id, "oat");
        assert_eq!(record.nested::<AntiNutrientValues>().unwrap().tannins, 0.2);
        assert!(record.values.is_empty());
    }

    #[test]
    fn test_contribution_table_lookup() {
        let table = ContributionTable::new(vec![
            ContributionRecord::new("oat", Catalog::Public),
            ContributionRecord::new("rye", Catalog::Public),
        ]);
        assert_eq!(table.len(), 2);
        assert!(table.get("oat").is_some());
        assert!(table.get("spelt").is_none());
    }
}
