use std::collections::HashMap;
use tracing::warn;

use super::contribution::ContributionTable;
use super::source::CatalogContext;
use crate::blend::MixComponent;
use crate::material::{Catalog, Material};

/// Everything fetched from one catalog: its materials and both contribution tables.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    context: CatalogContext,
    materials: Vec<Material>,
    by_id: HashMap<String, usize>,
    anti_nutrients: ContributionTable,
    enzymes: ContributionTable,
}

impl CatalogSnapshot {
    pub fn new(
        context: CatalogContext,
        materials: Vec<Material>,
        anti_nutrients: ContributionTable,
        enzymes: ContributionTable,
    ) -> Self {
        let by_id = materials
            .iter()
            .enumerate()
            .map(|(index, material)| (material.id.clone(), index))
            .collect();
        CatalogSnapshot {
            context,
            materials,
            by_id,
            anti_nutrients,
            enzymes,
        }
    }

    pub fn context(&self) -> &CatalogContext {
        &self.context
    }

    pub fn catalog(&self) -> Catalog {
        self.context.catalog
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn material(&self, material_id: &str) -> Option<&Material> {
        self.by_id.get(material_id).map(|&index| &self.materials[index])
    }

    pub fn anti_nutrients(&self) -> &ContributionTable {
        &self.anti_nutrients
    }

    pub fn enzymes(&self) -> &ContributionTable {
        &self.enzymes
    }

    /// Attaches this catalog's contribution records for the component's material.
    pub fn attach_contributions(&self, component: &mut MixComponent) {
        component.anti_nutrient_contribution = self.anti_nutrients.get(&component.material_id).cloned();
        component.enzyme_contribution = self.enzymes.get(&component.material_id).cloned();
    }

    /// A fully populated component for a material of this catalog.
    pub fn component(&self, material_id: &str, percentage: f64) -> Option<MixComponent> {
        let material = self.material(material_id)?;
        let mut component = MixComponent::from_material(material, percentage);
        self.attach_contributions(&mut component);
        Some(component)
    }

    /// Refreshes snapshots of the components that belong to this catalog.
    ///
    /// Returns the ids of this catalog's components whose material was not found;
    /// those components are left untouched.
    pub fn hydrate(&self, components: &mut [MixComponent]) -> Vec<String> {
        let mut missing = Vec::new();
        for component in components
            .iter_mut()
            .filter(|c| c.source_catalog == self.catalog())
        {
            match self.material(&component.material_id) {
                Some(material) => {
                    component.apply_material(material);
                    self.attach_contributions(component);
                }
                None => missing.push(component.material_id.clone()),
            }
        }
        missing
    }
}

/// Hydrates components against whichever snapshot matches their catalog.
///
/// Returns the ids that could not be hydrated, including components whose
/// catalog has no snapshot at all.
pub fn hydrate_components(components: &mut [MixComponent], snapshots: &[CatalogSnapshot]) -> Vec<String> {
    let mut missing = Vec::new();
    for snapshot in snapshots {
        missing.extend(snapshot.hydrate(components));
    }
    for component in components.iter() {
        if !snapshots.iter().any(|s| s.catalog() == component.source_catalog) {
            missing.push(component.material_id.clone());
        }
    }
    for material_id in &missing {
        warn!(material_id = %material_id, "component material not found in catalog");
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::contribution::ContributionRecord;
    use crate::material::{EnzymeValues, Level};

    fn public_snapshot() -> CatalogSnapshot {
        let mut wheat = Material::new("wheat", "Wheat", Catalog::Public);
        wheat.nutritional.proteins = 12.0;
        wheat.solubility = Some(Level::Low);
        wheat.enzymes = Some(EnzymeValues {
            amylases: 1.0,
            ..Default::default()
        });
        let mut record = ContributionRecord::new("wheat", Catalog::Public);
        record.values.insert("lectins".to_string(), 0.4);

        CatalogSnapshot::new(
            CatalogContext::public(),
            vec![wheat],
            ContributionTable::new(vec![record]),
            ContributionTable::default(),
        )
    }

    #[test]
    fn test_component_carries_material_and_contributions() {
        let snapshot = public_snapshot();
        let component = snapshot.component("wheat", 55.0).unwrap();
        assert_eq!(component.percentage, 55.0);
        assert_eq!(component.nutritional.unwrap().proteins, 12.0);
        assert_eq!(component.solubility, Some(Level::Low));
        assert!(component.anti_nutrient_contribution.is_some());
        assert!(component.enzyme_contribution.is_none());
        assert!(snapshot.component("rye", 10.0).is_none());
    }

    #[test]
    fn test_hydrate_fills_known_and_reports_missing() {
        let snapshot = public_snapshot();
        let mut components = vec![
            MixComponent::bare("wheat", "", 60.0, Catalog::Public),
            MixComponent::bare("rye", "Rye", 30.0, Catalog::Public),
            MixComponent::bare("oat", "Oat", 10.0, Catalog::Enterprise),
        ];

        let missing = hydrate_components(&mut components, &[snapshot]);
        assert_eq!(missing, vec!["rye".to_string(), "oat".to_string()]);
        assert_eq!(components[0].material_name, "Wheat");
        assert_eq!(components[0].percentage, 60.0);
        assert!(components[0].anti_nutrient_contribution.is_some());
        assert!(components[1].nutritional.is_none());
    }
}
