use serde::{Deserialize, Serialize};

use crate::blend::MixComponent;
use crate::catalog::contribution::{resolve, ContributionClass};
use crate::material::{AntiNutrientValues, EnzymeValues, FieldSet, NutritionalValues, ProteinComposition};

/// Weighted linear combination: `totals[f] += selector(c)[f] * percentage / 100`.
///
/// Components for which the selector has nothing contribute nothing.
pub fn aggregate<V, F>(components: &[MixComponent], selector: F) -> V
where
    V: FieldSet,
    F: Fn(&MixComponent) -> Option<V>,
{
    let mut totals = V::default();
    for component in components {
        if let Some(values) = selector(component) {
            totals.add_scaled(&values, component.weight());
        }
    }
    totals
}

/// Per-field totals plus their grand total.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassTotals<V> {
    pub values: V,
    pub total: f64,
}

pub fn aggregate_nutrition(components: &[MixComponent]) -> NutritionalValues {
    aggregate(components, |c| c.nutritional)
}

/// Protein fractions weighted by blend share only.
pub fn aggregate_protein_composition(components: &[MixComponent]) -> ProteinComposition {
    aggregate(components, |c| c.proteins)
}

/// Protein fractions weighted by each material's protein mass in the blend,
/// renormalized so the four fractions add up to 100% of protein.
pub fn aggregate_protein_composition_by_protein_mass(components: &[MixComponent]) -> ProteinComposition {
    let mut totals = ProteinComposition::default();
    for component in components {
        let (Some(nutritional), Some(proteins)) = (component.nutritional, component.proteins) else {
            continue;
        };
        let protein_mass = nutritional.proteins / 100.0 * component.weight();
        totals.add_scaled(&proteins, protein_mass);
    }

    let sum = totals.total();
    if sum <= 0.0 {
        return ProteinComposition::default();
    }
    totals.scaled(100.0 / sum)
}

/// Aggregates a contribution class, resolving every component through the fallback chain.
pub fn aggregate_resolved<V: ContributionClass>(components: &[MixComponent]) -> ClassTotals<V> {
    let values: V = aggregate(components, |c| Some(resolve::<V>(c)));
    ClassTotals {
        total: values.total(),
        values,
    }
}

pub fn aggregate_enzymes(components: &[MixComponent]) -> ClassTotals<EnzymeValues> {
    aggregate_resolved(components)
}

pub fn aggregate_anti_nutrients(components: &[MixComponent]) -> ClassTotals<AntiNutrientValues> {
    aggregate_resolved(components)
}
