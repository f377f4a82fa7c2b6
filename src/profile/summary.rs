use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::aggregator::{
    aggregate_anti_nutrients, aggregate_enzymes, aggregate_nutrition, aggregate_protein_composition,
    aggregate_protein_composition_by_protein_mass,
};
use super::categorical::{aggregate_mechanical, aggregate_solubility};
use crate::blend::{validate_percentages, Blend, MixComponent};
use crate::material::{
    AntiNutrientValues, EnzymeValues, Level, MechanicalProperties, NutritionalValues, ProteinComposition,
};

/// How protein fractions are weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProteinWeighting {
    /// By each component's share of the blend.
    BlendShare,
    /// By each component's protein mass, renormalized to 100% of protein.
    ProteinMass,
}

/// Derived summary of a blend. Recomputed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedProfile {
    pub total_percentage: f64,
    pub percentage_ok: bool,
    pub nutrition: NutritionalValues,
    pub protein_composition: ProteinComposition,
    pub protein_weighting: ProteinWeighting,
    pub enzymes: EnzymeValues,
    pub enzyme_total: f64,
    pub anti_nutrients: AntiNutrientValues,
    pub anti_nutrient_total: f64,
    pub anti_nutrient_level: Level,
    pub mechanical: MechanicalProperties,
    pub solubility: Option<Level>,
}

pub fn compute_profile_with(components: &[MixComponent], protein_weighting: ProteinWeighting) -> AggregatedProfile {
    let check = validate_percentages(components);
    let protein_composition = match protein_weighting {
        ProteinWeighting::BlendShare => aggregate_protein_composition(components),
        ProteinWeighting::ProteinMass => aggregate_protein_composition_by_protein_mass(components),
    };
    let enzymes = aggregate_enzymes(components);
    let anti_nutrients = aggregate_anti_nutrients(components);

    AggregatedProfile {
        total_percentage: check.total_percentage,
        percentage_ok: check.ok,
        nutrition: aggregate_nutrition(components),
        protein_composition,
        protein_weighting,
        enzymes: enzymes.values,
        enzyme_total: enzymes.total,
        anti_nutrients: anti_nutrients.values,
        anti_nutrient_total: anti_nutrients.total,
        anti_nutrient_level: Level::from_anti_nutrient_total(anti_nutrients.total),
        mechanical: aggregate_mechanical(components),
        solubility: aggregate_solubility(components),
    }
}

/// Profiles a blend; combined blends weight protein fractions by protein mass.
pub fn compute_profile(blend: &Blend) -> AggregatedProfile {
    let weighting = if blend.is_combined() {
        ProteinWeighting::ProteinMass
    } else {
        ProteinWeighting::BlendShare
    };
    compute_profile_with(&blend.components, weighting)
}

/// Profiles many blends in parallel, preserving input order.
pub fn compute_profiles(blends: &[Blend]) -> Vec<AggregatedProfile> {
    blends.par_iter().map(compute_profile).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend::{BlendOrigin, CombinationSource};
    use crate::catalog::contribution::ContributionRecord;
    use crate::material::Catalog;
    use approx::assert_relative_eq;

    fn component_with_anti_total(id: &str, percentage: f64, lectins: f64, tannins: f64) -> MixComponent {
        let mut component = MixComponent::bare(id, id, percentage, Catalog::Public);
        let mut record = ContributionRecord::new(id, Catalog::Public);
        record.values.insert("lectins".to_string(), lectins);
        record.values.insert("tannins".to_string(), tannins);
        component.anti_nutrient_contribution = Some(record);
        component
    }

    #[test]
    fn test_anti_nutrient_level_buckets_grand_total() {
        let high = Blend {
            components: vec![component_with_anti_total("a", 100.0, 7.0, 5.0)],
            origin: BlendOrigin::Working,
        };
        let profile = compute_profile(&high);
        assert_relative_eq!(profile.anti_nutrient_total, 12.0, epsilon = 1e-9);
        assert_eq!(profile.anti_nutrient_level, Level::High);

        let medium = Blend {
            components: vec![component_with_anti_total("a", 100.0, 6.0, 4.0)],
            origin: BlendOrigin::Working,
        };
        let profile = compute_profile(&medium);
        assert_eq!(profile.anti_nutrient_total, 10.0);
        assert_eq!(profile.anti_nutrient_level, Level::Medium);
    }

    #[test]
    fn test_profile_reports_percentage_status() {
        let blend = Blend {
            components: vec![component_with_anti_total("a", 70.0, 1.0, 1.0)],
            origin: BlendOrigin::Working,
        };
        let profile = compute_profile(&blend);
        assert!(!profile.percentage_ok);
        assert_eq!(profile.total_percentage, 70.0);
        assert_eq!(profile.anti_nutrient_level, Level::Low);
        assert_eq!(profile.protein_weighting, ProteinWeighting::BlendShare);
    }

    #[test]
    fn test_combined_blends_use_protein_mass_weighting() {
        let blend = Blend {
            components: vec![MixComponent::bare("a", "a", 100.0, Catalog::Public)],
            origin: BlendOrigin::Combined {
                sources: vec![CombinationSource {
                    blend_id: "x".to_string(),
                    weight: 1.0,
                }],
            },
        };
        assert_eq!(compute_profile(&blend).protein_weighting, ProteinWeighting::ProteinMass);
    }

    #[test]
    fn test_compute_profiles_preserves_order() {
        let blends: Vec<Blend> = (1..=5)
            .map(|i| Blend {
                components: vec![component_with_anti_total("a", 100.0, i as f64, 0.0)],
                origin: BlendOrigin::Working,
            })
            .collect();
        let profiles = compute_profiles(&blends);
        let totals: Vec<f64> = profiles.iter().map(|p| p.anti_nutrient_total).collect();
        assert_eq!(totals, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }
}
