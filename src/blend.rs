use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

use crate::catalog::contribution::ContributionRecord;
use crate::material::{
    AntiNutrientRatings, Catalog, EnzymeValues, Level, Material, MechanicalProperties,
    NutritionalValues, ProteinComposition,
};

/// Allowed distance between a finalized blend's total and 100%.
pub const PERCENTAGE_TOLERANCE: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub enum MixError {
    NoCombinationInputs,
    InvalidWeight { blend_id: String, weight: f64 },
    DuplicateMaterial(String),
    InvalidPercentageSum { total: f64 },
}

impl fmt::Display for MixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MixError::NoCombinationInputs => {
                write!(f, "At least one blend is required to build a combination")
            }
            MixError::InvalidWeight { blend_id, weight } => write!(
                f,
                "Blend '{}' has weight {}; combination weights must be positive",
                blend_id, weight
            ),
            MixError::DuplicateMaterial(material_id) => {
                write!(f, "Material '{}' is already part of the blend", material_id)
            }
            MixError::InvalidPercentageSum { total } => write!(
                f,
                "Blend percentages add up to {:.2}% instead of 100%",
                total
            ),
        }
    }
}

impl Error for MixError {}

/// One flour in a blend, with the material data it was added with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixComponent {
    pub material_id: String,
    pub material_name: String,
    pub percentage: f64,
    #[serde(default)]
    pub source_catalog: Catalog,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutritional: Option<NutritionalValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proteins: Option<ProteinComposition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enzymes: Option<EnzymeValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anti_nutrient_ratings: Option<AntiNutrientRatings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mechanical: Option<MechanicalProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solubility: Option<Level>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anti_nutrient_contribution: Option<ContributionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enzyme_contribution: Option<ContributionRecord>,
}

impl MixComponent {
    /// A component that only knows its material by id; snapshots are filled in by hydration.
    pub fn bare(
        material_id: impl Into<String>,
        material_name: impl Into<String>,
        percentage: f64,
        source_catalog: Catalog,
    ) -> Self {
        MixComponent {
            material_id: material_id.into(),
            material_name: material_name.into(),
            percentage,
            source_catalog,
            nutritional: None,
            proteins: None,
            enzymes: None,
            anti_nutrient_ratings: None,
            mechanical: None,
            solubility: None,
            anti_nutrient_contribution: None,
            enzyme_contribution: None,
        }
    }

    pub fn from_material(material: &Material, percentage: f64) -> Self {
        let mut component = MixComponent::bare(
            material.id.clone(),
            material.name.clone(),
            percentage,
            material.catalog,
        );
        component.apply_material(material);
        component
    }

    /// Overwrites the cached material snapshots, keeping percentage and contributions.
    pub fn apply_material(&mut self, material: &Material) {
        self.material_name = material.name.clone();
        self.source_catalog = material.catalog;
        self.nutritional = Some(material.nutritional);
        self.proteins = Some(material.proteins);
        self.enzymes = material.enzymes;
        self.anti_nutrient_ratings = Some(material.anti_nutrients);
        self.mechanical = Some(material.mechanical);
        self.solubility = material.solubility;
    }

    /// Share of the blend as a fraction of one.
    pub fn weight(&self) -> f64 {
        self.percentage / 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentageCheck {
    pub ok: bool,
    pub total_percentage: f64,
}

/// Checks that the component percentages add up to 100 within [`PERCENTAGE_TOLERANCE`].
pub fn validate_percentages(components: &[MixComponent]) -> PercentageCheck {
    let total_percentage: f64 = components.iter().map(|c| c.percentage).sum();
    PercentageCheck {
        ok: (total_percentage - 100.0).abs() < PERCENTAGE_TOLERANCE,
        total_percentage,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationSource {
    pub blend_id: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlendOrigin {
    #[default]
    Working,
    Combined { sources: Vec<CombinationSource> },
}

/// An ordered set of components with unique material ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Blend {
    pub components: Vec<MixComponent>,
    #[serde(default)]
    pub origin: BlendOrigin,
}

impl Blend {
    pub fn new() -> Self {
        Blend::default()
    }

    pub fn is_combined(&self) -> bool {
        matches!(self.origin, BlendOrigin::Combined { .. })
    }

    pub fn component(&self, material_id: &str) -> Option<&MixComponent> {
        self.components.iter().find(|c| c.material_id == material_id)
    }

    pub fn add_component(&mut self, component: MixComponent) -> Result<(), MixError> {
        if self.component(&component.material_id).is_some() {
            return Err(MixError::DuplicateMaterial(component.material_id));
        }
        self.components.push(component);
        Ok(())
    }

    /// Sets a component's percentage, clamped to 0..=100. Returns false for an unknown material.
    pub fn set_percentage(&mut self, material_id: &str, percentage: f64) -> bool {
        match self.components.iter_mut().find(|c| c.material_id == material_id) {
            Some(component) => {
                component.percentage = if percentage.is_nan() {
                    0.0
                } else {
                    percentage.clamp(0.0, 100.0)
                };
                true
            }
            None => false,
        }
    }

    pub fn remove_component(&mut self, material_id: &str) -> Option<MixComponent> {
        let index = self.components.iter().position(|c| c.material_id == material_id)?;
        Some(self.components.remove(index))
    }

    pub fn total_percentage(&self) -> f64 {
        self.components.iter().map(|c| c.percentage).sum()
    }

    pub fn remaining_percentage(&self) -> f64 {
        (100.0 - self.total_percentage()).max(0.0)
    }

    pub fn validate(&self) -> PercentageCheck {
        validate_percentages(&self.components)
    }
}

/// User-facing metadata attached when a blend is saved.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlendMetadata {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub shared: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedBlend {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub composition: Vec<MixComponent>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, alias = "is_shared")]
    pub shared: bool,
}

impl SavedBlend {
    /// Builds a saved blend, refusing compositions that do not add up to 100%.
    pub fn finalize(blend: Blend, metadata: BlendMetadata) -> Result<SavedBlend, MixError> {
        let check = blend.validate();
        if !check.ok {
            return Err(MixError::InvalidPercentageSum {
                total: check.total_percentage,
            });
        }
        Ok(SavedBlend {
            id: metadata.id,
            owner_id: metadata.owner_id,
            name: metadata.name,
            description: metadata.description,
            composition: blend.components,
            tags: metadata.tags,
            shared: metadata.shared,
        })
    }

    pub fn to_blend(&self) -> Blend {
        Blend {
            components: self.composition.clone(),
            origin: BlendOrigin::Working,
        }
    }
}
