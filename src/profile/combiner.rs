use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::blend::{Blend, BlendOrigin, CombinationSource, MixComponent, MixError, SavedBlend};
use crate::catalog::contribution::{ContributionClass, ContributionRecord};
use crate::material::{AntiNutrientValues, EnzymeValues, FieldSet};

/// One saved blend and its relative weight in a combination.
#[derive(Debug, Clone, Copy)]
pub struct CombinationRequest<'a> {
    pub blend: &'a SavedBlend,
    pub weight: f64,
}

impl<'a> CombinationRequest<'a> {
    pub fn new(blend: &'a SavedBlend, weight: f64) -> Self {
        CombinationRequest { blend, weight }
    }
}

/// Adds `weight ×` the incoming record's values into the running snapshot.
///
/// The merged values live in the nested object so they stay first in the fallback chain.
fn fold_contribution<V: ContributionClass>(
    slot: &mut Option<ContributionRecord>,
    incoming: Option<&ContributionRecord>,
    weight: f64,
) {
    let Some(incoming) = incoming else {
        return;
    };
    let Some(values) = incoming.recorded::<V>() else {
        return;
    };
    let mut merged: V = slot
        .as_ref()
        .and_then(|record| record.recorded::<V>())
        .unwrap_or_default();
    merged.add_scaled(&values, weight);
    *slot = Some(ContributionRecord::from_values(
        incoming.material_id.clone(),
        incoming.catalog,
        &merged,
    ));
}

fn fold_component(entry: &mut MixComponent, component: &MixComponent, adjusted: f64, weight: f64) {
    entry.percentage += adjusted;
    fold_contribution::<AntiNutrientValues>(
        &mut entry.anti_nutrient_contribution,
        component.anti_nutrient_contribution.as_ref(),
        weight,
    );
    fold_contribution::<EnzymeValues>(
        &mut entry.enzyme_contribution,
        component.enzyme_contribution.as_ref(),
        weight,
    );
}

/// Merges several saved blends into one blend whose percentages add up to 100.
///
/// Percentages are scaled by each request's share of the total weight. A
/// material's first occurrence keeps its contribution snapshots unchanged;
/// every later occurrence adds its snapshot scaled by the raw weight. When a
/// material shows up under different catalogs the last one processed wins.
pub fn combine(requests: &[CombinationRequest<'_>]) -> Result<Blend, MixError> {
    if requests.is_empty() {
        return Err(MixError::NoCombinationInputs);
    }
    if let Some(bad) = requests
        .iter()
        .find(|r| !(r.weight.is_finite() && r.weight > 0.0))
    {
        return Err(MixError::InvalidWeight {
            blend_id: bad.blend.id.clone(),
            weight: bad.weight,
        });
    }

    let total_weight: f64 = requests.iter().map(|r| r.weight).sum();
    let mut merged: Vec<MixComponent> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for request in requests {
        let normalized_weight = request.weight / total_weight;
        for component in &request.blend.composition {
            let adjusted = component.percentage * normalized_weight;
            match positions.get(&component.material_id) {
                Some(&index) => {
                    let entry = &mut merged[index];
                    if entry.source_catalog != component.source_catalog {
                        warn!(
                            material_id = %component.material_id,
                            previous = %entry.source_catalog,
                            current = %component.source_catalog,
                            blend_id = %request.blend.id,
                            "material appears under different catalogs, keeping the last one"
                        );
                        entry.source_catalog = component.source_catalog;
                    }
                    fold_component(entry, component, adjusted, request.weight);
                }
                None => {
                    // First occurrence keeps its snapshots as recorded.
                    let mut entry = component.clone();
                    entry.percentage = adjusted;
                    positions.insert(component.material_id.clone(), merged.len());
                    merged.push(entry);
                }
            }
        }
    }

    let grand_total: f64 = merged.iter().map(|c| c.percentage).sum();
    if grand_total > 0.0 {
        let scale = 100.0 / grand_total;
        for component in merged.iter_mut() {
            component.percentage *= scale;
        }
    }
    // Stable, so ties keep first-seen order.
    merged.sort_by(|a, b| b.percentage.partial_cmp(&a.percentage).unwrap_or(Ordering::Equal));

    debug!(
        blends = requests.len(),
        components = merged.len(),
        grand_total,
        "combined blends"
    );

    Ok(Blend {
        components: merged,
        origin: BlendOrigin::Combined {
            sources: requests
                .iter()
                .map(|r| CombinationSource {
                    blend_id: r.blend.id.clone(),
                    weight: r.weight,
                })
                .collect(),
        },
    })
}
