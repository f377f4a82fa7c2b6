use crate::blend::MixComponent;
use crate::material::{Level, MechanicalProperties};

/// Share-weighted mean of the components' level scores (low 1, medium 2, high 3).
///
/// Components without a level are left out and the mean is taken over the
/// share of those that have one. `None` when no component has a level.
pub fn weighted_score<F>(components: &[MixComponent], selector: F) -> Option<f64>
where
    F: Fn(&MixComponent) -> Option<Level>,
{
    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    for component in components {
        if let Some(level) = selector(component) {
            let weight = component.weight();
            weighted_sum += level.score() * weight;
            weight_sum += weight;
        }
    }
    (weight_sum > 0.0).then(|| weighted_sum / weight_sum)
}

pub fn weighted_level<F>(components: &[MixComponent], selector: F) -> Option<Level>
where
    F: Fn(&MixComponent) -> Option<Level>,
{
    weighted_score(components, selector).map(Level::from_score)
}

pub fn aggregate_mechanical(components: &[MixComponent]) -> MechanicalProperties {
    MechanicalProperties {
        binding: weighted_level(components, |c| c.mechanical.and_then(|m| m.binding)),
        stickiness: weighted_level(components, |c| c.mechanical.and_then(|m| m.stickiness)),
        water_absorption: weighted_level(components, |c| c.mechanical.and_then(|m| m.water_absorption)),
    }
}

pub fn aggregate_solubility(components: &[MixComponent]) -> Option<Level> {
    weighted_level(components, |c| c.solubility)
}
