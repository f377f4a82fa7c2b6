use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Scope a material record comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Catalog {
    #[default]
    Public,
    Enterprise,
    Private,
}

impl Catalog {
    pub const ALL: [Catalog; 3] = [Catalog::Public, Catalog::Enterprise, Catalog::Private];

    pub fn as_str(&self) -> &'static str {
        match self {
            Catalog::Public => "public",
            Catalog::Enterprise => "enterprise",
            Catalog::Private => "private",
        }
    }
}

impl fmt::Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Catalog {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Catalog::Public),
            "enterprise" => Ok(Catalog::Enterprise),
            "private" => Ok(Catalog::Private),
            other => Err(format!("Unknown catalog '{}'", other)),
        }
    }
}

/// Qualitative rating used for mechanical properties, solubility and
/// anti-nutrient levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    Medium,
    High,
}

impl Level {
    /// Numeric score used when averaging categorical properties.
    pub fn score(self) -> f64 {
        match self {
            Level::Low => 1.0,
            Level::Medium => 2.0,
            Level::High => 3.0,
        }
    }

    /// Per-unit value substituted for a missing contribution record.
    pub fn contribution_value(self) -> f64 {
        match self {
            Level::Low => 0.5,
            Level::Medium => 1.5,
            Level::High => 2.5,
        }
    }

    /// Buckets an averaged score back to a category. Both upper bounds are inclusive.
    pub fn from_score(score: f64) -> Level {
        if score <= 1.67 {
            Level::Low
        } else if score <= 2.33 {
            Level::Medium
        } else {
            Level::High
        }
    }

    /// Buckets an anti-nutrient grand total.
    pub fn from_anti_nutrient_total(total: f64) -> Level {
        if total <= 5.0 {
            Level::Low
        } else if total <= 10.0 {
            Level::Medium
        } else {
            Level::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Low => "low",
            Level::Medium => "medium",
            Level::High => "high",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Level::Low),
            "medium" => Ok(Level::Medium),
            "high" => Ok(Level::High),
            other => Err(format!("Unknown level '{}'", other)),
        }
    }
}

/// An anti-nutrient rating is either a category or an already measured number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rating {
    Level(Level),
    Value(f64),
}

impl Rating {
    pub fn contribution_value(self) -> f64 {
        match self {
            Rating::Level(level) => level.contribution_value(),
            Rating::Value(value) => value,
        }
    }
}

impl FromStr for Rating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(value) = s.trim().parse::<f64>() {
            return Ok(Rating::Value(value));
        }
        s.parse::<Level>().map(Rating::Level)
    }
}

/// A fixed group of named numeric fields that aggregate linearly.
pub trait FieldSet: Default + Copy {
    const FIELDS: &'static [&'static str];

    fn get(&self, field: &str) -> Option<f64>;

    /// Returns false when `field` is not part of the set.
    fn set(&mut self, field: &str, value: f64) -> bool;

    fn total(&self) -> f64 {
        Self::FIELDS.iter().filter_map(|field| self.get(field)).sum()
    }

    /// `self[f] += other[f] * factor` for every field.
    fn add_scaled(&mut self, other: &Self, factor: f64) {
        for field in Self::FIELDS {
            if let (Some(current), Some(value)) = (self.get(field), other.get(field)) {
                self.set(field, current + value * factor);
            }
        }
    }

    fn scaled(&self, factor: f64) -> Self {
        let mut out = Self::default();
        out.add_scaled(self, factor);
        out
    }

    /// Picks the set's fields out of a loose map. `None` when none of them is present.
    fn from_map(map: &BTreeMap<String, f64>) -> Option<Self> {
        let mut out = Self::default();
        let mut found = false;
        for field in Self::FIELDS {
            if let Some(value) = map.get(*field) {
                out.set(field, *value);
                found = true;
            }
        }
        found.then_some(out)
    }

    fn to_map(&self) -> BTreeMap<String, f64> {
        Self::FIELDS
            .iter()
            .filter_map(|field| self.get(field).map(|value| (field.to_string(), value)))
            .collect()
    }
}

macro_rules! field_set {
    ($(#[$meta:meta])* $name:ident { $($field:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
        pub struct $name {
            $(
                #[serde(default)]
                pub $field: f64,
            )+
        }

        impl FieldSet for $name {
            const FIELDS: &'static [&'static str] = &[$(stringify!($field)),+];

            fn get(&self, field: &str) -> Option<f64> {
                match field {
                    $(stringify!($field) => Some(self.$field),)+
                    _ => None,
                }
            }

            fn set(&mut self, field: &str, value: f64) -> bool {
                match field {
                    $(stringify!($field) => {
                        self.$field = value;
                        true
                    })+
                    _ => false,
                }
            }
        }
    };
}

field_set!(
    /// Mass percentages of the main nutritional fractions.
    NutritionalValues { proteins, lipids, carbs, fiber, moisture, ash }
);

field_set!(
    /// Protein fractions, as percentages of total protein.
    ProteinComposition { albumins, globulins, prolamins, glutelins }
);

field_set!(
    EnzymeValues { amylases, proteases, lipases, phytases }
);

field_set!(
    AntiNutrientValues { lectins, tannins, saponins, phytic_acid, trypsin_inhibitors }
);

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AntiNutrientRatings {
    #[serde(default)]
    pub lectins: Option<Rating>,
    #[serde(default)]
    pub tannins: Option<Rating>,
    #[serde(default)]
    pub saponins: Option<Rating>,
    #[serde(default)]
    pub phytic_acid: Option<Rating>,
    #[serde(default)]
    pub trypsin_inhibitors: Option<Rating>,
}

impl AntiNutrientRatings {
    pub fn get(&self, field: &str) -> Option<Rating> {
        match field {
            "lectins" => self.lectins,
            "tannins" => self.tannins,
            "saponins" => self.saponins,
            "phytic_acid" => self.phytic_acid,
            "trypsin_inhibitors" => self.trypsin_inhibitors,
            _ => None,
        }
    }

    pub fn set(&mut self, field: &str, rating: Rating) -> bool {
        let slot = match field {
            "lectins" => &mut self.lectins,
            "tannins" => &mut self.tannins,
            "saponins" => &mut self.saponins,
            "phytic_acid" => &mut self.phytic_acid,
            "trypsin_inhibitors" => &mut self.trypsin_inhibitors,
            _ => return false,
        };
        *slot = Some(rating);
        true
    }

    /// Converts the ratings to per-unit values. `None` when no field is rated.
    pub fn to_values(&self) -> Option<AntiNutrientValues> {
        let mut values = AntiNutrientValues::default();
        let mut found = false;
        for field in AntiNutrientValues::FIELDS {
            if let Some(rating) = self.get(field) {
                values.set(field, rating.contribution_value());
                found = true;
            }
        }
        found.then_some(values)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MechanicalProperties {
    #[serde(default)]
    pub binding: Option<Level>,
    #[serde(default)]
    pub stickiness: Option<Level>,
    #[serde(default)]
    pub water_absorption: Option<Level>,
}

/// A raw flour record from one of the catalogs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub catalog: Catalog,
    #[serde(default)]
    pub nutritional: NutritionalValues,
    #[serde(default)]
    pub proteins: ProteinComposition,
    #[serde(default)]
    pub enzymes: Option<EnzymeValues>,
    #[serde(default)]
    pub anti_nutrients: AntiNutrientRatings,
    #[serde(default)]
    pub mechanical: MechanicalProperties,
    #[serde(default)]
    pub solubility: Option<Level>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "user_id")]
    pub owner_id: Option<String>,
}

impl Material {
    pub fn new(id: impl Into<String>, name: impl Into<String>, catalog: Catalog) -> Self {
        Material {
            id: id.into(),
            name: name.into(),
            catalog,
            nutritional: NutritionalValues::default(),
            proteins: ProteinComposition::default(),
            enzymes: None,
            anti_nutrients: AntiNutrientRatings::default(),
            mechanical: MechanicalProperties::default(),
            solubility: None,
            owner_id: None,
        }
    }
}
