use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

use super::contribution::PropertyClass;
use crate::material::Catalog;

/// Column the private tables are filtered on.
pub const OWNER_COLUMN: &str = "user_id";

/// The catalog a caller is working against, passed explicitly to every lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogContext {
    pub catalog: Catalog,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

impl CatalogContext {
    pub fn public() -> Self {
        CatalogContext {
            catalog: Catalog::Public,
            owner_id: None,
        }
    }

    pub fn enterprise() -> Self {
        CatalogContext {
            catalog: Catalog::Enterprise,
            owner_id: None,
        }
    }

    pub fn private(owner_id: impl Into<String>) -> Self {
        CatalogContext {
            catalog: Catalog::Private,
            owner_id: Some(owner_id.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    MissingOwner,
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::MissingOwner => {
                write!(f, "The private catalog requires an owning user id")
            }
        }
    }
}

impl Error for SourceError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerFilter {
    pub column: &'static str,
    pub owner_id: String,
}

/// Tables to query for one catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceTables {
    pub catalog: Catalog,
    pub materials: &'static str,
    pub anti_nutrient_contributions: &'static str,
    pub enzyme_contributions: &'static str,
    pub owner_filter: Option<OwnerFilter>,
}

impl SourceTables {
    pub fn contributions(&self, class: PropertyClass) -> &'static str {
        match class {
            PropertyClass::AntiNutrient => self.anti_nutrient_contributions,
            PropertyClass::Enzyme => self.enzyme_contributions,
        }
    }

    /// Every table name, materials first.
    pub fn all(&self) -> [&'static str; 3] {
        [
            self.materials,
            self.anti_nutrient_contributions,
            self.enzyme_contributions,
        ]
    }
}

/// Maps a catalog context to the tables it reads from.
pub fn resolve_sources(context: &CatalogContext) -> Result<SourceTables, SourceError> {
    let owner_filter = match context.catalog {
        Catalog::Private => {
            let owner_id = context
                .owner_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .ok_or(SourceError::MissingOwner)?;
            Some(OwnerFilter {
                column: OWNER_COLUMN,
                owner_id: owner_id.to_string(),
            })
        }
        Catalog::Public | Catalog::Enterprise => None,
    };

    let (materials, anti_nutrient_contributions, enzyme_contributions) = match context.catalog {
        Catalog::Public => (
            "flours",
            "flour_antinutrient_contributions",
            "flour_enzyme_contributions",
        ),
        Catalog::Enterprise => (
            "enterprise_flours",
            "enterprise_flour_antinutrient_contributions",
            "enterprise_flour_enzyme_contributions",
        ),
        Catalog::Private => (
            "private_flours",
            "private_flour_antinutrient_contributions",
            "private_flour_enzyme_contributions",
        ),
    };

    Ok(SourceTables {
        catalog: context.catalog,
        materials,
        anti_nutrient_contributions,
        enzyme_contributions,
        owner_filter,
    })
}
