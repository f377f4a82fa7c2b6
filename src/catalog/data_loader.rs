use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::contribution::{ContributionRecord, ContributionTable, PropertyClass};
use super::snapshot::CatalogSnapshot;
use super::source::{resolve_sources, CatalogContext, OwnerFilter};
use crate::material::{
    Catalog, EnzymeValues, FieldSet, Level, Material, NutritionalValues, ProteinComposition, Rating,
    AntiNutrientValues,
};

const ID_COL: &str = "id";
const NAME_COL: &str = "name";
const MATERIAL_ID_COL: &str = "material_id";
const MATERIAL_ID_ALIAS_COL: &str = "flour_id";
const ALL_VALUES_COL: &str = "all_values";
const SOLUBILITY_COL: &str = "solubility";
const MECHANICAL_COLS: [&str; 3] = ["binding", "stickiness", "water_absorption"];

fn parse_optional_f64(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

fn column_index(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == name)
}

fn required_column(headers: &StringRecord, name: &str) -> Result<usize> {
    column_index(headers, name).ok_or_else(|| anyhow!("Column '{}' not found", name))
}

fn cell<'r>(record: &'r StringRecord, index: Option<usize>) -> Option<&'r str> {
    index
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Reads the field set's columns from a row. `None` when every cell is empty or unparsable.
fn read_field_set<V: FieldSet>(headers: &StringRecord, record: &StringRecord) -> Option<V> {
    let mut values = V::default();
    let mut found = false;
    for field in V::FIELDS {
        if let Some(value) = cell(record, column_index(headers, field)).and_then(parse_optional_f64) {
            values.set(field, value);
            found = true;
        }
    }
    found.then_some(values)
}

fn read_level(record: &StringRecord, index: Option<usize>, row_index: usize, column: &str) -> Option<Level> {
    let raw = cell(record, index)?;
    match raw.parse::<Level>() {
        Ok(level) => Some(level),
        Err(e) => {
            warn!(row = row_index, column, "ignoring rating: {}", e);
            None
        }
    }
}

/// Index of the owner column, required when the table is owner-filtered.
fn owner_column(headers: &StringRecord, owner: Option<&OwnerFilter>) -> Result<Option<usize>> {
    match owner {
        Some(filter) => required_column(headers, filter.column).map(Some),
        None => Ok(None),
    }
}

fn owned_by(record: &StringRecord, owner_idx: Option<usize>, owner: Option<&OwnerFilter>) -> bool {
    match (owner_idx, owner) {
        (Some(idx), Some(filter)) => record.get(idx).map(str::trim) == Some(filter.owner_id.as_str()),
        _ => true,
    }
}

pub fn load_materials(csv_path: &Path, catalog: Catalog, owner: Option<&OwnerFilter>) -> Result<Vec<Material>> {
    if !csv_path.exists() {
        return Err(anyhow!("Material table not found at: {:?}", csv_path));
    }

    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open material table at {:?}", csv_path))?;
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(file);
    let headers = rdr.headers()?.clone();

    let id_idx = required_column(&headers, ID_COL)?;
    let name_idx = required_column(&headers, NAME_COL)?;
    let owner_idx = owner_column(&headers, owner)?;
    let solubility_idx = column_index(&headers, SOLUBILITY_COL);
    let mechanical_idx: Vec<Option<usize>> =
        MECHANICAL_COLS.iter().map(|col| column_index(&headers, col)).collect();

    let mut materials = Vec::new();
    for (row_index, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read record at row index {}", row_index))?;

        let Some(id) = cell(&record, Some(id_idx)) else {
            continue;
        };
        if !owned_by(&record, owner_idx, owner) {
            continue;
        }

        let mut material = Material::new(
            id,
            cell(&record, Some(name_idx)).unwrap_or(id),
            catalog,
        );
        material.nutritional = read_field_set::<NutritionalValues>(&headers, &record).unwrap_or_default();
        material.proteins = read_field_set::<ProteinComposition>(&headers, &record).unwrap_or_default();
        material.enzymes = read_field_set::<EnzymeValues>(&headers, &record);

        for field in AntiNutrientValues::FIELDS {
            let Some(raw) = cell(&record, column_index(&headers, field)) else {
                continue;
            };
            match raw.parse::<Rating>() {
                Ok(rating) => {
                    material.anti_nutrients.set(field, rating);
                }
                Err(e) => warn!(row = row_index, column = *field, "ignoring rating: {}", e),
            }
        }

        material.mechanical.binding = read_level(&record, mechanical_idx[0], row_index, MECHANICAL_COLS[0]);
        material.mechanical.stickiness = read_level(&record, mechanical_idx[1], row_index, MECHANICAL_COLS[1]);
        material.mechanical.water_absorption =
            read_level(&record, mechanical_idx[2], row_index, MECHANICAL_COLS[2]);
        material.solubility = read_level(&record, solubility_idx, row_index, SOLUBILITY_COL);
        material.owner_id = owner.map(|filter| filter.owner_id.clone());

        materials.push(material);
    }

    debug!(path = ?csv_path, count = materials.len(), "loaded materials");
    Ok(materials)
}

/// Loads one contribution table. A missing file is an empty table.
pub fn load_contributions(
    csv_path: &Path,
    class: PropertyClass,
    catalog: Catalog,
    owner: Option<&OwnerFilter>,
) -> Result<ContributionTable> {
    if !csv_path.exists() {
        debug!(path = ?csv_path, %class, "no contribution table, values will fall back");
        return Ok(ContributionTable::default());
    }

    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open contribution table at {:?}", csv_path))?;
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(file);
    let headers = rdr.headers()?.clone();

    let material_idx = column_index(&headers, MATERIAL_ID_COL)
        .or_else(|| column_index(&headers, MATERIAL_ID_ALIAS_COL))
        .ok_or_else(|| anyhow!("Column '{}' not found", MATERIAL_ID_COL))?;
    let all_values_idx = column_index(&headers, ALL_VALUES_COL);
    // Contribution tables are not always owner-tagged; filter only when they are.
    let owner_idx = owner.and_then(|filter| column_index(&headers, filter.column));
    let field_idx: Vec<(&str, Option<usize>)> = class
        .fields()
        .iter()
        .map(|field| (*field, column_index(&headers, field)))
        .collect();

    let mut records = Vec::new();
    for (row_index, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read record at row index {}", row_index))?;

        let Some(material_id) = cell(&record, Some(material_idx)) else {
            continue;
        };
        if !owned_by(&record, owner_idx, owner) {
            continue;
        }

        let mut contribution = ContributionRecord::new(material_id, catalog);
        if let Some(raw) = cell(&record, all_values_idx) {
            let nested: BTreeMap<String, f64> = serde_json::from_str(raw).with_context(|| {
                format!("Invalid '{}' object at row index {} of {:?}", ALL_VALUES_COL, row_index, csv_path)
            })?;
            contribution.all_values = Some(nested);
        }
        for (field, index) in &field_idx {
            if let Some(value) = cell(&record, *index).and_then(parse_optional_f64) {
                contribution.values.insert(field.to_string(), value);
            }
        }
        records.push(contribution);
    }

    debug!(path = ?csv_path, %class, count = records.len(), "loaded contributions");
    Ok(ContributionTable::new(records))
}

/// A catalog stored as one `<table>.csv` file per table in a directory.
#[derive(Debug, Clone)]
pub struct LocalCatalog {
    root: PathBuf,
}

impl LocalCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalCatalog { root: root.into() }
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.root.join(format!("{}.csv", table))
    }

    pub fn load(&self, context: &CatalogContext) -> Result<CatalogSnapshot> {
        let tables = resolve_sources(context)?;
        let owner = tables.owner_filter.as_ref();
        info!(catalog = %tables.catalog, root = ?self.root, "loading local catalog");

        let materials = load_materials(&self.table_path(tables.materials), tables.catalog, owner)
            .with_context(|| format!("Failed to load {} materials", tables.catalog))?;
        let anti_nutrients = load_contributions(
            &self.table_path(tables.anti_nutrient_contributions),
            PropertyClass::AntiNutrient,
            tables.catalog,
            owner,
        )?;
        let enzymes = load_contributions(
            &self.table_path(tables.enzyme_contributions),
            PropertyClass::Enzyme,
            tables.catalog,
            owner,
        )?;

        Ok(CatalogSnapshot::new(context.clone(), materials, anti_nutrients, enzymes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    const MATERIAL_HEADER: &str = "id,name,proteins,lipids,carbs,fiber,moisture,ash,albumins,globulins,prolamins,glutelins,amylases,proteases,lipases,phytases,lectins,tannins,saponins,phytic_acid,trypsin_inhibitors,binding,stickiness,water_absorption,solubility,user_id";

    fn create_material_csv() -> Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "{}", MATERIAL_HEADER)?;
        writeln!(file, "wheat,Wheat,12,2,70,3,12,1,10,10,40,40,1.2,0.4,0.1,0.2,low,Medium,0.3,high,low,high,medium,medium,low,u1")?;
        writeln!(file, "corn,Corn,9,4,74,7,11,1.2,5,5,50,40,,,,,low,low,low,medium,low,low,low,medium,medium,u2")?;
        writeln!(file, ",Nameless,1,1,1,1,1,1,,,,,,,,,,,,,,,,,,u1")?;
        writeln!(file, "teff,,13,2,73,8,,,,,,,,,,,plenty,,,,,sticky,,,,u1")?;
        file.flush()?;
        Ok(file)
    }

    #[test]
    fn test_load_materials_parses_all_property_groups() -> Result<()> {
        let file = create_material_csv()?;
        let materials = load_materials(file.path(), Catalog::Public, None)?;
        assert_eq!(materials.len(), 3);

        let wheat = materials.iter().find(|m| m.id == "wheat").unwrap();
        assert_eq!(wheat.catalog, Catalog::Public);
        assert_eq!(wheat.nutritional.proteins, 12.0);
        assert_eq!(wheat.proteins.prolamins, 40.0);
        assert_eq!(wheat.enzymes.unwrap().amylases, 1.2);
        assert_eq!(wheat.anti_nutrients.tannins, Some(Rating::Level(Level::Medium)));
        assert_eq!(wheat.anti_nutrients.saponins, Some(Rating::Value(0.3)));
        assert_eq!(wheat.mechanical.binding, Some(Level::High));
        assert_eq!(wheat.solubility, Some(Level::Low));

        let corn = materials.iter().find(|m| m.id == "corn").unwrap();
        assert!(corn.enzymes.is_none());

        // Unparsable ratings are dropped, a blank name falls back to the id.
        let teff = materials.iter().find(|m| m.id == "teff").unwrap();
        assert_eq!(teff.name, "teff");
        assert_eq!(teff.anti_nutrients.lectins, None);
        assert_eq!(teff.mechanical.binding, None);
        assert_eq!(teff.nutritional.moisture, 0.0);
        Ok(())
    }

    #[test]
    fn test_load_materials_applies_owner_filter() -> Result<()> {
        let file = create_material_csv()?;
        let filter = OwnerFilter {
            column: "user_id",
            owner_id: "u2".to_string(),
        };
        let materials = load_materials(file.path(), Catalog::Private, Some(&filter))?;
        assert_eq!(materials.len(), 1);
        assert_eq!(materials[0].id, "corn");
        assert_eq!(materials[0].owner_id.as_deref(), Some("u2"));
        Ok(())
    }

    #[test]
    fn test_load_materials_missing_column() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "id,proteins")?;
        writeln!(file, "wheat,12")?;
        file.flush()?;

        let result = load_materials(file.path(), Catalog::Public, None);
        assert!(result.unwrap_err().to_string().contains("Column 'name' not found"));
        Ok(())
    }

    #[test]
    fn test_load_materials_file_not_found() {
        let result = load_materials(Path::new("no_such_flours.csv"), Catalog::Public, None);
        assert!(result.unwrap_err().to_string().contains("Material table not found"));
    }

    #[test]
    fn test_load_contributions_reads_nested_and_flat() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "flour_id,lectins,tannins,all_values")?;
        writeln!(file, "wheat,0.4,,\"{{\"\"lectins\"\": 0.35, \"\"tannins\"\": 0.1}}\"")?;
        writeln!(file, "corn,0.2,0.6,")?;
        file.flush()?;

        let table = load_contributions(file.path(), PropertyClass::AntiNutrient, Catalog::Public, None)?;
        assert_eq!(table.len(), 2);

        let wheat = table.get("wheat").unwrap();
        assert_eq!(wheat.nested::<AntiNutrientValues>().unwrap().lectins, 0.35);
        assert_eq!(wheat.values.get("lectins"), Some(&0.4));
        assert!(!wheat.values.contains_key("tannins"));

        let corn = table.get("corn").unwrap();
        assert!(corn.all_values.is_none());
        assert_eq!(corn.flat::<AntiNutrientValues>().unwrap().tannins, 0.6);
        Ok(())
    }

    #[test]
    fn test_load_contributions_missing_file_is_empty() -> Result<()> {
        let table = load_contributions(
            Path::new("no_such_contributions.csv"),
            PropertyClass::Enzyme,
            Catalog::Enterprise,
            None,
        )?;
        assert!(table.is_empty());
        Ok(())
    }

    #[test]
    fn test_load_contributions_rejects_bad_nested_json() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "material_id,all_values")?;
        writeln!(file, "wheat,not-json")?;
        file.flush()?;

        let result = load_contributions(file.path(), PropertyClass::Enzyme, Catalog::Public, None);
        assert!(result.unwrap_err().to_string().contains("Invalid 'all_values' object"));
        Ok(())
    }

    #[test]
    fn test_local_catalog_loads_private_tables_for_owner() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(
            dir.path().join("private_flours.csv"),
            "id,name,proteins,user_id\nmine,My flour,10,u1\ntheirs,Their flour,11,u2\n",
        )?;
        std::fs::write(
            dir.path().join("private_flour_enzyme_contributions.csv"),
            "material_id,amylases,user_id\nmine,0.9,u1\ntheirs,0.8,u2\n",
        )?;

        let catalog = LocalCatalog::new(dir.path());
        let snapshot = catalog.load(&CatalogContext::private("u1"))?;
        assert_eq!(snapshot.materials().len(), 1);
        assert!(snapshot.material("mine").is_some());
        assert_eq!(snapshot.enzymes().len(), 1);
        assert!(snapshot.anti_nutrients().is_empty());

        let missing_owner = catalog.load(&CatalogContext {
            catalog: Catalog::Private,
            owner_id: None,
        });
        assert!(missing_owner.is_err());
        Ok(())
    }
}
