use anyhow::{anyhow, Context, Result};
use flour_mix::blend::SavedBlend;
use flour_mix::catalog::{hydrate_components, CatalogContext, CatalogSnapshot, LocalCatalog};
use flour_mix::catalog_client::CatalogClient;
use flour_mix::cli::{parse_args, Command, WeightedBlendArg};
use flour_mix::config::CatalogConfig;
use flour_mix::material::Catalog;
use flour_mix::profile::{combine, compute_profile, compute_profiles, AggregatedProfile, CombinationRequest};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;

enum CatalogReader {
    Local(LocalCatalog),
    Remote(CatalogClient),
}

impl CatalogReader {
    async fn load(&self, context: &CatalogContext) -> Result<CatalogSnapshot> {
        match self {
            CatalogReader::Local(catalog) => catalog.load(context),
            CatalogReader::Remote(client) => Ok(client.fetch_snapshot(context).await?),
        }
    }
}

#[derive(Serialize)]
struct ProfileReport<'a> {
    blend_id: &'a str,
    name: &'a str,
    missing_materials: Vec<String>,
    profile: AggregatedProfile,
}

#[derive(Serialize)]
struct CombinationReport<'a> {
    blend: &'a flour_mix::blend::Blend,
    missing_materials: Vec<String>,
    profile: AggregatedProfile,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

async fn read_blend(path: &Path) -> Result<SavedBlend> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read blend file '{}'", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse blend file '{}'", path.display()))
}

/// The catalog contexts a blend's components come from.
fn contexts_for(blend: &SavedBlend, owner: Option<&str>) -> Vec<CatalogContext> {
    let mut contexts: Vec<CatalogContext> = Vec::new();
    for component in &blend.composition {
        let context = match component.source_catalog {
            Catalog::Public => CatalogContext::public(),
            Catalog::Enterprise => CatalogContext::enterprise(),
            Catalog::Private => CatalogContext::private(owner.unwrap_or(&blend.owner_id)),
        };
        if !contexts.contains(&context) {
            contexts.push(context);
        }
    }
    contexts
}

/// Loads each needed catalog once and hydrates every blend against its own catalogs.
async fn hydrate_blends(
    reader: &CatalogReader,
    blends: &mut [SavedBlend],
    owner: Option<&str>,
) -> Result<Vec<Vec<String>>> {
    let mut snapshots: Vec<CatalogSnapshot> = Vec::new();
    let mut missing = Vec::with_capacity(blends.len());

    for blend in blends.iter_mut() {
        let contexts = contexts_for(blend, owner);
        for context in &contexts {
            if !snapshots.iter().any(|s| s.context() == context) {
                let snapshot = reader
                    .load(context)
                    .await
                    .with_context(|| format!("Failed to load the {} catalog", context.catalog))?;
                snapshots.push(snapshot);
            }
        }
        let own: Vec<CatalogSnapshot> = snapshots
            .iter()
            .filter(|s| contexts.contains(s.context()))
            .cloned()
            .collect();
        missing.push(hydrate_components(&mut blend.composition, &own));
    }
    Ok(missing)
}

async fn run_profile(reader: &CatalogReader, paths: &[PathBuf], owner: Option<&str>) -> Result<()> {
    let mut blends = Vec::with_capacity(paths.len());
    for path in paths {
        blends.push(read_blend(path).await?);
    }
    let missing = hydrate_blends(reader, &mut blends, owner).await?;

    let working: Vec<_> = blends.iter().map(SavedBlend::to_blend).collect();
    let profiles = compute_profiles(&working);

    let reports: Vec<ProfileReport> = blends
        .iter()
        .zip(missing)
        .zip(profiles)
        .map(|((blend, missing_materials), profile)| ProfileReport {
            blend_id: &blend.id,
            name: &blend.name,
            missing_materials,
            profile,
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

async fn run_validate(path: &Path) -> Result<()> {
    let blend = read_blend(path).await?;
    let check = blend.to_blend().validate();
    println!("{}", serde_json::to_string_pretty(&check)?);
    if check.ok {
        Ok(())
    } else {
        Err(anyhow!(
            "Blend '{}' adds up to {:.2}% instead of 100%",
            blend.name,
            check.total_percentage
        ))
    }
}

async fn run_combine(
    reader: &CatalogReader,
    args: &[WeightedBlendArg],
    output: Option<&Path>,
    owner: Option<&str>,
) -> Result<()> {
    let mut blends = Vec::with_capacity(args.len());
    for arg in args {
        blends.push(read_blend(&arg.path).await?);
    }
    let missing = hydrate_blends(reader, &mut blends, owner).await?;

    let requests: Vec<CombinationRequest> = blends
        .iter()
        .zip(args)
        .map(|(blend, arg)| CombinationRequest::new(blend, arg.weight))
        .collect();
    let combined = combine(&requests)?;
    info!(
        sources = requests.len(),
        components = combined.components.len(),
        "blends combined"
    );

    let mut missing_materials: Vec<String> = missing.into_iter().flatten().collect();
    missing_materials.sort();
    missing_materials.dedup();

    let report = CombinationReport {
        blend: &combined,
        missing_materials,
        profile: compute_profile(&combined),
    };
    let json = serde_json::to_string_pretty(&report)?;
    if let Some(path) = output {
        fs::write(path, &json)
            .await
            .with_context(|| format!("Failed to write combined blend to '{}'", path.display()))?;
        info!(path = %path.display(), "combined blend written");
    }
    println!("{}", json);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = parse_args();
    let mut config = CatalogConfig::from_env();
    if let Some(data_dir) = cli.data_dir.clone() {
        config.data_dir = data_dir;
    }

    let reader = if cli.remote {
        CatalogReader::Remote(CatalogClient::from_config(&config)?)
    } else {
        CatalogReader::Local(LocalCatalog::new(config.data_dir.clone()))
    };
    let owner = cli.owner.as_deref();

    match &cli.command {
        Command::Profile { blends } => run_profile(&reader, blends, owner).await,
        Command::Validate { blend } => run_validate(blend).await,
        Command::Combine { blends, output } => run_combine(&reader, blends, output.as_deref(), owner).await,
    }
}
