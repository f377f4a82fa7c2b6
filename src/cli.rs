use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding one `<table>.csv` file per catalog table
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Read the catalog from the configured REST service instead of local files
    #[arg(long, global = true)]
    pub remote: bool,

    /// Owner of the private catalog (defaults to each blend's owner)
    #[arg(long, global = true)]
    pub owner: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the aggregated profile of one or more saved blends
    Profile {
        /// Saved blend JSON file; repeat for several blends
        #[arg(short, long = "blend", required = true)]
        blends: Vec<PathBuf>,
    },
    /// Check that a saved blend's percentages add up to 100
    Validate {
        #[arg(short, long)]
        blend: PathBuf,
    },
    /// Combine saved blends into a new one, given as `path=weight`
    Combine {
        #[arg(short, long = "blend", required = true, value_parser = parse_weighted_blend)]
        blends: Vec<WeightedBlendArg>,

        /// Write the combined blend here instead of only printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedBlendArg {
    pub path: PathBuf,
    pub weight: f64,
}

/// Parses `path=weight`; a bare path has weight 1.
pub fn parse_weighted_blend(s: &str) -> Result<WeightedBlendArg, String> {
    match s.rsplit_once('=') {
        Some((path, weight)) => {
            let weight = weight
                .trim()
                .parse::<f64>()
                .map_err(|e| format!("Invalid weight '{}': {}", weight, e))?;
            if path.is_empty() {
                return Err(format!("Missing blend path in '{}'", s));
            }
            Ok(WeightedBlendArg {
                path: PathBuf::from(path),
                weight,
            })
        }
        None => Ok(WeightedBlendArg {
            path: PathBuf::from(s),
            weight: 1.0,
        }),
    }
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
