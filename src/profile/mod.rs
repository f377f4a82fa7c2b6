pub mod aggregator;
pub mod categorical;
pub mod combiner;
pub mod summary;

pub use combiner::{combine, CombinationRequest};
pub use summary::{compute_profile, compute_profiles, compute_profile_with, AggregatedProfile, ProteinWeighting};
