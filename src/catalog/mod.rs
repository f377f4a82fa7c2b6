pub mod contribution;
pub mod data_loader;
pub mod snapshot;
pub mod source;

pub use contribution::{resolve, ContributionRecord, ContributionTable, PropertyClass};
pub use data_loader::LocalCatalog;
pub use snapshot::{hydrate_components, CatalogSnapshot};
pub use source::{resolve_sources, CatalogContext, SourceError, SourceTables};
