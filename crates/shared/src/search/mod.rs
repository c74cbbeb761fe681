pub mod catalog;
pub mod gate;
pub mod open_fda;
pub mod open_food_facts;
pub mod resolver;

pub use catalog::{CatalogFuture, ProductCatalog, SearchError};
pub use gate::{SKIP_SEARCH_CONFIDENCE_FLOOR, should_search};
pub use open_fda::OpenFdaCatalog;
pub use open_food_facts::OpenFoodFactsCatalog;
pub use resolver::{DEFAULT_MAX_CANDIDATES, ProductResolver, rank_candidates};
