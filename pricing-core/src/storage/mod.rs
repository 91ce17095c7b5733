pub mod database;
pub mod in_memory;
pub mod traits;

pub use database::SqliteStorage;
pub use in_memory::InMemoryStorage;
pub use traits::{MappingStore, NormalizedPricingStore, RawPricingStore};
