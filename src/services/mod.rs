// Service exports
pub mod cache;
pub mod locator;
pub mod memory;
pub mod postgres;
pub mod resolver;
pub mod store;

pub use cache::{CacheError, CacheKey, CacheManager};
pub use locator::{CandidateLocator, LocatorOptions};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use resolver::{entity_from_record, EntityResolver};
pub use store::{CandidateQuery, GeoSearch, RecordStore, StoreError};
