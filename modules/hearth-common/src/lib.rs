pub mod config;
pub mod error;
pub mod safety;
pub mod store;
pub mod types;

pub use config::{Config, ConfigCache, HouseholdConfigSource, HouseholdSnapshot};
pub use error::HearthError;
pub use safety::*;
pub use store::{EventStore, MemoryStore, NotificationStore, RegistrationStore};
pub use types::*;
