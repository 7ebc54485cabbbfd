// Registry module - MEMBERSHIP THROUGH A SHARED STORE
// Heartbeat records with expiry, the stores that hold them, and the backend

mod peers;
mod record;
mod redis_store;
mod sled_store;
mod store;

pub use peers::RegistryPeers;
pub use record::MembershipRecord;
pub use redis_store::RedisStore;
pub use sled_store::SledStore;
pub use store::{open_store, MembershipStore, StoreError};
