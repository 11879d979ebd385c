// Service exports
pub mod cache;
pub mod memory;
pub mod notifier;
pub mod postgres;
pub mod store;

pub use cache::{CacheError, CacheKey, CacheManager};
pub use memory::{LookupKind, MemoryStore};
pub use notifier::{
    LogNotifier, NotificationDispatcher, NotificationEvent, NotifyError, WebhookNotifier,
};
pub use postgres::PostgresStore;
pub use store::{
    BlockStore, ConnectionStore, ProfileStore, StoreError, SubscriptionStore, SwipeStore,
};
