pub mod event;
pub mod event_embedding;
pub mod page;

pub use event::Entity as EventEntity;
pub use event_embedding::Entity as EventEmbeddingEntity;
pub use page::Entity as PageEntity;
