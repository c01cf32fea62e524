//! Knowledge base implementations for remedium.

pub mod in_memory;
pub mod seed;

pub use in_memory::InMemoryKnowledgeBase;
pub use seed::KnowledgeSeed;
