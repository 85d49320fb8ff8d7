//! Vector index backends

mod memory;
mod pinecone;

pub use memory::MemoryVectorIndex;
pub use pinecone::PineconeIndex;
