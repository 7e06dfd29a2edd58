mod connection;
mod memory;

pub use connection::{Connection, ConnectionError, ConnectionPool, PoolBuilder};
pub use memory::{MemoryConnection, MemoryPool, MemoryPoolBuilder, MEMORY_SCHEME};
