// keydrop-store: key-value storage layer (in-memory + Redis REST backends)

pub mod error;
pub mod kv;
pub mod memory;
pub mod rest;
pub mod transport;

pub use error::StoreError;
pub use kv::{KvStore, ScanPage};
pub use memory::MemoryStore;
pub use rest::RestStore;
pub use transport::{TlsMode, TransportConfig};
