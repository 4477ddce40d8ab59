mod cache;
mod client;
#[cfg(any(test, feature = "test-fixtures"))]
mod memory;
mod retry;
mod transport;

pub use cache::FetchCache;
pub use client::RegistryClient;
#[cfg(any(test, feature = "test-fixtures"))]
pub use memory::MemoryTransport;
pub use retry::RetryPolicy;
pub use transport::{HttpTransport, Transport};

#[cfg(test)]
mod tests;
