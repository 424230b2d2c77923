#![forbid(unsafe_code)]

pub mod http;
pub mod memory;
pub mod provider;

pub use http::{HttpConfig, HttpProvider};
pub use memory::{AttemptRecord, InMemoryProvider, ProviderCall};
pub use provider::{AccessGate, Backend, ContentProvider, ProviderError};
