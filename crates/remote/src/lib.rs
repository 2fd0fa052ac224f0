//! Remote blob store used to host cake slices.
//!
//! The transfer pipelines only see [`RemoteStore`]: `put` a payload with a
//! positional label and get back an opaque locator, `get` the payload back
//! from that locator. [`ChannelStore`] talks to a chat-style message API
//! where each slice becomes a message attachment; [`MemoryStore`] keeps
//! everything in process.

pub mod channel;
pub mod memory;
pub mod store;
pub mod types;

pub use channel::{ChannelStore, StoreConfig};
pub use memory::MemoryStore;
pub use store::{RemoteError, RemoteStore, StoreFuture};
