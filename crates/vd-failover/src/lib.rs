mod client;
mod error;
mod protocol;
mod server;
mod store;

pub use client::{DegradedFn, FailOverClient};
pub use error::FailOverError;
pub use protocol::{FocEntry, Opcode, Status};
pub use server::Server;
pub use store::{mem::MemStore, FailOverStore};
