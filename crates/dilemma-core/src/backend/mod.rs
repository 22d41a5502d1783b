//! Backend gateway: trait, RPC implementation, in-memory mock.

mod mock;
mod rpc;
mod traits;

pub use mock::MockBackend;
pub use rpc::RpcBackend;
pub use traits::{Backend, BackendError};
