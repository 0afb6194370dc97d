//! hostfan-exec: Command execution abstraction
//!
//! Provides the `RemoteExecutor` trait used by per-host operations and the
//! management plane, plus a local implementation backed by `tokio::process`.

pub mod error;
pub mod local;
pub mod result;
pub mod traits;

pub use error::ExecError;
pub use local::LocalExecutor;
pub use result::CommandResult;
pub use traits::RemoteExecutor;
