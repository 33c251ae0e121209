//! JSON-RPC style surface for agent tools.
//!
//! Each editor command is exposed as a method of the same name. Params are
//! the command arguments; the result is the editor's reply payload.

pub mod context;
pub mod errors;
pub mod handlers;
pub mod registry;
pub mod types;

pub use context::RpcContext;
pub use errors::RpcError;
pub use registry::{MethodHandler, MethodRegistry};
pub use types::{RpcErrorBody, RpcRequest, RpcResponse};
