//! The llamar tool server: JSON-RPC dispatch, stdio and socket pumps,
//! the rate limiter, the scheduler, and the subagent supervisor.

pub mod mcp_client;
pub mod rate;
pub mod rpc;
pub mod scheduler;
pub mod shutdown;
pub mod socket;
pub mod state;
pub mod stdio;
pub mod subagent;
pub mod subagent_tools;

pub use rpc::{ConnState, RpcHandler};
pub use state::ServerState;
