pub mod algorithms;
pub mod config;
pub mod forwarding;
pub mod interfaces;
pub mod network;
pub mod protocol;
pub mod router;
pub mod worker_pool;

pub use config::{ProtocolTimers, RouterConfig};
pub use router::{Router, RouterContext, RouterState, SharedContext};
