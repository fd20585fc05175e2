pub mod arp;
pub mod interface;
pub mod link;
pub mod topology;

pub use arp::ArpCache;
pub use interface::Interface;
pub use link::{FrameSource, Link, PnetLink};
pub use topology::{SequenceTracker, Topology, TopologyEntry};
