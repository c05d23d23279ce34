//! DNS resolution: RFC 1035 wire codec, retrying query state machine,
//! and a TTL cache, all running over the poller's UDP socket.

mod cache;
mod resolver;
mod wire;

pub use resolver::{Resolver, ResolverConfig};
