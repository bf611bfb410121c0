mod group;
mod log;
mod peer;

pub use group::Group;
pub use log::LogRecord;
pub use peer::{Peer, Role, ServerSpecificInfo};
