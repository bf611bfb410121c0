mod group_loop;
mod peer_loop;

pub use group_loop::run_group_loop;
pub use peer_loop::run_peer_loop;

pub const TICK: std::time::Duration = std::time::Duration::from_millis(1000);
