//! Port traits at the boundary between the domain and the outside world.

pub mod config_port;
pub mod http_port;
pub mod source_port;
pub mod warehouse_port;
pub mod dataset_port;
pub mod notifier_port;
pub mod object_store_port;
