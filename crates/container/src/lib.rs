//! Container lifecycle management and port negotiation.

pub mod lifecycle;
pub mod ports;
pub mod proxy;

pub use lifecycle::{ContainerLifecycle, ContainerStatus, DockerManager, StartOptions};
pub use ports::{ensure_ports_available, find_free_port, port_is_free, DEFAULT_PROXY_PORT};
