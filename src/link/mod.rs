//! Physical link: hardware backends and the connection lifecycle

pub mod backend;
pub(crate) mod manager;

pub use backend::{LinkBackend, LinkPort, SerialBackend};
pub use manager::LinkControl;
pub(crate) use manager::{LinkManager, LinkWriter};
