pub mod client;
pub mod inventory;
pub mod resources;
pub mod types;
pub mod validation;

pub use client::{ClusterClient, StatusWriter};
pub use inventory::{ClusterInventory, StaticCluster};
pub use types::Key;
