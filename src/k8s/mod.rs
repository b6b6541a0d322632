pub mod capability;
pub mod client;
pub mod types;

pub use capability::ClusterApi;
pub use client::ClusterClient;
