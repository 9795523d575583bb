pub mod node;
pub mod status;

pub use node::RegistryNode;
pub use status::{BrokerStatus, ChainStatus};
