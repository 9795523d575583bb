pub mod error;
pub mod key;
pub mod name;
pub mod rpc;
pub mod transaction;

pub use error::ChainError;
pub use key::{PrivateKey, Signature};
pub use name::Name;
pub use rpc::{ChainRpc, TransactOptions};
pub use transaction::{Action, PermissionLevel, Transaction};
