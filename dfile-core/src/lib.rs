pub mod driver;
pub mod error;
pub mod index;
pub mod layout;
pub mod memo;
pub mod options;
pub mod partition;
pub mod router;
pub mod source;
pub mod store;
pub mod transcoder;

pub type DfileResult<T> = std::result::Result<T, error::DfileError>;

/// Physical block number inside a store. Block 0 is the store header.
pub type BlockAddress = u64;
