pub mod error;
pub mod reader;

pub use error::{DbaseError, DbaseResult};
pub use reader::DbaseReader;
