pub mod bytereader;
pub mod error;
pub mod info;
pub mod logger;
pub(crate) mod traits;
