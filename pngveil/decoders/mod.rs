pub mod chunk;
pub mod header;
pub mod inflate;
pub mod metadata;
pub mod payload;
pub mod pixels;
pub mod session;
