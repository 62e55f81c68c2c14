pub mod aggregate;
pub mod codec;
pub mod event;
pub mod geometry;
pub mod index;
pub mod resolve;
pub mod util;
