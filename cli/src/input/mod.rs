pub mod csv;
pub mod features;
