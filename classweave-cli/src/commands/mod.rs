pub mod common;
pub mod list;
pub mod scan;
pub mod weave;
