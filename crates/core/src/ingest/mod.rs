pub mod csv;
pub mod merge;
