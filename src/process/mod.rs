// src/process/mod.rs

pub mod date_parser;
pub mod raw_table;
pub mod utils;

pub use raw_table::RawTable;

#[cfg(test)]
pub(crate) use raw_table::table;
