//! Utility modules for the scanner

pub mod target_parser;

pub use target_parser::{AddressExpander, Expansion, ScanTarget, TargetRange};
