//! Output stage: everything that touches the output directory.
pub mod modules;
pub mod report;
