pub mod cli;
pub mod file_logging;
