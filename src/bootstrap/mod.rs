pub mod setup;

pub use setup::{check_conversion_command, initialize_folders, initialize_logger};
