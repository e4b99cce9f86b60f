mod config_tests;
#[cfg(unix)]
mod process_tests;
