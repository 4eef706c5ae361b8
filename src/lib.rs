pub mod shared;

#[cfg(feature = "cli")]
pub mod cli;
