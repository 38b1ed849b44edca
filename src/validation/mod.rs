//! Input validation module.
//!
//! Provides validators for broker versions, package names, absolute paths,
//! env file variable names, and system accounts.

mod account;
mod env_name;
mod package_name;
mod path;
mod version;

pub use account::{resolve_group, resolve_user};
pub use env_name::validate_env_name;
pub use package_name::validate_package_name;
pub use path::validate_absolute_path;
pub use version::validate_version;
