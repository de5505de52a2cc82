pub mod config;
pub mod operator;
pub mod path;
mod recordings;

#[cfg(test)]
mod tests;

pub use config::StorageConfig;
pub use operator::{create_operator, init_operator, test_connection};
pub use path::{generate_path, validate_path};
pub use recordings::Recordings;
