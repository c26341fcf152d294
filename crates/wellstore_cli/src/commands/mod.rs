//! CLI command implementations.

pub mod compact;
pub mod dump;
pub mod inspect;
pub mod migrate;
pub mod verify;

use std::path::Path;
use wellstore_core::{Store, StoreConfig};

/// Opens an existing store without upgrading it.
pub fn open_existing(path: &Path) -> Result<Store, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No store found at {}", path.display()).into());
    }
    let config = StoreConfig::at(path).create_if_missing(false);
    Ok(Store::open(&config)?)
}
