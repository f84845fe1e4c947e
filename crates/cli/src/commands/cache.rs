use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use photosift_core::NoopSink;

use super::Session;

pub fn clear(session: &Session, root: &Path) -> Result<()> {
    let scanner = session.open(root, Arc::new(NoopSink))?;
    scanner.clear_cache()?;
    if !session.json {
        println!("Cleared cache in {}.", session.cache_dir.display());
    }
    Ok(())
}
