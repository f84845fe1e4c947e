use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use photosift_core::NoopSink;
use tracing::{info, warn};

use super::{format_size, Session};

pub fn run(session: &Session, root: &Path, ids: &[String]) -> Result<()> {
    let scanner = session.open(root, Arc::new(NoopSink))?;
    let result = scanner.delete_assets(ids);

    if session.json {
        println!("{}", serde_json::to_string(&result)?);
    }
    if !result.success {
        warn!(requested = ids.len(), error = ?result.error, "delete failed");
        bail!(
            "nothing deleted: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    info!(deleted = result.deleted_count, freed = result.freed_bytes, "delete finished");
    if !session.json {
        println!(
            "Deleted {} photos, freed {}.",
            result.deleted_count,
            format_size(result.freed_bytes)
        );
    }
    Ok(())
}
