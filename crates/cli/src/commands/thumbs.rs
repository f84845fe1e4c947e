use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use photosift_core::NoopSink;

use super::Session;

pub fn thumbnails(session: &Session, root: &Path, ids: &[String], size: u32) -> Result<()> {
    let scanner = session.open(root, Arc::new(NoopSink))?;
    let exported = scanner.thumbnails(ids, size, size);

    if session.json {
        println!("{}", serde_json::to_string(&exported)?);
        return Ok(());
    }
    for id in ids {
        match exported.get(id) {
            Some(path) => println!("{id}\t{}", path.display()),
            None => println!("{id}\tunavailable"),
        }
    }
    Ok(())
}

pub fn preview(session: &Session, root: &Path, id: &str) -> Result<()> {
    let scanner = session.open(root, Arc::new(NoopSink))?;
    let path = scanner
        .preview(id)
        .ok_or_else(|| anyhow!("no preview available for {id}"))?;

    if session.json {
        println!("{}", serde_json::json!({ "id": id, "path": path }));
    } else {
        println!("{}", path.display());
    }
    Ok(())
}
