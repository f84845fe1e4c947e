use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use photosift_core::{NoopSink, SimilarGroup};

use super::{format_size, Session};

pub fn run(session: &Session, root: &Path) -> Result<()> {
    let scanner = session.open(root, Arc::new(NoopSink))?;
    let access = scanner.request_permission();
    let total = scanner.total_asset_count()?;
    let checkpoint = scanner.checkpoint();
    let saved = scanner.saved_groups();
    let reclaimable: u64 = saved.iter().map(SimilarGroup::reclaimable_bytes).sum();

    if session.json {
        let status = serde_json::json!({
            "authorization": access,
            "totalAssets": total,
            "hasPartialScan": scanner.has_partial_scan(),
            "checkpoint": checkpoint,
            "savedGroups": saved.len(),
            "reclaimableBytes": reclaimable,
        });
        println!("{status}");
        return Ok(());
    }

    let resume = match &checkpoint {
        Some(c) => format!("{} of {} photos grouped", c.current, c.total),
        None => "none".to_string(),
    };

    println!();
    println!("  Photosift Status");
    println!("  ================");
    println!();
    println!("   Library:      {}", root.display());
    println!("   Access:       {access}");
    println!("   Photos:       {total:>8}");
    println!("   Checkpoint:   {resume}");
    println!(
        "   Saved groups: {:>8}        Reclaimable: {}",
        saved.len(),
        format_size(reclaimable)
    );
    println!("   Cache:        {}", session.cache_dir.display());
    println!();
    if scanner.has_partial_scan() {
        println!("  Run 'photosift resume --library {}' to continue.", root.display());
        println!();
    }

    Ok(())
}
