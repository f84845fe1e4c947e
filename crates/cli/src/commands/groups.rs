use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use photosift_core::{NoopSink, SimilarGroup, SimilarityLevel};
use tracing::warn;

use super::{format_size, Session};

pub fn run(session: &Session, root: &Path, regroup: Option<f32>) -> Result<()> {
    let scanner = session.open(root, Arc::new(NoopSink))?;

    let groups = match regroup {
        Some(threshold) => {
            // The rescan below starts fresh and would drop the saved checkpoint.
            if scanner.has_partial_scan() {
                warn!(cache = %session.cache_dir.display(), "refusing to regroup over saved scan state");
                bail!(
                    "a saved scan exists in {}; finish it with `photosift resume` or discard it with `photosift clear-cache` before regrouping",
                    session.cache_dir.display()
                );
            }
            // Regrouping replays the bursts of a run in this process; the
            // fingerprint cache keeps the rescan cheap.
            scanner.start_scan(SimilarityLevel::default().threshold())?;
            scanner.regroup(threshold)?
        }
        None => scanner.saved_groups(),
    };

    if session.json {
        println!("{}", serde_json::to_string(&groups)?);
        return Ok(());
    }

    if groups.is_empty() {
        match regroup {
            Some(threshold) => println!("No similar photos at threshold {threshold}."),
            None => println!("No saved groups. Run `photosift scan --keep` or pause a scan first."),
        }
        return Ok(());
    }

    print_groups(&groups);
    Ok(())
}

pub(crate) fn groups_table(groups: &[SimilarGroup]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#"),
        Cell::new("Photos"),
        Cell::new("Match"),
        Cell::new("Reclaimable"),
        Cell::new("Members"),
    ]);

    for (index, group) in groups.iter().enumerate() {
        let members: Vec<String> = group
            .assets
            .iter()
            .map(|asset| {
                if group.keep_asset_ids.contains(&asset.id) {
                    format!("{} (keep)", asset.id)
                } else {
                    asset.id.clone()
                }
            })
            .collect();
        table.add_row(vec![
            Cell::new(index + 1),
            Cell::new(group.assets.len()),
            Cell::new(format!("{:.0}%", group.max_similarity * 100.0)).fg(Color::Green),
            Cell::new(format_size(group.reclaimable_bytes())),
            Cell::new(members.join("\n")),
        ]);
    }
    table
}

pub(crate) fn print_groups(groups: &[SimilarGroup]) {
    if groups.is_empty() {
        return;
    }
    let reclaimable: u64 = groups.iter().map(SimilarGroup::reclaimable_bytes).sum();
    println!();
    println!("  Similar photos");
    println!("  --------------");
    println!("{}", groups_table(groups));
    println!(
        "  {} groups, up to {} reclaimable",
        groups.len(),
        format_size(reclaimable)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use photosift_core::{PhotoAsset, ProgressCheckpoint, ScannerConfig};

    fn group(ids: &[&str]) -> SimilarGroup {
        SimilarGroup::new(
            ids.iter()
                .map(|id| PhotoAsset::new(*id, format!("file:///{id}"), None, 10, 10, Some(2048)))
                .collect(),
            0.91,
        )
    }

    #[test]
    fn test_table_has_row_per_group() {
        let table = groups_table(&[group(&["a.jpg", "b.jpg"]), group(&["c.jpg", "d.jpg", "e.jpg"])]);
        assert_eq!(table.row_iter().count(), 2);
        let rendered = table.to_string();
        assert!(rendered.contains("91%"));
        assert!(rendered.contains("e.jpg"));
    }

    #[test]
    fn test_keep_marks_are_shown() {
        let mut g = group(&["a.jpg", "b.jpg"]);
        g.keep_asset_ids.insert("b.jpg".to_string());
        let rendered = groups_table(&[g]).to_string();
        assert!(rendered.contains("b.jpg (keep)"));
        assert!(!rendered.contains("a.jpg (keep)"));
    }

    fn session(cache: &Path) -> Session {
        Session {
            cache_dir: cache.to_path_buf(),
            json: true,
        }
    }

    #[test]
    fn test_regroup_keeps_paused_scan() {
        let photos = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();

        let config = ScannerConfig::with_cache_dir(cache.path());
        let checkpoint = serde_json::to_vec(&ProgressCheckpoint::grouping(1, 2)).unwrap();
        std::fs::write(config.progress_path(), &checkpoint).unwrap();

        let err = run(&session(cache.path()), photos.path(), Some(0.42)).unwrap_err();
        assert!(err.to_string().contains("photosift resume"));
        assert_eq!(std::fs::read(config.progress_path()).unwrap(), checkpoint);
    }

    #[test]
    fn test_saved_groups_listed_without_rescan() {
        let photos = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();

        let config = ScannerConfig::with_cache_dir(cache.path());
        let saved = serde_json::to_vec(&[group(&["a.png", "b.png"])]).unwrap();
        std::fs::write(config.found_groups_path(), &saved).unwrap();

        run(&session(cache.path()), photos.path(), None).unwrap();
        assert_eq!(std::fs::read(config.found_groups_path()).unwrap(), saved);
    }
}
