use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use photosift_core::{RunOutcome, ScanEvent, ScanPhase, Scanner};
use tracing::info;

use super::{groups, Session};

pub fn start(session: &Session, root: &Path, threshold: f32, pause_at: Option<f64>, keep: bool) -> Result<()> {
    drive(session, root, threshold, pause_at, keep, false)
}

pub fn resume(session: &Session, root: &Path, threshold: f32, keep: bool) -> Result<()> {
    drive(session, root, threshold, None, keep, true)
}

fn progress_bar(json: bool) -> ProgressBar {
    if json {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );
    pb
}

/// Render one engine event. Returns true when the grouping phase has reached
/// `pause_at`.
fn render(pb: &ProgressBar, json: bool, pause_at: Option<f64>, event: &ScanEvent) -> bool {
    if json {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
    }
    match event {
        ScanEvent::Progress(progress) => {
            pb.set_position(progress.percent as u64);
            pb.set_message(progress.phase_label.clone());
            return pause_at.is_some_and(|at| {
                progress.phase == ScanPhase::Grouping && progress.percent >= at
            });
        }
        ScanEvent::GroupFound(group) => pb.println(format!(
            "  found {} similar photos ({:.0}% match)",
            group.assets.len(),
            group.max_similarity * 100.0
        )),
        ScanEvent::ThermalWarning { level } => pb.println(format!("  thermal state: {level}")),
        ScanEvent::ScanPaused(_) | ScanEvent::ScanCompleted { .. } => {}
    }
    false
}

fn drive(
    session: &Session,
    root: &Path,
    threshold: f32,
    pause_at: Option<f64>,
    keep: bool,
    resume: bool,
) -> Result<()> {
    let pb = progress_bar(session.json);
    let handle: Arc<OnceLock<Scanner>> = Arc::new(OnceLock::new());
    let pause_sent = AtomicBool::new(false);
    let sink = {
        let pb = pb.clone();
        let handle = Arc::clone(&handle);
        let json = session.json;
        move |event: ScanEvent| {
            if render(&pb, json, pause_at, &event) && !pause_sent.swap(true, Ordering::SeqCst) {
                if let Some(scanner) = handle.get() {
                    info!(at = ?pause_at, "pausing scan");
                    scanner.pause_scan();
                }
            }
        }
    };

    let scanner = session.open(root, Arc::new(sink))?;
    let _ = handle.set(scanner.clone());

    let access = scanner.request_permission();
    if !access.can_scan() {
        bail!("photo library access {access}: cannot read {}", root.display());
    }

    let outcome = if resume {
        scanner.resume_scan(threshold)?
    } else {
        scanner.start_scan(threshold)?
    };

    match outcome {
        RunOutcome::Completed { total_groups } => {
            pb.finish_with_message(format!("{total_groups} groups"));
            if keep {
                scanner.save_current_state()?;
            }
            if !session.json {
                groups::print_groups(&scanner.found_groups());
            }
        }
        RunOutcome::Interrupted => {
            info!(groups = scanner.found_groups().len(), "scan paused");
            pb.abandon_with_message("paused");
            if !session.json {
                println!(
                    "Scan paused with {} groups so far. Run `photosift resume --library {}` to continue.",
                    scanner.found_groups().len(),
                    root.display()
                );
            }
        }
    }

    Ok(())
}
