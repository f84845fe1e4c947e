use std::time::Duration;

use chrono::{DateTime, FixedOffset};

use crate::domain::{PhotoAsset, TimeCluster};

/// Partition a capture-time sorted asset list into bursts.
///
/// A new cluster starts when an asset falls on a different calendar day than the
/// cluster's anchor (its first dated member), or lies more than `gap` after it.
/// Undated assets join whatever cluster is open without moving the anchor.
/// Clusters with fewer than 2 members are dropped.
pub fn cluster_by_time(assets: &[PhotoAsset], gap: Duration) -> Vec<TimeCluster> {
    let gap = chrono::Duration::from_std(gap).unwrap_or(chrono::Duration::MAX);
    let mut clusters: Vec<TimeCluster> = Vec::new();
    let mut current: TimeCluster = Vec::new();
    let mut anchor: Option<DateTime<FixedOffset>> = None;

    for asset in assets {
        let Some(date) = asset.creation_date else {
            current.push(asset.clone());
            continue;
        };

        let starts_new = match anchor {
            Some(start) => date.date_naive() != start.date_naive() || date - start > gap,
            None => false,
        };

        if starts_new {
            close_cluster(&mut clusters, std::mem::take(&mut current));
            anchor = Some(date);
        } else if anchor.is_none() {
            anchor = Some(date);
        }
        current.push(asset.clone());
    }
    close_cluster(&mut clusters, current);

    clusters
}

fn close_cluster(clusters: &mut Vec<TimeCluster>, cluster: TimeCluster) {
    if cluster.len() >= 2 {
        clusters.push(cluster);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const GAP: Duration = Duration::from_secs(300);

    fn at(id: &str, day: u32, h: u32, m: u32, s: u32) -> PhotoAsset {
        let date = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 6, day, h, m, s)
            .unwrap();
        PhotoAsset::new(id, format!("test://{id}"), Some(date), 100, 100, Some(1000))
    }

    fn undated(id: &str) -> PhotoAsset {
        PhotoAsset::new(id, format!("test://{id}"), None, 100, 100, Some(1000))
    }

    fn ids(clusters: &[TimeCluster]) -> Vec<Vec<&str>> {
        clusters
            .iter()
            .map(|c| c.iter().map(|a| a.id.as_str()).collect())
            .collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(cluster_by_time(&[], GAP).is_empty());
    }

    #[test]
    fn test_single_burst_within_three_minutes() {
        let assets = vec![
            at("a", 1, 10, 0, 0),
            at("b", 1, 10, 0, 30),
            at("c", 1, 10, 1, 0),
            at("d", 1, 10, 2, 0),
            at("e", 1, 10, 3, 0),
        ];
        let clusters = cluster_by_time(&assets, GAP);
        assert_eq!(ids(&clusters), vec![vec!["a", "b", "c", "d", "e"]]);
    }

    #[test]
    fn test_gap_measured_from_anchor_not_previous() {
        // Each step is 2 minutes, but d is 6 minutes after the anchor a.
        let assets = vec![
            at("a", 1, 10, 0, 0),
            at("b", 1, 10, 2, 0),
            at("c", 1, 10, 4, 0),
            at("d", 1, 10, 6, 0),
            at("e", 1, 10, 8, 0),
        ];
        let clusters = cluster_by_time(&assets, GAP);
        assert_eq!(ids(&clusters), vec![vec!["a", "b", "c"], vec!["d", "e"]]);
    }

    #[test]
    fn test_exactly_five_minutes_stays_in_cluster() {
        let assets = vec![at("a", 1, 10, 0, 0), at("b", 1, 10, 5, 0), at("c", 1, 10, 5, 1)];
        let clusters = cluster_by_time(&assets, GAP);
        assert_eq!(ids(&clusters), vec![vec!["a", "b"]]);
    }

    #[test]
    fn test_singletons_dropped() {
        let assets = vec![
            at("a", 1, 8, 0, 0),
            at("b", 1, 9, 0, 0),
            at("c", 1, 9, 1, 0),
            at("d", 1, 12, 0, 0),
        ];
        let clusters = cluster_by_time(&assets, GAP);
        assert_eq!(ids(&clusters), vec![vec!["b", "c"]]);
        assert!(clusters.iter().all(|c| c.len() >= 2));
    }

    #[test]
    fn test_three_calendar_days_split() {
        let mut assets = Vec::new();
        for (i, day) in [1, 1, 1, 1, 2, 2, 2, 3, 3, 3].iter().enumerate() {
            assets.push(at(&format!("p{i}"), *day, 23, 58, i as u32));
        }
        let clusters = cluster_by_time(&assets, GAP);
        assert!(clusters.len() <= 3);
        for cluster in &clusters {
            let day = cluster[0].creation_date.unwrap().date_naive();
            assert!(cluster
                .iter()
                .all(|a| a.creation_date.unwrap().date_naive() == day));
        }
        assert_eq!(
            clusters.iter().map(|c| c.len()).collect::<Vec<_>>(),
            vec![4, 3, 3]
        );
    }

    #[test]
    fn test_midnight_boundary_splits_even_within_gap() {
        let assets = vec![
            at("a", 1, 23, 59, 0),
            at("b", 1, 23, 59, 30),
            at("c", 2, 0, 0, 10),
            at("d", 2, 0, 0, 20),
        ];
        let clusters = cluster_by_time(&assets, GAP);
        assert_eq!(ids(&clusters), vec![vec!["a", "b"], vec!["c", "d"]]);
    }

    #[test]
    fn test_undated_assets_join_open_cluster() {
        let assets = vec![at("a", 1, 10, 0, 0), undated("x"), at("b", 1, 10, 1, 0)];
        let clusters = cluster_by_time(&assets, GAP);
        assert_eq!(ids(&clusters), vec![vec!["a", "x", "b"]]);
    }

    #[test]
    fn test_undated_assets_before_any_date_form_cluster() {
        let assets = vec![undated("x"), undated("y"), at("a", 1, 10, 0, 0), at("b", 1, 10, 1, 0)];
        let clusters = cluster_by_time(&assets, GAP);
        assert_eq!(ids(&clusters), vec![vec!["x", "y", "a", "b"]]);
    }

    #[test]
    fn test_deterministic() {
        let assets: Vec<PhotoAsset> = (0..40)
            .map(|i| at(&format!("p{i}"), 1 + i / 15, 10, (i * 2) % 60, 0))
            .collect();
        let first = cluster_by_time(&assets, GAP);
        let second = cluster_by_time(&assets, GAP);
        assert_eq!(first, second);
    }
}
