use std::collections::HashMap;

use crate::domain::{FeaturePrint, PhotoAsset, SimilarGroup};

/// Disjoint-set forest over indices `0..n`.
pub struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    /// Root of `x`, compressing the path on the way back.
    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Merge the sets of `a` and `b`. Returns false if they were already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        self.parent[ra] = rb;
        true
    }
}

/// Connected components of a cluster under "distance < threshold".
///
/// `prints[i]` belongs to `cluster[i]`; members without a print (or with a print of
/// another dimension) join nothing. Components of size 1 are dropped. Groups come
/// out in order of their first member, members in cluster order.
pub fn group_by_similarity(
    cluster: &[PhotoAsset],
    prints: &[Option<FeaturePrint>],
    threshold: f32,
) -> Vec<SimilarGroup> {
    let n = cluster.len().min(prints.len());
    if n < 2 {
        return Vec::new();
    }

    let mut sets = UnionFind::new(n);
    let mut edges: Vec<(usize, f32)> = Vec::new();
    for i in 0..n {
        let Some(a) = &prints[i] else { continue };
        for j in (i + 1)..n {
            let Some(b) = &prints[j] else { continue };
            if let Some(d) = a.distance(b) {
                if d < threshold {
                    sets.union(i, j);
                    edges.push((i, d));
                }
            }
        }
    }

    // Closest pair per component.
    let mut closest: HashMap<usize, f32> = HashMap::new();
    for (i, d) in edges {
        let root = sets.find(i);
        let entry = closest.entry(root).or_insert(d);
        if d < *entry {
            *entry = d;
        }
    }

    let mut order: Vec<usize> = Vec::new();
    let mut members: HashMap<usize, Vec<PhotoAsset>> = HashMap::new();
    for (i, asset) in cluster.iter().enumerate().take(n) {
        let root = sets.find(i);
        members
            .entry(root)
            .or_insert_with(|| {
                order.push(root);
                Vec::new()
            })
            .push(asset.clone());
    }

    order
        .into_iter()
        .filter_map(|root| {
            let assets = members.remove(&root)?;
            if assets.len() < 2 {
                return None;
            }
            let min_distance = closest.get(&root).copied().unwrap_or(0.0);
            Some(SimilarGroup::new(assets, similarity(min_distance)))
        })
        .collect()
}

/// `1 - d_min`, clamped to [0, 1].
pub fn similarity(min_distance: f32) -> f64 {
    (1.0 - min_distance as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(id: &str) -> PhotoAsset {
        PhotoAsset::new(id, format!("test://{id}"), None, 100, 100, Some(1000))
    }

    fn print(x: f32, y: f32) -> Option<FeaturePrint> {
        Some(FeaturePrint::new(vec![x, y]))
    }

    fn ids(groups: &[SimilarGroup]) -> Vec<Vec<&str>> {
        groups.iter().map(|g| g.asset_ids()).collect()
    }

    #[test]
    fn test_union_find_basics() {
        let mut sets = UnionFind::new(5);
        assert!(sets.union(0, 1));
        assert!(sets.union(1, 2));
        assert!(!sets.union(0, 2));
        assert_eq!(sets.find(0), sets.find(2));
        assert_ne!(sets.find(0), sets.find(3));
    }

    #[test]
    fn test_union_find_long_chain() {
        let n = 100_000;
        let mut sets = UnionFind::new(n);
        for i in 1..n {
            sets.union(i - 1, i);
        }
        let root = sets.find(0);
        assert_eq!(sets.find(n - 1), root);
    }

    #[test]
    fn test_two_groups_in_one_cluster() {
        // A-B 0.10, B-C 0.25, D-E 0.05, everything else far apart.
        let cluster: Vec<_> = ["A", "B", "C", "D", "E"].iter().map(|id| asset(id)).collect();
        let prints = vec![
            print(0.0, 0.0),
            print(0.10, 0.0),
            print(0.35, 0.0),
            print(5.0, 5.0),
            print(5.05, 5.0),
        ];
        let groups = group_by_similarity(&cluster, &prints, 0.32);
        assert_eq!(ids(&groups), vec![vec!["A", "B", "C"], vec!["D", "E"]]);
        assert!((groups[0].max_similarity - 0.90).abs() < 1e-5);
        assert!((groups[1].max_similarity - 0.95).abs() < 1e-5);
        assert!(groups.iter().all(|g| g.keep_asset_ids.is_empty()));
    }

    #[test]
    fn test_transitive_chain_joins_far_endpoints() {
        // Consecutive steps of 0.2; A and D are 0.6 apart but still grouped.
        let cluster: Vec<_> = ["A", "B", "C", "D"].iter().map(|id| asset(id)).collect();
        let prints = vec![print(0.0, 0.0), print(0.2, 0.0), print(0.4, 0.0), print(0.6, 0.0)];
        let groups = group_by_similarity(&cluster, &prints, 0.22);
        assert_eq!(ids(&groups), vec![vec!["A", "B", "C", "D"]]);
    }

    #[test]
    fn test_threshold_is_strict() {
        let cluster = vec![asset("a"), asset("b")];
        let prints = vec![print(0.0, 0.0), print(0.5, 0.0)];
        assert!(group_by_similarity(&cluster, &prints, 0.5).is_empty());
        assert_eq!(group_by_similarity(&cluster, &prints, 0.51).len(), 1);
    }

    #[test]
    fn test_threshold_monotonic() {
        use std::collections::HashSet;

        let cluster: Vec<_> = (0..6).map(|i| asset(&format!("p{i}"))).collect();
        let prints: Vec<_> = [0.0, 0.15, 0.5, 0.58, 1.5, 1.9]
            .iter()
            .map(|x| print(*x, 0.0))
            .collect();
        let sets = |t: f32| -> Vec<HashSet<String>> {
            group_by_similarity(&cluster, &prints, t)
                .iter()
                .map(|g| g.asset_ids().into_iter().map(str::to_string).collect())
                .collect()
        };

        let thresholds = [0.22, 0.32, 0.42, 1.0];
        for pair in thresholds.windows(2) {
            let (tight, loose) = (sets(pair[0]), sets(pair[1]));
            for group in &tight {
                assert!(
                    loose.iter().any(|wider| group.is_subset(wider)),
                    "group {group:?} at {} split at {}",
                    pair[0],
                    pair[1]
                );
            }
        }
        assert_eq!(sets(0.22).len(), 2);
        assert_eq!(sets(1.0).len(), 1);
    }

    #[test]
    fn test_missing_prints_are_skipped() {
        let cluster = vec![asset("a"), asset("b"), asset("c")];
        let prints = vec![print(0.0, 0.0), None, print(0.01, 0.0)];
        let groups = group_by_similarity(&cluster, &prints, 0.32);
        assert_eq!(ids(&groups), vec![vec!["a", "c"]]);
    }

    #[test]
    fn test_mismatched_dimensions_never_join() {
        let cluster = vec![asset("a"), asset("b")];
        let prints = vec![print(0.0, 0.0), Some(FeaturePrint::new(vec![0.0, 0.0, 0.0]))];
        assert!(group_by_similarity(&cluster, &prints, 10.0).is_empty());
    }

    #[test]
    fn test_groups_are_disjoint_with_unique_ids() {
        let cluster: Vec<_> = (0..8).map(|i| asset(&format!("p{i}"))).collect();
        let prints: Vec<_> = (0..8).map(|i| print((i / 2) as f32 * 10.0, 0.0)).collect();
        let groups = group_by_similarity(&cluster, &prints, 0.32);
        assert_eq!(groups.len(), 4);
        let mut seen = std::collections::HashSet::new();
        for group in &groups {
            assert!(group.assets.len() >= 2);
            for id in group.asset_ids() {
                assert!(seen.insert(id));
            }
        }
        let group_ids: std::collections::HashSet<_> = groups.iter().map(|g| &g.id).collect();
        assert_eq!(group_ids.len(), groups.len());
    }

    #[test]
    fn test_similarity_clamped() {
        assert_eq!(similarity(0.0), 1.0);
        assert_eq!(similarity(1.5), 0.0);
        assert!((similarity(0.25) - 0.75).abs() < 1e-9);
    }
}
