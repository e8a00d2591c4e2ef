//! Splitting a desired count across clusters

use std::collections::BTreeMap;

use super::preferences::SchedulingPreferences;

#[derive(Debug)]
struct Slot<'a> {
    cluster: &'a str,
    weight: i64,
    max: Option<i64>,
    share: i64,
}

impl Slot<'_> {
    fn capacity(&self) -> Option<i64> {
        self.max.map(|max| (max - self.share).max(0))
    }

    fn is_open(&self) -> bool {
        self.weight > 0 && self.capacity() != Some(0)
    }
}

/// Split `total` across `clusters`.
///
/// Minimums are granted first, in cluster name order, as long as anything
/// is left. The rest is divided in proportion to weight with the largest
/// remainder method (ties go to the lower cluster name). Whatever a
/// cluster cannot take because of its maximum is divided again among the
/// others. Clusters matching no entry and no wildcard get nothing.
///
/// The shares never add up to more than `total`, and add up to exactly
/// `total` unless maximums or zero weights leave part of it unplaced.
pub fn plan(
    total: i64,
    preferences: &SchedulingPreferences,
    clusters: &[String],
) -> BTreeMap<String, i64> {
    let mut names: Vec<&str> = clusters.iter().map(String::as_str).collect();
    names.sort_unstable();
    names.dedup();

    let mut slots: Vec<Slot<'_>> = names
        .into_iter()
        .map(|cluster| match preferences.for_cluster(cluster) {
            Some(p) => Slot {
                cluster,
                weight: p.weight,
                max: p.max,
                share: 0,
            },
            None => Slot {
                cluster,
                weight: 0,
                max: Some(0),
                share: 0,
            },
        })
        .collect();

    let mut remaining = total.max(0);

    for slot in slots.iter_mut() {
        let min = preferences
            .for_cluster(slot.cluster)
            .map(|p| p.min)
            .unwrap_or(0);
        let grant = min.min(remaining).min(slot.capacity().unwrap_or(i64::MAX));
        slot.share += grant;
        remaining -= grant;
    }

    while remaining > 0 {
        let open: Vec<usize> = (0..slots.len()).filter(|&i| slots[i].is_open()).collect();
        if open.is_empty() {
            break;
        }

        // Weights go up to i64::MAX, so the products need the wider type
        let weights: i128 = open.iter().map(|&i| i128::from(slots[i].weight)).sum();
        let mut grants: Vec<(usize, i64, i128)> = open
            .iter()
            .map(|&i| {
                let scaled = i128::from(remaining) * i128::from(slots[i].weight);
                // Bounded by `remaining`
                let grant = (scaled / weights) as i64;
                (i, grant, scaled % weights)
            })
            .collect();

        let leftover = remaining - grants.iter().map(|(_, g, _)| g).sum::<i64>();
        // Slots are in name order and the sort is stable
        let mut by_remainder: Vec<usize> = (0..grants.len()).collect();
        by_remainder.sort_by(|&a, &b| grants[b].2.cmp(&grants[a].2));
        for &g in by_remainder.iter().take(leftover as usize) {
            grants[g].1 += 1;
        }

        for (i, grant, _) in grants {
            let grant = grant.min(slots[i].capacity().unwrap_or(i64::MAX));
            slots[i].share += grant;
            remaining -= grant;
        }
    }

    slots
        .into_iter()
        .map(|slot| (slot.cluster.to_string(), slot.share))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::preferences::ClusterPreferences;

    fn prefs(entries: &[(&str, i64, i64, Option<i64>)]) -> SchedulingPreferences {
        SchedulingPreferences {
            clusters: entries
                .iter()
                .map(|(name, weight, min, max)| {
                    (
                        name.to_string(),
                        ClusterPreferences {
                            weight: *weight,
                            min: *min,
                            max: *max,
                        },
                    )
                })
                .collect(),
        }
    }

    fn clusters(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_weighted_split() {
        let plan = plan(
            9,
            &prefs(&[("clusterA", 2, 0, None), ("clusterB", 1, 0, None)]),
            &clusters(&["clusterA", "clusterB"]),
        );
        assert_eq!(plan["clusterA"], 6);
        assert_eq!(plan["clusterB"], 3);
    }

    #[test]
    fn test_remainder_goes_to_largest_fraction() {
        // 10 * 1/3 = 3.33 each; one leftover goes to the first name
        let plan = plan(
            10,
            &prefs(&[("*", 1, 0, None)]),
            &clusters(&["c", "b", "a"]),
        );
        assert_eq!(plan["a"], 4);
        assert_eq!(plan["b"], 3);
        assert_eq!(plan["c"], 3);
    }

    #[test]
    fn test_sum_matches_total_without_clamps() {
        for total in 1..50 {
            let plan = plan(
                total,
                &prefs(&[("a", 3, 0, None), ("b", 5, 0, None), ("*", 2, 0, None)]),
                &clusters(&["a", "b", "c", "d"]),
            );
            assert_eq!(plan.values().sum::<i64>(), total);
            assert!(plan.values().all(|&s| s >= 0));
        }
    }

    #[test]
    fn test_max_overflow_is_redistributed() {
        let plan = plan(
            10,
            &prefs(&[("a", 5, 0, Some(2)), ("b", 1, 0, None)]),
            &clusters(&["a", "b"]),
        );
        assert_eq!(plan["a"], 2);
        assert_eq!(plan["b"], 8);
    }

    #[test]
    fn test_min_is_granted_first() {
        let plan = plan(
            5,
            &prefs(&[("a", 1, 0, None), ("b", 0, 3, None)]),
            &clusters(&["a", "b"]),
        );
        assert_eq!(plan["b"], 3);
        assert_eq!(plan["a"], 2);
    }

    #[test]
    fn test_mins_never_exceed_total() {
        let plan = plan(
            4,
            &prefs(&[("a", 1, 3, None), ("b", 1, 3, None)]),
            &clusters(&["a", "b"]),
        );
        assert_eq!(plan["a"], 3);
        assert_eq!(plan["b"], 1);
    }

    #[test]
    fn test_all_saturated_leaves_rest_unplaced() {
        let plan = plan(
            10,
            &prefs(&[("a", 1, 0, Some(2)), ("b", 1, 0, Some(3))]),
            &clusters(&["a", "b"]),
        );
        assert_eq!(plan["a"], 2);
        assert_eq!(plan["b"], 3);
    }

    #[test]
    fn test_cluster_without_entry_gets_nothing() {
        let plan = plan(
            6,
            &prefs(&[("a", 1, 0, None)]),
            &clusters(&["a", "b"]),
        );
        assert_eq!(plan["a"], 6);
        assert_eq!(plan["b"], 0);
    }

    #[test]
    fn test_shares_respect_clamps() {
        let p = prefs(&[("a", 4, 1, Some(5)), ("b", 1, 2, Some(3)), ("*", 1, 0, None)]);
        for total in 0..30 {
            let plan = plan(total, &p, &clusters(&["a", "b", "c"]));
            assert!(plan["a"] <= 5);
            assert!(plan["b"] <= 3);
            assert!(plan.values().sum::<i64>() <= total);
            if total >= 3 {
                assert!(plan["a"] >= 1);
                assert!(plan["b"] >= 2);
            }
        }
    }

    #[test]
    fn test_extreme_weights() {
        let plan_max = plan(
            9,
            &prefs(&[("a", i64::MAX, 0, None), ("b", 1, 0, None)]),
            &clusters(&["a", "b"]),
        );
        assert_eq!(plan_max["a"], 9);
        assert_eq!(plan_max["b"], 0);

        let plan_large = plan(
            1_000_000_000,
            &prefs(&[("a", 10_000_000_000, 0, None), ("b", 1, 0, None)]),
            &clusters(&["a", "b"]),
        );
        assert_eq!(plan_large.values().sum::<i64>(), 1_000_000_000);
        assert!(plan_large.values().all(|&s| s >= 0));
        assert_eq!(plan_large["a"], 1_000_000_000);
    }

    #[test]
    fn test_two_maximal_weights_split_evenly() {
        let plan = plan(
            i64::MAX,
            &prefs(&[("*", i64::MAX, 0, None)]),
            &clusters(&["a", "b"]),
        );
        assert_eq!(plan.values().sum::<i64>(), i64::MAX);
        assert_eq!(plan["a"], i64::MAX / 2 + 1);
        assert_eq!(plan["b"], i64::MAX / 2);
    }
}
