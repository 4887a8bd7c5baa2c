//! Density-based clustering over embedding vectors.
//!
//! Classic DBSCAN with a euclidean metric: cluster count is discovered, not
//! chosen, and sparse points come back as outliers (`None`) rather than
//! being forced into a cluster.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Outlier,
    Cluster(usize),
}

/// Assign a cluster label to every point, `None` marking outliers.
///
/// A point is a core point when at least `min_points` points (itself
/// included) sit within `eps`; clusters grow from core points through
/// density-reachable neighbors.
pub fn dbscan(points: &[Vec<f32>], eps: f32, min_points: usize) -> Vec<Option<usize>> {
    let n = points.len();
    let mut marks = vec![Mark::Unvisited; n];
    let mut next_cluster = 0;

    for i in 0..n {
        if marks[i] != Mark::Unvisited {
            continue;
        }

        let neighbors = region_query(points, i, eps);
        if neighbors.len() < min_points {
            marks[i] = Mark::Outlier;
            continue;
        }

        let cluster = next_cluster;
        next_cluster += 1;
        marks[i] = Mark::Cluster(cluster);

        let mut frontier: VecDeque<usize> = neighbors.into_iter().filter(|&j| j != i).collect();
        while let Some(j) = frontier.pop_front() {
            if marks[j] == Mark::Outlier {
                // Border point: density-reachable but not core.
                marks[j] = Mark::Cluster(cluster);
                continue;
            }
            if marks[j] != Mark::Unvisited {
                continue;
            }
            marks[j] = Mark::Cluster(cluster);

            let reachable = region_query(points, j, eps);
            if reachable.len() >= min_points {
                frontier.extend(
                    reachable
                        .into_iter()
                        .filter(|&k| matches!(marks[k], Mark::Unvisited | Mark::Outlier)),
                );
            }
        }
    }

    marks
        .into_iter()
        .map(|mark| match mark {
            Mark::Cluster(label) => Some(label),
            Mark::Outlier => None,
            Mark::Unvisited => unreachable!("every point is visited"),
        })
        .collect()
}

fn region_query(points: &[Vec<f32>], center: usize, eps: f32) -> Vec<usize> {
    (0..points.len())
        .filter(|&j| euclidean(&points[center], &points[j]) <= eps)
        .collect()
}

pub fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f32, y: f32) -> Vec<f32> {
        vec![x, y]
    }

    #[test]
    fn two_blobs_and_a_straggler() {
        let mut points = Vec::new();
        for i in 0..5 {
            points.push(point(0.0, i as f32 * 0.01));
        }
        for i in 0..4 {
            points.push(point(10.0, i as f32 * 0.01));
        }
        points.push(point(100.0, 100.0));

        let labels = dbscan(&points, 0.5, 2);

        let first = labels[0].expect("blob member must be clustered");
        assert!(labels[..5].iter().all(|l| *l == Some(first)));

        let second = labels[5].expect("blob member must be clustered");
        assert_ne!(first, second);
        assert!(labels[5..9].iter().all(|l| *l == Some(second)));

        assert_eq!(labels[9], None, "isolated point must be an outlier");
    }

    #[test]
    fn groups_below_min_points_become_outliers() {
        let points = vec![point(0.0, 0.0), point(0.0, 0.1), point(5.0, 5.0)];
        let labels = dbscan(&points, 0.5, 3);
        assert!(labels.iter().all(|l| l.is_none()));
    }

    #[test]
    fn border_points_join_the_cluster_of_their_core() {
        // A chain where the ends are border points of the dense middle.
        let points = vec![
            point(0.0, 0.0),
            point(0.4, 0.0),
            point(0.8, 0.0),
            point(1.2, 0.0),
        ];
        let labels = dbscan(&points, 0.5, 3);
        let cluster = labels[1].expect("middle of the chain is core");
        assert!(labels.iter().all(|l| *l == Some(cluster)));
    }

    #[test]
    fn empty_input_yields_no_labels() {
        assert!(dbscan(&[], 0.5, 2).is_empty());
    }
}
