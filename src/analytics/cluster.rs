use serde::Serialize;

use super::stats::{is_negligible, mean, population_std};

/// Upper bound on assignment/update rounds.
pub const MAX_ITERATIONS: usize = 100;

/// One k-means cluster described in the original (unscaled) units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterProfile {
    pub size: usize,
    /// Per-column means of the member rows; empty for an empty cluster.
    pub mean_values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clustering {
    pub assignments: Vec<usize>,
    pub clusters: Vec<ClusterProfile>,
    pub iterations: usize,
}

/// Runs k-means over z-score standardised rows.
///
/// Centroids start on `k` evenly spaced rows so repeated runs agree. Returns
/// `None` when there are fewer rows than clusters or the rows are ragged.
pub fn kmeans(rows: &[Vec<f64>], k: usize) -> Option<Clustering> {
    if k == 0 || rows.len() < k {
        return None;
    }
    let width = rows[0].len();
    if width == 0 || rows.iter().any(|row| row.len() != width) {
        return None;
    }

    let scaled = standardise(rows, width);
    let mut centroids: Vec<Vec<f64>> = (0..k)
        .map(|cluster| scaled[cluster * rows.len() / k].clone())
        .collect();
    let mut assignments = vec![usize::MAX; rows.len()];
    let mut iterations = 0;

    while iterations < MAX_ITERATIONS {
        iterations += 1;
        let mut changed = false;
        for (row, assignment) in scaled.iter().zip(assignments.iter_mut()) {
            let nearest = nearest_centroid(row, &centroids);
            if nearest != *assignment {
                *assignment = nearest;
                changed = true;
            }
        }
        if !changed {
            break;
        }
        for (cluster, centroid) in centroids.iter_mut().enumerate() {
            if let Some(updated) = member_means(&scaled, &assignments, cluster, width) {
                *centroid = updated;
            }
        }
    }

    let clusters = (0..k)
        .map(|cluster| ClusterProfile {
            size: assignments.iter().filter(|a| **a == cluster).count(),
            mean_values: member_means(rows, &assignments, cluster, width).unwrap_or_default(),
        })
        .collect();

    Some(Clustering {
        assignments,
        clusters,
        iterations,
    })
}

fn standardise(rows: &[Vec<f64>], width: usize) -> Vec<Vec<f64>> {
    let scales: Vec<(f64, f64)> = (0..width)
        .map(|col| {
            let column: Vec<f64> = rows.iter().map(|row| row[col]).collect();
            let mean = mean(&column).unwrap_or(0.0);
            let std = population_std(&column).unwrap_or(0.0);
            (mean, std)
        })
        .collect();

    rows.iter()
        .map(|row| {
            row.iter()
                .zip(&scales)
                .map(|(value, (mean, std))| {
                    if is_negligible(*std) {
                        0.0
                    } else {
                        (value - mean) / std
                    }
                })
                .collect()
        })
        .collect()
}

fn nearest_centroid(row: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (index, centroid) in centroids.iter().enumerate() {
        let distance: f64 = row.iter().zip(centroid).map(|(a, b)| (a - b).powi(2)).sum();
        if distance < best_distance {
            best = index;
            best_distance = distance;
        }
    }
    best
}

fn member_means(
    rows: &[Vec<f64>],
    assignments: &[usize],
    cluster: usize,
    width: usize,
) -> Option<Vec<f64>> {
    let members: Vec<&Vec<f64>> = rows
        .iter()
        .zip(assignments)
        .filter(|(_, assigned)| **assigned == cluster)
        .map(|(row, _)| row)
        .collect();
    if members.is_empty() {
        return None;
    }
    let count = members.len() as f64;
    Some(
        (0..width)
            .map(|col| members.iter().map(|row| row[col]).sum::<f64>() / count)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separated_groups_are_recovered() {
        let mut rows = Vec::new();
        for offset in [0.0, 50.0, 100.0] {
            for step in 0..5 {
                rows.push(vec![offset + step as f64 * 0.1, offset * 2.0 + step as f64 * 0.1]);
            }
        }

        let clustering = kmeans(&rows, 3).expect("clustering");
        let sizes: Vec<usize> = clustering.clusters.iter().map(|c| c.size).collect();
        assert_eq!(sizes, vec![5, 5, 5]);
        assert_eq!(clustering.assignments[0..5], [0; 5]);
        assert_eq!(clustering.assignments[10..15], [2; 5]);
        assert!((clustering.clusters[1].mean_values[0] - 50.2).abs() < 1e-9);
    }

    #[test]
    fn too_few_rows_yield_nothing() {
        assert_eq!(kmeans(&[vec![1.0], vec![2.0]], 3), None);
        assert_eq!(kmeans(&[vec![1.0], vec![2.0, 3.0], vec![4.0]], 1), None);
    }

    #[test]
    fn result_is_deterministic() {
        let rows: Vec<Vec<f64>> = (0..20)
            .map(|i| vec![(i * 7 % 11) as f64, (i * 3 % 5) as f64])
            .collect();
        assert_eq!(kmeans(&rows, 3), kmeans(&rows, 3));
    }
}
