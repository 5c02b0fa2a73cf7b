//! Deterministic k-means over embedding vectors.
//!
//! Initialization is k-means++ with deterministic selection: the first
//! centroid is the first vector, each subsequent one the point farthest
//! from its nearest existing centroid. With a fixed input order the whole
//! procedure is reproducible.

const MAX_ITERATIONS: usize = 100;

fn euclidean_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn init_centroids(vectors: &[Vec<f32>], k: usize) -> Vec<Vec<f32>> {
    let n = vectors.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(vectors[0].clone());

    let mut min_distances = vec![f32::MAX; n];

    while centroids.len() < k {
        let last = centroids.last().unwrap();
        for (i, vector) in vectors.iter().enumerate() {
            let dist = euclidean_distance_squared(vector, last);
            if dist < min_distances[i] {
                min_distances[i] = dist;
            }
        }

        let total: f32 = min_distances.iter().sum();
        if total == 0.0 {
            // Every point coincides with a centroid; take the next vector
            // not already chosen.
            let next = vectors.iter().find(|v| {
                !centroids
                    .iter()
                    .any(|c| euclidean_distance_squared(c, v) < 1e-10)
            });
            match next {
                Some(v) => centroids.push(v.clone()),
                None => break,
            }
        } else {
            let max_idx = min_distances
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(i, _)| i)
                .unwrap_or(0);
            centroids.push(vectors[max_idx].clone());
        }
    }

    centroids
}

fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::MAX;
    for (i, centroid) in centroids.iter().enumerate() {
        let dist = euclidean_distance_squared(vector, centroid);
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    best
}

fn compute_centroids(
    vectors: &[Vec<f32>],
    assignments: &[usize],
    previous: &[Vec<f32>],
) -> Vec<Vec<f32>> {
    let k = previous.len();
    let dim = vectors[0].len();
    let mut sums = vec![vec![0.0f32; dim]; k];
    let mut counts = vec![0usize; k];

    for (vector, &cluster) in vectors.iter().zip(assignments) {
        counts[cluster] += 1;
        for (s, v) in sums[cluster].iter_mut().zip(vector) {
            *s += v;
        }
    }

    sums.into_iter()
        .zip(counts)
        .enumerate()
        .map(|(i, (mut sum, count))| {
            if count > 0 {
                for elem in sum.iter_mut() {
                    *elem /= count as f32;
                }
                sum
            } else {
                // An emptied cluster keeps its old centroid; its label
                // simply ends up unused.
                previous[i].clone()
            }
        })
        .collect()
}

/// Assign each vector to one of `k` clusters. All vectors must share one
/// dimension. Returns per-vector cluster labels in `0..k`; some labels may
/// be unused when a cluster empties out.
pub fn cluster(vectors: &[Vec<f32>], k: usize) -> Vec<usize> {
    assert!(!vectors.is_empty());
    let k = k.min(vectors.len()).max(1);

    let mut centroids = init_centroids(vectors, k);
    let mut assignments: Vec<usize> = vectors
        .iter()
        .map(|v| nearest_centroid(v, &centroids))
        .collect();

    for _ in 0..MAX_ITERATIONS {
        centroids = compute_centroids(vectors, &assignments, &centroids);
        let next: Vec<usize> = vectors
            .iter()
            .map(|v| nearest_centroid(v, &centroids))
            .collect();
        if next == assignments {
            break;
        }
        assignments = next;
    }

    assignments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> Vec<Vec<f32>> {
        vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.0, 0.1],
            vec![10.0, 10.0],
            vec![10.1, 10.0],
            vec![10.0, 10.1],
        ]
    }

    #[test]
    fn test_separates_obvious_clusters() {
        let assignments = cluster(&two_blobs(), 2);
        assert_eq!(assignments[0], assignments[1]);
        assert_eq!(assignments[1], assignments[2]);
        assert_eq!(assignments[3], assignments[4]);
        assert_eq!(assignments[4], assignments[5]);
        assert_ne!(assignments[0], assignments[3]);
    }

    #[test]
    fn test_deterministic_for_fixed_input() {
        let vectors = two_blobs();
        assert_eq!(cluster(&vectors, 2), cluster(&vectors, 2));
        assert_eq!(cluster(&vectors, 3), cluster(&vectors, 3));
    }

    #[test]
    fn test_k_clamped_to_point_count() {
        let vectors = vec![vec![1.0], vec![2.0]];
        let assignments = cluster(&vectors, 5);
        assert_eq!(assignments.len(), 2);
        assert!(assignments.iter().all(|&a| a < 2));
    }

    #[test]
    fn test_identical_points_stay_together() {
        let vectors = vec![vec![1.0, 1.0]; 4];
        let assignments = cluster(&vectors, 2);
        assert!(assignments.iter().all(|&a| a == assignments[0]));
    }
}
