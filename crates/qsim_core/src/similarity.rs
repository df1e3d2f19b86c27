use rayon::prelude::*;

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, na, nb) = a
        .iter()
        .zip(b.iter())
        .fold((0.0f32, 0.0f32, 0.0f32), |(d, aa, bb), (x, y)| {
            (d + (x * y), aa + (x * x), bb + (y * y))
        });

    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

/// Dense pairwise cosine similarities, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    n: usize,
    values: Vec<f32>,
}

impl SimilarityMatrix {
    /// Only the upper triangle is computed; the lower one is mirrored so
    /// `get(i, j) == get(j, i)` holds bit for bit.
    pub fn compute(embeddings: &[Vec<f32>]) -> Self {
        let n = embeddings.len();
        let rows: Vec<Vec<f32>> = (0..n)
            .into_par_iter()
            .map(|i| {
                (i..n)
                    .map(|j| cosine_similarity(&embeddings[i], &embeddings[j]))
                    .collect()
            })
            .collect();

        let mut values = vec![0.0f32; n * n];
        for (i, row) in rows.into_iter().enumerate() {
            for (offset, sim) in row.into_iter().enumerate() {
                let j = i + offset;
                values[i * n + j] = sim;
                values[j * n + i] = sim;
            }
        }

        Self { n, values }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.values[i * self.n + j]
    }

    /// Every `j != i` with similarity at or above `threshold`, ascending.
    pub fn neighbours(&self, i: usize, threshold: f32) -> impl Iterator<Item = usize> + '_ {
        (0..self.n).filter(move |&j| j != i && self.get(i, j) >= threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_works_for_unit_vectors() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];

        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&a, &c) - 0.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_is_zero_for_degenerate_input() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn cosine_handles_opposite_vectors() {
        assert!((cosine_similarity(&[1.0, 1.0], &[-2.0, -2.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn matrix_is_symmetric() {
        let embeddings = vec![
            vec![0.3, 0.1, 0.9],
            vec![0.2, 0.8, 0.1],
            vec![0.5, 0.5, 0.5],
            vec![0.9, 0.0, 0.2],
        ];
        let m = SimilarityMatrix::compute(&embeddings);

        assert_eq!(m.len(), 4);
        for i in 0..4 {
            assert!((m.get(i, i) - 1.0).abs() < 1e-6);
            for j in 0..4 {
                assert_eq!(m.get(i, j), m.get(j, i));
                assert_eq!(
                    m.get(i, j),
                    cosine_similarity(&embeddings[i.min(j)], &embeddings[i.max(j)])
                );
            }
        }
    }

    #[test]
    fn neighbours_exclude_self_and_respect_threshold() {
        let m = SimilarityMatrix::compute(&[vec![1.0, 0.0], vec![0.9, 0.1], vec![0.0, 1.0]]);
        assert_eq!(m.neighbours(0, 0.8).collect::<Vec<_>>(), vec![1]);
        assert_eq!(m.neighbours(2, 0.8).count(), 0);
        assert_eq!(m.neighbours(2, 0.0).collect::<Vec<_>>(), vec![0, 1]);
    }
}
