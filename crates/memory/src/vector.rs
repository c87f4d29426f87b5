//! Vector similarity utilities.
//!
//! Pure-Rust implementations of:
//! - Cosine similarity
//! - Metadata-filtered ranking over stored records
//! - L2 normalisation

use banter_core::memory::{MemoryFragment, MemoryRecord, Metadata};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm < 1e-10 {
        return;
    }
    for x in v.iter_mut() {
        *x = (*x as f64 / norm) as f32;
    }
}

/// Every filter key must be present in `metadata` with an equal value.
pub fn matches_filter(metadata: &Metadata, filter: &Metadata) -> bool {
    filter
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}

/// Rank records by cosine similarity to a query embedding.
///
/// Returns fragments sorted by descending similarity, restricted to records
/// whose metadata matches `filter`. Ties keep insertion order.
pub fn vector_search(
    records: &[MemoryRecord],
    query: &[f32],
    top_k: usize,
    filter: &Metadata,
) -> Vec<MemoryFragment> {
    let mut scored: Vec<MemoryFragment> = records
        .iter()
        .filter(|r| matches_filter(&r.metadata, filter))
        .map(|r| MemoryFragment {
            id: r.id.clone(),
            text: r.text.clone(),
            score: cosine_similarity(&r.vector, query),
            metadata: r.metadata.clone(),
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, vector: Vec<f32>, group: &str) -> MemoryRecord {
        let mut metadata = Metadata::new();
        metadata.insert("group_id".into(), json!(group));
        MemoryRecord {
            id: id.into(),
            text: format!("Content for {id}"),
            vector,
            metadata,
        }
    }

    fn group_filter(group: &str) -> Metadata {
        let mut filter = Metadata::new();
        filter.insert("group_id".into(), json!(group));
        filter
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite_vectors() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((sim - (-1.0)).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn cosine_known_value() {
        // [1,1] · [1,0] = 1, |[1,1]| = sqrt(2), |[1,0]| = 1
        let sim = cosine_similarity(&[1.0, 1.0], &[1.0, 0.0]);
        assert!((sim - 0.7071).abs() < 0.001);
    }

    #[test]
    fn normalize_to_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn vector_search_ranks_by_similarity() {
        let query = vec![1.0, 0.0, 0.0];
        let records = vec![
            record("a", vec![0.0, 1.0, 0.0], "g1"), // orthogonal = 0
            record("b", vec![1.0, 0.0, 0.0], "g1"), // identical = 1
            record("c", vec![0.5, 0.5, 0.0], "g1"), // partial = ~0.707
        ];

        let results = vector_search(&records, &query, 10, &group_filter("g1"));
        let ids: Vec<_> = results.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);
    }

    #[test]
    fn vector_search_applies_filter() {
        let query = vec![1.0, 0.0];
        let records = vec![
            record("mine", vec![0.5, 0.5], "g1"),
            record("theirs", vec![1.0, 0.0], "g2"),
        ];

        let results = vector_search(&records, &query, 10, &group_filter("g1"));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "mine");
    }

    #[test]
    fn vector_search_respects_top_k() {
        let query = vec![1.0, 0.0];
        let records: Vec<_> = (0..10)
            .map(|i| record(&format!("e{i}"), vec![1.0, i as f32 * 0.1], "g"))
            .collect();

        let results = vector_search(&records, &query, 3, &Metadata::new());
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, "e0");
    }
}
