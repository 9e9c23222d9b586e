//! Scoring and rank fusion for the in-memory index.
//!
//! Pure functions over document positions:
//! - Keyword scoring (term frequency, length-normalised)
//! - Cosine similarity for vector clauses
//! - Reciprocal Rank Fusion (RRF) for hybrid queries

use std::collections::HashMap;

/// A document position in the index with its score for one ranking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub doc: usize,
    pub score: f32,
}

/// Standard RRF constant.
pub const RRF_K: f32 = 60.0;

/// Lowercased alphanumeric terms of a text.
pub fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Keyword relevance of `content` for the query terms.
///
/// Occurrences of any query term, normalised by content length in units of
/// 100 terms. Zero when no term occurs.
pub fn keyword_score(query_terms: &[String], content: &str) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let content_terms = terms(content);
    let occurrences = content_terms
        .iter()
        .filter(|t| query_terms.contains(t))
        .count();
    occurrences as f32 / (content_terms.len() as f32 / 100.0).max(1.0)
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1]; 0.0 if the vectors differ in length, are
/// empty, or either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a.iter().zip(b).fold((0.0f64, 0.0f64, 0.0f64), |acc, (x, y)| {
        let (x, y) = (*x as f64, *y as f64);
        (acc.0 + x * y, acc.1 + x * x, acc.2 + y * y)
    });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Sort hits by descending score, keeping insertion order on ties.
pub fn sort_desc(hits: &mut [Hit]) {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}

/// Merge ranked lists with Reciprocal Rank Fusion.
///
/// Each document's fused score is the sum of `1 / (k + rank + 1)` over the
/// lists it appears in. Output is deduplicated and sorted by fused score.
pub fn reciprocal_rank_fusion(lists: &[Vec<Hit>], k: f32) -> Vec<Hit> {
    let mut fused: HashMap<usize, f32> = HashMap::new();
    let mut first_seen: Vec<usize> = Vec::new();

    for list in lists {
        for (rank, hit) in list.iter().enumerate() {
            let contribution = 1.0 / (k + rank as f32 + 1.0);
            let entry = fused.entry(hit.doc).or_insert_with(|| {
                first_seen.push(hit.doc);
                0.0
            });
            *entry += contribution;
        }
    }

    let mut hits: Vec<Hit> = first_seen
        .into_iter()
        .map(|doc| Hit { doc, score: fused[&doc] })
        .collect();
    sort_desc(&mut hits);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits(docs: &[usize]) -> Vec<Hit> {
        docs.iter()
            .enumerate()
            .map(|(i, d)| Hit { doc: *d, score: 1.0 / (i as f32 + 1.0) })
            .collect()
    }

    #[test]
    fn terms_are_lowercased_and_split() {
        assert_eq!(terms("Health-Plan, cardio!"), vec!["health", "plan", "cardio"]);
        assert!(terms("  ..  ").is_empty());
    }

    #[test]
    fn keyword_score_counts_matches() {
        let q = terms("cardio coverage");
        assert!(keyword_score(&q, "Cardio is covered. Coverage includes cardio.") > 0.0);
        assert_eq!(keyword_score(&q, "Dental plans only"), 0.0);
        assert_eq!(keyword_score(&[], "anything"), 0.0);
    }

    #[test]
    fn keyword_score_normalises_long_content() {
        let q = terms("cardio");
        let short = "cardio".to_string();
        let long = format!("cardio {}", "filler ".repeat(400));
        assert!(keyword_score(&q, &short) > keyword_score(&q, &long));
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn rrf_prefers_documents_ranked_in_both_lists() {
        let fused = reciprocal_rank_fusion(&[hits(&[0, 1, 2]), hits(&[1, 3, 0])], RRF_K);
        assert_eq!(fused[0].doc, 1);
        assert_eq!(fused[1].doc, 0);
        assert_eq!(fused.len(), 4);
    }

    #[test]
    fn rrf_single_list_keeps_order() {
        let fused = reciprocal_rank_fusion(&[hits(&[5, 2, 9])], RRF_K);
        let order: Vec<usize> = fused.iter().map(|h| h.doc).collect();
        assert_eq!(order, vec![5, 2, 9]);
    }

    #[test]
    fn rrf_empty() {
        assert!(reciprocal_rank_fusion(&[], RRF_K).is_empty());
        assert!(reciprocal_rank_fusion(&[vec![], vec![]], RRF_K).is_empty());
    }
}
