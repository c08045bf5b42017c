//! Keyword similarity search over resources.
//!
//! [`KeywordSearch`] backs the general-document top-up of context assembly
//! with the `documents_fts` FTS5 index. The query is split into words,
//! each word is quoted, and the words are OR-ed so that any overlap with
//! the task's title or description produces a candidate. BM25 ranks are
//! min-max normalized into `[0, 1]` per query.
//!
//! Archived resources never come back from search.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use task_context_core::context::{SearchHit, SemanticSearch};

/// FTS5-backed [`SemanticSearch`] implementation.
#[derive(Clone)]
pub struct KeywordSearch {
    pool: SqlitePool,
}

impl KeywordSearch {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// A raw FTS hit before normalization. `raw_score` is `-rank`, so higher
/// is better.
struct Candidate {
    hit: SearchHit,
    raw_score: f64,
}

/// Build an FTS5 `MATCH` expression from free text.
///
/// Returns `None` when the text has no searchable words.
pub fn fts_query(text: &str) -> Option<String> {
    let mut seen = std::collections::HashSet::new();
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 2)
        .map(|w| w.to_lowercase())
        .filter(|w| seen.insert(w.clone()))
        .map(|w| format!("\"{}\"", w))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

#[async_trait]
impl SemanticSearch for KeywordSearch {
    async fn search_by_similarity(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let Some(expr) = fts_query(query) else {
            return Ok(Vec::new());
        };
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT d.id, d.text, d.summary, d.source, documents_fts.rank AS rank
            FROM documents_fts
            JOIN documents d ON d.id = documents_fts.rowid
            WHERE documents_fts MATCH ?
              AND d.assignment_status != 'archived'
            ORDER BY documents_fts.rank, d.id
            LIMIT ?
            "#,
        )
        .bind(&expr)
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let rank: f64 = row.try_get("rank")?;
            candidates.push(Candidate {
                hit: SearchHit {
                    resource_id: row.try_get("id")?,
                    text: row.try_get("text")?,
                    summary: row.try_get("summary")?,
                    origin: row.try_get("source")?,
                    similarity: 0.0,
                },
                raw_score: -rank,
            });
        }

        debug!(query = %expr, hits = candidates.len(), "Keyword search");
        Ok(normalize_scores(candidates))
    }
}

/// Min-max normalize raw scores into `similarity`. A single hit, or hits
/// that all tie, score 1.0.
fn normalize_scores(candidates: Vec<Candidate>) -> Vec<SearchHit> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let s_min = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::INFINITY, f64::min);
    let s_max = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::NEG_INFINITY, f64::max);

    candidates
        .into_iter()
        .map(|c| {
            let similarity = if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (c.raw_score - s_min) / (s_max - s_min)
            };
            SearchHit { similarity, ..c.hit }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: i64, score: f64) -> Candidate {
        Candidate {
            hit: SearchHit {
                resource_id: id,
                text: String::new(),
                summary: None,
                origin: String::new(),
                similarity: 0.0,
            },
            raw_score: score,
        }
    }

    #[test]
    fn test_fts_query_quotes_and_dedups() {
        assert_eq!(
            fts_query("Auth flow: OAuth, auth!").as_deref(),
            Some("\"auth\" OR \"flow\" OR \"oauth\"")
        );
    }

    #[test]
    fn test_fts_query_neutralizes_operators() {
        let q = fts_query("NOT \"x\" title:foo*").unwrap();
        assert_eq!(q, "\"not\" OR \"title\" OR \"foo\"");
    }

    #[test]
    fn test_fts_query_empty() {
        assert!(fts_query("").is_none());
        assert!(fts_query("a - ! ?").is_none());
    }

    #[test]
    fn test_normalize_range() {
        let hits = normalize_scores(vec![candidate(1, 10.0), candidate(2, 5.0), candidate(3, 0.0)]);
        assert!((hits[0].similarity - 1.0).abs() < 1e-9);
        assert!((hits[1].similarity - 0.5).abs() < 1e-9);
        assert!(hits[2].similarity.abs() < 1e-9);
    }

    #[test]
    fn test_normalize_single_and_ties() {
        let hits = normalize_scores(vec![candidate(1, 3.0)]);
        assert!((hits[0].similarity - 1.0).abs() < 1e-9);

        let hits = normalize_scores(vec![candidate(1, 2.0), candidate(2, 2.0)]);
        assert!(hits.iter().all(|h| (h.similarity - 1.0).abs() < 1e-9));
    }
}
