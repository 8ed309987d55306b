//! Similarity search: filter-then-rank k-nearest-neighbor retrieval, with an
//! optional maximal-marginal-relevance (MMR) re-ranking for diverse results.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{cmp_ranked, VectorQuery};
use crate::collection::CollectionManager;
use crate::distance::cosine_similarity;
use crate::document::StoredDocument;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::store::backend_failure;

/// Options for diversity-aware re-ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MmrOptions {
    /// Candidates fetched before re-ranking. At least `k + 1` are always fetched.
    pub fetch_k: usize,
    /// 1.0 ranks purely by relevance, 0.0 purely by diversity.
    pub lambda: f32,
}

impl Default for MmrOptions {
    fn default() -> Self {
        Self {
            fetch_k: 20,
            lambda: 0.5,
        }
    }
}

/// A similarity search.
///
/// # Example
///
/// ```
/// use ragstore_core::{Filter, SearchRequest};
///
/// let request = SearchRequest::new(vec![0.1, 0.2, 0.3], 4)
///     .with_filter(Filter::field("topic").eq("rust"))
///     .with_min_score(0.2);
/// assert_eq!(request.k, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub vector: Vec<f32>,
    pub k: usize,
    #[serde(default)]
    pub filter: Option<Filter>,
    /// Drop results scoring below this, after the `k` cut.
    #[serde(default)]
    pub min_score: Option<f32>,
    #[serde(default)]
    pub mmr: Option<MmrOptions>,
}

impl SearchRequest {
    pub fn new(vector: Vec<f32>, k: usize) -> Self {
        Self {
            vector,
            k,
            filter: None,
            min_score: None,
            mmr: None,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn with_mmr(mut self, options: MmrOptions) -> Self {
        self.mmr = Some(options);
        self
    }
}

/// A matched document and how close it is to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub document: StoredDocument,
    /// Higher is more similar.
    pub score: f32,
    /// Lower is more similar.
    pub distance: f32,
}

/// Runs similarity searches against the collections a [`CollectionManager`] owns.
#[derive(Debug, Clone)]
pub struct SearchEngine {
    collections: Arc<CollectionManager>,
}

impl SearchEngine {
    pub fn new(collections: Arc<CollectionManager>) -> Self {
        Self { collections }
    }

    /// Returns up to `k` documents satisfying the filter, closest first.
    ///
    /// Results are ordered by distance ascending with ties broken by
    /// identity; under MMR they are in selection order instead. Fewer than
    /// `k` results means fewer documents matched.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for `k == 0` or an MMR lambda outside
    /// `[0, 1]`, [`Error::DimensionMismatch`] for a wrong-length query,
    /// [`Error::InvalidFilter`] for a malformed filter and
    /// [`Error::NotFound`] for an unknown collection. All of these are
    /// reported before the backend is queried.
    pub fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        if request.k == 0 {
            return Err(Error::InvalidArgument("k must be at least 1".to_string()));
        }
        if let Some(mmr) = &request.mmr {
            if !(0.0..=1.0).contains(&mmr.lambda) {
                return Err(Error::InvalidArgument(format!(
                    "mmr lambda must be within [0, 1], got {}",
                    mmr.lambda
                )));
            }
        }
        let config = self.collections.get(collection)?;
        config.check_dimension(request.vector.len())?;
        let condition = Filter::condition_for(request.filter.as_ref(), &config)?;

        let fetch = match &request.mmr {
            Some(mmr) => mmr.fetch_k.max(request.k.saturating_add(1)),
            None => request.k,
        };
        let query = VectorQuery::nearest(condition, request.vector.clone(), config.metric, fetch);
        let rows = self
            .collections
            .backend()
            .execute_query(collection, &query)
            .map_err(|e| backend_failure(collection, "search", e))?;

        let metric = config.metric;
        let mut candidates: Vec<SearchResult> = rows
            .into_iter()
            .map(|row| {
                let distance = row
                    .distance
                    .unwrap_or_else(|| metric.compute(&request.vector, &row.document.embedding));
                SearchResult {
                    score: metric.score(distance),
                    distance,
                    document: row.document,
                }
            })
            .collect();
        // backends are not trusted to break ties deterministically
        candidates.sort_by(|a, b| {
            cmp_ranked((a.distance, &a.document.id), (b.distance, &b.document.id))
        });
        candidates.truncate(fetch);
        let fetched = candidates.len();

        let mut results = match &request.mmr {
            Some(mmr) => {
                let embeddings: Vec<&[f32]> = candidates
                    .iter()
                    .map(|c| c.document.embedding.as_slice())
                    .collect();
                let picks =
                    maximal_marginal_relevance(&request.vector, &embeddings, request.k, mmr.lambda);
                let mut slots: Vec<Option<SearchResult>> =
                    candidates.into_iter().map(Some).collect();
                picks
                    .into_iter()
                    .filter_map(|i| slots.get_mut(i).and_then(Option::take))
                    .collect()
            }
            None => candidates,
        };
        results.truncate(request.k);

        if let Some(min_score) = request.min_score {
            results.retain(|r| r.score >= min_score);
        }

        debug!(
            collection,
            k = request.k,
            fetched,
            returned = results.len(),
            mmr = request.mmr.is_some(),
            "search complete"
        );
        Ok(results)
    }
}

/// Selects up to `k` indices of `embeddings` by maximal marginal relevance.
///
/// The first pick is the candidate most similar to `query`; each following
/// pick maximizes `lambda * sim(query, c) - (1 - lambda) * max sim(c, picked)`,
/// with cosine similarity throughout. Ties go to the earlier candidate.
/// Indices are returned in selection order.
pub fn maximal_marginal_relevance(
    query: &[f32],
    embeddings: &[&[f32]],
    k: usize,
    lambda: f32,
) -> Vec<usize> {
    let relevance: Vec<f32> = embeddings
        .iter()
        .map(|e| cosine_similarity(query, e))
        .collect();

    let mut selected: Vec<usize> = Vec::with_capacity(k.min(embeddings.len()));
    // highest similarity to anything selected so far, per candidate
    let mut redundancy = vec![f32::NEG_INFINITY; embeddings.len()];

    while selected.len() < k.min(embeddings.len()) {
        let mut best: Option<(usize, f32)> = None;
        for (i, rel) in relevance.iter().enumerate() {
            if selected.contains(&i) {
                continue;
            }
            let score = if selected.is_empty() {
                *rel
            } else {
                lambda * rel - (1.0 - lambda) * redundancy[i]
            };
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }

        let Some((pick, _)) = best else { break };
        selected.push(pick);
        for (i, candidate) in embeddings.iter().enumerate() {
            let similarity = cosine_similarity(embeddings[pick], candidate);
            if similarity > redundancy[i] {
                redundancy[i] = similarity;
            }
        }
    }

    selected
}
