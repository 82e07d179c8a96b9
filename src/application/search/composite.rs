//! Fan-out over every search engine.
//!
//! Engines run concurrently and report independently: an outage in one never
//! hides results from another.

use std::time::Instant;

use metrics::histogram;
use serde::Serialize;
use tracing::warn;

use crate::domain::search::{SearchResult, SemanticMatch};

use super::fulltext::FullTextSearchEngine;
use super::lexical::LexicalIndexBuilder;
use super::scorer;
use super::semantic::SemanticSearchEngine;

const METRIC_SEARCH_MS: &str = "edgepress_search_ms";

/// Per-engine result of a composite search.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EngineOutcome<T> {
    Ok { results: Vec<T> },
    Failed { error: String },
    Disabled,
}

impl<T> EngineOutcome<T> {
    fn from_result<E: std::fmt::Display>(engine: &'static str, result: Result<Vec<T>, E>) -> Self {
        match result {
            Ok(results) => Self::Ok { results },
            Err(err) => {
                warn!(engine, error = %err, "search engine failed");
                Self::Failed {
                    error: err.to_string(),
                }
            }
        }
    }

    pub fn results(&self) -> Option<&[T]> {
        match self {
            Self::Ok { results } => Some(results),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeResults {
    pub lexical: EngineOutcome<SearchResult>,
    pub fulltext: EngineOutcome<SearchResult>,
    pub semantic: EngineOutcome<SemanticMatch>,
}

#[derive(Clone)]
pub struct SearchService {
    lexical: LexicalIndexBuilder,
    fulltext: FullTextSearchEngine,
    semantic: Option<SemanticSearchEngine>,
    index_limit: u32,
}

impl SearchService {
    pub fn new(
        lexical: LexicalIndexBuilder,
        fulltext: FullTextSearchEngine,
        semantic: Option<SemanticSearchEngine>,
        index_limit: u32,
    ) -> Self {
        Self {
            lexical,
            fulltext,
            semantic,
            index_limit,
        }
    }

    pub fn lexical(&self) -> &LexicalIndexBuilder {
        &self.lexical
    }

    pub fn fulltext(&self) -> &FullTextSearchEngine {
        &self.fulltext
    }

    pub fn semantic(&self) -> Option<&SemanticSearchEngine> {
        self.semantic.as_ref()
    }

    pub fn index_limit(&self) -> u32 {
        self.index_limit
    }

    pub async fn search_all(&self, query: &str, limit: usize) -> CompositeResults {
        let lexical = async {
            let started = Instant::now();
            let result = self
                .lexical
                .build_cached(self.index_limit)
                .await
                .map(|items| scorer::search(query, &items, limit));
            record_latency("lexical", started);
            EngineOutcome::from_result("lexical", result)
        };

        let fulltext = async {
            let started = Instant::now();
            let result = self.fulltext.search_cached(query, limit as u32).await;
            record_latency("fulltext", started);
            EngineOutcome::from_result("fulltext", result)
        };

        let semantic = async {
            let Some(engine) = &self.semantic else {
                return EngineOutcome::Disabled;
            };
            let started = Instant::now();
            let result = engine.search(query, limit, false).await;
            record_latency("semantic", started);
            EngineOutcome::from_result("semantic", result)
        };

        let (lexical, fulltext, semantic) = tokio::join!(lexical, fulltext, semantic);
        CompositeResults {
            lexical,
            fulltext,
            semantic,
        }
    }
}

fn record_latency(engine: &'static str, started: Instant) {
    histogram!(METRIC_SEARCH_MS, "engine" => engine)
        .record(started.elapsed().as_secs_f64() * 1000.0);
}
