//! Search engines over published content.
//!
//! Three engines with different trade-offs and no shared score scale:
//! a cached lexical index scored by token overlap, BM25 full-text search, and
//! embedding-based semantic search.

pub mod composite;
pub mod error;
pub mod fulltext;
pub mod lexical;
pub mod scorer;
pub mod semantic;

pub use composite::{CompositeResults, EngineOutcome, SearchService};
pub use error::{EmbeddingError, SearchBackendError, SemanticSearchError, VectorStoreError};
pub use fulltext::{DEFAULT_FULLTEXT_LIMIT, FullTextSearchEngine, build_match_expression};
pub use lexical::{DEFAULT_INDEX_LIMIT, LexicalIndexBuilder};
pub use semantic::{
    DEFAULT_SEMANTIC_LIMIT, EMBEDDING_MODEL, EmbeddingData, EmbeddingProvider, EmbeddingResponse,
    MAX_EMBEDDING_INPUT_CHARS, MAX_SEARCH_RESULTS, ReindexSummary, SemanticSearchEngine,
    VectorIndex, VectorMatch, VectorPayload, VectorQuery, VectorRecord, build_embedding_input,
};
