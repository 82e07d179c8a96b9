//! Token-overlap ranking over a fetched search index. Pure; no I/O.

use std::cmp::Ordering;

use crate::domain::search::{SearchIndexItem, SearchResult};

pub const DEFAULT_RESULT_LIMIT: usize = 20;

const TITLE_WEIGHT: u32 = 4;
const TAG_WEIGHT: u32 = 3;
const EXCERPT_WEIGHT: u32 = 2;

/// Whitespace split, lowercased, tokens of one character or less dropped.
/// Repeated tokens are kept.
pub fn tokenize(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|token| token.chars().count() > 1)
        .collect()
}

/// Rank `items` against `query` and keep the best `limit`.
///
/// Each query token adds 4 for a title substring hit, 2 for an excerpt hit
/// and 3 when any tag contains it. Zero scores are dropped. Ties on score go
/// to the more recently published item.
pub fn search(query: &str, items: &[SearchIndexItem], limit: usize) -> Vec<SearchResult> {
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(u32, &SearchIndexItem)> = items
        .iter()
        .map(|item| (score_item(&tokens, item), item))
        .filter(|(score, _)| *score > 0)
        .collect();

    scored.sort_by(|(left_score, left), (right_score, right)| {
        right_score
            .cmp(left_score)
            .then_with(|| right.published_at.cmp(&left.published_at))
    });

    scored
        .into_iter()
        .take(limit)
        .map(|(score, item)| SearchResult {
            item: item.clone(),
            score: f64::from(score),
            highlight: item.excerpt.clone(),
        })
        .collect()
}

fn score_item(tokens: &[String], item: &SearchIndexItem) -> u32 {
    let title = item.title.to_lowercase();
    let excerpt = item.excerpt.to_lowercase();
    let tags: Vec<String> = item.tags.iter().map(|tag| tag.to_lowercase()).collect();

    tokens
        .iter()
        .map(|token| {
            let mut score = 0;
            if title.contains(token.as_str()) {
                score += TITLE_WEIGHT;
            }
            if excerpt.contains(token.as_str()) {
                score += EXCERPT_WEIGHT;
            }
            if tags.iter().any(|tag| tag.contains(token.as_str())) {
                score += TAG_WEIGHT;
            }
            score
        })
        .sum()
}

/// Orders two results the way [`search`] does.
pub fn compare_results(left: &SearchResult, right: &SearchResult) -> Ordering {
    right
        .score
        .total_cmp(&left.score)
        .then_with(|| right.item.published_at.cmp(&left.item.published_at))
}
