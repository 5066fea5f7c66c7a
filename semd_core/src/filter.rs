//! Fuzzy filtering and ranking of completion candidates.

use std::cmp::Ordering;

/// Match quality of a candidate against a query. Lower sorts first.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Score {
    not_prefix: bool,
    boundary_misses: usize,
    index_sum: usize,
    len: usize,
    lowered: String,
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.not_prefix
            .cmp(&other.not_prefix)
            .then(self.boundary_misses.cmp(&other.boundary_misses))
            .then(self.index_sum.cmp(&other.index_sum))
            .then(self.len.cmp(&other.len))
            .then_with(|| self.lowered.cmp(&other.lowered))
    }
}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn is_word_boundary(chars: &[char], index: usize) -> bool {
    if index == 0 {
        return true;
    }
    let prev = chars[index - 1];
    let cur = chars[index];
    !prev.is_alphanumeric() || (prev.is_lowercase() && cur.is_uppercase())
}

/// Smart-case subsequence match: a lowercase query character matches either
/// case, an uppercase one only itself.
fn score(candidate: &str, query: &[char]) -> Option<Score> {
    let chars: Vec<char> = candidate.chars().collect();
    let mut index_sum = 0;
    let mut boundary_hits = 0;
    let mut pos = 0;
    for &q in query {
        let found = chars[pos..].iter().position(|&c| {
            if q.is_uppercase() {
                c == q
            } else {
                c.to_lowercase().eq(q.to_lowercase())
            }
        })?;
        let at = pos + found;
        if is_word_boundary(&chars, at) {
            boundary_hits += 1;
        }
        index_sum += at;
        pos = at + 1;
    }
    let lowered = candidate.to_lowercase();
    let query_lowered: String = query.iter().collect::<String>().to_lowercase();
    Some(Score {
        not_prefix: !lowered.starts_with(&query_lowered),
        boundary_misses: query.len() - boundary_hits,
        index_sum,
        len: chars.len(),
        lowered,
    })
}

/// Keeps the candidates matching `query` and sorts them best-first.
///
/// An empty query keeps the original order. `max` of 0 means no limit.
pub fn filter_and_sort<T, F>(candidates: Vec<T>, query: &str, max: usize, key: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    let limit = if max == 0 { usize::MAX } else { max };
    if query.is_empty() {
        return candidates.into_iter().take(limit).collect();
    }

    let query: Vec<char> = query.chars().collect();
    let mut scored: Vec<(Score, T)> = candidates
        .into_iter()
        .filter_map(|c| score(key(&c), &query).map(|s| (s, c)))
        .collect();
    scored.sort_by(|a, b| a.0.cmp(&b.0));
    scored.into_iter().take(limit).map(|(_, c)| c).collect()
}
