//! Normalized edit-distance scoring for fuzzy title matching.

/// Case-insensitive Levenshtein distance with unit costs.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    distance(&a, &b)
}

fn distance(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Single rolling row of the DP table.
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = diagonal + usize::from(ca != cb);
            diagonal = row[j + 1];
            row[j + 1] = substitution.min(row[j] + 1).min(diagonal + 1);
        }
    }
    row[b.len()]
}

/// `1 - distance / longest length`, so 1.0 means identical ignoring case.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - distance(&a, &b) as f64 / longest as f64
}

pub fn reverse_words(text: &str) -> String {
    text.split_whitespace().rev().collect::<Vec<_>>().join(" ")
}

/// Score a candidate title against a query, accepting either
/// "Artist - Song" or "Song - Artist" ordering.
pub fn score(title: &str, query: &str) -> f64 {
    similarity(title, query).max(similarity(&reverse_words(title), query))
}

/// Highest-scoring candidate with its score. Ties keep the earlier one.
pub fn best_match<T, F>(candidates: Vec<T>, query: &str, title: F) -> Option<(T, f64)>
where
    F: Fn(&T) -> &str,
{
    let mut best: Option<(T, f64)> = None;
    for candidate in candidates {
        let candidate_score = score(title(&candidate), query);
        let better = match &best {
            Some((_, best_score)) => candidate_score > *best_score,
            None => true,
        };
        if better {
            best = Some((candidate, candidate_score));
        }
    }
    best
}
