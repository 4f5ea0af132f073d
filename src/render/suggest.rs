//! "Did you mean" suggestions for unknown names

/// Compute Levenshtein edit distance between two strings
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (m, n) = (a_chars.len(), b_chars.len());

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    // Single rolling row
    let mut row: Vec<usize> = (0..=n).collect();
    for i in 1..=m {
        let mut diagonal = row[0];
        row[0] = i;
        for j in 1..=n {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);
            let next = (row[j] + 1).min(row[j - 1] + 1).min(diagonal + cost);
            diagonal = row[j];
            row[j] = next;
        }
    }
    row[n]
}

/// Find declared names within a small edit distance of `target`
///
/// Closest first, at most three. Ties keep declaration order.
pub fn find_similar<'a>(declared: impl IntoIterator<Item = &'a str>, target: &str) -> Vec<String> {
    let max_distance = (target.chars().count() / 4).clamp(1, 3);
    let mut candidates: Vec<(&str, usize)> = declared
        .into_iter()
        .filter_map(|name| {
            let dist = levenshtein_distance(&name.to_lowercase(), &target.to_lowercase());
            (dist <= max_distance && name != target).then_some((name, dist))
        })
        .collect();

    candidates.sort_by_key(|(_, d)| *d);
    candidates
        .into_iter()
        .map(|(name, _)| name.to_string())
        .take(3)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_same() {
        assert_eq!(levenshtein_distance("FinanceVPC", "FinanceVPC"), 0);
    }

    #[test]
    fn test_levenshtein_one_off() {
        assert_eq!(levenshtein_distance("subnet", "subnt"), 1);
        assert_eq!(levenshtein_distance("subnet", "sabnet"), 1);
    }

    #[test]
    fn test_levenshtein_different() {
        assert_eq!(levenshtein_distance("cat", "dog"), 3);
    }

    #[test]
    fn test_find_similar_ignores_case() {
        let declared = ["FinanceVPC", "FinanceDB", "PublicRT"];
        let suggestions = find_similar(declared, "financevpc1");
        assert_eq!(suggestions, vec!["FinanceVPC".to_string()]);
    }

    #[test]
    fn test_find_similar_nothing_close() {
        assert!(find_similar(["Alpha", "Beta"], "Queue").is_empty());
    }
}
