//! Approximate string matching used to rank sound search results.
//!
//! All three primitives return a similarity in `0.0..=100.0`. The base
//! [`ratio`] is the normalized indel similarity `2 * LCS / (len_a + len_b)`,
//! computed over chars. The token metrics tokenize on any run of
//! non-alphanumeric chars.

/// Weight of [`token_set_ratio`] in [`combined_score`].
pub const TOKEN_SET_WEIGHT: f64 = 0.5;
/// Weight of [`partial_ratio`] in [`combined_score`].
pub const PARTIAL_WEIGHT: f64 = 0.3;
/// Weight of [`token_sort_ratio`] in [`combined_score`].
pub const TOKEN_SORT_WEIGHT: f64 = 0.2;
/// Flat bonus when every query token occurs literally in the candidate.
pub const ALL_TOKENS_BONUS: f64 = 20.0;

/// Lowercase and undo common leetspeak so `l33t` matches `leet`.
pub fn normalize(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| match c {
            '0' => 'o',
            '1' | '!' => 'i',
            '3' => 'e',
            '4' | '@' => 'a',
            '5' | '$' => 's',
            '7' => 't',
            other => other,
        })
        .collect()
}

/// Weighted similarity between an already-normalized query and candidate.
pub fn combined_score(query: &str, candidate: &str) -> f64 {
    let mut score = TOKEN_SET_WEIGHT * token_set_ratio(query, candidate)
        + PARTIAL_WEIGHT * partial_ratio(query, candidate)
        + TOKEN_SORT_WEIGHT * token_sort_ratio(query, candidate);
    if all_tokens_present(query, candidate) {
        score += ALL_TOKENS_BONUS;
    }
    score
}

/// True when every whitespace/hyphen-delimited query token is a substring of `candidate`.
pub fn all_tokens_present(query: &str, candidate: &str) -> bool {
    let mut tokens = query
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|t| !t.is_empty())
        .peekable();
    tokens.peek().is_some() && tokens.all(|t| candidate.contains(t))
}

/// Normalized indel similarity of two strings.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    ratio_chars(&a, &b)
}

fn ratio_chars(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    100.0 * (2 * lcs_len(a, b)) as f64 / total as f64
}

/// Longest common subsequence length, two-row DP.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Best [`ratio`] of the shorter string against every equal-length window of the longer.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };

    if short.is_empty() {
        return if long.is_empty() { 100.0 } else { 0.0 };
    }
    if short.len() == long.len() {
        return ratio_chars(short, long);
    }

    let mut best = 0.0f64;
    for window in long.windows(short.len()) {
        let r = ratio_chars(short, window);
        if r > best {
            best = r;
            if best >= 100.0 {
                break;
            }
        }
    }
    best
}

/// [`ratio`] after sorting each side's tokens alphabetically.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let mut ta = tokenize(a);
    let mut tb = tokenize(b);
    ta.sort_unstable();
    tb.sort_unstable();
    ratio(&ta.join(" "), &tb.join(" "))
}

/// Similarity of the shared token set against each side's remainder.
///
/// Compares `shared`, `shared + only_a` and `shared + only_b` pairwise and
/// keeps the best. A non-empty shared set that covers either side scores 100.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let mut ta = tokenize(a);
    let mut tb = tokenize(b);
    ta.sort_unstable();
    ta.dedup();
    tb.sort_unstable();
    tb.dedup();

    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let shared: Vec<&str> = ta.iter().copied().filter(|t| tb.contains(t)).collect();
    let only_a: Vec<&str> = ta.iter().copied().filter(|t| !tb.contains(t)).collect();
    let only_b: Vec<&str> = tb.iter().copied().filter(|t| !ta.contains(t)).collect();

    if !shared.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 100.0;
    }

    let sect = shared.join(" ");
    let combined_a = join_nonempty(&sect, &only_a.join(" "));
    let combined_b = join_nonempty(&sect, &only_b.join(" "));

    ratio(&sect, &combined_a)
        .max(ratio(&sect, &combined_b))
        .max(ratio(&combined_a, &combined_b))
}

fn join_nonempty(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (_, true) => head.to_string(),
        _ => format!("{head} {tail}"),
    }
}

fn tokenize(s: &str) -> Vec<&str> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn normalize_undoes_leetspeak() {
        assert_eq!(normalize("L33T $P34K!"), "leet speaki");
        assert_eq!(normalize("h@x0r 7ime 1"), "haxor time i");
    }

    #[test]
    fn ratio_identity_and_disjoint() {
        assert!(approx(ratio("abc", "abc"), 100.0));
        assert!(approx(ratio("abc", "xyz"), 0.0));
        assert!(approx(ratio("", ""), 100.0));
        // lcs("abcd", "abed") = 3 -> 2*3/8
        assert!(approx(ratio("abcd", "abed"), 75.0));
    }

    #[test]
    fn partial_ratio_finds_substring() {
        assert!(approx(partial_ratio("moan", "big moan remix.mp3"), 100.0));
        assert!(approx(partial_ratio("big moan remix.mp3", "moan"), 100.0));
        assert!(approx(partial_ratio("", "abc"), 0.0));
        assert!(partial_ratio("moon", "big moan") < 100.0);
    }

    #[test]
    fn token_sort_ignores_order() {
        assert!(approx(token_sort_ratio("remix moan", "moan-remix"), 100.0));
    }

    #[test]
    fn token_set_ignores_extra_tokens_on_one_side() {
        assert!(approx(token_set_ratio("moan", "big moan remix"), 100.0));
        assert!(approx(token_set_ratio("moan moan", "moan"), 100.0));
        assert!(approx(token_set_ratio("", "moan"), 0.0));
        let partial = token_set_ratio("big cat", "big dog");
        assert!(partial > 0.0 && partial < 100.0);
    }

    #[test]
    fn all_tokens_splits_on_space_and_hyphen() {
        assert!(all_tokens_present("big-moan", "the big moan.mp3"));
        assert!(all_tokens_present("moan big", "the big moan.mp3"));
        assert!(!all_tokens_present("moan cat", "the big moan.mp3"));
        assert!(!all_tokens_present(" - ", "anything"));
    }

    #[test]
    fn combined_score_rewards_exact_tokens() {
        let exact = combined_score("big moan", "big moan.mp3");
        let near = combined_score("big moan", "bag mean.mp3");
        assert!(exact > near);
        assert!(exact > 100.0, "bonus should push exact match above 100, got {exact}");
    }
}
