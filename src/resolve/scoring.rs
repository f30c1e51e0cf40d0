//! Token scoring used by the fuzzy resolution strategies.

use std::collections::BTreeSet;

/// Generic bibliographic terms that say nothing about which document is meant.
pub const STOPWORDS: &[&str] = &[
    "annual", "report", "paper", "study", "survey", "data", "india", "indian", "national",
    "economic", "social", "development", "ministry", "government", "analysis", "review",
    "working", "research", "policy", "the", "and", "for", "bulletin", "statistics",
    "statistical", "quarterly", "monthly", "yearly", "www", "http", "https", "com", "org", "gov",
    "pdf", "html", "files", "uploads",
];

/// Acronyms that pin a citation to one publisher or dataset.
pub const KEY_ACRONYMS: &[&str] = &[
    "plfs", "msde", "nber", "ilo", "niti", "dgt", "aser", "nsso", "ncaer", "rbi", "nsdc", "nfhs",
];

const ACRONYM_BONUS: i32 = 3;
const ACRONYM_MISMATCH_PENALTY: i32 = 5;

/// Minimum score a fuzzy candidate needs before it is accepted.
pub const MIN_FUZZY_SCORE: i32 = 2;

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

fn is_acronym(token: &str) -> bool {
    KEY_ACRONYMS.contains(&token)
}

/// Scheme, `www.`, query, fragment and trailing slash insensitive form of a URL.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let without_scheme = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);
    let without_query = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or(without_scheme);
    let (host, path) = without_query
        .split_once('/')
        .unwrap_or((without_query, ""));
    let host = host.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        host.to_string()
    } else {
        format!("{}/{}", host, path)
    }
}

/// Scoring tokens of free-form citation text or a URL.
pub fn tokenize_citation(text: &str) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();

    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let keep = if word.chars().all(|c| c.is_ascii_digit()) {
            word.len() == 4
        } else if word.chars().all(|c| c.is_uppercase()) {
            word.chars().count() >= 2
        } else {
            word.chars().count() >= 3
        };
        if keep {
            let lower = word.to_lowercase();
            if !is_stopword(&lower) {
                tokens.insert(lower);
            }
        }
    }

    // Fiscal-year ranges like 2022-23 or 22-23 also contribute their short parts.
    for span in text.split(|c: char| !(c.is_ascii_digit() || c == '-')) {
        let parts: Vec<&str> = span.split('-').collect();
        for pair in parts.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if (a.len() == 2 || a.len() == 4) && b.len() == 2 {
                tokens.insert(a.to_string());
                tokens.insert(b.to_string());
            }
        }
    }

    tokens
}

/// Scoring tokens of a file stem such as `PLFS_Annual_Report_2022-23`.
pub fn tokenize_stem(stem: &str) -> BTreeSet<String> {
    stem.split(|c: char| c == '_' || c == '-' || c == ' ' || c == '.')
        .filter(|p| !p.is_empty())
        .filter_map(|part| {
            let lower = part.to_lowercase();
            if lower.chars().all(|c| c.is_ascii_digit()) {
                (2..=4).contains(&lower.len()).then_some(lower)
            } else if lower.chars().count() >= 2 && !is_stopword(&lower) {
                Some(lower)
            } else {
                None
            }
        })
        .collect()
}

/// Weighted overlap between a citation and a candidate document.
///
/// A distinctive acronym the candidate carries but the citation lacks costs
/// more than an ordinary match earns, as long as the citation names an
/// acronym of its own.
pub fn score(citation: &BTreeSet<String>, candidate: &BTreeSet<String>) -> i32 {
    let matched: Vec<&String> = citation.intersection(candidate).collect();
    let mut score = matched.len() as i32;
    score += ACRONYM_BONUS * matched.iter().filter(|t| is_acronym(t)).count() as i32;

    let citation_acronyms: BTreeSet<&String> = citation.iter().filter(|t| is_acronym(t)).collect();
    if !citation_acronyms.is_empty() {
        let mismatched = candidate
            .iter()
            .filter(|t| is_acronym(t) && !citation_acronyms.contains(t))
            .count() as i32;
        score -= ACRONYM_MISMATCH_PENALTY * mismatched;
    }
    score
}

/// The single best candidate, if it clears `min_score` and is not tied.
pub fn pick_best<T>(mut candidates: Vec<(T, i32)>, min_score: i32) -> Option<(T, i32)> {
    candidates.sort_by(|a, b| b.1.cmp(&a.1));
    let mut iter = candidates.into_iter();
    let (best, top) = iter.next()?;
    if top < min_score {
        return None;
    }
    if let Some((_, runner_up)) = iter.next() {
        if runner_up == top {
            return None;
        }
    }
    Some((best, top))
}

/// First plausible publication year in a piece of text.
pub fn find_year(text: &str) -> Option<u16> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|d| d.len() == 4)
        .filter_map(|d| d.parse::<u16>().ok())
        .find(|y| (1950..=2099).contains(y))
}

/// Keys a citation could share exactly with a local file stem: the citation
/// itself when it is a file name, the last URL path segment, and `author_year`.
pub fn exact_keys(citation: &str, url: Option<&str>) -> Vec<String> {
    let mut keys = Vec::new();
    let mut push = |key: String| {
        let key = key.trim().to_lowercase();
        if !key.is_empty() && !keys.contains(&key) {
            keys.push(key);
        }
    };

    let trimmed = citation.trim();
    if !trimmed.is_empty()
        && !trimmed.contains(char::is_whitespace)
        && (trimmed.contains('.') || trimmed.contains('_'))
    {
        push(trimmed.to_string());
        push(strip_extension(trimmed).to_string());
    }

    if let Some(url) = url {
        let normalized = normalize_url(url);
        if let Some((_, segment)) = normalized.rsplit_once('/') {
            push(strip_extension(segment).to_string());
        }
    }

    let author = trimmed
        .split(|c: char| !c.is_alphabetic())
        .find(|w| {
            w.chars().count() >= 3
                && w.chars().next().is_some_and(|c| c.is_uppercase())
                && !is_stopword(&w.to_lowercase())
        });
    if let (Some(author), Some(year)) = (author, find_year(trimmed)) {
        push(format!("{}_{}", author, year));
    }

    keys
}

fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && ext.len() <= 4 && ext.chars().all(char::is_alphanumeric) =>
        {
            stem
        }
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("https://www.MOSPI.gov.in/plfs/?lang=en#top"),
            "mospi.gov.in/plfs"
        );
        assert_eq!(normalize_url("http://mospi.gov.in/plfs"), "mospi.gov.in/plfs");
        assert_eq!(normalize_url("example.org/"), "example.org");
    }

    #[test]
    fn test_tokenize_citation_drops_stopwords() {
        let tokens = tokenize_citation("PLFS Annual Report 2022-23, Ministry of Statistics");
        assert!(tokens.contains("plfs"));
        assert!(tokens.contains("2022"));
        assert!(tokens.contains("23"));
        assert!(!tokens.contains("annual"));
        assert!(!tokens.contains("report"));
        assert!(!tokens.contains("ministry"));
        // "of" is too short to keep
        assert!(!tokens.contains("of"));
    }

    #[test]
    fn test_tokenize_stem() {
        assert_eq!(
            tokenize_stem("PLFS_Annual_Report_2022-23"),
            set(&["2022", "23", "plfs"])
        );
        assert_eq!(
            tokenize_stem("Muralidharan_Sundararaman_2013"),
            set(&["2013", "muralidharan", "sundararaman"])
        );
    }

    #[test]
    fn test_score_weights_acronyms() {
        let citation = tokenize_citation("PLFS 2022-23 unemployment");
        let right = tokenize_stem("PLFS_Annual_Report_2022-23");
        let wrong = tokenize_stem("NFHS_5_2022");
        // plfs(1+3) + 2022 + 23
        assert_eq!(score(&citation, &right), 6);
        // 2022 - 5 for nfhs
        assert_eq!(score(&citation, &wrong), -4);
    }

    #[test]
    fn test_no_penalty_without_citation_acronym() {
        let citation = tokenize_citation("Periodic Labour Force 2023");
        let candidate = tokenize_stem("PLFS_Periodic_Labour_Force_2023");
        assert_eq!(score(&citation, &candidate), 4);
    }

    #[test]
    fn test_pick_best_rejects_ties_and_low_scores() {
        assert_eq!(pick_best(vec![("a", 5), ("b", 3)], 2), Some(("a", 5)));
        assert_eq!(pick_best(vec![("a", 5), ("b", 5)], 2), None);
        assert_eq!(pick_best(vec![("a", 1)], 2), None);
        assert_eq!(pick_best::<&str>(vec![], 2), None);
    }

    #[test]
    fn test_exact_keys() {
        let keys = exact_keys("Muralidharan & Sundararaman (2013)", None);
        assert_eq!(keys, vec!["muralidharan_2013"]);

        let keys = exact_keys("WPS8752.txt", None);
        assert_eq!(keys, vec!["wps8752.txt", "wps8752"]);

        let keys = exact_keys(
            "World Bank working paper",
            Some("https://documents1.worldbank.org/curated/en/123/txt/WPS8752.txt"),
        );
        assert_eq!(keys, vec!["wps8752"]);
    }

    #[test]
    fn test_find_year() {
        assert_eq!(find_year("Report 2019-20 edition"), Some(2019));
        assert_eq!(find_year("ISBN 1234 and 2021"), Some(2021));
        assert_eq!(find_year("no year"), None);
    }
}
