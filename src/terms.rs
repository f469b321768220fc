use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use rand::seq::SliceRandom;
use regex::Regex;

/// Palabras sin valor de búsqueda, excluidas de los términos generados
const STOP_WORDS: &[&str] = &[
    "ourselves", "hers", "between", "yourself", "but", "again", "there",
    "about", "once", "during", "out", "very", "having", "with", "they",
    "own", "an", "be", "some", "for", "do", "its", "yours", "such",
    "into", "of", "most", "itself", "other", "off", "is", "s", "am", "or",
    "who", "as", "from", "him", "each", "the", "themselves", "until",
    "below", "are", "we", "these", "your", "his", "through", "don", "nor",
    "me", "were", "her", "more", "himself", "this", "down", "should",
    "our", "their", "while", "above", "both", "up", "to", "ours", "had",
    "she", "all", "no", "when", "at", "any", "before", "them", "same",
    "and", "been", "have", "in", "will", "on", "does", "yourselves",
    "then", "that", "because", "what", "over", "why", "so", "can", "did",
    "not", "now", "under", "he", "you", "herself", "has", "just", "where",
    "too", "only", "myself", "which", "those", "i", "after", "few", "whom",
    "t", "being", "if", "theirs", "my", "against", "a", "by", "doing",
    "it", "how", "further", "was", "here", "than",
];

/// Máximo de términos que componen una consulta de búsqueda
const MAX_QUERY_TERMS: usize = 9;

fn non_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\W").expect("regex estática inválida"))
}

/// Normaliza y deduplica los tags libres de un video.
///
/// Un tag cuyas palabras aparecen en más de dos tags distintos se colapsa
/// al tag más corto que contiene esa palabra. El orden de primera aparición
/// se conserva.
pub fn clean_tags(tags: &[String]) -> Vec<String> {
    let tags: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();

    let mut word_users: HashMap<&str, Vec<&String>> = HashMap::new();
    for tag in &tags {
        for word in tag.split_whitespace() {
            word_users.entry(word).or_default().push(tag);
        }
    }

    let mut final_tags: Vec<String> = Vec::new();

    for tag in &tags {
        let mut duplicate_words = false;

        for word in tag.split_whitespace() {
            let users = word_users.get(word).map(Vec::as_slice).unwrap_or(&[]);

            if users.len() > 2 {
                if let Some(shortest) = users.iter().min_by_key(|t| t.len()) {
                    if !final_tags.contains(*shortest) {
                        final_tags.push((*shortest).clone());
                    }
                }
                duplicate_words = true;
            }
        }

        if !duplicate_words && !final_tags.contains(tag) {
            final_tags.push(tag.clone());
        }
    }

    final_tags
}

/// Genera los términos de búsqueda para videos relacionados a partir de
/// tags, título y descripción. Sin estado ni efectos secundarios.
pub fn search_terms(tags: &[String], title: &str, description: &str) -> Vec<String> {
    let mut terms = clean_tags(tags);
    terms.shuffle(&mut rand::thread_rng());

    terms.extend(title.split_whitespace().map(str::to_owned));

    let mut seen_words = HashSet::new();
    terms.extend(
        description
            .split_whitespace()
            .filter(|w| seen_words.insert(*w))
            .map(str::to_owned),
    );

    let lowered = terms.join(" ").to_lowercase();
    let cleaned = non_word().replace_all(&lowered, " ");

    cleaned
        .split_whitespace()
        .filter(|t| !STOP_WORDS.contains(t))
        .take(MAX_QUERY_TERMS)
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_clean_tags_lowercases_and_keeps_order() {
        let tags = strings(&["Cats", "Kittens"]);
        assert_eq!(clean_tags(&tags), strings(&["cats", "kittens"]));
    }

    #[test]
    fn test_clean_tags_collapses_overused_words() {
        // "cats" aparece en tres tags, todos se colapsan al más corto
        let tags = strings(&["funny cats", "cats", "cute cats compilation"]);
        assert_eq!(clean_tags(&tags), strings(&["cats"]));
    }

    #[test]
    fn test_clean_tags_deduplicates() {
        let tags = strings(&["rust", "Rust", "rust"]);
        assert_eq!(clean_tags(&tags), strings(&["rust"]));
    }

    #[test]
    fn test_clean_tags_empty() {
        assert!(clean_tags(&[]).is_empty());
    }

    #[test]
    fn test_search_terms_filters_stop_words() {
        let terms = search_terms(&[], "the best of rust", "");
        assert_eq!(terms, strings(&["best", "rust"]));
    }

    #[test]
    fn test_search_terms_strips_punctuation() {
        let terms = search_terms(&[], "rust: ownership & borrowing!", "");
        assert_eq!(terms, strings(&["rust", "ownership", "borrowing"]));
    }

    #[test]
    fn test_search_terms_caps_at_nine() {
        let title = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let terms = search_terms(&[], title, "");
        assert_eq!(terms.len(), 9);
        assert!(!terms.contains(&"kappa".to_string()));
    }

    #[test]
    fn test_search_terms_includes_cleaned_tags() {
        let tags = strings(&["quantum"]);
        let terms = search_terms(&tags, "", "");
        assert_eq!(terms, strings(&["quantum"]));
    }
}
