//! TF-IDF search over tool metadata.
//!
//! Documents are the concatenated name, description, and keywords of each
//! registered tool. Query tokens are stemmed the same way the documents are
//! (lowercased, punctuation trimmed) and scored with
//! `tf(term, doc) * ln(N / df(term))` summed across terms. Given a fixed
//! metadata set and query, results are deterministic; ties break by name.

use std::collections::HashMap;

/// Inverted term statistics over a fixed document set.
#[derive(Debug, Default)]
pub struct TfIdfIndex {
    docs: Vec<Document>,
    doc_freq: HashMap<String, usize>,
}

#[derive(Debug)]
struct Document {
    name: String,
    term_freq: HashMap<String, usize>,
}

/// A scored search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub name: String,
    pub score: f64,
}

impl TfIdfIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index one document. `text` is the searchable surface (name +
    /// description + keywords).
    pub fn add_document(&mut self, name: impl Into<String>, text: &str) {
        let name = name.into();
        let mut term_freq: HashMap<String, usize> = HashMap::new();
        for term in tokenize(text) {
            *term_freq.entry(term).or_insert(0) += 1;
        }

        for term in term_freq.keys() {
            *self.doc_freq.entry(term.clone()).or_insert(0) += 1;
        }
        self.docs.push(Document { name, term_freq });
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Rank documents against the query. An empty query (or one with no
    /// recognizable tokens) yields no hits.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let terms = tokenize(query);
        if terms.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }

        let n = self.docs.len() as f64;
        let mut hits: Vec<SearchHit> = self
            .docs
            .iter()
            .filter_map(|doc| {
                let mut score = 0.0;
                for term in &terms {
                    let tf = *doc.term_freq.get(term).unwrap_or(&0) as f64;
                    if tf == 0.0 {
                        continue;
                    }
                    let df = *self.doc_freq.get(term).unwrap_or(&0) as f64;
                    score += tf * (n / df).ln();
                }
                (score > 0.0).then(|| SearchHit {
                    name: doc.name.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.name.cmp(&b.name))
        });
        hits.truncate(limit);
        hits
    }
}

/// Lowercase, split on non-alphanumeric boundaries, drop empties.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> TfIdfIndex {
        let mut index = TfIdfIndex::new();
        index.add_document(
            "registry_list",
            "registry_list List tasks in the registry matching a filter tasks filter",
        );
        index.add_document(
            "registry_next",
            "registry_next Ready-to-run tasks whose dependencies are done",
        );
        index.add_document(
            "agent_spawn",
            "agent_spawn Spawn a background agent for a long-running prompt",
        );
        index
    }

    #[test]
    fn test_ranking_prefers_term_matches() {
        // S4: "list tasks" ranks registry_list first; agent_spawn is absent.
        let hits = index().search("list tasks", 10);
        assert_eq!(hits[0].name, "registry_list");
        assert!(!hits.iter().any(|h| h.name == "agent_spawn"));
    }

    #[test]
    fn test_empty_query_is_empty() {
        assert!(index().search("", 10).is_empty());
        assert!(index().search("...", 10).is_empty());
    }

    #[test]
    fn test_unknown_terms_no_hits() {
        assert!(index().search("kubernetes deployment", 10).is_empty());
    }

    #[test]
    fn test_determinism() {
        let a = index().search("tasks registry", 10);
        let b = index().search("tasks registry", 10);
        assert_eq!(a, b);
    }

    #[test]
    fn test_limit_respected() {
        let hits = index().search("tasks", 1);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_ubiquitous_terms_contribute_nothing() {
        let mut index = TfIdfIndex::new();
        index.add_document("a", "common unique_a");
        index.add_document("b", "common unique_b");

        // "common" appears in every document: ln(N/df) = 0.
        assert!(index.search("common", 10).is_empty());
        assert_eq!(index.search("unique_a", 10)[0].name, "a");
    }
}
