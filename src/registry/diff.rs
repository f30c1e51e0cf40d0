use std::collections::{HashMap, HashSet};

use super::types::{Parameter, SourceCitation};
use crate::resolve::scoring::normalize_url;

/// What an import would do to the registry.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportDiff {
    pub added: Vec<String>,
    /// Parameters whose name, value, tier or citations differ.
    pub changed: Vec<String>,
    /// In the registry but absent from the import. Reported, never deleted.
    pub removed: Vec<String>,
    pub unchanged: usize,
}

impl ImportDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "{} added, {} changed, {} unchanged, {} only in registry\n",
            self.added.len(),
            self.changed.len(),
            self.unchanged,
            self.removed.len()
        );
        for (mark, ids) in [("+", &self.added), ("~", &self.changed), ("-", &self.removed)] {
            for id in ids {
                out.push_str(&format!("  {} {}\n", mark, id));
            }
        }
        out
    }
}

fn same_citation(a: &SourceCitation, b: &SourceCitation) -> bool {
    if a.id == b.id {
        return true;
    }
    match (a.url.as_deref(), b.url.as_deref()) {
        (Some(x), Some(y)) => normalize_url(x) == normalize_url(y),
        _ => false,
    }
}

/// Carry catalog links from stored citations onto incoming ones that lack
/// them, so re-importing a parameter file does not undo earlier resolutions.
pub fn keep_links(existing: &Parameter, incoming: &mut Parameter) {
    for citation in incoming.citations.iter_mut().filter(|c| c.document_id.is_none()) {
        if let Some(stored) = existing
            .citations
            .iter()
            .find(|s| s.document_id.is_some() && same_citation(s, citation))
        {
            citation.document_id = stored.document_id.clone();
        }
    }
}

/// Compare an import against the stored parameters. `incoming` should
/// already have links carried over with [`keep_links`].
pub fn diff(existing: &[Parameter], incoming: &[Parameter]) -> ImportDiff {
    let stored: HashMap<&str, &Parameter> =
        existing.iter().map(|p| (p.id.as_str(), p)).collect();
    let mut out = ImportDiff::default();

    for param in incoming {
        match stored.get(param.id.as_str()) {
            None => out.added.push(param.id.clone()),
            Some(current) if *current == param => out.unchanged += 1,
            Some(_) => out.changed.push(param.id.clone()),
        }
    }

    let seen: HashSet<&str> = incoming.iter().map(|p| p.id.as_str()).collect();
    out.removed = existing
        .iter()
        .filter(|p| !seen.contains(p.id.as_str()))
        .map(|p| p.id.clone())
        .collect();
    out.added.sort();
    out.changed.sort();
    out.removed.sort();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::{citation, parameter};

    #[test]
    fn test_diff_reports_each_kind() {
        let existing = vec![
            parameter("KEEP", vec![]),
            parameter("EDIT", vec![]),
            parameter("GONE", vec![]),
        ];
        let mut edited = parameter("EDIT", vec![]);
        edited.value = "0.81".to_string();
        let incoming = vec![parameter("KEEP", vec![]), edited, parameter("NEW", vec![])];

        let d = diff(&existing, &incoming);
        assert_eq!(d.added, vec!["NEW"]);
        assert_eq!(d.changed, vec!["EDIT"]);
        assert_eq!(d.removed, vec!["GONE"]);
        assert_eq!(d.unchanged, 1);
        assert!(!d.is_empty());
        assert!(d.render().contains("  ~ EDIT"));
    }

    #[test]
    fn test_links_survive_reimport() {
        let mut stored = citation("c1", "PLFS 2023", Some("https://mospi.gov.in/plfs"));
        stored.document_id = Some("doc-1".to_string());
        let existing = parameter("P", vec![stored]);

        // Same URL under a different citation id still inherits the link.
        let relabelled = citation("P-1", "PLFS", Some("http://mospi.gov.in/plfs/"));
        let mut incoming = parameter("P", vec![relabelled]);
        keep_links(&existing, &mut incoming);
        assert_eq!(incoming.citations[0].document_id.as_deref(), Some("doc-1"));

        let unchanged = citation("c1", "PLFS 2023", Some("https://mospi.gov.in/plfs"));
        let mut same = parameter("P", vec![unchanged]);
        keep_links(&existing, &mut same);
        let d = diff(&[existing], &[same]);
        assert_eq!(d.unchanged, 1);
        assert!(d.is_empty());
    }
}
