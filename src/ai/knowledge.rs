//! File-backed knowledge base and keyword scoring.

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Added on top of the length score when a keyword matches as a whole word.
pub const WHOLE_WORD_BONUS: usize = 5;

/// Categories answered directly in chat instead of collecting ticket details.
pub const INFORMATIONAL_CATEGORIES: &[&str] = &["account", "billing", "general", "chat"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Keywords {
    List(Vec<String>),
    Csv(String),
}

impl Keywords {
    /// Lowercased, trimmed, non-empty keyword terms.
    pub fn terms(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Self::List(items) => items.iter().map(String::as_str).collect(),
            Self::Csv(text) => text.split(',').collect(),
        };
        raw.into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect()
    }
}

fn default_category() -> String {
    "general".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub keywords: Keywords,
    pub answer: String,
    #[serde(default = "default_category")]
    pub category: String,
}

impl KnowledgeEntry {
    pub fn is_informational(&self) -> bool {
        INFORMATIONAL_CATEGORIES.contains(&self.category.to_lowercase().as_str())
    }
}

/// Scores an entry against an already lowercased query.
pub fn score(entry: &KnowledgeEntry, query_lower: &str) -> usize {
    let padded_query = format!(" {query_lower} ");
    entry
        .keywords
        .terms()
        .iter()
        .filter(|keyword| query_lower.contains(keyword.as_str()))
        .map(|keyword| {
            let mut points = keyword.chars().count() * 2;
            if padded_query.contains(&format!(" {keyword} ")) {
                points += WHOLE_WORD_BONUS;
            }
            points
        })
        .sum()
}

#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeMatch {
    pub entry: KnowledgeEntry,
    pub score: usize,
}

#[derive(Debug, Default)]
pub struct KnowledgeBase {
    path: PathBuf,
    entries: Vec<KnowledgeEntry>,
}

impl KnowledgeBase {
    /// Loads entries from `path`; a missing or malformed file yields an empty base.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_entries(&path) {
            Ok(entries) => {
                info!("Loaded {} knowledge base entries from {}", entries.len(), path.display());
                entries
            }
            Err(e) => {
                warn!("Knowledge base unavailable ({}): {e:#}", path.display());
                Vec::new()
            }
        };
        Self { path, entries }
    }

    pub fn from_entries(path: impl Into<PathBuf>, entries: Vec<KnowledgeEntry>) -> Self {
        Self {
            path: path.into(),
            entries,
        }
    }

    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest scoring entry; the earliest entry wins ties. `None` when nothing scores.
    pub fn best_match(&self, query: &str) -> Option<KnowledgeMatch> {
        let query_lower = query.to_lowercase();
        let mut best: Option<(usize, &KnowledgeEntry)> = None;
        for entry in &self.entries {
            let s = score(entry, &query_lower);
            if s > best.map_or(0, |(top, _)| top) {
                best = Some((s, entry));
            }
        }
        best.map(|(score, entry)| KnowledgeMatch {
            entry: entry.clone(),
            score,
        })
    }

    /// Appends an entry and persists the file. Returns the new entry's index.
    pub fn add(&mut self, entry: KnowledgeEntry) -> Result<usize> {
        self.entries.push(entry);
        if let Err(e) = self.save() {
            self.entries.pop();
            return Err(e);
        }
        Ok(self.entries.len() - 1)
    }

    pub fn remove(&mut self, index: usize) -> Result<Option<KnowledgeEntry>> {
        if index >= self.entries.len() {
            return Ok(None);
        }
        let removed = self.entries.remove(index);
        if let Err(e) = self.save() {
            self.entries.insert(index, removed);
            return Err(e);
        }
        Ok(Some(removed))
    }

    /// Re-reads the backing file, returning the new entry count.
    /// An unreadable or malformed file is an error and the current entries stay live.
    pub fn reload(&mut self) -> Result<usize> {
        self.entries = read_entries(&self.path)?;
        info!("Reloaded {} knowledge base entries from {}", self.entries.len(), self.path.display());
        Ok(self.entries.len())
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<Vec<KnowledgeEntry>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let entries = serde_json::from_str(&raw).context("parsing knowledge base JSON")?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(keywords: Keywords, category: &str) -> KnowledgeEntry {
        KnowledgeEntry {
            id: None,
            keywords,
            answer: format!("{category} answer"),
            category: category.to_string(),
        }
    }

    fn list(items: &[&str]) -> Keywords {
        Keywords::List(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_keyword_terms_from_csv() {
        let kw = Keywords::Csv(" VPN, remote access ,,".into());
        assert_eq!(kw.terms(), vec!["vpn", "remote access"]);
    }

    #[test]
    fn test_score_length_and_word_bonus() {
        let e = entry(list(&["login"]), "account");
        // substring plus whole word: 5*2 + 5
        assert_eq!(score(&e, "i cannot login today"), 15);
        // substring only
        assert_eq!(score(&e, "relogin failed"), 10);
        assert_eq!(score(&e, "printer jam"), 0);
    }

    #[test]
    fn test_score_is_case_insensitive_on_keywords() {
        let e = entry(list(&["API Key"]), "technical");
        assert_eq!(score(&e, "where is my api key"), 7 * 2 + WHOLE_WORD_BONUS);
    }

    #[test]
    fn test_best_match_prefers_longer_keywords() {
        let kb = KnowledgeBase::from_entries(
            "unused.json",
            vec![
                entry(list(&["password"]), "account"),
                entry(list(&["forgot password"]), "account"),
            ],
        );
        let m = kb.best_match("I forgot password again").unwrap();
        assert_eq!(m.entry.keywords, list(&["forgot password"]));
    }

    #[test]
    fn test_best_match_first_wins_ties() {
        let kb = KnowledgeBase::from_entries(
            "unused.json",
            vec![entry(list(&["printer"]), "general"), entry(list(&["printer"]), "technical")],
        );
        assert_eq!(kb.best_match("printer").unwrap().entry.category, "general");
        assert!(kb.best_match("nothing relevant").is_none());
    }

    #[test]
    fn test_informational_categories() {
        assert!(entry(list(&["hi"]), "chat").is_informational());
        assert!(entry(list(&["hi"]), "Billing").is_informational());
        assert!(!entry(list(&["hi"]), "technical").is_informational());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let kb = KnowledgeBase::load(dir.path().join("absent.json"));
        assert!(kb.is_empty());
    }

    #[test]
    fn test_load_accepts_mixed_keyword_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(
            &path,
            r#"[
                {"keywords": ["hello", "hi"], "answer": "Hello!", "category": "chat"},
                {"id": 101, "keywords": "vpn, tunnel", "answer": "Reconnect."}
            ]"#,
        )
        .unwrap();

        let kb = KnowledgeBase::load(&path);
        assert_eq!(kb.len(), 2);
        assert_eq!(kb.entries()[1].category, "general");
        assert_eq!(kb.entries()[1].id, Some(101));
        assert_eq!(kb.best_match("vpn is flaky").unwrap().entry.answer, "Reconnect.");
    }

    #[test]
    fn test_add_remove_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        let mut kb = KnowledgeBase::load(&path);

        let idx = kb.add(entry(list(&["printer"]), "general")).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(KnowledgeBase::load(&path).len(), 1);

        assert!(kb.remove(5).unwrap().is_none());
        let removed = kb.remove(0).unwrap().unwrap();
        assert_eq!(removed.category, "general");
        assert_eq!(kb.reload().unwrap(), 0);
    }

    #[test]
    fn test_reload_of_malformed_file_keeps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        let mut kb = KnowledgeBase::load(&path);
        kb.add(entry(list(&["printer"]), "general")).unwrap();
        kb.add(entry(list(&["vpn"]), "technical")).unwrap();
        kb.add(entry(list(&["invoice"]), "billing")).unwrap();

        std::fs::write(&path, r#"[{"keywords": ["printer"], "answer": "x",},]"#).unwrap();
        assert!(kb.reload().is_err());
        assert_eq!(kb.len(), 3);

        kb.add(entry(list(&["wifi"]), "technical")).unwrap();
        assert_eq!(KnowledgeBase::load(&path).len(), 4);
    }
}
