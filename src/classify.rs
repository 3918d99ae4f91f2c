//! User-agent classification against a tiered signature table.
//!
//! Signatures are data: an ordered list of `(pattern, name, group, tier)` rows.
//! Rows are matched case-insensitively in tier order (AI agents before search
//! engines), the first match wins, and unmatched strings fall through to a
//! generic bot-token heuristic before landing in `Other`.

use crate::error::IngestError;
use lru::LruCache;
use once_cell::sync::Lazy;
use regex::{Regex, RegexSet, RegexSetBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentGroup {
    #[serde(rename = "AIAgent")]
    AiAgent,
    SearchEngine,
    GenericBot,
    Other,
    Unknown,
}

impl AgentGroup {
    pub const ALL: [AgentGroup; 5] = [
        AgentGroup::AiAgent,
        AgentGroup::SearchEngine,
        AgentGroup::GenericBot,
        AgentGroup::Other,
        AgentGroup::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AgentGroup::AiAgent => "AIAgent",
            AgentGroup::SearchEngine => "SearchEngine",
            AgentGroup::GenericBot => "GenericBot",
            AgentGroup::Other => "Other",
            AgentGroup::Unknown => "Unknown",
        }
    }

    pub fn is_bot(self) -> bool {
        matches!(self, AgentGroup::AiAgent | AgentGroup::SearchEngine | AgentGroup::GenericBot)
    }
}

impl fmt::Display for AgentGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Match priority. Lower tiers are tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    AiAgent,
    SearchEngine,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSignature {
    pub pattern: String,
    pub name: String,
    pub group: AgentGroup,
    pub tier: Tier,
}

impl AgentSignature {
    fn ai(pattern: &str, name: &str) -> Self {
        Self { pattern: pattern.into(), name: name.into(), group: AgentGroup::AiAgent, tier: Tier::AiAgent }
    }

    fn search(pattern: &str, name: &str) -> Self {
        Self { pattern: pattern.into(), name: name.into(), group: AgentGroup::SearchEngine, tier: Tier::SearchEngine }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignatureTable {
    rows: Vec<AgentSignature>,
}

impl SignatureTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let rows = vec![
            AgentSignature::ai(r"GPTBot", "GPTBot"),
            AgentSignature::ai(r"OAI-SearchBot", "OAI-SearchBot"),
            AgentSignature::ai(r"ChatGPT-User", "ChatGPT-User"),
            AgentSignature::ai(r"ClaudeBot", "ClaudeBot"),
            AgentSignature::ai(r"Claude-User", "Claude-User"),
            AgentSignature::ai(r"Claude-SearchBot", "Claude-SearchBot"),
            AgentSignature::ai(r"claude-web", "Claude-Web"),
            AgentSignature::ai(r"anthropic-ai", "anthropic-ai"),
            AgentSignature::ai(r"PerplexityBot", "PerplexityBot"),
            AgentSignature::ai(r"Perplexity-User", "Perplexity-User"),
            AgentSignature::ai(r"Google-Extended", "Google-Extended"),
            AgentSignature::ai(r"Applebot-Extended", "Applebot-Extended"),
            AgentSignature::ai(r"cohere-ai", "cohere-ai"),
            AgentSignature::ai(r"AI2Bot", "AI2Bot"),
            AgentSignature::ai(r"CCBot", "CCBot"),
            AgentSignature::ai(r"DuckAssistBot", "DuckAssistBot"),
            AgentSignature::ai(r"YouBot", "YouBot"),
            AgentSignature::ai(r"MistralAI-User", "MistralAI-User"),
            AgentSignature::ai(r"Bytespider", "Bytespider"),
            AgentSignature::ai(r"Amazonbot", "Amazonbot"),
            AgentSignature::ai(r"meta-externalagent", "Meta-ExternalAgent"),
            AgentSignature::ai(r"Diffbot", "Diffbot"),
            AgentSignature::ai(r"Timpibot", "Timpibot"),
            AgentSignature::search(r"Googlebot", "Googlebot"),
            AgentSignature::search(r"bingbot", "Bingbot"),
            AgentSignature::search(r"YandexBot", "YandexBot"),
            AgentSignature::search(r"DuckDuckBot", "DuckDuckBot"),
            AgentSignature::search(r"Baiduspider", "Baiduspider"),
            AgentSignature::search(r"Applebot", "Applebot"),
            AgentSignature::search(r"Yahoo! Slurp", "Yahoo Slurp"),
            AgentSignature::search(r"SeznamBot", "SeznamBot"),
            AgentSignature::search(r"PetalBot", "PetalBot"),
            AgentSignature::search(r"Sogou", "Sogou"),
            AgentSignature::search(r"AhrefsBot", "AhrefsBot"),
            AgentSignature::search(r"SemrushBot", "SemrushBot"),
            AgentSignature::search(r"MJ12bot", "MJ12bot"),
            AgentSignature::search(r"DotBot", "DotBot"),
        ];
        Self { rows }
    }

    /// Parse a JSON array of signature rows.
    pub fn rows_from_json(json: &str) -> Result<Vec<AgentSignature>, IngestError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load_json_file(path: &Path) -> Result<Vec<AgentSignature>, IngestError> {
        let text = std::fs::read_to_string(path)?;
        let rows = Self::rows_from_json(&text)?;
        tracing::debug!(path = %path.display(), rows = rows.len(), "loaded signature rows");
        Ok(rows)
    }

    /// Append rows; each lands at the end of its own tier.
    pub fn extend<I: IntoIterator<Item = AgentSignature>>(&mut self, rows: I) {
        self.rows.extend(rows);
    }

    pub fn rows(&self) -> &[AgentSignature] {
        &self.rows
    }

    fn into_ordered(mut self) -> Vec<AgentSignature> {
        // stable: insertion order is kept inside a tier
        self.rows.sort_by_key(|r| r.tier);
        self.rows
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification {
    pub canonical: String,
    pub group: AgentGroup,
}

impl Classification {
    fn unknown() -> Self {
        Self { canonical: "-".to_string(), group: AgentGroup::Unknown }
    }
}

static RE_GENERIC_BOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[A-Za-z0-9._\-]*(?:bot|spider|crawler|crawl|scraper|slurp)[A-Za-z0-9._\-]*").unwrap()
});

/// Drop control characters and collapse whitespace runs.
pub fn clean_user_agent(raw: &str) -> String {
    let printable: String = raw.chars().filter(|c| !c.is_control() || c.is_whitespace()).collect();
    printable.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct Classifier {
    rows: Vec<AgentSignature>,
    set: RegexSet,
    cache: Option<Mutex<LruCache<String, Classification>>>,
}

impl Classifier {
    pub fn new(table: SignatureTable, cache_capacity: usize) -> Result<Self, IngestError> {
        let rows = table.into_ordered();
        let set = compile(&rows)?;
        Ok(Self {
            rows,
            set,
            cache: NonZeroUsize::new(cache_capacity).map(|n| Mutex::new(LruCache::new(n))),
        })
    }

    /// The built-in table with the default cache size.
    pub fn builtin() -> Self {
        Self::new(SignatureTable::builtin(), crate::config::DEFAULT_CLASSIFIER_CACHE)
            .unwrap_or_else(|err| {
                tracing::error!(%err, "built-in signature table failed to compile; using heuristics only");
                Self { rows: Vec::new(), set: RegexSet::empty(), cache: None }
            })
    }

    pub fn signatures(&self) -> &[AgentSignature] {
        &self.rows
    }

    pub fn classify(&self, user_agent: &str) -> Classification {
        let cleaned = clean_user_agent(user_agent);
        if cleaned.is_empty() || cleaned == "-" {
            return Classification::unknown();
        }
        if let Some(cache) = &self.cache {
            if let Ok(mut c) = cache.lock() {
                if let Some(hit) = c.get(&cleaned) {
                    return hit.clone();
                }
            }
        }
        let result = self.match_cleaned(&cleaned);
        if let Some(cache) = &self.cache {
            if let Ok(mut c) = cache.lock() {
                c.put(cleaned, result.clone());
            }
        }
        result
    }

    fn match_cleaned(&self, cleaned: &str) -> Classification {
        // RegexSet reports every hit; the lowest index is the highest priority row.
        if let Some(idx) = self.set.matches(cleaned).iter().next() {
            if let Some(row) = self.rows.get(idx) {
                return Classification { canonical: row.name.clone(), group: row.group };
            }
        }
        if let Some(m) = RE_GENERIC_BOT.find(cleaned) {
            return Classification { canonical: m.as_str().to_string(), group: AgentGroup::GenericBot };
        }
        Classification { canonical: cleaned.to_string(), group: AgentGroup::Other }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::builtin()
    }
}

fn compile(rows: &[AgentSignature]) -> Result<RegexSet, IngestError> {
    for row in rows {
        if let Err(source) = Regex::new(&row.pattern) {
            return Err(IngestError::SignaturePattern { pattern: row.pattern.clone(), source });
        }
    }
    RegexSetBuilder::new(rows.iter().map(|r| r.pattern.as_str()))
        .case_insensitive(true)
        .build()
        .map_err(|source| IngestError::SignaturePattern { pattern: "<signature set>".to_string(), source })
}
