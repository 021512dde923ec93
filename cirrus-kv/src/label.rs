//! Per-resource label maps and the selector evaluator.
//!
//! Labels are persisted under `/label/<kind>/<uuid>` together with the
//! resource key they point back to, and mirrored into two in-memory reverse
//! indexes: `(kind, key) → set<uuid>` and `(kind, key, value) → set<uuid>`.
//! The indexes are rebuilt from the store at open, so a restart loses
//! nothing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{KvError, Result};
use crate::store::KvStore;

const LABEL_PREFIX: &str = "/label";

/// Persisted label record for one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelRecord {
    /// Key of the resource document in the KV store.
    pub resource_key: String,
    pub labels: HashMap<String, String>,
}

#[derive(Default)]
struct IndexState {
    /// (kind, uuid) → record
    entries: HashMap<(String, String), LabelRecord>,
    /// (kind, label key) → uuids
    by_key: HashMap<(String, String), HashSet<String>>,
    /// (kind, label key, label value) → uuids
    by_key_value: HashMap<(String, String, String), HashSet<String>>,
}

impl IndexState {
    fn unindex(&mut self, kind: &str, uuid: &str) {
        if let Some(record) = self.entries.remove(&(kind.to_string(), uuid.to_string())) {
            for (k, v) in &record.labels {
                if let Some(set) = self.by_key.get_mut(&(kind.to_string(), k.clone())) {
                    set.remove(uuid);
                }
                if let Some(set) =
                    self.by_key_value
                        .get_mut(&(kind.to_string(), k.clone(), v.clone()))
                {
                    set.remove(uuid);
                }
            }
        }
    }

    fn index(&mut self, kind: &str, uuid: &str, record: LabelRecord) {
        for (k, v) in &record.labels {
            self.by_key
                .entry((kind.to_string(), k.clone()))
                .or_default()
                .insert(uuid.to_string());
            self.by_key_value
                .entry((kind.to_string(), k.clone(), v.clone()))
                .or_default()
                .insert(uuid.to_string());
        }
        self.entries
            .insert((kind.to_string(), uuid.to_string()), record);
    }
}

/// Label index over the KV store.
#[derive(Clone)]
pub struct LabelIndex {
    store: KvStore,
    inner: Arc<RwLock<IndexState>>,
}

impl LabelIndex {
    /// Build the index, replaying every persisted `/label/...` record.
    pub async fn open(store: KvStore) -> Result<Self> {
        let mut state = IndexState::default();

        for entry in store.list(&format!("{}/", LABEL_PREFIX)).await? {
            // /label/<kind>/<uuid>
            let rest = entry.key.trim_start_matches(LABEL_PREFIX).trim_start_matches('/');
            let mut parts = rest.splitn(2, '/');
            let (kind, uuid) = match (parts.next(), parts.next()) {
                (Some(k), Some(u)) if !k.is_empty() && !u.is_empty() => (k, u),
                _ => continue,
            };
            let record: LabelRecord = serde_json::from_str(&entry.value)?;
            state.index(kind, uuid, record);
        }

        Ok(Self {
            store,
            inner: Arc::new(RwLock::new(state)),
        })
    }

    fn key_for(kind: &str, uuid: &str) -> String {
        format!("{}/{}/{}", LABEL_PREFIX, kind, uuid)
    }

    /// Replace the full label map for an entity and re-derive the reverse
    /// indexes.
    pub async fn put_labels(
        &self,
        kind: &str,
        uuid: &str,
        resource_key: &str,
        labels: HashMap<String, String>,
    ) -> Result<()> {
        let record = LabelRecord {
            resource_key: resource_key.to_string(),
            labels,
        };
        self.store
            .put(&Self::key_for(kind, uuid), &serde_json::to_string(&record)?)
            .await?;

        let mut state = self.inner.write().await;
        state.unindex(kind, uuid);
        state.index(kind, uuid, record);
        Ok(())
    }

    /// Fetch the label map for an entity.
    pub async fn get_labels(&self, kind: &str, uuid: &str) -> Option<HashMap<String, String>> {
        let state = self.inner.read().await;
        state
            .entries
            .get(&(kind.to_string(), uuid.to_string()))
            .map(|r| r.labels.clone())
    }

    /// Remove a single label key from an entity.
    pub async fn remove_label(&self, kind: &str, uuid: &str, label_key: &str) -> Result<bool> {
        let (resource_key, mut labels) = {
            let state = self.inner.read().await;
            match state.entries.get(&(kind.to_string(), uuid.to_string())) {
                Some(r) => (r.resource_key.clone(), r.labels.clone()),
                None => return Ok(false),
            }
        };

        if labels.remove(label_key).is_none() {
            return Ok(false);
        }
        self.put_labels(kind, uuid, &resource_key, labels).await?;
        Ok(true)
    }

    /// Drop an entity from the index entirely (resource deletion).
    pub async fn remove_entity(&self, kind: &str, uuid: &str) -> Result<()> {
        self.store.delete(&Self::key_for(kind, uuid)).await?;
        let mut state = self.inner.write().await;
        state.unindex(kind, uuid);
        Ok(())
    }

    /// Evaluate a selector against the current snapshot; returns the KV
    /// resource keys of matching entities, sorted for determinism.
    pub async fn select(&self, kind: &str, selector: &str) -> Result<Vec<String>> {
        let sel = Selector::parse(selector)?;
        let state = self.inner.read().await;

        let mut keys: Vec<String> = state
            .entries
            .iter()
            .filter(|((k, _), _)| k == kind)
            .filter(|(_, record)| sel.matches(&record.labels))
            .map(|(_, record)| record.resource_key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// One parsed selector clause.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Clause {
    Eq(String, String),
    Ne(String, String),
    In(String, Vec<String>),
    NotIn(String, Vec<String>),
    Exists(String),
    NotExists(String),
}

impl Clause {
    fn matches(&self, labels: &HashMap<String, String>) -> bool {
        match self {
            Clause::Eq(k, v) => labels.get(k) == Some(v),
            Clause::Ne(k, v) => labels.get(k) != Some(v),
            Clause::In(k, vs) => labels.get(k).is_some_and(|v| vs.contains(v)),
            Clause::NotIn(k, vs) => !labels.get(k).is_some_and(|v| vs.contains(v)),
            Clause::Exists(k) => labels.contains_key(k),
            Clause::NotExists(k) => !labels.contains_key(k),
        }
    }
}

/// A parsed label selector: a comma-joined AND of clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    clauses: Vec<Clause>,
}

impl Selector {
    /// Parse a selector such as `env=prod,tier in (api,db),!legacy`.
    pub fn parse(input: &str) -> Result<Self> {
        let mut clauses = Vec::new();
        for raw in split_clauses(input)? {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            clauses.push(parse_clause(raw)?);
        }
        Ok(Self { clauses })
    }

    /// True when every clause holds on the label map.
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        self.clauses.iter().all(|c| c.matches(labels))
    }
}

/// Split on commas that are not inside a `(...)` value set.
fn split_clauses(input: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut depth = 0u32;
    let mut current = String::new();

    for ch in input.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| KvError::SelectorParse("unbalanced ')'".into()))?;
                current.push(ch);
            }
            ',' if depth == 0 => {
                out.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    if depth != 0 {
        return Err(KvError::SelectorParse("unbalanced '('".into()));
    }
    out.push(current);
    Ok(out)
}

fn parse_clause(raw: &str) -> Result<Clause> {
    // Negated existence: `!k`
    if let Some(key) = raw.strip_prefix('!') {
        let key = key.trim();
        validate_key(key)?;
        return Ok(Clause::NotExists(key.to_string()));
    }

    // Set operators: `k in (a,b)` / `k notin (a,b)`
    if let Some((key, rest)) = split_word_op(raw, "notin") {
        return Ok(Clause::NotIn(key, parse_value_set(&rest)?));
    }
    if let Some((key, rest)) = split_word_op(raw, "in") {
        return Ok(Clause::In(key, parse_value_set(&rest)?));
    }

    // Existence words: `k exists` / `k !exists`
    if let Some(key) = raw.strip_suffix("!exists") {
        let key = key.trim();
        validate_key(key)?;
        return Ok(Clause::NotExists(key.to_string()));
    }
    if let Some(key) = raw.strip_suffix("exists") {
        let key = key.trim();
        if !key.is_empty() {
            validate_key(key)?;
            return Ok(Clause::Exists(key.to_string()));
        }
        // fall through: the key itself is literally "exists"
    }

    // Equality: `k!=v`, `k==v`, `k=v`
    if let Some((k, v)) = raw.split_once("!=") {
        let (k, v) = (k.trim(), v.trim());
        validate_key(k)?;
        return Ok(Clause::Ne(k.to_string(), v.to_string()));
    }
    if let Some((k, v)) = raw.split_once("==") {
        let (k, v) = (k.trim(), v.trim());
        validate_key(k)?;
        return Ok(Clause::Eq(k.to_string(), v.to_string()));
    }
    if let Some((k, v)) = raw.split_once('=') {
        let (k, v) = (k.trim(), v.trim());
        validate_key(k)?;
        return Ok(Clause::Eq(k.to_string(), v.to_string()));
    }

    // Bare key: existence.
    validate_key(raw)?;
    Ok(Clause::Exists(raw.to_string()))
}

/// Split `key <op> rest` where `<op>` is a standalone word.
fn split_word_op(raw: &str, op: &str) -> Option<(String, String)> {
    let idx = raw.find(&format!(" {} ", op))?;
    let key = raw[..idx].trim();
    let rest = raw[idx + op.len() + 2..].trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), rest.to_string()))
}

fn parse_value_set(rest: &str) -> Result<Vec<String>> {
    let inner = rest
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .ok_or_else(|| KvError::SelectorParse(format!("expected '(v1,v2,...)', got '{}'", rest)))?;
    Ok(inner
        .split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect())
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(KvError::SelectorParse("empty label key".into()));
    }
    if key
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')))
    {
        return Err(KvError::SelectorParse(format!(
            "invalid label key '{}'",
            key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    async fn index() -> LabelIndex {
        let store = KvStore::open_in_memory().await.unwrap();
        LabelIndex::open(store).await.unwrap()
    }

    #[test]
    fn test_parse_equality_forms() {
        let sel = Selector::parse("env=prod").unwrap();
        assert!(sel.matches(&labels(&[("env", "prod")])));
        assert!(!sel.matches(&labels(&[("env", "dev")])));
        assert!(!sel.matches(&labels(&[])));

        let sel = Selector::parse("env==prod").unwrap();
        assert!(sel.matches(&labels(&[("env", "prod")])));

        let sel = Selector::parse("env!=prod").unwrap();
        assert!(sel.matches(&labels(&[("env", "dev")])));
        // Absent key satisfies !=.
        assert!(sel.matches(&labels(&[])));
        assert!(!sel.matches(&labels(&[("env", "prod")])));
    }

    #[test]
    fn test_parse_set_forms() {
        let sel = Selector::parse("tier in (api,db)").unwrap();
        assert!(sel.matches(&labels(&[("tier", "api")])));
        assert!(sel.matches(&labels(&[("tier", "db")])));
        assert!(!sel.matches(&labels(&[("tier", "cache")])));
        assert!(!sel.matches(&labels(&[])));

        let sel = Selector::parse("tier notin (api,db)").unwrap();
        assert!(sel.matches(&labels(&[("tier", "cache")])));
        // Absent key satisfies notin.
        assert!(sel.matches(&labels(&[])));
        assert!(!sel.matches(&labels(&[("tier", "api")])));
    }

    #[test]
    fn test_parse_existence_forms() {
        for raw in ["tier", "tier exists"] {
            let sel = Selector::parse(raw).unwrap();
            assert!(sel.matches(&labels(&[("tier", "api")])), "{}", raw);
            assert!(!sel.matches(&labels(&[])), "{}", raw);
        }
        for raw in ["!tier", "tier !exists"] {
            let sel = Selector::parse(raw).unwrap();
            assert!(sel.matches(&labels(&[])), "{}", raw);
            assert!(!sel.matches(&labels(&[("tier", "api")])), "{}", raw);
        }
    }

    #[test]
    fn test_clauses_combine_with_and() {
        let sel = Selector::parse("env=prod,tier in (api,db)").unwrap();
        assert!(sel.matches(&labels(&[("env", "prod"), ("tier", "api")])));
        assert!(!sel.matches(&labels(&[("env", "prod")])));
        assert!(!sel.matches(&labels(&[("env", "dev"), ("tier", "api")])));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Selector::parse("tier in (api").is_err());
        assert!(Selector::parse("tier in api)").is_err());
        assert!(Selector::parse("ti~er=prod").is_err());
        assert!(Selector::parse("=prod").is_err());
    }

    #[tokio::test]
    async fn test_put_get_labels_roundtrip() {
        let idx = index().await;
        let m = labels(&[("env", "prod"), ("tier", "api")]);
        idx.put_labels("vNet", "u1", "/ns/default/resources/vNet/v1", m.clone())
            .await
            .unwrap();

        assert_eq!(idx.get_labels("vNet", "u1").await, Some(m));
        assert_eq!(idx.get_labels("vNet", "u2").await, None);
    }

    #[tokio::test]
    async fn test_put_labels_replaces_map() {
        let idx = index().await;
        idx.put_labels("vm", "u1", "/k1", labels(&[("a", "1"), ("b", "2")]))
            .await
            .unwrap();
        idx.put_labels("vm", "u1", "/k1", labels(&[("b", "3")]))
            .await
            .unwrap();

        // Old keys are gone from the reverse index.
        assert!(idx.select("vm", "a").await.unwrap().is_empty());
        assert_eq!(idx.select("vm", "b=3").await.unwrap(), vec!["/k1"]);
    }

    #[tokio::test]
    async fn test_remove_label_removes_only_that_key() {
        let idx = index().await;
        idx.put_labels("vm", "u1", "/k1", labels(&[("a", "1"), ("b", "2")]))
            .await
            .unwrap();

        assert!(idx.remove_label("vm", "u1", "a").await.unwrap());
        assert_eq!(
            idx.get_labels("vm", "u1").await,
            Some(labels(&[("b", "2")]))
        );
        // Unknown key reports false.
        assert!(!idx.remove_label("vm", "u1", "zz").await.unwrap());
    }

    #[tokio::test]
    async fn test_select_scenarios() {
        let idx = index().await;
        idx.put_labels("vm", "e1", "/e1", labels(&[("env", "prod"), ("tier", "api")]))
            .await
            .unwrap();
        idx.put_labels("vm", "e2", "/e2", labels(&[("env", "prod"), ("tier", "db")]))
            .await
            .unwrap();
        idx.put_labels("vm", "e3", "/e3", labels(&[("env", "dev")]))
            .await
            .unwrap();

        assert_eq!(
            idx.select("vm", "env=prod,tier in (api,db)").await.unwrap(),
            vec!["/e1", "/e2"]
        );
        assert!(idx
            .select("vm", "env!=prod,tier exists")
            .await
            .unwrap()
            .is_empty());
        assert_eq!(idx.select("vm", "!tier").await.unwrap(), vec!["/e3"]);
        // Kind is part of the index key.
        assert!(idx.select("vNet", "env=prod").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_index_rebuilds_from_store() {
        let store = KvStore::open_in_memory().await.unwrap();
        {
            let idx = LabelIndex::open(store.clone()).await.unwrap();
            idx.put_labels("vm", "u1", "/k1", labels(&[("env", "prod")]))
                .await
                .unwrap();
        }

        // A fresh index over the same store sees the persisted labels.
        let idx = LabelIndex::open(store).await.unwrap();
        assert_eq!(idx.select("vm", "env=prod").await.unwrap(), vec!["/k1"]);
    }

    #[tokio::test]
    async fn test_remove_entity() {
        let idx = index().await;
        idx.put_labels("vm", "u1", "/k1", labels(&[("env", "prod")]))
            .await
            .unwrap();
        idx.remove_entity("vm", "u1").await.unwrap();

        assert_eq!(idx.get_labels("vm", "u1").await, None);
        assert!(idx.select("vm", "env=prod").await.unwrap().is_empty());
    }
}
