use dagstore_core::{Change, Commit, Delta, Error, MetadataValue, Predecessors, Result, Value, ValueRef};
use dagstore_history::History;
use dagstore_index::VersionedIndex;
use dagstore_zone::Zone;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

fn value_key(value_id: &str) -> String {
    format!("values/{value_id}")
}

/// A single author-intended change, scoped to the logical key it applies
/// to. The unit of work [`CommitEngine::commit`] accepts.
#[derive(Debug, Clone)]
pub struct KeyedChange {
    /// The logical key this change applies to.
    pub key: String,
    /// What changed.
    pub change: Change,
}

impl KeyedChange {
    /// A plain insert of a new value under `key`.
    pub fn insert(key: impl Into<String>, value: Value) -> Self {
        KeyedChange { key: key.into(), change: Change::Insert(value) }
    }

    /// A plain update of the value under `key`.
    pub fn update(key: impl Into<String>, value: Value) -> Self {
        KeyedChange { key: key.into(), change: Change::Update(value) }
    }

    /// A plain removal of the value under `key`.
    pub fn remove(key: impl Into<String>, value_id: impl Into<String>) -> Self {
        KeyedChange { key: key.into(), change: Change::Remove { value_id: value_id.into() } }
    }
}

/// Creates commits and reconstructs the changes any existing commit made,
/// coordinating the zone, history, and index.
pub struct CommitEngine {
    zone: Arc<dyn Zone>,
    history: Arc<History>,
    index: Arc<VersionedIndex>,
}

impl CommitEngine {
    /// Build an engine over shared zone/history/index handles.
    pub fn new(zone: Arc<dyn Zone>, history: Arc<History>, index: Arc<VersionedIndex>) -> Self {
        CommitEngine { zone, history, index }
    }

    fn load_value(&self, r: &ValueRef) -> Result<Value> {
        let bytes = self
            .zone
            .get(&value_key(&r.value_id), &r.stored_commit_id)?
            .ok_or_else(|| {
                Error::Internal(format!("value {} missing at commit {}", r.value_id, r.stored_commit_id))
            })?;
        Ok(Value::new(r.value_id.clone(), bytes))
    }

    /// Create and persist a new commit (spec §4.E.1):
    /// 1. allocate an id
    /// 2. validate `changes` and `predecessors`
    /// 3. write every inserted/updated payload to the zone
    /// 4. build the per-key delta list
    /// 5. apply the deltas to the index
    /// 6. build the commit record
    /// 7. register the commit in history last, so a crash between steps
    ///    3-6 never leaves a commit visible with a half-built index
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty key, or
    /// [`Error::MissingPredecessor`] if a named predecessor is unknown.
    pub fn commit(
        &self,
        predecessors: Option<Predecessors>,
        changes: Vec<KeyedChange>,
        metadata: Option<HashMap<String, MetadataValue>>,
    ) -> Result<Commit> {
        for kc in &changes {
            if kc.key.is_empty() {
                return Err(Error::InvalidInput("change key must not be empty".into()));
            }
        }

        if let Some(p) = &predecessors {
            if !self.history.contains(p.first()) {
                return Err(Error::MissingPredecessor(p.first().to_string()));
            }
            if let Some(second) = p.second() {
                if !self.history.contains(second) {
                    return Err(Error::MissingPredecessor(second.to_string()));
                }
            }
        }

        let id = Commit::new_id();
        let base_commit_id = predecessors.as_ref().map(|p| p.first().to_string());

        let mut value_data_size = 0i64;
        for kc in &changes {
            if let Some(v) = kc.change.value() {
                value_data_size += v.payload.len() as i64;
                self.zone.store(&value_key(&v.value_id), &id, &v.payload)?;
            }
        }

        let deltas: Vec<Delta> = changes
            .iter()
            .map(|kc| match &kc.change {
                Change::Insert(v) | Change::Update(v) => {
                    Delta::add(kc.key.clone(), ValueRef::new(v.value_id.clone(), id.clone()))
                }
                Change::Remove { value_id } => Delta::remove(kc.key.clone(), value_id.clone()),
                Change::Preserve(r) => Delta::add(kc.key.clone(), r.clone()),
                Change::PreserveRemoval { value_id } => Delta::remove(kc.key.clone(), value_id.clone()),
            })
            .collect();

        self.index.add_commit(&id, base_commit_id.as_deref(), &deltas)?;

        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64();

        let mut commit = match predecessors {
            None => Commit::root(id.clone(), timestamp),
            Some(p) => Commit::with_predecessors(id.clone(), p, timestamp),
        };
        commit.value_data_size = Some(value_data_size);
        commit.metadata = metadata;

        self.history.add(commit.clone())?;
        tracing::debug!(commit_id = %commit.identifier, changes = commit.value_data_size.unwrap_or(0), "committed");
        Ok(commit)
    }

    /// Reconstruct the changes `commit_id` made, by diffing its index
    /// state against its first parent's (spec §4.E.2). A root commit is
    /// diffed against an empty index, so every one of its entries comes
    /// back as an `Insert`.
    ///
    /// Whether a removal reconstructs as `Remove` or `PreserveRemoval`,
    /// and whether a surviving entry reconstructs as `Insert`/`Update` or
    /// `Preserve`, follows from the commit's own structure: a merge
    /// commit's first parent is the base its index was edited in place
    /// from, so any entry whose ref was not actually written under this
    /// commit's own id must have been carried forward from the second
    /// parent.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit, its parent's index, or a
    /// referenced value payload is missing.
    pub fn changes_made_at(&self, commit_id: &str) -> Result<Vec<KeyedChange>> {
        let commit = self.history.version(commit_id)?;
        let base_id = commit.predecessors.as_ref().map(|p| p.first().to_string());

        let base_map: HashMap<String, ValueRef> = match &base_id {
            Some(base) => self.index.enumerate(base)?.into_iter().collect(),
            None => HashMap::new(),
        };
        let own_map: HashMap<String, ValueRef> = self.index.enumerate(commit_id)?.into_iter().collect();

        let mut keys: Vec<&String> = base_map.keys().chain(own_map.keys()).collect();
        keys.sort();
        keys.dedup();

        let mut out = Vec::new();
        for key in keys {
            let before = base_map.get(key);
            let after = own_map.get(key);
            if before == after {
                continue;
            }
            let change = match after {
                None => {
                    let value_id = before.expect("key missing from both maps would have matched above").value_id.clone();
                    if commit.is_merge() {
                        Change::PreserveRemoval { value_id }
                    } else {
                        Change::Remove { value_id }
                    }
                }
                Some(r) if r.stored_commit_id == commit.identifier => {
                    let value = self.load_value(r)?;
                    if before.is_none() {
                        Change::Insert(value)
                    } else {
                        Change::Update(value)
                    }
                }
                Some(r) => Change::Preserve(r.clone()),
            };
            out.push(KeyedChange { key: key.clone(), change });
        }
        Ok(out)
    }
}
