//! Merge rules shared by every interaction set.
//!
//! Rows are the same row when their ids match. Optimistic placeholders get
//! a `local-` id and are either promoted to the authoritative row or dropped,
//! whichever order the write completion and the realtime event arrive in.
//! Rows are kept in arrival order and never re-sorted.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::models::{Comment, Like};

const LOCAL_PREFIX: &str = "local-";

pub fn local_id() -> String {
    format!("{}{}", LOCAL_PREFIX, Uuid::new_v4())
}

pub fn is_local(id: &str) -> bool {
    id.starts_with(LOCAL_PREFIX)
}

pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for Like {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Comment {
    fn key(&self) -> &str {
        &self.id
    }
}

/// What an optimistic mutation changed, so it can be undone exactly.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot<T> {
    /// A placeholder with this local id was added.
    Added(String),
    /// These rows were removed.
    Removed(Vec<T>),
}

impl<T: Keyed> Snapshot<T> {
    pub fn removed_ids(&self) -> Vec<String> {
        match self {
            Snapshot::Added(_) => vec![],
            Snapshot::Removed(rows) => rows.iter().map(|r| r.key().to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RowSet<T> {
    rows: Vec<T>,
    // local id -> row that replaced the placeholder
    promoted: HashMap<String, T>,
    // placeholders whose insert failed
    dead: HashSet<String>,
}

impl<T> Default for RowSet<T> {
    fn default() -> Self {
        Self { rows: Vec::new(), promoted: HashMap::new(), dead: HashSet::new() }
    }
}

impl<T: Keyed + Clone> RowSet<T> {
    pub fn from_rows(rows: impl IntoIterator<Item = T>) -> Self {
        let mut set = Self::default();
        for row in rows {
            set.insert(row);
        }
        set
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows the backend has confirmed.
    pub fn remote_len(&self) -> usize {
        self.rows.iter().filter(|r| !is_local(r.key())).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.rows.iter()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.iter().any(|r| r.key() == id)
    }

    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<&T> {
        self.rows.iter().find(|r| pred(r))
    }

    /// Idempotent add. Returns false when a row with that id is present.
    pub fn insert(&mut self, row: T) -> bool {
        if self.contains(row.key()) {
            return false;
        }
        self.rows.push(row);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        let index = self.rows.iter().position(|r| r.key() == id)?;
        Some(self.rows.remove(index))
    }

    pub fn remove_where(&mut self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        let (removed, kept): (Vec<T>, Vec<T>) = self.rows.drain(..).partition(|r| pred(r));
        self.rows = kept;
        removed
    }

    /// Promotes the placeholder `local` to `row`. The placeholder stays in
    /// its position. If the authoritative row is already present, or the
    /// placeholder is gone, nothing is added.
    pub fn promote(&mut self, local: &str, row: T) -> bool {
        self.promoted.insert(local.to_string(), row.clone());
        let Some(index) = self.rows.iter().position(|r| r.key() == local) else {
            return false;
        };
        if self.contains(row.key()) {
            self.rows.remove(index);
        } else {
            self.rows[index] = row;
        }
        true
    }

    /// The row a placeholder was promoted to, if any.
    pub fn resolve(&self, row: T) -> T {
        match self.promoted.get(row.key()) {
            Some(promoted) if is_local(row.key()) => promoted.clone(),
            _ => row,
        }
    }

    pub fn rollback(&mut self, snapshot: Snapshot<T>) {
        match snapshot {
            Snapshot::Added(local) => {
                self.remove(&local);
                self.dead.insert(local);
            }
            Snapshot::Removed(rows) => {
                for row in rows {
                    let row = self.resolve(row);
                    if self.dead.contains(row.key()) {
                        continue;
                    }
                    self.insert(row);
                }
            }
        }
    }

    /// Drops every row. Promotions and failed placeholders are remembered.
    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Unpromoted placeholders.
    pub fn locals(&self) -> Vec<T> {
        self.rows
            .iter()
            .filter(|r| is_local(r.key()) && !self.promoted.contains_key(r.key()) && !self.dead.contains(r.key()))
            .cloned()
            .collect()
    }

    /// Replaces the confirmed rows with a fresh baseline, skipping ids in
    /// `excluded`. Placeholders are kept after the baseline rows.
    pub fn reset_remote(&mut self, fetched: impl IntoIterator<Item = T>, excluded: &HashSet<String>) {
        let locals: Vec<T> = self.rows.iter().filter(|r| is_local(r.key())).cloned().collect();
        self.rows.clear();
        for row in fetched {
            if !excluded.contains(row.key()) {
                self.insert(row);
            }
        }
        for row in locals {
            self.insert(row);
        }
    }
}
