use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::bail;

use crate::artifact::Artifact;

/// Newest-first record of every artifact a session produced.
///
/// Batches are prepended as contiguous blocks in their produced order; existing
/// entries are never reordered or removed. Parent links may only point at
/// artifacts that were already present before the batch arrived, so lineage is
/// always a forest.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: VecDeque<Artifact>,
    /// id -> insertion ordinal. Entries are only ever pushed to the front, so
    /// ordinal `n` lives at position `len - 1 - n`.
    index: HashMap<String, usize>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepends `batch` ahead of existing entries. Rejects the whole batch,
    /// leaving history untouched, on a duplicate id or a dangling parent.
    pub fn append(&mut self, batch: Vec<Artifact>) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for artifact in &batch {
            if self.contains(artifact.id()) || !seen.insert(artifact.id()) {
                bail!("artifact {} is already recorded", artifact.id());
            }
            if let Some(parent) = artifact.parent_id() {
                if !self.contains(parent) {
                    bail!(
                        "artifact {} references unknown parent {parent}",
                        artifact.id()
                    );
                }
            }
        }

        for artifact in batch.into_iter().rev() {
            self.index
                .insert(artifact.id().to_string(), self.entries.len());
            self.entries.push_front(artifact);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.entries.iter()
    }

    pub fn newest(&self) -> Option<&Artifact> {
        self.entries.front()
    }

    pub fn get(&self, id: &str) -> Option<&Artifact> {
        let ordinal = *self.index.get(id)?;
        self.entries.get(self.entries.len() - 1 - ordinal)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn parent_of(&self, id: &str) -> Option<&Artifact> {
        let parent = self.get(id)?.parent_id()?;
        self.get(parent)
    }

    pub fn children_of(&self, id: &str) -> Vec<&Artifact> {
        self.entries
            .iter()
            .filter(|artifact| artifact.parent_id() == Some(id))
            .collect()
    }

    /// Ancestors of `id`, nearest first. Empty for unknown ids and roots.
    pub fn lineage(&self, id: &str) -> Vec<&Artifact> {
        let mut chain = Vec::new();
        let mut cursor = self.parent_of(id);
        while let Some(artifact) = cursor {
            chain.push(artifact);
            cursor = artifact.parent_id().and_then(|parent| self.get(parent));
        }
        chain
    }

    pub fn roots(&self) -> Vec<&Artifact> {
        self.entries
            .iter()
            .filter(|artifact| !artifact.is_remix())
            .collect()
    }

    pub fn remix_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|artifact| artifact.is_remix())
            .count()
    }
}
