//! Sequence-numbered events with forward and reverse dependency edges.
//!
//! An event may declare that its address or value was computed from earlier
//! events (an indexed read whose index came from another read, a slice whose
//! bounds were loaded from memory). The registry stores both directions of
//! every such edge so the trace's dependency DAG can be walked either way.

use std::io::Write;

use smallvec::SmallVec;

use crate::{
    error::{Result, TraceError},
    event::EventId,
};

pub type EdgeList = SmallVec<[EventId; 4]>;

/// Dependency edges of one registered event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyEntry {
    pub id: EventId,
    pub deps_on: EdgeList,
    pub out_edges: EdgeList,
}

#[derive(Debug, Default)]
pub struct EventRegistry {
    entries: Vec<DependencyEntry>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the next registered event will receive.
    pub fn next_id(&self) -> EventId {
        EventId(self.entries.len() as u64)
    }

    /// Id of the most recently registered event.
    pub fn last(&self) -> Option<EventId> {
        self.entries.last().map(|entry| entry.id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks that every id in `deps` names an already registered event.
    pub fn validate(&self, deps: &[EventId]) -> Result<()> {
        let next = self.next_id();
        match deps.iter().find(|dep| **dep >= next) {
            Some(&dep) => Err(TraceError::UnknownDependency { dep, next }),
            None => Ok(()),
        }
    }

    /// Registers a new event depending on `deps` and returns its id.
    ///
    /// Duplicate dependencies are collapsed. Each dependency gains the new id
    /// in its `out_edges`.
    pub fn register(&mut self, deps: &[EventId]) -> Result<EventId> {
        self.validate(deps)?;
        let mut deps_on: EdgeList = deps.iter().copied().collect();
        deps_on.sort_unstable();
        deps_on.dedup();
        Ok(self.append(deps_on))
    }

    /// Registers a new event with no dependencies.
    pub fn register_independent(&mut self) -> EventId {
        self.append(EdgeList::new())
    }

    fn append(&mut self, deps_on: EdgeList) -> EventId {
        let id = self.next_id();
        for dep in &deps_on {
            self.entries[dep.0 as usize].out_edges.push(id);
        }
        self.entries.push(DependencyEntry {
            id,
            deps_on,
            out_edges: EdgeList::new(),
        });
        id
    }

    /// Adds a dependency of `event` on the older event `dep` after the fact.
    pub fn add_dependency(&mut self, event: EventId, dep: EventId) -> Result<()> {
        if event >= self.next_id() || dep >= event {
            return Err(TraceError::UnknownDependency { dep, next: event });
        }
        let entry = &mut self.entries[event.0 as usize];
        if entry.deps_on.contains(&dep) {
            return Ok(());
        }
        entry.deps_on.push(dep);
        entry.deps_on.sort_unstable();
        self.entries[dep.0 as usize].out_edges.push(event);
        Ok(())
    }

    pub fn entry(&self, id: EventId) -> Option<&DependencyEntry> {
        self.entries.get(id.0 as usize)
    }

    pub fn deps_on(&self, id: EventId) -> &[EventId] {
        self.entry(id).map_or(&[][..], |entry| entry.deps_on.as_slice())
    }

    pub fn out_edges(&self, id: EventId) -> &[EventId] {
        self.entry(id).map_or(&[][..], |entry| entry.out_edges.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &DependencyEntry> {
        self.entries.iter()
    }

    /// Every event `id` transitively depends on, in ascending order.
    pub fn ancestors(&self, id: EventId) -> Vec<EventId> {
        let mut seen = vec![false; self.entries.len()];
        let mut stack: Vec<EventId> = self.deps_on(id).to_vec();
        let mut out = Vec::new();
        while let Some(dep) = stack.pop() {
            if std::mem::replace(&mut seen[dep.0 as usize], true) {
                continue;
            }
            out.push(dep);
            stack.extend_from_slice(self.deps_on(dep));
        }
        out.sort_unstable();
        out
    }

    /// Writes one `sequence_id [deps_on] [out_edges]` line per event.
    pub fn export(&self, sink: &mut impl Write) -> Result<()> {
        for entry in &self.entries {
            writeln!(
                sink,
                "{} [{}] [{}]",
                entry.id,
                join(&entry.deps_on),
                join(&entry.out_edges)
            )?;
        }
        Ok(())
    }
}

fn join(ids: &[EventId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_edges_mirror_dependencies() {
        let mut registry = EventRegistry::new();
        let a = registry.register(&[]).unwrap();
        let b = registry.register(&[a]).unwrap();
        let c = registry.register(&[a, b, a]).unwrap();

        assert_eq!(registry.out_edges(a), &[b, c]);
        assert_eq!(registry.out_edges(b), &[c]);
        assert_eq!(registry.deps_on(c), &[a, b]);
        assert_eq!(registry.ancestors(c), vec![a, b]);
    }

    #[test]
    fn test_rejects_future_dependency() {
        let mut registry = EventRegistry::new();
        let a = registry.register(&[]).unwrap();
        let result = registry.register(&[EventId(a.0 + 1)]);
        assert!(matches!(
            result,
            Err(TraceError::UnknownDependency { dep, next }) if dep == EventId(1) && next == EventId(1)
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_add_dependency_after_registration() {
        let mut registry = EventRegistry::new();
        let a = registry.register(&[]).unwrap();
        let b = registry.register(&[]).unwrap();
        registry.add_dependency(b, a).unwrap();
        registry.add_dependency(b, a).unwrap();
        assert_eq!(registry.deps_on(b), &[a]);
        assert_eq!(registry.out_edges(a), &[b]);
        assert!(registry.add_dependency(a, b).is_err());
    }

    #[test]
    fn test_export_format() {
        let mut registry = EventRegistry::new();
        let a = registry.register(&[]).unwrap();
        registry.register(&[a]).unwrap();

        let mut out = Vec::new();
        registry.export(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "0 [] [1]\n1 [0] []\n");
    }
}
