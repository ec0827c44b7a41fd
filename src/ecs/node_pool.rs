//! Recycling chains over the node arena.
//!
//! Two singly linked chains thread through the arena entries' `prev` field:
//! the *free* chain of entries ready for reuse, and the *cache* chain of
//! entries removed while an update is in flight. A cached entry keeps its
//! bound value and its `next` link, so traversals that are resting on it can
//! still read it and walk off it. The cache drains into the free chain once
//! the update completes.

use crate::ecs::node::Node;
use crate::ecs::node_list::NodeEntry;

#[derive(Debug, Default)]
pub(crate) struct NodePool {
    free: Option<u32>,
    cache: Option<u32>,
}

impl NodePool {
    pub fn new() -> Self {
        NodePool::default()
    }

    /// Pops an entry off the free chain, growing the arena when empty. The
    /// returned entry is unbound and unlinked.
    pub fn acquire<N: Node>(&mut self, arena: &mut Vec<NodeEntry<N>>) -> u32 {
        match self.free {
            Some(index) => {
                let entry = &mut arena[index as usize];
                self.free = entry.prev;
                entry.prev = None;
                index
            }
            None => {
                arena.push(NodeEntry::new());
                (arena.len() - 1) as u32
            }
        }
    }

    /// Returns an entry to the free chain. The bound value and entity are
    /// dropped and the version is bumped, killing outstanding handles.
    pub fn release<N: Node>(&mut self, arena: &mut Vec<NodeEntry<N>>, index: u32) {
        let entry = &mut arena[index as usize];
        entry.value = None;
        entry.entity = None;
        entry.version += 1;
        entry.next = None;
        entry.prev = self.free;
        self.free = Some(index);
    }

    /// Parks an entry on the cache chain without clearing it. Only `prev` is
    /// repurposed as the chain link; `next` and the bound value stay intact
    /// for in-flight traversals.
    pub fn defer<N: Node>(&mut self, arena: &mut Vec<NodeEntry<N>>, index: u32) {
        arena[index as usize].prev = self.cache;
        self.cache = Some(index);
    }

    /// Drains the cache chain into the free chain.
    pub fn flush_cache<N: Node>(&mut self, arena: &mut Vec<NodeEntry<N>>) {
        while let Some(index) = self.cache {
            self.cache = arena[index as usize].prev;
            self.release(arena, index);
        }
    }
}
