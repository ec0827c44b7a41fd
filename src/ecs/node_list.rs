//! Arena-backed doubly linked node lists.
//!
//! The list owns an arena of versioned entries; `prev`/`next` are arena
//! indices, and public cursors are versioned `NodeHandle`s that go dead once
//! their entry is recycled. Removal fixes the neighbours, head and tail, but
//! never the removed entry's own links, so a cursor resting on a removed node
//! still resolves the neighbourhood captured at removal time and can step off
//! it.
//!
//! `NodeList` clones are handles onto the same list; membership is maintained
//! by the owning family, while consumers traverse, reorder and sort in place.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::ecs::entity::Entity;
use crate::ecs::node::{Node, NodeHandle};
use crate::ecs::node_pool::NodePool;
use crate::utils::{Handle, HandleIndex, Signal};

/// One arena slot. `prev` doubles as the recycling chain link while the entry
/// sits in the pool.
#[derive(Debug)]
pub(crate) struct NodeEntry<N> {
    pub version: HandleIndex,
    pub value: Option<N>,
    pub entity: Option<Entity>,
    pub prev: Option<u32>,
    pub next: Option<u32>,
}

impl<N> NodeEntry<N> {
    pub fn new() -> Self {
        NodeEntry {
            version: 1,
            value: None,
            entity: None,
            prev: None,
            next: None,
        }
    }
}

pub(crate) struct ListCore<N: Node> {
    arena: Vec<NodeEntry<N>>,
    pool: NodePool,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl<N: Node> ListCore<N> {
    fn new() -> Self {
        ListCore {
            arena: Vec::new(),
            pool: NodePool::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    fn handle(&self, index: u32) -> NodeHandle {
        NodeHandle::from(Handle::new(index, self.arena[index as usize].version))
    }

    /// Maps a handle back to its arena index. Fails for handles whose entry
    /// was recycled; entries parked on the cache chain still resolve.
    fn resolve(&self, handle: NodeHandle) -> Option<u32> {
        let index = handle.index();
        let entry = self.arena.get(index as usize)?;
        if entry.version == handle.version() && entry.value.is_some() {
            Some(index)
        } else {
            None
        }
    }

    fn value_ref(&self, index: u32) -> &N {
        self.arena[index as usize]
            .value
            .as_ref()
            .expect("linked entry must hold a bound node")
    }

    fn links(&self, index: u32) -> (Option<u32>, Option<u32>) {
        let entry = &self.arena[index as usize];
        (entry.prev, entry.next)
    }

    fn acquire(&mut self, entity: Entity, value: N) -> u32 {
        let index = self.pool.acquire(&mut self.arena);
        let entry = &mut self.arena[index as usize];
        entry.value = Some(value);
        entry.entity = Some(entity);
        index
    }

    /// Links an entry at the tail.
    fn attach(&mut self, index: u32) {
        let tail = self.tail;
        {
            let entry = &mut self.arena[index as usize];
            entry.prev = tail;
            entry.next = None;
        }
        match tail {
            Some(t) => self.arena[t as usize].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;
    }

    /// Unlinks an entry, fixing neighbours, head and tail. The entry's own
    /// links are left untouched.
    fn unlink(&mut self, index: u32) {
        let (prev, next) = self.links(index);
        match prev {
            Some(p) => self.arena[p as usize].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.arena[n as usize].prev = prev,
            None => self.tail = prev,
        }
    }

    fn detach(&mut self, index: u32) {
        self.unlink(index);
        self.len -= 1;
    }

    /// Inserts an unlinked entry after `after`, or at the head for `None`.
    fn link_after(&mut self, index: u32, after: Option<u32>) {
        match after {
            Some(a) => {
                let next = self.arena[a as usize].next;
                {
                    let entry = &mut self.arena[index as usize];
                    entry.prev = Some(a);
                    entry.next = next;
                }
                self.arena[a as usize].next = Some(index);
                match next {
                    Some(n) => self.arena[n as usize].prev = Some(index),
                    None => self.tail = Some(index),
                }
            }
            None => {
                let head = self.head;
                {
                    let entry = &mut self.arena[index as usize];
                    entry.prev = None;
                    entry.next = head;
                }
                match head {
                    Some(h) => self.arena[h as usize].prev = Some(index),
                    None => self.tail = Some(index),
                }
                self.head = Some(index);
            }
        }
    }

    /// Points an entry's current neighbours back at it, fixing head and tail
    /// at the ends.
    fn reattach_neighbours(&mut self, index: u32) {
        let (prev, next) = self.links(index);
        match prev {
            Some(p) => self.arena[p as usize].next = Some(index),
            None => self.head = Some(index),
        }
        match next {
            Some(n) => self.arena[n as usize].prev = Some(index),
            None => self.tail = Some(index),
        }
    }

    fn swap(&mut self, a: u32, b: u32) {
        if a == b {
            return;
        }

        let (ap, an) = self.links(a);
        let (bp, bn) = self.links(b);

        if ap == Some(b) {
            // b immediately precedes a
            self.set_links(a, bp, Some(b));
            self.set_links(b, Some(a), an);
        } else if bp == Some(a) {
            // a immediately precedes b
            self.set_links(b, ap, Some(a));
            self.set_links(a, Some(b), bn);
        } else {
            self.set_links(a, bp, bn);
            self.set_links(b, ap, an);
        }

        self.reattach_neighbours(a);
        self.reattach_neighbours(b);
    }

    fn set_links(&mut self, index: u32, prev: Option<u32>, next: Option<u32>) {
        let entry = &mut self.arena[index as usize];
        entry.prev = prev;
        entry.next = next;
    }

    /// Stable in-place insertion sort; linear on nearly sorted input. Each
    /// node walks backwards until it finds a predecessor it does not order
    /// before.
    fn sort_insertion<F>(&mut self, cmp: &mut F)
    where
        F: FnMut(&N, &N) -> Ordering,
    {
        if self.head == self.tail {
            return;
        }

        let head = match self.head {
            Some(h) => h,
            None => return,
        };

        let mut remains = self.arena[head as usize].next;
        while let Some(node) = remains {
            remains = self.arena[node as usize].next;

            let mut other = self.arena[node as usize].prev;
            loop {
                match other {
                    Some(o) => {
                        let ord = cmp(self.value_ref(node), self.value_ref(o));
                        if ord != Ordering::Less {
                            if self.arena[node as usize].prev != Some(o) {
                                self.unlink(node);
                                self.link_after(node, Some(o));
                            }
                            break;
                        }
                        other = self.arena[o as usize].prev;
                    }
                    None => {
                        self.unlink(node);
                        self.link_after(node, None);
                        break;
                    }
                }
            }
        }
    }

    /// Stable in-place merge sort. Splits the list into maximal ascending
    /// runs, then merges run pairs until one remains; no per-node allocation.
    fn sort_merge<F>(&mut self, cmp: &mut F)
    where
        F: FnMut(&N, &N) -> Ordering,
    {
        if self.head == self.tail {
            return;
        }

        let mut runs: VecDeque<u32> = VecDeque::new();
        let mut start = self.head;
        while let Some(s) = start {
            let mut end = s;
            while let Some(n) = self.arena[end as usize].next {
                if cmp(self.value_ref(end), self.value_ref(n)) == Ordering::Greater {
                    break;
                }
                end = n;
            }
            start = self.arena[end as usize].next;
            self.arena[s as usize].prev = None;
            self.arena[end as usize].next = None;
            runs.push_back(s);
        }

        // Merge adjacent runs round by round; the left argument is always the
        // earlier run, so ties resolve towards earlier nodes and the sort
        // stays stable. An odd leftover run carries over to the next round.
        while runs.len() > 1 {
            let mut pending = runs.len();
            while pending > 1 {
                let a = match runs.pop_front() {
                    Some(v) => v,
                    None => break,
                };
                let b = match runs.pop_front() {
                    Some(v) => v,
                    None => break,
                };
                runs.push_back(self.merge(a, b, cmp));
                pending -= 2;
            }
            if pending == 1 {
                if let Some(last) = runs.pop_front() {
                    runs.push_back(last);
                }
            }
        }

        if let Some(h) = runs.pop_front() {
            self.arena[h as usize].prev = None;
            self.head = Some(h);
            let mut tail = h;
            while let Some(n) = self.arena[tail as usize].next {
                tail = n;
            }
            self.tail = Some(tail);
        }
    }

    /// Merges two runs; ties keep the left run's order, which keeps the sort
    /// stable.
    fn merge<F>(&mut self, h1: u32, h2: u32, cmp: &mut F) -> u32
    where
        F: FnMut(&N, &N) -> Ordering,
    {
        let head;
        let mut node;
        let mut a;
        let mut b;

        if cmp(self.value_ref(h1), self.value_ref(h2)) != Ordering::Greater {
            head = h1;
            node = h1;
            a = self.arena[h1 as usize].next;
            b = Some(h2);
        } else {
            head = h2;
            node = h2;
            a = Some(h1);
            b = self.arena[h2 as usize].next;
        }

        loop {
            let pick = match (a, b) {
                (Some(x), Some(y)) => {
                    if cmp(self.value_ref(x), self.value_ref(y)) != Ordering::Greater {
                        a = self.arena[x as usize].next;
                        x
                    } else {
                        b = self.arena[y as usize].next;
                        y
                    }
                }
                (Some(x), None) => {
                    self.arena[node as usize].next = Some(x);
                    self.arena[x as usize].prev = Some(node);
                    break;
                }
                (None, Some(y)) => {
                    self.arena[node as usize].next = Some(y);
                    self.arena[y as usize].prev = Some(node);
                    break;
                }
                (None, None) => {
                    self.arena[node as usize].next = None;
                    break;
                }
            };

            self.arena[node as usize].next = Some(pick);
            self.arena[pick as usize].prev = Some(node);
            node = pick;
        }

        head
    }
}

/// A doubly linked list of bound nodes, one per matching entity, maintained
/// incrementally by its family. Clones share the same list.
pub struct NodeList<N: Node> {
    core: Rc<RefCell<ListCore<N>>>,
    node_added: Signal<(Entity, N)>,
    node_removed: Signal<(Entity, N)>,
}

impl<N: Node> Clone for NodeList<N> {
    fn clone(&self) -> Self {
        NodeList {
            core: self.core.clone(),
            node_added: self.node_added.clone(),
            node_removed: self.node_removed.clone(),
        }
    }
}

impl<N: Node> NodeList<N> {
    pub(crate) fn new() -> Self {
        NodeList {
            core: Rc::new(RefCell::new(ListCore::new())),
            node_added: Signal::new(),
            node_removed: Signal::new(),
        }
    }

    /// Fired after a node is linked into the list.
    pub fn node_added(&self) -> &Signal<(Entity, N)> {
        &self.node_added
    }

    /// Fired after a node is unlinked from the list. The payload is still
    /// fully bound.
    pub fn node_removed(&self) -> &Signal<(Entity, N)> {
        &self.node_removed
    }

    pub fn head(&self) -> Option<NodeHandle> {
        let core = self.core.borrow();
        core.head.map(|i| core.handle(i))
    }

    pub fn tail(&self) -> Option<NodeHandle> {
        let core = self.core.borrow();
        core.tail.map(|i| core.handle(i))
    }

    /// Steps a cursor forward. A cursor resting on a node removed mid-update
    /// still steps onto the successor captured at removal time.
    pub fn next(&self, handle: NodeHandle) -> Option<NodeHandle> {
        let core = self.core.borrow();
        let index = core.resolve(handle)?;
        core.arena[index as usize].next.map(|n| core.handle(n))
    }

    pub fn prev(&self, handle: NodeHandle) -> Option<NodeHandle> {
        let core = self.core.borrow();
        let index = core.resolve(handle)?;
        core.arena[index as usize].prev.map(|p| core.handle(p))
    }

    /// Clones the bound node behind a cursor. `None` once the entry has been
    /// recycled.
    pub fn get(&self, handle: NodeHandle) -> Option<N> {
        let core = self.core.borrow();
        let index = core.resolve(handle)?;
        core.arena[index as usize].value.clone()
    }

    /// The entity a cursor's node is bound to.
    pub fn entity(&self, handle: NodeHandle) -> Option<Entity> {
        let core = self.core.borrow();
        let index = core.resolve(handle)?;
        core.arena[index as usize].entity.clone()
    }

    pub fn len(&self) -> usize {
        self.core.borrow().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates `(Entity, N)` pairs in list order. The successor is resolved
    /// lazily at each step, so removing the node under the cursor keeps the
    /// rest of the walk intact.
    pub fn iter(&self) -> Iter<N> {
        Iter {
            list: self.clone(),
            cursor: None,
            started: false,
        }
    }

    /// Swaps two nodes' positions in O(1). Dead cursors make this a no-op.
    pub fn swap(&self, a: NodeHandle, b: NodeHandle) {
        let mut core = self.core.borrow_mut();
        if let (Some(a), Some(b)) = (core.resolve(a), core.resolve(b)) {
            core.swap(a, b);
        }
    }

    /// Sorts in place with a three-way comparator; equal nodes keep their
    /// relative order. Linear on nearly sorted input, quadratic worst case.
    pub fn sort_insertion<F>(&self, mut cmp: F)
    where
        F: FnMut(&N, &N) -> Ordering,
    {
        self.core.borrow_mut().sort_insertion(&mut cmp);
    }

    /// Sorts in place with a three-way comparator; equal nodes keep their
    /// relative order. O(n log n) worst case, no per-node allocation.
    pub fn sort_merge<F>(&self, mut cmp: F)
    where
        F: FnMut(&N, &N) -> Ordering,
    {
        self.core.borrow_mut().sort_merge(&mut cmp);
    }

    pub(crate) fn acquire(&self, entity: Entity, value: N) -> u32 {
        self.core.borrow_mut().acquire(entity, value)
    }

    pub(crate) fn attach(&self, index: u32) {
        let payload = {
            let mut core = self.core.borrow_mut();
            core.attach(index);
            let entry = &core.arena[index as usize];
            (
                entry.entity.clone().expect("attached entry must be bound"),
                entry.value.clone().expect("attached entry must be bound"),
            )
        };
        self.node_added.emit(&payload);
    }

    pub(crate) fn detach(&self, index: u32) {
        let payload = {
            let mut core = self.core.borrow_mut();
            core.detach(index);
            let entry = &core.arena[index as usize];
            (
                entry.entity.clone().expect("detached entry is still bound"),
                entry.value.clone().expect("detached entry is still bound"),
            )
        };
        self.node_removed.emit(&payload);
    }

    pub(crate) fn release(&self, index: u32) {
        let mut core = self.core.borrow_mut();
        let ListCore {
            ref mut arena,
            ref mut pool,
            ..
        } = *core;
        pool.release(arena, index);
    }

    pub(crate) fn defer(&self, index: u32) {
        let mut core = self.core.borrow_mut();
        let ListCore {
            ref mut arena,
            ref mut pool,
            ..
        } = *core;
        pool.defer(arena, index);
    }

    pub(crate) fn flush_cache(&self) {
        let mut core = self.core.borrow_mut();
        let ListCore {
            ref mut arena,
            ref mut pool,
            ..
        } = *core;
        pool.flush_cache(arena);
    }

    /// Detaches and recycles every node, firing `node_removed` for each.
    pub(crate) fn clear(&self) {
        loop {
            let index = match self.core.borrow().head {
                Some(h) => h,
                None => break,
            };
            self.detach(index);
            self.release(index);
        }
    }

    #[cfg(test)]
    pub(crate) fn handle_at(&self, index: u32) -> NodeHandle {
        self.core.borrow().handle(index)
    }
}

pub struct Iter<N: Node> {
    list: NodeList<N>,
    cursor: Option<NodeHandle>,
    started: bool,
}

impl<N: Node> Iterator for Iter<N> {
    type Item = (Entity, N);

    fn next(&mut self) -> Option<Self::Item> {
        let handle = if self.started {
            self.list.next(self.cursor?)
        } else {
            self.started = true;
            self.list.head()
        };

        self.cursor = handle;
        let handle = handle?;
        let entity = self.list.entity(handle)?;
        let value = self.list.get(handle)?;
        Some((entity, value))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    pub struct Rank {
        pub key: i32,
        pub tag: u32,
    }

    declare_node!(RankNode {
        rank: Rank,
    });

    fn push(list: &NodeList<RankNode>, key: i32, tag: u32) -> u32 {
        let e = Entity::new();
        e.add(Rank { key, tag });
        let node = RankNode::bind(&e).unwrap();
        let index = list.acquire(e, node);
        list.attach(index);
        index
    }

    fn keys(list: &NodeList<RankNode>) -> Vec<i32> {
        list.iter().map(|(_, n)| n.rank.borrow().key).collect()
    }

    fn tags(list: &NodeList<RankNode>) -> Vec<u32> {
        list.iter().map(|(_, n)| n.rank.borrow().tag).collect()
    }

    fn keys_reversed(list: &NodeList<RankNode>) -> Vec<i32> {
        let mut out = Vec::new();
        let mut cursor = list.tail();
        while let Some(h) = cursor {
            out.push(list.get(h).unwrap().rank.borrow().key);
            cursor = list.prev(h);
        }
        out
    }

    fn by_key(a: &RankNode, b: &RankNode) -> Ordering {
        a.rank.borrow().key.cmp(&b.rank.borrow().key)
    }

    #[test]
    fn attach_and_detach() {
        let list = NodeList::new();
        assert!(list.is_empty());
        assert!(list.head().is_none());

        let a = push(&list, 1, 0);
        let b = push(&list, 2, 0);
        let c = push(&list, 3, 0);
        assert_eq!(list.len(), 3);
        assert_eq!(keys(&list), vec![1, 2, 3]);
        assert_eq!(keys_reversed(&list), vec![3, 2, 1]);

        list.detach(b);
        assert_eq!(list.len(), 2);
        assert_eq!(keys(&list), vec![1, 3]);

        // the removed node keeps its own neighbourhood
        let bh = list.handle_at(b);
        assert_eq!(list.next(bh), Some(list.handle_at(c)));
        assert_eq!(list.prev(bh), Some(list.handle_at(a)));

        list.release(b);
        assert!(list.get(bh).is_none());
        assert!(list.next(bh).is_none());
    }

    #[test]
    fn released_index_is_reused_with_new_version() {
        let list = NodeList::new();
        let a = push(&list, 1, 0);
        let stale = list.handle_at(a);

        list.detach(a);
        list.release(a);

        let b = push(&list, 2, 0);
        assert_eq!(a, b);
        assert!(list.get(stale).is_none());
        assert_eq!(list.get(list.handle_at(b)).unwrap().rank.borrow().key, 2);
    }

    #[test]
    fn deferred_entry_stays_readable() {
        let list = NodeList::new();
        push(&list, 1, 0);
        let b = push(&list, 2, 0);
        push(&list, 3, 0);

        let bh = list.handle_at(b);
        list.detach(b);
        list.defer(b);

        assert_eq!(list.get(bh).unwrap().rank.borrow().key, 2);
        assert_eq!(list.next(bh).map(|h| h.index()), Some(2));

        // a new acquisition must not reuse the cached entry
        let fresh = push(&list, 4, 0);
        assert_ne!(fresh, b);

        list.flush_cache();
        assert!(list.get(bh).is_none());

        let recycled = push(&list, 5, 0);
        assert_eq!(recycled, b);
    }

    #[test]
    fn swap_adjacent_and_distant() {
        let list = NodeList::new();
        let a = push(&list, 1, 0);
        let b = push(&list, 2, 0);
        let c = push(&list, 3, 0);
        let d = push(&list, 4, 0);

        // adjacent, both orders
        list.swap(list.handle_at(a), list.handle_at(b));
        assert_eq!(keys(&list), vec![2, 1, 3, 4]);
        list.swap(list.handle_at(a), list.handle_at(b));
        assert_eq!(keys(&list), vec![1, 2, 3, 4]);

        // head and tail
        list.swap(list.handle_at(a), list.handle_at(d));
        assert_eq!(keys(&list), vec![4, 2, 3, 1]);
        assert_eq!(keys_reversed(&list), vec![1, 3, 2, 4]);

        // distant interior pair
        list.swap(list.handle_at(b), list.handle_at(c));
        assert_eq!(keys(&list), vec![4, 3, 2, 1]);
        assert_eq!(keys_reversed(&list), vec![1, 2, 3, 4]);
    }

    #[test]
    fn iterator_survives_removal_under_cursor() {
        let list = NodeList::new();
        push(&list, 1, 0);
        let b = push(&list, 2, 0);
        push(&list, 3, 0);

        let mut seen = Vec::new();
        for (_, node) in list.iter() {
            let key = node.rank.borrow().key;
            if key == 2 {
                // remove the node we are standing on, keeping it cached
                list.detach(b);
                list.defer(b);
            }
            seen.push(key);
        }

        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(list.len(), 2);
        list.flush_cache();
    }

    fn sorted_check(keys_in: &[i32], merge: bool) {
        let list = NodeList::new();
        for (i, &k) in keys_in.iter().enumerate() {
            push(&list, k, i as u32);
        }

        if merge {
            list.sort_merge(by_key);
        } else {
            list.sort_insertion(by_key);
        }

        let mut expected: Vec<i32> = keys_in.to_vec();
        expected.sort();
        assert_eq!(keys(&list), expected);

        let mut rev = expected.clone();
        rev.reverse();
        assert_eq!(keys_reversed(&list), rev);
    }

    #[test]
    fn sort_small_inputs() {
        for &merge in &[false, true] {
            sorted_check(&[], merge);
            sorted_check(&[7], merge);
            sorted_check(&[2, 1], merge);
            sorted_check(&[1, 2], merge);
            sorted_check(&[5, 4, 3, 2, 1], merge);
            sorted_check(&[1, 2, 3, 4, 5], merge);
            sorted_check(&[3, 1, 4, 1, 5, 9, 2, 6], merge);
        }
    }

    #[test]
    fn sort_random_inputs() {
        use rand::{Rng, SeedableRng, XorShiftRng};

        let mut generator = XorShiftRng::from_seed([7; 16]);
        for _ in 0..8 {
            let len = generator.gen_range(0, 64);
            let keys_in: Vec<i32> = (0..len).map(|_| generator.gen_range(-50, 50)).collect();
            sorted_check(&keys_in, false);
            sorted_check(&keys_in, true);
        }
    }

    #[test]
    fn sorts_are_stable() {
        for &merge in &[false, true] {
            let list = NodeList::new();
            // equal keys, distinguishable tags in insertion order
            push(&list, 2, 0);
            push(&list, 1, 1);
            push(&list, 2, 2);
            push(&list, 1, 3);
            push(&list, 2, 4);

            if merge {
                list.sort_merge(by_key);
            } else {
                list.sort_insertion(by_key);
            }

            assert_eq!(keys(&list), vec![1, 1, 2, 2, 2]);
            assert_eq!(tags(&list), vec![1, 3, 0, 2, 4]);
        }
    }

    #[test]
    fn merge_sort_is_stable_across_odd_run_counts() {
        let list = NodeList::new();
        // descending breaks split the input into seven runs
        for (i, &k) in [3, 1, 3, 2, 1, 3, 2, 1, 2, 0].iter().enumerate() {
            push(&list, k, i as u32);
        }

        list.sort_merge(by_key);

        assert_eq!(keys(&list), vec![0, 1, 1, 1, 2, 2, 2, 3, 3, 3]);
        assert_eq!(tags(&list), vec![9, 1, 4, 7, 3, 6, 8, 0, 2, 5]);
    }

    #[test]
    fn sort_all_equal_keeps_order() {
        for &merge in &[false, true] {
            let list = NodeList::new();
            for i in 0..6 {
                push(&list, 42, i);
            }

            if merge {
                list.sort_merge(by_key);
            } else {
                list.sort_insertion(by_key);
            }

            assert_eq!(tags(&list), vec![0, 1, 2, 3, 4, 5]);
        }
    }

    #[test]
    fn clear_fires_removals() {
        let list = NodeList::new();
        push(&list, 1, 0);
        push(&list, 2, 0);

        let removed = Rc::new(RefCell::new(0));
        {
            let removed = removed.clone();
            list.node_removed().connect(move |_| *removed.borrow_mut() += 1);
        }

        list.clear();
        assert!(list.is_empty());
        assert_eq!(*removed.borrow(), 2);
    }
}
