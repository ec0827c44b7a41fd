//! Systems hold the behaviour; the engine drives them in priority order.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::Rc;

use crate::ecs::engine::Engine;
use crate::ecs::entity::Entity;
use crate::ecs::node::Node;
use crate::ecs::node_list::NodeList;
use crate::utils::ListenerId;

/// A unit of behaviour driven by the engine's update cycle. Every callback
/// defaults to a no-op.
pub trait System: 'static {
    /// Called right after the system lands in the engine's schedule.
    fn added_to_engine(&mut self, _engine: &Engine) {}

    /// Called right after the system leaves the schedule.
    fn removed_from_engine(&mut self, _engine: &Engine) {}

    fn update(&mut self, _dt: f32) {}

    fn fixed_update(&mut self, _dt: f32) {}

    fn late_update(&mut self, _dt: f32) {}
}

/// A scheduled system with both its dispatch face and its concrete type
/// retained, so it can be driven as `dyn System` and retrieved by type.
#[derive(Clone)]
pub struct SystemCell {
    system: Rc<RefCell<dyn System>>,
    any: Rc<dyn Any>,
    type_id: TypeId,
    priority: i32,
}

impl SystemCell {
    pub fn new<S: System>(system: Rc<RefCell<S>>, priority: i32) -> Self {
        SystemCell {
            any: system.clone() as Rc<dyn Any>,
            system,
            type_id: TypeId::of::<S>(),
            priority,
        }
    }

    pub fn system(&self) -> &Rc<RefCell<dyn System>> {
        &self.system
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub(crate) fn tid(&self) -> TypeId {
        self.type_id
    }

    pub(crate) fn downcast<S: System>(&self) -> Option<Rc<RefCell<S>>> {
        self.any.clone().downcast::<RefCell<S>>().ok()
    }

    pub(crate) fn same_instance(&self, rhs: &SystemCell) -> bool {
        Rc::ptr_eq(&self.any, &rhs.any)
    }
}

/// The engine's schedule: ascending priority, and systems of equal priority
/// keep their insertion order.
#[derive(Default)]
pub(crate) struct SystemList {
    cells: Vec<SystemCell>,
}

impl SystemList {
    pub fn new() -> Self {
        SystemList::default()
    }

    pub fn add(&mut self, cell: SystemCell) {
        let at = self
            .cells
            .iter()
            .rposition(|v| v.priority() <= cell.priority())
            .map(|i| i + 1)
            .unwrap_or(0);
        self.cells.insert(at, cell);
    }

    pub fn remove<S: System>(&mut self) -> Option<SystemCell> {
        let tid = TypeId::of::<S>();
        let at = self.cells.iter().position(|v| v.tid() == tid)?;
        Some(self.cells.remove(at))
    }

    pub fn remove_instance(&mut self, cell: &SystemCell) -> Option<SystemCell> {
        let at = self.cells.iter().position(|v| v.same_instance(cell))?;
        Some(self.cells.remove(at))
    }

    pub fn get<S: System>(&self) -> Option<Rc<RefCell<S>>> {
        let tid = TypeId::of::<S>();
        self.cells
            .iter()
            .find(|v| v.tid() == tid)
            .and_then(SystemCell::downcast)
    }

    pub fn drain(&mut self) -> Vec<SystemCell> {
        ::std::mem::replace(&mut self.cells, Vec::new())
    }

    /// A snapshot for dispatch, so callbacks can reshape the schedule without
    /// aliasing the live list.
    pub fn snapshot(&self) -> Vec<SystemCell> {
        self.cells.clone()
    }
}

/// A system that walks one node list every update, with optional hooks for
/// nodes entering and leaving the list while the system is scheduled.
///
/// On entering the engine the existing membership is replayed through the
/// added hook, so late-scheduled systems observe every current node.
pub struct ListIteratingSystem<N: Node> {
    list: Option<NodeList<N>>,
    update_fn: Box<dyn FnMut(&Entity, &N, f32)>,
    added_fn: Option<Rc<dyn Fn(&Entity, &N)>>,
    removed_fn: Option<Rc<dyn Fn(&Entity, &N)>>,
    added_listener: Option<ListenerId>,
    removed_listener: Option<ListenerId>,
}

impl<N: Node> ListIteratingSystem<N> {
    pub fn new<F>(update_fn: F) -> Self
    where
        F: FnMut(&Entity, &N, f32) + 'static,
    {
        ListIteratingSystem {
            list: None,
            update_fn: Box::new(update_fn),
            added_fn: None,
            removed_fn: None,
            added_listener: None,
            removed_listener: None,
        }
    }

    pub fn with_node_added<F>(mut self, f: F) -> Self
    where
        F: Fn(&Entity, &N) + 'static,
    {
        self.added_fn = Some(Rc::new(f));
        self
    }

    pub fn with_node_removed<F>(mut self, f: F) -> Self
    where
        F: Fn(&Entity, &N) + 'static,
    {
        self.removed_fn = Some(Rc::new(f));
        self
    }

    /// The node list this system is currently iterating, if scheduled.
    pub fn list(&self) -> Option<&NodeList<N>> {
        self.list.as_ref()
    }
}

impl<N: Node> System for ListIteratingSystem<N> {
    fn added_to_engine(&mut self, engine: &Engine) {
        let list = engine.node_list::<N>();

        if let Some(added) = self.added_fn.clone() {
            for (entity, node) in list.iter() {
                added(&entity, &node);
            }
            self.added_listener = Some(
                list.node_added()
                    .connect(move |(entity, node)| added(entity, node)),
            );
        }

        if let Some(removed) = self.removed_fn.clone() {
            self.removed_listener = Some(
                list.node_removed()
                    .connect(move |(entity, node)| removed(entity, node)),
            );
        }

        self.list = Some(list);
    }

    fn removed_from_engine(&mut self, _engine: &Engine) {
        if let Some(list) = self.list.take() {
            if let Some(id) = self.added_listener.take() {
                list.node_added().disconnect(id);
            }
            if let Some(id) = self.removed_listener.take() {
                list.node_removed().disconnect(id);
            }
        }
    }

    fn update(&mut self, dt: f32) {
        if let Some(list) = self.list.clone() {
            for (entity, node) in list.iter() {
                (self.update_fn)(&entity, &node, dt);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Noop(&'static str);

    impl System for Noop {}

    struct Other;

    impl System for Other {}

    fn cell(tag: &'static str, priority: i32) -> SystemCell {
        SystemCell::new(Rc::new(RefCell::new(Noop(tag))), priority)
    }

    fn tags(list: &SystemList) -> Vec<&'static str> {
        list.snapshot()
            .iter()
            .map(|c| c.downcast::<Noop>().unwrap().borrow().0)
            .collect()
    }

    #[test]
    fn ordered_by_priority() {
        let mut list = SystemList::new();
        list.add(cell("c", 30));
        list.add(cell("a", 10));
        list.add(cell("b", 20));
        assert_eq!(tags(&list), vec!["a", "b", "c"]);
    }

    #[test]
    fn equal_priority_keeps_insertion_order() {
        let mut list = SystemList::new();
        list.add(cell("first", 5));
        list.add(cell("second", 5));
        list.add(cell("early", 1));
        list.add(cell("third", 5));
        assert_eq!(tags(&list), vec!["early", "first", "second", "third"]);
    }

    #[test]
    fn typed_retrieval_and_removal() {
        let mut list = SystemList::new();
        list.add(cell("only", 0));

        assert!(list.get::<Noop>().is_some());
        assert!(list.get::<Other>().is_none());
        assert!(list.remove::<Other>().is_none());

        let removed = list.remove::<Noop>().unwrap();
        assert_eq!(removed.downcast::<Noop>().unwrap().borrow().0, "only");
        assert!(list.snapshot().is_empty());
    }

    #[test]
    fn remove_by_instance() {
        let mut list = SystemList::new();
        let a = cell("a", 0);
        let b = cell("b", 0);
        list.add(a.clone());
        list.add(b.clone());

        assert!(list.remove_instance(&b).is_some());
        assert_eq!(tags(&list), vec!["a"]);
        assert!(list.remove_instance(&b).is_none());
    }
}
