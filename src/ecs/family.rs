//! Per-node-type membership engines.
//!
//! A `ComponentMatchingFamily<N>` keeps one node list in lockstep with the
//! entity population: an entity is a member exactly while it owns every
//! component type in `N`'s shape. The engine fans entity and component churn
//! out to every live family; each family re-tests only what the event could
//! have changed.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::ecs::component::ComponentType;
use crate::ecs::engine::UpdateBus;
use crate::ecs::entity::{Entity, EntityId};
use crate::ecs::node::{Node, NodeShape};
use crate::ecs::node_list::NodeList;
use crate::utils::FastHashMap;

/// The type-erased face a family shows the engine's fan-out.
pub(crate) trait AnyFamily {
    fn new_entity(&self, e: &Entity);
    fn remove_entity(&self, e: &Entity);
    fn component_added(&self, e: &Entity, ctype: ComponentType);
    fn component_removed(&self, e: &Entity, ctype: ComponentType);
    fn clean_up(&self);
    fn as_any(&self) -> &dyn Any;
}

pub(crate) struct ComponentMatchingFamily<N: Node> {
    shape: NodeShape,
    members: RefCell<FastHashMap<EntityId, u32>>,
    list: NodeList<N>,
    bus: UpdateBus,
    flush_pending: Rc<Cell<bool>>,
}

impl<N: Node> ComponentMatchingFamily<N> {
    pub fn new(bus: UpdateBus) -> Self {
        ComponentMatchingFamily {
            shape: N::shape(),
            members: RefCell::new(FastHashMap::default()),
            list: NodeList::new(),
            bus,
            flush_pending: Rc::new(Cell::new(false)),
        }
    }

    pub fn list(&self) -> &NodeList<N> {
        &self.list
    }

    /// Admits the entity if it owns every required component. Already tracked
    /// entities are left alone.
    fn add_if_match(&self, e: &Entity) {
        if self.members.borrow().contains_key(&e.id()) {
            return;
        }

        for &(ctype, _) in self.shape.iter() {
            if !e.has_dyn(ctype) {
                return;
            }
        }

        let node = match N::bind(e) {
            Some(node) => node,
            None => return,
        };

        let index = self.list.acquire(e.clone(), node);
        self.members.borrow_mut().insert(e.id(), index);
        self.list.attach(index);
    }

    /// Evicts the entity if it is tracked. The unlinked entry is recycled
    /// immediately, or parked until the in-flight update completes.
    fn remove_if_match(&self, e: &Entity) {
        let index = match self.members.borrow_mut().remove(&e.id()) {
            Some(index) => index,
            None => return,
        };

        self.list.detach(index);

        if self.bus.is_updating() {
            self.list.defer(index);

            if !self.flush_pending.get() {
                self.flush_pending.set(true);
                let list = self.list.clone();
                let flush_pending = self.flush_pending.clone();
                self.bus.completed().connect_once(move |_| {
                    flush_pending.set(false);
                    list.flush_cache();
                });
            }
        } else {
            self.list.release(index);
        }
    }
}

impl<N: Node> AnyFamily for ComponentMatchingFamily<N> {
    fn new_entity(&self, e: &Entity) {
        self.add_if_match(e);
    }

    fn remove_entity(&self, e: &Entity) {
        self.remove_if_match(e);
    }

    fn component_added(&self, e: &Entity, _ctype: ComponentType) {
        self.add_if_match(e);
    }

    fn component_removed(&self, e: &Entity, ctype: ComponentType) {
        // losing a component the shape never asked for can not change
        // membership
        if self.shape.contains(ctype) {
            self.remove_if_match(e);
        }
    }

    fn clean_up(&self) {
        self.members.borrow_mut().clear();
        self.list.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
