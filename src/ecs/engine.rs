//! The registry façade: entities, families and systems under one roof.
//!
//! The engine owns a name directory and an insertion-ordered entity list,
//! lazily builds one family per node type, and drives systems through the
//! update cycle. It never schedules itself; the hosting frame loop calls
//! `update`/`fixed_update`/`late_update` and consults `is_running`.
//!
//! `Engine` is a cheap handle; clones share the same registry. Fan-out to
//! families and systems always goes through snapshots, so callbacks are free
//! to mutate the registry they were called from.

use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::ecs::component::ComponentType;
use crate::ecs::entity::{Entity, EntityId};
use crate::ecs::family::{AnyFamily, ComponentMatchingFamily};
use crate::ecs::node::Node;
use crate::ecs::node_list::NodeList;
use crate::ecs::system::{System, SystemCell, SystemList};
use crate::errors::Result;
use crate::utils::{FastHashMap, HashValue, ListenerId, Signal};

/// Shared between the engine and its families: the in-flight update flag and
/// the end-of-update signal that drains deferred node recycling.
#[derive(Clone)]
pub(crate) struct UpdateBus {
    updating: Rc<Cell<bool>>,
    completed: Signal<()>,
}

impl UpdateBus {
    pub fn new() -> Self {
        UpdateBus {
            updating: Rc::new(Cell::new(false)),
            completed: Signal::new(),
        }
    }

    pub fn is_updating(&self) -> bool {
        self.updating.get()
    }

    pub fn set_updating(&self, v: bool) {
        self.updating.set(v);
    }

    pub fn completed(&self) -> &Signal<()> {
        &self.completed
    }
}

struct EngineInner {
    names: RefCell<FastHashMap<HashValue<str>, Entity>>,
    entities: RefCell<Vec<Entity>>,
    wires: RefCell<FastHashMap<EntityId, [ListenerId; 3]>>,
    families: RefCell<FastHashMap<TypeId, Rc<dyn AnyFamily>>>,
    systems: RefCell<SystemList>,
    bus: UpdateBus,
    running: Cell<bool>,
}

#[derive(Clone)]
pub struct Engine {
    inner: Rc<EngineInner>,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Engine {
            inner: Rc::new(EngineInner {
                names: RefCell::new(FastHashMap::default()),
                entities: RefCell::new(Vec::new()),
                wires: RefCell::new(FastHashMap::default()),
                families: RefCell::new(FastHashMap::default()),
                systems: RefCell::new(SystemList::new()),
                bus: UpdateBus::new(),
                running: Cell::new(false),
            }),
        }
    }

    /// Registers an entity. Fails on a duplicate name before any mutation
    /// takes place.
    pub fn add_entity(&self, e: Entity) -> Result<()> {
        let key = HashValue::from(e.name());
        if self.inner.names.borrow().contains_key(&key) {
            bail!("an entity named '{}' is already registered.", e.name());
        }

        let weak = Rc::downgrade(&self.inner);
        let added = {
            let weak = weak.clone();
            e.component_added().connect(move |(entity, ctype)| {
                if let Some(inner) = weak.upgrade() {
                    Engine { inner }.on_component_added(entity, *ctype);
                }
            })
        };
        let removed = {
            let weak = weak.clone();
            e.component_removed().connect(move |(entity, ctype)| {
                if let Some(inner) = weak.upgrade() {
                    Engine { inner }.on_component_removed(entity, *ctype);
                }
            })
        };
        let renamed = e.renamed().connect(move |(entity, old)| {
            if let Some(inner) = weak.upgrade() {
                Engine { inner }.on_renamed(entity, old);
            }
        });

        self.inner
            .wires
            .borrow_mut()
            .insert(e.id(), [added, removed, renamed]);
        self.inner.names.borrow_mut().insert(key, e.clone());
        self.inner.entities.borrow_mut().push(e.clone());

        for family in self.families_snapshot() {
            family.new_entity(&e);
        }

        debug!("entity '{}' registered.", e.name());
        Ok(())
    }

    /// Unregisters an entity and evicts it from every family. Unknown
    /// entities are a silent no-op.
    pub fn remove_entity(&self, e: &Entity) {
        let wires = match self.inner.wires.borrow_mut().remove(&e.id()) {
            Some(w) => w,
            None => return,
        };
        e.component_added().disconnect(wires[0]);
        e.component_removed().disconnect(wires[1]);
        e.renamed().disconnect(wires[2]);

        for family in self.families_snapshot() {
            family.remove_entity(e);
        }

        let key = HashValue::from(e.name());
        {
            let mut names = self.inner.names.borrow_mut();
            if names.get(&key).map(|v| v == e).unwrap_or(false) {
                names.remove(&key);
            }
        }

        let mut entities = self.inner.entities.borrow_mut();
        if let Some(at) = entities.iter().position(|v| v == e) {
            entities.remove(at);
        }
    }

    /// Looks an entity up by name.
    pub fn entity(&self, name: &str) -> Option<Entity> {
        self.inner.names.borrow().get(&HashValue::from(name)).cloned()
    }

    /// Every registered entity, in registration order.
    pub fn entities(&self) -> Vec<Entity> {
        self.inner.entities.borrow().clone()
    }

    /// Fills the caller's buffer with the registered entities, clearing it
    /// first.
    pub fn collect_entities(&self, buf: &mut Vec<Entity>) {
        buf.clear();
        buf.extend(self.inner.entities.borrow().iter().cloned());
    }

    pub fn remove_all_entities(&self) {
        loop {
            let e = match self.inner.entities.borrow().first() {
                Some(e) => e.clone(),
                None => break,
            };
            self.remove_entity(&e);
        }
    }

    /// The node list for `N`, building its family on first use and offering
    /// it every registered entity. Later calls return the same list.
    pub fn node_list<N: Node>(&self) -> NodeList<N> {
        let tid = TypeId::of::<N>();

        if let Some(family) = self.inner.families.borrow().get(&tid) {
            if let Some(family) = family
                .as_any()
                .downcast_ref::<ComponentMatchingFamily<N>>()
            {
                return family.list().clone();
            }
        }

        let family = Rc::new(ComponentMatchingFamily::<N>::new(self.inner.bus.clone()));
        let list = family.list().clone();
        self.inner
            .families
            .borrow_mut()
            .insert(tid, family.clone() as Rc<dyn AnyFamily>);

        for e in self.entities() {
            family.new_entity(&e);
        }

        debug!("node family created for {}.", ::std::any::type_name::<N>());
        list
    }

    /// Tears the family for `N` down. Outstanding list handles survive but
    /// stay permanently empty.
    pub fn release_node_list<N: Node>(&self) {
        let family = self.inner.families.borrow_mut().remove(&TypeId::of::<N>());
        if let Some(family) = family {
            family.clean_up();
            debug!("node family released for {}.", ::std::any::type_name::<N>());
        }
    }

    /// Schedules a system and hands back its shared cell. Systems of equal
    /// priority run in the order they were added.
    pub fn add_system<S: System>(&self, system: S, priority: i32) -> Rc<RefCell<S>> {
        let system = Rc::new(RefCell::new(system));
        self.add_system_cell(SystemCell::new(system.clone(), priority));
        system
    }

    pub(crate) fn add_system_cell(&self, cell: SystemCell) {
        self.inner.systems.borrow_mut().add(cell.clone());
        cell.system().borrow_mut().added_to_engine(self);
    }

    /// Retrieves a scheduled system by its concrete type.
    pub fn system<S: System>(&self) -> Option<Rc<RefCell<S>>> {
        self.inner.systems.borrow().get::<S>()
    }

    /// Unschedules the system of type `S` and returns it. Absence is a silent
    /// no-op.
    pub fn remove_system<S: System>(&self) -> Option<Rc<RefCell<S>>> {
        let cell = self.inner.systems.borrow_mut().remove::<S>()?;
        cell.system().borrow_mut().removed_from_engine(self);
        cell.downcast::<S>()
    }

    pub(crate) fn remove_system_cell(&self, cell: &SystemCell) {
        let removed = self.inner.systems.borrow_mut().remove_instance(cell);
        if let Some(cell) = removed {
            cell.system().borrow_mut().removed_from_engine(self);
        }
    }

    /// Every scheduled system, in priority order.
    pub fn systems(&self) -> Vec<Rc<RefCell<dyn System>>> {
        self.inner
            .systems
            .borrow()
            .snapshot()
            .iter()
            .map(|cell| cell.system().clone())
            .collect()
    }

    pub fn collect_systems(&self, buf: &mut Vec<Rc<RefCell<dyn System>>>) {
        buf.clear();
        buf.extend(self.systems());
    }

    pub fn remove_all_systems(&self) {
        let cells = self.inner.systems.borrow_mut().drain();
        for cell in cells {
            cell.system().borrow_mut().removed_from_engine(self);
        }
    }

    /// Runs one update cycle. Structural node removals inside the cycle are
    /// deferred and recycled when the cycle completes.
    pub fn update(&self, dt: f32) {
        self.inner.bus.set_updating(true);
        let cells = self.inner.systems.borrow().snapshot();
        for cell in cells {
            cell.system().borrow_mut().update(dt);
        }
        self.inner.bus.set_updating(false);
        self.inner.bus.completed().emit(&());
    }

    /// Dispatches the fixed-step callbacks. No deferral window.
    pub fn fixed_update(&self, dt: f32) {
        let cells = self.inner.systems.borrow().snapshot();
        for cell in cells {
            cell.system().borrow_mut().fixed_update(dt);
        }
    }

    /// Dispatches the end-of-frame callbacks. No deferral window.
    pub fn late_update(&self, dt: f32) {
        let cells = self.inner.systems.borrow().snapshot();
        for cell in cells {
            cell.system().borrow_mut().late_update(dt);
        }
    }

    pub fn is_updating(&self) -> bool {
        self.inner.bus.is_updating()
    }

    /// The frame driver's flag; the engine itself never consults it.
    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    pub fn start(&self) {
        self.inner.running.set(true);
    }

    pub fn resume(&self) {
        self.inner.running.set(true);
    }

    pub fn pause(&self) {
        self.inner.running.set(false);
    }

    /// Stops the engine and empties the registry.
    pub fn dispose(&self) {
        self.pause();
        self.remove_all_systems();
        self.remove_all_entities();

        let families: Vec<Rc<dyn AnyFamily>> = self
            .inner
            .families
            .borrow_mut()
            .drain()
            .map(|(_, family)| family)
            .collect();
        for family in families {
            family.clean_up();
        }

        debug!("engine disposed.");
    }

    fn families_snapshot(&self) -> Vec<Rc<dyn AnyFamily>> {
        self.inner.families.borrow().values().cloned().collect()
    }

    fn on_component_added(&self, e: &Entity, ctype: ComponentType) {
        for family in self.families_snapshot() {
            family.component_added(e, ctype);
        }
    }

    fn on_component_removed(&self, e: &Entity, ctype: ComponentType) {
        for family in self.families_snapshot() {
            family.component_removed(e, ctype);
        }
    }

    fn on_renamed(&self, e: &Entity, old: &str) {
        let mut names = self.inner.names.borrow_mut();

        let old_key = HashValue::from(old);
        match names.get(&old_key) {
            Some(v) if v == e => {
                names.remove(&old_key);
            }
            _ => return,
        }

        let new_key = HashValue::from(e.name());
        if names.contains_key(&new_key) {
            warn!(
                "entity name '{}' is already registered, keeping the first binding.",
                e.name()
            );
        } else {
            names.insert(new_key, e.clone());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    pub struct Position {
        pub x: f32,
    }

    pub struct Velocity {
        pub x: f32,
    }

    declare_node!(Movement {
        position: Position,
        velocity: Velocity,
    });

    fn movable(name: &str) -> Entity {
        let e = Entity::with_name(name);
        e.add(Position { x: 0.0 });
        e.add(Velocity { x: 1.0 });
        e
    }

    #[test]
    fn entity_directory() {
        let engine = Engine::new();
        let e = movable("a");
        engine.add_entity(e.clone()).unwrap();

        assert_eq!(engine.entity("a"), Some(e.clone()));
        assert!(engine.entity("b").is_none());

        engine.remove_entity(&e);
        assert!(engine.entity("a").is_none());

        // a second removal is silent
        engine.remove_entity(&e);
    }

    #[test]
    fn duplicate_names_are_rejected_without_mutation() {
        let engine = Engine::new();
        let first = movable("dup");
        let second = movable("dup");

        engine.add_entity(first.clone()).unwrap();
        assert!(engine.add_entity(second.clone()).is_err());

        assert_eq!(engine.entities().len(), 1);
        assert_eq!(engine.entity("dup"), Some(first));

        // the rejected entity was never wired up
        second.add(Position { x: 9.0 });
        assert_eq!(engine.node_list::<Movement>().len(), 1);
    }

    #[test]
    fn entities_keep_registration_order() {
        let engine = Engine::new();
        for name in &["x", "y", "z"] {
            engine.add_entity(Entity::with_name(*name)).unwrap();
        }
        let names: Vec<String> = engine.entities().iter().map(Entity::name).collect();
        assert_eq!(names, vec!["x", "y", "z"]);

        let mut buf = Vec::new();
        engine.collect_entities(&mut buf);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn node_list_identity_is_stable() {
        let engine = Engine::new();
        engine.add_entity(movable("a")).unwrap();

        let first = engine.node_list::<Movement>();
        assert_eq!(first.len(), 1);

        engine.add_entity(movable("b")).unwrap();
        let second = engine.node_list::<Movement>();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn released_list_stays_empty() {
        let engine = Engine::new();
        engine.add_entity(movable("a")).unwrap();

        let list = engine.node_list::<Movement>();
        assert_eq!(list.len(), 1);

        engine.release_node_list::<Movement>();
        assert_eq!(list.len(), 0);

        // the handle is detached from the engine for good
        engine.add_entity(movable("b")).unwrap();
        assert_eq!(list.len(), 0);

        // a fresh request builds a new family
        assert_eq!(engine.node_list::<Movement>().len(), 2);
    }

    #[test]
    fn rename_updates_directory() {
        let engine = Engine::new();
        let e = movable("before");
        engine.add_entity(e.clone()).unwrap();

        e.set_name("after");
        assert!(engine.entity("before").is_none());
        assert_eq!(engine.entity("after"), Some(e));
    }

    #[test]
    fn colliding_rename_keeps_first_binding() {
        let engine = Engine::new();
        let a = movable("a");
        let b = movable("b");
        engine.add_entity(a.clone()).unwrap();
        engine.add_entity(b.clone()).unwrap();

        b.set_name("a");
        assert_eq!(engine.entity("a"), Some(a));
        assert!(engine.entity("b").is_none());
    }

    #[test]
    fn dispose_empties_the_registry() {
        let engine = Engine::new();
        engine.start();
        engine.add_entity(movable("a")).unwrap();
        let list = engine.node_list::<Movement>();

        engine.dispose();
        assert!(!engine.is_running());
        assert!(engine.entities().is_empty());
        assert!(list.is_empty());
    }
}
