//! Entities are named bags of typed components.
//!
//! An `Entity` is a cheap handle; clones share the same underlying record.
//! It carries no behaviour of its own, only components and the signals that
//! announce component churn to whoever is tracking membership.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::ecs::component::{self, ComponentRef, ComponentType};
use crate::errors::Result;
use crate::utils::{FastHashMap, Signal};

/// Process-unique entity identity, monotonically increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(u64);

static ID_SEED: AtomicU64 = AtomicU64::new(0);
static NAME_SEED: AtomicU64 = AtomicU64::new(0);

/// Payload of the component-added and component-removed signals.
pub type ComponentEvent = (Entity, ComponentType);
/// Payload of the renamed signal; the string is the previous name.
pub type RenameEvent = (Entity, String);

struct EntityInner {
    id: EntityId,
    name: RefCell<String>,
    components: RefCell<FastHashMap<ComponentType, Rc<dyn Any>>>,
    component_added: Signal<ComponentEvent>,
    component_removed: Signal<ComponentEvent>,
    renamed: Signal<RenameEvent>,
}

#[derive(Clone)]
pub struct Entity {
    inner: Rc<EntityInner>,
}

impl Entity {
    /// Constructs an entity with an auto-generated name.
    pub fn new() -> Self {
        let n = NAME_SEED.fetch_add(1, Ordering::Relaxed) + 1;
        Entity::with_name(format!("_entity{}", n))
    }

    /// Constructs an entity with the given name.
    pub fn with_name<T: Into<String>>(name: T) -> Self {
        Entity {
            inner: Rc::new(EntityInner {
                id: EntityId(ID_SEED.fetch_add(1, Ordering::Relaxed) + 1),
                name: RefCell::new(name.into()),
                components: RefCell::new(FastHashMap::default()),
                component_added: Signal::new(),
                component_removed: Signal::new(),
                renamed: Signal::new(),
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> EntityId {
        self.inner.id
    }

    pub fn name(&self) -> String {
        self.inner.name.borrow().clone()
    }

    /// Renames the entity and fires the renamed signal with the old name.
    pub fn set_name<T: Into<String>>(&self, name: T) {
        let old = self.inner.name.replace(name.into());
        self.inner.renamed.emit(&(self.clone(), old));
    }

    /// Fired after a component lands on the entity.
    pub fn component_added(&self) -> &Signal<ComponentEvent> {
        &self.inner.component_added
    }

    /// Fired after a component leaves the entity.
    pub fn component_removed(&self) -> &Signal<ComponentEvent> {
        &self.inner.component_removed
    }

    pub fn renamed(&self) -> &Signal<RenameEvent> {
        &self.inner.renamed
    }

    /// Adds a component, replacing any existing component of the same type.
    /// A replacement fires the removal signal before the addition.
    pub fn add<T: 'static>(&self, v: T) -> &Self {
        self.add_dyn(
            ComponentType::of::<T>(),
            component::component_ref(v) as Rc<dyn Any>,
        )
    }

    /// Adds an existing component cell under an explicit type identity.
    ///
    /// This is how a component gets registered under something other than its
    /// concrete type, and how state machines re-attach provided cells.
    pub fn add_dyn(&self, ctype: ComponentType, cell: Rc<dyn Any>) -> &Self {
        self.remove_dyn(ctype);
        self.inner.components.borrow_mut().insert(ctype, cell);
        self.inner.component_added.emit(&(self.clone(), ctype));
        self
    }

    /// Detaches and returns the component of type `T`. Absence is a silent
    /// no-op yielding `None`.
    pub fn remove<T: 'static>(&self) -> Option<ComponentRef<T>> {
        self.remove_dyn(ComponentType::of::<T>())
            .and_then(|cell| component::downcast_ref(&cell))
    }

    /// Detaches and returns a component cell by type identity.
    pub fn remove_dyn(&self, ctype: ComponentType) -> Option<Rc<dyn Any>> {
        let cell = self.inner.components.borrow_mut().remove(&ctype);
        if cell.is_some() {
            self.inner.component_removed.emit(&(self.clone(), ctype));
        }
        cell
    }

    /// Looks up the component of type `T`, failing when it is absent or was
    /// registered under a mismatched cell type.
    pub fn component<T: 'static>(&self) -> Result<ComponentRef<T>> {
        match self.try_component::<T>() {
            Some(v) => Ok(v),
            None => Err(format_err!(
                "entity '{}' has no component {}.",
                self.name(),
                ComponentType::of::<T>()
            )),
        }
    }

    pub fn try_component<T: 'static>(&self) -> Option<ComponentRef<T>> {
        self.inner
            .components
            .borrow()
            .get(&ComponentType::of::<T>())
            .and_then(component::downcast_ref)
    }

    pub fn has<T: 'static>(&self) -> bool {
        self.has_dyn(ComponentType::of::<T>())
    }

    pub fn has_dyn(&self, ctype: ComponentType) -> bool {
        self.inner.components.borrow().contains_key(&ctype)
    }

    /// Returns the number of components currently attached.
    pub fn len(&self) -> usize {
        self.inner.components.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots every attached component cell. Later mutation of the entity
    /// does not touch the returned vector.
    pub fn components(&self) -> Vec<Rc<dyn Any>> {
        self.inner.components.borrow().values().cloned().collect()
    }

    /// Fills the caller's buffer with the attached component cells, clearing
    /// it first.
    pub fn collect_components(&self, buf: &mut Vec<Rc<dyn Any>>) {
        buf.clear();
        buf.extend(self.inner.components.borrow().values().cloned());
    }
}

impl Default for Entity {
    fn default() -> Self {
        Entity::new()
    }
}

impl PartialEq for Entity {
    fn eq(&self, rhs: &Self) -> bool {
        self.inner.id == rhs.inner.id
    }
}

impl Eq for Entity {}

impl ::std::hash::Hash for Entity {
    fn hash<H: ::std::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Entity({:?}, '{}')", self.inner.id, self.inner.name.borrow())
    }
}
