//! Component identity and shared component cells.
//!
//! A component is plain data owned by an entity. The runtime never looks
//! inside a component; it only tracks which component *types* an entity
//! currently owns. Values live in shared `ComponentRef<T>` cells so that a
//! node slot and the owning entity observe the same storage.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::utils::FastHashMap;

/// A shared, mutable component cell. Cloning is cheap and every clone refers
/// to the same underlying value.
pub type ComponentRef<T> = Rc<RefCell<T>>;

/// Wraps a value into a fresh component cell.
pub fn component_ref<T>(v: T) -> ComponentRef<T> {
    Rc::new(RefCell::new(v))
}

/// The runtime identity of a component type. Equality and hashing go through
/// the `TypeId` only; the name is carried for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct ComponentType {
    id: TypeId,
    name: &'static str,
}

impl ComponentType {
    pub fn of<T: 'static>() -> Self {
        ComponentType {
            id: TypeId::of::<T>(),
            name: ::std::any::type_name::<T>(),
        }
    }

    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, rhs: &Self) -> bool {
        self.id == rhs.id
    }
}

impl Eq for ComponentType {}

impl ::std::hash::Hash for ComponentType {
    fn hash<H: ::std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Recovers a typed cell from its erased form. Returns `None` when the cell
/// was built from a different component type.
pub(crate) fn downcast_ref<T: 'static>(cell: &Rc<dyn Any>) -> Option<ComponentRef<T>> {
    cell.clone().downcast::<RefCell<T>>().ok()
}

/// An explicit recycling context for component values.
///
/// Frequently churned components can be parked here instead of dropped, and
/// handed back out by `get_one`. The pool is an ordinary value owned by the
/// caller, nothing is process-wide.
#[derive(Default)]
pub struct ComponentPool {
    pools: FastHashMap<TypeId, Vec<Rc<dyn Any>>>,
}

impl ComponentPool {
    pub fn new() -> Self {
        ComponentPool::default()
    }

    /// Pops a previously disposed cell of `T`, or builds a fresh default one.
    /// The returned cell keeps whatever value it held when it was disposed.
    pub fn get_one<T: Default + 'static>(&mut self) -> ComponentRef<T> {
        if let Some(pool) = self.pools.get_mut(&TypeId::of::<T>()) {
            while let Some(cell) = pool.pop() {
                if let Some(cell) = downcast_ref::<T>(&cell) {
                    return cell;
                }
            }
        }

        component_ref(T::default())
    }

    /// Parks a cell for later reuse.
    pub fn dispose<T: 'static>(&mut self, cell: ComponentRef<T>) {
        self.pools
            .entry(TypeId::of::<T>())
            .or_insert_with(Vec::new)
            .push(cell as Rc<dyn Any>);
    }

    /// Drops every parked cell.
    pub fn clean(&mut self) {
        self.pools.clear();
    }
}
