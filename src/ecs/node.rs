//! Nodes are fixed-shape views over an entity's components.
//!
//! A node type declares up front which component types it needs, one slot per
//! type. The runtime matches entities against that shape and keeps a bound
//! node alive for every matching entity. Slots hold `ComponentRef` cells, so
//! mutating a component through a node is visible on the entity and in every
//! other node bound to it.

use smallvec::SmallVec;

use crate::ecs::component::ComponentType;
use crate::ecs::entity::Entity;

impl_handle!(NodeHandle);

/// The component types a node requires, with the slot name each one binds to.
/// Enumerated exactly once per node type.
#[derive(Debug, Clone, Default)]
pub struct NodeShape {
    slots: SmallVec<[(ComponentType, &'static str); 8]>,
}

impl NodeShape {
    pub fn new() -> Self {
        NodeShape::default()
    }

    pub fn require<T: 'static>(&mut self, slot: &'static str) {
        self.slots.push((ComponentType::of::<T>(), slot));
    }

    pub fn contains(&self, ctype: ComponentType) -> bool {
        self.slots.iter().any(|&(t, _)| t == ctype)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ComponentType, &'static str)> {
        self.slots.iter()
    }
}

/// A fixed-shape view type, usually declared with `declare_node!`.
pub trait Node: Clone + Sized + 'static {
    /// The component types this node requires.
    fn shape() -> NodeShape;

    /// Binds a node against the entity's current components. `None` when any
    /// required component is missing.
    fn bind(entity: &Entity) -> Option<Self>;
}

/// Declares a node struct with one `ComponentRef` slot per listed component
/// type, and derives its `Node` implementation.
///
/// ```ignore
/// declare_node!(Movement {
///     position: Position,
///     velocity: Velocity,
/// });
/// ```
#[macro_export]
macro_rules! declare_node {
    ($name:ident { $($field:ident: $cmp:ty),* $(,)* }) => {
        #[derive(Clone)]
        pub struct $name {
            $(pub $field: $crate::ecs::component::ComponentRef<$cmp>,)*
        }

        impl $crate::ecs::node::Node for $name {
            fn shape() -> $crate::ecs::node::NodeShape {
                let mut shape = $crate::ecs::node::NodeShape::new();
                $(shape.require::<$cmp>(stringify!($field));)*
                shape
            }

            fn bind(entity: &$crate::ecs::entity::Entity) -> Option<Self> {
                Some($name {
                    $($field: entity.try_component::<$cmp>()?,)*
                })
            }
        }
    };
}
