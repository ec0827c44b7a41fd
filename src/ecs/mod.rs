//! The entity-component-system runtime.
//!
//! Entities are named bags of components; node types declare which component
//! shapes they care about; the engine keeps one incrementally maintained node
//! list per node type and drives systems over them in priority order.
//!
//! ```ignore
//! let engine = Engine::new();
//!
//! let e = Entity::with_name("player");
//! e.add(Position { x: 0.0, y: 0.0 });
//! e.add(Velocity { x: 1.0, y: 0.0 });
//! engine.add_entity(e)?;
//!
//! for (_, node) in engine.node_list::<Movement>().iter() {
//!     let mut position = node.position.borrow_mut();
//!     position.x += node.velocity.borrow().x;
//! }
//! ```

pub mod component;
pub mod entity;
#[macro_use]
pub mod node;
pub mod node_pool;
pub mod node_list;
pub mod family;
pub mod system;
pub mod engine;

pub use self::component::{ComponentPool, ComponentRef, ComponentType};
pub use self::engine::Engine;
pub use self::entity::{Entity, EntityId};
pub use self::node::{Node, NodeHandle, NodeShape};
pub use self::node_list::NodeList;
pub use self::system::{ListIteratingSystem, System, SystemCell};
