pub use crate::errors::Result;

pub use crate::ecs::component::{ComponentPool, ComponentRef, ComponentType};
pub use crate::ecs::engine::Engine;
pub use crate::ecs::entity::{Entity, EntityId};
pub use crate::ecs::node::{Node, NodeHandle, NodeShape};
pub use crate::ecs::node_list::NodeList;
pub use crate::ecs::system::{ListIteratingSystem, System, SystemCell};

pub use crate::fsm::{EngineState, EngineStateMachine, EntityState, EntityStateMachine};

pub use crate::utils::signal::{ListenerId, Signal};
