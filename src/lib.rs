//! `stencil` is a small entity-component-system runtime. Entities are open
//! bags of typed components; client code declares fixed-shape "node" views
//! over them with `declare_node!`, and the engine maintains one list of
//! matching nodes per view, incrementally and in place, as components and
//! entities come and go. Systems iterate these lists every frame instead of
//! querying entities directly.

#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate smallvec;

pub mod errors;

#[macro_use]
pub mod utils;
#[macro_use]
pub mod ecs;
pub mod fsm;

pub mod prelude;

pub use crate::errors::Result;

pub use crate::ecs::engine::Engine;
pub use crate::ecs::entity::Entity;
pub use crate::ecs::node::Node;
pub use crate::ecs::node_list::NodeList;
pub use crate::ecs::system::System;
