#[macro_use]
extern crate stencil;
extern crate env_logger;

use stencil::prelude::*;

#[derive(Default)]
pub struct Health {
    pub hp: i32,
}

#[derive(Default)]
pub struct Ghost;

declare_node!(Living {
    health: Health,
});

declare_node!(Haunting {
    ghost: Ghost,
});

#[test]
fn entity_states_drive_family_membership() {
    let _ = env_logger::try_init();

    let engine = Engine::new();
    let e = Entity::with_name("npc");
    engine.add_entity(e.clone()).unwrap();

    let living = engine.node_list::<Living>();
    let haunting = engine.node_list::<Haunting>();

    let mut fsm = EntityStateMachine::new(e.clone());
    fsm.create_state("alive")
        .add::<Health>()
        .with_instance(Health { hp: 10 });
    fsm.create_state("dead").add::<Ghost>().with_type();

    fsm.change_state("alive").unwrap();
    assert_eq!(living.len(), 1);
    assert_eq!(haunting.len(), 0);

    // the transition flows through the entity's signals into the families
    fsm.change_state("dead").unwrap();
    assert_eq!(living.len(), 0);
    assert_eq!(haunting.len(), 1);
    assert!(!e.has::<Health>());
}

#[test]
fn instance_components_persist_across_revisits() {
    let e = Entity::new();
    let mut fsm = EntityStateMachine::new(e.clone());
    fsm.create_state("alive")
        .add::<Health>()
        .with_instance(Health { hp: 10 });
    fsm.create_state("dead").add::<Ghost>().with_type();

    fsm.change_state("alive").unwrap();
    e.component::<Health>().unwrap().borrow_mut().hp = 3;

    fsm.change_state("dead").unwrap();
    fsm.change_state("alive").unwrap();

    // the instance provider keeps one cell across visits
    assert_eq!(e.component::<Health>().unwrap().borrow().hp, 3);
}

#[test]
fn engine_states_swap_behaviour() {
    let engine = Engine::new();
    let e = Entity::with_name("npc");
    e.add(Health { hp: 4 });
    engine.add_entity(e.clone()).unwrap();

    let mut fsm = EngineStateMachine::new(&engine);
    fsm.create_state("decay").add_method(
        || {
            ListIteratingSystem::<Living>::new(|_, node, _| {
                node.health.borrow_mut().hp -= 1;
            })
        },
        0,
    );
    fsm.create_state("idle");

    fsm.change_state("decay").unwrap();
    engine.update(1.0);
    engine.update(1.0);
    assert_eq!(e.component::<Health>().unwrap().borrow().hp, 2);

    fsm.change_state("idle").unwrap();
    engine.update(1.0);
    assert_eq!(e.component::<Health>().unwrap().borrow().hp, 2);
}
