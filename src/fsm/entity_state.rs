//! Component-bundle states for a single entity.

use std::any::Any;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::ecs::component::{component_ref, ComponentRef, ComponentType};
use crate::ecs::entity::Entity;
use crate::errors::Result;
use crate::fsm::ProviderId;
use crate::utils::FastHashMap;

/// Yields the component cell a state attaches for one component type.
pub trait ComponentProvider {
    fn get(&self) -> Rc<dyn Any>;

    /// Providers with equal identifiers are interchangeable; a transition
    /// between two states that provide a component identically leaves the
    /// attached component alone.
    fn identifier(&self) -> ProviderId;
}

/// Always provides the same shared cell.
pub struct ComponentInstanceProvider<T> {
    instance: ComponentRef<T>,
}

impl<T> ComponentInstanceProvider<T> {
    pub fn new(v: T) -> Self {
        ComponentInstanceProvider {
            instance: component_ref(v),
        }
    }

    pub fn with_cell(cell: ComponentRef<T>) -> Self {
        ComponentInstanceProvider { instance: cell }
    }
}

impl<T: 'static> ComponentProvider for ComponentInstanceProvider<T> {
    fn get(&self) -> Rc<dyn Any> {
        self.instance.clone() as Rc<dyn Any>
    }

    fn identifier(&self) -> ProviderId {
        ProviderId::Ptr(Rc::as_ptr(&self.instance) as usize)
    }
}

/// Provides a fresh default-constructed component per request.
pub struct ComponentTypeProvider<T> {
    _marker: PhantomData<T>,
}

impl<T> ComponentTypeProvider<T> {
    pub fn new() -> Self {
        ComponentTypeProvider {
            _marker: PhantomData,
        }
    }
}

impl<T: Default + 'static> ComponentProvider for ComponentTypeProvider<T> {
    fn get(&self) -> Rc<dyn Any> {
        component_ref(T::default()) as Rc<dyn Any>
    }

    fn identifier(&self) -> ProviderId {
        ProviderId::Type(::std::any::TypeId::of::<T>())
    }
}

/// Creates one cell on first use and keeps handing it out.
pub struct ComponentSingletonProvider<T> {
    instance: RefCell<Option<ComponentRef<T>>>,
}

impl<T: Default> ComponentSingletonProvider<T> {
    pub fn new() -> Self {
        ComponentSingletonProvider {
            instance: RefCell::new(None),
        }
    }

    fn cell(&self) -> ComponentRef<T> {
        self.instance
            .borrow_mut()
            .get_or_insert_with(|| component_ref(T::default()))
            .clone()
    }
}

impl<T: Default + 'static> ComponentProvider for ComponentSingletonProvider<T> {
    fn get(&self) -> Rc<dyn Any> {
        self.cell() as Rc<dyn Any>
    }

    // the singleton is created on demand, so the identity is stable even
    // when it is queried before the first `get`
    fn identifier(&self) -> ProviderId {
        ProviderId::Ptr(Rc::as_ptr(&self.cell()) as usize)
    }
}

/// Provides whatever the closure returns, wrapped in a fresh cell. Identity
/// follows the closure, so two states sharing one closure share the mapping.
pub struct DynamicComponentProvider<T: 'static> {
    closure: Rc<dyn Fn() -> T>,
}

impl<T: 'static> DynamicComponentProvider<T> {
    pub fn new<F: Fn() -> T + 'static>(f: F) -> Self {
        DynamicComponentProvider {
            closure: Rc::new(f),
        }
    }
}

impl<T: 'static> ComponentProvider for DynamicComponentProvider<T> {
    fn get(&self) -> Rc<dyn Any> {
        component_ref((self.closure)()) as Rc<dyn Any>
    }

    fn identifier(&self) -> ProviderId {
        ProviderId::Ptr(Rc::as_ptr(&self.closure) as *const u8 as usize)
    }
}

/// One state's component bundle: which component types it attaches, and the
/// provider for each.
#[derive(Default)]
pub struct EntityState {
    providers: FastHashMap<ComponentType, Rc<dyn ComponentProvider>>,
}

impl EntityState {
    pub fn new() -> Self {
        EntityState::default()
    }

    /// Starts a mapping for component type `T`; finish it with one of the
    /// `with_*` calls.
    pub fn add<T: 'static>(&mut self) -> StateComponentMapping<T> {
        StateComponentMapping {
            state: self,
            ctype: ComponentType::of::<T>(),
            _marker: PhantomData,
        }
    }

    pub fn add_provider(
        &mut self,
        ctype: ComponentType,
        provider: Rc<dyn ComponentProvider>,
    ) -> &mut Self {
        self.providers.insert(ctype, provider);
        self
    }

    pub fn has(&self, ctype: ComponentType) -> bool {
        self.providers.contains_key(&ctype)
    }

    pub fn get(&self, ctype: ComponentType) -> Option<Rc<dyn ComponentProvider>> {
        self.providers.get(&ctype).cloned()
    }

    pub(crate) fn providers(&self) -> &FastHashMap<ComponentType, Rc<dyn ComponentProvider>> {
        &self.providers
    }
}

/// An in-flight mapping of one component type inside an `EntityState`.
pub struct StateComponentMapping<'a, T> {
    state: &'a mut EntityState,
    ctype: ComponentType,
    _marker: PhantomData<T>,
}

impl<'a, T: 'static> StateComponentMapping<'a, T> {
    /// Maps to this exact value, shared across every visit to the state.
    pub fn with_instance(self, v: T) -> &'a mut EntityState {
        self.finish(Rc::new(ComponentInstanceProvider::new(v)))
    }

    /// Maps to an existing cell.
    pub fn with_cell(self, cell: ComponentRef<T>) -> &'a mut EntityState {
        self.finish(Rc::new(ComponentInstanceProvider::with_cell(cell)))
    }

    /// Maps to a fresh default value on every entry into the state.
    pub fn with_type(self) -> &'a mut EntityState
    where
        T: Default,
    {
        self.finish(Rc::new(ComponentTypeProvider::<T>::new()))
    }

    /// Maps to one lazily created value, shared across visits.
    pub fn with_singleton(self) -> &'a mut EntityState
    where
        T: Default,
    {
        self.finish(Rc::new(ComponentSingletonProvider::<T>::new()))
    }

    /// Maps to whatever the closure produces on each entry.
    pub fn with_method<F: Fn() -> T + 'static>(self, f: F) -> &'a mut EntityState {
        self.finish(Rc::new(DynamicComponentProvider::new(f)))
    }

    pub fn with_provider(self, provider: Rc<dyn ComponentProvider>) -> &'a mut EntityState {
        self.finish(provider)
    }

    fn finish(self, provider: Rc<dyn ComponentProvider>) -> &'a mut EntityState {
        self.state.add_provider(self.ctype, provider)
    }
}

/// Named component-bundle states over one entity.
pub struct EntityStateMachine {
    entity: Entity,
    states: FastHashMap<String, EntityState>,
    current: Option<String>,
}

impl EntityStateMachine {
    pub fn new(entity: Entity) -> Self {
        EntityStateMachine {
            entity,
            states: FastHashMap::default(),
            current: None,
        }
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_ref().map(String::as_str)
    }

    pub fn add_state<T: Into<String>>(&mut self, name: T, state: EntityState) -> &mut Self {
        self.states.insert(name.into(), state);
        self
    }

    /// Creates (or reopens) a named state for in-place mapping.
    pub fn create_state<T: Into<String>>(&mut self, name: T) -> &mut EntityState {
        self.states.entry(name.into()).or_insert_with(EntityState::new)
    }

    /// Transitions to the named state. Components provided identically by
    /// both states stay attached; everything else from the old state is
    /// removed before the new bundle lands. Changing to the current state is
    /// a no-op; an unknown state is an error.
    pub fn change_state(&mut self, name: &str) -> Result<()> {
        if self.current() == Some(name) {
            return Ok(());
        }

        let mut to_add: Vec<(ComponentType, Rc<dyn ComponentProvider>)> = {
            let state = self
                .states
                .get(name)
                .ok_or_else(|| format_err!("unknown entity state '{}'.", name))?;
            state.providers().iter().map(|(t, p)| (*t, p.clone())).collect()
        };

        if let Some(current) = self.current.as_ref().and_then(|n| self.states.get(n)) {
            for (ctype, provider) in current.providers() {
                let carried = to_add
                    .iter()
                    .position(|(t, p)| t == ctype && p.identifier() == provider.identifier());
                match carried {
                    Some(at) => {
                        to_add.remove(at);
                    }
                    None => {
                        self.entity.remove_dyn(*ctype);
                    }
                }
            }
        }

        for (ctype, provider) in to_add {
            self.entity.add_dyn(ctype, provider.get());
        }

        self.current = Some(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Weapon(&'static str);

    #[derive(Debug, Default, PartialEq)]
    struct Shield(i32);

    #[derive(Debug, Default, PartialEq)]
    struct Stamina(i32);

    fn machine() -> EntityStateMachine {
        EntityStateMachine::new(Entity::new())
    }

    #[test]
    fn transition_swaps_components() {
        let mut fsm = machine();
        fsm.create_state("melee").add::<Weapon>().with_instance(Weapon("sword"));
        fsm.create_state("ranged").add::<Weapon>().with_instance(Weapon("bow"));

        fsm.change_state("melee").unwrap();
        assert_eq!(
            *fsm.entity().component::<Weapon>().unwrap().borrow(),
            Weapon("sword")
        );

        fsm.change_state("ranged").unwrap();
        assert_eq!(
            *fsm.entity().component::<Weapon>().unwrap().borrow(),
            Weapon("bow")
        );
        assert_eq!(fsm.entity().len(), 1);
    }

    #[test]
    fn unknown_state_is_an_error() {
        let mut fsm = machine();
        assert!(fsm.change_state("missing").is_err());
        assert!(fsm.current().is_none());
    }

    #[test]
    fn same_state_change_is_a_no_op() {
        let mut fsm = machine();
        fsm.create_state("only").add::<Stamina>().with_type();

        fsm.change_state("only").unwrap();
        let before = fsm.entity().component::<Stamina>().unwrap();
        *before.borrow_mut() = Stamina(7);

        // a type provider would hand out a fresh default if this re-entered
        fsm.change_state("only").unwrap();
        let after = fsm.entity().component::<Stamina>().unwrap();
        assert!(Rc::ptr_eq(&before, &after));
        assert_eq!(*after.borrow(), Stamina(7));
    }

    #[test]
    fn identical_providers_survive_transitions() {
        let shared = component_ref(Shield(10));

        let mut fsm = machine();
        fsm.create_state("a")
            .add::<Shield>()
            .with_cell(shared.clone())
            .add::<Weapon>()
            .with_instance(Weapon("sword"));
        fsm.create_state("b").add::<Shield>().with_cell(shared.clone());

        fsm.change_state("a").unwrap();
        *fsm.entity().component::<Shield>().unwrap().borrow_mut() = Shield(3);

        fsm.change_state("b").unwrap();
        assert!(!fsm.entity().has::<Weapon>());
        let shield = fsm.entity().component::<Shield>().unwrap();
        assert!(Rc::ptr_eq(&shield, &shared));
        assert_eq!(*shield.borrow(), Shield(3));
    }

    #[test]
    fn type_providers_are_interchangeable() {
        let mut fsm = machine();
        fsm.create_state("a").add::<Stamina>().with_type();
        fsm.create_state("b").add::<Stamina>().with_type();

        fsm.change_state("a").unwrap();
        let cell = fsm.entity().component::<Stamina>().unwrap();
        *cell.borrow_mut() = Stamina(5);

        // both states provide by type, so the component is carried over
        fsm.change_state("b").unwrap();
        let after = fsm.entity().component::<Stamina>().unwrap();
        assert!(Rc::ptr_eq(&cell, &after));
    }

    #[test]
    fn singleton_provider_reuses_one_cell() {
        let provider = Rc::new(ComponentSingletonProvider::<Stamina>::new());
        let id = provider.identifier();

        let first = provider.get();
        let second = provider.get();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(provider.identifier(), id);
    }

    #[test]
    fn dynamic_provider_identity_follows_the_closure() {
        let a = DynamicComponentProvider::new(|| Stamina(1));
        let b = DynamicComponentProvider::new(|| Stamina(1));
        assert_ne!(a.identifier(), b.identifier());
        assert_eq!(a.identifier(), a.identifier());
    }
}
