//! System-bundle states for the engine.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::ecs::engine::Engine;
use crate::ecs::system::{System, SystemCell};
use crate::errors::Result;
use crate::fsm::ProviderId;
use crate::utils::FastHashMap;

/// Yields the scheduled cell a state installs for one system.
pub trait SystemProvider {
    fn get(&self) -> SystemCell;

    /// Providers with equal identifiers install interchangeable systems, so
    /// a transition between them leaves the running system alone.
    fn identifier(&self) -> ProviderId;

    fn priority(&self) -> i32;

    fn set_priority(&self, priority: i32);
}

/// Always installs the same shared system instance.
pub struct SystemInstanceProvider<S: System> {
    instance: Rc<RefCell<S>>,
    priority: Cell<i32>,
}

impl<S: System> SystemInstanceProvider<S> {
    pub fn new(system: S, priority: i32) -> Self {
        SystemInstanceProvider {
            instance: Rc::new(RefCell::new(system)),
            priority: Cell::new(priority),
        }
    }

    pub fn with_shared(instance: Rc<RefCell<S>>, priority: i32) -> Self {
        SystemInstanceProvider {
            instance,
            priority: Cell::new(priority),
        }
    }
}

impl<S: System> SystemProvider for SystemInstanceProvider<S> {
    fn get(&self) -> SystemCell {
        SystemCell::new(self.instance.clone(), self.priority.get())
    }

    fn identifier(&self) -> ProviderId {
        ProviderId::Ptr(Rc::as_ptr(&self.instance) as usize)
    }

    fn priority(&self) -> i32 {
        self.priority.get()
    }

    fn set_priority(&self, priority: i32) {
        self.priority.set(priority);
    }
}

/// Creates one system instance on first use and keeps installing it.
pub struct SystemSingletonProvider<S: System + Default> {
    instance: RefCell<Option<Rc<RefCell<S>>>>,
    priority: Cell<i32>,
}

impl<S: System + Default> SystemSingletonProvider<S> {
    pub fn new(priority: i32) -> Self {
        SystemSingletonProvider {
            instance: RefCell::new(None),
            priority: Cell::new(priority),
        }
    }

    fn shared(&self) -> Rc<RefCell<S>> {
        self.instance
            .borrow_mut()
            .get_or_insert_with(|| Rc::new(RefCell::new(S::default())))
            .clone()
    }
}

impl<S: System + Default> SystemProvider for SystemSingletonProvider<S> {
    fn get(&self) -> SystemCell {
        SystemCell::new(self.shared(), self.priority.get())
    }

    fn identifier(&self) -> ProviderId {
        ProviderId::Ptr(Rc::as_ptr(&self.shared()) as usize)
    }

    fn priority(&self) -> i32 {
        self.priority.get()
    }

    fn set_priority(&self, priority: i32) {
        self.priority.set(priority);
    }
}

/// Builds a fresh system on each entry. Identity follows the closure.
pub struct DynamicSystemProvider<S: System> {
    closure: Rc<dyn Fn() -> S>,
    priority: Cell<i32>,
}

impl<S: System> DynamicSystemProvider<S> {
    pub fn new<F: Fn() -> S + 'static>(f: F, priority: i32) -> Self {
        DynamicSystemProvider {
            closure: Rc::new(f),
            priority: Cell::new(priority),
        }
    }
}

impl<S: System> SystemProvider for DynamicSystemProvider<S> {
    fn get(&self) -> SystemCell {
        SystemCell::new(
            Rc::new(RefCell::new((self.closure)())),
            self.priority.get(),
        )
    }

    fn identifier(&self) -> ProviderId {
        ProviderId::Ptr(Rc::as_ptr(&self.closure) as *const u8 as usize)
    }

    fn priority(&self) -> i32 {
        self.priority.get()
    }

    fn set_priority(&self, priority: i32) {
        self.priority.set(priority);
    }
}

/// One state's system bundle.
#[derive(Default)]
pub struct EngineState {
    providers: Vec<Rc<dyn SystemProvider>>,
}

impl EngineState {
    pub fn new() -> Self {
        EngineState::default()
    }

    pub fn add_instance<S: System>(&mut self, system: S, priority: i32) -> &mut Self {
        self.add_provider(Rc::new(SystemInstanceProvider::new(system, priority)))
    }

    pub fn add_shared<S: System>(&mut self, system: Rc<RefCell<S>>, priority: i32) -> &mut Self {
        self.add_provider(Rc::new(SystemInstanceProvider::with_shared(system, priority)))
    }

    pub fn add_singleton<S: System + Default>(&mut self, priority: i32) -> &mut Self {
        self.add_provider(Rc::new(SystemSingletonProvider::<S>::new(priority)))
    }

    pub fn add_method<S: System, F: Fn() -> S + 'static>(
        &mut self,
        f: F,
        priority: i32,
    ) -> &mut Self {
        self.add_provider(Rc::new(DynamicSystemProvider::new(f, priority)))
    }

    pub fn add_provider(&mut self, provider: Rc<dyn SystemProvider>) -> &mut Self {
        self.providers.push(provider);
        self
    }

    pub(crate) fn providers(&self) -> &[Rc<dyn SystemProvider>] {
        &self.providers
    }
}

/// Named system-bundle states over one engine.
///
/// The machine remembers exactly which cells it installed, so removal on a
/// transition always unschedules the very instance that was scheduled, even
/// for providers that build a fresh system per entry.
pub struct EngineStateMachine {
    engine: Engine,
    states: FastHashMap<String, EngineState>,
    current: Option<String>,
    installed: Vec<(ProviderId, SystemCell)>,
}

impl EngineStateMachine {
    pub fn new(engine: &Engine) -> Self {
        EngineStateMachine {
            engine: engine.clone(),
            states: FastHashMap::default(),
            current: None,
            installed: Vec::new(),
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_ref().map(String::as_str)
    }

    pub fn add_state<T: Into<String>>(&mut self, name: T, state: EngineState) -> &mut Self {
        self.states.insert(name.into(), state);
        self
    }

    /// Creates (or reopens) a named state for in-place mapping.
    pub fn create_state<T: Into<String>>(&mut self, name: T) -> &mut EngineState {
        self.states.entry(name.into()).or_insert_with(EngineState::new)
    }

    /// Transitions to the named state. Systems provided identically by both
    /// states keep running; everything else from the old state is removed
    /// before the new bundle is scheduled. Changing to the current state is
    /// a no-op; an unknown state is an error.
    pub fn change_state(&mut self, name: &str) -> Result<()> {
        if self.current() == Some(name) {
            return Ok(());
        }

        let providers: Vec<Rc<dyn SystemProvider>> = {
            let state = self
                .states
                .get(name)
                .ok_or_else(|| format_err!("unknown engine state '{}'.", name))?;
            state.providers().to_vec()
        };

        let incoming: Vec<ProviderId> = providers.iter().map(|p| p.identifier()).collect();

        let mut kept = Vec::new();
        for (id, cell) in self.installed.drain(..) {
            if incoming.contains(&id) {
                kept.push((id, cell));
            } else {
                self.engine.remove_system_cell(&cell);
            }
        }

        for provider in providers {
            let id = provider.identifier();
            if kept.iter().any(|(k, _)| *k == id) {
                continue;
            }
            let cell = provider.get();
            self.engine.add_system_cell(cell.clone());
            kept.push((id, cell));
        }

        self.installed = kept;
        self.current = Some(name.to_string());
        Ok(())
    }
}
