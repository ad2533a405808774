// Dependency Manager: per-bundle declarative components that expose
// provided services and track required/optional service dependencies as
// state machines driven off registry events. Components move through
// Inactive/Initialised/Starting/Active/Stopping/Suspended as their
// dependencies come and go, with Suspend and Locking update strategies
// governing what happens when a required dependency disappears mid-flight.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ModError, Result};
use crate::filter::Filter;
use crate::properties::Properties;
use crate::registry::{AnyService, RegistrationHandle, Reference, ServiceEvent, ServiceRegistry};
use crate::version::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStrategy {
    Suspend,
    Locking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DependencyState {
    Disabled,
    Tracking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Inactive,
    Initialised,
    Starting,
    Active,
    Stopping,
    Suspended,
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComponentState::Inactive => "INACTIVE",
            ComponentState::Initialised => "INITIALISED",
            ComponentState::Starting => "STARTING",
            ComponentState::Active => "ACTIVE",
            ComponentState::Stopping => "STOPPING",
            ComponentState::Suspended => "SUSPENDED",
        };
        write!(f, "{s}")
    }
}

pub type BindCallback = Arc<dyn Fn(&Arc<AnyService>, &Reference) + Send + Sync>;
pub type UnbindCallback = Arc<dyn Fn(&Reference) + Send + Sync>;
pub type LifecycleCallback = Arc<dyn Fn(&Arc<AnyService>) -> Result<()> + Send + Sync>;

pub struct ServiceDependency {
    pub interface: String,
    pub filter: Option<Filter>,
    pub cardinality: Cardinality,
    pub required: bool,
    pub strategy: UpdateStrategy,
    state: DependencyState,
    bound_refs: Vec<Reference>,
    add_cb: Option<BindCallback>,
    remove_cb: Option<UnbindCallback>,
    listener_id: Option<u64>,
}

impl ServiceDependency {
    pub fn required(interface: impl Into<String>, cardinality: Cardinality, strategy: UpdateStrategy) -> Self {
        Self {
            interface: interface.into(),
            filter: None,
            cardinality,
            required: true,
            strategy,
            state: DependencyState::Disabled,
            bound_refs: Vec::new(),
            add_cb: None,
            remove_cb: None,
            listener_id: None,
        }
    }

    pub fn optional(interface: impl Into<String>, cardinality: Cardinality) -> Self {
        Self {
            interface: interface.into(),
            filter: None,
            cardinality,
            required: false,
            strategy: UpdateStrategy::Locking,
            state: DependencyState::Disabled,
            bound_refs: Vec::new(),
            add_cb: None,
            remove_cb: None,
            listener_id: None,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn on_add(mut self, cb: BindCallback) -> Self {
        self.add_cb = Some(cb);
        self
    }

    pub fn on_remove(mut self, cb: UnbindCallback) -> Self {
        self.remove_cb = Some(cb);
        self
    }

    pub fn bound_refs(&self) -> &[Reference] {
        &self.bound_refs
    }

    fn is_available(&self) -> bool {
        !self.required || !self.bound_refs.is_empty()
    }

    fn combined_filter(&self) -> Filter {
        let object_class = Filter::Equal("objectClass".to_string(), self.interface.clone());
        match &self.filter {
            Some(f) => Filter::And(vec![object_class, f.clone()]),
            None => object_class,
        }
    }

    fn insert_ranked(&mut self, reference: Reference) {
        let pos = self
            .bound_refs
            .iter()
            .position(|r| r.ranking() < reference.ranking());
        match pos {
            Some(i) => self.bound_refs.insert(i, reference),
            None => self.bound_refs.push(reference),
        }
    }

    fn remove_by_id(&mut self, id: u64) -> Option<Reference> {
        let pos = self.bound_refs.iter().position(|r| r.id() == id)?;
        Some(self.bound_refs.remove(pos))
    }

    fn contains_id(&self, id: u64) -> bool {
        self.bound_refs.iter().any(|r| r.id() == id)
    }
}

pub struct ProvidedService {
    pub interface: String,
    pub version: Option<Version>,
    pub props: Properties,
    registration: Option<RegistrationHandle>,
}

impl ProvidedService {
    pub fn new(interface: impl Into<String>, version: Option<Version>, props: Properties) -> Self {
        Self {
            interface: interface.into(),
            version,
            props,
            registration: None,
        }
    }
}

pub struct Component {
    pub uuid: Uuid,
    pub name: String,
    instance: Arc<AnyService>,
    state: ComponentState,
    dependencies: Vec<ServiceDependency>,
    provides: Vec<ProvidedService>,
    start_cb: Option<LifecycleCallback>,
    stop_cb: Option<LifecycleCallback>,
}

impl Component {
    pub fn state(&self) -> ComponentState {
        self.state
    }

    pub fn dependencies(&self) -> &[ServiceDependency] {
        &self.dependencies
    }
}

pub struct ComponentBuilder {
    name: String,
    instance: Arc<AnyService>,
    dependencies: Vec<ServiceDependency>,
    provides: Vec<ProvidedService>,
    start_cb: Option<LifecycleCallback>,
    stop_cb: Option<LifecycleCallback>,
}

impl ComponentBuilder {
    pub fn new(name: impl Into<String>, instance: Arc<AnyService>) -> Self {
        Self {
            name: name.into(),
            instance,
            dependencies: Vec::new(),
            provides: Vec::new(),
            start_cb: None,
            stop_cb: None,
        }
    }

    pub fn with_dependency(mut self, dep: ServiceDependency) -> Self {
        self.dependencies.push(dep);
        self
    }

    pub fn with_provided_service(mut self, svc: ProvidedService) -> Self {
        self.provides.push(svc);
        self
    }

    pub fn on_start(mut self, cb: LifecycleCallback) -> Self {
        self.start_cb = Some(cb);
        self
    }

    pub fn on_stop(mut self, cb: LifecycleCallback) -> Self {
        self.stop_cb = Some(cb);
        self
    }

    pub fn build(self) -> Component {
        Component {
            uuid: Uuid::new_v4(),
            name: self.name,
            instance: self.instance,
            state: ComponentState::Inactive,
            dependencies: self.dependencies,
            provides: self.provides,
            start_cb: self.start_cb,
            stop_cb: self.stop_cb,
        }
    }
}

/// Owns the set of `Component`s declared by a single bundle.
pub struct DependencyManager {
    bundle_id: u64,
    registry: ServiceRegistry,
    components: RwLock<HashMap<Uuid, Arc<RwLock<Component>>>>,
}

impl DependencyManager {
    pub fn new(bundle_id: u64, registry: ServiceRegistry) -> Arc<Self> {
        Arc::new(Self {
            bundle_id,
            registry,
            components: RwLock::new(HashMap::new()),
        })
    }

    pub fn add_component(self: &Arc<Self>, component: Component) -> Uuid {
        let id = component.uuid;
        let cell = Arc::new(RwLock::new(component));
        self.components.write().insert(id, Arc::clone(&cell));
        self.subscribe_dependencies(id, &cell);
        self.reconcile(&cell);
        id
    }

    pub fn component_state(&self, id: Uuid) -> Option<ComponentState> {
        self.components.read().get(&id).map(|c| c.read().state)
    }

    /// Tears down every still-active component, in no particular order. Used
    /// when the owning bundle stops so lingering provided-service
    /// registrations and started components don't outlive it.
    pub fn teardown_all(&self) {
        let cells: Vec<Arc<RwLock<Component>>> = self.components.read().values().cloned().collect();
        for cell in cells {
            if cell.read().state == ComponentState::Active {
                self.teardown(&cell);
            }
        }
    }

    pub fn remove_component(&self, id: Uuid) -> Result<()> {
        let cell = self
            .components
            .write()
            .remove(&id)
            .ok_or_else(|| ModError::NotFound(format!("component {id}")))?;

        if cell.read().state == ComponentState::Active {
            self.teardown(&cell);
        }

        let listener_ids: Vec<u64> = cell
            .read()
            .dependencies
            .iter()
            .filter_map(|d| d.listener_id)
            .collect();
        for listener_id in listener_ids {
            let _ = self.registry.remove_listener(listener_id);
        }
        Ok(())
    }

    fn subscribe_dependencies(self: &Arc<Self>, id: Uuid, cell: &Arc<RwLock<Component>>) {
        let dep_count = cell.read().dependencies.len();
        for idx in 0..dep_count {
            let filter = cell.read().dependencies[idx].combined_filter();
            let manager = Arc::clone(self);
            // Listener first, then a backfill scan: any service registered
            // concurrently with the scan arrives as a `Registered` event
            // instead, and `contains_id` below drops the resulting duplicate.
            let listener_id = self.registry.add_listener(
                self.bundle_id,
                Some(filter.clone()),
                Box::new(move |event| manager.on_service_event(id, idx, event)),
            );
            cell.write().dependencies[idx].listener_id = Some(listener_id);
            cell.write().dependencies[idx].state = DependencyState::Tracking;

            let existing = self.registry.find_references(None, Some(&filter)).unwrap_or_default();
            for reference in existing {
                let already_bound = cell.read().dependencies[idx].contains_id(reference.id());
                if already_bound {
                    continue;
                }
                self.bind(cell, idx, reference);
            }
        }
    }

    fn on_service_event(self: &Arc<Self>, id: Uuid, dep_idx: usize, event: ServiceEvent) {
        let Some(cell) = self.components.read().get(&id).cloned() else {
            return;
        };
        match event {
            ServiceEvent::Registered(info) => {
                if let Some(reference) = self.registry.reference_for_id(info.id) {
                    self.bind(&cell, dep_idx, reference);
                }
            }
            ServiceEvent::Unregistering(info) => {
                self.handle_removal(&cell, dep_idx, info.id);
            }
            ServiceEvent::Modified(_, _) => {}
        }
        self.reconcile(&cell);
    }

    fn bind(&self, cell: &Arc<RwLock<Component>>, dep_idx: usize, reference: Reference) {
        let Some(svc) = self.registry.get_service(self.bundle_id, &reference) else {
            return;
        };
        let add_cb = cell.read().dependencies[dep_idx].add_cb.clone();
        if let Some(cb) = add_cb {
            cb(&svc, &reference);
        }
        cell.write().dependencies[dep_idx].insert_ranked(reference);
    }

    fn handle_removal(&self, cell: &Arc<RwLock<Component>>, dep_idx: usize, svc_id: u64) {
        let (last_required_ref, strategy, was_active) = {
            let component = cell.read();
            let dep = &component.dependencies[dep_idx];
            let losing_last = dep.required && dep.bound_refs.len() == 1 && dep.bound_refs[0].id() == svc_id;
            (losing_last, dep.strategy, component.state == ComponentState::Active)
        };

        if last_required_ref && was_active && strategy == UpdateStrategy::Suspend {
            // The stop callback must observe the dependency still bound.
            self.suspend(cell);
        }

        let (removed_ref, remove_cb) = {
            let mut component = cell.write();
            let dep = &mut component.dependencies[dep_idx];
            (dep.remove_by_id(svc_id), dep.remove_cb.clone())
        };
        if let Some(reference) = removed_ref {
            if let Some(cb) = remove_cb {
                cb(&reference);
            }
            self.registry.unget_service(self.bundle_id, &reference);
        }
    }

    fn reconcile(&self, cell: &Arc<RwLock<Component>>) {
        let (state, all_satisfied) = {
            let component = cell.read();
            let satisfied = component.dependencies.iter().all(|d| d.is_available());
            (component.state, satisfied)
        };

        match (state, all_satisfied) {
            (ComponentState::Inactive, true) => {
                cell.write().state = ComponentState::Initialised;
                debug!("component reached INITIALISED, starting");
                self.start(cell);
            }
            (ComponentState::Initialised, false) => {
                cell.write().state = ComponentState::Inactive;
            }
            (ComponentState::Suspended, true) => {
                self.reactivate(cell);
            }
            _ => {}
        }
    }

    fn start(&self, cell: &Arc<RwLock<Component>>) {
        cell.write().state = ComponentState::Starting;
        let (instance, start_cb) = {
            let component = cell.read();
            (Arc::clone(&component.instance), component.start_cb.clone())
        };
        let result = match &start_cb {
            Some(cb) => cb(&instance),
            None => Ok(()),
        };
        match result {
            Ok(()) => {
                self.register_provided_services(cell);
                cell.write().state = ComponentState::Active;
            }
            Err(e) => {
                warn!("component start callback failed: {e}");
                cell.write().state = ComponentState::Initialised;
            }
        }
    }

    /// Stop callback + deregistration for a component losing its only bound
    /// required reference. Leaves the component `Suspended`.
    fn suspend(&self, cell: &Arc<RwLock<Component>>) {
        let (instance, stop_cb) = {
            let component = cell.read();
            (Arc::clone(&component.instance), component.stop_cb.clone())
        };
        if let Some(cb) = stop_cb {
            if let Err(e) = cb(&instance) {
                warn!("component stop callback failed during suspend: {e}");
            }
        }
        self.deregister_provided_services(cell);
        cell.write().state = ComponentState::Suspended;
    }

    fn reactivate(&self, cell: &Arc<RwLock<Component>>) {
        let (instance, start_cb) = {
            let component = cell.read();
            (Arc::clone(&component.instance), component.start_cb.clone())
        };
        let result = match &start_cb {
            Some(cb) => cb(&instance),
            None => Ok(()),
        };
        match result {
            Ok(()) => {
                self.register_provided_services(cell);
                cell.write().state = ComponentState::Active;
            }
            Err(e) => warn!("component failed to reactivate: {e}"),
        }
    }

    /// Used when a component is removed outright while still `Active`.
    fn teardown(&self, cell: &Arc<RwLock<Component>>) {
        let (instance, stop_cb) = {
            let component = cell.read();
            (Arc::clone(&component.instance), component.stop_cb.clone())
        };
        if let Some(cb) = stop_cb {
            if let Err(e) = cb(&instance) {
                warn!("component stop callback failed during teardown: {e}");
            }
        }
        self.deregister_provided_services(cell);
        cell.write().state = ComponentState::Initialised;
    }

    fn register_provided_services(&self, cell: &Arc<RwLock<Component>>) {
        let mut component = cell.write();
        let bundle_id = self.bundle_id;
        let registry = self.registry.clone();
        let instance = Arc::clone(&component.instance);
        for provided in component.provides.iter_mut() {
            if provided.registration.is_none() {
                let handle = registry.register(
                    bundle_id,
                    provided.interface.clone(),
                    Arc::clone(&instance),
                    provided.version.clone(),
                    provided.props.clone(),
                );
                provided.registration = Some(handle);
            }
        }
    }

    fn deregister_provided_services(&self, cell: &Arc<RwLock<Component>>) {
        let handles: Vec<RegistrationHandle> = {
            let mut component = cell.write();
            component.provides.iter_mut().filter_map(|p| p.registration.take()).collect()
        };
        for handle in handles {
            let _ = handle.unregister();
        }
    }
}
