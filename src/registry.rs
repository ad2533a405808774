// Concurrency-safe, ranked, filter-queryable service directory. Registrations
// are keyed by interface name, ordered by (ranking desc, id asc), and handed
// out as reference-counted `Reference`s so a consumer's use of a service
// outlives a racing unregistration.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{ModError, Result};
use crate::event_bus::EventBus;
use crate::filter::Filter;
use crate::properties::{Properties, PropertyValue};
use crate::version::Version;

pub type AnyService = dyn Any + Send + Sync;

/// Per-consumer service construction, invoked the first time a given bundle
/// obtains the service and released when that bundle's use count returns to
/// zero.
pub trait ServiceFactory: Send + Sync {
    fn get_service(&self, bundle_id: u64) -> Arc<AnyService>;
    fn unget_service(&self, bundle_id: u64, svc: &Arc<AnyService>);
}

pub enum ServiceObject {
    Plain(Arc<AnyService>),
    Factory(Arc<dyn ServiceFactory>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Active,
    Unregistering,
    Unregistered,
}

struct Registration {
    id: u64,
    bundle_id: u64,
    interface_name: String,
    version: Version,
    svc: ServiceObject,
    props: Properties,
    state: RegistrationState,
    use_count_by_bundle: HashMap<u64, u32>,
    cached_by_bundle: HashMap<u64, Arc<AnyService>>,
    reader_count: u64,
}

impl Registration {
    fn total_use_count(&self) -> u32 {
        self.use_count_by_bundle.values().sum()
    }
}

fn synthesize_props(id: u64, interface_name: &str, version: &Version, mut props: Properties) -> Properties {
    props.set_long("service.id", id as i64);
    props.set_string("objectClass", interface_name);
    if !props.contains_key("service.ranking") {
        props.set_long("service.ranking", 0);
    }
    if !version.is_empty() {
        props.set_string("service.version", version.to_string());
    }
    props
}

fn ranking_of(props: &Properties) -> i64 {
    props.get_long("service.ranking", 0)
}

#[derive(Debug, Clone)]
pub enum ServiceEvent {
    Registered(ServiceEventInfo),
    Modified(ServiceEventInfo, Properties),
    Unregistering(ServiceEventInfo),
}

/// An immutable, point-in-time snapshot of a registration's identity and
/// properties, handed to listeners instead of a live `Reference` so a
/// listener cannot accidentally keep a registration alive forever.
#[derive(Debug, Clone)]
pub struct ServiceEventInfo {
    pub id: u64,
    pub bundle_id: u64,
    pub interface_name: String,
    pub props: Properties,
}

pub trait ListenerHook: Send + Sync {
    fn added(&self, listeners: &[ListenerInfo]);
    fn removed(&self, listeners: &[ListenerInfo]);
}

#[derive(Debug, Clone)]
pub struct ListenerInfo {
    pub listener_id: u64,
    pub bundle_id: u64,
    pub filter: Option<String>,
}

pub trait FindHook: Send + Sync {
    fn find(&self, interface: Option<&str>, filter: &Filter, references: &mut Vec<Reference>);
}

struct ListenerEntry {
    id: u64,
    bundle_id: u64,
    filter: Option<Filter>,
    callback: Box<dyn Fn(ServiceEvent) + Send + Sync>,
}

struct Tables {
    registrations: HashMap<u64, Registration>,
    listeners: Vec<ListenerEntry>,
    listener_hooks: HashMap<u64, Box<dyn ListenerHook>>,
    find_hooks: HashMap<u64, Box<dyn FindHook>>,
}

struct Inner {
    tables: RwLock<Tables>,
    next_id: AtomicU64,
    next_listener_id: AtomicU64,
    event_bus: Arc<EventBus>,
    find_dispatch_depth: AtomicU64,
    pending_hooks: parking_lot::Mutex<Vec<PendingHook>>,
}

enum PendingHook {
    Listener(u64, Box<dyn ListenerHook>),
    Find(u64, Box<dyn FindHook>),
}

#[derive(Clone)]
pub struct ServiceRegistry {
    inner: Arc<Inner>,
}

impl ServiceRegistry {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::new(Tables {
                    registrations: HashMap::new(),
                    listeners: Vec::new(),
                    listener_hooks: HashMap::new(),
                    find_hooks: HashMap::new(),
                }),
                next_id: AtomicU64::new(1),
                next_listener_id: AtomicU64::new(1),
                event_bus,
                find_dispatch_depth: AtomicU64::new(0),
                pending_hooks: parking_lot::Mutex::new(Vec::new()),
            }),
        }
    }

    fn alloc_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn register(
        &self,
        bundle_id: u64,
        interface_name: impl Into<String>,
        svc: Arc<AnyService>,
        version: Option<Version>,
        props: Properties,
    ) -> RegistrationHandle {
        self.register_object(
            bundle_id,
            interface_name,
            ServiceObject::Plain(svc),
            version,
            props,
        )
    }

    pub fn register_factory(
        &self,
        bundle_id: u64,
        interface_name: impl Into<String>,
        factory: Arc<dyn ServiceFactory>,
        version: Option<Version>,
        props: Properties,
    ) -> RegistrationHandle {
        self.register_object(
            bundle_id,
            interface_name,
            ServiceObject::Factory(factory),
            version,
            props,
        )
    }

    fn register_object(
        &self,
        bundle_id: u64,
        interface_name: impl Into<String>,
        svc: ServiceObject,
        version: Option<Version>,
        props: Properties,
    ) -> RegistrationHandle {
        let interface_name = interface_name.into();
        let id = self.alloc_id();
        let version = version.unwrap_or_else(Version::empty);
        let props = synthesize_props(id, &interface_name, &version, props);

        let event_info = ServiceEventInfo {
            id,
            bundle_id,
            interface_name: interface_name.clone(),
            props: props.clone(),
        };

        {
            let mut tables = self.inner.tables.write();
            tables.registrations.insert(
                id,
                Registration {
                    id,
                    bundle_id,
                    interface_name: interface_name.clone(),
                    version,
                    svc,
                    props,
                    state: RegistrationState::Active,
                    use_count_by_bundle: HashMap::new(),
                    cached_by_bundle: HashMap::new(),
                    reader_count: 0,
                },
            );
        }

        debug!(
            "registered service {interface_name} id={id} bundle={bundle_id} props={}",
            event_info.props.to_json()
        );
        self.dispatch(ServiceEvent::Registered(event_info));

        RegistrationHandle {
            registry: self.clone(),
            id,
        }
    }

    fn unregister(&self, id: u64) -> Result<()> {
        let event_info = {
            let mut tables = self.inner.tables.write();
            let reg = tables
                .registrations
                .get_mut(&id)
                .ok_or_else(|| ModError::NotFound(format!("registration {id}")))?;
            if reg.state != RegistrationState::Active {
                // §9 open question: concurrent unregister, only the first wins.
                return Err(ModError::NotFound(format!("registration {id}")));
            }
            reg.state = RegistrationState::Unregistering;
            ServiceEventInfo {
                id: reg.id,
                bundle_id: reg.bundle_id,
                interface_name: reg.interface_name.clone(),
                props: reg.props.clone(),
            }
        };

        self.dispatch(ServiceEvent::Unregistering(event_info));

        let mut tables = self.inner.tables.write();
        if let Some(reg) = tables.registrations.get_mut(&id) {
            reg.state = RegistrationState::Unregistered;
            let destroyed = maybe_destroy(&mut tables.registrations, id);
            let _ = destroyed;
        }
        Ok(())
    }

    fn modify_properties(&self, id: u64, new_props: Properties) -> Result<()> {
        let (event_info, old_props) = {
            let mut tables = self.inner.tables.write();
            let reg = tables
                .registrations
                .get_mut(&id)
                .ok_or_else(|| ModError::NotFound(format!("registration {id}")))?;
            if reg.state != RegistrationState::Active {
                return Err(ModError::IllegalState(format!(
                    "cannot modify properties of registration {id} in state {:?}",
                    reg.state
                )));
            }
            if let Some(PropertyValue::String(new_iface)) = new_props.get("objectClass") {
                if new_iface != &reg.interface_name {
                    return Err(ModError::InvalidArgument(
                        "modifying properties may not change a service's interface".into(),
                    ));
                }
            }
            let old_props = reg.props.clone();
            let mut merged = new_props;
            merged.set_long("service.id", id as i64);
            merged.set_string("objectClass", &reg.interface_name);
            if !merged.contains_key("service.ranking") {
                merged.set_long("service.ranking", ranking_of(&old_props));
            }
            reg.props = merged.clone();
            (
                ServiceEventInfo {
                    id: reg.id,
                    bundle_id: reg.bundle_id,
                    interface_name: reg.interface_name.clone(),
                    props: merged,
                },
                old_props,
            )
        };
        self.dispatch(ServiceEvent::Modified(event_info, old_props));
        Ok(())
    }

    pub fn find_references(
        &self,
        interface: Option<&str>,
        filter: Option<&Filter>,
    ) -> Result<Vec<Reference>> {
        let depth = self.inner.find_dispatch_depth.fetch_add(1, Ordering::SeqCst);
        let result = (|| {
            let tables = self.inner.tables.read();
            let mut matches: Vec<(i64, u64)> = tables
                .registrations
                .values()
                .filter(|r| r.state == RegistrationState::Active)
                .filter(|r| interface.map(|i| i == r.interface_name).unwrap_or(true))
                .filter(|r| filter.map(|f| f.matches(&r.props)).unwrap_or(true))
                .map(|r| (ranking_of(&r.props), r.id))
                .collect();
            matches.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

            drop(tables);

            let mut refs: Vec<Reference> = matches
                .into_iter()
                .map(|(_, id)| self.make_reference(id))
                .collect();

            if depth > 0 {
                return Err(ModError::IllegalState(
                    "find hooks may not call find_references reentrantly".into(),
                ));
            }

            let hook_ids: Vec<u64> = {
                let tables = self.inner.tables.read();
                tables.find_hooks.keys().copied().collect()
            };
            let empty_filter = Filter::MatchAll;
            let effective_filter = filter.unwrap_or(&empty_filter);
            for hid in hook_ids {
                let tables = self.inner.tables.read();
                if let Some(hook) = tables.find_hooks.get(&hid) {
                    hook.find(interface, effective_filter, &mut refs);
                }
            }
            refs.sort_by(|a, b| b.ranking().cmp(&a.ranking()).then(a.id().cmp(&b.id())));
            Ok(refs)
        })();
        self.inner.find_dispatch_depth.fetch_sub(1, Ordering::SeqCst);
        result
    }

    /// Build a `Reference` directly from a known registration id, skipping
    /// the ranking/filter scan — used by consumers (e.g. the dependency
    /// manager) that already learned the id from a `ServiceEvent`.
    pub fn reference_for_id(&self, id: u64) -> Option<Reference> {
        let tables = self.inner.tables.read();
        let active = tables
            .registrations
            .get(&id)
            .map(|r| r.state == RegistrationState::Active)
            .unwrap_or(false);
        drop(tables);
        if active {
            Some(self.make_reference(id))
        } else {
            None
        }
    }

    fn make_reference(&self, id: u64) -> Reference {
        self.inc_reader(id);
        Reference {
            registry: self.clone(),
            id,
        }
    }

    fn inc_reader(&self, id: u64) {
        let mut tables = self.inner.tables.write();
        if let Some(reg) = tables.registrations.get_mut(&id) {
            reg.reader_count += 1;
        }
    }

    fn dec_reader(&self, id: u64) {
        let mut tables = self.inner.tables.write();
        if let Some(reg) = tables.registrations.get_mut(&id) {
            reg.reader_count = reg.reader_count.saturating_sub(1);
        }
        maybe_destroy(&mut tables.registrations, id);
    }

    pub fn get_service(&self, bundle_id: u64, reference: &Reference) -> Option<Arc<AnyService>> {
        let mut tables = self.inner.tables.write();
        let reg = tables.registrations.get_mut(&reference.id)?;
        let count = reg.use_count_by_bundle.entry(bundle_id).or_insert(0);
        *count += 1;
        let first_use = *count == 1;

        if first_use {
            let svc = match &reg.svc {
                ServiceObject::Plain(svc) => Arc::clone(svc),
                ServiceObject::Factory(factory) => factory.get_service(bundle_id),
            };
            reg.cached_by_bundle.insert(bundle_id, Arc::clone(&svc));
            Some(svc)
        } else {
            reg.cached_by_bundle.get(&bundle_id).cloned()
        }
    }

    pub fn unget_service(&self, bundle_id: u64, reference: &Reference) -> bool {
        let mut tables = self.inner.tables.write();
        let Some(reg) = tables.registrations.get_mut(&reference.id) else {
            return false;
        };
        let Some(count) = reg.use_count_by_bundle.get_mut(&bundle_id) else {
            return false;
        };
        if *count == 0 {
            return false;
        }
        *count -= 1;
        let last_use = *count == 0;
        if last_use {
            reg.use_count_by_bundle.remove(&bundle_id);
            if let Some(cached) = reg.cached_by_bundle.remove(&bundle_id) {
                if let ServiceObject::Factory(factory) = &reg.svc {
                    factory.unget_service(bundle_id, &cached);
                }
            }
        }
        let was_unregistered = reg.state == RegistrationState::Unregistered;
        maybe_destroy(&mut tables.registrations, reference.id) && was_unregistered
    }

    pub fn add_listener(
        &self,
        bundle_id: u64,
        filter: Option<Filter>,
        callback: Box<dyn Fn(ServiceEvent) + Send + Sync>,
    ) -> u64 {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut tables = self.inner.tables.write();
            tables.listeners.push(ListenerEntry {
                id,
                bundle_id,
                filter: filter.clone(),
                callback,
            });
        }
        let info = ListenerInfo {
            listener_id: id,
            bundle_id,
            filter: filter.map(|f| f.print()),
        };
        self.notify_listener_hooks(|h| h.added(std::slice::from_ref(&info)));
        id
    }

    pub fn remove_listener(&self, listener_id: u64) -> Result<()> {
        let removed = {
            let mut tables = self.inner.tables.write();
            let idx = tables.listeners.iter().position(|l| l.id == listener_id);
            idx.map(|i| tables.listeners.remove(i))
        };
        let entry = removed.ok_or_else(|| ModError::NotFound(format!("listener {listener_id}")))?;
        let info = ListenerInfo {
            listener_id: entry.id,
            bundle_id: entry.bundle_id,
            filter: entry.filter.map(|f| f.print()),
        };
        self.notify_listener_hooks(|h| h.removed(std::slice::from_ref(&info)));
        Ok(())
    }

    /// Remove every listener owned by a bundle being stopped, firing hooks
    /// once for the whole set.
    pub fn remove_listeners_for_bundle(&self, bundle_id: u64) {
        let removed: Vec<ListenerInfo> = {
            let mut tables = self.inner.tables.write();
            let mut removed = Vec::new();
            tables.listeners.retain(|l| {
                if l.bundle_id == bundle_id {
                    removed.push(ListenerInfo {
                        listener_id: l.id,
                        bundle_id: l.bundle_id,
                        filter: l.filter.as_ref().map(|f| f.print()),
                    });
                    false
                } else {
                    true
                }
            });
            removed
        };
        if !removed.is_empty() {
            self.notify_listener_hooks(|h| h.removed(&removed));
        }
    }

    pub fn add_listener_hook(&self, hook: Box<dyn ListenerHook>) -> u64 {
        let id = self.alloc_id();
        if self.inner.find_dispatch_depth.load(Ordering::SeqCst) > 0 {
            self.inner
                .pending_hooks
                .lock()
                .push(PendingHook::Listener(id, hook));
        } else {
            self.inner.tables.write().listener_hooks.insert(id, hook);
        }
        id
    }

    pub fn add_find_hook(&self, hook: Box<dyn FindHook>) -> u64 {
        let id = self.alloc_id();
        if self.inner.find_dispatch_depth.load(Ordering::SeqCst) > 0 {
            self.inner
                .pending_hooks
                .lock()
                .push(PendingHook::Find(id, hook));
        } else {
            self.inner.tables.write().find_hooks.insert(id, hook);
        }
        id
    }

    fn flush_pending_hooks(&self) {
        let pending = std::mem::take(&mut *self.inner.pending_hooks.lock());
        if pending.is_empty() {
            return;
        }
        let mut tables = self.inner.tables.write();
        for hook in pending {
            match hook {
                PendingHook::Listener(id, hook) => {
                    tables.listener_hooks.insert(id, hook);
                }
                PendingHook::Find(id, hook) => {
                    tables.find_hooks.insert(id, hook);
                }
            }
        }
    }

    fn notify_listener_hooks(&self, f: impl Fn(&dyn ListenerHook)) {
        self.inner.find_dispatch_depth.fetch_add(1, Ordering::SeqCst);
        let hook_ids: Vec<u64> = self.inner.tables.read().listener_hooks.keys().copied().collect();
        for id in hook_ids {
            let tables = self.inner.tables.read();
            if let Some(hook) = tables.listener_hooks.get(&id) {
                f(hook.as_ref());
            }
        }
        let depth = self.inner.find_dispatch_depth.fetch_sub(1, Ordering::SeqCst);
        if depth == 1 {
            self.flush_pending_hooks();
        }
    }

    fn dispatch(&self, event: ServiceEvent) {
        let bus = Arc::clone(&self.inner.event_bus);
        let registry = self.clone();
        bus.enqueue(None, move || {
            registry.deliver(event);
        });
    }

    fn deliver(&self, event: ServiceEvent) {
        let props = match &event {
            ServiceEvent::Registered(info) => &info.props,
            ServiceEvent::Modified(info, _) => &info.props,
            ServiceEvent::Unregistering(info) => &info.props,
        }
        .clone();

        let tables = self.inner.tables.read();
        for listener in &tables.listeners {
            if listener.filter.as_ref().map(|f| f.matches(&props)).unwrap_or(true) {
                (listener.callback)(event.clone());
            }
        }
    }

    pub fn statistics(&self) -> RegistryStatistics {
        let tables = self.inner.tables.read();
        RegistryStatistics {
            registrations: tables.registrations.len(),
            listeners: tables.listeners.len(),
            listener_hooks: tables.listener_hooks.len(),
            find_hooks: tables.find_hooks.len(),
        }
    }
}

fn maybe_destroy(registrations: &mut HashMap<u64, Registration>, id: u64) -> bool {
    let should_remove = match registrations.get(&id) {
        Some(reg) => {
            reg.state == RegistrationState::Unregistered
                && reg.reader_count == 0
                && reg.total_use_count() == 0
        }
        None => false,
    };
    if should_remove {
        registrations.remove(&id);
    }
    should_remove
}

#[derive(Debug, Clone)]
pub struct RegistryStatistics {
    pub registrations: usize,
    pub listeners: usize,
    pub listener_hooks: usize,
    pub find_hooks: usize,
}

/// Owner-side control over a registration: unregister and property updates.
pub struct RegistrationHandle {
    registry: ServiceRegistry,
    id: u64,
}

impl RegistrationHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// A second handle over the same registration. Both observe and can act
    /// on the same underlying row; whichever calls `unregister` first wins,
    /// per the registry's concurrent-unregister rule.
    pub fn shallow_clone(&self) -> RegistrationHandle {
        RegistrationHandle {
            registry: self.registry.clone(),
            id: self.id,
        }
    }

    pub fn unregister(&self) -> Result<()> {
        self.registry.unregister(self.id)
    }

    pub fn modify_properties(&self, new_props: Properties) -> Result<()> {
        self.registry.modify_properties(self.id, new_props)
    }
}

/// Consumer-side handle to a registration. Stays usable (property reads
/// report stale) after the registration unregisters, until every holder
/// drops its reference.
pub struct Reference {
    registry: ServiceRegistry,
    id: u64,
}

impl Reference {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn with_registration<T>(&self, f: impl FnOnce(&Registration) -> T) -> Option<T> {
        let tables = self.registry.inner.tables.read();
        tables.registrations.get(&self.id).map(f)
    }

    pub fn bundle_id(&self) -> Option<u64> {
        self.with_registration(|r| r.bundle_id)
    }

    pub fn interface_name(&self) -> Option<String> {
        self.with_registration(|r| r.interface_name.clone())
    }

    pub fn ranking(&self) -> i64 {
        self.with_registration(|r| ranking_of(&r.props)).unwrap_or(0)
    }

    /// Property reads on a stale reference (registration already fully
    /// unregistered in the tables) return `None`.
    pub fn properties(&self) -> Option<Properties> {
        self.with_registration(|r| r.props.clone())
    }

    pub fn is_stale(&self) -> bool {
        self.with_registration(|r| r.state != RegistrationState::Active)
            .unwrap_or(true)
    }
}

impl Clone for Reference {
    fn clone(&self) -> Self {
        self.registry.inc_reader(self.id);
        Reference {
            registry: self.registry.clone(),
            id: self.id,
        }
    }
}

impl Drop for Reference {
    fn drop(&mut self) {
        self.registry.dec_reader(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn new_registry() -> ServiceRegistry {
        ServiceRegistry::new(Arc::new(EventBus::new()))
    }

    #[test]
    fn find_references_orders_by_ranking_then_id() {
        let registry = new_registry();
        let mut props_low = Properties::new();
        props_low.set_long("service.ranking", 0);
        let first = registry.register(1, "com.x.A", Arc::new(1i32), None, props_low);

        let mut props_high = Properties::new();
        props_high.set_long("service.ranking", 10);
        let second = registry.register(1, "com.x.A", Arc::new(2i32), None, props_high);

        let refs = registry.find_references(Some("com.x.A"), None).unwrap();
        let ids: Vec<u64> = refs.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![second.id(), first.id()]);
    }

    #[test]
    fn use_count_survives_unregister_until_unget() {
        let registry = new_registry();
        let handle = registry.register(1, "com.x.A", Arc::new(42i32), None, Properties::new());
        let refs = registry.find_references(Some("com.x.A"), None).unwrap();
        let reference = refs.into_iter().next().unwrap();

        let svc = registry.get_service(2, &reference);
        assert!(svc.is_some());

        handle.unregister().unwrap();

        // Still resolvable: bundle 2's use count keeps the row alive.
        assert!(reference.properties().is_some());
        assert_eq!(registry.statistics().registrations, 1);

        // Releasing the use doesn't destroy the row while `reference` is
        // still held — it is only gone once every reader drops too.
        assert!(!registry.unget_service(2, &reference));
        assert_eq!(registry.statistics().registrations, 1);

        drop(reference);
        assert_eq!(registry.statistics().registrations, 0);
    }

    #[test]
    fn id_uniqueness_across_many_registrations() {
        let registry = new_registry();
        let mut ids = std::collections::HashSet::new();
        for _ in 0..50 {
            let h = registry.register(1, "com.x.A", Arc::new(0i32), None, Properties::new());
            assert!(ids.insert(h.id()));
        }
    }

    #[test]
    fn query_order_is_stable_without_mutation() {
        let registry = new_registry();
        for i in 0..5 {
            let mut props = Properties::new();
            props.set_long("service.ranking", i);
            registry.register(1, "com.x.A", Arc::new(i), None, props);
        }
        let first = registry.find_references(Some("com.x.A"), None).unwrap();
        let second = registry.find_references(Some("com.x.A"), None).unwrap();
        let first_ids: Vec<u64> = first.iter().map(|r| r.id()).collect();
        let second_ids: Vec<u64> = second.iter().map(|r| r.id()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn listeners_observe_registered_then_unregistering() {
        let registry = new_registry();
        let events: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);
        registry.add_listener(
            1,
            None,
            Box::new(move |event| {
                let label = match event {
                    ServiceEvent::Registered(_) => "registered",
                    ServiceEvent::Modified(_, _) => "modified",
                    ServiceEvent::Unregistering(_) => "unregistering",
                };
                events_clone.lock().unwrap().push(label.to_string());
            }),
        );

        let handle = registry.register(1, "com.x.A", Arc::new(1i32), None, Properties::new());
        handle
            .modify_properties({
                let mut p = Properties::new();
                p.set_string("extra", "1");
                p
            })
            .unwrap();
        handle.unregister().unwrap();

        // Drain the event bus by re-registering and waiting is not directly
        // exposed here; give the dedicated thread a moment to process FIFO.
        std::thread::sleep(std::time::Duration::from_millis(50));

        let seen = events.lock().unwrap().clone();
        assert_eq!(seen, vec!["registered", "modified", "unregistering"]);
    }

    #[test]
    fn second_unregister_returns_not_found() {
        let registry = new_registry();
        let handle = registry.register(1, "com.x.A", Arc::new(1i32), None, Properties::new());
        handle.unregister().unwrap();
        assert!(matches!(handle.unregister(), Err(ModError::NotFound(_))));
    }

    #[test]
    fn modifying_interface_is_forbidden() {
        let registry = new_registry();
        let handle = registry.register(1, "com.x.A", Arc::new(1i32), None, Properties::new());
        let mut new_props = Properties::new();
        new_props.set_string("objectClass", "com.x.B");
        assert!(matches!(
            handle.modify_properties(new_props),
            Err(ModError::InvalidArgument(_))
        ));
    }
}
