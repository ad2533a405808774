// Module Lifecycle Manager: bundle install/resolve/start/stop/uninstall state
// machine, with manifest-driven import/export resolution and activator
// invocation serialized through the event bus.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::dependency_manager::DependencyManager;
use crate::error::{ModError, Result};
use crate::event_bus::EventBus;
use crate::properties::Properties;
use crate::registry::{AnyService, RegistrationHandle, Reference, ServiceFactory, ServiceRegistry};
use crate::version::{Version, VersionRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleState {
    Installed,
    Resolved,
    Starting,
    Active,
    Stopping,
    Uninstalled,
}

impl fmt::Display for BundleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BundleState::Installed => "INSTALLED",
            BundleState::Resolved => "RESOLVED",
            BundleState::Starting => "STARTING",
            BundleState::Active => "ACTIVE",
            BundleState::Stopping => "STOPPING",
            BundleState::Uninstalled => "UNINSTALLED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub enum BundleEvent {
    Installed { bundle_id: u64 },
    Resolved { bundle_id: u64 },
    Started { bundle_id: u64 },
    StartFailed { bundle_id: u64, reason: String },
    Stopped { bundle_id: u64 },
    Uninstalled { bundle_id: u64 },
}

/// A collaborator-supplied handle to a bundle's archive: opaque on-disk
/// storage plus its parsed manifest headers.
pub trait Archive: Send + Sync {
    fn location(&self) -> &str;
    fn raw_manifest(&self) -> &HashMap<String, String>;
    fn open_entry(&self, path: &str) -> Option<Vec<u8>>;
}

/// Bundle-supplied lifecycle entry points, invoked on the event thread.
pub trait Activator: Send + Sync {
    fn start(&self, ctx: &BundleContext) -> Result<()>;
    fn stop(&self, ctx: &BundleContext) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ImportDecl {
    pub package: String,
    pub range: VersionRange,
}

#[derive(Debug, Clone)]
pub struct ExportDecl {
    pub package: String,
    pub version: Version,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    pub symbolic_name: String,
    pub version: Version,
    pub activator_name: Option<String>,
    pub imports: Vec<ImportDecl>,
    pub exports: Vec<ExportDecl>,
}

fn parse_package_entries(raw: &str) -> Vec<(String, Version)> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let mut segments = entry.split(';').map(str::trim);
            let name = segments.next().unwrap_or_default().to_string();
            let version = segments
                .find_map(|attr| attr.strip_prefix("version="))
                .and_then(|v| v.parse::<Version>().ok())
                .unwrap_or_else(Version::empty);
            (name, version)
        })
        .collect()
}

pub fn parse_manifest(raw: &HashMap<String, String>) -> Result<Manifest> {
    let symbolic_name = raw
        .get("Bundle-SymbolicName")
        .cloned()
        .ok_or_else(|| ModError::InstallFailed("manifest missing Bundle-SymbolicName".into()))?;

    let version = match raw.get("Bundle-Version") {
        Some(v) => v
            .parse()
            .map_err(|e: ModError| ModError::InstallFailed(format!("invalid Bundle-Version: {e}")))?,
        None => Version::empty(),
    };

    let activator_name = raw.get("Bundle-Activator").cloned();

    let imports = raw
        .get("Import-Package")
        .map(|s| {
            parse_package_entries(s)
                .into_iter()
                .map(|(package, version)| ImportDecl {
                    package,
                    range: VersionRange::at_least(version),
                })
                .collect()
        })
        .unwrap_or_default();

    let exports = raw
        .get("Export-Package")
        .map(|s| {
            parse_package_entries(s)
                .into_iter()
                .map(|(package, version)| ExportDecl { package, version })
                .collect()
        })
        .unwrap_or_default();

    Ok(Manifest {
        symbolic_name,
        version,
        activator_name,
        imports,
        exports,
    })
}

/// Handed to an activator's `start`/`stop`; the bundle's gateway to the
/// registry. Registrations made through it are tracked so the manager can
/// implicitly unregister any that survive past `stop`.
pub struct BundleContext {
    pub bundle_id: u64,
    registry: ServiceRegistry,
    owned_registrations: Arc<Mutex<Vec<RegistrationHandle>>>,
    dependency_manager: Arc<DependencyManager>,
}

impl BundleContext {
    pub fn register_service(
        &self,
        interface_name: impl Into<String>,
        svc: Arc<AnyService>,
        version: Option<Version>,
        props: Properties,
    ) -> RegistrationHandle {
        let handle = self
            .registry
            .register(self.bundle_id, interface_name, svc, version, props);
        self.owned_registrations.lock().push(clone_handle(&handle));
        handle
    }

    pub fn register_factory(
        &self,
        interface_name: impl Into<String>,
        factory: Arc<dyn ServiceFactory>,
        version: Option<Version>,
        props: Properties,
    ) -> RegistrationHandle {
        let handle =
            self.registry
                .register_factory(self.bundle_id, interface_name, factory, version, props);
        self.owned_registrations.lock().push(clone_handle(&handle));
        handle
    }

    pub fn find_references(
        &self,
        interface: Option<&str>,
        filter: Option<&crate::filter::Filter>,
    ) -> Result<Vec<Reference>> {
        self.registry.find_references(interface, filter)
    }

    pub fn get_service(&self, reference: &Reference) -> Option<Arc<AnyService>> {
        self.registry.get_service(self.bundle_id, reference)
    }

    pub fn unget_service(&self, reference: &Reference) -> bool {
        self.registry.unget_service(self.bundle_id, reference)
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn dependency_manager(&self) -> &Arc<DependencyManager> {
        &self.dependency_manager
    }
}

/// `RegistrationHandle` has no public `Clone`; the manager tracks the same
/// set of ids the context does by re-wrapping the id, not the handle itself.
fn clone_handle(handle: &RegistrationHandle) -> RegistrationHandle {
    handle.shallow_clone()
}

struct BundleRecord {
    id: u64,
    location: String,
    state: BundleState,
    manifest: Manifest,
    archive: Arc<dyn Archive>,
    activator: Option<Arc<dyn Activator>>,
    context: Arc<BundleContext>,
}

type BundleListener = Box<dyn Fn(BundleEvent) + Send + Sync>;

pub struct BundleManager {
    registry: ServiceRegistry,
    event_bus: Arc<EventBus>,
    bundles: RwLock<HashMap<u64, BundleRecord>>,
    install_order: Mutex<Vec<u64>>,
    next_id: AtomicU64,
    bundle_listeners: Arc<Mutex<Vec<BundleListener>>>,
}

struct FrameworkArchive {
    manifest: HashMap<String, String>,
}

impl Archive for FrameworkArchive {
    fn location(&self) -> &str {
        "framework://0"
    }
    fn raw_manifest(&self) -> &HashMap<String, String> {
        &self.manifest
    }
    fn open_entry(&self, _path: &str) -> Option<Vec<u8>> {
        None
    }
}

impl BundleManager {
    pub fn new(registry: ServiceRegistry, event_bus: Arc<EventBus>) -> Arc<Self> {
        let manager = Arc::new(Self {
            registry: registry.clone(),
            event_bus,
            bundles: RwLock::new(HashMap::new()),
            install_order: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            bundle_listeners: Arc::new(Mutex::new(Vec::new())),
        });

        let mut framework_manifest = HashMap::new();
        framework_manifest.insert("Bundle-SymbolicName".to_string(), "framework".to_string());
        let manifest = parse_manifest(&framework_manifest).expect("framework manifest is well-formed");
        let context = Arc::new(BundleContext {
            bundle_id: 0,
            dependency_manager: DependencyManager::new(0, registry.clone()),
            registry,
            owned_registrations: Arc::new(Mutex::new(Vec::new())),
        });
        manager.bundles.write().insert(
            0,
            BundleRecord {
                id: 0,
                location: "framework://0".into(),
                state: BundleState::Active,
                manifest,
                archive: Arc::new(FrameworkArchive {
                    manifest: framework_manifest,
                }),
                activator: None,
                context,
            },
        );
        manager.install_order.lock().push(0);
        manager
    }

    pub fn framework_bundle_id(&self) -> u64 {
        0
    }

    pub fn framework_context(&self) -> Arc<BundleContext> {
        Arc::clone(&self.bundles.read().get(&0).expect("bundle 0 always present").context)
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn install(&self, archive: Arc<dyn Archive>, activator: Option<Arc<dyn Activator>>) -> Result<u64> {
        let id = self.alloc_id();
        self.install_with_id(id, archive, activator)?;
        Ok(id)
    }

    /// Returns `(bundle_id, event_id)`: the id is allocated synchronously so
    /// the caller can reference it immediately; the manifest read and state
    /// insertion happen on the event thread. Wait on the event id to learn
    /// the outcome.
    pub fn install_async(
        self: &Arc<Self>,
        archive: Arc<dyn Archive>,
        activator: Option<Arc<dyn Activator>>,
    ) -> (u64, u64) {
        let id = self.alloc_id();
        let manager = Arc::clone(self);
        let event_id = self.event_bus.enqueue(None, move || {
            if let Err(e) = manager.install_with_id(id, archive, activator) {
                warn!("async install of bundle {id} failed: {e}");
            }
        });
        (id, event_id)
    }

    fn install_with_id(
        &self,
        id: u64,
        archive: Arc<dyn Archive>,
        activator: Option<Arc<dyn Activator>>,
    ) -> Result<()> {
        let manifest = parse_manifest(archive.raw_manifest())?;
        let location = archive.location().to_string();
        let context = Arc::new(BundleContext {
            bundle_id: id,
            dependency_manager: DependencyManager::new(id, self.registry.clone()),
            registry: self.registry.clone(),
            owned_registrations: Arc::new(Mutex::new(Vec::new())),
        });

        self.bundles.write().insert(
            id,
            BundleRecord {
                id,
                location: location.clone(),
                state: BundleState::Installed,
                manifest,
                archive,
                activator,
                context,
            },
        );
        self.install_order.lock().push(id);
        info!("installed bundle {id} at {location}");
        self.emit(BundleEvent::Installed { bundle_id: id });

        let _ = self.resolve(id);
        Ok(())
    }

    /// Attempts to move a bundle from `Installed` to `Resolved` by checking
    /// its imports against the exports of every other known bundle. Leaves
    /// the bundle `Installed` (not an error) if unresolvable.
    pub fn resolve(&self, id: u64) -> Result<bool> {
        let mut bundles = self.bundles.write();
        let imports = {
            let record = bundles
                .get(&id)
                .ok_or_else(|| ModError::NotFound(format!("bundle {id}")))?;
            if record.state != BundleState::Installed {
                return Ok(record.state != BundleState::Uninstalled);
            }
            record.manifest.imports.clone()
        };

        let satisfied = imports.iter().all(|import| {
            bundles.values().any(|other| {
                other.id != id
                    && other.state != BundleState::Uninstalled
                    && other
                        .manifest
                        .exports
                        .iter()
                        .any(|export| export.package == import.package && import.range.contains(&export.version))
            })
        });

        if satisfied {
            if let Some(record) = bundles.get_mut(&id) {
                record.state = BundleState::Resolved;
            }
            drop(bundles);
            debug!("bundle {id} resolved");
            self.emit(BundleEvent::Resolved { bundle_id: id });
        }
        Ok(satisfied)
    }

    pub fn state(&self, id: u64) -> Option<BundleState> {
        self.bundles.read().get(&id).map(|r| r.state)
    }

    pub fn start(&self, id: u64) -> Result<()> {
        {
            let state = self.state(id).ok_or_else(|| ModError::NotFound(format!("bundle {id}")))?;
            match state {
                BundleState::Active => return Ok(()),
                BundleState::Uninstalled => {
                    return Err(ModError::IllegalState(format!("bundle {id} is uninstalled")))
                }
                BundleState::Installed => {
                    if !self.resolve(id)? {
                        return Err(ModError::DependencyUnsatisfied(format!(
                            "bundle {id} has unresolved imports"
                        )));
                    }
                }
                _ => {}
            }
        }

        self.set_state(id, BundleState::Starting)?;

        let (context, activator) = {
            let bundles = self.bundles.read();
            let record = bundles.get(&id).expect("checked above");
            (Arc::clone(&record.context), record.activator.clone())
        };

        let result = match activator {
            Some(activator) => {
                self.run_on_event_thread(id, "bundle-start", move || activator.start(&context))
            }
            None => Ok(()),
        };

        match result {
            Ok(()) => {
                self.set_state(id, BundleState::Active)?;
                info!("bundle {id} started");
                self.emit(BundleEvent::Started { bundle_id: id });
                Ok(())
            }
            Err(e) => {
                self.set_state(id, BundleState::Resolved)?;
                warn!("bundle {id} failed to start: {e}");
                self.emit(BundleEvent::StartFailed {
                    bundle_id: id,
                    reason: e.to_string(),
                });
                Err(ModError::ActivatorFailed(e.to_string()))
            }
        }
    }

    pub fn stop(&self, id: u64) -> Result<()> {
        let state = self.state(id).ok_or_else(|| ModError::NotFound(format!("bundle {id}")))?;
        if state != BundleState::Active {
            return Ok(());
        }

        self.set_state(id, BundleState::Stopping)?;

        let (context, activator) = {
            let bundles = self.bundles.read();
            let record = bundles.get(&id).expect("checked above");
            (Arc::clone(&record.context), record.activator.clone())
        };

        let stop_result = match activator {
            Some(activator) => {
                self.run_on_event_thread(id, "bundle-stop", move || activator.stop(&context))
            }
            None => Ok(()),
        };

        if let Err(e) = &stop_result {
            warn!("bundle {id} deactivator returned an error: {e}");
        }

        context.dependency_manager().teardown_all();

        // Services left registered by the bundle are implicitly unregistered,
        // and its listeners removed, before the stop operation returns.
        let leftover = {
            let bundles = self.bundles.read();
            let record = bundles.get(&id).expect("bundle exists during stop");
            std::mem::take(&mut *record.context.owned_registrations.lock())
        };
        for handle in leftover {
            let _ = handle.unregister();
        }
        self.registry.remove_listeners_for_bundle(id);

        self.set_state(id, BundleState::Resolved)?;
        info!("bundle {id} stopped");
        self.emit(BundleEvent::Stopped { bundle_id: id });
        stop_result
    }

    pub fn uninstall(&self, id: u64) -> Result<()> {
        let state = self.state(id).ok_or_else(|| ModError::NotFound(format!("bundle {id}")))?;
        if state == BundleState::Uninstalled {
            return Err(ModError::IllegalState(format!("bundle {id} already uninstalled")));
        }
        if state == BundleState::Active {
            if let Err(e) = self.stop(id) {
                warn!("bundle {id} deactivator failed during uninstall, proceeding anyway: {e}");
            }
        }

        self.event_bus.mark_bundle_uninstalled(id);
        self.registry.remove_listeners_for_bundle(id);

        {
            let mut bundles = self.bundles.write();
            if let Some(record) = bundles.get_mut(&id) {
                record.state = BundleState::Uninstalled;
            }
        }
        self.install_order.lock().retain(|&x| x != id);
        info!("bundle {id} uninstalled");
        self.emit(BundleEvent::Uninstalled { bundle_id: id });
        Ok(())
    }

    pub fn uninstall_async(self: &Arc<Self>, id: u64) -> u64 {
        let manager = Arc::clone(self);
        self.event_bus.enqueue(Some(id), move || {
            if let Err(e) = manager.uninstall(id) {
                warn!("async uninstall of bundle {id} failed: {e}");
            }
        })
    }

    /// Bundles in the order they were installed; used by the framework
    /// facade to stop them in reverse at shutdown.
    pub fn install_order(&self) -> Vec<u64> {
        self.install_order.lock().clone()
    }

    fn set_state(&self, id: u64, state: BundleState) -> Result<()> {
        let mut bundles = self.bundles.write();
        let record = bundles
            .get_mut(&id)
            .ok_or_else(|| ModError::NotFound(format!("bundle {id}")))?;
        if record.state == BundleState::Uninstalled {
            return Err(ModError::IllegalState(format!("bundle {id} is uninstalled")));
        }
        record.state = state;
        Ok(())
    }

    pub fn add_bundle_listener(&self, cb: BundleListener) {
        self.bundle_listeners.lock().push(cb);
    }

    fn emit(&self, event: BundleEvent) {
        // Bundle events are delivered FIFO on the event thread, same queue as
        // service events, to preserve the spec's single total ordering.
        let listeners = Arc::clone(&self.bundle_listeners);
        self.event_bus.enqueue(None, move || {
            debug!("bundle event: {event:?}");
            for cb in listeners.lock().iter() {
                cb(event.clone());
            }
        });
    }

    /// Runs `f` on the event thread and blocks the caller until it
    /// completes, trapping panics as `ActivatorFailed`.
    fn run_on_event_thread<F>(&self, bundle_id: u64, name: &str, f: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let result_slot: Arc<Mutex<Option<Result<()>>>> = Arc::new(Mutex::new(None));
        let slot_clone = Arc::clone(&result_slot);
        let event_id = self.event_bus.next_event_id();
        self.event_bus.fire_generic(
            event_id,
            bundle_id,
            name,
            move || {
                let outcome = f();
                *slot_clone.lock() = Some(outcome);
            },
            || {},
        );
        self.event_bus.wait_for_event(event_id);
        result_slot
            .lock()
            .take()
            .unwrap_or_else(|| Err(ModError::ActivatorFailed(format!("{name} panicked"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn manifest_map(name: &str) -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("Bundle-SymbolicName".to_string(), name.to_string());
        m
    }

    struct TestArchive {
        manifest: HashMap<String, String>,
    }

    impl Archive for TestArchive {
        fn location(&self) -> &str {
            "test://bundle"
        }
        fn raw_manifest(&self) -> &HashMap<String, String> {
            &self.manifest
        }
        fn open_entry(&self, _path: &str) -> Option<Vec<u8>> {
            None
        }
    }

    #[test]
    fn manifest_requires_symbolic_name() {
        let empty = HashMap::new();
        assert!(matches!(parse_manifest(&empty), Err(ModError::InstallFailed(_))));
    }

    #[test]
    fn manifest_parses_import_export_with_version() {
        let mut raw = manifest_map("com.x.bundle");
        raw.insert("Import-Package".to_string(), "com.x.api;version=1.0.0".to_string());
        raw.insert("Export-Package".to_string(), "com.x.impl;version=2.1.0".to_string());
        let manifest = parse_manifest(&raw).unwrap();
        assert_eq!(manifest.imports[0].package, "com.x.api");
        assert!(manifest.imports[0].range.contains(&Version::new(1, 0, 0)));
        assert_eq!(manifest.exports[0].version, Version::new(2, 1, 0));
    }

    #[test]
    fn unresolvable_import_keeps_bundle_installed() {
        let registry = ServiceRegistry::new(Arc::new(EventBus::new()));
        let bus = Arc::new(EventBus::new());
        let manager = BundleManager::new(registry, bus);

        let mut raw = manifest_map("com.x.consumer");
        raw.insert("Import-Package".to_string(), "com.x.missing".to_string());
        let archive = Arc::new(TestArchive { manifest: raw });
        let id = manager.install(archive, None).unwrap();
        assert_eq!(manager.state(id), Some(BundleState::Installed));
    }

    #[test]
    fn matching_export_resolves_dependent_bundle() {
        let registry = ServiceRegistry::new(Arc::new(EventBus::new()));
        let bus = Arc::new(EventBus::new());
        let manager = BundleManager::new(registry, bus);

        let mut provider_raw = manifest_map("com.x.provider");
        provider_raw.insert("Export-Package".to_string(), "com.x.api;version=1.0.0".to_string());
        manager
            .install(Arc::new(TestArchive { manifest: provider_raw }), None)
            .unwrap();

        let mut consumer_raw = manifest_map("com.x.consumer");
        consumer_raw.insert("Import-Package".to_string(), "com.x.api;version=1.0.0".to_string());
        let consumer_id = manager
            .install(Arc::new(TestArchive { manifest: consumer_raw }), None)
            .unwrap();

        assert_eq!(manager.state(consumer_id), Some(BundleState::Resolved));
    }

    struct PanickingActivator;

    impl Activator for PanickingActivator {
        fn start(&self, _ctx: &BundleContext) -> Result<()> {
            panic!("boom");
        }
        fn stop(&self, _ctx: &BundleContext) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn start_panic_rolls_back_to_resolved() {
        let registry = ServiceRegistry::new(Arc::new(EventBus::new()));
        let bus = Arc::new(EventBus::new());
        let manager = BundleManager::new(registry, bus);
        let archive = Arc::new(TestArchive {
            manifest: manifest_map("com.x.flaky"),
        });
        let id = manager.install(archive, Some(Arc::new(PanickingActivator))).unwrap();
        assert_eq!(manager.state(id), Some(BundleState::Resolved));

        let start_failed_count = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = Arc::clone(&start_failed_count);
        manager.add_bundle_listener(Box::new(move |event| {
            if matches!(event, BundleEvent::StartFailed { .. }) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let err = manager.start(id).unwrap_err();
        assert!(matches!(err, ModError::ActivatorFailed(_)));
        assert_eq!(manager.state(id), Some(BundleState::Resolved));

        // The StartFailed event is delivered asynchronously on the event
        // thread; give it a moment before asserting the count.
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(start_failed_count.load(Ordering::SeqCst), 1);

        // Subsequent start attempts are permitted again.
        let err2 = manager.start(id);
        assert!(err2.is_err());
    }

    struct RecordingActivator {
        started: Arc<AtomicBool>,
        stopped: Arc<AtomicBool>,
    }

    impl Activator for RecordingActivator {
        fn start(&self, _ctx: &BundleContext) -> Result<()> {
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }
        fn stop(&self, _ctx: &BundleContext) -> Result<()> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn start_then_stop_round_trip() {
        let registry = ServiceRegistry::new(Arc::new(EventBus::new()));
        let bus = Arc::new(EventBus::new());
        let manager = BundleManager::new(registry, bus);
        let started = Arc::new(AtomicBool::new(false));
        let stopped = Arc::new(AtomicBool::new(false));
        let archive = Arc::new(TestArchive {
            manifest: manifest_map("com.x.ok"),
        });
        let id = manager
            .install(
                archive,
                Some(Arc::new(RecordingActivator {
                    started: Arc::clone(&started),
                    stopped: Arc::clone(&stopped),
                })),
            )
            .unwrap();

        manager.start(id).unwrap();
        assert_eq!(manager.state(id), Some(BundleState::Active));
        assert!(started.load(Ordering::SeqCst));

        manager.stop(id).unwrap();
        assert_eq!(manager.state(id), Some(BundleState::Resolved));
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn uninstall_is_terminal() {
        let registry = ServiceRegistry::new(Arc::new(EventBus::new()));
        let bus = Arc::new(EventBus::new());
        let manager = BundleManager::new(registry, bus);
        let archive = Arc::new(TestArchive {
            manifest: manifest_map("com.x.gone"),
        });
        let id = manager.install(archive, None).unwrap();
        manager.uninstall(id).unwrap();
        assert_eq!(manager.state(id), Some(BundleState::Uninstalled));
        assert!(matches!(manager.uninstall(id), Err(ModError::IllegalState(_))));
        assert!(matches!(manager.start(id), Err(ModError::IllegalState(_))));
    }
}
