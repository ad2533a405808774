// Framework Facade: the single embedder-facing root object binding the
// registry, event bus and bundle manager together. Grounded on RustyDB's
// top-level `Config`/`main.rs` startup sequence (load config, announce via
// tracing, bring subsystems up in order), generalized from one process's
// database startup into a restartable, embeddable container lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use tracing::info;
use uuid::Uuid;

use crate::bundle::{Activator, Archive, BundleContext, BundleManager};
use crate::error::{ModError, Result};
use crate::event_bus::EventBus;
use crate::properties::Properties;
use crate::registry::ServiceRegistry;

static LOGGING_INITIALISED: AtomicBool = AtomicBool::new(false);

/// Builds the `Properties` config map `Framework::create` expects, the same
/// way RustyDB's `Config` is assembled before `Database::open`.
#[derive(Debug, Clone, Default)]
pub struct FrameworkConfigBuilder {
    props: Properties,
}

impl FrameworkConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn storage_dir(mut self, dir: impl Into<String>) -> Self {
        self.props.set_string("framework.storage", dir);
        self
    }

    pub fn clean_storage(mut self, clean: bool) -> Self {
        self.props.set_bool("framework.storage.clean", clean);
        self
    }

    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.props.set_string("framework.uuid", uuid);
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.props.set_string("log.level", level);
        self
    }

    /// Appends one location to the `auto_start.N` sequence (N is assigned by
    /// insertion order, starting at 1).
    pub fn auto_start(mut self, location: impl Into<String>) -> Self {
        let next = (1..)
            .find(|n| !self.props.contains_key(&format!("auto_start.{n}")))
            .unwrap();
        self.props.set_string(format!("auto_start.{next}"), location);
        self
    }

    pub fn build(self) -> Properties {
        self.props
    }
}

fn auto_start_locations(config: &Properties) -> Vec<String> {
    let mut locations = Vec::new();
    for n in 1.. {
        let key = format!("auto_start.{n}");
        if !config.contains_key(&key) {
            break;
        }
        locations.push(config.get_string(&key, ""));
    }
    locations
}

/// Collaborator supplying the archive (and, for auto-started bundles, the
/// activator) for a given `auto_start.N` location.
pub trait BundleProvisioner: Send + Sync {
    fn provision(&self, location: &str) -> Result<(Arc<dyn Archive>, Option<Arc<dyn Activator>>)>;
}

struct NullProvisioner;

impl BundleProvisioner for NullProvisioner {
    fn provision(&self, location: &str) -> Result<(Arc<dyn Archive>, Option<Arc<dyn Activator>>)> {
        Err(ModError::InstallFailed(format!(
            "no bundle provisioner configured to resolve auto_start location '{location}'"
        )))
    }
}

/// The root object owning the registry, event bus, and bundle manager for
/// one container instance.
pub struct Framework {
    config: Properties,
    uuid: Uuid,
    registry: ServiceRegistry,
    event_bus: Arc<EventBus>,
    bundles: Arc<BundleManager>,
    provisioner: Arc<dyn BundleProvisioner>,
    started: AtomicBool,
    stopped: AtomicBool,
    drained: Mutex<bool>,
    drained_cvar: Condvar,
}

impl Framework {
    pub fn builder() -> FrameworkConfigBuilder {
        FrameworkConfigBuilder::new()
    }

    /// Builds the registry, event bus, and bundle 0, but does not activate
    /// anything yet — call `start()` next.
    pub fn create(config: Properties) -> Arc<Self> {
        Self::create_with_provisioner(config, Arc::new(NullProvisioner))
    }

    pub fn create_with_provisioner(config: Properties, provisioner: Arc<dyn BundleProvisioner>) -> Arc<Self> {
        let event_bus = Arc::new(EventBus::new());
        let registry = ServiceRegistry::new(Arc::clone(&event_bus));
        let bundles = BundleManager::new(registry.clone(), Arc::clone(&event_bus));

        let uuid = config
            .get("framework.uuid")
            .map(|v| v.to_string())
            .and_then(|s| Uuid::parse_str(&s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Arc::new(Self {
            config,
            uuid,
            registry,
            event_bus,
            bundles,
            provisioner,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            drained: Mutex::new(false),
            drained_cvar: Condvar::new(),
        })
    }

    fn init_logging(&self) {
        if LOGGING_INITIALISED.swap(true, Ordering::SeqCst) {
            return;
        }
        let level = self.config.get_string("log.level", "info");
        let filter = tracing_subscriber::EnvFilter::try_new(&level)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .try_init();
    }

    /// Activates bundle 0, then installs and starts each `auto_start.N`
    /// location in numeric order. Idempotent: a second call is a no-op.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.init_logging();
        info!("starting framework {}", self.uuid);

        if self.config.get_bool("framework.storage.clean", false) {
            let dir = self.config.get_string("framework.storage", ".cache");
            if let Ok(entries) = std::fs::read_dir(&dir) {
                for entry in entries.flatten() {
                    let _ = std::fs::remove_dir_all(entry.path())
                        .or_else(|_| std::fs::remove_file(entry.path()));
                }
            }
        }

        for location in auto_start_locations(&self.config) {
            match self.provisioner.provision(&location) {
                Ok((archive, activator)) => match self.bundles.install(archive, activator) {
                    Ok(id) => {
                        if let Err(e) = self.bundles.start(id) {
                            tracing::warn!("auto-start bundle {id} ({location}) failed: {e}");
                        }
                    }
                    Err(e) => tracing::warn!("failed to install auto-start bundle {location}: {e}"),
                },
                Err(e) => tracing::warn!("failed to provision auto-start bundle {location}: {e}"),
            }
        }

        info!("framework {} started", self.uuid);
        Ok(())
    }

    /// Stops every installed bundle in reverse install order, then drains
    /// the event bus. Idempotent.
    pub fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("stopping framework {}", self.uuid);
        let mut order = self.bundles.install_order();
        order.reverse();
        for id in order {
            if id == self.bundles.framework_bundle_id() {
                continue;
            }
            if let Err(e) = self.bundles.stop(id) {
                tracing::warn!("error stopping bundle {id} during framework shutdown: {e}");
            }
        }
        self.event_bus.stop();
        *self.drained.lock().unwrap() = true;
        self.drained_cvar.notify_all();
        info!("framework {} stopped", self.uuid);
        Ok(())
    }

    /// Blocks the calling thread until some other thread calls `stop()` and
    /// its drain completes — the embedder's main-loop pattern: `start()`,
    /// then `wait_for_stop()` until a signal handler elsewhere calls `stop()`.
    /// Returns immediately if `stop()` already ran.
    pub fn wait_for_stop(&self) {
        let guard = self.drained.lock().unwrap();
        let _unused = self.drained_cvar.wait_while(guard, |drained| !*drained).unwrap();
    }

    pub fn framework_context(&self) -> Arc<BundleContext> {
        self.bundles.framework_context()
    }

    pub fn bundles(&self) -> &Arc<BundleManager> {
        &self.bundles
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn next_event_id(&self) -> u64 {
        self.event_bus.next_event_id()
    }

    pub fn wait_for_event(&self, event_id: u64) {
        self.event_bus.wait_for_event(event_id)
    }

    pub fn fire_generic_event(
        &self,
        bundle_id: u64,
        name: impl Into<String>,
        do_work: impl FnOnce() + Send + 'static,
        on_done: impl FnOnce() + Send + 'static,
    ) -> u64 {
        let event_id = self.event_bus.next_event_id();
        self.event_bus.fire_generic(event_id, bundle_id, name, do_work, on_done);
        event_id
    }
}
