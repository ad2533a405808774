// Crate-level integration tests exercising the registry, bundle manager,
// dependency manager, and framework facade together, the way a real
// embedder would: install bundles, let components react to service events,
// then shut the whole thing down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use modhost::bundle::{Activator, Archive, BundleContext};
use modhost::dependency_manager::{Cardinality, ComponentBuilder, ComponentState, ServiceDependency, UpdateStrategy};
use modhost::error::Result;
use modhost::framework::Framework;
use modhost::properties::Properties;

fn wait_a_bit() {
    std::thread::sleep(Duration::from_millis(80));
}

struct MapArchive {
    location: String,
    manifest: HashMap<String, String>,
}

impl Archive for MapArchive {
    fn location(&self) -> &str {
        &self.location
    }
    fn raw_manifest(&self) -> &HashMap<String, String> {
        &self.manifest
    }
    fn open_entry(&self, _path: &str) -> Option<Vec<u8>> {
        None
    }
}

fn manifest(name: &str) -> HashMap<String, String> {
    let mut m = HashMap::new();
    m.insert("Bundle-SymbolicName".to_string(), name.to_string());
    m
}

struct ProviderActivator;

impl Activator for ProviderActivator {
    fn start(&self, ctx: &BundleContext) -> Result<()> {
        ctx.register_service("com.x.Counter", Arc::new(7i32), None, Properties::new());
        Ok(())
    }
    fn stop(&self, _ctx: &BundleContext) -> Result<()> {
        Ok(())
    }
}

struct Consumer;

struct ConsumerActivator {
    active_count: Arc<AtomicU32>,
}

impl Activator for ConsumerActivator {
    fn start(&self, ctx: &BundleContext) -> Result<()> {
        let active_count = Arc::clone(&self.active_count);
        let component = ComponentBuilder::new("consumer", Arc::new(Consumer))
            .with_dependency(ServiceDependency::required(
                "com.x.Counter",
                Cardinality::One,
                UpdateStrategy::Suspend,
            ))
            .on_start(Arc::new(move |_| {
                active_count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .build();
        ctx.dependency_manager().add_component(component);
        Ok(())
    }
    fn stop(&self, _ctx: &BundleContext) -> Result<()> {
        Ok(())
    }
}

#[test]
fn provider_then_consumer_reaches_active_and_shuts_down_cleanly() {
    let framework = Framework::create(Properties::new());
    framework.start().unwrap();

    let active_count = Arc::new(AtomicU32::new(0));

    let provider = Arc::new(MapArchive {
        location: "test://provider".into(),
        manifest: manifest("com.x.provider"),
    });
    let provider_id = framework.bundles().install(provider, Some(Arc::new(ProviderActivator))).unwrap();
    framework.bundles().start(provider_id).unwrap();

    let consumer = Arc::new(MapArchive {
        location: "test://consumer".into(),
        manifest: manifest("com.x.consumer"),
    });
    let consumer_id = framework
        .bundles()
        .install(
            consumer,
            Some(Arc::new(ConsumerActivator {
                active_count: Arc::clone(&active_count),
            })),
        )
        .unwrap();
    framework.bundles().start(consumer_id).unwrap();

    wait_a_bit();
    assert_eq!(active_count.load(Ordering::SeqCst), 1);

    framework.stop().unwrap();
    framework.wait_for_stop();
}

struct FlakyActivator;

impl Activator for FlakyActivator {
    fn start(&self, _ctx: &BundleContext) -> Result<()> {
        panic!("deliberate startup failure");
    }
    fn stop(&self, _ctx: &BundleContext) -> Result<()> {
        Ok(())
    }
}

#[test]
fn bundle_start_rollback_via_framework() {
    let framework = Framework::create(Properties::new());
    framework.start().unwrap();

    let archive = Arc::new(MapArchive {
        location: "test://flaky".into(),
        manifest: manifest("com.x.flaky"),
    });
    let id = framework.bundles().install(archive, Some(Arc::new(FlakyActivator))).unwrap();

    let err = framework.bundles().start(id).unwrap_err();
    assert!(matches!(err, modhost::ModError::ActivatorFailed(_)));
    assert_eq!(
        framework.bundles().state(id),
        Some(modhost::bundle::BundleState::Resolved)
    );

    framework.stop().unwrap();
}

#[test]
fn fire_generic_event_blocks_until_done() {
    let framework = Framework::create(Properties::new());
    framework.start().unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let done_clone = Arc::clone(&done);
    let event_id = framework.fire_generic_event(
        0,
        "integration-test",
        || std::thread::sleep(Duration::from_millis(50)),
        move || done_clone.store(true, Ordering::SeqCst),
    );

    framework.wait_for_event(event_id);
    assert!(done.load(Ordering::SeqCst));

    framework.stop().unwrap();
}

#[test]
fn component_state_reported_through_dependency_manager() {
    let framework = Framework::create(Properties::new());
    framework.start().unwrap();

    let ctx = framework.framework_context();
    let dm = ctx.dependency_manager();
    let component = ComponentBuilder::new("standalone", Arc::new(Consumer)).build();
    let id = dm.add_component(component);
    wait_a_bit();
    assert_eq!(dm.component_state(id), Some(ComponentState::Active));

    framework.stop().unwrap();
}
