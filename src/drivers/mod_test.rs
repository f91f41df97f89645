use super::*;
use crate::config::{ConfigOverrides, EndpointName};
use crate::drivers::http::Transport;
use crate::error::TransportError;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Transport that answers every request with its own label.
struct Labelled(&'static str);

#[async_trait::async_trait]
impl Transport for Labelled {
    async fn request(&self, _endpoint: EndpointName, _data: Option<&Value>) -> Result<Value, TransportError> {
        Ok(json!(self.0))
    }
}

fn registry() -> Drivers {
    Drivers::new(Arc::new(Config::default()))
}

fn counting_factory(
    label: &'static str,
    builds: &Arc<AtomicUsize>,
) -> impl Fn(&Config) -> Result<Arc<dyn Transport>, DriverError> + Send + Sync + 'static {
    let builds = Arc::clone(builds);
    move |_: &Config| {
        builds.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(Labelled(label)) as Arc<dyn Transport>)
    }
}

#[test]
fn get_without_selection_is_unselected() {
    let drivers = registry();
    assert_eq!(drivers.get::<Http>().err(), Some(DriverError::Unselected { kind: DriverKind::Http }));
}

#[test]
fn get_unknown_name_is_unknown_driver() {
    let drivers = registry();
    drivers.select::<Http>("ghost");
    let err = drivers.get::<Http>().err().unwrap();
    assert_eq!(err, DriverError::Unknown { kind: DriverKind::Http, name: "ghost".into() });
    assert_eq!(err.to_string(), r#"no http driver registered under "ghost""#);
}

#[test]
fn select_does_not_validate() {
    let drivers = registry();
    drivers.select::<Http>("later");
    assert_eq!(drivers.active::<Http>().as_deref(), Some("later"));
}

#[tokio::test]
async fn get_is_memoized_and_built_once() {
    let drivers = registry();
    let builds = Arc::new(AtomicUsize::new(0));
    drivers.register::<Http, _>("a", counting_factory("a", &builds));
    drivers.select::<Http>("a");

    let first = drivers.get::<Http>().unwrap();
    let second = drivers.get::<Http>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert_eq!(first.request(EndpointName::FetchUser, None).await.unwrap(), json!("a"));
}

#[tokio::test]
async fn switching_drivers_builds_then_reuses() {
    let drivers = registry();
    let builds_a = Arc::new(AtomicUsize::new(0));
    let builds_b = Arc::new(AtomicUsize::new(0));
    drivers.register::<Http, _>("a", counting_factory("a", &builds_a));
    drivers.register::<Http, _>("b", counting_factory("b", &builds_b));

    let a = drivers.select::<Http>("a").get::<Http>().unwrap();
    let b = drivers.select::<Http>("b").get::<Http>().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(b.request(EndpointName::Logout, None).await.unwrap(), json!("b"));

    let a_again = drivers.select::<Http>("a").get::<Http>().unwrap();
    assert!(Arc::ptr_eq(&a, &a_again));
    assert_eq!(builds_a.load(Ordering::SeqCst), 1);
    assert_eq!(builds_b.load(Ordering::SeqCst), 1);
}

#[test]
fn register_overwrites_factory_before_first_use() {
    let drivers = registry();
    let old = Arc::new(AtomicUsize::new(0));
    let new = Arc::new(AtomicUsize::new(0));
    drivers.register::<Http, _>("a", counting_factory("old", &old));
    drivers.register::<Http, _>("a", counting_factory("new", &new));
    drivers.select::<Http>("a").get::<Http>().unwrap();
    assert_eq!(old.load(Ordering::SeqCst), 0);
    assert_eq!(new.load(Ordering::SeqCst), 1);
}

#[test]
fn factory_errors_are_not_cached() {
    let drivers = registry();
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&attempts);
    drivers.register::<Http, _>("flaky", move |_: &Config| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(DriverError::Build { kind: DriverKind::Http, name: "flaky".into(), reason: "first call".into() })
        } else {
            Ok(Arc::new(Labelled("flaky")) as Arc<dyn Transport>)
        }
    });
    drivers.select::<Http>("flaky");

    assert!(matches!(drivers.get::<Http>(), Err(DriverError::Build { .. })));
    assert!(drivers.get::<Http>().is_ok());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn factory_receives_resolved_config() {
    let config = Arc::new(Config::resolve(ConfigOverrides::default().http_options(json!({ "base_url": "http://x" }))));
    let drivers = Drivers::new(Arc::clone(&config));
    drivers.register::<Http, _>("inspecting", |config: &Config| {
        assert_eq!(config.http.config["base_url"], "http://x");
        Ok(Arc::new(Labelled("inspecting")) as Arc<dyn Transport>)
    });
    drivers.select::<Http>("inspecting").get::<Http>().unwrap();
    assert!(Arc::ptr_eq(drivers.config(), &config));
}

#[test]
fn kind_displays_lowercase() {
    assert_eq!(DriverKind::Http.to_string(), "http");
    assert_eq!(<Http as Capability>::KIND, DriverKind::Http);
}
