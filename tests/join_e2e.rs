use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use kview::{join, Controller, Event, Feed, Filter, Object, ObjectKey, Publisher, ViewConfig};

#[derive(Debug, Clone, PartialEq)]
struct Service {
    name: String,
    selector: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
struct Pod {
    name: String,
    labels: BTreeMap<String, String>,
}

fn app_labels(app: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), app.to_string());
    labels
}

fn service(name: &str, app: &str) -> Service {
    Service {
        name: name.to_string(),
        selector: app_labels(app),
    }
}

fn pod(name: &str, app: &str) -> Pod {
    Pod {
        name: name.to_string(),
        labels: app_labels(app),
    }
}

impl Object for Service {
    fn key(&self) -> ObjectKey {
        ObjectKey::new("default", self.name.clone())
    }
}

impl Object for Pod {
    fn key(&self) -> ObjectKey {
        ObjectKey::new("default", self.name.clone())
    }

    fn labels(&self) -> Option<&BTreeMap<String, String>> {
        Some(&self.labels)
    }
}

fn selected_pods(services: &[Service]) -> Filter<Pod> {
    Filter::any_of(services.iter().map(|svc| Filter::labels(svc.selector.clone())))
}

fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn names(view: &impl Controller<Pod>) -> Vec<String> {
    view.cache()
        .list()
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect()
}

struct Cluster {
    services_feed: Feed<Service>,
    pods_feed: Feed<Pod>,
    services: Publisher<Service>,
    pods: Publisher<Pod>,
}

fn cluster() -> Cluster {
    let cfg = ViewConfig::default();
    let (services_feed, services_root) = Feed::<Service>::new(&cfg);
    let (pods_feed, pods_root) = Feed::<Pod>::new(&cfg);
    Cluster {
        services_feed,
        pods_feed,
        services: Publisher::new(services_root, &cfg).unwrap(),
        pods: Publisher::new(pods_root, &cfg).unwrap(),
    }
}

#[test]
fn selector_change_swaps_pods() {
    let mut c = cluster();
    let derived = join(&c.services, &c.pods, selected_pods).unwrap();
    let sub = derived.subscribe().unwrap();
    let events = sub.events();

    c.pods_feed.sync(vec![pod("pod1", "x"), pod("pod2", "y")]).unwrap();
    c.services_feed.sync(vec![service("svc1", "x")]).unwrap();
    assert!(wait_for(|| names(&derived) == ["pod1"]));

    c.services_feed.apply(Event::Update(service("svc1", "y"))).unwrap();
    assert!(wait_for(|| names(&derived) == ["pod2"]));

    let mut seen = Vec::new();
    while let Ok(evt) = events.recv_timeout(Duration::from_secs(1)) {
        let last = evt == Event::Create(pod("pod2", "y"));
        seen.push(evt);
        if last {
            break;
        }
    }
    assert!(seen.len() >= 2, "events: {seen:?}");
    assert_eq!(
        seen[seen.len() - 2..],
        [Event::Delete(pod("pod1", "x")), Event::Create(pod("pod2", "y"))]
    );
}

#[test]
fn driving_creates_and_deletes_recompute_membership() {
    let mut c = cluster();
    let derived = join(&c.services, &c.pods, selected_pods).unwrap();

    c.pods_feed
        .sync(vec![pod("a", "x"), pod("b", "y"), pod("c", "z")])
        .unwrap();
    c.services_feed.sync(vec![service("svc1", "x")]).unwrap();
    assert!(wait_for(|| names(&derived) == ["a"]));

    c.services_feed.apply(Event::Create(service("svc2", "y"))).unwrap();
    assert!(wait_for(|| names(&derived) == ["a", "b"]));

    c.services_feed.apply(Event::Delete(service("svc1", "x"))).unwrap();
    assert!(wait_for(|| names(&derived) == ["b"]));

    // With no services left nothing is selected.
    c.services_feed.apply(Event::Delete(service("svc2", "y"))).unwrap();
    assert!(wait_for(|| names(&derived).is_empty()));

    // Target-side changes flow through the current filter.
    c.services_feed.apply(Event::Create(service("svc3", "z"))).unwrap();
    c.pods_feed.apply(Event::Create(pod("d", "z"))).unwrap();
    assert!(wait_for(|| names(&derived) == ["c", "d"]));
}

#[test]
fn closing_derived_unregisters_from_both_sides() {
    let mut c = cluster();
    let derived = join(&c.services, &c.pods, selected_pods).unwrap();
    c.services_feed.sync(vec![service("svc1", "x")]).unwrap();
    c.pods_feed.sync(vec![pod("a", "x")]).unwrap();

    assert!(wait_for(|| c.services.subscriber_count() == 1));
    assert_eq!(c.pods.subscriber_count(), 1);

    derived.close();
    assert!(derived.done().wait_timeout(Duration::from_secs(1)));
    assert!(wait_for(|| c.services.subscriber_count() == 0));
    assert!(wait_for(|| c.pods.subscriber_count() == 0));

    // The base views are untouched.
    assert!(!c.services.done().is_fired());
    assert!(!c.pods.done().is_fired());
    c.services_feed.apply(Event::Create(service("svc2", "y"))).unwrap();
}

#[test]
fn join_on_closed_driving_view_fails() {
    let c = cluster();
    c.services_feed.close();

    let res = join(&c.services, &c.pods, selected_pods);
    assert!(matches!(res, Err(ref e) if e.is_closed()));
    assert!(wait_for(|| c.pods.subscriber_count() == 0));
    assert!(!c.pods.done().is_fired());
}
