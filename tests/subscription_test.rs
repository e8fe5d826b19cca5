mod common;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use streamstore::codec::json;
use streamstore::{Error, EventStore, JsonCodec, Version, Versioned};

use common::{collector, sqlite_store, sqlite_store_with_config, wait_for_len};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Person {
    #[serde(rename = "Name")]
    name: String,
}

fn person(name: &str) -> Person {
    Person { name: name.into() }
}

// Sum-typed todo events, dispatched on the type hint.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TodoCreated {
    id: u32,
    title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TodoDone {
    id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TodoDeleted {
    id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum TodoEvent {
    Created(TodoCreated),
    Done(TodoDone),
    Deleted(TodoDeleted),
}

impl From<TodoCreated> for TodoEvent {
    fn from(e: TodoCreated) -> Self {
        TodoEvent::Created(e)
    }
}

impl From<TodoDone> for TodoEvent {
    fn from(e: TodoDone) -> Self {
        TodoEvent::Done(e)
    }
}

impl From<TodoDeleted> for TodoEvent {
    fn from(e: TodoDeleted) -> Self {
        TodoEvent::Deleted(e)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Item {
    name: String,
    #[serde(skip)]
    version: Version,
}

impl Versioned for Item {
    fn set_version(&mut self, version: &Version) {
        self.version = version.clone();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn subscriber_sees_published_event_once() {
    let (_dir, _path, store) = sqlite_store::<Person>();
    let (seen, consumer) = collector::<Person>();

    let sub = store.subscribe(consumer).unwrap();
    store.publish(&person("John")).unwrap();

    let events = wait_for_len(&seen, 1).await;
    assert_eq!(events, vec![person("John")]);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(seen.lock().len(), 1);
    sub.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn live_events_arrive_in_publish_order() {
    let (_dir, _path, store) = sqlite_store::<Person>();
    let stream = store.stream("people");
    let (seen, consumer) = collector::<Person>();

    let _sub = stream.subscribe(consumer).unwrap();
    let names: Vec<String> = (0..25).map(|i| format!("p{i}")).collect();
    for name in &names {
        stream.publish(&person(name)).unwrap();
    }

    let events = wait_for_len(&seen, names.len()).await;
    let got: Vec<_> = events.into_iter().map(|p| p.name).collect();
    assert_eq!(got, names);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn type_hints_select_the_variant() {
    let (_dir, path) = common::create_temp_db_file("todos.db");
    let codec = JsonCodec::typed::<TodoEvent>()
        .with_type("todoCreated", json::decoder::<TodoCreated, TodoEvent>())
        .with_type("todoDone", json::decoder::<TodoDone, TodoEvent>())
        .with_type("todoDeleted", json::decoder::<TodoDeleted, TodoEvent>());
    let store = EventStore::<TodoEvent>::open(&path).unwrap().with_codec(codec);
    let todos = store.stream("todos");

    let (seen, consumer) = collector::<String>();
    let _sub = todos
        .subscribe(move |event: TodoEvent| {
            let label = match event {
                TodoEvent::Created(e) => format!("created:{}:{}", e.id, e.title),
                TodoEvent::Done(e) => format!("done:{}", e.id),
                TodoEvent::Deleted(e) => format!("deleted:{}", e.id),
            };
            consumer(label);
        })
        .unwrap();

    todos
        .with_type("todoCreated")
        .publish(&TodoCreated { id: 1, title: "milk".into() }.into())
        .unwrap();
    todos
        .with_type("todoDone")
        .publish(&TodoDone { id: 1 }.into())
        .unwrap();
    todos
        .with_type("todoDeleted")
        .publish(&TodoDeleted { id: 1 }.into())
        .unwrap();

    let labels = wait_for_len(&seen, 3).await;
    assert_eq!(labels, vec!["created:1:milk", "done:1", "deleted:1"]);

    // Replay takes the same path.
    let replayed = todos.all().unwrap();
    assert!(matches!(replayed[2], TodoEvent::Deleted(TodoDeleted { id: 1 })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn from_beginning_replays_history_then_goes_live() {
    let (_dir, _path, store) = sqlite_store::<Person>();
    let stream = store.stream("s");
    stream.publish(&person("first")).unwrap();

    let writer = stream.clone();
    let publisher = std::thread::spawn(move || writer.publish(&person("second")));

    let (seen, consumer) = collector::<Person>();
    let _sub = stream.subscribe_from_beginning(consumer).unwrap();
    publisher.join().unwrap().unwrap();

    let events = wait_for_len(&seen, 2).await;
    assert_eq!(events[0], person("first"));
    assert!(events.contains(&person("second")));

    stream.publish(&person("third")).unwrap();
    let events = wait_for_len(&seen, 3).await;
    assert_eq!(events.last(), Some(&person("third")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_stops_delivery() {
    let (_dir, _path, store) = sqlite_store::<Person>();
    let (seen, consumer) = collector::<Person>();

    let sub = store.subscribe(consumer).unwrap();
    store.publish(&person("before")).unwrap();
    wait_for_len(&seen, 1).await;

    sub.cancel();
    assert!(sub.is_cancelled());
    store.publish(&person("after")).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*seen.lock(), vec![person("before")]);
    sub.closed().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn subscribers_only_see_their_stream() {
    let (_dir, _path, store) = sqlite_store::<Person>();
    let a = store.stream("a");
    let b = store.stream("b");

    let (seen_b, consumer) = collector::<Person>();
    let _sub = b.subscribe(consumer).unwrap();

    a.publish(&person("for-a")).unwrap();
    b.publish(&person("for-b")).unwrap();
    a.publish(&person("for-a-again")).unwrap();

    wait_for_len(&seen_b, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*seen_b.lock(), vec![person("for-b")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn many_subscribers_each_receive_every_event() {
    let (_dir, _path, store) = sqlite_store::<Person>();
    let sinks: Vec<_> = (0..4).map(|_| collector::<Person>()).collect();
    let (seens, subs): (Vec<_>, Vec<_>) = sinks
        .into_iter()
        .map(|(seen, consumer)| (seen, store.subscribe(consumer).unwrap()))
        .unzip();

    store.publish(&person("x")).unwrap();
    store.publish(&person("y")).unwrap();

    for seen in &seens {
        assert_eq!(wait_for_len(seen, 2).await, vec![person("x"), person("y")]);
    }
    drop(subs);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn versioned_items_are_stamped() {
    let (_dir, _path, store) = sqlite_store::<Item>();
    let store = store.stamp_versions();
    let (seen, consumer) = collector::<Item>();

    let _sub = store.subscribe(consumer).unwrap();
    let version = store
        .publish(&Item {
            name: "widget".into(),
            version: Version::none(),
        })
        .unwrap();

    let items: Vec<Item> = wait_for_len(&seen, 1).await;
    assert!(!items[0].version.is_empty());
    assert_eq!(items[0].version, version);

    let replayed = store.all().unwrap();
    assert_eq!(replayed[0].version, version);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_consumer_lags_and_stops() {
    let (_dir, store) = sqlite_store_with_config::<Person>(|mut c| {
        c.notify_capacity = 2;
        c
    });

    let sub = store
        .subscribe(|_: Person| std::thread::sleep(Duration::from_millis(200)))
        .unwrap();

    for i in 0..10 {
        store.publish(&person(&format!("p{i}"))).unwrap();
    }

    let err = tokio::time::timeout(common::WAIT, sub.closed())
        .await
        .expect("subscription should stop")
        .unwrap_err();
    assert!(matches!(err, Error::SubscriptionLagged { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn subscription_budget_is_enforced_and_released() {
    let (_dir, store) = sqlite_store_with_config::<Person>(|mut c| {
        c.max_subscriptions = 1;
        c
    });

    let first = store.subscribe(|_: Person| {}).unwrap();
    let err = store.subscribe(|_: Person| {}).unwrap_err();
    assert!(matches!(err, Error::SubscriptionLimit { max: 1 }));

    first.cancel();
    first.closed().await.unwrap();

    let _second = store.subscribe(|_: Person| {}).unwrap();
}

#[tokio::test]
async fn in_memory_store_cannot_subscribe() {
    let store = EventStore::<Person>::in_memory();
    let err = store.subscribe(|_: Person| {}).unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
}

#[test]
fn subscribe_outside_runtime_fails() {
    let (_dir, _path, store) = sqlite_store::<Person>();
    let err = store.subscribe(|_: Person| {}).unwrap_err();
    assert!(matches!(err, Error::NoRuntime));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn subscription_sees_appends_from_another_handle() {
    let (_dir, path, writer) = sqlite_store::<Person>();
    let listener = EventStore::<Person>::open(&path).unwrap();
    let (seen, consumer) = collector::<Person>();

    let _sub = listener.subscribe(consumer).unwrap();
    writer.publish(&person("John")).unwrap();

    assert_eq!(wait_for_len(&seen, 1).await, vec![person("John")]);
    assert_eq!(listener.all().unwrap(), vec![person("John")]);
}
