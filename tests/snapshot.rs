use std::fs;
use std::io::Cursor;

use kvs_mailbox::engine::snapshot::{read_from, write_to};
use kvs_mailbox::{Config, KvStore, KvsEngine, Snapshot, Store};
use tempfile::TempDir;

fn sample() -> Store {
    vec![
        ("1".to_owned(), "value_A".to_owned()),
        ("two words".to_owned(), " leading and trailing ".to_owned()),
        ("empty".to_owned(), String::new()),
        ("ключ".to_owned(), "значение".to_owned()),
    ]
    .into_iter()
    .collect()
}

#[test]
fn missing_file_loads_empty_store() {
    let temp_dir = TempDir::new().expect("unable to create temporary working directory");
    let snapshot = Snapshot::new(temp_dir.path().join("absent.txt"));

    let store = snapshot.load().unwrap();
    assert!(store.is_empty());
}

#[test]
fn reads_line_pairs() {
    let store = read_from(Cursor::new("a\n1\nb\n2\n")).unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(store.get("a").map(String::as_str), Some("1"));
    assert_eq!(store.get("b").map(String::as_str), Some("2"));
}

#[test]
fn trailing_key_without_value_is_ignored() {
    let store = read_from(Cursor::new("a\n1\norphan\n")).unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(store.get("orphan"), None);
}

#[test]
fn later_duplicate_keys_win() {
    let store = read_from(Cursor::new("a\n1\na\n2\n")).unwrap();
    assert_eq!(store.get("a").map(String::as_str), Some("2"));
}

#[test]
fn writes_key_line_then_value_line() {
    let store: Store = vec![("k".to_owned(), "v w".to_owned())].into_iter().collect();
    let mut out = Vec::new();
    write_to(&store, &mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "k\nv w\n");
}

#[test]
fn save_load_save_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let snapshot = Snapshot::new(temp_dir.path().join("database.txt"));
    let original = sample();

    snapshot.save(&original).unwrap();
    let loaded = snapshot.load().unwrap();
    assert_eq!(loaded, original);

    snapshot.save(&loaded).unwrap();
    assert_eq!(snapshot.load().unwrap(), original);
    assert!(!temp_dir.path().join("database.txt.tmp").exists());
}

#[test]
fn save_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("dir").join("db.txt");
    Snapshot::new(&path).save(&sample()).unwrap();
    assert!(path.exists());
}

#[test]
fn store_reloads_from_snapshot() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config {
        snapshot_path: temp_dir.path().join("database.txt"),
        ..Config::default()
    };

    let store = KvStore::open(&config).unwrap();
    store.set("key1".to_owned(), "value1".to_owned()).unwrap();
    store.set("key2".to_owned(), "value2".to_owned()).unwrap();
    store.set("key1".to_owned(), "value3".to_owned()).unwrap();
    store.remove("key2".to_owned()).unwrap();
    drop(store);

    let store = KvStore::open(&config).unwrap();
    assert_eq!(store.get("key1".to_owned()).unwrap(), Some("value3".to_owned()));
    assert_eq!(store.get("key2".to_owned()).unwrap(), None);
    assert!(store.health().durable);
    assert_eq!(store.health().keys, 1);
}

#[test]
fn line_breaks_rejected_at_api() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config {
        snapshot_path: temp_dir.path().join("database.txt"),
        ..Config::default()
    };
    let store = KvStore::open(&config).unwrap();

    assert!(store.set("a\nb".to_owned(), "v".to_owned()).is_err());
    assert!(store.set("k".to_owned(), "v\r\n".to_owned()).is_err());
    assert_eq!(store.health().keys, 0);
}

// a snapshot path that is a directory can be neither read nor replaced; the store still
// serves from memory and reports the durability gap
#[test]
fn unwritable_snapshot_degrades_durability() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("snapshot-dir");
    fs::create_dir(&path).unwrap();
    let config = Config {
        snapshot_path: path,
        ..Config::default()
    };

    let store = KvStore::open(&config).unwrap();
    assert!(!store.health().durable);

    store.set("k".to_owned(), "v".to_owned()).unwrap();
    assert_eq!(store.get("k".to_owned()).unwrap(), Some("v".to_owned()));

    let health = store.health();
    assert!(!health.durable);
    assert!(health.last_error.is_some());
    assert_eq!(health.keys, 1);
}
