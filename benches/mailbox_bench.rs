use std::sync::Arc;
use std::thread;

use criterion::{criterion_group, criterion_main, Criterion};
use kvs_mailbox::thread_pool::{SharedQueueThreadPool, ThreadPool};
use kvs_mailbox::{Config, KvStore, KvsServer, Mailbox, MailboxClient, MailboxServer};
use tempfile::TempDir;

fn open(temp_dir: &TempDir) -> KvStore {
    let config = Config {
        snapshot_path: temp_dir.path().join("database.txt"),
        ..Config::default()
    };
    KvStore::open(&config).expect("unable to open store")
}

fn read_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_round_trip");

    let temp_dir = TempDir::new().expect("unable to create temporary working directory");
    let mailbox = Arc::new(Mailbox::default());
    let server = MailboxServer::new(Arc::clone(&mailbox), open(&temp_dir));
    let server_thread = thread::spawn(move || server.run());
    let client = MailboxClient::attach(Arc::clone(&mailbox), None);
    client.call("CREATE key value").unwrap();
    group.bench_function("mailbox", |b| {
        b.iter(|| client.call("READ key").unwrap());
    });
    mailbox.close();
    server_thread.join().unwrap().unwrap();

    let temp_dir = TempDir::new().unwrap();
    let handle = KvsServer::new(open(&temp_dir), SharedQueueThreadPool::new(4).unwrap())
        .start()
        .unwrap();
    let client = handle.connect();
    client.call("CREATE key value").unwrap();
    group.bench_function("dispatch", |b| {
        b.iter(|| client.call("READ key").unwrap());
    });
    handle.shutdown().unwrap();

    group.finish();
}

fn write_round_trip(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let mailbox = Arc::new(Mailbox::default());
    let server = MailboxServer::new(Arc::clone(&mailbox), open(&temp_dir));
    let server_thread = thread::spawn(move || server.run());
    let client = MailboxClient::attach(Arc::clone(&mailbox), None);

    let mut i = 0u64;
    c.bench_function("mailbox_create_with_snapshot", |b| {
        b.iter(|| {
            i = (i + 1) % 100;
            client.call(&format!("CREATE {} value_{}", i, i)).unwrap()
        });
    });

    mailbox.close();
    server_thread.join().unwrap().unwrap();
}

criterion_group!(benches, read_round_trip, write_round_trip);
criterion_main!(benches);
