use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_utils::thread::scope;
use kvs_mailbox::{Config, KvStore, KvsError, Mailbox, MailboxClient, MailboxServer};
use tempfile::TempDir;

fn start_server(temp_dir: &TempDir) -> (Arc<Mailbox>, thread::JoinHandle<kvs_mailbox::Result<()>>) {
    let config = Config {
        snapshot_path: temp_dir.path().join("database.txt"),
        ..Config::default()
    };
    let store = KvStore::open(&config).expect("unable to open store");
    let mailbox = Arc::new(Mailbox::default());
    let server = MailboxServer::new(Arc::clone(&mailbox), store);
    let handle = thread::spawn(move || server.run());
    (mailbox, handle)
}

#[test]
fn single_client_gets_its_own_responses() {
    let temp_dir = TempDir::new().expect("unable to create temporary working directory");
    let (mailbox, server) = start_server(&temp_dir);

    // the raw handshake is sound for a single client
    for i in 0..50 {
        mailbox.submit(&format!("CREATE k{} v{}", i, i), None).unwrap();
        assert_eq!(mailbox.await_response(None).unwrap(), format!("SUCCESS: CREATE for k{}", i));
        mailbox.submit(&format!("READ k{}", i), None).unwrap();
        assert_eq!(mailbox.await_response(None).unwrap(), format!("READ: k{} => v{}", i, i));
    }

    mailbox.close();
    server.join().unwrap().unwrap();
}

#[test]
fn crud_scenario_over_mailbox() {
    let temp_dir = TempDir::new().unwrap();
    let (mailbox, server) = start_server(&temp_dir);
    let client = MailboxClient::attach(Arc::clone(&mailbox), Some(Duration::from_secs(5)));

    assert_eq!(client.call("CREATE 1 value_A").unwrap(), "SUCCESS: CREATE for 1");
    assert_eq!(client.call("READ 1").unwrap(), "READ: 1 => value_A");
    assert_eq!(client.call("UPDATE 1 value_B").unwrap(), "SUCCESS: UPDATE for 1");
    assert_eq!(client.call("READ 1").unwrap(), "READ: 1 => value_B");
    assert_eq!(client.call("DELETE 1").unwrap(), "SUCCESS: DELETE 1");
    assert_eq!(client.call("READ 1").unwrap(), "ERROR: Key 1 not found");
    assert_eq!(client.call("FETCH 1").unwrap(), "ERROR: Unknown command");

    mailbox.close();
    server.join().unwrap().unwrap();
}

// Known limitation of the raw handshake: once the server has taken client A's request the slot
// looks free, client B submits, and B then consumes the response that answers A.
#[test]
fn raw_handshake_cross_talk_between_two_clients() {
    let mailbox = Mailbox::default();

    mailbox.submit("READ a", None).unwrap(); // client A
    let request_a = mailbox.take_request().unwrap(); // server picks up A
    mailbox.submit("READ b", None).unwrap(); // client B sees the slot free
    mailbox.post_response(&format!("answer to {}", request_a)).unwrap();

    let received_by_b = mailbox.await_response(None).unwrap();
    assert_eq!(received_by_b, "answer to READ a");

    let request_b = mailbox.take_request().unwrap();
    mailbox.post_response(&format!("answer to {}", request_b)).unwrap();
    let received_by_a = mailbox.await_response(None).unwrap();
    assert_eq!(received_by_a, "answer to READ b");
}

#[test]
fn session_lock_keeps_concurrent_clients_apart() {
    let temp_dir = TempDir::new().unwrap();
    let (mailbox, server) = start_server(&temp_dir);

    scope(|s| {
        for id in 0..16 {
            let client = MailboxClient::attach(Arc::clone(&mailbox), None);
            s.spawn(move |_| {
                for op in 0..20 {
                    let key = format!("c{}-{}", id, op);
                    assert_eq!(
                        client.call(&format!("CREATE {} {}", key, op)).unwrap(),
                        format!("SUCCESS: CREATE for {}", key)
                    );
                    assert_eq!(
                        client.call(&format!("READ {}", key)).unwrap(),
                        format!("READ: {} => {}", key, op)
                    );
                }
            });
        }
    })
    .unwrap();

    mailbox.close();
    server.join().unwrap().unwrap();
}

#[test]
fn overlong_request_fails_fast() {
    let mailbox = Mailbox::new(512);
    let request = format!("CREATE k {}", "x".repeat(600));

    match mailbox.submit(&request, None) {
        Err(KvsError::MessageTooLong { len, max }) => {
            assert_eq!(len, request.len());
            assert_eq!(max, 512);
        }
        other => panic!("expected MessageTooLong, got {:?}", other),
    }
    // nothing reached the slot, so the next submit doesn't have to wait
    mailbox.submit("READ k", Some(Duration::from_millis(10))).unwrap();
}

#[test]
fn overlong_response_is_replaced_by_error() {
    let temp_dir = TempDir::new().unwrap();
    let (mailbox, server) = start_server(&temp_dir);
    let client = MailboxClient::attach(Arc::clone(&mailbox), None);

    let value = "x".repeat(503);
    assert_eq!(client.call(&format!("CREATE k {}", value)).unwrap(), "SUCCESS: CREATE for k");
    let response = client.call("READ k").unwrap();
    assert!(response.starts_with("ERROR: message of"), "{}", response);

    mailbox.close();
    server.join().unwrap().unwrap();
}

#[test]
fn response_wait_times_out() {
    let mailbox = Mailbox::default();
    mailbox.submit("READ k", None).unwrap();

    match mailbox.await_response(Some(Duration::from_millis(20))) {
        Err(KvsError::Timeout(_)) => {}
        other => panic!("expected a timeout, got {:?}", other),
    }
    // the request slot is still occupied
    assert!(matches!(
        mailbox.submit("READ j", Some(Duration::from_millis(20))),
        Err(KvsError::Timeout(_))
    ));
}

#[test]
fn close_drains_pending_request() {
    let mailbox = Mailbox::default();
    mailbox.submit("READ k", None).unwrap();
    mailbox.close();

    assert!(matches!(mailbox.submit("READ j", None), Err(KvsError::ChannelClosed)));

    // the request submitted before closing is still served and answered
    assert_eq!(mailbox.take_request().unwrap(), "READ k");
    mailbox.post_response("ERROR: Key k not found").unwrap();
    assert_eq!(mailbox.await_response(None).unwrap(), "ERROR: Key k not found");

    assert!(matches!(mailbox.take_request(), Err(KvsError::ChannelClosed)));
    assert!(matches!(mailbox.await_response(None), Err(KvsError::ChannelClosed)));
}

#[test]
fn server_exits_when_closed() {
    let temp_dir = TempDir::new().unwrap();
    let (mailbox, server) = start_server(&temp_dir);

    thread::sleep(Duration::from_millis(20));
    mailbox.close();
    assert!(mailbox.is_closed());
    server.join().unwrap().unwrap();

    let client = MailboxClient::attach(mailbox, None);
    assert!(matches!(client.call("READ k"), Err(KvsError::ChannelClosed)));
}

// a late response must not answer the call that follows the timed out one
#[test]
fn late_response_is_dropped_after_call_timeout() {
    let mailbox = Arc::new(Mailbox::default());
    let server = {
        let mailbox = Arc::clone(&mailbox);
        thread::spawn(move || {
            let mut first = true;
            while let Ok(request) = mailbox.take_request() {
                if first {
                    thread::sleep(Duration::from_millis(200));
                    first = false;
                }
                mailbox.post_response(&format!("answer to {}", request)).unwrap();
            }
        })
    };

    assert!(matches!(
        mailbox.call("READ a", Some(Duration::from_millis(50))),
        Err(KvsError::Timeout(_))
    ));
    assert_eq!(
        mailbox.call("READ b", Some(Duration::from_secs(5))).unwrap(),
        "answer to READ b"
    );
    mailbox.close();
    server.join().unwrap();
}

#[test]
fn timed_out_call_withdraws_untaken_request() {
    let mailbox = Mailbox::default();
    assert!(matches!(
        mailbox.call("READ a", Some(Duration::from_millis(20))),
        Err(KvsError::Timeout(_))
    ));

    // the slot is free again and the server only ever sees the later request
    mailbox.submit("READ b", Some(Duration::from_millis(20))).unwrap();
    assert_eq!(mailbox.take_request().unwrap(), "READ b");
}
