mod common;

use std::io::{BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use common::{relay_config, start_relay, start_stack, stop_stack};
use jhelp::frame::{read_request, write_request};
use jhelp::protocol::{SEARCH_FIRST, UNKNOWN_TERM};
use jhelp::{Entry, GlossaryClient, JHelpError, Operation, Request};

#[test]
fn insert_select_delete_scenario() {
    let (db, relay) = start_stack();
    let mut client = GlossaryClient::connect(&relay.addr.to_string()).unwrap();

    let inserted = client.add("foo", "bar").unwrap();
    assert_eq!(inserted.key, Entry::stored(1, "foo"));
    assert_eq!(inserted.values, vec![Entry::stored(1, "bar")]);

    let selected = client.find("foo").unwrap();
    assert_eq!(selected.key, inserted.key);
    assert_eq!(selected.values, inserted.values);

    let deleted = client.delete(0).unwrap();
    assert_eq!(deleted.key, Entry::new(UNKNOWN_TERM));
    assert!(!client.find("foo").unwrap().is_found());

    client.disconnect().unwrap();
    stop_stack(db, relay);
}

#[test]
fn edit_through_current_view() {
    let (db, relay) = start_stack();
    let mut client = GlossaryClient::connect(&relay.addr.to_string()).unwrap();
    client.add("colour", "a hue").unwrap();
    client.add("colour", "a flag").unwrap();

    client.find("colour").unwrap();
    let edited = client.edit(1, "colour", "a banner").unwrap();
    assert_eq!(edited.key, Entry::stored(1, "colour"));
    assert_eq!(
        edited.values,
        vec![Entry::stored(1, "a hue"), Entry::stored(2, "a banner")]
    );

    let renamed = client.edit(0, "color", "a hue").unwrap();
    assert_eq!(renamed.key, Entry::stored(1, "color"));
    assert_eq!(renamed.values.len(), 2);

    client.disconnect().unwrap();
    stop_stack(db, relay);
}

#[test]
fn edit_before_search_is_refused() {
    let (db, relay) = start_stack();
    let mut client = GlossaryClient::connect(&relay.addr.to_string()).unwrap();
    let response = client.edit(0, "baz", "qux").unwrap();
    assert_eq!(response.values[0].text, SEARCH_FIRST);
    assert!(!client.find("baz").unwrap().is_found());
    client.disconnect().unwrap();
    stop_stack(db, relay);
}

#[test]
fn concurrent_front_ends_share_one_downstream() {
    let (db, relay) = start_stack();
    let addr = relay.addr.to_string();

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let addr = addr.clone();
            thread::spawn(move || {
                let mut client = GlossaryClient::connect(&addr).unwrap();
                let mut ids = Vec::new();
                for n in 0..5 {
                    let term = format!("term-{i}");
                    let response = client.add(&term, &format!("def-{i}-{n}")).unwrap();
                    // Each front-end only ever sees its own term.
                    assert_eq!(response.key.text, term);
                    assert_eq!(response.values.len(), n + 1);
                    ids.push(response.key.id.unwrap());
                }
                client.disconnect().unwrap();
                ids
            })
        })
        .collect();

    let mut term_ids: Vec<i64> = workers
        .into_iter()
        .map(|w| {
            let ids = w.join().unwrap();
            assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
            ids[0]
        })
        .collect();
    term_ids.sort();
    assert_eq!(term_ids, (1..=8).collect::<Vec<_>>());

    let mut client = GlossaryClient::connect(&addr).unwrap();
    let all: Vec<i64> = (0..8)
        .flat_map(|i| {
            client
                .find(&format!("term-{i}"))
                .unwrap()
                .definitions()
                .map(|d| d.id.unwrap())
                .collect::<Vec<_>>()
        })
        .collect();
    let mut distinct = all.clone();
    distinct.sort();
    distinct.dedup();
    assert_eq!(distinct.len(), 40);
    client.disconnect().unwrap();

    stop_stack(db, relay);
}

#[test]
fn malformed_frame_is_dropped() {
    let (db, relay) = start_stack();
    let stream = TcpStream::connect(relay.addr).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = stream;

    writer.write_all(&2u32.to_be_bytes()).unwrap();
    writer.write_all(&[0x2a, 0xff]).unwrap();
    write_request(&mut writer, &Request::select("foo")).unwrap();

    let response = read_request(&mut reader).unwrap().unwrap();
    assert_eq!(response.operation, Operation::Select);
    assert!(!response.is_found());

    write_request(&mut writer, &Request::disconnect()).unwrap();
    let ack = read_request(&mut reader).unwrap().unwrap();
    assert_eq!(ack.operation, Operation::Disconnect);
    stop_stack(db, relay);
}

#[test]
fn shutdown_disconnects_live_front_ends() {
    let (db, relay) = start_stack();
    let stream = TcpStream::connect(relay.addr).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = stream;
    write_request(&mut writer, &Request::select("foo")).unwrap();
    read_request(&mut reader).unwrap().unwrap();

    relay.shutdown.shutdown();
    let notice = read_request(&mut reader).unwrap().unwrap();
    assert_eq!(notice.operation, Operation::Disconnect);
    relay.thread.join().unwrap().unwrap();

    // The persistence tier saw the relay leave and accepts a new one.
    let relay = start_relay(&relay_config(db.addr, 5));
    let mut client = GlossaryClient::connect(&relay.addr.to_string()).unwrap();
    assert!(!client.find("foo").unwrap().is_found());
    client.disconnect().unwrap();
    stop_stack(db, relay);
}

#[test]
fn downstream_loss_stops_the_relay() {
    let fake = TcpListener::bind("127.0.0.1:0").unwrap();
    let fake_addr = fake.local_addr().unwrap();
    let closer = thread::spawn(move || {
        let (stream, _) = fake.accept().unwrap();
        let mut reader = BufReader::new(stream);
        // Take one request, then vanish without answering.
        read_request(&mut reader).unwrap();
    });

    let relay = start_relay(&relay_config(fake_addr, 5));
    let mut client = GlossaryClient::connect(&relay.addr.to_string()).unwrap();
    let err = client.find("foo").unwrap_err();
    assert!(matches!(err, JHelpError::Disconnected));
    closer.join().unwrap();

    assert!(matches!(
        relay.thread.join().unwrap(),
        Err(JHelpError::Disconnected)
    ));
    assert!(TcpStream::connect(relay.addr).is_err());
}

#[test]
fn downstream_timeout_is_a_failure() {
    let silent = TcpListener::bind("127.0.0.1:0").unwrap();
    let silent_addr = silent.local_addr().unwrap();
    let holder = thread::spawn(move || {
        let (stream, _) = silent.accept().unwrap();
        thread::sleep(Duration::from_secs(3));
        drop(stream);
    });

    let relay = start_relay(&relay_config(silent_addr, 1));
    let mut client = GlossaryClient::connect(&relay.addr.to_string()).unwrap();
    let started = Instant::now();
    let err = client.find("foo").unwrap_err();
    assert!(matches!(err, JHelpError::Disconnected));
    assert!(started.elapsed() < Duration::from_secs(3));

    assert!(relay.thread.join().unwrap().is_err());
    holder.join().unwrap();
}

#[test]
fn shutdown_does_not_wait_on_a_front_end_that_stopped_reading() {
    let (db, relay) = start_stack();
    let mut client = GlossaryClient::connect(&relay.addr.to_string()).unwrap();
    client.add("big", &"x".repeat(4 << 20)).unwrap();
    client.disconnect().unwrap();

    let idle = TcpStream::connect(relay.addr).unwrap();
    let mut idle_reader = BufReader::new(idle.try_clone().unwrap());
    let mut idle_writer = idle;
    write_request(&mut idle_writer, &Request::select("small")).unwrap();
    read_request(&mut idle_reader).unwrap().unwrap();

    // Ask for far more than the socket buffers hold and never read it.
    let mut stalled = TcpStream::connect(relay.addr).unwrap();
    for _ in 0..40 {
        write_request(&mut stalled, &Request::select("big")).unwrap();
    }
    thread::sleep(Duration::from_secs(1));

    relay.shutdown.shutdown();
    let (done, finished) = mpsc::channel();
    let handle = relay.thread;
    thread::spawn(move || {
        let _ = done.send(handle.join());
    });
    let exited = finished
        .recv_timeout(Duration::from_secs(10))
        .expect("relay kept waiting on the stalled front-end");
    exited.unwrap().unwrap();

    let notice = read_request(&mut idle_reader).unwrap().unwrap();
    assert_eq!(notice.operation, Operation::Disconnect);
    drop(stalled);
    db.stop().unwrap();
}

#[test]
fn downstream_loss_disconnects_every_front_end() {
    let fake = TcpListener::bind("127.0.0.1:0").unwrap();
    let fake_addr = fake.local_addr().unwrap();
    let backend = thread::spawn(move || {
        let (stream, _) = fake.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;
        read_request(&mut reader).unwrap().unwrap();
        write_request(&mut writer, &Request::not_found(Operation::Select)).unwrap();
        // Take the next request, then vanish without answering.
        read_request(&mut reader).unwrap();
    });

    let relay = start_relay(&relay_config(fake_addr, 5));
    let idle = TcpStream::connect(relay.addr).unwrap();
    let mut idle_reader = BufReader::new(idle.try_clone().unwrap());
    let mut idle_writer = idle;
    write_request(&mut idle_writer, &Request::select("foo")).unwrap();
    assert!(!read_request(&mut idle_reader).unwrap().unwrap().is_found());

    let mut active = GlossaryClient::connect(&relay.addr.to_string()).unwrap();
    assert!(matches!(
        active.find("foo").unwrap_err(),
        JHelpError::Disconnected
    ));
    backend.join().unwrap();

    let notice = read_request(&mut idle_reader).unwrap().unwrap();
    assert_eq!(notice.operation, Operation::Disconnect);
    assert!(matches!(
        relay.thread.join().unwrap(),
        Err(JHelpError::Disconnected)
    ));
}

#[test]
fn timeout_bounds_the_whole_round_trip() {
    let slow = TcpListener::bind("127.0.0.1:0").unwrap();
    let slow_addr = slow.local_addr().unwrap();
    let dribbler = thread::spawn(move || {
        let (stream, _) = slow.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;
        read_request(&mut reader).unwrap();
        let mut frame = Vec::new();
        write_request(&mut frame, &Request::not_found(Operation::Select)).unwrap();
        // Each byte arrives well inside the timeout, the whole frame does not.
        for byte in frame {
            if writer.write_all(&[byte]).is_err() {
                break;
            }
            thread::sleep(Duration::from_millis(400));
        }
    });

    let relay = start_relay(&relay_config(slow_addr, 1));
    let mut client = GlossaryClient::connect(&relay.addr.to_string()).unwrap();
    let started = Instant::now();
    assert!(matches!(
        client.find("foo").unwrap_err(),
        JHelpError::Disconnected
    ));
    assert!(started.elapsed() < Duration::from_secs(3));

    assert!(relay.thread.join().unwrap().is_err());
    dribbler.join().unwrap();
}
