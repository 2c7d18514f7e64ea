// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time;

use log::info;

use scalemsg::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_pipeline_connected_to_bound() {
    init_logging();
    let session = Session::new();
    let pull = session.create_socket(SocketType::Pull);
    let push = session.create_socket(SocketType::Push);

    pull.bind("tcp://127.0.0.1:5480").unwrap();
    push.connect("tcp://127.0.0.1:5480").unwrap();

    let sent = vec![65, 66, 67];
    push.send(sent).unwrap();
    let received = pull.recv().unwrap();

    assert_eq!(vec![65, 66, 67], received)
}

#[test]
fn test_pipeline_bound_to_connected() {
    init_logging();
    let session = Session::new();
    let pull = session.create_socket(SocketType::Pull);
    let push = session.create_socket(SocketType::Push);

    push.bind("tcp://127.0.0.1:5481").unwrap();
    pull.connect("tcp://127.0.0.1:5481").unwrap();

    let sent = vec![65, 66, 67];
    push.send(sent).unwrap();
    let received = pull.recv().unwrap();

    assert_eq!(vec![65, 66, 67], received)
}

#[test]
fn test_send_while_not_connected() {
    init_logging();
    let session = Session::new();
    let push = session.create_socket(SocketType::Push);
    let pull = session.create_socket(SocketType::Pull);

    let recver = thread::spawn(move || {
        thread::sleep(time::Duration::from_millis(50));
        pull.connect("tcp://127.0.0.1:5482").unwrap();
        let received = pull.recv().unwrap();
        assert_eq!(vec![65, 66, 67], received)
    });

    push.bind("tcp://127.0.0.1:5482").unwrap();
    push.send(vec![65, 66, 67]).unwrap();
    info!("test_send_while_not_connected: msg sent");

    recver.join().unwrap();
}

#[test]
fn test_send_timeout() {
    init_logging();
    let session = Session::new();
    let push = session.create_socket(SocketType::Push);
    let timeout = time::Duration::from_millis(50);

    // A zero length queue leaves nowhere for the message to wait:
    // with no peer connected the send must report the deadline.
    push.set_option(SocketOption::SendQueueLen(0)).unwrap();
    push.bind("tcp://127.0.0.1:5483").unwrap();
    push.set_send_timeout(timeout).unwrap();

    let err = push.send(vec![65, 66, 67]).unwrap_err();

    assert_eq!(Error::SendTimeout, err);
}

#[test]
fn test_recv_while_not_connected() {
    init_logging();
    let session = Session::new();
    let pull = session.create_socket(SocketType::Pull);
    let push = session.create_socket(SocketType::Push);
    let timeout = time::Duration::from_millis(5000);

    pull.set_recv_timeout(timeout).unwrap();
    pull.bind("tcp://127.0.0.1:5484").unwrap();

    let sender = thread::spawn(move || {
        thread::sleep(time::Duration::from_millis(50));
        push.connect("tcp://127.0.0.1:5484").unwrap();
        push.send(vec![65, 66, 67]).unwrap();
    });

    let received = pull.recv().unwrap();
    assert_eq!(vec![65, 66, 67], received);

    sender.join().unwrap();
}

#[test]
fn test_recv_timeout() {
    init_logging();
    let session = Session::new();
    let pull = session.create_socket(SocketType::Pull);
    let push = session.create_socket(SocketType::Push);
    let timeout = time::Duration::from_millis(50);

    pull.set_recv_timeout(timeout).unwrap();
    pull.bind("tcp://127.0.0.1:5485").unwrap();
    push.connect("tcp://127.0.0.1:5485").unwrap();

    let err = pull.recv().unwrap_err();

    assert_eq!(Error::RecvTimeout, err);
}

#[test]
fn test_pair_connected_to_bound() {
    init_logging();
    let session = Session::new();
    let bound = session.create_socket(SocketType::Pair);
    let connected = session.create_socket(SocketType::Pair);

    bound.set_recv_timeout(time::Duration::from_millis(5000)).unwrap();
    bound.bind("tcp://127.0.0.1:5486").unwrap();

    connected.set_send_timeout(time::Duration::from_millis(5000)).unwrap();
    connected.connect("tcp://127.0.0.1:5486").unwrap();

    let sent = vec![65, 66, 67];
    connected.send(sent).unwrap();
    let received = bound.recv().unwrap();

    assert_eq!(vec![65, 66, 67], received)
}

#[test]
fn test_pair_bound_to_connected() {
    init_logging();
    let session = Session::new();
    let bound = session.create_socket(SocketType::Pair);
    let connected = session.create_socket(SocketType::Pair);

    bound.set_send_timeout(time::Duration::from_millis(5000)).unwrap();
    bound.bind("tcp://127.0.0.1:5487").unwrap();

    connected.set_recv_timeout(time::Duration::from_millis(5000)).unwrap();
    connected.connect("tcp://127.0.0.1:5487").unwrap();

    let sent = vec![65, 66, 67];
    bound.send(sent).unwrap();
    let received = connected.recv().unwrap();

    assert_eq!(vec![65, 66, 67], received)
}

#[test]
fn test_req_rep() {
    init_logging();
    let session = Session::new();
    let server = session.create_socket(SocketType::Rep);
    let client = session.create_socket(SocketType::Req);

    server.bind("tcp://127.0.0.1:5488").unwrap();
    client.connect("tcp://127.0.0.1:5488").unwrap();

    let client_request = vec![65, 66, 67];
    client.send(client_request).unwrap();

    let server_request = server.recv().unwrap();
    assert_eq!(vec![65, 66, 67], server_request);

    let server_reply = vec![67, 66, 65];
    server.send(server_reply).unwrap();

    let client_reply = client.recv().unwrap();

    assert_eq!(vec![67, 66, 65], client_reply);
}

#[test]
fn test_req_rep_roundtrip_repeated() {
    init_logging();
    let session = Session::new();
    let server = session.create_socket(SocketType::Rep);
    let client = session.create_socket(SocketType::Req);

    client.set_recv_timeout(time::Duration::from_millis(10000)).unwrap();
    server.bind("tcp://127.0.0.1:5489").unwrap();
    client.connect("tcp://127.0.0.1:5489").unwrap();

    let serving = server.clone();
    let worker = thread::spawn(move || {
        loop {
            match serving.recv() {
                Ok(request) => {
                    let mut reply = b"ack:".to_vec();
                    reply.extend_from_slice(&request);
                    if serving.send(reply).is_err() {
                        return;
                    }
                }
                Err(_) => return,
            }
        }
    });

    for i in 0u32..1000 {
        let request = i.to_be_bytes().to_vec();
        client.send(request.clone()).unwrap();

        let reply = client.recv().unwrap();
        assert_eq!(b"ack:"[..], reply[..4]);
        assert_eq!(request[..], reply[4..]);
    }

    client.close().unwrap();
    server.close().unwrap();
    worker.join().unwrap();
}

#[test]
fn test_req_retry_resends_until_answered() {
    init_logging();
    let session = Session::new();
    let server = session.create_socket(SocketType::Rep);
    let client = session.create_socket(SocketType::Req);

    server.set_recv_timeout(time::Duration::from_millis(5000)).unwrap();
    client.set_recv_timeout(time::Duration::from_millis(5000)).unwrap();
    client.set_option(SocketOption::ResendInterval(time::Duration::from_millis(50))).unwrap();

    server.bind("tcp://127.0.0.1:5490").unwrap();
    client.connect("tcp://127.0.0.1:5490").unwrap();

    client.send(b"ping".to_vec()).unwrap();

    let first = server.recv().unwrap();
    assert_eq!(b"ping".to_vec(), first);

    // Stall long enough for the retry timer to fire a few times; every
    // copy the server sees must be identical to the original.
    thread::sleep(time::Duration::from_millis(250));
    let retransmitted = server.recv().expect("expected a retransmitted request");
    assert_eq!(b"ping".to_vec(), retransmitted);

    server.send(b"pong".to_vec()).unwrap();
    let reply = client.recv().unwrap();
    assert_eq!(b"pong".to_vec(), reply);

    // The reply settled the request; receiving again is a state error.
    assert_eq!(Error::ProtoState, client.recv().unwrap_err());
}

#[test]
fn test_recv_reply_before_send_request() {
    init_logging();
    let session = Session::new();
    let server = session.create_socket(SocketType::Rep);
    let client = session.create_socket(SocketType::Req);

    server.bind("tcp://127.0.0.1:5491").unwrap();
    client.connect("tcp://127.0.0.1:5491").unwrap();

    let err = client.recv().unwrap_err();
    assert_eq!(Error::ProtoState, err);
}

#[test]
fn test_send_reply_before_recv_request() {
    init_logging();
    let session = Session::new();
    let server = session.create_socket(SocketType::Rep);

    server.bind("tcp://127.0.0.1:5492").unwrap();
    let err = server.send(vec![67, 66, 65]).unwrap_err();
    assert_eq!(Error::ProtoState, err);
}

#[test]
fn test_second_send_replaces_outstanding_request() {
    init_logging();
    let session = Session::new();
    let server = session.create_socket(SocketType::Rep);
    let client = session.create_socket(SocketType::Req);

    server.set_recv_timeout(time::Duration::from_millis(5000)).unwrap();
    client.set_recv_timeout(time::Duration::from_millis(5000)).unwrap();
    server.bind("tcp://127.0.0.1:5493").unwrap();
    client.connect("tcp://127.0.0.1:5493").unwrap();

    client.send(b"first".to_vec()).unwrap();
    client.send(b"second".to_vec()).unwrap();

    // The worker consumes both requests but only answers the second.
    let one = server.recv().unwrap();
    let two = server.recv().unwrap();
    assert_eq!(b"first".to_vec(), one);
    assert_eq!(b"second".to_vec(), two);

    server.send(b"answer".to_vec()).unwrap();
    let reply = client.recv().unwrap();
    assert_eq!(b"answer".to_vec(), reply);
}

#[test]
fn test_pub_sub() {
    init_logging();
    let session = Session::new();
    let server = session.create_socket(SocketType::Pub);
    let client = session.create_socket(SocketType::Sub);
    let timeout = time::Duration::from_millis(5000);

    server.bind("tcp://127.0.0.1:5494").unwrap();
    client.connect("tcp://127.0.0.1:5494").unwrap();
    client.set_recv_timeout(timeout).unwrap();
    client.set_option(SocketOption::Subscribe(b"A".to_vec())).unwrap();
    client.set_option(SocketOption::Subscribe(b"B".to_vec())).unwrap();

    thread::sleep(time::Duration::from_millis(500));

    server.send(vec![65, 66, 67]).unwrap();
    let received_a = client.recv().unwrap();
    assert_eq!(vec![65, 66, 67], received_a);

    server.send(vec![66, 65, 67]).unwrap();
    let received_b = client.recv().unwrap();
    assert_eq!(vec![66, 65, 67], received_b);

    server.send(vec![67, 66, 65]).unwrap();
    client.set_recv_timeout(time::Duration::from_millis(250)).unwrap();
    let not_received_c = client.recv().unwrap_err();
    assert_eq!(Error::RecvTimeout, not_received_c);
}

#[test]
fn test_pub_fan_out_to_every_subscriber() {
    init_logging();
    let session = Session::new();
    let server = session.create_socket(SocketType::Pub);
    let client1 = session.create_socket(SocketType::Sub);
    let client2 = session.create_socket(SocketType::Sub);
    let timeout = time::Duration::from_millis(5000);

    server.bind("tcp://127.0.0.1:5495").unwrap();
    for client in [&client1, &client2] {
        client.connect("tcp://127.0.0.1:5495").unwrap();
        client.set_recv_timeout(timeout).unwrap();
        client.set_option(SocketOption::Subscribe(Vec::new())).unwrap();
    }

    thread::sleep(time::Duration::from_millis(500));

    let payload = vec![b'X'; 100];
    server.send(payload.clone()).unwrap();

    assert_eq!(payload, client1.recv().unwrap());
    assert_eq!(payload, client2.recv().unwrap());

    // No duplicates: the next recv on either side runs into its deadline.
    client1.set_recv_timeout(time::Duration::from_millis(100)).unwrap();
    assert_eq!(Error::RecvTimeout, client1.recv().unwrap_err());
}

#[test]
fn test_pub_cannot_recv() {
    init_logging();
    let session = Session::new();
    let server = session.create_socket(SocketType::Pub);

    assert_eq!(Error::ProtoOp, server.recv().unwrap_err());
}

#[test]
fn test_sub_prefix_filter() {
    init_logging();
    let session = Session::new();
    let server = session.create_socket(SocketType::Pub);
    let client = session.create_socket(SocketType::Sub);

    server.bind("tcp://127.0.0.1:5496").unwrap();
    client.connect("tcp://127.0.0.1:5496").unwrap();
    client.set_recv_timeout(time::Duration::from_millis(5000)).unwrap();
    client.set_option(SocketOption::Subscribe(b"abc".to_vec())).unwrap();

    thread::sleep(time::Duration::from_millis(500));

    server.send(b"abcdef".to_vec()).unwrap();
    server.send(b"xyz".to_vec()).unwrap();

    assert_eq!(b"abcdef".to_vec(), client.recv().unwrap());

    // The unmatched message was filtered out, not queued.
    client.set_recv_timeout(time::Duration::from_millis(100)).unwrap();
    assert_eq!(Error::RecvTimeout, client.recv().unwrap_err());
}

#[test]
fn test_push_pull_load_balancing() {
    init_logging();
    let session = Session::new();
    let push = session.create_socket(SocketType::Push);
    let pull1 = session.create_socket(SocketType::Pull);
    let pull2 = session.create_socket(SocketType::Pull);

    pull1.bind("tcp://127.0.0.1:5497").unwrap();
    pull2.bind("tcp://127.0.0.1:5498").unwrap();
    push.connect("tcp://127.0.0.1:5497").unwrap();
    push.connect("tcp://127.0.0.1:5498").unwrap();

    thread::sleep(time::Duration::from_millis(500));

    for i in 0u32..100 {
        push.send(i.to_be_bytes().to_vec()).unwrap();
    }

    let drain = |pull: Socket| {
        thread::spawn(move || {
            pull.set_recv_timeout(time::Duration::from_millis(1000)).unwrap();
            let mut got = Vec::new();
            while let Ok(msg) = pull.recv() {
                got.push(u32::from_be_bytes([msg[0], msg[1], msg[2], msg[3]]));
            }
            got
        })
    };
    let got1 = drain(pull1).join().unwrap();
    let got2 = drain(pull2).join().unwrap();

    assert!(!got1.is_empty(), "first puller starved");
    assert!(!got2.is_empty(), "second puller starved");

    let mut seen = HashSet::new();
    for value in got1.iter().chain(got2.iter()) {
        assert!(seen.insert(*value), "message {} delivered twice", value);
    }
    assert_eq!(100, seen.len());
}

#[test]
fn test_pull_cannot_send() {
    init_logging();
    let session = Session::new();
    let pull = session.create_socket(SocketType::Pull);

    assert_eq!(Error::ProtoOp, pull.send(vec![1]).unwrap_err());
}

#[test]
fn test_bus() {
    init_logging();
    let session = Session::new();
    let server = session.create_socket(SocketType::Bus);
    let client1 = session.create_socket(SocketType::Bus);
    let client2 = session.create_socket(SocketType::Bus);
    let timeout = time::Duration::from_millis(5000);

    server.bind("tcp://127.0.0.1:5499").unwrap();
    client1.connect("tcp://127.0.0.1:5499").unwrap();
    client2.connect("tcp://127.0.0.1:5499").unwrap();
    client1.set_recv_timeout(timeout).unwrap();
    client2.set_recv_timeout(timeout).unwrap();

    thread::sleep(time::Duration::from_millis(500));

    let sent = vec![65, 66, 67];
    server.send(sent).expect("Server should have sent a msg");
    let received1 = client1.recv().expect("Client #1 should have received the msg");
    assert_eq!(vec![65, 66, 67], received1);
    let received2 = client2.recv().expect("Client #2 should have received the msg");
    assert_eq!(vec![65, 66, 67], received2);
}

#[test]
fn test_bus_device_excludes_the_origin() {
    init_logging();
    let session = Session::new();
    let server = session.create_socket(SocketType::Bus);
    let client1 = session.create_socket(SocketType::Bus);
    let client2 = session.create_socket(SocketType::Bus);
    let timeout = time::Duration::from_millis(5000);

    server.bind("tcp://127.0.0.1:5500").unwrap();
    client1.connect("tcp://127.0.0.1:5500").unwrap();
    client2.connect("tcp://127.0.0.1:5500").unwrap();
    client1.set_recv_timeout(timeout).unwrap();
    client2.set_recv_timeout(timeout).unwrap();

    thread::sleep(time::Duration::from_millis(500));

    // The middle socket re-broadcasts between its peers, but never back
    // to the peer a message came from.
    device(&server, &server).unwrap();

    client1.send(vec![65, 66, 67]).unwrap();
    let received = client2.recv().unwrap();
    assert_eq!(vec![65, 66, 67], received);

    client1.set_recv_timeout(time::Duration::from_millis(250)).unwrap();
    let err = client1.recv().unwrap_err();
    assert_eq!(Error::RecvTimeout, err);
}

#[test]
fn test_survey() {
    init_logging();
    let session = Session::new();
    let server = session.create_socket(SocketType::Surveyor);
    let client1 = session.create_socket(SocketType::Respondent);
    let client2 = session.create_socket(SocketType::Respondent);
    let timeout = time::Duration::from_millis(5000);

    server.set_option(SocketOption::SurveyDeadline(time::Duration::from_millis(5000))).unwrap();
    server.bind("tcp://127.0.0.1:5501").unwrap();
    client1.connect("tcp://127.0.0.1:5501").unwrap();
    client2.connect("tcp://127.0.0.1:5501").unwrap();
    server.set_recv_timeout(timeout).unwrap();
    client1.set_recv_timeout(timeout).unwrap();
    client2.set_recv_timeout(timeout).unwrap();

    thread::sleep(time::Duration::from_millis(500));

    let server_survey = vec![65, 66, 67];
    server.send(server_survey).expect("Server should have sent a survey");

    let client1_survey = client1.recv().expect("Client #1 should have received the survey");
    assert_eq!(vec![65, 66, 67], client1_survey);

    let client2_survey = client2.recv().expect("Client #2 should have received the survey");
    assert_eq!(vec![65, 66, 67], client2_survey);

    client1.send(vec![65, 66, 65]).expect("Client #1 should have sent a vote");
    let server_resp1 = server.recv().expect("Server should have received the vote from client #1");
    assert_eq!(vec![65, 66, 65], server_resp1);

    client2.send(vec![67, 66, 67]).expect("Client #2 should have sent a vote");
    let server_resp2 = server.recv().expect("Server should have received the vote from client #2");
    assert_eq!(vec![67, 66, 67], server_resp2);
}

#[test]
fn test_survey_deadline() {
    init_logging();
    let session = Session::new();
    let server = session.create_socket(SocketType::Surveyor);
    let client = session.create_socket(SocketType::Respondent);
    let deadline = time::Duration::from_millis(150);

    server.set_option(SocketOption::SurveyDeadline(deadline)).unwrap();
    server.bind("tcp://127.0.0.1:5502").unwrap();
    client.connect("tcp://127.0.0.1:5502").unwrap();
    client.set_recv_timeout(time::Duration::from_millis(5000)).unwrap();
    server.set_recv_timeout(time::Duration::from_millis(250)).unwrap();

    thread::sleep(time::Duration::from_millis(500));

    let server_survey = vec![65, 66, 67];
    server.send(server_survey).unwrap();

    let client_survey = client.recv().unwrap();
    assert_eq!(vec![65, 66, 67], client_survey);

    thread::sleep(time::Duration::from_millis(200));

    let err = server.recv().unwrap_err();
    assert_eq!(Error::RecvTimeout, err);
}

#[test]
fn test_req_with_multiple_workers() {
    init_logging();
    let session = Session::new();
    let client = session.create_socket(SocketType::Req);
    let worker_addrs = ["tcp://127.0.0.1:5503", "tcp://127.0.0.1:5504"];
    let mut servers = Vec::new();
    let mut workers = Vec::new();

    for addr in worker_addrs {
        let server = session.create_socket(SocketType::Rep);
        server.bind(addr).unwrap();
        let serving = server.clone();
        workers.push(thread::spawn(move || {
            while let Ok(request) = serving.recv() {
                if serving.send(request).is_err() {
                    return;
                }
            }
        }));
        servers.push(server);
        client.connect(addr).unwrap();
    }

    client.set_recv_timeout(time::Duration::from_millis(5000)).unwrap();
    thread::sleep(time::Duration::from_millis(500));

    // Whichever worker picks a request up, the reply that comes back must
    // be the one correlated to it.
    for i in 0u32..100 {
        let request = i.to_be_bytes().to_vec();
        client.send(request.clone()).unwrap();
        assert_eq!(request, client.recv().unwrap());
    }

    for server in &servers {
        server.close().unwrap();
    }
    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn test_close_then_send_returns_closed() {
    init_logging();
    let session = Session::new();
    let push = session.create_socket(SocketType::Push);
    let pull = session.create_socket(SocketType::Pull);

    pull.bind("tcp://127.0.0.1:5505").unwrap();
    push.connect("tcp://127.0.0.1:5505").unwrap();

    push.send(vec![1, 2, 3]).unwrap();
    assert_eq!(vec![1, 2, 3], pull.recv().unwrap());

    push.close().unwrap();
    assert_eq!(Error::Closed, push.send(vec![4]).unwrap_err());
    assert_eq!(Error::Closed, push.close().unwrap_err());

    pull.close().unwrap();
    assert_eq!(Error::Closed, pull.recv().unwrap_err());
}

#[test]
fn test_dialer_reconnects_after_listener_restart() {
    init_logging();
    let session = Session::new();
    let push = session.create_socket(SocketType::Push);

    let pull = session.create_socket(SocketType::Pull);
    pull.set_recv_timeout(time::Duration::from_millis(5000)).unwrap();
    pull.bind("tcp://127.0.0.1:5506").unwrap();

    push.connect("tcp://127.0.0.1:5506").unwrap();
    push.send(vec![1]).unwrap();
    assert_eq!(vec![1], pull.recv().unwrap());

    // Take the listener down; the dialer keeps retrying with backoff and
    // latches onto the replacement.
    pull.close().unwrap();
    thread::sleep(time::Duration::from_millis(200));

    let pull2 = session.create_socket(SocketType::Pull);
    pull2.set_recv_timeout(time::Duration::from_millis(10000)).unwrap();
    pull2.bind("tcp://127.0.0.1:5506").unwrap();

    push.send(vec![2]).unwrap();
    assert_eq!(vec![2], pull2.recv().unwrap());
}

#[test]
fn test_queue_len_is_frozen_once_active() {
    init_logging();
    let session = Session::new();
    let pull = session.create_socket(SocketType::Pull);

    pull.set_option(SocketOption::RecvQueueLen(16)).unwrap();
    pull.bind("tcp://127.0.0.1:5507").unwrap();

    assert_eq!(Error::BadOption, pull.set_option(SocketOption::RecvQueueLen(1)).unwrap_err());
    assert_eq!(Error::BadOption, pull.set_option(SocketOption::SendQueueLen(1)).unwrap_err());

    match pull.get_option("READQ-LEN").unwrap() {
        SocketOption::RecvQueueLen(len) => assert_eq!(16, len),
        other => panic!("unexpected option value {:?}", other),
    }
}

#[test]
fn test_option_validation() {
    init_logging();
    let session = Session::new();
    let server = session.create_socket(SocketType::Rep);
    let client = session.create_socket(SocketType::Sub);

    assert_eq!(Error::BadValue, server.set_option(SocketOption::Ttl(0)).unwrap_err());
    server.set_option(SocketOption::Ttl(16)).unwrap();
    match server.get_option("TTL").unwrap() {
        SocketOption::Ttl(ttl) => assert_eq!(16, ttl),
        other => panic!("unexpected option value {:?}", other),
    }

    assert_eq!(
        Error::BadValue,
        client.set_option(SocketOption::Unsubscribe(b"nope".to_vec())).unwrap_err()
    );
    assert_eq!(
        Error::BadOption,
        client.set_option(SocketOption::SurveyDeadline(time::Duration::from_secs(1))).unwrap_err()
    );

    let req = session.create_socket(SocketType::Req);
    match req.get_option("RETRY-TIME").unwrap() {
        SocketOption::ResendInterval(retry) => assert_eq!(time::Duration::from_secs(60), retry),
        other => panic!("unexpected option value {:?}", other),
    }
}

#[test]
fn test_bad_scheme_is_rejected() {
    init_logging();
    let session = Session::new();
    let pair = session.create_socket(SocketType::Pair);

    assert_eq!(Error::BadTransport, pair.bind("carrier-pigeon://coop").unwrap_err());
    assert_eq!(Error::BadTransport, pair.connect("127.0.0.1:5508").unwrap_err());
}

#[test]
fn test_port_hook_observes_endpoints() {
    init_logging();
    let session = Session::new();
    let pull = session.create_socket(SocketType::Pull);
    let push = session.create_socket(SocketType::Push);
    let adds = Arc::new(AtomicUsize::new(0));

    let counted = adds.clone();
    pull.set_port_hook(move |action, ep| {
        if action == PortAction::Add {
            assert!(ep.is_server());
            assert!(ep.property(PROP_REMOTE_ADDR).is_ok());
            counted.fetch_add(1, Ordering::SeqCst);
        }
        true
    });

    pull.bind("tcp://127.0.0.1:5509").unwrap();
    push.connect("tcp://127.0.0.1:5509").unwrap();

    push.send(vec![9]).unwrap();
    assert_eq!(vec![9], pull.recv().unwrap());
    assert_eq!(1, adds.load(Ordering::SeqCst));
}

#[cfg(not(windows))]
#[test]
fn test_ipc() {
    init_logging();
    let session = Session::new();
    let bound = session.create_socket(SocketType::Pair);
    let connected = session.create_socket(SocketType::Pair);

    bound.set_recv_timeout(time::Duration::from_millis(5000)).unwrap();
    connected.set_recv_timeout(time::Duration::from_millis(5000)).unwrap();

    bound.bind("ipc:///tmp/test_scalemsg_ipc.ipc").unwrap();
    connected.connect("ipc:///tmp/test_scalemsg_ipc.ipc").unwrap();

    connected.send(vec![65, 66, 67]).unwrap();
    let received = bound.recv().unwrap();
    assert_eq!(vec![65, 66, 67], received);

    bound.send(vec![67, 66, 65]).unwrap();
    let received = connected.recv().unwrap();
    assert_eq!(vec![67, 66, 65], received);
}

#[test]
fn test_inproc() {
    init_logging();
    let session = Session::new();
    let bound = session.create_socket(SocketType::Pair);
    let connected = session.create_socket(SocketType::Pair);

    bound.set_recv_timeout(time::Duration::from_millis(5000)).unwrap();
    connected.set_recv_timeout(time::Duration::from_millis(5000)).unwrap();

    bound.bind("inproc://test_pair").unwrap();
    connected.connect("inproc://test_pair").unwrap();

    connected.send(vec![65, 66, 67]).unwrap();
    let received = bound.recv().unwrap();
    assert_eq!(vec![65, 66, 67], received);

    bound.send(vec![67, 66, 65]).unwrap();
    let received = connected.recv().unwrap();
    assert_eq!(vec![67, 66, 65], received);
}

#[test]
fn test_inproc_req_rep() {
    init_logging();
    let session = Session::new();
    let server = session.create_socket(SocketType::Rep);
    let client = session.create_socket(SocketType::Req);

    server.set_recv_timeout(time::Duration::from_millis(5000)).unwrap();
    client.set_recv_timeout(time::Duration::from_millis(5000)).unwrap();

    server.bind("inproc://test_reqrep").unwrap();
    client.connect("inproc://test_reqrep").unwrap();

    client.send(b"hello".to_vec()).unwrap();
    assert_eq!(b"hello".to_vec(), server.recv().unwrap());

    server.send(b"world".to_vec()).unwrap();
    assert_eq!(b"world".to_vec(), client.recv().unwrap());
}
