// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! PUB fans every sent message out to all connected subscribers. Each peer
//! gets a bounded queue of its own; a slow subscriber loses copies rather
//! than stalling the rest. Receiving is not supported.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use std::thread;
use std::time::Instant;

use crossbeam_channel::{bounded, select, Receiver, Sender};

use crate::core::ProtoSocket;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::global::SocketType;
use crate::message::Message;
use crate::options::{self, SocketOption};
use crate::protocol::Protocol;
use crate::util::{drain_queue, lock, null_recv};
use crate::waiter::Waiter;

pub struct Pub {
    ps: ProtoSocket,
    inner: Arc<Mutex<PubInner>>,
    waiter: Arc<Waiter>,
    once: Once,
}

struct PubInner {
    raw: bool,
    eps: HashMap<u32, Sender<Arc<Message>>>,
}

impl Pub {
    pub fn new(ps: ProtoSocket) -> Pub {
        ps.set_recv_error(Some(Error::ProtoOp));
        Pub {
            ps,
            inner: Arc::new(Mutex::new(PubInner {
                raw: false,
                eps: HashMap::new(),
            })),
            waiter: Arc::new(Waiter::new()),
            once: Once::new(),
        }
    }
}

impl Protocol for Pub {
    fn number(&self) -> u16 {
        SocketType::Pub.id()
    }

    fn peer_number(&self) -> u16 {
        SocketType::Sub.id()
    }

    fn add_endpoint(&self, ep: &Arc<Endpoint>) {
        self.once.call_once(|| {
            self.waiter.add();
            let (ps, inner, waiter) = (self.ps.clone(), self.inner.clone(), self.waiter.clone());
            thread::spawn(move || top_sender(ps, inner, waiter));
        });

        let (tx, rx) = bounded::<Arc<Message>>(self.ps.peer_queue_len());
        lock(&self.inner).eps.insert(ep.id(), tx);

        let peer_ep = ep.clone();
        thread::spawn(move || peer_sender(peer_ep, rx));

        let null_ep = ep.clone();
        thread::spawn(move || null_recv(null_ep));
    }

    fn remove_endpoint(&self, ep: &Endpoint) {
        lock(&self.inner).eps.remove(&ep.id());
    }

    fn shutdown(&self, expire: Instant) {
        self.waiter.wait_until(expire);

        let eps = std::mem::take(&mut lock(&self.inner).eps);
        for (_, tx) in eps {
            drain_queue(&tx, expire);
        }
    }

    fn set_option(&self, opt: &SocketOption) -> Result<()> {
        match *opt {
            SocketOption::Raw(raw) => {
                lock(&self.inner).raw = raw;
                Ok(())
            }
            _ => Err(Error::BadOption),
        }
    }

    fn get_option(&self, name: &str) -> Result<SocketOption> {
        match name {
            options::OPTION_RAW => Ok(SocketOption::Raw(lock(&self.inner).raw)),
            _ => Err(Error::BadOption),
        }
    }
}

/// Pulls from the socket send queue and copies each message onto every
/// per-peer queue, dropping the copy when a queue is full.
fn top_sender(ps: ProtoSocket, inner: Arc<Mutex<PubInner>>, waiter: Arc<Waiter>) {
    let send_queue = ps.send_queue();
    let closed = ps.closed();

    loop {
        select! {
            recv(closed) -> _ => break,
            recv(send_queue) -> msg => {
                let msg: Message = match msg {
                    Ok(msg) => msg,
                    Err(_) => break,
                };
                let shared = Arc::new(msg);
                let inner = lock(&inner);
                for tx in inner.eps.values() {
                    let _ = tx.try_send(shared.clone());
                }
            }
        }
    }
    waiter.done();
}

fn peer_sender(ep: Arc<Endpoint>, rx: Receiver<Arc<Message>>) {
    for msg in rx.iter() {
        if ep.send_msg(&msg).is_err() {
            return;
        }
    }
}
