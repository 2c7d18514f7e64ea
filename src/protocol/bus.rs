// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! BUS sends every locally-submitted message to all connected peers, and
//! delivers everything it hears with the origin endpoint id in the header.
//! When a message is re-broadcast (its header already names its origin),
//! the origin is left out of the fan-out, which keeps one-hop loops quiet.
//! Cycles across several hops are the operator's problem.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use std::thread;
use std::time::Instant;

use byteorder::{BigEndian, ByteOrder};
use crossbeam_channel::{bounded, select, Receiver, Sender};

use crate::core::ProtoSocket;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::global::SocketType;
use crate::message::Message;
use crate::options::{self, SocketOption};
use crate::protocol::Protocol;
use crate::util::{drain_queue, lock};
use crate::waiter::Waiter;

pub struct Bus {
    ps: ProtoSocket,
    inner: Arc<Mutex<BusInner>>,
    waiter: Arc<Waiter>,
    once: Once,
}

struct BusInner {
    raw: bool,
    eps: HashMap<u32, Sender<Arc<Message>>>,
}

impl Bus {
    pub fn new(ps: ProtoSocket) -> Bus {
        Bus {
            ps,
            inner: Arc::new(Mutex::new(BusInner {
                raw: false,
                eps: HashMap::new(),
            })),
            waiter: Arc::new(Waiter::new()),
            once: Once::new(),
        }
    }
}

impl Protocol for Bus {
    fn number(&self) -> u16 {
        SocketType::Bus.id()
    }

    fn peer_number(&self) -> u16 {
        SocketType::Bus.id()
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

        let (receiver_ep, ps) = (ep.clone(), self.ps.clone());
        thread::spawn(move || receiver(receiver_ep, ps));
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

    fn has_recv_hook(&self) -> bool {
        true
    }

    /// Cooked receivers do not care which endpoint a message came in on.
    fn recv_hook(&self, msg: &mut Message) -> bool {
        if !lock(&self.inner).raw && msg.header.len() >= 4 {
            msg.header.drain(..4);
        }
        true
    }
}

/// Fans each message out to every peer, excluding the origin endpoint when
/// the header carries one (a re-broadcast through a device).
fn top_sender(ps: ProtoSocket, inner: Arc<Mutex<BusInner>>, waiter: Arc<Waiter>) {
    let send_queue = ps.send_queue();
    let closed = ps.closed();

    loop {
        let mut msg: Message = select! {
            recv(send_queue) -> msg => match msg {
                Ok(msg) => msg,
                Err(_) => break,
            },
            recv(closed) -> _ => break,
        };

        let exclude = if msg.header.len() >= 4 {
            let id = BigEndian::read_u32(&msg.header[..4]);
            msg.header.drain(..4);
            id
        } else {
            0
        };

        let shared = Arc::new(msg);
        let inner = lock(&inner);
        for (id, tx) in inner.eps.iter() {
            if *id == exclude {
                continue;
            }
            // No room on a peer queue, drop that copy.
            let _ = tx.try_send(shared.clone());
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

/// Tags everything received with the origin endpoint id before queueing it
/// for the application (or the device).
fn receiver(ep: Arc<Endpoint>, ps: ProtoSocket) {
    let recv_queue = ps.recv_queue();
    let closed = ps.closed();

    while let Some(mut msg) = ep.recv_msg() {
        let mut id = [0u8; 4];
        BigEndian::write_u32(&mut id, ep.id());
        msg.header.extend_from_slice(&id);

        select! {
            send(recv_queue, msg) -> res => {
                if res.is_err() {
                    return;
                }
            }
            recv(closed) -> _ => return,
            // Queue full, drop it.
            default => {}
        }
    }
}
