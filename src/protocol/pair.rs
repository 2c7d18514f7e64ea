// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! PAIR is a two-way 1:1 peering protocol. A second connection attempt is
//! closed on arrival; when the peer drops, in-flight messages drop with it.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use crossbeam_channel::select;

use crate::core::ProtoSocket;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::global::SocketType;
use crate::message::Message;
use crate::options::{self, SocketOption};
use crate::protocol::Protocol;
use crate::util::lock;
use crate::waiter::Waiter;

pub struct Pair {
    ps: ProtoSocket,
    inner: Arc<Mutex<PairInner>>,
    waiter: Arc<Waiter>,
}

struct PairInner {
    raw: bool,
    peer: Option<u32>,
}

impl Pair {
    pub fn new(ps: ProtoSocket) -> Pair {
        Pair {
            ps,
            inner: Arc::new(Mutex::new(PairInner {
                raw: false,
                peer: None,
            })),
            waiter: Arc::new(Waiter::new()),
        }
    }
}

impl Protocol for Pair {
    fn number(&self) -> u16 {
        SocketType::Pair.id()
    }

    fn peer_number(&self) -> u16 {
        SocketType::Pair.id()
    }

    fn add_endpoint(&self, ep: &Arc<Endpoint>) {
        {
            let mut inner = lock(&self.inner);
            if inner.peer.is_some() {
                drop(inner);
                debug!("pair already has a peer, closing endpoint [{}]", ep.id());
                ep.close();
                return;
            }
            inner.peer = Some(ep.id());
        }

        self.waiter.add();
        let (sender_ep, sender_ps, waiter) = (ep.clone(), self.ps.clone(), self.waiter.clone());
        thread::spawn(move || sender(sender_ep, sender_ps, waiter));

        let (receiver_ep, receiver_ps) = (ep.clone(), self.ps.clone());
        thread::spawn(move || receiver(receiver_ep, receiver_ps));
    }

    fn remove_endpoint(&self, ep: &Endpoint) {
        let mut inner = lock(&self.inner);
        if inner.peer == Some(ep.id()) {
            inner.peer = None;
        }
    }

    fn shutdown(&self, expire: Instant) {
        self.waiter.wait_until(expire);
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

fn sender(ep: Arc<Endpoint>, ps: ProtoSocket, waiter: Arc<Waiter>) {
    let send_queue = ps.send_queue();
    let closed = ps.closed();

    loop {
        select! {
            recv(send_queue) -> msg => {
                let msg: Message = match msg {
                    Ok(msg) => msg,
                    Err(_) => break,
                };
                if ep.send_msg(&msg).is_err() {
                    break;
                }
            }
            recv(closed) -> _ => break,
        }
    }
    waiter.done();
}

fn receiver(ep: Arc<Endpoint>, ps: ProtoSocket) {
    let recv_queue = ps.recv_queue();
    let closed = ps.closed();

    while let Some(msg) = ep.recv_msg() {
        select! {
            send(recv_queue, msg) -> res => {
                if res.is_err() {
                    return;
                }
            }
            recv(closed) -> _ => return,
        }
    }
}
