// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! RESPONDENT answers surveys. Questions come in with a backtrace grown the
//! same way REP grows one; the answer follows it back to the surveyor. An
//! answer can only be sent while a survey is pending.

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

const DEFAULT_TTL: usize = 8;
const PEER_QUEUE_LEN: usize = 1;

pub struct Respondent {
    ps: ProtoSocket,
    inner: Arc<Mutex<RespondentInner>>,
    waiter: Arc<Waiter>,
    once: Once,
}

struct RespondentInner {
    raw: bool,
    ttl: usize,
    backtrace: Option<Vec<u8>>,
    eps: HashMap<u32, Sender<Message>>,
}

impl Respondent {
    pub fn new(ps: ProtoSocket) -> Respondent {
        // No survey received yet, nothing to answer.
        ps.set_send_error(Some(Error::ProtoState));
        Respondent {
            ps,
            inner: Arc::new(Mutex::new(RespondentInner {
                raw: false,
                ttl: DEFAULT_TTL,
                backtrace: None,
                eps: HashMap::new(),
            })),
            waiter: Arc::new(Waiter::new()),
            once: Once::new(),
        }
    }
}

impl Protocol for Respondent {
    fn number(&self) -> u16 {
        SocketType::Respondent.id()
    }

    fn peer_number(&self) -> u16 {
        SocketType::Surveyor.id()
    }

    fn add_endpoint(&self, ep: &Arc<Endpoint>) {
        self.once.call_once(|| {
            self.waiter.add();
            let (ps, inner, waiter) = (self.ps.clone(), self.inner.clone(), self.waiter.clone());
            thread::spawn(move || top_sender(ps, inner, waiter));
        });

        let (tx, rx) = bounded::<Message>(PEER_QUEUE_LEN);
        lock(&self.inner).eps.insert(ep.id(), tx);

        let peer_ep = ep.clone();
        thread::spawn(move || peer_sender(peer_ep, rx));

        let (receiver_ep, ps, inner) = (ep.clone(), self.ps.clone(), self.inner.clone());
        thread::spawn(move || receiver(receiver_ep, ps, inner));
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
                if raw {
                    self.ps.set_send_error(None);
                } else {
                    self.ps.set_send_error(Some(Error::ProtoState));
                }
                Ok(())
            }
            SocketOption::Ttl(ttl) => {
                if ttl < 1 {
                    return Err(Error::BadValue);
                }
                lock(&self.inner).ttl = ttl as usize;
                Ok(())
            }
            _ => Err(Error::BadOption),
        }
    }

    fn get_option(&self, name: &str) -> Result<SocketOption> {
        match name {
            options::OPTION_RAW => Ok(SocketOption::Raw(lock(&self.inner).raw)),
            options::OPTION_TTL => Ok(SocketOption::Ttl(lock(&self.inner).ttl as u8)),
            _ => Err(Error::BadOption),
        }
    }

    fn has_send_hook(&self) -> bool {
        true
    }

    fn has_recv_hook(&self) -> bool {
        true
    }

    fn send_hook(&self, msg: &mut Message) -> bool {
        let mut inner = lock(&self.inner);
        if inner.raw {
            // Raw senders are expected to have prepared the header already.
            return true;
        }
        self.ps.set_send_error(Some(Error::ProtoState));
        match inner.backtrace.take() {
            Some(backtrace) => {
                msg.header = backtrace;
                true
            }
            None => false,
        }
    }

    fn recv_hook(&self, msg: &mut Message) -> bool {
        let mut inner = lock(&self.inner);
        if inner.raw {
            return true;
        }
        self.ps.set_send_error(None);
        inner.backtrace = Some(std::mem::take(&mut msg.header));
        true
    }
}

/// Routes each answer to the endpoint named by the leading 4 bytes of its
/// header; the rest of the header, ending in the survey id, goes with it.
fn top_sender(ps: ProtoSocket, inner: Arc<Mutex<RespondentInner>>, waiter: Arc<Waiter>) {
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

        if msg.header.len() < 4 {
            continue;
        }
        let id = BigEndian::read_u32(&msg.header[..4]);
        msg.header.drain(..4);

        let tx = lock(&inner).eps.get(&id).cloned();
        if let Some(tx) = tx {
            // Backpressure drops the answer; the survey will time out.
            let _ = tx.try_send(msg);
        }
    }
    waiter.done();
}

fn peer_sender(ep: Arc<Endpoint>, rx: Receiver<Message>) {
    for msg in rx.iter() {
        if ep.send_msg(&msg).is_err() {
            return;
        }
    }
}

/// Prepends the endpoint id and walks hop ids from body to header until the
/// survey id (high bit set) surfaces, dropping garbled or over-travelled
/// messages.
fn receiver(ep: Arc<Endpoint>, ps: ProtoSocket, inner: Arc<Mutex<RespondentInner>>) {
    let recv_queue = ps.recv_queue();
    let closed = ps.closed();

    'next: while let Some(mut msg) = ep.recv_msg() {
        let mut id = [0u8; 4];
        BigEndian::write_u32(&mut id, ep.id());
        msg.header.extend_from_slice(&id);

        let ttl = lock(&inner).ttl;
        let mut hops = 0;
        loop {
            if hops >= ttl {
                debug!("survey exceeded {} hops, dropped", ttl);
                continue 'next;
            }
            hops += 1;
            if msg.body.len() < 4 {
                continue 'next;
            }
            let rest = msg.body.split_off(4);
            msg.header.extend_from_slice(&msg.body);
            msg.body = rest;
            if msg.header[msg.header.len() - 4] & 0x80 != 0 {
                break;
            }
        }

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
