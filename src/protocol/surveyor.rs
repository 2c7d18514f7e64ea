// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! SURVEYOR broadcasts a question to every connected respondent, then
//! collects answers until the survey deadline passes, at which point
//! receive starts failing with a timeout. Answers carrying anything but the
//! current survey id are discarded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use std::thread;
use std::time::{Duration, Instant};

use byteorder::{BigEndian, ByteOrder};
use crossbeam_channel::{bounded, never, select, unbounded, Receiver, Sender};

use crate::core::ProtoSocket;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::global::SocketType;
use crate::message::Message;
use crate::options::{self, SocketOption};
use crate::protocol::Protocol;
use crate::util::{deadline_timer, drain_queue, lock};
use crate::waiter::Waiter;

const DEFAULT_SURVEY_TIME: Duration = Duration::from_secs(1);
const PEER_QUEUE_LEN: usize = 1;

pub struct Surveyor {
    ps: ProtoSocket,
    inner: Arc<Mutex<SurveyorInner>>,
    expire_tx: Sender<Duration>,
    waiter: Arc<Waiter>,
    once: Once,
}

struct SurveyorInner {
    raw: bool,
    deadline: Duration,
    next_id: u32,
    survey_id: u32,
    eps: HashMap<u32, Sender<Arc<Message>>>,
}

impl Surveyor {
    pub fn new(ps: ProtoSocket) -> Surveyor {
        let (expire_tx, expire_rx) = unbounded::<Duration>();

        // No survey on the wire yet.
        ps.set_recv_error(Some(Error::ProtoState));
        {
            let ps = ps.clone();
            thread::spawn(move || expirer(ps, expire_rx));
        }

        Surveyor {
            ps,
            inner: Arc::new(Mutex::new(SurveyorInner {
                raw: false,
                deadline: DEFAULT_SURVEY_TIME,
                next_id: rand::random(),
                survey_id: 0,
                eps: HashMap::new(),
            })),
            expire_tx,
            waiter: Arc::new(Waiter::new()),
            once: Once::new(),
        }
    }
}

impl Protocol for Surveyor {
    fn number(&self) -> u16 {
        SocketType::Surveyor.id()
    }

    fn peer_number(&self) -> u16 {
        SocketType::Respondent.id()
    }

    fn add_endpoint(&self, ep: &Arc<Endpoint>) {
        self.once.call_once(|| {
            self.waiter.add();
            let (ps, inner, waiter) = (self.ps.clone(), self.inner.clone(), self.waiter.clone());
            thread::spawn(move || top_sender(ps, inner, waiter));
        });

        let (tx, rx) = bounded::<Arc<Message>>(PEER_QUEUE_LEN);
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
                if raw {
                    // Raw mode has no response window; disarm any pending
                    // expiry along with the state enforcement.
                    let _ = self.expire_tx.send(Duration::ZERO);
                    self.ps.set_recv_error(None);
                } else {
                    self.ps.set_recv_error(Some(Error::ProtoState));
                }
                Ok(())
            }
            SocketOption::SurveyDeadline(deadline) => {
                lock(&self.inner).deadline = deadline;
                Ok(())
            }
            _ => Err(Error::BadOption),
        }
    }

    fn get_option(&self, name: &str) -> Result<SocketOption> {
        match name {
            options::OPTION_RAW => Ok(SocketOption::Raw(lock(&self.inner).raw)),
            options::OPTION_SURVEY_TIME => {
                Ok(SocketOption::SurveyDeadline(lock(&self.inner).deadline))
            }
            _ => Err(Error::BadOption),
        }
    }

    fn has_send_hook(&self) -> bool {
        true
    }

    fn has_recv_hook(&self) -> bool {
        true
    }

    /// Stamps the survey id, opens the response window and starts its
    /// clock. A fresh survey supersedes the previous one.
    fn send_hook(&self, msg: &mut Message) -> bool {
        let mut inner = lock(&self.inner);
        if inner.raw {
            return true;
        }

        inner.survey_id = inner.next_id | 0x8000_0000;
        inner.next_id = inner.next_id.wrapping_add(1);

        let mut id = [0u8; 4];
        BigEndian::write_u32(&mut id, inner.survey_id);
        msg.header.extend_from_slice(&id);

        self.ps.set_recv_error(None);
        let _ = self.expire_tx.send(inner.deadline);
        true
    }

    /// Admits only answers to the current survey, stripping the id.
    fn recv_hook(&self, msg: &mut Message) -> bool {
        let inner = lock(&self.inner);
        if inner.raw {
            return true;
        }
        if msg.header.len() < 4 {
            return false;
        }
        if BigEndian::read_u32(&msg.header[..4]) != inner.survey_id {
            return false;
        }
        msg.header.drain(..4);
        true
    }
}

/// Closes the response window once the survey deadline passes. Re-arming
/// restarts the clock; a zero deadline keeps the survey open.
fn expirer(ps: ProtoSocket, expire_rx: Receiver<Duration>) {
    let closed = ps.closed();
    let mut window: Option<Duration> = None;

    loop {
        let timer = match window {
            Some(deadline) if deadline > Duration::ZERO => deadline_timer(deadline),
            _ => never(),
        };

        select! {
            recv(closed) -> _ => return,
            recv(expire_rx) -> deadline => match deadline {
                Ok(deadline) => window = Some(deadline),
                Err(_) => return,
            },
            recv(timer) -> _ => {
                debug!("survey deadline expired");
                ps.set_recv_error(Some(Error::RecvTimeout));
                window = None;
            }
        }
    }
}

/// Broadcast like PUB: one copy per respondent, dropped when its queue is
/// full.
fn top_sender(ps: ProtoSocket, inner: Arc<Mutex<SurveyorInner>>, waiter: Arc<Waiter>) {
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

/// Moves the survey id from body to header and hands the answer up; the
/// recv hook correlates it.
fn receiver(ep: Arc<Endpoint>, ps: ProtoSocket) {
    let recv_queue = ps.recv_queue();
    let closed = ps.closed();

    while let Some(mut msg) = ep.recv_msg() {
        if msg.body.len() < 4 {
            continue;
        }
        let rest = msg.body.split_off(4);
        msg.header.extend_from_slice(&msg.body);
        msg.body = rest;

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
