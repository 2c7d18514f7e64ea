// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! REQ is the client side of the lockstep request/reply pair. Each request
//! gets a 32-bit id with the high bit set; a saved copy is resent on a timer
//! until the matching reply arrives. Receiving is only allowed while a
//! request is outstanding.

use std::sync::{Arc, Mutex};
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
use crate::util::{deadline_timer, lock};
use crate::waiter::Waiter;

const DEFAULT_RETRY_TIME: Duration = Duration::from_secs(60);

enum RetryCmd {
    Arm,
    Cancel,
}

pub struct Req {
    ps: ProtoSocket,
    inner: Arc<Mutex<ReqInner>>,
    resend_tx: Sender<Message>,
    resend_rx: Receiver<Message>,
    retry_tx: Sender<RetryCmd>,
    waiter: Arc<Waiter>,
}

struct ReqInner {
    raw: bool,
    retry: Duration,
    next_id: u32,
    req_id: u32,
    req_msg: Option<Message>,
}

impl Req {
    pub fn new(ps: ProtoSocket) -> Req {
        let (resend_tx, resend_rx) = bounded::<Message>(1);
        let (retry_tx, retry_rx) = unbounded::<RetryCmd>();
        let inner = Arc::new(Mutex::new(ReqInner {
            raw: false,
            retry: DEFAULT_RETRY_TIME,
            next_id: rand::random(),
            req_id: 0,
            req_msg: None,
        }));
        let waiter = Arc::new(Waiter::new());

        // No request outstanding yet, receiving makes no sense.
        ps.set_recv_error(Some(Error::ProtoState));

        waiter.add();
        {
            let (ps, inner, resend_tx, waiter) =
                (ps.clone(), inner.clone(), resend_tx.clone(), waiter.clone());
            thread::spawn(move || resender(ps, inner, resend_tx, retry_rx, waiter));
        }

        Req {
            ps,
            inner,
            resend_tx,
            resend_rx,
            retry_tx,
            waiter,
        }
    }
}

impl Protocol for Req {
    fn number(&self) -> u16 {
        SocketType::Req.id()
    }

    fn peer_number(&self) -> u16 {
        SocketType::Rep.id()
    }

    fn add_endpoint(&self, ep: &Arc<Endpoint>) {
        self.waiter.add();
        let (sender_ep, ps, resend_rx, resend_tx, waiter) = (
            ep.clone(),
            self.ps.clone(),
            self.resend_rx.clone(),
            self.resend_tx.clone(),
            self.waiter.clone(),
        );
        thread::spawn(move || sender(sender_ep, ps, resend_rx, resend_tx, waiter));

        let (receiver_ep, receiver_ps) = (ep.clone(), self.ps.clone());
        thread::spawn(move || receiver(receiver_ep, receiver_ps));
    }

    fn remove_endpoint(&self, _ep: &Endpoint) {}

    fn shutdown(&self, expire: Instant) {
        self.waiter.wait_until(expire);
    }

    fn set_option(&self, opt: &SocketOption) -> Result<()> {
        match *opt {
            SocketOption::Raw(raw) => {
                lock(&self.inner).raw = raw;
                if raw {
                    // Raw mode is stateless, receiving is always allowed.
                    self.ps.set_recv_error(None);
                } else {
                    self.ps.set_recv_error(Some(Error::ProtoState));
                }
                Ok(())
            }
            SocketOption::ResendInterval(retry) => {
                lock(&self.inner).retry = retry;
                Ok(())
            }
            _ => Err(Error::BadOption),
        }
    }

    fn get_option(&self, name: &str) -> Result<SocketOption> {
        match name {
            options::OPTION_RAW => Ok(SocketOption::Raw(lock(&self.inner).raw)),
            options::OPTION_RETRY_TIME => {
                Ok(SocketOption::ResendInterval(lock(&self.inner).retry))
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

    /// Stamps the new request id into the header, saves a copy for the
    /// resender and opens the receive side.
    fn send_hook(&self, msg: &mut Message) -> bool {
        let mut inner = lock(&self.inner);
        if inner.raw {
            // Raw mode has no automatic retry; the request id comes down
            // in the header from the application.
            return true;
        }

        inner.req_id = inner.next_id | 0x8000_0000;
        inner.next_id = inner.next_id.wrapping_add(1);

        let mut id = [0u8; 4];
        BigEndian::write_u32(&mut id, inner.req_id);
        msg.header.extend_from_slice(&id);

        // Replacing an earlier outstanding request cancels its retry
        // implicitly: the saved copy is swapped and the timer re-armed.
        inner.req_msg = Some(msg.clone());
        let _ = self.retry_tx.send(RetryCmd::Arm);

        self.ps.set_recv_error(None);
        true
    }

    /// Admits only the reply correlated to the outstanding request, then
    /// closes the receive side until the next send.
    fn recv_hook(&self, msg: &mut Message) -> bool {
        let mut inner = lock(&self.inner);
        if inner.raw {
            return true;
        }
        if msg.header.len() < 4 || inner.req_msg.is_none() {
            return false;
        }
        if BigEndian::read_u32(&msg.header[..4]) != inner.req_id {
            return false;
        }

        let _ = self.retry_tx.send(RetryCmd::Cancel);
        inner.req_msg = None;
        self.ps.set_recv_error(Some(Error::ProtoState));
        true
    }
}

/// Re-injects a copy of the outstanding request each time the retry timer
/// fires; `Arm`/`Cancel` track the request lifecycle.
fn resender(
    ps: ProtoSocket,
    inner: Arc<Mutex<ReqInner>>,
    resend_tx: Sender<Message>,
    retry_rx: Receiver<RetryCmd>,
    waiter: Arc<Waiter>,
) {
    let closed = ps.closed();
    let mut armed = false;

    loop {
        let timer = if armed {
            deadline_timer(lock(&inner).retry)
        } else {
            never()
        };

        select! {
            recv(closed) -> _ => break,
            recv(retry_rx) -> cmd => match cmd {
                Ok(RetryCmd::Arm) => armed = true,
                Ok(RetryCmd::Cancel) => armed = false,
                Err(_) => break,
            },
            recv(timer) -> _ => {
                let copy = lock(&inner).req_msg.as_ref().cloned();
                match copy {
                    Some(copy) => {
                        debug!("resending unanswered request");
                        select! {
                            send(resend_tx, copy) -> _ => {}
                            recv(closed) -> _ => break,
                        }
                    }
                    None => armed = false,
                }
            }
        }
    }
    waiter.done();
}

fn sender(
    ep: Arc<Endpoint>,
    ps: ProtoSocket,
    resend_rx: Receiver<Message>,
    resend_tx: Sender<Message>,
    waiter: Arc<Waiter>,
) {
    let send_queue = ps.send_queue();
    let closed = ps.closed();

    loop {
        let msg: Message = select! {
            recv(resend_rx) -> msg => match msg {
                Ok(msg) => msg,
                Err(_) => break,
            },
            recv(send_queue) -> msg => match msg {
                Ok(msg) => msg,
                Err(_) => break,
            },
            recv(closed) -> _ => break,
        };

        if ep.send_msg(&msg).is_err() {
            // Hand the message back so another endpoint can retry it.
            let _ = resend_tx.try_send(msg);
            break;
        }
    }
    waiter.done();
}

/// Moves the 4-byte request id from the body into the header and passes the
/// reply up; correlation happens in the recv hook.
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
