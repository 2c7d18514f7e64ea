// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! PUSH is the writing end of the pipeline pattern. Every endpoint's sender
//! competes on the shared send queue, so load spreads over the connected
//! pullers with the first idle peer winning. Receiving is not supported.

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
use crate::util::{lock, null_recv};
use crate::waiter::Waiter;

pub struct Push {
    ps: ProtoSocket,
    raw: Mutex<bool>,
    waiter: Arc<Waiter>,
}

impl Push {
    pub fn new(ps: ProtoSocket) -> Push {
        ps.set_recv_error(Some(Error::ProtoOp));
        Push {
            ps,
            raw: Mutex::new(false),
            waiter: Arc::new(Waiter::new()),
        }
    }
}

impl Protocol for Push {
    fn number(&self) -> u16 {
        SocketType::Push.id()
    }

    fn peer_number(&self) -> u16 {
        SocketType::Pull.id()
    }

    fn add_endpoint(&self, ep: &Arc<Endpoint>) {
        self.waiter.add();
        let (sender_ep, ps, waiter) = (ep.clone(), self.ps.clone(), self.waiter.clone());
        thread::spawn(move || sender(sender_ep, ps, waiter));

        let null_ep = ep.clone();
        thread::spawn(move || null_recv(null_ep));
    }

    fn remove_endpoint(&self, _ep: &Endpoint) {}

    fn shutdown(&self, expire: Instant) {
        self.waiter.wait_until(expire);
    }

    fn set_option(&self, opt: &SocketOption) -> Result<()> {
        match *opt {
            SocketOption::Raw(raw) => {
                *lock(&self.raw) = raw;
                Ok(())
            }
            _ => Err(Error::BadOption),
        }
    }

    fn get_option(&self, name: &str) -> Result<SocketOption> {
        match name {
            options::OPTION_RAW => Ok(SocketOption::Raw(*lock(&self.raw))),
            _ => Err(Error::BadOption),
        }
    }
}

fn sender(ep: Arc<Endpoint>, ps: ProtoSocket, waiter: Arc<Waiter>) {
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
                if ep.send_msg(&msg).is_err() {
                    break;
                }
            }
        }
    }
    waiter.done();
}
