// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! PULL is the reading end of the pipeline pattern. Every endpoint feeds
//! the shared receive queue. Sending is not supported.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use crossbeam_channel::select;

use crate::core::ProtoSocket;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::global::SocketType;
use crate::options::{self, SocketOption};
use crate::protocol::Protocol;
use crate::util::lock;

pub struct Pull {
    ps: ProtoSocket,
    raw: Mutex<bool>,
}

impl Pull {
    pub fn new(ps: ProtoSocket) -> Pull {
        ps.set_send_error(Some(Error::ProtoOp));
        Pull {
            ps,
            raw: Mutex::new(false),
        }
    }
}

impl Protocol for Pull {
    fn number(&self) -> u16 {
        SocketType::Pull.id()
    }

    fn peer_number(&self) -> u16 {
        SocketType::Push.id()
    }

    fn add_endpoint(&self, ep: &Arc<Endpoint>) {
        let (receiver_ep, ps) = (ep.clone(), self.ps.clone());
        thread::spawn(move || receiver(receiver_ep, ps));
    }

    fn remove_endpoint(&self, _ep: &Endpoint) {}

    fn shutdown(&self, _expire: Instant) {} // No sender to drain.

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
