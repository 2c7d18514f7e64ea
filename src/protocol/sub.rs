// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! SUB receives from publishers and filters on body prefixes. With no
//! subscriptions nothing is delivered; the empty prefix matches everything.
//! Sending is not supported.

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

pub struct Sub {
    ps: ProtoSocket,
    inner: Arc<Mutex<SubInner>>,
}

struct SubInner {
    raw: bool,
    subs: Vec<Vec<u8>>,
}

impl Sub {
    pub fn new(ps: ProtoSocket) -> Sub {
        ps.set_send_error(Some(Error::ProtoOp));
        Sub {
            ps,
            inner: Arc::new(Mutex::new(SubInner {
                raw: false,
                subs: Vec::new(),
            })),
        }
    }
}

impl Protocol for Sub {
    fn number(&self) -> u16 {
        SocketType::Sub.id()
    }

    fn peer_number(&self) -> u16 {
        SocketType::Pub.id()
    }

    fn add_endpoint(&self, ep: &Arc<Endpoint>) {
        let (receiver_ep, ps, inner) = (ep.clone(), self.ps.clone(), self.inner.clone());
        thread::spawn(move || receiver(receiver_ep, ps, inner));
    }

    fn remove_endpoint(&self, _ep: &Endpoint) {}

    fn shutdown(&self, _expire: Instant) {} // No sender to drain.

    fn set_option(&self, opt: &SocketOption) -> Result<()> {
        let mut inner = lock(&self.inner);
        match *opt {
            SocketOption::Raw(raw) => {
                inner.raw = raw;
                Ok(())
            }
            SocketOption::Subscribe(ref prefix) => {
                if inner.subs.iter().any(|sub| sub == prefix) {
                    // Already present.
                    return Ok(());
                }
                inner.subs.push(prefix.clone());
                Ok(())
            }
            SocketOption::Unsubscribe(ref prefix) => {
                match inner.subs.iter().position(|sub| sub == prefix) {
                    Some(index) => {
                        inner.subs.swap_remove(index);
                        Ok(())
                    }
                    None => Err(Error::BadValue),
                }
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

fn receiver(ep: Arc<Endpoint>, ps: ProtoSocket, inner: Arc<Mutex<SubInner>>) {
    let recv_queue = ps.recv_queue();
    let closed = ps.closed();

    while let Some(msg) = ep.recv_msg() {
        let matched = lock(&inner).subs.iter().any(|sub| msg.body.starts_with(sub));
        if !matched {
            continue;
        }

        select! {
            send(recv_queue, msg) -> res => {
                if res.is_err() {
                    return;
                }
            }
            recv(closed) -> _ => return,
            // Best effort: no room upstairs, drop it.
            default => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::core::ProtoSocket;
    use crate::error::Error;
    use crate::options::SocketOption;
    use crate::protocol::Protocol;

    use super::Sub;

    fn subscriptions(sub: &Sub) -> Vec<Vec<u8>> {
        crate::util::lock(&sub.inner).subs.clone()
    }

    #[test]
    fn duplicate_subscriptions_are_a_no_op() {
        let sub = Sub::new(ProtoSocket::loopback());

        sub.set_option(&SocketOption::Subscribe(b"abc".to_vec())).unwrap();
        sub.set_option(&SocketOption::Subscribe(b"abc".to_vec())).unwrap();
        assert_eq!(vec![b"abc".to_vec()], subscriptions(&sub));
    }

    #[test]
    fn unsubscribing_something_unknown_is_a_bad_value() {
        let sub = Sub::new(ProtoSocket::loopback());

        sub.set_option(&SocketOption::Subscribe(b"abc".to_vec())).unwrap();
        let err = sub.set_option(&SocketOption::Unsubscribe(b"xyz".to_vec())).unwrap_err();
        assert_eq!(Error::BadValue, err);

        sub.set_option(&SocketOption::Unsubscribe(b"abc".to_vec())).unwrap();
        assert!(subscriptions(&sub).is_empty());
    }
}
