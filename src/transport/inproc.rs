// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! In-process transport backed by channels. Addresses are arbitrary
//! strings, matched exactly and only within the current process. There is no
//! wire handshake; peer protocol numbers are checked directly when dialing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, OnceLock};

use crossbeam_channel::{bounded, select, Receiver, Sender};

use crate::error::{Error, Result};
use crate::message::Message;
use crate::pipe::{Pipe, PortProperty, PROP_LOCAL_ADDR, PROP_REMOTE_ADDR};
use crate::transport::{valid_peers, PipeDialer, PipeListener, Transport, TransportOptions};
use crate::util::lock;

pub struct Inproc;

impl Transport for Inproc {
    fn scheme(&self) -> &'static str {
        "inproc"
    }

    fn new_dialer(
        &self,
        addr: &str,
        proto_ids: (u16, u16),
        _opts: &TransportOptions,
    ) -> Result<Box<dyn PipeDialer>> {
        Ok(Box::new(InprocDialer {
            addr: addr.to_owned(),
            proto_ids,
        }))
    }

    fn new_listener(
        &self,
        addr: &str,
        proto_ids: (u16, u16),
        _opts: &TransportOptions,
    ) -> Result<Box<dyn PipeListener>> {
        Ok(Box::new(InprocAcceptor {
            addr: addr.to_owned(),
            proto_ids,
        }))
    }
}

/// One accept in flight: the dialer wires up both pipe halves and hands the
/// server half over.
struct PendingAccept {
    wire_tx: Sender<InprocPipe>,
}

struct Entry {
    proto_ids: (u16, u16),
    pending: Vec<PendingAccept>,
}

struct Registry {
    by_addr: Mutex<HashMap<String, Entry>>,
    cond: Condvar,
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Registry {
        by_addr: Mutex::new(HashMap::new()),
        cond: Condvar::new(),
    })
}

/// Channel-backed pipe half. Sends rendezvous with the peer's receive, so
/// the transfer has no buffering beyond the socket queues; closing either
/// half unblocks both sides.
#[derive(Debug)]
struct InprocPipe {
    recv_from_peer: Receiver<Message>,
    send_to_peer: Sender<Message>,
    closed_tx: Mutex<Option<Sender<()>>>,
    closed_rx: Receiver<()>,
    peer_closed: Receiver<()>,
    addr: String,
    proto_ids: (u16, u16),
    open: AtomicBool,
}

impl Pipe for InprocPipe {
    fn send_msg(&self, msg: &Message) -> Result<()> {
        // The receiving protocol expects to split header and body itself,
        // and needs its own copy to own; hand over one merged message.
        let mut merged = Message::new(msg.len());
        merged.body.extend_from_slice(&msg.header);
        merged.body.extend_from_slice(&msg.body);

        select! {
            send(self.send_to_peer, merged) -> res => res.map_err(|_| Error::Closed),
            recv(self.closed_rx) -> _ => Err(Error::Closed),
            recv(self.peer_closed) -> _ => Err(Error::Closed),
        }
    }

    fn recv_msg(&self) -> Result<Message> {
        select! {
            recv(self.recv_from_peer) -> msg => msg.map_err(|_| Error::Closed),
            recv(self.closed_rx) -> _ => Err(Error::Closed),
            recv(self.peer_closed) -> _ => Err(Error::Closed),
        }
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
        lock(&self.closed_tx).take();
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn local_protocol(&self) -> u16 {
        self.proto_ids.0
    }

    fn remote_protocol(&self) -> u16 {
        self.proto_ids.1
    }

    fn property(&self, name: &str) -> Result<PortProperty> {
        match name {
            PROP_LOCAL_ADDR | PROP_REMOTE_ADDR => Ok(PortProperty::Addr(self.addr.clone())),
            _ => Err(Error::BadProperty),
        }
    }
}

struct InprocDialer {
    addr: String,
    proto_ids: (u16, u16),
}

impl PipeDialer for InprocDialer {
    fn dial(&self) -> Result<Box<dyn Pipe>> {
        let reg = registry();
        let mut map = lock(&reg.by_addr);

        loop {
            let entry = match map.get_mut(&self.addr) {
                Some(entry) => entry,
                None => return Err(Error::ConnRefused),
            };
            if !valid_peers(self.proto_ids, entry.proto_ids) {
                return Err(Error::BadProtocol);
            }
            if let Some(accept) = entry.pending.pop() {
                let listener_ids = entry.proto_ids;
                let (client, server) = wire_pair(&self.addr, self.proto_ids, listener_ids);
                // The listener may have gone away while we held the lock
                // slot; a dead receiver just means another round.
                if accept.wire_tx.send(server).is_ok() {
                    return Ok(Box::new(client));
                }
                continue;
            }
            // A listener exists but no accept is pending yet; wait for one.
            map = reg
                .cond
                .wait(map)
                .unwrap_or_else(|e| e.into_inner());
        }
    }
}

fn wire_pair(addr: &str, dialer_ids: (u16, u16), listener_ids: (u16, u16)) -> (InprocPipe, InprocPipe) {
    let (to_server, from_client) = bounded::<Message>(0);
    let (to_client, from_server) = bounded::<Message>(0);
    let (client_closed_tx, client_closed_rx) = bounded::<()>(0);
    let (server_closed_tx, server_closed_rx) = bounded::<()>(0);

    let client = InprocPipe {
        recv_from_peer: from_server,
        send_to_peer: to_server,
        closed_tx: Mutex::new(Some(client_closed_tx)),
        closed_rx: client_closed_rx.clone(),
        peer_closed: server_closed_rx.clone(),
        addr: addr.to_owned(),
        proto_ids: dialer_ids,
        open: AtomicBool::new(true),
    };
    let server = InprocPipe {
        recv_from_peer: from_client,
        send_to_peer: to_client,
        closed_tx: Mutex::new(Some(server_closed_tx)),
        closed_rx: server_closed_rx,
        peer_closed: client_closed_rx,
        addr: addr.to_owned(),
        proto_ids: listener_ids,
        open: AtomicBool::new(true),
    };
    (client, server)
}

struct InprocAcceptor {
    addr: String,
    proto_ids: (u16, u16),
}

impl PipeListener for InprocAcceptor {
    fn listen(&self) -> Result<()> {
        let reg = registry();
        let mut map = lock(&reg.by_addr);

        if map.contains_key(&self.addr) {
            return Err(Error::AddrInUse);
        }
        map.insert(
            self.addr.clone(),
            Entry {
                proto_ids: self.proto_ids,
                pending: Vec::new(),
            },
        );
        reg.cond.notify_all();
        Ok(())
    }

    fn accept(&self) -> Result<Box<dyn Pipe>> {
        let (wire_tx, wire_rx) = bounded::<InprocPipe>(1);
        {
            let reg = registry();
            let mut map = lock(&reg.by_addr);
            let entry = match map.get_mut(&self.addr) {
                Some(entry) => entry,
                None => return Err(Error::Closed),
            };
            entry.pending.push(PendingAccept { wire_tx });
            reg.cond.notify_all();
        }

        match wire_rx.recv() {
            Ok(pipe) => Ok(Box::new(pipe)),
            // The pending slot was dropped, which only happens on close.
            Err(_) => Err(Error::Closed),
        }
    }

    fn close(&self) {
        let reg = registry();
        let mut map = lock(&reg.by_addr);
        map.remove(&self.addr);
        reg.cond.notify_all();
    }
}
