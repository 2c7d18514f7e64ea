// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Pluggable stream transports. Given a URL scheme, a transport produces
//! dialers and listeners whose pipes come out the far side of an SP
//! handshake.

pub mod inproc;
pub mod ipc;
pub mod tcp;
pub mod tls;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::pipe::Pipe;
use crate::transport::tls::TlsConfig;

/// Transport related socket options, snapshotted when a dialer or listener
/// is created.
#[derive(Clone)]
pub struct TransportOptions {
    pub no_delay: bool,
    pub keep_alive: bool,
    pub tls: Option<TlsConfig>,
}

impl Default for TransportOptions {
    fn default() -> TransportOptions {
        TransportOptions {
            no_delay: true,
            keep_alive: true,
            tls: None,
        }
    }
}

/// Supplier of connectivity for one address scheme.
pub trait Transport: Send + Sync {
    /// The prefix used in SP addresses, `tcp` in `tcp://127.0.0.1:5454`.
    fn scheme(&self) -> &'static str;

    /// Creates a dialer bound to one remote address. `proto_ids` carries the
    /// local and expected peer protocol numbers for the handshake.
    fn new_dialer(
        &self,
        addr: &str,
        proto_ids: (u16, u16),
        opts: &TransportOptions,
    ) -> Result<Box<dyn PipeDialer>>;

    /// Creates a listener bound to one local address.
    fn new_listener(
        &self,
        addr: &str,
        proto_ids: (u16, u16),
        opts: &TransportOptions,
    ) -> Result<Box<dyn PipeListener>>;
}

/// The client side of a connection. Each successful dial performs the
/// handshake and yields a fresh pipe.
pub trait PipeDialer: Send + Sync {
    fn dial(&self) -> Result<Box<dyn Pipe>>;
}

/// The server side of a connection.
pub trait PipeListener: Send + Sync {
    /// The socket equivalent of bind + listen; called once, before accept.
    fn listen(&self) -> Result<()>;

    /// Completes one inbound connection, handshake included.
    fn accept(&self) -> Result<Box<dyn Pipe>>;

    /// Stops listening and unblocks any accept in flight, which will then
    /// report [`Error::Closed`].
    fn close(&self);
}

/// Splits `scheme://rest` into its parts.
pub fn split_scheme(addr: &str) -> Result<(&str, &str)> {
    match addr.find("://") {
        Some(index) => Ok((&addr[..index], &addr[index + 3..])),
        None => Err(Error::BadTransport),
    }
}

/// True when the two protocol number pairs are allowed to peer with each
/// other; `a` and `b` are `(number, peer_number)` tuples.
pub fn valid_peers(a: (u16, u16), b: (u16, u16)) -> bool {
    a.1 == b.0 && b.1 == a.0
}

/// The transports every socket starts out with, keyed by scheme.
pub fn defaults() -> HashMap<&'static str, Arc<dyn Transport>> {
    let mut transports: HashMap<&'static str, Arc<dyn Transport>> = HashMap::new();
    let tcp = Arc::new(tcp::Tcp);
    let ipc = Arc::new(ipc::Ipc);
    let inproc = Arc::new(inproc::Inproc);
    let tls = Arc::new(tls::TlsTcp);

    transports.insert(tcp.scheme(), tcp);
    transports.insert(ipc.scheme(), ipc);
    transports.insert(inproc.scheme(), inproc);
    transports.insert(tls.scheme(), tls);
    transports
}
