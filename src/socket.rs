// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::sync::Arc;
use std::time::Duration;

use crate::core::SocketCore;
use crate::endpoint::{Endpoint, PortAction};
use crate::error::Result;
use crate::global::{SocketId, SocketType};
use crate::message::Message;
use crate::options::SocketOption;

/// A socket of some [`SocketType`], the application's handle on the
/// library.
///
/// Handles are cheap to clone and all clones drive the same underlying
/// socket. Sends and receives are synchronous; reconnection, framing and
/// protocol bookkeeping all happen on background tasks.
#[derive(Clone)]
pub struct Socket {
    core: Arc<SocketCore>,
}

impl Socket {
    pub(crate) fn new(id: SocketId, socket_type: SocketType) -> Socket {
        Socket {
            core: SocketCore::new(id, socket_type),
        }
    }

    pub fn socket_type(&self) -> SocketType {
        self.core.socket_type()
    }

    /// Adds a remote endpoint to the socket.
    /// The library will try to connect to the specified remote endpoint and
    /// keep redialing, with backoff, whenever the connection goes down. The
    /// address takes the form `transport://address`; the meaning of the
    /// address part is specific to the underlying transport.
    /// Note that bind and connect may be called multiple times on the same
    /// socket, thus allowing the socket to communicate with multiple
    /// heterogeneous endpoints.
    pub fn connect(&self, addr: &str) -> Result<()> {
        self.core.connect(addr)
    }

    /// Adds a local endpoint to the socket, which other applications can
    /// then connect to. Inbound connections are accepted without limit.
    pub fn bind(&self, addr: &str) -> Result<()> {
        self.core.bind(addr)
    }

    pub fn send(&self, buffer: Vec<u8>) -> Result<()> {
        self.send_msg(Message::with_body(buffer))
    }

    pub fn send_msg(&self, msg: Message) -> Result<()> {
        self.core.send_msg(msg)
    }

    pub fn recv(&self) -> Result<Vec<u8>> {
        self.recv_msg().map(|msg| msg.to_buffer())
    }

    pub fn recv_msg(&self) -> Result<Message> {
        self.core.recv_msg()
    }

    /// Set a socket option.
    /// See [`SocketOption`] for the list of options.
    pub fn set_option(&self, option: SocketOption) -> Result<()> {
        self.core.set_option(option)
    }

    /// Reads back an option by its string name, `"RECV-DEADLINE"` say; the
    /// value comes wrapped in the matching [`SocketOption`] variant.
    pub fn get_option(&self, name: &str) -> Result<SocketOption> {
        self.core.get_option(name)
    }

    pub fn set_send_timeout(&self, timeout: Duration) -> Result<()> {
        self.set_option(SocketOption::SendTimeout(timeout))
    }

    pub fn set_recv_timeout(&self, timeout: Duration) -> Result<()> {
        self.set_option(SocketOption::RecvTimeout(timeout))
    }

    /// Installs a hook that observes endpoints being added and removed;
    /// returning false from an `Add` rejects the connection. Replaces any
    /// previous hook.
    pub fn set_port_hook<F>(&self, hook: F)
    where
        F: Fn(PortAction, &Endpoint) -> bool + Send + Sync + 'static,
    {
        self.core.set_port_hook(Some(Arc::new(hook)));
    }

    pub fn clear_port_hook(&self) {
        self.core.set_port_hook(None);
    }

    /// Closes the socket after draining queued sends for at most the linger
    /// interval. Everything sent but not yet delivered by then is dropped.
    /// Closing a closed socket reports [`Error::Closed`](crate::Error::Closed).
    pub fn close(&self) -> Result<()> {
        self.core.close()
    }

    #[doc(hidden)]
    pub fn matches(&self, other: &Socket) -> bool {
        self.socket_type().matches(other.socket_type())
    }
}
