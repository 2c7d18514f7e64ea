// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The socket substrate behind the facade: queues, sticky error cells,
//! options, the endpoint vector, and the dialer/listener loops.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{after, bounded, select, Receiver, Sender};

use crate::endpoint::{Endpoint, PortAction, PortHook};
use crate::error::{Error, Result};
use crate::global::{SocketId, SocketType};
use crate::message::Message;
use crate::options::{self, SocketOption};
use crate::pipe::Pipe;
use crate::protocol::{self, Protocol};
use crate::transport::{split_scheme, Transport, TransportOptions};
use crate::util::{deadline_timer, drain_queue, lock};

const DEFAULT_QUEUE_LEN: usize = 128;
const DEFAULT_PEER_QUEUE_LEN: usize = 16;
const DEFAULT_RECONNECT_TIME: Duration = Duration::from_millis(100);
const DEFAULT_RECONNECT_MAX: Duration = Duration::from_secs(60);
const DEFAULT_LINGER: Duration = Duration::from_secs(1);

/// A slot holding the error the next send or recv must fail with, `None`
/// when the operation is allowed. Protocols park `ProtoOp`/`ProtoState`
/// here to enforce direction and lockstep rules.
pub(crate) struct ErrorCell(Mutex<Option<Error>>);

impl ErrorCell {
    fn new() -> ErrorCell {
        ErrorCell(Mutex::new(None))
    }

    fn set(&self, err: Option<Error>) {
        *lock(&self.0) = err;
    }

    fn get(&self) -> Option<Error> {
        lock(&self.0).clone()
    }
}

/// The send and receive queues. They can be swapped out for differently
/// sized ones up until the socket goes active, so everything accesses them
/// through here and protocol tasks grab their endpoint fresh at task start.
struct Queues {
    send: Mutex<(Sender<Message>, Receiver<Message>)>,
    recv: Mutex<(Sender<Message>, Receiver<Message>)>,
}

impl Queues {
    fn new(send_len: usize, recv_len: usize) -> Queues {
        Queues {
            send: Mutex::new(bounded(send_len)),
            recv: Mutex::new(bounded(recv_len)),
        }
    }

    fn send_tx(&self) -> Sender<Message> {
        lock(&self.send).0.clone()
    }

    fn send_rx(&self) -> Receiver<Message> {
        lock(&self.send).1.clone()
    }

    fn recv_tx(&self) -> Sender<Message> {
        lock(&self.recv).0.clone()
    }

    fn recv_rx(&self) -> Receiver<Message> {
        lock(&self.recv).1.clone()
    }

    fn resize_send(&self, len: usize) {
        *lock(&self.send) = bounded(len);
    }

    fn resize_recv(&self, len: usize) {
        *lock(&self.recv) = bounded(len);
    }
}

struct CoreOptions {
    rdeadline: Duration,
    wdeadline: Duration,
    linger: Duration,
    reconn_ivl: Duration,
    reconn_max: Duration,
    send_q_len: usize,
    recv_q_len: usize,
    send_q_len_set: bool,
    no_delay: bool,
    keep_alive: bool,
    tls: Option<crate::transport::tls::TlsConfig>,
}

impl Default for CoreOptions {
    fn default() -> CoreOptions {
        CoreOptions {
            rdeadline: Duration::ZERO,
            wdeadline: Duration::ZERO,
            linger: DEFAULT_LINGER,
            reconn_ivl: DEFAULT_RECONNECT_TIME,
            reconn_max: DEFAULT_RECONNECT_MAX,
            send_q_len: DEFAULT_QUEUE_LEN,
            recv_q_len: DEFAULT_QUEUE_LEN,
            send_q_len_set: false,
            no_delay: true,
            keep_alive: true,
            tls: None,
        }
    }
}

/// The handle a protocol gets to its socket. Deliberately narrow: queues,
/// the close signal, the error cells and the per-peer queue sizing. There
/// is no way back to the full socket, so protocol and core cannot chase
/// each other in circles.
#[derive(Clone)]
pub(crate) struct ProtoSocket {
    queues: Arc<Queues>,
    close_rx: Receiver<()>,
    send_err: Arc<ErrorCell>,
    recv_err: Arc<ErrorCell>,
    opts: Arc<Mutex<CoreOptions>>,
}

impl ProtoSocket {
    /// The queue the application sends into and protocol tasks consume.
    pub fn send_queue(&self) -> Receiver<Message> {
        self.queues.send_rx()
    }

    /// The queue protocol tasks fill and the application receives from.
    pub fn recv_queue(&self) -> Sender<Message> {
        self.queues.recv_tx()
    }

    /// Becomes ready (disconnected) when the socket closes.
    pub fn closed(&self) -> Receiver<()> {
        self.close_rx.clone()
    }

    pub fn set_send_error(&self, err: Option<Error>) {
        self.send_err.set(err);
    }

    pub fn set_recv_error(&self, err: Option<Error>) {
        self.recv_err.set(err);
    }

    /// Depth of per-peer outbound queues for the fan-out protocols: 16
    /// unless the application sized the write queue explicitly.
    pub fn peer_queue_len(&self) -> usize {
        let opts = lock(&self.opts);
        if opts.send_q_len_set {
            opts.send_q_len
        } else {
            DEFAULT_PEER_QUEUE_LEN
        }
    }

    #[cfg(test)]
    pub(crate) fn loopback() -> ProtoSocket {
        let (close_tx, close_rx) = bounded::<()>(0);
        std::mem::forget(close_tx);
        ProtoSocket {
            queues: Arc::new(Queues::new(1, 1)),
            close_rx,
            send_err: Arc::new(ErrorCell::new()),
            recv_err: Arc::new(ErrorCell::new()),
            opts: Arc::new(Mutex::new(CoreOptions::default())),
        }
    }
}

struct CoreState {
    active: bool,
    closing: bool,
    pipes: Vec<Arc<Endpoint>>,
    dialers: Vec<Arc<DialerCore>>,
    listeners: Vec<Arc<ListenerCore>>,
    port_hook: Option<PortHook>,
}

/// The meaty part of a socket.
pub(crate) struct SocketCore {
    id: SocketId,
    socket_type: SocketType,
    proto: Arc<dyn Protocol>,
    queues: Arc<Queues>,
    opts: Arc<Mutex<CoreOptions>>,
    send_err: Arc<ErrorCell>,
    recv_err: Arc<ErrorCell>,
    close_tx: Mutex<Option<Sender<()>>>,
    close_rx: Receiver<()>,
    state: Mutex<CoreState>,
    transports: HashMap<&'static str, Arc<dyn Transport>>,
}

impl SocketCore {
    pub fn new(id: SocketId, socket_type: SocketType) -> Arc<SocketCore> {
        let queues = Arc::new(Queues::new(DEFAULT_QUEUE_LEN, DEFAULT_QUEUE_LEN));
        let opts = Arc::new(Mutex::new(CoreOptions::default()));
        let send_err = Arc::new(ErrorCell::new());
        let recv_err = Arc::new(ErrorCell::new());
        let (close_tx, close_rx) = bounded::<()>(0);

        let proto = protocol::create(
            socket_type,
            ProtoSocket {
                queues: queues.clone(),
                close_rx: close_rx.clone(),
                send_err: send_err.clone(),
                recv_err: recv_err.clone(),
                opts: opts.clone(),
            },
        );

        Arc::new(SocketCore {
            id,
            socket_type,
            proto,
            queues,
            opts,
            send_err,
            recv_err,
            close_tx: Mutex::new(Some(close_tx)),
            close_rx,
            state: Mutex::new(CoreState {
                active: false,
                closing: false,
                pipes: Vec::new(),
                dialers: Vec::new(),
                listeners: Vec::new(),
                port_hook: None,
            }),
            transports: crate::transport::defaults(),
        })
    }

    pub fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    fn is_closing(&self) -> bool {
        lock(&self.state).closing
    }

    fn transport(&self, addr: &str) -> Result<(&Arc<dyn Transport>, String)> {
        let (scheme, rest) = split_scheme(addr)?;
        let transport = self.transports.get(scheme).ok_or(Error::BadTransport)?;
        Ok((transport, rest.to_owned()))
    }

    fn transport_options(&self) -> TransportOptions {
        let opts = lock(&self.opts);
        TransportOptions {
            no_delay: opts.no_delay,
            keep_alive: opts.keep_alive,
            tls: opts.tls.clone(),
        }
    }

    /// Adds a remote endpoint to the socket. The connection itself is
    /// established by the reconnect loop; dial-time errors feed its backoff.
    pub fn connect(self: &Arc<Self>, addr: &str) -> Result<()> {
        let (transport, bare) = self.transport(addr)?;
        let proto_ids = (self.proto.number(), self.proto.peer_number());
        let pd = transport.new_dialer(&bare, proto_ids, &self.transport_options())?;
        let dialer = Arc::new(DialerCore::new(addr.to_owned(), pd));

        {
            let mut state = lock(&self.state);
            if state.closing {
                return Err(Error::Closed);
            }
            state.active = true;
            state.dialers.push(dialer.clone());
        }
        debug!("[{:?}] dialing '{}'", self.id, addr);

        let core = self.clone();
        thread::spawn(move || dial_loop(core, dialer));
        Ok(())
    }

    /// Adds a local endpoint: binds right away, then accepts in the
    /// background without limit.
    pub fn bind(self: &Arc<Self>, addr: &str) -> Result<()> {
        let (transport, bare) = self.transport(addr)?;
        let proto_ids = (self.proto.number(), self.proto.peer_number());
        let pl = transport.new_listener(&bare, proto_ids, &self.transport_options())?;

        pl.listen()?;
        let listener = Arc::new(ListenerCore {
            addr: addr.to_owned(),
            pl,
        });

        {
            let mut state = lock(&self.state);
            if state.closing {
                listener.pl.close();
                return Err(Error::Closed);
            }
            state.active = true;
            state.listeners.push(listener.clone());
        }
        debug!("[{:?}] listening on '{}'", self.id, addr);

        let core = self.clone();
        thread::spawn(move || accept_loop(core, listener));
        Ok(())
    }

    pub fn send_msg(&self, msg: Message) -> Result<()> {
        if let Some(e) = self.send_err.get() {
            return Err(e);
        }

        let mut msg = msg;
        if self.proto.has_send_hook() && !self.proto.send_hook(&mut msg) {
            // Vetoed by the protocol: dropped silently.
            return Ok(());
        }

        let timer = deadline_timer(lock(&self.opts).wdeadline);
        let queue = self.queues.send_tx();

        select! {
            recv(timer) -> _ => Err(Error::SendTimeout),
            recv(self.close_rx) -> _ => Err(Error::Closed),
            send(queue, msg) -> res => res.map_err(|_| Error::Closed),
        }
    }

    pub fn recv_msg(&self) -> Result<Message> {
        let timer = deadline_timer(lock(&self.opts).rdeadline);
        if let Some(e) = self.recv_err.get() {
            return Err(e);
        }

        let queue = self.queues.recv_rx();
        loop {
            let msg: Message = select! {
                recv(timer) -> _ => return Err(Error::RecvTimeout),
                recv(self.close_rx) -> _ => return Err(Error::Closed),
                recv(queue) -> msg => msg.map_err(|_| Error::Closed)?,
            };

            if !self.proto.has_recv_hook() {
                return Ok(msg);
            }
            let mut msg = msg;
            if self.proto.recv_hook(&mut msg) {
                return Ok(msg);
            }
            // Vetoed: free it and wait for the next one.
        }
    }

    /// Closes the socket: drains the send queue within the linger window,
    /// broadcasts the close, shuts the protocol down and closes every
    /// endpoint. Closing twice reports `Closed`.
    pub fn close(&self) -> Result<()> {
        let fin = Instant::now() + lock(&self.opts).linger;

        drain_queue(&self.queues.send_tx(), fin);

        {
            let mut state = lock(&self.state);
            if state.closing {
                return Err(Error::Closed);
            }
            state.closing = true;
        }
        debug!("[{:?}] closing", self.id);
        lock(&self.close_tx).take();

        let (dialers, listeners, pipes) = {
            let state = lock(&self.state);
            (
                state.dialers.clone(),
                state.listeners.clone(),
                state.pipes.clone(),
            )
        };
        for listener in &listeners {
            listener.pl.close();
        }
        for dialer in &dialers {
            dialer.close();
        }

        // A second drain, in case forwarded messages arrived since.
        drain_queue(&self.queues.send_tx(), fin);
        self.proto.shutdown(fin);

        for pipe in &pipes {
            pipe.close();
        }
        Ok(())
    }

    /// Registers a freshly handshaken pipe with the socket and the
    /// protocol. The port hook may veto it.
    pub fn add_endpoint(
        self: &Arc<Self>,
        pipe: Box<dyn Pipe>,
        addr: String,
        client: bool,
    ) -> Option<Arc<Endpoint>> {
        let ep = Endpoint::new(pipe, addr, client);

        let hook = lock(&self.state).port_hook.clone();
        if let Some(hook) = hook {
            if !hook(PortAction::Add, &ep) {
                debug!("[{:?}] endpoint [{}] rejected by port hook", self.id, ep.id());
                ep.close();
                return None;
            }
        }

        ep.attach(self);
        {
            let mut state = lock(&self.state);
            if state.closing {
                drop(state);
                ep.close();
                return None;
            }
            ep.set_index(state.pipes.len() as isize);
            state.pipes.push(ep.clone());
        }
        self.proto.add_endpoint(&ep);
        debug!("[{:?}] endpoint [{}] added for '{}'", self.id, ep.id(), ep.address());
        Some(ep)
    }

    /// Unregisters an endpoint; swap-remove keeps the vector contiguous.
    pub fn remove_endpoint(&self, ep: &Endpoint) {
        self.proto.remove_endpoint(ep);

        {
            let mut state = lock(&self.state);
            let index = ep.index();
            if index >= 0 {
                let index = index as usize;
                if index < state.pipes.len() && state.pipes[index].id() == ep.id() {
                    state.pipes.swap_remove(index);
                    if index < state.pipes.len() {
                        state.pipes[index].set_index(index as isize);
                    }
                }
                ep.set_index(-1);
            }
        }

        let hook = lock(&self.state).port_hook.clone();
        if let Some(hook) = hook {
            hook(PortAction::Remove, ep);
        }
        debug!("[{:?}] endpoint [{}] removed", self.id, ep.id());
    }

    pub fn set_option(&self, opt: SocketOption) -> Result<()> {
        match self.proto.set_option(&opt) {
            Ok(()) => return Ok(()),
            Err(Error::BadOption) => {}
            Err(e) => return Err(e),
        }

        let mut opts = lock(&self.opts);
        match opt {
            SocketOption::RecvTimeout(d) => opts.rdeadline = d,
            SocketOption::SendTimeout(d) => opts.wdeadline = d,
            SocketOption::Linger(d) => opts.linger = d,
            SocketOption::NoDelay(b) => opts.no_delay = b,
            SocketOption::KeepAlive(b) => opts.keep_alive = b,
            SocketOption::TlsConfig(c) => opts.tls = Some(c),
            SocketOption::SendQueueLen(len) => {
                if lock(&self.state).active {
                    return Err(Error::BadOption);
                }
                opts.send_q_len = len;
                opts.send_q_len_set = true;
                self.queues.resize_send(len);
            }
            SocketOption::RecvQueueLen(len) => {
                if lock(&self.state).active {
                    return Err(Error::BadOption);
                }
                opts.recv_q_len = len;
                self.queues.resize_recv(len);
            }
            _ => return Err(Error::BadOption),
        }
        Ok(())
    }

    pub fn get_option(&self, name: &str) -> Result<SocketOption> {
        match self.proto.get_option(name) {
            Ok(value) => return Ok(value),
            Err(Error::BadOption) => {}
            Err(e) => return Err(e),
        }

        let opts = lock(&self.opts);
        match name {
            options::OPTION_RECV_DEADLINE => Ok(SocketOption::RecvTimeout(opts.rdeadline)),
            options::OPTION_SEND_DEADLINE => Ok(SocketOption::SendTimeout(opts.wdeadline)),
            options::OPTION_LINGER => Ok(SocketOption::Linger(opts.linger)),
            options::OPTION_WRITE_Q_LEN => Ok(SocketOption::SendQueueLen(opts.send_q_len)),
            options::OPTION_READ_Q_LEN => Ok(SocketOption::RecvQueueLen(opts.recv_q_len)),
            options::OPTION_NO_DELAY => Ok(SocketOption::NoDelay(opts.no_delay)),
            options::OPTION_KEEP_ALIVE => Ok(SocketOption::KeepAlive(opts.keep_alive)),
            _ => Err(Error::BadOption),
        }
    }

    /// Installs a hook observing endpoints coming and going; returns the
    /// previous hook. Returning false from an `Add` rejects the connection.
    pub fn set_port_hook(&self, hook: Option<PortHook>) -> Option<PortHook> {
        let mut state = lock(&self.state);
        std::mem::replace(&mut state.port_hook, hook)
    }
}

/// Persistent reconnecter bound to one remote address.
pub(crate) struct DialerCore {
    addr: String,
    pd: Box<dyn crate::transport::PipeDialer>,
    close_tx: Mutex<Option<Sender<()>>>,
    close_rx: Receiver<()>,
}

impl DialerCore {
    fn new(addr: String, pd: Box<dyn crate::transport::PipeDialer>) -> DialerCore {
        let (close_tx, close_rx) = bounded::<()>(0);
        DialerCore {
            addr,
            pd,
            close_tx: Mutex::new(Some(close_tx)),
            close_rx,
        }
    }

    fn close(&self) {
        lock(&self.close_tx).take();
    }

    fn is_closed(&self) -> bool {
        lock(&self.close_tx).is_none()
    }
}

/// Accept loop state bound to one local address.
pub(crate) struct ListenerCore {
    addr: String,
    pl: Box<dyn crate::transport::PipeListener>,
}

/// Dials, and redials with exponential backoff: each failure doubles the
/// sleep from the initial interval up to the cap, and a successful
/// connection resets it. After a connected endpoint drops, the same backoff
/// path drives the redial.
fn dial_loop(core: Arc<SocketCore>, dialer: Arc<DialerCore>) {
    let (initial, max) = {
        let opts = lock(&core.opts);
        (opts.reconn_ivl, opts.reconn_max)
    };
    let mut retry = initial;
    let sock_closed = core.close_rx.clone();
    let dialer_closed = dialer.close_rx.clone();

    loop {
        match dialer.pd.dial() {
            Ok(pipe) => {
                retry = initial;
                if dialer.is_closed() {
                    pipe.close();
                    return;
                }
                if let Some(ep) = core.add_endpoint(pipe, dialer.addr.clone(), true) {
                    let ep_closed = ep.closed_chan();
                    select! {
                        recv(sock_closed) -> _ => {}
                        recv(ep_closed) -> _ => {}
                        recv(dialer_closed) -> _ => {}
                    }
                }
            }
            Err(e) => {
                debug!("[{:?}] dial '{}' failed: {}", core.id, dialer.addr, e);
            }
        }

        // Redialing now, unless something closed underneath us.
        select! {
            recv(dialer_closed) -> _ => return,
            recv(sock_closed) -> _ => return,
            recv(after(retry)) -> _ => {
                retry = std::cmp::min(retry * 2, max);
            }
        }
    }
}

/// Accepts inbound connections until the listener or the socket closes.
/// Individual failures (a peer with the wrong protocol, a dropped
/// handshake) only cost that connection.
fn accept_loop(core: Arc<SocketCore>, listener: Arc<ListenerCore>) {
    loop {
        if core.is_closing() {
            return;
        }
        match listener.pl.accept() {
            Ok(pipe) => {
                core.add_endpoint(pipe, listener.addr.clone(), false);
            }
            Err(Error::Closed) => return,
            Err(e) => {
                debug!("[{:?}] accept on '{}' failed: {}", core.id, listener.addr, e);
                if core.is_closing() {
                    return;
                }
            }
        }
    }
}
