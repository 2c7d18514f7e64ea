// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::collections::HashMap;
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use socket2::{Domain, Socket, Type};

use crate::error::{Error, Result};
use crate::pipe::{ConnPipe, Pipe, PortProperty, PROP_LOCAL_ADDR, PROP_REMOTE_ADDR};
use crate::transport::{PipeDialer, PipeListener, Transport, TransportOptions};
use crate::util::lock;

pub struct Tcp;

impl Transport for Tcp {
    fn scheme(&self) -> &'static str {
        "tcp"
    }

    fn new_dialer(
        &self,
        addr: &str,
        proto_ids: (u16, u16),
        opts: &TransportOptions,
    ) -> Result<Box<dyn PipeDialer>> {
        Ok(Box::new(TcpDialer {
            addr: addr.to_owned(),
            proto_ids,
            no_delay: opts.no_delay,
            keep_alive: opts.keep_alive,
        }))
    }

    fn new_listener(
        &self,
        addr: &str,
        proto_ids: (u16, u16),
        opts: &TransportOptions,
    ) -> Result<Box<dyn PipeListener>> {
        Ok(Box::new(TcpAcceptor {
            addr: addr.to_owned(),
            proto_ids,
            no_delay: opts.no_delay,
            keep_alive: opts.keep_alive,
            listener: Mutex::new(None),
            closed: AtomicBool::new(false),
        }))
    }
}

fn configure(stream: &TcpStream, no_delay: bool, keep_alive: bool) -> Result<()> {
    stream.set_nodelay(no_delay)?;
    socket2::SockRef::from(stream).set_keepalive(keep_alive)?;
    Ok(())
}

pub(super) fn resolve(addr: &str) -> Result<std::net::SocketAddr> {
    use std::net::ToSocketAddrs;

    addr.to_socket_addrs()?.next().ok_or(Error::BadValue)
}

pub(super) fn addr_props(stream: &TcpStream) -> HashMap<String, PortProperty> {
    let mut props = HashMap::new();
    if let Ok(local) = stream.local_addr() {
        props.insert(PROP_LOCAL_ADDR.to_owned(), PortProperty::Addr(local.to_string()));
    }
    if let Ok(remote) = stream.peer_addr() {
        props.insert(PROP_REMOTE_ADDR.to_owned(), PortProperty::Addr(remote.to_string()));
    }
    props
}

fn pipe_over(stream: TcpStream, proto_ids: (u16, u16)) -> Result<Box<dyn Pipe>> {
    let props = addr_props(&stream);
    let reader = stream.try_clone()?;
    let shut = stream.try_clone()?;
    let pipe = ConnPipe::connect(
        Box::new(reader),
        Box::new(stream),
        Box::new(move || shut.shutdown(Shutdown::Both)),
        proto_ids,
        props,
        false,
    )?;
    Ok(Box::new(pipe))
}

struct TcpDialer {
    addr: String,
    proto_ids: (u16, u16),
    no_delay: bool,
    keep_alive: bool,
}

impl PipeDialer for TcpDialer {
    fn dial(&self) -> Result<Box<dyn Pipe>> {
        let stream = TcpStream::connect(&*self.addr)?;
        configure(&stream, self.no_delay, self.keep_alive)?;
        pipe_over(stream, self.proto_ids)
    }
}

struct TcpAcceptor {
    addr: String,
    proto_ids: (u16, u16),
    no_delay: bool,
    keep_alive: bool,
    listener: Mutex<Option<Arc<TcpListener>>>,
    closed: AtomicBool,
}

impl PipeListener for TcpAcceptor {
    fn listen(&self) -> Result<()> {
        // Bound through socket2 so the address can be reused right after a
        // previous listener went away, instead of lingering in TIME_WAIT.
        let addr = resolve(&self.addr)?;
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(128)?;

        *lock(&self.listener) = Some(Arc::new(socket.into()));
        Ok(())
    }

    fn accept(&self) -> Result<Box<dyn Pipe>> {
        let listener = match lock(&self.listener).clone() {
            Some(listener) => listener,
            None => return Err(Error::Closed),
        };
        match listener.accept() {
            Ok((stream, _)) => {
                configure(&stream, self.no_delay, self.keep_alive)?;
                pipe_over(stream, self.proto_ids)
            }
            Err(e) => {
                if self.closed.load(Ordering::Acquire) {
                    Err(Error::Closed)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(listener) = lock(&self.listener).take() {
            // Unblocks the accept loop; the OS fails the pending accept once
            // the socket is shut down.
            let _ = socket2::SockRef::from(&*listener).shutdown(Shutdown::Both);
        }
    }
}
