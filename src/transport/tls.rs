// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! TLS over TCP transport, scheme `tls+tcp`.
//!
//! Certificate management is configuration input: the application builds
//! `rustls` configs and hands them to the socket through the `TlsConfig`
//! option before binding or connecting.
//!
//! The pipe needs concurrent reads and writes over one TLS session, so the
//! session state machine sits behind a mutex shared by a read half and a
//! write half. The lock is only ever held while ciphertext is shuffled in or
//! out of the session, never across a blocking socket read.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rustls::{ClientConnection, ServerConnection};
use socket2::{Domain, Socket, Type};

use crate::error::{Error, Result};
use crate::pipe::{ConnPipe, Pipe, PortProperty, TlsState, PROP_TLS_STATE};
use crate::transport::{PipeDialer, PipeListener, Transport, TransportOptions};
use crate::util::lock;

/// TLS material for the `tls+tcp` transport. Dialers need the client half,
/// listeners the server half; one value may carry both.
#[derive(Clone)]
pub struct TlsConfig {
    client: Option<Arc<rustls::ClientConfig>>,
    server: Option<Arc<rustls::ServerConfig>>,
    server_name: Option<String>,
}

impl TlsConfig {
    pub fn for_client(config: Arc<rustls::ClientConfig>) -> TlsConfig {
        TlsConfig {
            client: Some(config),
            server: None,
            server_name: None,
        }
    }

    pub fn for_server(config: Arc<rustls::ServerConfig>) -> TlsConfig {
        TlsConfig {
            client: None,
            server: Some(config),
            server_name: None,
        }
    }

    /// Name presented for certificate validation when dialing; defaults to
    /// the host part of the address.
    pub fn with_server_name(mut self, name: &str) -> TlsConfig {
        self.server_name = Some(name.to_owned());
        self
    }
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter
            .debug_struct("TlsConfig")
            .field("client", &self.client.is_some())
            .field("server", &self.server.is_some())
            .field("server_name", &self.server_name)
            .finish()
    }
}

pub struct TlsTcp;

impl Transport for TlsTcp {
    fn scheme(&self) -> &'static str {
        "tls+tcp"
    }

    fn new_dialer(
        &self,
        addr: &str,
        proto_ids: (u16, u16),
        opts: &TransportOptions,
    ) -> Result<Box<dyn PipeDialer>> {
        Ok(Box::new(TlsDialer {
            addr: addr.to_owned(),
            proto_ids,
            no_delay: opts.no_delay,
            keep_alive: opts.keep_alive,
            tls: opts.tls.clone(),
        }))
    }

    fn new_listener(
        &self,
        addr: &str,
        proto_ids: (u16, u16),
        opts: &TransportOptions,
    ) -> Result<Box<dyn PipeListener>> {
        Ok(Box::new(TlsAcceptor {
            addr: addr.to_owned(),
            proto_ids,
            no_delay: opts.no_delay,
            keep_alive: opts.keep_alive,
            tls: opts.tls.clone(),
            listener: Mutex::new(None),
            closed: AtomicBool::new(false),
        }))
    }
}

enum TlsSession {
    Client(ClientConnection),
    Server(ServerConnection),
}

impl TlsSession {
    fn reader(&mut self) -> rustls::Reader<'_> {
        match self {
            TlsSession::Client(c) => c.reader(),
            TlsSession::Server(s) => s.reader(),
        }
    }

    fn writer(&mut self) -> rustls::Writer<'_> {
        match self {
            TlsSession::Client(c) => c.writer(),
            TlsSession::Server(s) => s.writer(),
        }
    }

    fn read_tls(&mut self, rd: &mut dyn Read) -> io::Result<usize> {
        match self {
            TlsSession::Client(c) => c.read_tls(rd),
            TlsSession::Server(s) => s.read_tls(rd),
        }
    }

    fn write_tls(&mut self, wr: &mut dyn Write) -> io::Result<usize> {
        match self {
            TlsSession::Client(c) => c.write_tls(wr),
            TlsSession::Server(s) => s.write_tls(wr),
        }
    }

    fn process_new_packets(&mut self) -> io::Result<()> {
        let res = match self {
            TlsSession::Client(c) => c.process_new_packets(),
            TlsSession::Server(s) => s.process_new_packets(),
        };
        res.map(|_| ())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn wants_read(&self) -> bool {
        match self {
            TlsSession::Client(c) => c.wants_read(),
            TlsSession::Server(s) => s.wants_read(),
        }
    }

    fn wants_write(&self) -> bool {
        match self {
            TlsSession::Client(c) => c.wants_write(),
            TlsSession::Server(s) => s.wants_write(),
        }
    }

    fn is_handshaking(&self) -> bool {
        match self {
            TlsSession::Client(c) => c.is_handshaking(),
            TlsSession::Server(s) => s.is_handshaking(),
        }
    }

    fn state(&self) -> TlsState {
        let (version, suite) = match self {
            TlsSession::Client(c) => (c.protocol_version(), c.negotiated_cipher_suite()),
            TlsSession::Server(s) => (s.protocol_version(), s.negotiated_cipher_suite()),
        };
        TlsState {
            version: version.map(|v| format!("{:?}", v)).unwrap_or_default(),
            cipher_suite: suite.map(|s| format!("{:?}", s.suite())).unwrap_or_default(),
        }
    }
}

/// Runs the TLS handshake to completion over the blocking socket.
fn drive_handshake(session: &mut TlsSession, sock: &TcpStream) -> Result<()> {
    while session.is_handshaking() {
        while session.wants_write() {
            session.write_tls(&mut &*sock)?;
        }
        if !session.is_handshaking() {
            break;
        }
        if session.wants_read() {
            if session.read_tls(&mut &*sock)? == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            session.process_new_packets()?;
        }
    }
    while session.wants_write() {
        session.write_tls(&mut &*sock)?;
    }
    Ok(())
}

struct TlsReadHalf {
    session: Arc<Mutex<TlsSession>>,
    sock: TcpStream,
}

impl Read for TlsReadHalf {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            {
                let mut session = lock(&self.session);
                match session.reader().read(buf) {
                    Ok(n) => return Ok(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e),
                }
            }

            // No plaintext buffered; block for ciphertext with the session
            // unlocked so the write half stays usable meanwhile.
            let mut raw = [0u8; 16 * 1024];
            let n = self.sock.read(&mut raw)?;
            if n == 0 {
                return Ok(0);
            }

            let mut session = lock(&self.session);
            let mut cursor = &raw[..n];
            while !cursor.is_empty() {
                session.read_tls(&mut cursor)?;
                session.process_new_packets()?;
            }
            // Post-handshake traffic (key updates, tickets) may want a
            // response on the wire.
            while session.wants_write() {
                session.write_tls(&mut &self.sock)?;
            }
        }
    }
}

struct TlsWriteHalf {
    session: Arc<Mutex<TlsSession>>,
    sock: TcpStream,
}

impl Write for TlsWriteHalf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut session = lock(&self.session);
        let n = session.writer().write(buf)?;
        while session.wants_write() {
            session.write_tls(&mut &self.sock)?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut session = lock(&self.session);
        while session.wants_write() {
            session.write_tls(&mut &self.sock)?;
        }
        (&self.sock).flush()
    }
}

fn configure(stream: &TcpStream, no_delay: bool, keep_alive: bool) -> Result<()> {
    stream.set_nodelay(no_delay)?;
    socket2::SockRef::from(stream).set_keepalive(keep_alive)?;
    Ok(())
}

fn pipe_over(stream: TcpStream, mut session: TlsSession, proto_ids: (u16, u16)) -> Result<Box<dyn Pipe>> {
    drive_handshake(&mut session, &stream)?;

    let mut props = super::tcp::addr_props(&stream);
    props.insert(PROP_TLS_STATE.to_owned(), PortProperty::TlsState(session.state()));

    let session = Arc::new(Mutex::new(session));
    let read_half = TlsReadHalf {
        session: session.clone(),
        sock: stream.try_clone()?,
    };
    let write_half = TlsWriteHalf {
        session,
        sock: stream.try_clone()?,
    };
    let shut = stream;
    let pipe = ConnPipe::connect(
        Box::new(read_half),
        Box::new(write_half),
        Box::new(move || shut.shutdown(Shutdown::Both)),
        proto_ids,
        props,
        false,
    )?;
    Ok(Box::new(pipe))
}

struct TlsDialer {
    addr: String,
    proto_ids: (u16, u16),
    no_delay: bool,
    keep_alive: bool,
    tls: Option<TlsConfig>,
}

impl PipeDialer for TlsDialer {
    fn dial(&self) -> Result<Box<dyn Pipe>> {
        let tls = self.tls.as_ref().ok_or(Error::TlsNoConfig)?;
        let config = tls.client.clone().ok_or(Error::TlsNoCert)?;
        let name = match tls.server_name {
            Some(ref name) => name.clone(),
            None => host_part(&self.addr).to_owned(),
        };
        let name = rustls::ServerName::try_from(name.as_str()).map_err(|_| Error::BadValue)?;

        let stream = TcpStream::connect(&*self.addr)?;
        configure(&stream, self.no_delay, self.keep_alive)?;

        let session = ClientConnection::new(config, name)
            .map_err(|e| Error::Io(Arc::new(io::Error::new(io::ErrorKind::InvalidInput, e))))?;
        pipe_over(stream, TlsSession::Client(session), self.proto_ids)
    }
}

fn host_part(addr: &str) -> &str {
    match addr.rfind(':') {
        Some(index) => &addr[..index],
        None => addr,
    }
}

struct TlsAcceptor {
    addr: String,
    proto_ids: (u16, u16),
    no_delay: bool,
    keep_alive: bool,
    tls: Option<TlsConfig>,
    listener: Mutex<Option<Arc<TcpListener>>>,
    closed: AtomicBool,
}

impl TlsAcceptor {
    fn server_config(&self) -> Result<Arc<rustls::ServerConfig>> {
        let tls = self.tls.as_ref().ok_or(Error::TlsNoConfig)?;
        tls.server.clone().ok_or(Error::TlsNoCert)
    }
}

impl PipeListener for TlsAcceptor {
    fn listen(&self) -> Result<()> {
        self.server_config()?;

        let addr = super::tcp::resolve(&self.addr)?;
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(128)?;

        *lock(&self.listener) = Some(Arc::new(socket.into()));
        Ok(())
    }

    fn accept(&self) -> Result<Box<dyn Pipe>> {
        let config = self.server_config()?;
        let listener = match lock(&self.listener).clone() {
            Some(listener) => listener,
            None => return Err(Error::Closed),
        };
        match listener.accept() {
            Ok((stream, _)) => {
                configure(&stream, self.no_delay, self.keep_alive)?;
                let session = ServerConnection::new(config)
                    .map_err(|e| Error::Io(Arc::new(io::Error::new(io::ErrorKind::InvalidInput, e))))?;
                pipe_over(stream, TlsSession::Server(session), self.proto_ids)
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
            let _ = socket2::SockRef::from(&*listener).shutdown(Shutdown::Both);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::transport::{Transport, TransportOptions};

    fn client_only_config() -> TlsConfig {
        let config = rustls::ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(rustls::RootCertStore::empty())
            .with_no_client_auth();
        TlsConfig::for_client(Arc::new(config))
    }

    #[test]
    fn dialing_without_tls_config_fails() {
        let dialer = TlsTcp
            .new_dialer("127.0.0.1:50396", (48, 49), &TransportOptions::default())
            .unwrap();
        assert_eq!(Error::TlsNoConfig, dialer.dial().unwrap_err());
    }

    #[test]
    fn listening_without_tls_config_fails() {
        let listener = TlsTcp
            .new_listener("127.0.0.1:50395", (49, 48), &TransportOptions::default())
            .unwrap();
        assert_eq!(Error::TlsNoConfig, listener.listen().unwrap_err());
    }

    #[test]
    fn listening_with_a_client_only_config_reports_missing_certificate() {
        let opts = TransportOptions {
            tls: Some(client_only_config()),
            ..TransportOptions::default()
        };
        let listener = TlsTcp.new_listener("127.0.0.1:50394", (49, 48), &opts).unwrap();
        assert_eq!(Error::TlsNoCert, listener.listen().unwrap_err());
    }

    #[test]
    fn host_part_strips_the_port() {
        assert_eq!("example.org", host_part("example.org:4433"));
        assert_eq!("127.0.0.1", host_part("127.0.0.1:4433"));
        assert_eq!("example.org", host_part("example.org"));
    }
}
