// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::collections::HashMap;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::message::Message;
use crate::util::lock;

/// Frames larger than this are rejected outright, so a bogus peer cannot
/// make us allocate ridiculous amounts of memory.
pub const MAX_FRAME_SIZE: u64 = 1024 * 1024;

const BUFFER_SIZE: usize = 16 * 1024;

pub const PROP_LOCAL_ADDR: &str = "LOCAL-ADDR";
pub const PROP_REMOTE_ADDR: &str = "REMOTE-ADDR";
pub const PROP_TLS_STATE: &str = "TLS-STATE";

/// A read-only property exposed by a connected endpoint.
#[derive(Clone, Debug)]
pub enum PortProperty {
    Addr(String),
    TlsState(TlsState),
}

/// Details of a negotiated TLS session, available through the `TLS-STATE`
/// property on `tls+tcp` endpoints.
#[derive(Clone, Debug)]
pub struct TlsState {
    pub version: String,
    pub cipher_suite: String,
}

/// A full-duplex message conduit over one underlying connection.
///
/// Sends and receives may be issued concurrently from different tasks; each
/// direction is serialized independently. Within one pipe, message ordering
/// is preserved per direction.
pub trait Pipe: Send + Sync + std::fmt::Debug {
    /// Sends a complete message. On any failure the pipe is closed and the
    /// error returned.
    fn send_msg(&self, msg: &Message) -> Result<()>;

    /// Receives a complete message. On any failure, including an oversized
    /// frame, the pipe is closed and the error returned.
    fn recv_msg(&self) -> Result<Message>;

    /// Closes the underlying connection. Closing is idempotent.
    fn close(&self);

    /// True once the handshake completed and until the pipe closes.
    fn is_open(&self) -> bool;

    fn local_protocol(&self) -> u16;

    fn remote_protocol(&self) -> u16;

    /// Retrieves a transport specific read-only property.
    fn property(&self, name: &str) -> Result<PortProperty>;
}

type Closer = Box<dyn Fn() -> io::Result<()> + Send + Sync>;

/// `Pipe` implementation on top of any byte stream, meant as the building
/// block for stream oriented transports. Frames are an 8-byte big-endian
/// length followed by the combined header and body; the IPC flavor inserts
/// a leading `0x01` byte before each length for compatibility with the
/// reference implementation.
pub struct ConnPipe {
    reader: Mutex<BufReader<Box<dyn Read + Send>>>,
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    closer: Closer,
    props: HashMap<String, PortProperty>,
    proto_ids: (u16, u16),
    open: AtomicBool,
    ipc_framing: bool,
}

impl std::fmt::Debug for ConnPipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnPipe")
            .field("proto_ids", &self.proto_ids)
            .field("open", &self.open)
            .field("ipc_framing", &self.ipc_framing)
            .finish()
    }
}

impl ConnPipe {
    /// Wires up a pipe over the two halves of a connection and performs the
    /// SP handshake, returning the pipe only once the negotiation is
    /// complete. On a failed handshake the connection is closed.
    pub fn connect(
        reader: Box<dyn Read + Send>,
        writer: Box<dyn Write + Send>,
        closer: Closer,
        proto_ids: (u16, u16),
        props: HashMap<String, PortProperty>,
        ipc_framing: bool,
    ) -> Result<ConnPipe> {
        let pipe = ConnPipe {
            reader: Mutex::new(BufReader::with_capacity(BUFFER_SIZE, reader)),
            writer: Mutex::new(BufWriter::with_capacity(BUFFER_SIZE, writer)),
            closer,
            props,
            proto_ids,
            open: AtomicBool::new(false),
            ipc_framing,
        };

        if let Err(e) = pipe.handshake() {
            let _ = (pipe.closer)();
            return Err(e);
        }
        pipe.open.store(true, Ordering::Release);
        Ok(pipe)
    }

    /// Both sides send their header, then read and validate the peer's.
    /// The header is `0x00 'S' 'P' version proto[2] rsvd[2]`.
    fn handshake(&self) -> Result<()> {
        let mut header = [0u8; 8];
        header[1] = b'S';
        header[2] = b'P';
        BigEndian::write_u16(&mut header[4..6], self.proto_ids.0);
        {
            let mut writer = lock(&self.writer);
            writer.write_all(&header)?;
            writer.flush()?;
        }

        let mut peer = [0u8; 8];
        lock(&self.reader).read_exact(&mut peer)?;

        if peer[0] != 0 || peer[1] != b'S' || peer[2] != b'P' || peer[6] != 0 || peer[7] != 0 {
            error!("bad connection header received: {:?}", peer);
            return Err(Error::BadHeader);
        }
        if peer[3] != 0 {
            return Err(Error::BadVersion);
        }
        if BigEndian::read_u16(&peer[4..6]) != self.proto_ids.1 {
            return Err(Error::BadPeerProtocol);
        }
        debug!("handshake done, peer protocol {}", self.proto_ids.1);
        Ok(())
    }

    fn write_frame(&self, msg: &Message) -> Result<()> {
        let size = (msg.header.len() + msg.body.len()) as u64;
        let mut writer = lock(&self.writer);

        if self.ipc_framing {
            writer.write_u8(1)?;
        }
        writer.write_u64::<BigEndian>(size)?;
        writer.write_all(&msg.header)?;
        writer.write_all(&msg.body)?;
        writer.flush()?;
        Ok(())
    }

    fn read_frame(&self) -> Result<Message> {
        let mut reader = lock(&self.reader);

        if self.ipc_framing {
            let marker = reader.read_u8()?;
            if marker != 1 {
                return Err(Error::BadHeader);
            }
        }
        let size = reader.read_u64::<BigEndian>()?;
        if size > MAX_FRAME_SIZE {
            return Err(Error::TooLong);
        }

        let mut msg = Message::new(size as usize);
        msg.body.resize(size as usize, 0);
        reader.read_exact(&mut msg.body)?;
        Ok(msg)
    }
}

impl Pipe for ConnPipe {
    fn send_msg(&self, msg: &Message) -> Result<()> {
        let result = self.write_frame(msg);
        if result.is_err() {
            self.close();
        }
        result
    }

    fn recv_msg(&self) -> Result<Message> {
        let result = self.read_frame();
        if result.is_err() {
            self.close();
        }
        result
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
        let _ = (self.closer)();
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
        self.props.get(name).cloned().ok_or(Error::BadProperty)
    }
}
