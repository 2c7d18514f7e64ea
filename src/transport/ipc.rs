// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! IPC transport over Unix domain sockets. The wire format matches the
//! reference implementation: every frame carries a leading `0x01` byte in
//! front of the length word.

use std::collections::HashMap;
use std::fs;
use std::net::Shutdown;
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::pipe::{ConnPipe, Pipe, PortProperty, PROP_LOCAL_ADDR, PROP_REMOTE_ADDR};
use crate::transport::{PipeDialer, PipeListener, Transport, TransportOptions};
use crate::util::lock;

pub struct Ipc;

impl Transport for Ipc {
    fn scheme(&self) -> &'static str {
        "ipc"
    }

    fn new_dialer(
        &self,
        addr: &str,
        proto_ids: (u16, u16),
        _opts: &TransportOptions,
    ) -> Result<Box<dyn PipeDialer>> {
        Ok(Box::new(IpcDialer {
            path: addr.to_owned(),
            proto_ids,
        }))
    }

    fn new_listener(
        &self,
        addr: &str,
        proto_ids: (u16, u16),
        _opts: &TransportOptions,
    ) -> Result<Box<dyn PipeListener>> {
        Ok(Box::new(IpcAcceptor {
            path: addr.to_owned(),
            proto_ids,
            listener: Mutex::new(None),
            closed: AtomicBool::new(false),
        }))
    }
}

fn pipe_over(stream: UnixStream, path: &str, proto_ids: (u16, u16)) -> Result<Box<dyn Pipe>> {
    let mut props = HashMap::new();
    props.insert(PROP_LOCAL_ADDR.to_owned(), PortProperty::Addr(path.to_owned()));
    props.insert(PROP_REMOTE_ADDR.to_owned(), PortProperty::Addr(path.to_owned()));

    let reader = stream.try_clone()?;
    let shut = stream.try_clone()?;
    let pipe = ConnPipe::connect(
        Box::new(reader),
        Box::new(stream),
        Box::new(move || shut.shutdown(Shutdown::Both)),
        proto_ids,
        props,
        true,
    )?;
    Ok(Box::new(pipe))
}

struct IpcDialer {
    path: String,
    proto_ids: (u16, u16),
}

impl PipeDialer for IpcDialer {
    fn dial(&self) -> Result<Box<dyn Pipe>> {
        let stream = UnixStream::connect(&self.path)?;
        pipe_over(stream, &self.path, self.proto_ids)
    }
}

struct IpcAcceptor {
    path: String,
    proto_ids: (u16, u16),
    listener: Mutex<Option<Arc<UnixListener>>>,
    closed: AtomicBool,
}

impl PipeListener for IpcAcceptor {
    fn listen(&self) -> Result<()> {
        // The filesystem name belongs to whoever binds it; a stale socket
        // file left behind by a dead process would otherwise wedge the
        // address forever.
        let _ = fs::remove_file(&self.path);
        let listener = UnixListener::bind(&self.path)?;
        *lock(&self.listener) = Some(Arc::new(listener));
        Ok(())
    }

    fn accept(&self) -> Result<Box<dyn Pipe>> {
        let listener = match lock(&self.listener).clone() {
            Some(listener) => listener,
            None => return Err(Error::Closed),
        };
        match listener.accept() {
            Ok((stream, _)) => pipe_over(stream, &self.path, self.proto_ids),
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
        let _ = fs::remove_file(&self.path);
    }
}
