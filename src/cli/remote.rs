//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Mail Archiver.
//
// Mail Archiver is free software: you can redistribute it and/or modify it
// under the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mail Archiver is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along with
// Mail Archiver. If not, see <http://www.gnu.org/licenses/>.

//! The production `Transport`: IMAP over TLS (or plaintext, for testing).

use std::io::{self, Read, Write};
use std::net::TcpStream;

use log::{debug, info};
use openssl::ssl::{SslConnector, SslMethod, SslStream, SslVerifyMode};

use crate::archive::transport::{
    Connector, FolderListing, RemoteId, Transport, TransportError,
};
use crate::support::archive_config::ServerConfig;

#[derive(Debug)]
pub enum Stream {
    Plain(TcpStream),
    Tls(SslStream<TcpStream>),
}

impl Read for Stream {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        match *self {
            Stream::Plain(ref mut s) => s.read(dst),
            Stream::Tls(ref mut s) => s.read(dst),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, src: &[u8]) -> io::Result<usize> {
        match *self {
            Stream::Plain(ref mut s) => s.write(src),
            Stream::Tls(ref mut s) => s.write(src),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match *self {
            Stream::Plain(ref mut s) => s.flush(),
            Stream::Tls(ref mut s) => s.flush(),
        }
    }
}

pub struct ImapConnector {
    server: ServerConfig,
    password: String,
    trace: bool,
}

impl ImapConnector {
    pub fn new(server: ServerConfig, password: String, trace: bool) -> Self {
        ImapConnector {
            server,
            password,
            trace,
        }
    }

    fn open_stream(&self) -> Result<Stream, TransportError> {
        let address = (&self.server.host as &str, self.server.port);
        if self.trace {
            eprintln!("Opening connection to {}:{}", address.0, address.1);
        }

        let tcp_stream = TcpStream::connect(address)
            .map_err(|e| TransportError::Aborted(e.to_string()))?;
        if !self.server.tls {
            return Ok(Stream::Plain(tcp_stream));
        }

        if self.trace {
            eprintln!("Starting TLS handshake");
        }

        let mut connector = SslConnector::builder(SslMethod::tls())
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        if self.server.allow_insecure_tls_connections {
            connector.set_verify(SslVerifyMode::NONE);
        }

        let ssl_stream = connector
            .build()
            .connect(&self.server.host, tcp_stream)
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        Ok(Stream::Tls(ssl_stream))
    }
}

impl Connector for ImapConnector {
    type Transport = ImapTransport;

    fn connect(&mut self) -> Result<ImapTransport, TransportError> {
        let mut client = imap::Client::new(self.open_stream()?);
        client.debug = self.trace;
        client.read_greeting().map_err(transport_error)?;

        let mut session = client
            .login(&self.server.user, &self.password)
            .map_err(|(e, _)| match e {
                imap::error::Error::No(msg) | imap::error::Error::Bad(msg) => {
                    TransportError::Auth(msg)
                },
                e => transport_error(e),
            })?;
        info!("Logged in to {} as {}", self.server.host, self.server.user);

        // Without this, folder names are in modified UTF-7, which the
        // catalog copes with too.
        if let Err(e) = session.run_command_and_check_ok("ENABLE UTF8=ACCEPT")
        {
            debug!("Server did not enable UTF8=ACCEPT: {}", e);
        }

        Ok(ImapTransport {
            session,
            examined: None,
        })
    }
}

pub struct ImapTransport {
    session: imap::Session<Stream>,
    /// The folder currently open (read-only).
    examined: Option<String>,
}

impl ImapTransport {
    fn examine(&mut self, folder: &str) -> Result<(), TransportError> {
        if self.examined.as_deref() == Some(folder) {
            return Ok(());
        }

        self.examined = None;
        match self.session.examine(folder) {
            Ok(mailbox) => {
                debug!("{}: {} messages", folder, mailbox.exists);
                self.examined = Some(folder.to_owned());
                Ok(())
            },
            Err(imap::error::Error::No(msg)) => Err(
                TransportError::NoSuchFolder(format!("{}: {}", folder, msg)),
            ),
            Err(e) => Err(transport_error(e)),
        }
    }
}

impl Transport for ImapTransport {
    fn list_folders(&mut self) -> Result<FolderListing, TransportError> {
        let names = self
            .session
            .list(Some(""), Some("*"))
            .map_err(transport_error)?;

        let mut listing = FolderListing::default();
        for name in names.iter() {
            if listing.separator.is_empty() {
                if let Some(delimiter) = name.delimiter() {
                    listing.separator = delimiter.to_owned();
                }
            }
            listing.folders.push(name.name().to_owned());
        }

        Ok(listing)
    }

    fn list_message_ids(
        &mut self,
        folder: &str,
    ) -> Result<Vec<RemoteId>, TransportError> {
        self.examine(folder)?;
        let mut ids: Vec<RemoteId> = self
            .session
            .search("ALL")
            .map_err(transport_error)?
            .into_iter()
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn fetch_raw(
        &mut self,
        folder: &str,
        id: RemoteId,
    ) -> Result<Vec<u8>, TransportError> {
        self.examine(folder)?;
        let fetches = self
            .session
            .fetch(id.to_string(), "RFC822")
            .map_err(transport_error)?;

        fetches
            .iter()
            .filter_map(|fetch| fetch.body())
            .next()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                TransportError::Rejected(format!(
                    "{}: no content returned for message {}",
                    folder, id
                ))
            })
    }
}

impl Drop for ImapTransport {
    fn drop(&mut self) {
        let _ = self.session.logout();
    }
}

fn transport_error(e: imap::error::Error) -> TransportError {
    use imap::error::Error as E;

    match e {
        E::Io(e) => TransportError::Aborted(e.to_string()),
        E::ConnectionLost => {
            TransportError::Aborted("connection lost".to_owned())
        },
        // The connection is in an unknown state after a response we could
        // not understand
        E::Parse(e) => TransportError::Aborted(e.to_string()),
        E::No(msg) | E::Bad(msg) => TransportError::Rejected(msg),
        e => TransportError::Rejected(e.to_string()),
    }
}
