use std::io::{self, BufRead, Read};

use headers::HeaderMapExt;
use http::{Method, Request, Version};
use thiserror::Error;

use crate::body::Body;

/// Upper bound for the request line plus headers.
const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Bodies shorter than this are read eagerly instead of streamed.
const BUFFERED_BODY_BYTES: u64 = 1024;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("connection closed")]
    ConnectionClosed,
    #[error("io error")]
    Io(#[from] io::Error),
    #[error("invalid request")]
    Invalid(#[from] httparse::Error),
    #[error("incomplete request")]
    IncompleteRequest,
    #[error("request head exceeds {} bytes", MAX_HEAD_BYTES)]
    HeadTooLarge,
    #[error("unsupported http version: {0}")]
    UnsupportedHttpVersion(u8),
    #[error("invalid Transfer-Encoding header")]
    InvalidTransferEncoding,
    #[error("invalid header")]
    InvalidHeader(#[from] headers::Error),
    #[error("failed to parse http request")]
    Unknown,
}

impl ParseError {
    /// Whether the peer should still be told about the failure. Transport
    /// failures leave nothing to answer on.
    pub(crate) fn is_answerable(&self) -> bool {
        !matches!(self, ParseError::ConnectionClosed | ParseError::Io(_))
    }
}

pub(crate) fn parse_request(
    mut stream: impl BufRead + Send + 'static,
) -> Result<Request<Body>, ParseError> {
    let mut buf = Vec::with_capacity(800);

    loop {
        if stream.read_until(b'\n', &mut buf)? == 0 {
            break;
        }

        if buf.len() > MAX_HEAD_BYTES {
            return Err(ParseError::HeadTooLarge);
        }

        match buf.as_slice() {
            [.., b'\r', b'\n', b'\r', b'\n'] => break,
            [.., b'\n', b'\n'] => break,
            _ => continue,
        }
    }

    if buf.is_empty() {
        return Err(ParseError::ConnectionClosed);
    }

    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut req = httparse::Request::new(&mut headers);
    req.parse(&buf)?;

    let method = req
        .method
        .map(|method| method.as_bytes())
        .ok_or(ParseError::IncompleteRequest)?;

    let path = req.path.ok_or(ParseError::IncompleteRequest)?;

    let version = match req.version.ok_or(ParseError::IncompleteRequest)? {
        0 => Version::HTTP_10,
        1 => Version::HTTP_11,
        version => return Err(ParseError::UnsupportedHttpVersion(version)),
    };

    let request = Request::builder()
        .method(Method::from_bytes(method).map_err(|_| ParseError::IncompleteRequest)?)
        .uri(path)
        .version(version);

    let request = req
        .headers
        .iter()
        .take_while(|header| **header != httparse::EMPTY_HEADER)
        .fold(request, |req, header| req.header(header.name, header.value));

    let headers = request.headers_ref().ok_or(ParseError::Unknown)?;

    let body = if let Some(encoding) = headers.typed_try_get::<headers::TransferEncoding>()? {
        if !encoding.is_chunked() {
            // https://datatracker.ietf.org/doc/html/rfc2616#section-3.6
            return Err(ParseError::InvalidTransferEncoding);
        }
        Body::from_reader(ChunkedReader::new(stream), None::<usize>)
    } else if let Some(len) = headers.typed_try_get::<headers::ContentLength>()? {
        // A client waiting for `100 Continue` has not sent its body yet.
        let expects_continue = headers
            .typed_get::<headers::Expect>()
            .filter(|expect| expect == &headers::Expect::CONTINUE)
            .is_some();

        if len.0 < BUFFERED_BODY_BYTES && !expects_continue {
            let mut buf = vec![0_u8; len.0 as usize];
            stream.read_exact(&mut buf)?;
            Body::from(buf)
        } else {
            Body::from_reader(stream, len.0 as usize)
        }
    } else {
        Body::empty()
    };

    request.body(body).map_err(|_| ParseError::Unknown)
}

/// Upper bound for a chunk-size line, extensions included.
const MAX_CHUNK_LINE_BYTES: u64 = 1024;

/// Decodes a chunked body as it arrives. Chunks are never buffered whole, so
/// the declared chunk size does not decide how much memory is used.
pub(crate) struct ChunkedReader {
    stream: Box<dyn BufRead + Send>,
    remaining: u64,
    done: bool,
}

impl ChunkedReader {
    pub(crate) fn new(stream: impl BufRead + Send + 'static) -> Self {
        ChunkedReader {
            stream: Box::new(stream),
            remaining: 0,
            done: false,
        }
    }

    fn read_line(&mut self, limit: u64, buf: &mut Vec<u8>) -> io::Result<()> {
        buf.clear();
        (&mut self.stream).take(limit).read_until(b'\n', buf)?;
        if buf.last() == Some(&b'\n') {
            Ok(())
        } else if buf.len() as u64 >= limit {
            Err(invalid_chunk("chunk line too long"))
        } else {
            Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "chunked body ended early",
            ))
        }
    }

    fn next_chunk_size(&mut self) -> io::Result<u64> {
        let mut line = Vec::new();
        self.read_line(MAX_CHUNK_LINE_BYTES, &mut line)?;

        match httparse::parse_chunk_size(&line) {
            Ok(httparse::Status::Complete((_, size))) => Ok(size),
            _ => Err(invalid_chunk("invalid chunk size")),
        }
    }

    fn skip_chunk_end(&mut self) -> io::Result<()> {
        let mut line = Vec::new();
        self.read_line(MAX_CHUNK_LINE_BYTES, &mut line)?;

        match line.as_slice() {
            b"\r\n" | b"\n" => Ok(()),
            _ => Err(invalid_chunk("missing CRLF after chunk")),
        }
    }

    // Trailers are read up to the closing empty line and ignored.
    fn skip_trailers(&mut self) -> io::Result<()> {
        let mut line = Vec::new();
        let mut budget = MAX_HEAD_BYTES as u64;

        loop {
            self.read_line(budget.max(1), &mut line)?;
            if line == b"\r\n" || line == b"\n" {
                return Ok(());
            }
            budget = budget.saturating_sub(line.len() as u64);
            if budget == 0 {
                return Err(invalid_chunk("trailers too large"));
            }
        }
    }
}

impl Read for ChunkedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.done {
            return Ok(0);
        }

        if self.remaining == 0 {
            match self.next_chunk_size()? {
                0 => {
                    self.skip_trailers()?;
                    self.done = true;
                    return Ok(0);
                }
                size => self.remaining = size,
            }
        }

        let max = usize::try_from(self.remaining).map_or(buf.len(), |rem| rem.min(buf.len()));
        let read = self.stream.read(&mut buf[..max])?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "chunked body ended early",
            ));
        }

        self.remaining -= read as u64;
        if self.remaining == 0 {
            self.skip_chunk_end()?;
        }

        Ok(read)
    }
}

fn invalid_chunk(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}
