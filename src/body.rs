use std::{
    io::{self, Cursor, Read},
    iter,
};

use serde::Serialize;

mod http_body;

pub use http_body::HttpBody;

#[derive(Default)]
pub struct Body(Option<BodyInner>);

#[derive(Default)]
enum BodyInner {
    #[default]
    Empty,
    Buffered(Vec<u8>),
    Iter(Box<dyn Iterator<Item = Vec<u8>> + Send>),
    Reader(Box<dyn Read + Send>, Option<usize>),
}

impl Body {
    pub fn empty() -> Self {
        Body(Some(BodyInner::Empty))
    }

    /// Serializes `value` into a buffered JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        serde_json::to_vec(value).map(Body::from)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_iter<I, T>(chunks: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        T: Into<Vec<u8>> + 'static,
    {
        Body(Some(BodyInner::Iter(Box::new(
            chunks.into_iter().map(|chunk| chunk.into()),
        ))))
    }

    pub fn from_reader<T: Into<Option<usize>>>(
        reader: impl Read + Send + 'static,
        length: T,
    ) -> Self {
        Body(Some(BodyInner::Reader(Box::new(reader), length.into())))
    }

    /// Drops the body without draining what is left of it from the wire. Only
    /// sound when the connection is about to be closed.
    pub(crate) fn abandon(mut self) {
        drop(self.0.take());
    }

    fn take(&mut self) -> BodyInner {
        self.0.take().unwrap_or_default()
    }
}

impl HttpBody for Body {
    type BodyReader = BodyReader;
    type Chunks = BodyChunkIterator;

    fn len(&self) -> Option<u64> {
        match &self.0 {
            Some(BodyInner::Empty) => Some(0),
            Some(BodyInner::Buffered(bytes)) => Some(bytes.len() as u64),
            Some(BodyInner::Iter(_)) => None,
            Some(BodyInner::Reader(_, Some(len))) => Some(*len as u64),
            Some(BodyInner::Reader(_, None)) => None,
            None => Some(0),
        }
    }

    fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        match self.take() {
            BodyInner::Empty => Ok(Vec::new()),
            BodyInner::Buffered(bytes) => Ok(bytes),
            BodyInner::Iter(chunks) => Ok(chunks.flatten().collect()),
            BodyInner::Reader(stream, Some(len)) => {
                let mut buf = Vec::with_capacity(len.min(64 * 1024));
                stream.take(len as u64).read_to_end(&mut buf)?;
                if buf.len() < len {
                    return Err(io::ErrorKind::UnexpectedEof.into());
                }
                Ok(buf)
            }
            BodyInner::Reader(mut stream, None) => {
                let mut buf = Vec::with_capacity(8 * 1024);
                stream.read_to_end(&mut buf)?;
                Ok(buf)
            }
        }
    }

    fn into_reader(mut self) -> BodyReader {
        match self.take() {
            BodyInner::Empty => BodyReader(BodyReaderInner::Buffered(Cursor::new(Vec::new()))),
            BodyInner::Buffered(bytes) => BodyReader(BodyReaderInner::Buffered(Cursor::new(bytes))),
            BodyInner::Iter(mut chunks) => {
                let cursor = chunks.next().map(Cursor::new);
                BodyReader(BodyReaderInner::Iter(chunks, cursor))
            }
            BodyInner::Reader(stream, Some(len)) => {
                BodyReader(BodyReaderInner::Reader(Box::new(stream.take(len as u64))))
            }
            BodyInner::Reader(stream, None) => BodyReader(BodyReaderInner::Reader(stream)),
        }
    }

    fn into_chunks(mut self) -> BodyChunkIterator {
        match self.take() {
            BodyInner::Empty => BodyChunkIterator(None),
            BodyInner::Buffered(bytes) => {
                BodyChunkIterator(Some(BodyChunkIterInner::Single(bytes)))
            }
            BodyInner::Iter(chunks) => BodyChunkIterator(Some(BodyChunkIterInner::Iter(chunks))),
            BodyInner::Reader(reader, len) => {
                BodyChunkIterator(Some(BodyChunkIterInner::Reader(reader, len)))
            }
        }
    }
}

// Unread request bodies must be drained, otherwise the next pipelined request
// would be parsed from the middle of this one.
impl Drop for Body {
    fn drop(&mut self) {
        let drained = match self.0.take() {
            Some(BodyInner::Reader(stream, Some(len))) => {
                io::copy(&mut stream.take(len as u64), &mut io::sink())
            }
            Some(BodyInner::Reader(mut stream, None)) => io::copy(&mut stream, &mut io::sink()),
            Some(BodyInner::Iter(chunks)) => {
                chunks.for_each(drop);
                Ok(0)
            }
            _ => Ok(0),
        };

        if let Err(err) = drained {
            tracing::debug!(error = %err, "failed to drain request body");
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(body: Vec<u8>) -> Self {
        Body(Some(BodyInner::Buffered(body)))
    }
}

impl From<&[u8]> for Body {
    fn from(body: &[u8]) -> Self {
        body.to_vec().into()
    }
}

impl From<&str> for Body {
    fn from(body: &str) -> Self {
        body.as_bytes().to_vec().into()
    }
}

impl From<String> for Body {
    fn from(body: String) -> Self {
        body.into_bytes().into()
    }
}

pub struct BodyReader(BodyReaderInner);

enum BodyReaderInner {
    Buffered(Cursor<Vec<u8>>),
    Iter(
        Box<dyn Iterator<Item = Vec<u8>> + Send>,
        Option<Cursor<Vec<u8>>>,
    ),
    Reader(Box<dyn Read + Send>),
}

impl Read for BodyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0 {
            BodyReaderInner::Buffered(ref mut cursor) => cursor.read(buf),
            BodyReaderInner::Reader(ref mut reader) => reader.read(buf),
            BodyReaderInner::Iter(ref mut iter, ref mut leftover) => {
                while let Some(ref mut cursor) = leftover {
                    let read = cursor.read(buf)?;
                    if read > 0 {
                        return Ok(read);
                    }
                    *leftover = iter.next().map(Cursor::new);
                }
                Ok(0)
            }
        }
    }
}

pub struct BodyChunkIterator(Option<BodyChunkIterInner>);

enum BodyChunkIterInner {
    Single(Vec<u8>),
    Iter(Box<dyn Iterator<Item = Vec<u8>> + Send>),
    Reader(Box<dyn Read + Send>, Option<usize>),
}

impl Iterator for BodyChunkIterator {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.0.take()? {
            BodyChunkIterInner::Single(bytes) => Some(bytes),
            BodyChunkIterInner::Iter(mut iter) => {
                let item = iter.next()?;
                self.0 = Some(BodyChunkIterInner::Iter(iter));
                Some(item)
            }
            BodyChunkIterInner::Reader(reader, Some(len)) => {
                let mut buf = Vec::with_capacity(len.min(64 * 1024));
                reader.take(len as u64).read_to_end(&mut buf).ok()?;
                Some(buf)
            }
            BodyChunkIterInner::Reader(mut reader, None) => {
                let mut buf = vec![0_u8; 8 * 1024];
                match reader.read(&mut buf).ok()? {
                    0 => None,
                    bytes => {
                        self.0 = Some(BodyChunkIterInner::Reader(reader, None));
                        buf.truncate(bytes);
                        Some(buf)
                    }
                }
            }
        }
    }
}

impl iter::FusedIterator for BodyChunkIterator {}
