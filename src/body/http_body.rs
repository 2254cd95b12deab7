use std::{
    io::{self, Cursor, Read},
    iter,
};

/// Anything that can be written out as an HTTP message body.
pub trait HttpBody: Sized {
    type BodyReader: Read;
    type Chunks: Iterator<Item = Vec<u8>>;

    /// The exact length of the body, when it is known upfront.
    fn len(&self) -> Option<u64>;

    fn is_empty(&self) -> bool {
        matches!(self.len(), Some(0))
    }

    fn into_reader(self) -> Self::BodyReader;

    fn into_chunks(self) -> Self::Chunks;

    fn into_bytes(self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(1024);
        self.into_reader().read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Buffers the whole body, giving up with `Ok(None)` as soon as it turns
    /// out to be longer than `limit` bytes.
    /// A body that ends before its announced length is an `UnexpectedEof`.
    fn into_bytes_within(self, limit: u64) -> io::Result<Option<Vec<u8>>> {
        let announced = self.len();
        if matches!(announced, Some(len) if len > limit) {
            return Ok(None);
        }

        let mut buf = Vec::with_capacity(1024);
        self.into_reader()
            .take(limit.saturating_add(1))
            .read_to_end(&mut buf)?;

        let read = buf.len() as u64;
        if read > limit {
            Ok(None)
        } else if matches!(announced, Some(len) if read < len) {
            Err(io::ErrorKind::UnexpectedEof.into())
        } else {
            Ok(Some(buf))
        }
    }
}

impl HttpBody for () {
    type BodyReader = io::Empty;
    type Chunks = iter::Empty<Vec<u8>>;

    fn len(&self) -> Option<u64> {
        Some(0)
    }

    fn into_reader(self) -> Self::BodyReader {
        io::empty()
    }

    fn into_bytes(self) -> io::Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn into_chunks(self) -> Self::Chunks {
        iter::empty()
    }
}

impl HttpBody for String {
    type BodyReader = Cursor<Vec<u8>>;
    type Chunks = iter::Once<Vec<u8>>;

    fn len(&self) -> Option<u64> {
        String::len(self).try_into().ok()
    }

    fn into_reader(self) -> Self::BodyReader {
        Cursor::new(String::into_bytes(self))
    }

    fn into_bytes(self) -> io::Result<Vec<u8>> {
        Ok(String::into_bytes(self))
    }

    fn into_chunks(self) -> Self::Chunks {
        iter::once(String::into_bytes(self))
    }
}

impl HttpBody for &'static str {
    type BodyReader = &'static [u8];
    type Chunks = iter::Once<Vec<u8>>;

    fn len(&self) -> Option<u64> {
        str::len(self).try_into().ok()
    }

    fn into_reader(self) -> Self::BodyReader {
        self.as_bytes()
    }

    fn into_bytes(self) -> io::Result<Vec<u8>> {
        Ok(self.as_bytes().to_vec())
    }

    fn into_chunks(self) -> Self::Chunks {
        iter::once(self.as_bytes().to_vec())
    }
}

impl HttpBody for Vec<u8> {
    type BodyReader = Cursor<Vec<u8>>;
    type Chunks = iter::Once<Vec<u8>>;

    fn len(&self) -> Option<u64> {
        Vec::len(self).try_into().ok()
    }

    fn into_reader(self) -> Self::BodyReader {
        Cursor::new(self)
    }

    fn into_bytes(self) -> io::Result<Vec<u8>> {
        Ok(self)
    }

    fn into_chunks(self) -> Self::Chunks {
        iter::once(self)
    }
}
