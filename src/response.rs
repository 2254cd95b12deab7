use std::io::{self, Write};

use headers::HeaderMapExt;
use http::{header, Response, StatusCode, Version};

use crate::body::HttpBody;

/// How a message body is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Encoding {
    FixedLength(u64),
    Chunked,
    CloseDelimited,
}

/// What the connection should do once a response has been written.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    KeepAlive,
    Close,
}

pub(crate) fn write_response<B: HttpBody>(
    res: Response<B>,
    stream: &mut impl Write,
) -> io::Result<Outcome> {
    write(res, stream, true)
}

/// Writes the head of `res` only, as the answer to a HEAD request.
pub(crate) fn write_head_response<B: HttpBody>(
    res: Response<B>,
    stream: &mut impl Write,
) -> io::Result<Outcome> {
    write(res, stream, false)
}

fn write<B: HttpBody>(
    res: Response<B>,
    stream: &mut impl Write,
    with_body: bool,
) -> io::Result<Outcome> {
    let (mut parts, body) = res.into_parts();

    let asks_for_close = parts
        .headers
        .typed_get::<headers::Connection>()
        .filter(|conn| conn.contains("close"))
        .is_some();

    // Informational and 204/304 responses never carry a body.
    let bodyless = parts.status.is_informational()
        || parts.status == StatusCode::NO_CONTENT
        || parts.status == StatusCode::NOT_MODIFIED;

    let encoding = if bodyless {
        Encoding::FixedLength(0)
    } else if let Some(len) = body.len() {
        parts
            .headers
            .typed_insert::<headers::ContentLength>(headers::ContentLength(len));
        Encoding::FixedLength(len)
    } else if parts.version == Version::HTTP_11 {
        parts
            .headers
            .typed_insert::<headers::TransferEncoding>(headers::TransferEncoding::chunked());
        Encoding::Chunked
    } else {
        parts
            .headers
            .insert(header::CONNECTION, header::HeaderValue::from_static("close"));
        Encoding::CloseDelimited
    };

    let version = match parts.version {
        Version::HTTP_10 => "HTTP/1.0",
        _ => "HTTP/1.1",
    };

    stream.write_all(format!("{version} {}\r\n", parts.status).as_bytes())?;

    for (name, val) in parts.headers.iter() {
        stream.write_all(&[name.as_str().as_bytes(), b": ", val.as_bytes(), b"\r\n"].concat())?;
    }

    stream.write_all(b"\r\n")?;

    match encoding {
        _ if !with_body => {}
        Encoding::FixedLength(0) => {}
        // Just buffer small bodies
        Encoding::FixedLength(len) if len < 1024 => {
            stream.write_all(&body.into_bytes()?)?;
        }
        Encoding::FixedLength(_) | Encoding::CloseDelimited => {
            io::copy(&mut body.into_reader(), stream)?;
        }
        Encoding::Chunked => {
            for chunk in body.into_chunks().filter(|chunk| !chunk.is_empty()) {
                stream.write_all(format!("{:x}\r\n", chunk.len()).as_bytes())?;
                stream.write_all(&chunk)?;
                stream.write_all(b"\r\n")?;
            }
            stream.write_all(b"0\r\n\r\n")?;
        }
    }

    if asks_for_close || encoding == Encoding::CloseDelimited {
        Ok(Outcome::Close)
    } else {
        Ok(Outcome::KeepAlive)
    }
}
