#![doc = include_str!("../README.md")]

pub mod body;
pub mod config;
mod connection;
pub mod gate;
mod read_queue;
mod request;
mod response;
pub mod router;
#[cfg(feature = "threadpool")]
pub mod server;

use std::{
    error::Error,
    io::{self, BufReader, BufWriter, Write},
};

pub use body::{Body, HttpBody};
pub use connection::Connection;
pub use gate::{Admission, AdmissionGate, Boundary};
use headers::{HeaderMapExt, HeaderValue};
pub use http::{header, Method, Request, Response, StatusCode, Uri, Version};
use read_queue::ReadQueue;
pub use request::ParseError;
use response::Outcome;
pub use router::PingPong;
#[cfg(feature = "threadpool")]
pub use server::Server;

type IncomingRequest = Request<Body>;

/// Maps [`Request`]s to [`Response`]s.
///
/// Plain functions and closures implement this trait, which covers most
/// needs:
///
/// ```no_run
/// # use std::convert::Infallible;
/// # use pingpong::{Body, Request, Response, Server, StatusCode};
/// fn app(_req: Request<Body>) -> Result<Response<&'static str>, Infallible> {
///     Ok(Response::builder().status(StatusCode::OK).body("pong").unwrap())
/// }
///
/// fn main() -> std::io::Result<()> {
///     Server::bind("0.0.0.0:3000")?.serve(app)
/// }
/// ```
///
/// Implement it by hand to answer `Expect: 100-continue` before the body is
/// sent, as [`PingPong`] does to refuse oversized uploads early.
pub trait App {
    type Body: HttpBody;
    type Error: Into<Box<dyn Error + Send + Sync>>;

    fn handle(&self, request: IncomingRequest) -> Result<Response<Self::Body>, Self::Error>;

    fn should_continue(&self, _: &IncomingRequest) -> StatusCode {
        StatusCode::CONTINUE
    }
}

impl<F, Body, Err> App for F
where
    F: Fn(IncomingRequest) -> Result<Response<Body>, Err>,
    F: Sync + Send,
    F: Clone,
    Body: HttpBody,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    type Body = Body;
    type Error = Err;

    fn handle(&self, request: IncomingRequest) -> Result<Response<Self::Body>, Self::Error> {
        self(request)
    }
}

fn bare_response(status: StatusCode) -> Response<()> {
    let mut res = Response::new(());
    *res.status_mut() = status;
    res
}

/// Serves every request arriving on `conn` until either side closes it.
pub(crate) fn serve<A: App>(conn: Connection, app: A) -> io::Result<()> {
    let mut read_queue = ReadQueue::new(BufReader::new(conn.try_clone()?));

    let mut reader = read_queue.enqueue();
    let mut writer = BufWriter::new(conn);

    loop {
        match request::parse_request(reader) {
            Ok(req) => {
                reader = read_queue.enqueue();

                let asks_for_close = req
                    .headers()
                    .typed_get::<headers::Connection>()
                    .filter(|conn| conn.contains("close"))
                    .is_some();

                let asks_for_keep_alive = req
                    .headers()
                    .typed_get::<headers::Connection>()
                    .filter(|conn| conn.contains("keep-alive"))
                    .is_some();

                let version = req.version();

                let demands_close = match version {
                    Version::HTTP_09 => true,
                    Version::HTTP_10 => !asks_for_keep_alive,
                    _ => asks_for_close,
                };

                let expects_continue = req
                    .headers()
                    .typed_get::<headers::Expect>()
                    .filter(|expect| expect == &headers::Expect::CONTINUE)
                    .is_some();

                if expects_continue {
                    match app.should_continue(&req) {
                        StatusCode::CONTINUE => {
                            let res = bare_response(StatusCode::CONTINUE);
                            response::write_response(res, &mut writer)?;
                            writer.flush()?;
                        }
                        status => {
                            tracing::debug!(%status, "refusing to continue");
                            let mut res = bare_response(status);
                            res.headers_mut()
                                .insert("connection", HeaderValue::from_static("close"));
                            response::write_response(res, &mut writer)?;
                            writer.flush()?;
                            req.into_body().abandon();
                            break;
                        }
                    };
                }

                let method = req.method().clone();
                let path = req.uri().path().to_owned();

                let mut res = app
                    .handle(req)
                    .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;

                tracing::debug!(%method, %path, status = %res.status(), "handled request");

                *res.version_mut() = version;

                if version == Version::HTTP_10 && !asks_for_keep_alive {
                    res.headers_mut()
                        .insert("connection", HeaderValue::from_static("close"));
                }

                let outcome = if method == Method::HEAD {
                    response::write_head_response(res, &mut writer)?
                } else {
                    response::write_response(res, &mut writer)?
                };

                match outcome {
                    Outcome::KeepAlive if demands_close => break,
                    Outcome::KeepAlive => writer.flush()?,
                    Outcome::Close => break,
                }
            }
            Err(ParseError::ConnectionClosed) => break,
            Err(err) if err.is_answerable() => {
                let mut res = bare_response(StatusCode::BAD_REQUEST);
                res.headers_mut()
                    .insert("connection", HeaderValue::from_static("close"));
                response::write_response(res, &mut writer)?;
                writer.flush()?;
                return Err(io::Error::new(io::ErrorKind::InvalidData, err));
            }
            Err(err) => return Err(io::Error::new(io::ErrorKind::Other, err)),
        }
    }

    writer.flush()
}
