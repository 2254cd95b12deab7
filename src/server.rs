use std::{
    io,
    net::{SocketAddr, TcpListener, ToSocketAddrs},
    time::Duration,
};

use threadpool::ThreadPool;

use crate::{config::Config, connection::Connection, serve, App};

/// Accepts TCP connections and serves each of them on a worker thread.
pub struct Server {
    thread_pool: ThreadPool,
    listener: TcpListener,
    keep_alive: Option<Duration>,
}

impl Server {
    /// Runs the accept loop forever, handing every connection a clone of `app`.
    pub fn serve<Handle>(self, app: Handle) -> io::Result<()>
    where
        Handle: App,
        Handle: Send + Clone + 'static,
    {
        for conn in self.listener.incoming() {
            let conn = match conn {
                Ok(conn) => Connection::from(conn),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to accept connection");
                    continue;
                }
            };

            if let Err(err) = conn.set_read_timeout(self.keep_alive) {
                tracing::debug!(error = %err, "failed to set read timeout");
                continue;
            }

            let app = app.clone();
            self.thread_pool.execute(move || {
                let span = tracing::debug_span!("connection", peer = ?conn.peer_addr());
                let _guard = span.enter();

                if let Err(err) = serve(conn, app) {
                    tracing::debug!(error = %err, "connection ended with an error");
                }
            });
        }

        Ok(())
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn builder() -> ServerBuilder {
        Default::default()
    }

    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Server> {
        Self::builder().try_bind(addr)
    }
}

pub struct ServerBuilder {
    max_threads: usize,
    keep_alive: Option<Duration>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            max_threads: 512,
            keep_alive: Some(Duration::from_secs(5)),
        }
    }
}

impl ServerBuilder {
    pub fn from_config(config: &Config) -> Self {
        Self::default()
            .max_threads(config.max_threads)
            .keep_alive(config.keep_alive())
    }

    pub fn max_threads(self, max_threads: usize) -> Self {
        Self {
            max_threads: max_threads.max(1),
            ..self
        }
    }

    /// How long an idle connection may wait for its next request.
    pub fn keep_alive(self, keep_alive: Option<Duration>) -> Self {
        Self { keep_alive, ..self }
    }

    pub fn try_bind<A: ToSocketAddrs>(self, addr: A) -> io::Result<Server> {
        let listener = TcpListener::bind(addr)?;

        Ok(Server {
            thread_pool: ThreadPool::new(self.max_threads),
            listener,
            keep_alive: self.keep_alive,
        })
    }
}
