//! Startup configuration.
//!
//! Every setting is a command line flag with an environment fallback. Values
//! are read once when the process starts; nothing here can change while the
//! server is running.

use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::{
    gate::{AdmissionGate, Boundary, DEFAULT_THRESHOLD},
    load_test::LoadTest,
};

/// Ping/pong HTTP server with a GET admission gate.
#[derive(Parser, Debug, Clone)]
#[command(name = "pingpong", version)]
pub struct Config {
    /// Address to listen on.
    #[arg(long, env = "PINGPONG_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on (0 = OS-assigned).
    #[arg(long, env = "PINGPONG_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Number of GET requests served before every further GET gets a 429.
    #[arg(long, env = "PINGPONG_THRESHOLD", default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: u64,

    /// Reject only once the counter is strictly above the threshold, which
    /// serves one extra GET request.
    #[arg(long, env = "PINGPONG_LEGACY_BOUNDARY")]
    pub legacy_boundary: bool,

    /// Size of the connection worker pool.
    #[arg(long, env = "PINGPONG_MAX_THREADS", default_value_t = 512)]
    pub max_threads: usize,

    /// Largest request body accepted, in bytes.
    #[arg(long, env = "PINGPONG_MAX_BODY_BYTES", default_value_t = 1024 * 1024)]
    pub max_body_bytes: u64,

    /// Seconds an idle keep-alive connection is held open (0 = no limit).
    #[arg(long, env = "PINGPONG_KEEP_ALIVE_SECS", default_value_t = 5)]
    pub keep_alive_secs: u64,

    /// Enable debug logging.
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send concurrent GET requests to a running server and report how many
    /// were served and how many were rejected.
    LoadTest(LoadTest),
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn boundary(&self) -> Boundary {
        if self.legacy_boundary {
            Boundary::Legacy
        } else {
            Boundary::Exact
        }
    }

    pub fn keep_alive(&self) -> Option<Duration> {
        match self.keep_alive_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn admission_gate(&self) -> AdmissionGate {
        AdmissionGate::with_boundary(self.threshold, self.boundary())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            threshold: DEFAULT_THRESHOLD,
            legacy_boundary: false,
            max_threads: 512,
            max_body_bytes: 1024 * 1024,
            keep_alive_secs: 5,
            verbose: false,
            command: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_server() {
        let config = Config::try_parse_from(["pingpong"]).unwrap();

        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
        assert_eq!(config.threshold, 100);
        assert_eq!(config.boundary(), Boundary::Exact);
        assert_eq!(config.keep_alive(), Some(Duration::from_secs(5)));
        assert!(!config.verbose);
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "pingpong",
            "--host",
            "127.0.0.1",
            "--port",
            "0",
            "--threshold",
            "3",
            "--legacy-boundary",
            "--max-body-bytes",
            "64",
            "--keep-alive-secs",
            "0",
        ])
        .unwrap();

        assert_eq!(config.bind_addr(), "127.0.0.1:0");
        assert_eq!(config.max_body_bytes, 64);
        assert_eq!(config.keep_alive(), None);

        let gate = config.admission_gate();
        assert_eq!(gate.threshold(), 3);
        assert_eq!(gate.boundary(), Boundary::Legacy);
    }

    #[test]
    fn parses_the_load_test_command() {
        let config = Config::try_parse_from([
            "pingpong",
            "load-test",
            "--target",
            "127.0.0.1:8080",
            "--requests",
            "50",
            "--verbose",
        ])
        .unwrap();

        assert!(config.verbose);
        assert_eq!(
            config.command,
            Some(Command::LoadTest(LoadTest {
                target: "127.0.0.1:8080".to_owned(),
                requests: 50,
                concurrency: 16,
            }))
        );
    }

    #[test]
    fn serves_without_a_command() {
        assert_eq!(Config::try_parse_from(["pingpong"]).unwrap().command, None);
    }

    #[test]
    fn rejects_negative_threshold() {
        assert!(Config::try_parse_from(["pingpong", "--threshold", "-1"]).is_err());
    }
}
