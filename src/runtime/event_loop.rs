//! mio dispatch loop.
//!
//! Readiness-based model: one thread blocks in `poll` across every
//! connection, then drains each readable socket until `WouldBlock` (mio is
//! edge-triggered), reassembles lines and dispatches them in arrival order.
//!
//! ## Lifecycle
//!
//! ```text
//! NotStarted --run()--> setup handlers per connection --> Running
//! Running --error--> Err(..)        (I/O, peer close, handler failure)
//! Running --ShutdownHandle--> Ok(())
//! ```
//!
//! The loop has no other exit. A connection that reads end-of-stream has
//! its complete lines dispatched first, then ends the loop with
//! `PoolError::ConnectionClosed`.

use super::buffer::LineBuffer;
use super::error::PoolError;
use super::pool::{lock, ConnectionPool, WAKER_TOKEN};
use super::registry::{Event, SETUP_KEY};
use mio::{Events, Token};
use std::io;
use tracing::{debug, info, warn};

/// Minimum readiness events collected per poll.
const EVENTS_CAPACITY: usize = 64;

impl ConnectionPool {
    /// Run setup handlers, then dispatch incoming lines until an error or
    /// shutdown.
    ///
    /// Requires at least one handler under `"setup"`. Can only be started
    /// once per pool.
    pub fn run(&self) -> Result<(), PoolError> {
        if !self.registry.contains(SETUP_KEY) {
            return Err(PoolError::MissingSetupHandler);
        }
        let mut poll = lock(&self.poll).take().ok_or(PoolError::AlreadyRunning)?;

        info!(connections = self.len(), "Running connection setup");
        for index in 0..self.len() {
            self.invoke(SETUP_KEY, &Event::setup(index))?;
        }

        let mut buffers = self.line_buffers();
        let mut events = Events::with_capacity(EVENTS_CAPACITY.max(self.len() + 1));

        // Plaintext decrypted during a TLS handshake raises no readiness event.
        for (index, buffer) in buffers.iter_mut().enumerate() {
            self.service(index, buffer)?;
        }

        info!("Dispatch loop running");
        loop {
            if self.shutdown.is_requested() {
                info!("Shutdown requested, leaving dispatch loop");
                return Ok(());
            }

            if let Err(e) = poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(PoolError::Poll(e));
            }

            for event in events.iter() {
                match event.token() {
                    WAKER_TOKEN => {}
                    Token(index) => {
                        let buffer = buffers
                            .get_mut(index)
                            .ok_or(PoolError::UnknownConnection(index))?;
                        self.service(index, buffer)?;
                    }
                }
            }
        }
    }

    /// Drain one readable connection and dispatch its complete lines.
    fn service(&self, index: usize, buffer: &mut LineBuffer) -> Result<(), PoolError> {
        let outcome = lock(&self.connections[index].transport)
            .read_available(buffer)
            .map_err(|source| PoolError::Io { index, source })?;

        if outcome.bytes > 0 {
            debug!(index, bytes = outcome.bytes, pending = buffer.len(), "Read");
        }

        while let Some(line) = buffer.next_line() {
            self.dispatch_line(index, &line)?;
        }

        if let Some(discarded) = buffer.discard_oversized() {
            warn!(index, discarded, "Discarded oversized line");
        }

        if outcome.closed {
            warn!(index, "Connection closed by peer");
            return Err(PoolError::ConnectionClosed { index });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::pool::tests::{connections, loopback, recorder, Log};
    use crate::runtime::registry::WILDCARD_KEY;
    use crate::runtime::PoolConfig;
    use std::io::{BufRead, BufReader, Write};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_run_requires_setup_handler() {
        let (mut pool, _peers) = loopback(connections(1));
        pool.on("ping", |_pool, _event, _params| Ok(()));
        assert!(matches!(pool.run(), Err(PoolError::MissingSetupHandler)));
    }

    #[test]
    fn test_run_dispatches_in_order_then_reports_close() {
        let (mut pool, mut peers) = loopback(connections(1));
        let log = Log::default();
        pool.on(SETUP_KEY, recorder(&log, "setup"));
        pool.on(WILDCARD_KEY, recorder(&log, "wild"));
        pool.on("ping", recorder(&log, "ping"));
        pool.on("privmsg", recorder(&log, "privmsg"));

        let mut peer = peers.remove(0);
        peer.write_all(b"PING :abc\r\n\r\n:n!u@h PRIVMSG #t :hello  world\r\n:half")
            .unwrap();
        drop(peer);

        assert!(matches!(
            pool.run(),
            Err(PoolError::ConnectionClosed { index: 0 })
        ));
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "setup:setup",
                "wild:abc",
                "ping:abc",
                "wild:hello  world",
                "privmsg:hello  world",
            ]
        );
    }

    #[test]
    fn test_setup_runs_once_per_connection_in_order() {
        let (mut pool, peers) = loopback(connections(3));
        pool.on(SETUP_KEY, |pool, event, _params| {
            let nick = format!("bot{}", event.index);
            pool.send_to(event.index, &["NICK".into(), nick.into()])?;
            Ok(())
        });

        let pool = Arc::new(pool);
        let handle = pool.shutdown_handle();
        let runner = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.run())
        };

        for (index, peer) in peers.iter().enumerate() {
            let mut line = String::new();
            BufReader::new(peer).read_line(&mut line).unwrap();
            assert_eq!(line, format!("NICK bot{index}\r\n"));
        }

        handle.shutdown().unwrap();
        assert!(runner.join().unwrap().is_ok());
        assert!(matches!(pool.run(), Err(PoolError::AlreadyRunning)));
    }

    #[test]
    fn test_lines_split_across_reads_are_reassembled() {
        let (mut pool, mut peers) = loopback(connections(1));
        let log = Log::default();
        pool.on(SETUP_KEY, |_pool, _event, _params| Ok(()));
        pool.on("privmsg", recorder(&log, "privmsg"));

        let pool = Arc::new(pool);
        let runner = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.run())
        };

        let mut peer = peers.remove(0);
        peer.write_all(b"PRIVMSG #a :first ha").unwrap();
        peer.flush().unwrap();
        thread::sleep(Duration::from_millis(50));
        peer.write_all(b"lf\r\nPRIVMSG #a :second\r\n").unwrap();
        drop(peer);

        assert!(matches!(
            runner.join().unwrap(),
            Err(PoolError::ConnectionClosed { index: 0 })
        ));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["privmsg:first half", "privmsg:second"]
        );
    }

    #[test]
    fn test_oversized_line_split_across_reads_is_dropped_whole() {
        let (mut pool, mut peers) = loopback(PoolConfig {
            max_line_length: 16,
            ..connections(1)
        });
        let log = Log::default();
        pool.on(SETUP_KEY, |_pool, _event, _params| Ok(()));
        pool.on(WILDCARD_KEY, recorder(&log, "wild"));

        let pool = Arc::new(pool);
        let runner = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.run())
        };

        let mut peer = peers.remove(0);
        peer.write_all(b"PRIVMSG #a :xxxxxxxxxxxxxxxxxxxxxxxx").unwrap();
        peer.flush().unwrap();
        thread::sleep(Duration::from_millis(100));
        peer.write_all(b" QUIT :injected\r\nPING :after\r\n").unwrap();
        drop(peer);

        assert!(matches!(
            runner.join().unwrap(),
            Err(PoolError::ConnectionClosed { index: 0 })
        ));
        assert_eq!(*log.lock().unwrap(), vec!["wild:after"]);
    }

    #[test]
    fn test_lines_received_before_run_are_dispatched() {
        let (mut pool, mut peers) = loopback(connections(1));
        let log = Log::default();
        pool.on(SETUP_KEY, |_pool, _event, _params| Ok(()));
        pool.on("ping", recorder(&log, "ping"));
        pool.on("ping", |pool, _event, _params| {
            pool.shutdown_handle().shutdown()?;
            Ok(())
        });

        let mut peer = peers.remove(0);
        peer.write_all(b"PING :early\r\n").unwrap();
        peer.flush().unwrap();
        thread::sleep(Duration::from_millis(50));

        assert!(pool.run().is_ok());
        assert_eq!(*log.lock().unwrap(), vec!["ping:early"]);
    }

    #[test]
    fn test_shutdown_before_run_returns_immediately() {
        let (mut pool, _peers) = loopback(PoolConfig {
            connections: 1,
            ..PoolConfig::default()
        });
        pool.on(SETUP_KEY, |_pool, _event, _params| Ok(()));
        pool.shutdown_handle().shutdown().unwrap();
        assert!(pool.run().is_ok());
    }
}
