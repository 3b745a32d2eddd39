//! Redis pub/sub emitter.
//!
//! One dedicated connection is owned by a receive thread. Subscribe and
//! unsubscribe requests are sent to that thread as commands and acknowledged
//! over a reply channel. While it waits for a broker ack the connection reads
//! with the operation timeout; otherwise it reads with the short poll
//! interval so queued commands are picked up promptly. Incoming messages are
//! handed to the [`ChannelDispatcher`].
//!
//! When the connection drops, the thread reconnects with backoff and
//! re-subscribes every channel that still has an open route.

use super::{ChannelDispatcher, DeliveryCallback, ValueEmitter};
use crate::config::FeedConfig;
use crate::error::{FeedError, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use redis::{Connection, PubSub, RedisError, RedisResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const RECONNECT_INITIAL: Duration = Duration::from_millis(100);
const RECONNECT_MAX: Duration = Duration::from_secs(5);

enum Command {
    Subscribe {
        channel: String,
        reply: Sender<Result<()>>,
    },
    Unsubscribe {
        channel: String,
        reply: Sender<Result<()>>,
    },
    Shutdown,
}

impl Command {
    /// Answer a request that cannot reach the broker.
    fn reject(self, reason: &str) {
        match self {
            Command::Subscribe { reply, .. } | Command::Unsubscribe { reply, .. } => {
                let _ = reply.send(Err(FeedError::Transport(reason.to_string())));
            }
            Command::Shutdown => {}
        }
    }
}

/// Broker endpoint and the timeouts the receive thread reads with.
struct Link {
    client: redis::Client,
    connect_timeout: Duration,
    operation_timeout: Duration,
    poll_interval: Duration,
}

impl Link {
    fn open(&self) -> RedisResult<Connection> {
        let connection = self
            .client
            .get_connection_with_timeout(self.connect_timeout)?;
        connection.set_read_timeout(Some(self.poll_interval))?;
        Ok(connection)
    }
}

/// Why a connection session ended.
enum SessionEnd {
    Stopped,
    Dropped,
}

/// State shared between the emitter handle and its receive thread.
struct Shared {
    dispatcher: Arc<ChannelDispatcher>,
    running: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
}

pub struct RedisValueEmitter {
    url: String,
    commands: Sender<Command>,
    dispatcher: Arc<ChannelDispatcher>,
    operation_timeout: Duration,
    running: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RedisValueEmitter {
    /// Connect to the broker and start the receive thread.
    ///
    /// Fails with [`FeedError::Connect`] if the connection cannot be made
    /// within `connect_timeout`. Later connection losses are retried in the
    /// background.
    pub fn connect(config: &FeedConfig) -> Result<Self> {
        let url = config.broker_url.clone();
        let connect_err = |reason: String| FeedError::Connect {
            url: url.clone(),
            reason,
        };

        let client = redis::Client::open(url.as_str()).map_err(|e| connect_err(e.to_string()))?;
        let link = Link {
            client,
            connect_timeout: config.connect_timeout,
            operation_timeout: config.operation_timeout,
            poll_interval: config.poll_interval,
        };
        let connection = link.open().map_err(|e| connect_err(e.to_string()))?;

        let (commands, command_rx) = unbounded();
        let dispatcher = Arc::new(ChannelDispatcher::new(config.delivery_buffer));
        let running = Arc::new(AtomicBool::new(true));
        let connected = Arc::new(AtomicBool::new(true));

        let worker = {
            let shared = Shared {
                dispatcher: Arc::clone(&dispatcher),
                running: Arc::clone(&running),
                connected: Arc::clone(&connected),
            };
            thread::Builder::new()
                .name("redis-pubsub".to_string())
                .spawn(move || receive_loop(link, connection, command_rx, shared))?
        };

        info!(url = %url, "connected to broker");

        Ok(Self {
            url,
            commands,
            dispatcher,
            operation_timeout: config.operation_timeout,
            running,
            connected,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Whether the receive thread is still alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether the broker connection is currently up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn dispatcher(&self) -> &ChannelDispatcher {
        &self.dispatcher
    }

    /// Stop the receive thread and drop every delivery route.
    pub fn close(&self) {
        self.running.store(false, Ordering::Release);
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                error!("redis receive thread panicked");
            }
        }
        self.dispatcher.close_all();
        info!(url = %self.url, "disconnected from broker");
    }

    fn request(
        &self,
        operation: &'static str,
        channel: &str,
        command: impl FnOnce(Sender<Result<()>>) -> Command,
    ) -> Result<()> {
        let (reply, ack) = bounded(1);
        self.commands
            .send(command(reply))
            .map_err(|_| FeedError::TransportClosed)?;

        match ack.recv_timeout(self.operation_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(FeedError::OperationTimeout {
                operation,
                channel: channel.to_string(),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(FeedError::TransportClosed),
        }
    }
}

impl ValueEmitter for RedisValueEmitter {
    fn subscribe(&self, channel: &str, callback: DeliveryCallback) -> Result<()> {
        // Route first so messages arriving right after the ack are not lost.
        self.dispatcher.open(channel, callback)?;

        let result = self.request("subscribe", channel, |reply| Command::Subscribe {
            channel: channel.to_string(),
            reply,
        });
        match &result {
            Ok(()) => info!(channel, "subscribed"),
            Err(_) => {
                self.dispatcher.close(channel);
            }
        }
        result
    }

    fn unsubscribe(&self, channel: &str) -> Result<()> {
        self.dispatcher.close(channel);

        let result = self.request("unsubscribe", channel, |reply| Command::Unsubscribe {
            channel: channel.to_string(),
            reply,
        });
        if result.is_ok() {
            info!(channel, "unsubscribed");
        }
        result
    }
}

impl Drop for RedisValueEmitter {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        let _ = self.commands.send(Command::Shutdown);
    }
}

fn receive_loop(link: Link, first: Connection, commands: Receiver<Command>, shared: Shared) {
    let mut connection = Some(first);
    let mut backoff = RECONNECT_INITIAL;

    while shared.running.load(Ordering::Acquire) {
        if let Some(mut live) = connection.take() {
            let end = run_session(&mut live, &link, &commands, &shared);
            shared.connected.store(false, Ordering::Release);
            match end {
                SessionEnd::Stopped => break,
                SessionEnd::Dropped => backoff = RECONNECT_INITIAL,
            }
        }

        if !wait_offline(&commands, backoff, &shared.running) {
            break;
        }
        match link.open() {
            Ok(live) => {
                info!("reconnected to broker");
                connection = Some(live);
            }
            Err(err) => {
                backoff = (backoff * 2).min(RECONNECT_MAX);
                warn!(error = %err, retry_ms = backoff.as_millis() as u64, "reconnect failed");
            }
        }
    }

    shared.running.store(false, Ordering::Release);
    debug!("receive loop stopped");
}

/// Serve one connection until shutdown or until the connection is lost.
fn run_session(
    connection: &mut Connection,
    link: &Link,
    commands: &Receiver<Command>,
    shared: &Shared,
) -> SessionEnd {
    let mut pubsub = connection.as_pubsub();

    for channel in shared.dispatcher.channels() {
        match acknowledged(&mut pubsub, link, |p| p.subscribe(channel.as_str())) {
            Ok(()) => debug!(channel = %channel, "resubscribed"),
            Err(err) => {
                warn!(channel = %channel, error = %err, "resubscribe failed, reconnecting");
                return SessionEnd::Dropped;
            }
        }
    }
    shared.connected.store(true, Ordering::Release);

    while shared.running.load(Ordering::Acquire) {
        loop {
            match commands.try_recv() {
                Ok(Command::Shutdown) | Err(TryRecvError::Disconnected) => {
                    return SessionEnd::Stopped;
                }
                Ok(command) => {
                    if !apply(&mut pubsub, link, command) {
                        return SessionEnd::Dropped;
                    }
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        match pubsub.get_message() {
            Ok(msg) => {
                shared
                    .dispatcher
                    .dispatch(msg.get_channel_name(), msg.get_payload_bytes().to_vec());
            }
            Err(err) if err.is_timeout() => {}
            Err(err) => {
                error!(error = %err, "broker connection lost");
                return SessionEnd::Dropped;
            }
        }
    }
    SessionEnd::Stopped
}

/// Run a broker request that waits for an ack, reading with the operation
/// timeout instead of the poll interval.
fn acknowledged<'a, F>(pubsub: &mut PubSub<'a>, link: &Link, request: F) -> RedisResult<()>
where
    F: FnOnce(&mut PubSub<'a>) -> RedisResult<()>,
{
    pubsub.set_read_timeout(Some(link.operation_timeout))?;
    let result = request(pubsub);
    let restored = pubsub.set_read_timeout(Some(link.poll_interval));
    result.and(restored)
}

/// Apply one command and reply to its caller.
///
/// Returns false if the connection can no longer be trusted.
fn apply(pubsub: &mut PubSub<'_>, link: &Link, command: Command) -> bool {
    let (operation, channel, reply, result) = match command {
        Command::Subscribe { channel, reply } => {
            let result = acknowledged(pubsub, link, |p| p.subscribe(channel.as_str()));
            ("subscribe", channel, reply, result)
        }
        Command::Unsubscribe { channel, reply } => {
            let result = acknowledged(pubsub, link, |p| p.unsubscribe(channel.as_str()));
            ("unsubscribe", channel, reply, result)
        }
        Command::Shutdown => return true,
    };

    let healthy = result.as_ref().err().map_or(true, |err| !is_fatal(err));
    let outcome = result.map_err(|err| {
        warn!(channel = %channel, operation, error = %err, "broker request failed");
        if err.is_timeout() {
            FeedError::OperationTimeout {
                operation,
                channel: channel.clone(),
            }
        } else {
            FeedError::from(err)
        }
    });
    let _ = reply.send(outcome);
    healthy
}

/// A non-timeout I/O failure leaves the connection in an unknown state.
fn is_fatal(err: &RedisError) -> bool {
    !err.is_timeout()
        && (err.is_connection_dropped() || err.is_unrecoverable_error() || err.is_io_error())
}

/// Sleep out a reconnect delay, rejecting requests meanwhile.
///
/// Returns false on shutdown.
fn wait_offline(commands: &Receiver<Command>, delay: Duration, running: &AtomicBool) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if !running.load(Ordering::Acquire) {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        match commands.recv_timeout(remaining) {
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => return false,
            Ok(command) => command.reject("broker connection lost, reconnecting"),
            Err(RecvTimeoutError::Timeout) => return true,
        }
    }
}
