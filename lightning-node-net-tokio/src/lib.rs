// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! A socket handling library for those running in Tokio environments who wish to drive
//! lightning-node peer connections over native [`TcpStream`]s or any other async byte stream.
//!
//! Designed to be as simple as possible, the high-level usage is "hand over a stream and our
//! node key, and get back a [`PeerHandle`]". [`setup_outbound`] and [`setup_inbound`] run the
//! BOLT 8 handshake and the `init` exchange, then spawn a task which owns the stream. Messages
//! pushed through [`PeerHandle::send_message`] are encrypted and written by that task, and every
//! message the peer sends arrives as a [`PeerEvent`].
//!
//! Dropping the [`PeerHandle`] closes the connection and wipes its transport keys.
//!
//! [`connect_outbound`] is shorthand for opening a [`TcpStream`] and calling [`setup_outbound`].

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

use bitcoin::secp256k1::{PublicKey, SecretKey};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;

use lightning_node::crypto::secure_key::SecureKey;
use lightning_node::ln::msgs::Init;
use lightning_node::ln::peers::connection::PeerConnection;
use lightning_node::ln::peers::PeerError;
use lightning_node::ln::wire::Message;
use lightning_node::sign::EntropySource;
use lightning_node::util::config::PeerConfig;
use lightning_node::util::logger::{Logger, WithContext};
use lightning_node::{log_debug, log_pubkey, log_trace};

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::ops::Deref;
use std::pin::Pin;
use std::task::{self, Poll};
use std::time::Duration;

/// How many received messages may wait for the application before we stop reading from the
/// socket.
const INBOUND_EVENT_QUEUE_DEPTH: usize = 64;

/// Why a connection ended, or never got established.
#[derive(Debug)]
pub enum DisconnectReason {
	/// The handshake and `init` exchange did not finish within
	/// [`PeerConfig::handshake_timeout_secs`].
	HandshakeTimeout,
	/// The peer closed the stream.
	PeerClosed,
	/// Reading from or writing to the stream failed.
	Io(io::Error),
	/// The connection failed at the protocol level, e.g. the handshake did not authenticate, a
	/// frame failed to decrypt or our last ping went unanswered.
	Peer(PeerError),
	/// The [`PeerHandle`] was dropped.
	HandleDropped,
}

impl fmt::Display for DisconnectReason {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			DisconnectReason::HandshakeTimeout => f.write_str("Handshake timed out"),
			DisconnectReason::PeerClosed => f.write_str("Peer closed the connection"),
			DisconnectReason::Io(e) => write!(f, "I/O error: {}", e),
			DisconnectReason::Peer(e) => write!(f, "{}", e),
			DisconnectReason::HandleDropped => f.write_str("Connection handle was dropped"),
		}
	}
}

impl std::error::Error for DisconnectReason {}

/// Something which happened on a connection, in the order it happened.
#[derive(Debug)]
pub enum PeerEvent {
	/// The peer sent us a message. Connection level messages (`init`, `ping`, `pong` and unknown
	/// odd messages) are handled internally and never show up here.
	Message(Message),
	/// The connection is gone. This is always the last event.
	Disconnected(DisconnectReason),
}

/// The application's end of a connection set up by [`setup_outbound`] or [`setup_inbound`].
///
/// Dropping it stops the connection task, which closes the stream.
pub struct PeerHandle {
	their_node_id: PublicKey,
	their_init: Init,
	sender: mpsc::Sender<Message>,
	events: mpsc::Receiver<PeerEvent>,
	task: JoinHandle<()>,
}

impl PeerHandle {
	/// The node id the peer proved it holds the key for during the handshake.
	pub fn their_node_id(&self) -> PublicKey {
		self.their_node_id
	}

	/// The `init` message the peer sent.
	pub fn their_init(&self) -> &Init {
		&self.their_init
	}

	/// Queues `message` for the peer, waiting if [`PeerConfig::max_outbound_queue`] messages are
	/// already queued. Hands the message back if the connection is gone.
	pub async fn send_message(&self, message: Message) -> Result<(), Message> {
		self.sender.send(message).await.map_err(|e| e.0)
	}

	/// A sender which feeds the same outbound queue as [`Self::send_message`]. It stops
	/// accepting messages once this handle is dropped.
	pub fn sender(&self) -> mpsc::Sender<Message> {
		self.sender.clone()
	}

	/// Waits for the next [`PeerEvent`]. Returns `None` once the
	/// [`PeerEvent::Disconnected`] event has been handed out.
	pub async fn next_event(&mut self) -> Option<PeerEvent> {
		self.events.recv().await
	}
}

impl Drop for PeerHandle {
	fn drop(&mut self) {
		self.task.abort();
	}
}

enum SelectorOutput<A, B, C> {
	A(A), B(B), C(C),
}

/// Polls three futures, returning the output of the first one to complete. Earlier futures win
/// ties.
struct ThreeSelector<A: Future + Unpin, B: Future + Unpin, C: Future + Unpin> {
	a: A,
	b: B,
	c: C,
}

impl<A: Future + Unpin, B: Future + Unpin, C: Future + Unpin> Future for ThreeSelector<A, B, C> {
	type Output = SelectorOutput<A::Output, B::Output, C::Output>;
	fn poll(mut self: Pin<&mut Self>, ctx: &mut task::Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.a).poll(ctx) {
			Poll::Ready(res) => { return Poll::Ready(SelectorOutput::A(res)); },
			Poll::Pending => {},
		}
		match Pin::new(&mut self.b).poll(ctx) {
			Poll::Ready(res) => { return Poll::Ready(SelectorOutput::B(res)); },
			Poll::Pending => {},
		}
		match Pin::new(&mut self.c).poll(ctx) {
			Poll::Ready(res) => { return Poll::Ready(SelectorOutput::C(res)); },
			Poll::Pending => {},
		}
		Poll::Pending
	}
}

/// Writes everything the connection has queued.
async fn flush<S: AsyncWrite + Unpin, L: Deref>(
	stream: &mut S, conn: &mut PeerConnection<L>,
) -> io::Result<()> where L::Target: Logger {
	let bytes = conn.take_pending_bytes();
	if !bytes.is_empty() {
		stream.write_all(&bytes).await?;
		stream.flush().await?;
	}
	Ok(())
}

/// Drives the handshake and the `init` exchange. Returns any message which arrived right behind
/// the peer's `init`.
async fn complete_handshake<S: AsyncRead + AsyncWrite + Unpin, L: Deref>(
	stream: &mut S, conn: &mut PeerConnection<L>,
) -> Result<Vec<Message>, DisconnectReason> where L::Target: Logger {
	let mut buf = [0; 4096];
	let mut early_messages = Vec::new();
	loop {
		flush(stream, conn).await.map_err(DisconnectReason::Io)?;
		if conn.is_connected() {
			return Ok(early_messages);
		}
		let len = stream.read(&mut buf).await.map_err(DisconnectReason::Io)?;
		if len == 0 {
			return Err(DisconnectReason::PeerClosed);
		}
		match conn.read_bytes(&buf[..len]) {
			Ok(messages) => early_messages.extend(messages),
			Err(e) => {
				// Try to get the error message out, the peer may be able to read it.
				let _ = flush(stream, conn).await;
				return Err(DisconnectReason::Peer(e));
			},
		}
	}
}

/// Runs an established connection until either side goes away.
async fn drive_connection<S: AsyncRead + AsyncWrite + Unpin, L: Deref>(
	stream: &mut S, conn: &mut PeerConnection<L>, outbound: &mut mpsc::Receiver<Message>,
	events: &mpsc::Sender<PeerEvent>, early_messages: Vec<Message>, ping_interval: Duration,
	logger: &WithContext<'_, L>,
) -> DisconnectReason where L::Target: Logger {
	for message in early_messages {
		if events.send(PeerEvent::Message(message)).await.is_err() {
			return DisconnectReason::HandleDropped;
		}
	}

	// 4KiB is nice and big without handling too many messages all at once.
	let mut buf = [0; 4096];
	let mut ping_timer = time::interval_at(time::Instant::now() + ping_interval, ping_interval);
	ping_timer.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

	loop {
		let select_result = ThreeSelector {
			a: Box::pin(outbound.recv()),
			b: Box::pin(ping_timer.tick()),
			c: Box::pin(stream.read(&mut buf)),
		}.await;
		match select_result {
			SelectorOutput::A(None) => return DisconnectReason::HandleDropped,
			SelectorOutput::A(Some(message)) => {
				if let Err(e) = conn.send_message(&message) {
					log_debug!(logger, "Dropping outbound message of type {}: {}", message.type_id(), e);
				}
			},
			SelectorOutput::B(_) => {
				if let Err(e) = conn.timer_tick_occurred() {
					let _ = flush(stream, conn).await;
					return DisconnectReason::Peer(e);
				}
			},
			SelectorOutput::C(Ok(0)) => return DisconnectReason::PeerClosed,
			SelectorOutput::C(Ok(len)) => {
				let mut messages = Vec::new();
				let res = conn.read_bytes_into(&buf[..len], &mut messages);
				// Whatever the peer got through before failing is still theirs to hand over.
				for message in messages {
					if events.send(PeerEvent::Message(message)).await.is_err() {
						return DisconnectReason::HandleDropped;
					}
				}
				if let Err(e) = res {
					let _ = flush(stream, conn).await;
					return DisconnectReason::Peer(e);
				}
			},
			SelectorOutput::C(Err(e)) => return DisconnectReason::Io(e),
		}
		if let Err(e) = flush(stream, conn).await {
			return DisconnectReason::Io(e);
		}

		// Give up our timeslice so one busy peer can't starve the others.
		tokio::task::yield_now().await;
	}
}

async fn run_connection<S, L: Deref>(
	mut stream: S, mut conn: PeerConnection<L>, mut outbound: mpsc::Receiver<Message>,
	events: mpsc::Sender<PeerEvent>, early_messages: Vec<Message>, ping_interval: Duration,
	logger: L,
) where S: AsyncRead + AsyncWrite + Unpin, L::Target: Logger {
	let logger = WithContext::from(&logger, conn.their_node_id(), None);
	let reason = drive_connection(
		&mut stream, &mut conn, &mut outbound, &events, early_messages, ping_interval, &logger,
	).await;
	log_debug!(logger, "Disconnecting peer: {}", reason);
	let _ = stream.shutdown().await;
	// The transport keys go with the connection.
	drop(conn);
	let _ = events.send(PeerEvent::Disconnected(reason)).await;
}

async fn setup_connection<S, L>(
	mut stream: S, mut conn: PeerConnection<L>, config: &PeerConfig, logger: L,
) -> Result<PeerHandle, DisconnectReason>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
	L: Deref + Clone + Send + Sync + 'static,
	L::Target: Logger,
{
	let handshake_timeout = Duration::from_secs(config.handshake_timeout_secs);
	let early_messages =
		match time::timeout(handshake_timeout, complete_handshake(&mut stream, &mut conn)).await {
			Ok(Ok(messages)) => messages,
			Ok(Err(e)) => {
				log_debug!(logger, "Failed to set up connection: {}", e);
				return Err(e);
			},
			Err(_) => {
				log_debug!(logger, "Handshake did not complete within {} seconds", config.handshake_timeout_secs);
				return Err(DisconnectReason::HandshakeTimeout);
			},
		};

	let (their_node_id, their_init) = match (conn.their_node_id(), conn.their_init()) {
		(Some(node_id), Some(init)) => (node_id, init.clone()),
		_ => return Err(DisconnectReason::Peer(PeerError::MissingRemoteStaticKey)),
	};
	log_trace!(logger, "Connection to {} established", log_pubkey!(their_node_id));

	let (sender, outbound) = mpsc::channel(config.max_outbound_queue.max(1));
	let (events_sender, events) = mpsc::channel(INBOUND_EVENT_QUEUE_DEPTH);
	let ping_interval = Duration::from_secs(config.ping_interval_secs.max(1));
	let task = tokio::spawn(run_connection(
		stream, conn, outbound, events_sender, early_messages, ping_interval, logger,
	));
	Ok(PeerHandle { their_node_id, their_init, sender, events, task })
}

fn get_ephemeral_key<ES: Deref>(entropy_source: &ES) -> SecretKey where ES::Target: EntropySource {
	SecretKey::from_slice(&entropy_source.get_secure_random_bytes())
		.expect("You broke elliptic curve cryptography")
}

/// Sets up a connection we opened to the node `their_node_id` over `stream`.
///
/// Resolves once the handshake and the `init` exchange are done, which must happen within
/// [`PeerConfig::handshake_timeout_secs`]. The connection then runs free in a task spawned with
/// [`tokio::spawn`] until the returned [`PeerHandle`] is dropped or the peer goes away.
pub async fn setup_outbound<S, L, ES: Deref>(
	stream: S, our_node_secret: &SecureKey, their_node_id: PublicKey, our_init: Init,
	entropy_source: &ES, config: &PeerConfig, logger: L,
) -> Result<PeerHandle, DisconnectReason>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
	L: Deref + Clone + Send + Sync + 'static,
	L::Target: Logger,
	ES::Target: EntropySource,
{
	let ephemeral_key = get_ephemeral_key(entropy_source);
	let conn = PeerConnection::new_outbound(
		our_node_secret, &their_node_id, &ephemeral_key, our_init, config, logger.clone(),
	).map_err(DisconnectReason::Peer)?;
	setup_connection(stream, conn, config, logger).await
}

/// Sets up a connection a peer opened to us over `stream`. The peer's identity is learned
/// during the handshake, see [`PeerHandle::their_node_id`].
///
/// Otherwise behaves like [`setup_outbound`].
pub async fn setup_inbound<S, L, ES: Deref>(
	stream: S, our_node_secret: &SecureKey, our_init: Init, entropy_source: &ES,
	config: &PeerConfig, logger: L,
) -> Result<PeerHandle, DisconnectReason>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
	L: Deref + Clone + Send + Sync + 'static,
	L::Target: Logger,
	ES::Target: EntropySource,
{
	let ephemeral_key = get_ephemeral_key(entropy_source);
	let conn = PeerConnection::new_inbound(
		our_node_secret, &ephemeral_key, our_init, config, logger.clone(),
	).map_err(DisconnectReason::Peer)?;
	setup_connection(stream, conn, config, logger).await
}

/// Opens a TCP connection to `addr` and sets it up with [`setup_outbound`].
///
/// Connecting shares the [`PeerConfig::handshake_timeout_secs`] budget with the handshake
/// itself, each getting the full amount.
pub async fn connect_outbound<L, ES: Deref>(
	addr: SocketAddr, our_node_secret: &SecureKey, their_node_id: PublicKey, our_init: Init,
	entropy_source: &ES, config: &PeerConfig, logger: L,
) -> Result<PeerHandle, DisconnectReason>
where
	L: Deref + Clone + Send + Sync + 'static,
	L::Target: Logger,
	ES::Target: EntropySource,
{
	let connect_timeout = Duration::from_secs(config.handshake_timeout_secs);
	let stream = match time::timeout(connect_timeout, TcpStream::connect(&addr)).await {
		Ok(Ok(stream)) => stream,
		Ok(Err(e)) => return Err(DisconnectReason::Io(e)),
		Err(_) => return Err(DisconnectReason::Io(io::ErrorKind::TimedOut.into())),
	};
	let _ = stream.set_nodelay(true);
	setup_outbound(stream, our_node_secret, their_node_id, our_init, entropy_source, config, logger).await
}
