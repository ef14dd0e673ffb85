//! The two per-connection loops. The read pump owns the inbound half of the
//! transport, the write pump owns the outbound half and the outbound queue.
//! They share nothing but the connection's teardown trigger.

use crate::connection::{CloseReason, Connection, ConnectionSettings, OutboundQueue};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::frame::Frame;
use futures::{Sink, SinkExt, Stream, StreamExt};
use log::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Drives both pumps to completion. The write pump runs on its own task; the
/// read pump runs on the caller's. Returns once the transport is released and
/// the connection is `Closed`.
pub async fn run<S, R>(
    connection: Arc<Connection>,
    queue: OutboundQueue,
    sink: S,
    stream: R,
    dispatcher: Dispatcher,
    settings: ConnectionSettings,
) where
    S: Sink<Frame, Error = Error> + Send + Unpin + 'static,
    R: Stream<Item = Result<Frame>> + Send + Unpin,
{
    let writer = tokio::spawn(write_loop(connection.clone(), queue, sink, settings));

    // A writer that dies without returning must still stop the reader
    let supervise_writer = async {
        if let Err(e) = writer.await {
            error!("Write pump for connection {} failed: {e}", connection.id());
            connection.close(CloseReason::TransportWrite);
        }
    };

    tokio::join!(
        read_loop(&connection, stream, &dispatcher, settings.idle_timeout),
        supervise_writer
    );
    connection.mark_closed();
}

/// Reads until the peer goes away, the transport fails, the idle deadline
/// passes, or teardown is triggered elsewhere.
pub async fn read_loop<R>(
    connection: &Arc<Connection>,
    mut stream: R,
    dispatcher: &Dispatcher,
    idle_timeout: Duration,
) where
    R: Stream<Item = Result<Frame>> + Unpin,
{
    let reason = loop {
        let next = tokio::select! {
            _ = connection.closed() => return,
            next = time::timeout(idle_timeout, stream.next()) => next,
        };

        let frame = match next {
            Err(_) => {
                debug!(
                    "No inbound frame on connection {} for {:?}",
                    connection.id(),
                    idle_timeout
                );
                break CloseReason::IdleTimeout;
            }
            Ok(None) => break CloseReason::PeerClosed,
            Ok(Some(Err(e))) => {
                debug!("Read failed on connection {}: {e}", connection.id());
                break CloseReason::TransportRead;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        // Any frame, control frames included, re-arms the deadline
        connection.touch();

        match frame {
            Frame::Text(text) => dispatcher.handle_frame(connection, text.as_bytes()),
            Frame::Binary(data) => dispatcher.handle_frame(connection, &data),
            Frame::Pong(_) => trace!("Pong from connection {}", connection.id()),
            // Answered by the transport itself
            Frame::Ping(_) => {}
            Frame::Close(_) => break CloseReason::PeerClosed,
        }
    };

    connection.close(reason);
}

/// Drains the outbound queue to the transport and pings while idle. Exits once
/// the queue has been closed and drained, or on the first failed write.
pub async fn write_loop<S>(
    connection: Arc<Connection>,
    mut queue: OutboundQueue,
    mut sink: S,
    settings: ConnectionSettings,
) where
    S: Sink<Frame, Error = Error> + Unpin,
{
    let mut keepalive = time::interval_at(
        Instant::now() + settings.keepalive_interval,
        settings.keepalive_interval,
    );
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let healthy = loop {
        tokio::select! {
            payload = queue.recv() => {
                let Some(payload) = payload else {
                    break true;
                };
                // Only a server shutdown flushes what is still queued
                if matches!(connection.close_reason(), Some(reason) if reason != CloseReason::Shutdown) {
                    continue;
                }
                if let Err(e) = write_frame(&mut sink, Frame::from_payload(payload.as_bytes()), settings.write_timeout).await {
                    warn!("Write failed on connection {}: {e}", connection.id());
                    break false;
                }
                keepalive.reset();
            }
            _ = keepalive.tick() => {
                if let Err(e) = write_frame(&mut sink, Frame::Ping(Vec::new()), settings.write_timeout).await {
                    warn!("Keepalive failed on connection {}: {e}", connection.id());
                    break false;
                }
                trace!("Ping sent on connection {}", connection.id());
            }
        }
    };

    if !healthy {
        connection.close(CloseReason::TransportWrite);
    }

    match connection.close_reason() {
        Some(CloseReason::TransportRead | CloseReason::TransportWrite) | None => {}
        Some(reason) => {
            let (code, text) = reason.close_code();
            // Best effort, the peer may already be gone
            let _ = write_frame(&mut sink, Frame::close(code, text), settings.write_timeout).await;
        }
    }

    let _ = time::timeout(settings.write_timeout, sink.close()).await;
}

async fn write_frame<S>(sink: &mut S, frame: Frame, write_timeout: Duration) -> Result<()>
where
    S: Sink<Frame, Error = Error> + Unpin,
{
    match time::timeout(write_timeout, sink.send(frame)).await {
        Ok(result) => result,
        Err(elapsed) => Err(Error::transport_write(elapsed)),
    }
}
