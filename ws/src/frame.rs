use crate::error::Error;
use axum::extract::ws::{self, WebSocket};
use futures::{future, Sink, SinkExt, Stream, StreamExt};

/// Close codes sent to the peer when the server tears a connection down.
pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// A single transport frame as seen by the pumps. Keeps the pumps independent of
/// the concrete WebSocket implementation so they can be driven by in-memory
/// transports in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(Option<CloseFrame>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl Frame {
    /// Frames an outbound payload, as text when it is valid UTF-8 (all JSON
    /// messages are) and as binary otherwise. The bytes are never altered.
    pub fn from_payload(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Frame::Text(text.to_owned()),
            Err(_) => Frame::Binary(bytes.to_vec()),
        }
    }

    pub fn close(code: u16, reason: &str) -> Self {
        Frame::Close(Some(CloseFrame {
            code,
            reason: reason.to_owned(),
        }))
    }
}

impl From<ws::Message> for Frame {
    fn from(message: ws::Message) -> Self {
        match message {
            ws::Message::Text(text) => Frame::Text(text),
            ws::Message::Binary(data) => Frame::Binary(data),
            ws::Message::Ping(data) => Frame::Ping(data),
            ws::Message::Pong(data) => Frame::Pong(data),
            ws::Message::Close(close) => Frame::Close(close.map(|c| CloseFrame {
                code: c.code,
                reason: c.reason.into_owned(),
            })),
        }
    }
}

impl From<Frame> for ws::Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => ws::Message::Text(text),
            Frame::Binary(data) => ws::Message::Binary(data),
            Frame::Ping(data) => ws::Message::Ping(data),
            Frame::Pong(data) => ws::Message::Pong(data),
            Frame::Close(close) => ws::Message::Close(close.map(|c| ws::CloseFrame {
                code: c.code,
                reason: c.reason.into(),
            })),
        }
    }
}

/// Splits an upgraded axum socket into the sink/stream pair the pumps expect.
pub fn into_transport(
    socket: WebSocket,
) -> (
    impl Sink<Frame, Error = Error> + Send + Unpin + 'static,
    impl Stream<Item = Result<Frame, Error>> + Send + Unpin + 'static,
) {
    let (sink, stream) = socket.split();

    let sink = sink
        .with(|frame: Frame| future::ready(Ok::<_, axum::Error>(ws::Message::from(frame))))
        .sink_map_err(Error::transport_write);
    let stream = stream.map(|message| message.map(Frame::from).map_err(Error::transport_read));

    (sink, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_payloads_are_framed_as_text() {
        let frame = Frame::from_payload(br#"{"type":"direct_message"}"#);
        assert_eq!(frame, Frame::Text(r#"{"type":"direct_message"}"#.to_string()));
    }

    #[test]
    fn non_utf8_payloads_are_framed_as_binary() {
        let bytes = vec![0xff, 0xfe, 0x00];
        assert_eq!(Frame::from_payload(&bytes), Frame::Binary(bytes));
    }

    #[test]
    fn close_frames_survive_conversion_to_axum() {
        let message = ws::Message::from(Frame::close(CLOSE_TRY_AGAIN_LATER, "slow consumer"));
        match Frame::from(message) {
            Frame::Close(Some(close)) => {
                assert_eq!(close.code, CLOSE_TRY_AGAIN_LATER);
                assert_eq!(close.reason, "slow consumer");
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }
}
