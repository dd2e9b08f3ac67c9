//! IPC client implementation

use seatlink_api::{
    Command, Event, OP_EVENT, OP_REQUEST, OP_RESPONSE, Request, Response, ResponseResult,
};
use seatlink_conn::CONNECTION_BUFFER_SIZE;
use std::collections::VecDeque;
use std::path::Path;
use tokio::net::UnixStream;
use tracing::debug;

use crate::{Frame, FramedStream, IpcError, IpcResult};

/// IPC Client for connecting to seatlinkd
pub struct IpcClient {
    stream: FramedStream,
    next_request_id: u64,
    /// Events that arrived while waiting for a response
    early_events: VecDeque<Event>,
}

impl IpcClient {
    /// Connect to seatlinkd with default-sized connection buffers
    pub async fn connect(socket_path: impl AsRef<Path>) -> IpcResult<Self> {
        Self::connect_with_capacity(socket_path, CONNECTION_BUFFER_SIZE).await
    }

    /// Connect to seatlinkd; `capacity` should match the daemon's buffer size
    pub async fn connect_with_capacity(
        socket_path: impl AsRef<Path>,
        capacity: usize,
    ) -> IpcResult<Self> {
        let stream = UnixStream::connect(socket_path).await?;

        Ok(Self {
            stream: FramedStream::from_tokio(stream, capacity)?,
            next_request_id: 1,
            early_events: VecDeque::new(),
        })
    }

    /// Send a command and wait for its response
    pub async fn send(&mut self, command: Command) -> IpcResult<Response> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let request = Request::new(request_id, command);
        self.stream
            .send(&Frame::from_message(OP_REQUEST, &request)?)
            .await?;

        loop {
            let frame = self.stream.recv().await?;
            match frame.opcode {
                OP_RESPONSE => {
                    let response: Response = frame.decode()?;
                    if response.request_id == request_id {
                        return Ok(response);
                    }
                    debug!(request_id = response.request_id, "Ignoring stale response");
                }
                OP_EVENT => self.early_events.push_back(frame.decode()?),
                other => return Err(IpcError::UnexpectedOpcode(other)),
            }
        }
    }

    /// Subscribe to events and consume this client to return an event stream
    pub async fn subscribe(mut self) -> IpcResult<EventStream> {
        let response = self.send(Command::SubscribeEvents).await?;

        match response.result {
            ResponseResult::Ok(_) => {}
            ResponseResult::Err(e) => {
                return Err(IpcError::ServerError(e.message));
            }
        }

        Ok(EventStream {
            stream: self.stream,
            queued: self.early_events,
        })
    }
}

/// Stream of events from seatlinkd
pub struct EventStream {
    stream: FramedStream,
    queued: VecDeque<Event>,
}

impl EventStream {
    /// Wait for the next event
    pub async fn next(&mut self) -> IpcResult<Event> {
        if let Some(event) = self.queued.pop_front() {
            return Ok(event);
        }

        loop {
            let frame = self.stream.recv().await?;
            match frame.opcode {
                OP_EVENT => return frame.decode(),
                OP_RESPONSE => continue,
                other => return Err(IpcError::UnexpectedOpcode(other)),
            }
        }
    }
}
