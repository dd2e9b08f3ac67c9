//! IPC server implementation

use seatlink_api::{
    ClientInfo, ClientRole, Command, ErrorCode, ErrorInfo, Event, Request, Response, OP_EVENT,
    OP_REQUEST, OP_RESPONSE,
};
use seatlink_util::ClientId;
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::{max_frame_len, Frame, FramedStream, IpcError, IpcResult};

/// Frames waiting to be written to one client before it counts as backlogged
const CLIENT_BACKLOG: usize = 64;

/// Message from client to server
pub enum ServerMessage {
    Request {
        client_id: ClientId,
        request: Request,
    },
    ClientConnected {
        client_id: ClientId,
        info: ClientInfo,
    },
    ClientDisconnected {
        client_id: ClientId,
    },
}

/// IPC Server
pub struct IpcServer {
    socket_path: PathBuf,
    buffer_size: usize,
    max_clients: usize,
    listener: Option<UnixListener>,
    clients: Arc<RwLock<HashMap<ClientId, ClientHandle>>>,
    event_tx: broadcast::Sender<Event>,
    message_tx: mpsc::UnboundedSender<ServerMessage>,
    message_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<ServerMessage>>>>,
}

struct ClientHandle {
    info: ClientInfo,
    frame_tx: mpsc::Sender<Frame>,
    subscribed: bool,
}

impl IpcServer {
    /// Create a new IPC server whose connections use `buffer_size`-byte queues
    pub fn new(socket_path: impl AsRef<Path>, buffer_size: usize) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            buffer_size,
            max_clients: usize::MAX,
            listener: None,
            clients: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            message_tx,
            message_rx: Arc::new(Mutex::new(Some(message_rx))),
        }
    }

    /// Limit the number of simultaneously connected clients (unlimited by
    /// default)
    pub fn with_max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients;
        self
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Start listening
    pub async fn start(&mut self) -> IpcResult<()> {
        // Remove a stale socket left by a previous run
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        // Readable/writable by owner and group
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o660))?;

        info!(
            path = %self.socket_path.display(),
            buffer_size = self.buffer_size,
            max_clients = self.max_clients,
            "IPC server listening"
        );

        self.listener = Some(listener);

        Ok(())
    }

    /// Get receiver for server messages
    pub async fn take_message_receiver(&self) -> Option<mpsc::UnboundedReceiver<ServerMessage>> {
        self.message_rx.lock().await.take()
    }

    /// Accept connections in a loop
    pub async fn run(&self) -> IpcResult<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| IpcError::ServerError("Server not started".into()))?;

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let connected = self.client_count().await;
                    if connected >= self.max_clients {
                        warn!(
                            connected,
                            max_clients = self.max_clients,
                            "Too many clients, refusing connection"
                        );
                        continue;
                    }

                    let creds = peer_credentials(&stream);
                    let uid = creds.map(|(uid, _)| uid);

                    let role = match uid {
                        Some(0) => ClientRole::Admin,
                        Some(u) if u == nix::unistd::getuid().as_raw() => ClientRole::Admin,
                        _ => ClientRole::User,
                    };

                    let mut info = ClientInfo::new(role);
                    if let Some((uid, pid)) = creds {
                        info = info.with_uid(uid).with_pid(pid);
                    }

                    let stream = match FramedStream::from_tokio(stream, self.buffer_size) {
                        Ok(stream) => stream,
                        Err(e) => {
                            error!(error = %e, "Failed to set up client connection");
                            continue;
                        }
                    };

                    let client_id = ClientId::new();
                    info!(client_id = %client_id, uid = ?uid, role = ?role, "Client connected");

                    self.handle_client(stream, client_id, info).await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_client(&self, stream: FramedStream, client_id: ClientId, info: ClientInfo) {
        let (frame_tx, frame_rx) = mpsc::channel(CLIENT_BACKLOG);

        self.clients.write().await.insert(
            client_id.clone(),
            ClientHandle {
                info: info.clone(),
                frame_tx,
                subscribed: false,
            },
        );

        let _ = self.message_tx.send(ServerMessage::ClientConnected {
            client_id: client_id.clone(),
            info,
        });

        let clients = self.clients.clone();
        let message_tx = self.message_tx.clone();
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            let result = serve_client(
                stream,
                &client_id,
                &clients,
                &message_tx,
                frame_rx,
                event_rx,
            )
            .await;

            match result {
                Ok(()) | Err(IpcError::ConnectionClosed) => {
                    debug!(client_id = %client_id, "Client disconnected");
                }
                Err(e) => {
                    debug!(client_id = %client_id, error = %e, "Client connection error");
                }
            }

            clients.write().await.remove(&client_id);
            let _ = message_tx.send(ServerMessage::ClientDisconnected { client_id });
        });
    }

    /// Send a response to a specific client
    ///
    /// A response too large for the client's connection buffer is replaced
    /// by an error response. If even that does not fit, nothing is sent and
    /// [`IpcError::FrameTooLarge`] is returned; the client stays connected.
    pub async fn send_response(&self, client_id: &ClientId, response: Response) -> IpcResult<()> {
        let mut frame = Frame::from_message(OP_RESPONSE, &response)?;

        let max = max_frame_len(self.buffer_size);
        if frame.encoded_len() > max {
            warn!(
                client_id = %client_id,
                size = frame.encoded_len(),
                max,
                "Response too large for connection buffer"
            );
            let error = Response::error(
                response.request_id,
                ErrorInfo::new(
                    ErrorCode::InvalidRequest,
                    "Response does not fit in the connection buffer",
                ),
            );
            frame = Frame::from_message(OP_RESPONSE, &error)?;

            if frame.encoded_len() > max {
                error!(
                    client_id = %client_id,
                    buffer_size = self.buffer_size,
                    "Connection buffer too small for an error response"
                );
                return Err(IpcError::FrameTooLarge {
                    size: frame.encoded_len(),
                    max,
                });
            }
        }

        let clients = self.clients.read().await;
        if let Some(handle) = clients.get(client_id) {
            handle.frame_tx.try_send(frame).map_err(|e| match e {
                TrySendError::Full(_) => {
                    IpcError::ServerError(format!("client {} is not reading", client_id))
                }
                TrySendError::Closed(_) => IpcError::ConnectionClosed,
            })?;
        }

        Ok(())
    }

    /// Broadcast an event to all subscribed clients
    pub fn broadcast_event(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    /// Get client info
    pub async fn get_client_info(&self, client_id: &ClientId) -> Option<ClientInfo> {
        let clients = self.clients.read().await;
        clients.get(client_id).map(|h| h.info.clone())
    }

    /// Get connected client count
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Drive one client connection until it closes.
async fn serve_client(
    mut stream: FramedStream,
    client_id: &ClientId,
    clients: &RwLock<HashMap<ClientId, ClientHandle>>,
    message_tx: &mpsc::UnboundedSender<ServerMessage>,
    mut frame_rx: mpsc::Receiver<Frame>,
    mut event_rx: broadcast::Receiver<Event>,
) -> IpcResult<()> {
    loop {
        tokio::select! {
            frame = stream.recv() => {
                let frame = frame?;
                if frame.opcode != OP_REQUEST {
                    warn!(
                        client_id = %client_id,
                        opcode = frame.opcode,
                        "Ignoring unexpected frame"
                    );
                    continue;
                }

                let request: Request = match frame.decode() {
                    Ok(request) => request,
                    Err(e) => {
                        warn!(client_id = %client_id, error = %e, "Invalid request");
                        continue;
                    }
                };

                let subscribed = match request.command {
                    Command::SubscribeEvents => Some(true),
                    Command::UnsubscribeEvents => Some(false),
                    _ => None,
                };
                if let Some(subscribed) = subscribed
                    && let Some(handle) = clients.write().await.get_mut(client_id)
                {
                    handle.subscribed = subscribed;
                }

                let _ = message_tx.send(ServerMessage::Request {
                    client_id: client_id.clone(),
                    request,
                });
            }

            Some(frame) = frame_rx.recv() => {
                match stream.send(&frame).await {
                    Ok(()) => {}
                    Err(IpcError::FrameTooLarge { size, max }) => {
                        warn!(client_id = %client_id, size, max, "Response too large, skipped");
                    }
                    Err(e) => return Err(e),
                }
            }

            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        let subscribed = clients
                            .read()
                            .await
                            .get(client_id)
                            .is_some_and(|h| h.subscribed);
                        if !subscribed {
                            continue;
                        }

                        match stream.send(&Frame::from_message(OP_EVENT, &event)?).await {
                            Ok(()) => {}
                            Err(IpcError::FrameTooLarge { size, max }) => {
                                warn!(
                                    client_id = %client_id,
                                    size,
                                    max,
                                    "Event too large, skipped"
                                );
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(client_id = %client_id, missed, "Client missed events");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                }
            }
        }
    }
}

/// Get peer UID and PID from a Unix socket
fn peer_credentials(stream: &UnixStream) -> Option<(u32, i32)> {
    use std::os::unix::io::AsFd;

    let fd = stream.as_fd();

    match nix::sys::socket::getsockopt(&fd, nix::sys::socket::sockopt::PeerCredentials) {
        Ok(cred) => Some((cred.uid(), cred.pid())),
        Err(_) => None,
    }
}
