//! Server network layer: UDP transport in front of the session engine

use crate::config::EngineConfig;
use crate::connections::ConnectionTable;
use crate::content::ContentProvider;
use crate::engine::Engine;
use crate::sync::Outbound;
use log::{debug, error, info, warn};
use shared::{
    decode, encode, now_millis, ClientMessage, ErrorReason, ServerMessage, MAX_DATAGRAM_SIZE,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

pub type NetResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Events sent from network tasks to the main server loop
#[derive(Debug)]
pub enum NetworkEvent {
    MessageReceived {
        message: ClientMessage,
        addr: SocketAddr,
    },
    Malformed {
        addr: SocketAddr,
    },
    ConnectionTimeout {
        connection: u64,
    },
    Shutdown,
}

/// Stops a running [`Server`] from another task
#[derive(Clone)]
pub struct ShutdownHandle {
    event_tx: mpsc::UnboundedSender<NetworkEvent>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.event_tx.send(NetworkEvent::Shutdown).is_err() {
            debug!("Server loop already stopped");
        }
    }
}

/// Main server: owns the socket, the connection table and the engine
pub struct Server {
    socket: Arc<UdpSocket>,
    connections: Arc<RwLock<ConnectionTable>>,
    engine: Engine,
    heartbeat_timeout: Duration,
    sweep_interval: Duration,

    // Communication channels
    event_tx: mpsc::UnboundedSender<NetworkEvent>,
    event_rx: mpsc::UnboundedReceiver<NetworkEvent>,
    outbound_rx: Option<mpsc::UnboundedReceiver<Outbound>>,
}

impl Server {
    pub async fn new(
        addr: &str,
        config: EngineConfig,
        content: Arc<dyn ContentProvider>,
    ) -> NetResult<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let heartbeat_timeout = config.heartbeat_timeout;
        let sweep_interval = config.sweep_interval;
        let max_connections = config.max_connections;

        Ok(Server {
            socket,
            connections: Arc::new(RwLock::new(ConnectionTable::new(max_connections))),
            engine: Engine::new(config, content, outbound_tx),
            heartbeat_timeout,
            sweep_interval,
            event_tx,
            event_rx,
            outbound_rx: Some(outbound_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn engine(&self) -> Engine {
        self.engine.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            event_tx: self.event_tx.clone(),
        }
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        let event = match decode::<ClientMessage>(&buffer[..len]) {
                            Ok(message) => NetworkEvent::MessageReceived { message, addr },
                            Err(e) => {
                                warn!("Failed to decode message from {}: {}", addr, e);
                                NetworkEvent::Malformed { addr }
                            }
                        };
                        if let Err(e) = event_tx.send(event) {
                            error!("Failed to forward message to main loop: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that routes engine output to client addresses
    fn spawn_network_sender(&mut self) {
        let Some(mut outbound_rx) = self.outbound_rx.take() else {
            return;
        };
        let socket = Arc::clone(&self.socket);
        let connections = Arc::clone(&self.connections);

        tokio::spawn(async move {
            while let Some(Outbound {
                connection,
                message,
            }) = outbound_rx.recv().await
            {
                let addr = { connections.read().await.addr_of(connection) };
                let Some(addr) = addr else {
                    debug!("Dropping message for closed connection {}", connection);
                    continue;
                };
                if let Err(e) = Self::send_message_impl(&socket, &message, addr).await {
                    error!("Failed to send to connection {}: {}", connection, e);
                }
            }
        });
    }

    /// Spawns task that detects peers that stopped sending heartbeats
    fn spawn_timeout_checker(&self) {
        let connections = Arc::clone(&self.connections);
        let event_tx = self.event_tx.clone();
        let timeout = self.heartbeat_timeout;

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = { connections.write().await.check_timeouts(timeout) };
                for connection in timed_out {
                    if let Err(e) = event_tx.send(NetworkEvent::ConnectionTimeout { connection }) {
                        error!("Failed to send timeout event: {}", e);
                        return;
                    }
                }
            }
        });
    }

    /// Spawns task that expires idle sessions and lapsed grace periods
    fn spawn_sweeper(&self) {
        let engine = self.engine.clone();
        let period = self.sweep_interval;

        tokio::spawn(async move {
            let mut interval = interval(period);

            loop {
                interval.tick().await;
                let destroyed = engine.expire(now_millis()).await;
                if !destroyed.is_empty() {
                    debug!("Sweep destroyed {} sessions", destroyed.len());
                }
            }
        });
    }

    async fn send_message_impl(
        socket: &UdpSocket,
        message: &ServerMessage,
        addr: SocketAddr,
    ) -> NetResult<()> {
        let data = encode(message)?;
        if data.len() > MAX_DATAGRAM_SIZE {
            warn!(
                "Message for {} is {} bytes, over the {} byte datagram limit",
                addr,
                data.len(),
                MAX_DATAGRAM_SIZE
            );
        }
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    /// Replies to a peer that has no connection id (malformed or refused).
    async fn reply_unbound(&self, addr: SocketAddr, reason: ErrorReason, text: &str) {
        let message = ServerMessage::Error {
            reason,
            message: text.to_string(),
        };
        if let Err(e) = Self::send_message_impl(&self.socket, &message, addr).await {
            error!("Failed to reply to {}: {}", addr, e);
        }
    }

    /// Resolves the peer's connection id and hands the message to the engine
    async fn handle_message(&mut self, message: ClientMessage, addr: SocketAddr) {
        let connection = { self.connections.write().await.connect(addr) };
        let Some(connection) = connection else {
            warn!("Refusing {}: connection limit reached", addr);
            self.reply_unbound(addr, ErrorReason::CapacityExceeded, "server full")
                .await;
            return;
        };

        if !matches!(message, ClientMessage::Heartbeat) {
            debug!("Connection {}: {:?}", connection, message);
        }
        let leaving = matches!(message, ClientMessage::Leave { .. })
            && self.engine.is_attached(connection).await;
        self.engine
            .handle_message(connection, message, now_millis())
            .await;

        // A peer that left its session is forgotten; its next datagram opens
        // a fresh connection.
        if leaving && !self.engine.is_attached(connection).await {
            self.connections.write().await.remove(connection);
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> NetResult<()> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();
        self.spawn_sweeper();

        info!("Server started successfully");

        while let Some(event) = self.event_rx.recv().await {
            match event {
                NetworkEvent::MessageReceived { message, addr } => {
                    self.handle_message(message, addr).await;
                }
                NetworkEvent::Malformed { addr } => {
                    self.reply_unbound(addr, ErrorReason::Malformed, "could not decode message")
                        .await;
                }
                NetworkEvent::ConnectionTimeout { connection } => {
                    if let Err(e) = self.engine.disconnect(connection, now_millis()).await {
                        debug!("Connection {} timeout: {}", connection, e);
                    }
                }
                NetworkEvent::Shutdown => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::BuiltinContent;
    use shared::{GameType, Snapshot};

    async fn start() -> SocketAddr {
        let mut server = Server::new("127.0.0.1:0", EngineConfig::default(), Arc::new(BuiltinContent))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move { server.run().await });
        addr
    }

    async fn recv(socket: &UdpSocket) -> ServerMessage {
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        let len = tokio::time::timeout(Duration::from_secs(2), socket.recv(&mut buffer))
            .await
            .unwrap()
            .unwrap();
        decode(&buffer[..len]).unwrap()
    }

    #[tokio::test]
    async fn test_create_over_udp() {
        let server = start().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(server).await.unwrap();

        let create = ClientMessage::CreateSession {
            game_type: GameType::SpeedMatch,
            player_id: "host".to_string(),
            name: "Host".to_string(),
            avatar_url: None,
        };
        socket.send(&encode(&create).unwrap()).await.unwrap();

        let room_code = match recv(&socket).await {
            ServerMessage::Created { room_code } => room_code,
            other => panic!("expected Created, got {:?}", other),
        };
        let snapshot: Snapshot = match recv(&socket).await {
            ServerMessage::State { snapshot } => snapshot,
            other => panic!("expected State, got {:?}", other),
        };
        assert_eq!(snapshot.room_code, room_code);
        assert_eq!(snapshot.host_id, "host");
    }

    #[tokio::test]
    async fn test_leave_frees_the_connection() {
        let mut server = Server::new("127.0.0.1:0", EngineConfig::default(), Arc::new(BuiltinContent))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let connections = Arc::clone(&server.connections);
        tokio::spawn(async move { server.run().await });

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(addr).await.unwrap();
        let create = ClientMessage::CreateSession {
            game_type: GameType::Predict,
            player_id: "host".to_string(),
            name: "Host".to_string(),
            avatar_url: None,
        };
        socket.send(&encode(&create).unwrap()).await.unwrap();
        let room_code = match recv(&socket).await {
            ServerMessage::Created { room_code } => room_code,
            other => panic!("expected Created, got {:?}", other),
        };
        recv(&socket).await;
        assert_eq!(connections.read().await.len(), 1);

        let leave = ClientMessage::Leave { room_code };
        socket.send(&encode(&leave).unwrap()).await.unwrap();
        for _ in 0..100 {
            if connections.read().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(connections.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_run() {
        let mut server = Server::new("127.0.0.1:0", EngineConfig::default(), Arc::new(BuiltinContent))
            .await
            .unwrap();
        let handle = server.shutdown_handle();
        let running = tokio::spawn(async move { server.run().await });

        handle.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_datagram_gets_error() {
        let server = start().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(server).await.unwrap();
        socket.send(&[0xff, 0xff, 0xff, 0xff, 0x01]).await.unwrap();

        match recv(&socket).await {
            ServerMessage::Error { reason, .. } => assert_eq!(reason, ErrorReason::Malformed),
            other => panic!("expected Error, got {:?}", other),
        }
    }
}
