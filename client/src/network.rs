use crate::input::{parse_command, Command, ParseError, HELP};
use crate::mirror::{MirrorEvent, SessionMirror};
use log::{debug, error, info, warn};
use shared::{decode, encode, ClientMessage, PlayerId, ServerMessage, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep};

pub type ClientResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Who this client claims to be when creating or joining sessions
#[derive(Debug, Clone)]
pub struct Identity {
    pub player_id: PlayerId,
    pub name: String,
    pub avatar_url: Option<String>,
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    identity: Identity,
    mirror: SessionMirror,

    fake_ping_ms: u64,
    heartbeat: Duration,
    running: bool,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        identity: Identity,
        fake_ping_ms: u64,
        heartbeat: Duration,
    ) -> ClientResult<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            identity,
            mirror: SessionMirror::new(),
            fake_ping_ms,
            heartbeat,
            running: true,
        })
    }

    pub fn mirror(&self) -> &SessionMirror {
        &self.mirror
    }

    async fn send_message(&self, message: &ClientMessage) -> ClientResult<()> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = encode(message)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    fn current_room(&self) -> Option<String> {
        self.mirror.room_code().map(str::to_string)
    }

    /// Translates a parsed command into the message the server expects.
    fn message_for(&mut self, command: Command) -> Option<ClientMessage> {
        let identity = &self.identity;
        match command {
            Command::Create(game_type) => Some(ClientMessage::CreateSession {
                game_type,
                player_id: identity.player_id.clone(),
                name: identity.name.clone(),
                avatar_url: identity.avatar_url.clone(),
            }),
            Command::Join(room_code) => Some(ClientMessage::JoinSession {
                room_code,
                player_id: identity.player_id.clone(),
                name: identity.name.clone(),
                avatar_url: identity.avatar_url.clone(),
            }),
            Command::Rejoin(room_code) => Some(ClientMessage::Reconnect {
                room_code,
                player_id: identity.player_id.clone(),
            }),
            Command::Leave => {
                let room_code = self.current_room()?;
                self.mirror.clear();
                Some(ClientMessage::Leave { room_code })
            }
            Command::Sync => Some(ClientMessage::RequestSnapshot {
                room_code: self.current_room()?,
            }),
            Command::Act(action) => Some(ClientMessage::Action {
                room_code: self.current_room()?,
                action,
            }),
            Command::Show => {
                println!("{}", self.mirror.describe(Some(&self.identity.player_id)));
                None
            }
            Command::Help => {
                println!("{}", HELP);
                None
            }
            Command::Quit => {
                self.running = false;
                None
            }
        }
    }

    async fn handle_line(&mut self, line: &str) {
        let command = match parse_command(line) {
            Ok(command) => command,
            Err(ParseError::Empty) => return,
            Err(e) => {
                println!("{}", e);
                return;
            }
        };

        let needs_room = matches!(command, Command::Leave | Command::Sync | Command::Act(_));
        match self.message_for(command) {
            Some(message) => {
                if let Err(e) = self.send_message(&message).await {
                    error!("Error sending message: {}", e);
                }
            }
            None if needs_room => println!("Not in a session. Create or join one first."),
            None => {}
        }
    }

    async fn handle_message(&mut self, message: ServerMessage) {
        match self.mirror.apply(message) {
            MirrorEvent::Created(room_code) => {
                println!("Created room {}", room_code);
            }
            MirrorEvent::Updated => {
                println!("{}", self.mirror.describe(Some(&self.identity.player_id)));
            }
            MirrorEvent::RoundStarted => {
                println!("--- New round ---");
                println!("{}", self.mirror.describe(Some(&self.identity.player_id)));
            }
            MirrorEvent::RoundEnded => {
                println!("--- Round over ---");
                println!("{}", self.mirror.describe(Some(&self.identity.player_id)));
            }
            MirrorEvent::GameOver(standings) => {
                info!("Game over with {} players ranked", standings.len());
                println!("{}", self.mirror.describe(Some(&self.identity.player_id)));
            }
            MirrorEvent::NeedsSnapshot(room_code) => {
                warn!("Out of sync with {}, requesting snapshot", room_code);
                let request = ClientMessage::RequestSnapshot { room_code };
                if let Err(e) = self.send_message(&request).await {
                    error!("Error requesting snapshot: {}", e);
                }
            }
            MirrorEvent::Rejected { reason, message } => {
                println!("Rejected ({:?}): {}", reason, message);
            }
            MirrorEvent::Ignored => {}
        }
    }

    pub async fn run(&mut self) -> ClientResult<()> {
        println!("{}", HELP);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut heartbeat_interval = interval(self.heartbeat);
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        while self.running {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }

                            match decode::<ServerMessage>(&buffer[..len]) {
                                Ok(message) => self.handle_message(message).await,
                                Err(e) => debug!("Dropping undecodable datagram: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving message: {}", e),
                    }
                },

                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => self.handle_line(&line).await,
                        Ok(None) => {
                            info!("Input closed");
                            self.running = false;
                        }
                        Err(e) => {
                            error!("Error reading input: {}", e);
                            self.running = false;
                        }
                    }
                },

                _ = heartbeat_interval.tick() => {
                    if let Err(e) = self.send_message(&ClientMessage::Heartbeat).await {
                        error!("Error sending heartbeat: {}", e);
                    }
                }
            }
        }

        if let Some(room_code) = self.current_room() {
            if let Err(e) = self.send_message(&ClientMessage::Leave { room_code }).await {
                warn!("Could not leave cleanly: {}", e);
            }
        }
        info!("Client shutting down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{ActionKind, GameType};

    async fn client() -> Client {
        let identity = Identity {
            player_id: "p1".to_string(),
            name: "Ada".to_string(),
            avatar_url: None,
        };
        Client::new("127.0.0.1:9", identity, 0, Duration::from_secs(1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_carries_identity() {
        let mut client = client().await;
        let message = client.message_for(Command::Create(GameType::Predict));
        assert_eq!(
            message,
            Some(ClientMessage::CreateSession {
                game_type: GameType::Predict,
                player_id: "p1".to_string(),
                name: "Ada".to_string(),
                avatar_url: None,
            })
        );
    }

    #[tokio::test]
    async fn test_actions_need_a_room() {
        let mut client = client().await;
        assert_eq!(client.message_for(Command::Act(ActionKind::Buzz)), None);

        client.mirror.apply(ServerMessage::Created {
            room_code: "AB12CD".to_string(),
        });
        assert_eq!(
            client.message_for(Command::Act(ActionKind::Buzz)),
            Some(ClientMessage::Action {
                room_code: "AB12CD".to_string(),
                action: ActionKind::Buzz,
            })
        );
    }

    #[tokio::test]
    async fn test_quit_stops_loop() {
        let mut client = client().await;
        assert_eq!(client.message_for(Command::Quit), None);
        assert!(!client.running);
    }
}
