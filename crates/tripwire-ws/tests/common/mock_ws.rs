//! Mock WebSocket server for pool tests.
//!
//! Records every text frame it receives and lets the test push frames to,
//! or drop, all live connections.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Debug, Clone)]
enum Command {
    Text(String),
    Binary(Vec<u8>),
    Drop,
}

pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    commands: broadcast::Sender<Command>,
    messages: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<u32>>,
}

impl MockWsServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let messages = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(0));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (commands, _) = broadcast::channel(64);

        let messages_clone = messages.clone();
        let connections_clone = connections.clone();
        let commands_clone = commands.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            messages_clone.clone(),
                            connections_clone.clone(),
                            commands_clone.subscribe(),
                        ));
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            commands,
            messages,
            connections,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    pub async fn received_messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }

    pub async fn clear_messages(&self) {
        self.messages.lock().await.clear();
    }

    /// Push a text frame to every live connection.
    pub fn push(&self, text: &str) {
        let _ = self.commands.send(Command::Text(text.to_string()));
    }

    pub fn push_binary(&self, data: &[u8]) {
        let _ = self.commands.send(Command::Binary(data.to_vec()));
    }

    /// Close every live connection with a close frame.
    pub fn drop_connections(&self) {
        let _ = self.commands.send(Command::Drop);
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    messages: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<u32>>,
    mut commands: broadcast::Receiver<Command>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };
    *connections.lock().await += 1;

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => messages.lock().await.push(text),
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
            cmd = commands.recv() => match cmd {
                Ok(Command::Text(text)) => {
                    let _ = write.send(Message::Text(text)).await;
                }
                Ok(Command::Binary(data)) => {
                    let _ = write.send(Message::Binary(data)).await;
                }
                Ok(Command::Drop) | Err(_) => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }
}
