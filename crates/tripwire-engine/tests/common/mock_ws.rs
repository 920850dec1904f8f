//! Loopback WebSocket server that records subscribe traffic.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub struct MockWsServer {
    addr: SocketAddr,
    drops: broadcast::Sender<()>,
    messages: Arc<Mutex<Vec<String>>>,
    accept_task: tokio::task::JoinHandle<()>,
}

impl MockWsServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let messages = Arc::new(Mutex::new(Vec::new()));
        let (drops, _) = broadcast::channel(16);

        let accept_task = tokio::spawn({
            let messages = messages.clone();
            let drops = drops.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(handle_connection(stream, messages.clone(), drops.subscribe()));
                }
            }
        });

        Self {
            addr,
            drops,
            messages,
            accept_task,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn clear_messages(&self) {
        self.messages.lock().await.clear();
    }

    /// Close every live connection; clients are free to reconnect.
    pub fn drop_connections(&self) {
        let _ = self.drops.send(());
    }

    /// Wait until a received frame contains `needle` and return that frame.
    pub async fn wait_for(&self, needle: &str) -> String {
        tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                if let Some(found) = self
                    .messages
                    .lock()
                    .await
                    .iter()
                    .find(|m| m.contains(needle))
                {
                    return found.clone();
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("frame should arrive")
    }

    pub fn shutdown(self) {
        self.accept_task.abort();
    }
}

async fn handle_connection(
    stream: TcpStream,
    messages: Arc<Mutex<Vec<String>>>,
    mut drops: broadcast::Receiver<()>,
) {
    let Ok(ws_stream) = accept_async(stream).await else {
        return;
    };
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
            _ = drops.recv() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
        }
    }
}
