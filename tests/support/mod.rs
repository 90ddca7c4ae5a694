#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::{
    io::Write,
    net::TcpListener,
    process::{Child, Command},
    time::Duration,
};
use tempfile::NamedTempFile;
use tokio::{
    net::TcpStream,
    time::{sleep, timeout},
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message,
};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const HOST: &str = "127.0.0.1";
const WAIT: Duration = Duration::from_secs(5);

// -----------------------------------------------------------------------------
// ----- Relay -----------------------------------------------------------------

/// A spawned relay binary, killed on drop.
pub struct Relay {
    child: Child,
    port: u16,
    _config: NamedTempFile,
}

impl Relay {
    /// Starts the relay with a short rejection grace so tests see closes quickly.
    pub async fn start(limits: &str) -> Relay {
        let port = reserve_port(HOST);
        let config = write_config(&format!("[limits]\nrejection_grace = \"100ms\"\n{limits}"));

        let child = spawn_roomcrab(HOST, port, &config);
        wait_for_listen(HOST, port).await;

        Relay {
            child,
            port,
            _config: config,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("ws://{HOST}:{}{path}", self.port)
    }

    pub async fn stats(&self) -> Value {
        let url = format!("http://{HOST}:{}/debug/stats", self.port);

        let resp = timeout(WAIT, reqwest::get(&url))
            .await
            .expect("timed out fetching stats")
            .expect("stats request");
        assert!(resp.status().is_success(), "{}", resp.status());

        resp.json::<Value>().await.expect("stats json")
    }

    pub async fn create(&self, name: &str) -> (Client, Value) {
        let mut client = connect(&self.url(&format!("/new-session/{name}"))).await;
        let handshake = next_json(&mut client).await;
        (client, handshake)
    }

    pub async fn join(&self, code: &str) -> (Client, Value) {
        let mut client = connect(&self.url(&format!("/join-session/{code}"))).await;
        let handshake = next_json(&mut client).await;
        (client, handshake)
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

// -----------------------------------------------------------------------------
// ----- Process ---------------------------------------------------------------

pub fn reserve_port(host: &str) -> u16 {
    let addr = format!("{host}:0");
    let listener = TcpListener::bind(&addr).expect("bind ephemeral port");
    listener.local_addr().unwrap().port()
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn spawn_roomcrab(host: &str, port: u16, config: &NamedTempFile) -> Child {
    let exe = env!("CARGO_BIN_EXE_roomcrab");

    Command::new(exe)
        .env("ROOMCRAB_HOST", host)
        .env("ROOMCRAB_PORT", port.to_string())
        .env("ROOMCRAB_CONFIG_FILE", config.path())
        .env("ROOMCRAB_DIAGNOSTICS", "true")
        .env("ROOMCRAB_LOG", "warn")
        .spawn()
        .expect("spawn roomcrab")
}

async fn wait_for_listen(host: &str, port: u16) {
    let addr = format!("{host}:{port}");
    for _ in 0..100 {
        if std::net::TcpStream::connect(&addr).is_ok() {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("roomcrab did not start listening on {addr}");
}

// -----------------------------------------------------------------------------
// ----- Client ----------------------------------------------------------------

pub async fn connect(url: &str) -> Client {
    let (client, _resp) = timeout(WAIT, connect_async(url))
        .await
        .expect("timed out connecting")
        .expect("websocket connect");
    client
}

/// Next text frame as JSON, skipping pings.
pub async fn next_json(client: &mut Client) -> Value {
    loop {
        let msg = timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .expect("websocket error");

        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected text, got {other:?}"),
        }
    }
}

/// True when the server closes the socket within the wait window.
pub async fn closed_by_server(client: &mut Client) -> bool {
    loop {
        match timeout(WAIT, client.next()).await {
            Err(_) => return false,
            Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return true,
            Ok(Some(Ok(_))) => continue,
        }
    }
}

/// True when nothing but control frames arrives for `window`.
pub async fn stays_quiet(client: &mut Client, window: Duration) -> bool {
    match timeout(window, client.next()).await {
        Err(_) => true,
        Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => true,
        Ok(_) => false,
    }
}

pub async fn send_json(client: &mut Client, value: &Value) {
    client
        .send(Message::text(value.to_string()))
        .await
        .expect("send");
}

pub async fn send_raw(client: &mut Client, raw: &str) {
    client.send(Message::text(raw)).await.expect("send");
}
