//! Home Assistant WebSocket client
//!
//! Speaks the `/api/websocket` protocol: authenticate with a long-lived
//! token, then send id-tagged commands and match `result` messages back to
//! the waiting caller. A background reader task owns the stream half of the
//! socket; callers share the sink half behind a mutex and wait on oneshot
//! channels, so a slow request never blocks the others.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

use super::{EntityState, RemoteError, RemoteService, Snapshot};
use crate::config::HomeAssistantConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// One authenticated socket
struct Connection {
    sink: SplitSink<WsStream, Message>,
    pending: PendingMap,
    reader: JoinHandle<()>,
}

impl Connection {
    fn is_alive(&self) -> bool {
        !self.reader.is_finished()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

pub struct HomeAssistantClient {
    url: String,
    token: String,
    request_timeout: Duration,
    retry_delay: Duration,
    max_retry_delay: Duration,
    max_attempts: u32,
    volume_step: f64,
    next_id: AtomicU64,
    conn: tokio::sync::Mutex<Option<Connection>>,
}

impl HomeAssistantClient {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::from_config(
            &HomeAssistantConfig {
                url: url.into(),
                ..HomeAssistantConfig::default()
            },
            token.into(),
        )
    }

    pub fn from_config(config: &HomeAssistantConfig, token: String) -> Self {
        Self {
            url: config.websocket_url(),
            token,
            request_timeout: config.request_timeout(),
            retry_delay: config.retry_delay(),
            max_retry_delay: config.max_retry_delay(),
            max_attempts: config.max_attempts.max(1),
            volume_step: config.volume_step,
            next_id: AtomicU64::new(1),
            conn: tokio::sync::Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Drop the current socket; the next request reconnects
    pub async fn close(&self) {
        if self.conn.lock().await.take().is_some() {
            info!("Home Assistant connection closed");
        }
    }

    fn timeout_error(&self) -> RemoteError {
        RemoteError::Timeout {
            millis: self.request_timeout.as_millis() as u64,
        }
    }

    async fn connect(&self) -> Result<Connection, RemoteError> {
        debug!("Connecting to Home Assistant at {}", self.url);

        let (ws, _response) = timeout(self.request_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| self.timeout_error())?
            .map_err(|e| RemoteError::Connect {
                url: self.url.clone(),
                message: e.to_string(),
            })?;

        let (mut sink, mut stream) = ws.split();

        let hello = timeout(self.request_timeout, next_json(&mut stream))
            .await
            .map_err(|_| self.timeout_error())??;
        if hello["type"] != "auth_required" {
            return Err(RemoteError::protocol(format!(
                "expected auth_required, got {}",
                hello["type"]
            )));
        }

        let auth = json!({ "type": "auth", "access_token": self.token });
        sink.send(Message::Text(auth.to_string()))
            .await
            .map_err(|_| RemoteError::Closed)?;

        let reply = timeout(self.request_timeout, next_json(&mut stream))
            .await
            .map_err(|_| self.timeout_error())??;
        match reply["type"].as_str() {
            Some("auth_ok") => {}
            Some("auth_invalid") => {
                return Err(RemoteError::Auth {
                    message: reply["message"].as_str().unwrap_or("invalid token").to_string(),
                })
            }
            _ => {
                return Err(RemoteError::protocol(format!(
                    "unexpected auth reply {}",
                    reply["type"]
                )))
            }
        }

        info!(
            "✅ Connected to Home Assistant {}",
            reply["ha_version"].as_str().unwrap_or("")
        );

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader = tokio::spawn(read_loop(stream, pending.clone()));

        Ok(Connection {
            sink,
            pending,
            reader,
        })
    }

    /// Send one command and wait for its result, retrying transport failures
    /// with exponential backoff
    async fn request(&self, payload: Value, subject: &str) -> Result<Value, RemoteError> {
        let mut delay = self.retry_delay;
        let mut attempt = 1;

        loop {
            match self.request_once(&payload, subject).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        "Home Assistant request failed, retrying in {:?} (attempt {}/{}): {}",
                        delay, attempt, self.max_attempts, e
                    );
                    self.conn.lock().await.take();
                    sleep(delay).await;
                    delay = (delay * 2).min(self.max_retry_delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_once(&self, payload: &Value, subject: &str) -> Result<Value, RemoteError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut message = payload.clone();
        if let Value::Object(map) = &mut message {
            map.insert("id".to_string(), json!(id));
        }

        let (reply_rx, pending) = {
            let mut guard = self.conn.lock().await;
            if !guard.as_ref().is_some_and(Connection::is_alive) {
                *guard = Some(self.connect().await?);
            }
            let Some(conn) = guard.as_mut() else {
                return Err(RemoteError::Closed);
            };

            let (reply_tx, reply_rx) = oneshot::channel();
            conn.pending.lock().insert(id, reply_tx);

            trace!("→ HA {}", message);
            if conn.sink.send(Message::Text(message.to_string())).await.is_err() {
                conn.pending.lock().remove(&id);
                *guard = None;
                return Err(RemoteError::Closed);
            }
            (reply_rx, conn.pending.clone())
        };

        let reply = match timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(RemoteError::Closed),
            Err(_) => {
                pending.lock().remove(&id);
                return Err(self.timeout_error());
            }
        };

        parse_result(reply, subject)
    }
}

/// Read the next JSON text frame, skipping control frames
async fn next_json(stream: &mut SplitStream<WsStream>) -> Result<Value, RemoteError> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(&text)?),
            Some(Ok(Message::Close(_))) | None => return Err(RemoteError::Closed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!("WebSocket read error: {}", e);
                return Err(RemoteError::Closed);
            }
        }
    }
}

/// Route `result` messages to their waiting callers until the socket closes
async fn read_loop(mut stream: SplitStream<WsStream>, pending: PendingMap) {
    loop {
        let message = match next_json(&mut stream).await {
            Ok(message) => message,
            Err(RemoteError::Closed) => break,
            Err(e) => {
                warn!("Ignoring malformed Home Assistant message: {}", e);
                continue;
            }
        };

        trace!("← HA {}", message);
        if message["type"] != "result" {
            continue;
        }
        let Some(id) = message["id"].as_u64() else {
            continue;
        };
        if let Some(reply_tx) = pending.lock().remove(&id) {
            let _ = reply_tx.send(message);
        }
    }

    warn!("Home Assistant connection lost");
    // Dropping the senders wakes every waiter with a closed error
    pending.lock().clear();
}

fn parse_result(reply: Value, subject: &str) -> Result<Value, RemoteError> {
    if reply["success"].as_bool() == Some(true) {
        return Ok(reply.get("result").cloned().unwrap_or(Value::Null));
    }

    let code = reply["error"]["code"].as_str().unwrap_or("unknown_error");
    let message = reply["error"]["message"].as_str().unwrap_or_default();
    if code == "not_found" {
        return Err(RemoteError::NotFound {
            entity_id: subject.to_string(),
        });
    }
    Err(RemoteError::Service {
        code: code.to_string(),
        message: message.to_string(),
    })
}

#[async_trait]
impl RemoteService for HomeAssistantClient {
    async fn get_all_states(&self) -> Result<Snapshot, RemoteError> {
        let result = self.request(json!({ "type": "get_states" }), "states").await?;
        let states: Vec<EntityState> = serde_json::from_value(result)?;
        Ok(states
            .into_iter()
            .map(|state| (state.entity_id.clone(), state))
            .collect())
    }

    async fn call_service(&self, domain: &str, service: &str, entity_id: &str, data: Value) -> bool {
        let data = if data.is_null() { json!({}) } else { data };
        let payload = json!({
            "type": "call_service",
            "domain": domain,
            "service": service,
            "service_data": data,
            "target": { "entity_id": entity_id },
        });

        match self.request(payload, entity_id).await {
            Ok(_) => {
                info!("Called {}.{} for {}", domain, service, entity_id);
                true
            }
            Err(RemoteError::NotFound { .. }) => {
                warn!("{}.{}: entity {} not found", domain, service, entity_id);
                false
            }
            Err(e) => {
                error!("Error calling service {}.{} for {}: {}", domain, service, entity_id, e);
                false
            }
        }
    }

    fn volume_step(&self) -> f64 {
        self.volume_step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// Scripted server: completes the handshake, then answers each command
    /// with `respond`
    async fn serve(
        token: &'static str,
        respond: fn(&Value) -> Value,
    ) -> (String, tokio::sync::mpsc::UnboundedReceiver<Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen_rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let seen_tx = seen_tx.clone();
                tokio::spawn(async move {
                    let ws = accept_async(tcp).await.unwrap();
                    let (mut tx, mut rx) = ws.split();
                    tx.send(Message::Text(json!({"type": "auth_required"}).to_string()))
                        .await
                        .unwrap();

                    let Some(Ok(Message::Text(auth))) = rx.next().await else { return };
                    let auth: Value = serde_json::from_str(&auth).unwrap();
                    if auth["access_token"] != token {
                        let _ = tx
                            .send(Message::Text(
                                json!({"type": "auth_invalid", "message": "Invalid access token"})
                                    .to_string(),
                            ))
                            .await;
                        return;
                    }
                    tx.send(Message::Text(
                        json!({"type": "auth_ok", "ha_version": "2024.1.0"}).to_string(),
                    ))
                    .await
                    .unwrap();

                    while let Some(Ok(Message::Text(text))) = rx.next().await {
                        let command: Value = serde_json::from_str(&text).unwrap();
                        let mut reply = respond(&command);
                        reply["id"] = command["id"].clone();
                        reply["type"] = json!("result");
                        let _ = seen_tx.send(command);
                        if tx.send(Message::Text(reply.to_string())).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        (format!("ws://{}", addr), seen_rx)
    }

    fn client(url: &str, token: &str) -> HomeAssistantClient {
        let config = HomeAssistantConfig {
            url: url.to_string(),
            request_timeout_ms: 1000,
            retry_delay_ms: 10,
            max_retry_delay_ms: 20,
            max_attempts: 2,
            ..HomeAssistantConfig::default()
        };
        HomeAssistantClient::from_config(&config, token.to_string())
    }

    fn answer(command: &Value) -> Value {
        match command["type"].as_str() {
            Some("get_states") => json!({
                "success": true,
                "result": [
                    {"entity_id": "light.bulb_1", "state": "on", "attributes": {"brightness": 200}},
                    {"entity_id": "scene.bedtime", "state": "scening", "attributes": {}}
                ]
            }),
            Some("call_service") if command["target"]["entity_id"] == "light.missing" => json!({
                "success": false,
                "error": {"code": "not_found", "message": "Entity not found"}
            }),
            Some("call_service") => json!({"success": true, "result": {"context": {}}}),
            _ => json!({"success": false, "error": {"code": "unknown_command", "message": "?"}}),
        }
    }

    #[tokio::test]
    async fn test_get_all_states() {
        let (url, _seen) = serve("secret", answer).await;
        let ha = client(&url, "secret");

        let states = ha.get_all_states().await.unwrap();
        assert_eq!(states.len(), 2);
        assert!(states["light.bulb_1"].is_on());
        assert_eq!(states["light.bulb_1"].attribute("brightness"), Some(&json!(200)));
    }

    #[tokio::test]
    async fn test_call_service_payload() {
        let (url, mut seen) = serve("secret", answer).await;
        let ha = client(&url, "secret");

        assert!(
            ha.call_service("light", "turn_on", "light.bulb_1", json!({"rgb_color": [255, 0, 0]}))
                .await
        );

        let command = seen.recv().await.unwrap();
        assert_eq!(command["type"], "call_service");
        assert_eq!(command["domain"], "light");
        assert_eq!(command["service"], "turn_on");
        assert_eq!(command["service_data"]["rgb_color"], json!([255, 0, 0]));
        assert_eq!(command["target"]["entity_id"], "light.bulb_1");
        assert!(command["id"].as_u64().is_some());
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let (url, mut seen) = serve("secret", answer).await;
        let ha = client(&url, "secret");

        assert!(!ha.call_service("light", "toggle", "light.missing", Value::Null).await);
        assert!(seen.recv().await.is_some());
        assert!(seen.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_bad_token() {
        let (url, _seen) = serve("secret", answer).await;
        let ha = client(&url, "wrong");

        let err = ha.get_all_states().await.unwrap_err();
        assert!(matches!(err, RemoteError::Auth { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_server_gives_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let ha = client(&format!("ws://{}", addr), "secret");
        let err = ha.get_all_states().await.unwrap_err();
        assert!(matches!(err, RemoteError::Connect { .. }));
    }

    #[test]
    fn test_parse_result_errors() {
        let reply = json!({"success": false, "error": {"code": "invalid_format", "message": "bad"}});
        assert!(matches!(
            parse_result(reply, "light.x"),
            Err(RemoteError::Service { code, .. }) if code == "invalid_format"
        ));
    }
}
