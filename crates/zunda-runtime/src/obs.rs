//! OBS scene backend over obs-websocket v5.
//!
//! Handshake: the server sends `Hello` (op 0), we answer `Identify` (op 1,
//! with an authentication string when the server asks for one) and wait
//! for `Identified` (op 2). Requests are op 6, responses op 7 matched by
//! `requestId`. Events (op 5) are not subscribed to and are skipped if
//! they arrive anyway.
//!
//! The connection is opened lazily on the first command. A transport or
//! protocol failure drops it, and the next command reconnects.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use uuid::Uuid;

use zunda_core::settings::ObsSettings;
use zunda_core::{SceneBackend, SceneError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RPC_VERSION: u32 = 1;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

mod op {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    op: u8,
    #[serde(default)]
    d: Value,
}

/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
pub fn authentication_string(password: &str, salt: &str, challenge: &str) -> String {
    let secret = BASE64.encode(Sha256::digest(format!("{password}{salt}").as_bytes()));
    BASE64.encode(Sha256::digest(format!("{secret}{challenge}").as_bytes()))
}

/// Scene backend talking to OBS Studio.
pub struct ObsSceneBackend {
    url: String,
    password: String,
    connection: Mutex<Option<WsStream>>,
}

impl std::fmt::Debug for ObsSceneBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObsSceneBackend")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl ObsSceneBackend {
    pub fn new(settings: &ObsSettings) -> Self {
        Self::with_url(settings.url(), settings.password.clone())
    }

    pub fn with_url(url: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            password: password.into(),
            connection: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connect now instead of on the first command.
    pub async fn connect(&self) -> Result<(), SceneError> {
        let mut connection = self.connection.lock().await;
        if connection.is_none() {
            *connection = Some(self.handshake().await?);
        }
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    pub async fn disconnect(&self) {
        if let Some(mut ws) = self.connection.lock().await.take() {
            // Best effort; the socket is dropped either way.
            let _ = ws.close(None).await;
            info!(url = %self.url, "Disconnected from OBS");
        }
    }

    /// Send one request and return its `responseData`.
    pub async fn request(&self, request_type: &str, data: Value) -> Result<Value, SceneError> {
        let mut connection = self.connection.lock().await;
        if connection.is_none() {
            *connection = Some(self.handshake().await?);
        }
        let Some(ws) = connection.as_mut() else {
            return Err(SceneError::NotConnected(self.url.clone()));
        };

        let result = tokio::time::timeout(REQUEST_TIMEOUT, exchange(ws, request_type, data))
            .await
            .unwrap_or_else(|_| Err(SceneError::Transport(format!("{request_type} timed out"))));

        if matches!(
            result,
            Err(SceneError::Transport(_) | SceneError::Protocol(_))
        ) {
            warn!(url = %self.url, "Dropping OBS connection after failure");
            *connection = None;
        }
        result
    }

    async fn handshake(&self) -> Result<WsStream, SceneError> {
        let (mut ws, _) = tokio::time::timeout(REQUEST_TIMEOUT, connect_async(self.url.as_str()))
            .await
            .map_err(|_| SceneError::NotConnected(format!("{}: connect timed out", self.url)))?
            .map_err(|e| SceneError::NotConnected(format!("{}: {e}", self.url)))?;

        let hello = next_envelope(&mut ws).await?;
        if hello.op != op::HELLO {
            return Err(SceneError::Protocol(format!("expected Hello, got op {}", hello.op)));
        }

        let mut identify = json!({ "rpcVersion": RPC_VERSION, "eventSubscriptions": 0 });
        if let Some((challenge, salt)) = auth_challenge(&hello.d) {
            identify["authentication"] =
                Value::String(authentication_string(&self.password, salt, challenge));
        }
        send_envelope(&mut ws, op::IDENTIFY, identify).await?;

        let identified = next_envelope(&mut ws)
            .await
            .map_err(|e| SceneError::NotConnected(format!("identification failed: {e}")))?;
        if identified.op != op::IDENTIFIED {
            return Err(SceneError::Protocol(format!(
                "expected Identified, got op {}",
                identified.op
            )));
        }

        info!(url = %self.url, "Connected to OBS");
        Ok(ws)
    }

    async fn current_scene(&self) -> Result<String, SceneError> {
        let data = self.request("GetCurrentProgramScene", json!({})).await?;
        data.get("currentProgramSceneName")
            .or_else(|| data.get("sceneName"))
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| SceneError::Protocol("no current scene in response".to_string()))
    }
}

fn auth_challenge(hello: &Value) -> Option<(&str, &str)> {
    let auth = hello.get("authentication")?;
    Some((auth.get("challenge")?.as_str()?, auth.get("salt")?.as_str()?))
}

async fn send_envelope(ws: &mut WsStream, op: u8, d: Value) -> Result<(), SceneError> {
    let text = json!({ "op": op, "d": d }).to_string();
    ws.send(Message::text(text))
        .await
        .map_err(|e| SceneError::Transport(e.to_string()))
}

async fn next_envelope(ws: &mut WsStream) -> Result<Envelope, SceneError> {
    loop {
        match ws.next().await {
            None => return Err(SceneError::Transport("connection closed".to_string())),
            Some(Err(e)) => return Err(SceneError::Transport(e.to_string())),
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(text.as_str())
                    .map_err(|e| SceneError::Protocol(e.to_string()));
            }
            Some(Ok(Message::Close(frame))) => {
                let reason = frame.map_or_else(
                    || "connection closed".to_string(),
                    |f| format!("closed ({}): {}", u16::from(f.code), f.reason.as_str()),
                );
                return Err(SceneError::Transport(reason));
            }
            Some(Ok(_)) => {}
        }
    }
}

async fn exchange(ws: &mut WsStream, request_type: &str, data: Value) -> Result<Value, SceneError> {
    let request_id = Uuid::new_v4().to_string();
    send_envelope(
        ws,
        op::REQUEST,
        json!({
            "requestType": request_type,
            "requestId": request_id,
            "requestData": data,
        }),
    )
    .await?;

    loop {
        let envelope = next_envelope(ws).await?;
        if envelope.op != op::REQUEST_RESPONSE
            || envelope.d.get("requestId").and_then(Value::as_str) != Some(request_id.as_str())
        {
            debug!(op = envelope.op, "Skipping unrelated OBS message");
            continue;
        }
        return parse_response(request_type, &envelope.d);
    }
}

fn parse_response(request_type: &str, d: &Value) -> Result<Value, SceneError> {
    let status = d
        .get("requestStatus")
        .ok_or_else(|| SceneError::Protocol("response without requestStatus".to_string()))?;
    if status.get("result").and_then(Value::as_bool) == Some(true) {
        return Ok(d.get("responseData").cloned().unwrap_or(Value::Null));
    }
    Err(SceneError::Request {
        request: request_type.to_string(),
        code: status.get("code").and_then(Value::as_i64).unwrap_or_default(),
        comment: status
            .get("comment")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

#[async_trait]
impl SceneBackend for ObsSceneBackend {
    async fn switch_scene(&self, scene_name: &str) -> Result<(), SceneError> {
        self.request("SetCurrentProgramScene", json!({ "sceneName": scene_name }))
            .await?;
        info!(scene = scene_name, "Switched OBS scene");
        Ok(())
    }

    async fn update_text_source(&self, source_name: &str, text: &str) -> Result<(), SceneError> {
        self.request(
            "SetInputSettings",
            json!({ "inputName": source_name, "inputSettings": { "text": text } }),
        )
        .await?;
        debug!(source = source_name, "Updated OBS text source");
        Ok(())
    }

    async fn set_visibility(&self, source_name: &str, visible: bool) -> Result<(), SceneError> {
        let scene = self.current_scene().await?;
        let item = self
            .request(
                "GetSceneItemId",
                json!({ "sceneName": scene, "sourceName": source_name }),
            )
            .await?;
        let item_id = item
            .get("sceneItemId")
            .and_then(Value::as_i64)
            .ok_or_else(|| SceneError::Protocol("no sceneItemId in response".to_string()))?;
        self.request(
            "SetSceneItemEnabled",
            json!({ "sceneName": scene, "sceneItemId": item_id, "sceneItemEnabled": visible }),
        )
        .await?;
        debug!(source = source_name, visible, "Set OBS source visibility");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_matches_obs_reference() {
        let auth = authentication_string(
            "supersecret",
            "lM1GncleQOaCu9lT1yeUZhFYnqhsLLP1G5lAGo3ixaI=",
            "+IxH4CnCiqpX1rM9scsNynZzbOe4KhDeYcTNS3PDaeY=",
        );
        assert_eq!(auth, "sQBlPUYd9mki/3XVFBp4Pt08FCMWdMVIqnFWdEitUME=");
    }

    #[test]
    fn failed_status_becomes_request_error() {
        let d = json!({
            "requestId": "x",
            "requestStatus": { "result": false, "code": 600, "comment": "No source was found" },
        });
        assert_eq!(
            parse_response("GetSceneItemId", &d),
            Err(SceneError::Request {
                request: "GetSceneItemId".into(),
                code: 600,
                comment: "No source was found".into(),
            })
        );
    }

    #[test]
    fn successful_status_returns_response_data() {
        let d = json!({
            "requestStatus": { "result": true, "code": 100 },
            "responseData": { "sceneItemId": 7 },
        });
        assert_eq!(parse_response("GetSceneItemId", &d).unwrap()["sceneItemId"], 7);

        let bare = json!({ "requestStatus": { "result": true, "code": 100 } });
        assert_eq!(parse_response("SetCurrentProgramScene", &bare).unwrap(), Value::Null);
    }

    #[test]
    fn challenge_is_optional() {
        assert!(auth_challenge(&json!({ "rpcVersion": 1 })).is_none());
        assert_eq!(
            auth_challenge(&json!({ "authentication": { "challenge": "c", "salt": "s" } })),
            Some(("c", "s"))
        );
    }

    #[tokio::test]
    async fn unreachable_obs_is_not_connected() {
        let backend = ObsSceneBackend::with_url("ws://127.0.0.1:9", "");
        assert!(matches!(
            backend.switch_scene("Main").await,
            Err(SceneError::NotConnected(_))
        ));
        assert!(!backend.is_connected().await);
    }
}
