// WebSocket gateway: workspace-topic fan-out for chat messages.
//
// Authorization runs twice: once at the HTTP handshake (reject with 401
// before the upgrade) and once again when the socket opens, so a session
// invalidated or a member deactivated between the two never holds a live
// subscription. Fan-out is purely in-process; a frame is republished to
// every subscriber of the connection's own authorized workspace topic,
// the origin peer included (clients dedupe via `client-message-id`).

use std::collections::HashMap;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        RawQuery, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use huddle_common::protocol::ws::ChatFrame;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::ApiState;
use crate::auth::middleware::query_param;
use crate::auth::resolver;
use crate::auth::session::session_id_from_headers;
use crate::error::{ApiError, ErrorCode};

/// In-process topic registry. One topic per workspace slug; one outbound
/// sender per connection.
#[derive(Default)]
pub struct TopicRegistry {
    topics: RwLock<HashMap<String, HashMap<Uuid, mpsc::UnboundedSender<String>>>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(
        &self,
        topic: &str,
        connection_id: Uuid,
        sender: mpsc::UnboundedSender<String>,
    ) {
        let mut topics = self.topics.write().await;
        topics.entry(topic.to_owned()).or_default().insert(connection_id, sender);
    }

    pub async fn unsubscribe(&self, topic: &str, connection_id: Uuid) {
        let mut topics = self.topics.write().await;
        if let Some(subscribers) = topics.get_mut(topic) {
            subscribers.remove(&connection_id);
            if subscribers.is_empty() {
                topics.remove(topic);
            }
        }
    }

    /// Deliver `payload` to every subscriber of `topic`, the publisher
    /// included. Returns the number of deliveries attempted.
    pub async fn publish(&self, topic: &str, payload: &str) -> usize {
        let topics = self.topics.read().await;
        let Some(subscribers) = topics.get(topic) else {
            return 0;
        };

        let mut delivered = 0;
        for sender in subscribers.values() {
            // A closed receiver just means the connection is tearing down.
            if sender.send(payload.to_owned()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    #[cfg(test)]
    pub(crate) async fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.read().await.get(topic).map_or(0, HashMap::len)
    }
}

pub async fn ws_upgrade(
    State(state): State<ApiState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(workspace_slug) = query
        .as_deref()
        .and_then(|query| query_param(query, "workspace"))
        .map(ToOwned::to_owned)
    else {
        return unauthorized();
    };

    let Some(session_id) = session_id_from_headers(&headers) else {
        return unauthorized();
    };

    let user_id = match state.sessions.validate(&session_id).await {
        Ok(Some(validated)) => validated.user.id,
        Ok(None) => return unauthorized(),
        Err(error) => return ApiError::internal(error).into_response(),
    };

    if resolver::resolve(&state.store, user_id, &workspace_slug).await.is_err() {
        return unauthorized();
    }

    ws.on_upgrade(move |socket| handle_socket(state, socket, session_id, workspace_slug))
}

fn unauthorized() -> Response {
    ApiError::from_code(ErrorCode::Unauthorized).into_response()
}

async fn handle_socket(
    state: ApiState,
    mut socket: WebSocket,
    session_id: String,
    workspace_slug: String,
) {
    // Re-run authorization at open: the session may have been invalidated
    // or the member deactivated since the handshake.
    let revalidated = match state.sessions.validate(&session_id).await {
        Ok(Some(validated)) => validated,
        _ => {
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    if resolver::resolve(&state.store, revalidated.user.id, &workspace_slug).await.is_err() {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    let connection_id = Uuid::new_v4();
    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<String>();
    state.registry.subscribe(&workspace_slug, connection_id, outbound_sender).await;

    loop {
        tokio::select! {
            maybe_outbound = outbound_receiver.recv() => {
                match maybe_outbound {
                    Some(payload) => {
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            maybe_message = socket.recv() => {
                let Some(Ok(message)) = maybe_message else {
                    break;
                };

                match message {
                    Message::Text(raw_frame) => {
                        handle_inbound_frame(&state, &workspace_slug, raw_frame.as_str()).await;
                    }
                    Message::Close(_) => break,
                    // Pings are answered by axum; binary frames are not
                    // part of the chat protocol.
                    _ => {}
                }
            }
        }
    }

    state.registry.unsubscribe(&workspace_slug, connection_id).await;
}

/// Parse an inbound text frame and republish chat messages to the
/// connection's own workspace topic. The topic comes from the
/// connection's authorization, never from the frame, so a forged
/// `workspace` field cannot cross workspaces.
async fn handle_inbound_frame(state: &ApiState, workspace_slug: &str, raw_frame: &str) {
    let frame = match serde_json::from_str::<ChatFrame>(raw_frame) {
        Ok(frame) => frame,
        Err(error) => {
            warn!(error = %error, "ignoring malformed websocket frame");
            return;
        }
    };

    match frame {
        ChatFrame::ChatMessage { .. } => {
            let fanout = frame.into_fanout();
            let payload = match serde_json::to_string(&fanout) {
                Ok(payload) => payload,
                Err(error) => {
                    warn!(error = %error, "failed to serialize fan-out frame");
                    return;
                }
            };
            let delivered = state.registry.publish(workspace_slug, &payload).await;
            debug!(workspace = %workspace_slug, delivered, "fanned out chat message");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::{routing::get, Router};
    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::{
        connect_async,
        tungstenite::{client::IntoClientRequest, http::HeaderValue, Error as WsError, Message},
        MaybeTlsStream, WebSocketStream,
    };
    use uuid::Uuid;

    use super::{ws_upgrade, TopicRegistry};
    use crate::api::ApiState;
    use crate::store::{ChatStore, NewAccount, SignupRecord};

    type ClientSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

    #[tokio::test]
    async fn publish_reaches_only_same_topic_subscribers_including_origin() {
        let registry = TopicRegistry::new();

        let (alpha_one_tx, mut alpha_one_rx) = mpsc::unbounded_channel();
        let (alpha_two_tx, mut alpha_two_rx) = mpsc::unbounded_channel();
        let (beta_tx, mut beta_rx) = mpsc::unbounded_channel();

        let alpha_one = Uuid::new_v4();
        registry.subscribe("WALPHA", alpha_one, alpha_one_tx).await;
        registry.subscribe("WALPHA", Uuid::new_v4(), alpha_two_tx).await;
        registry.subscribe("WBETA", Uuid::new_v4(), beta_tx).await;

        let delivered = registry.publish("WALPHA", "hello alpha").await;
        assert_eq!(delivered, 2);

        // Both alpha peers got the frame, the origin included.
        assert_eq!(alpha_one_rx.recv().await.as_deref(), Some("hello alpha"));
        assert_eq!(alpha_two_rx.recv().await.as_deref(), Some("hello alpha"));
        assert!(beta_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_removes_the_connection_and_empty_topics() {
        let registry = TopicRegistry::new();
        let (sender, _receiver) = mpsc::unbounded_channel();
        let connection_id = Uuid::new_v4();

        registry.subscribe("WALPHA", connection_id, sender).await;
        assert_eq!(registry.subscriber_count("WALPHA").await, 1);

        registry.unsubscribe("WALPHA", connection_id).await;
        assert_eq!(registry.subscriber_count("WALPHA").await, 0);
        assert_eq!(registry.publish("WALPHA", "into the void").await, 0);
    }

    async fn signup(state: &ApiState, email: &str, name: &str) -> SignupRecord {
        state
            .store
            .create_account(NewAccount {
                email: email.to_owned(),
                password_hash: "argon2-hash".to_owned(),
                display_name: name.to_owned(),
                workspace_name: format!("{name}'s Workspace"),
                user_avatar_url: None,
                member_avatar_url: None,
            })
            .await
            .expect("signup should succeed")
    }

    async fn spawn_ws_server(state: ApiState) -> SocketAddr {
        let app = Router::new().route("/ws", get(ws_upgrade)).with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("listener should bind");
        let addr = listener.local_addr().expect("listener should expose local address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("websocket server should run for tests");
        });
        addr
    }

    async fn connect(
        addr: SocketAddr,
        workspace_slug: &str,
        session_id: Option<&str>,
    ) -> Result<ClientSocket, WsError> {
        let mut request = format!("ws://{addr}/ws?workspace={workspace_slug}")
            .into_client_request()
            .expect("client request should build");
        if let Some(session_id) = session_id {
            request.headers_mut().insert(
                "Cookie",
                HeaderValue::from_str(&format!("chat-session={session_id}"))
                    .expect("cookie value should be ascii"),
            );
        }
        connect_async(request).await.map(|(socket, _)| socket)
    }

    async fn recv_json(socket: &mut ClientSocket) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("frame should arrive in time")
            .expect("socket should stay open")
            .expect("frame should be readable");
        match frame {
            Message::Text(text) => {
                serde_json::from_str(text.as_str()).expect("frame should be valid json")
            }
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn handshake_without_a_session_is_rejected() {
        let state = ApiState::for_tests(ChatStore::in_memory());
        let ada = signup(&state, "ada@example.com", "Ada").await;
        let addr = spawn_ws_server(state).await;

        let error = connect(addr, &ada.workspace_slug, None)
            .await
            .expect_err("handshake without a session should fail");
        match error {
            WsError::Http(response) => assert_eq!(response.status(), 401),
            other => panic!("expected an http rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn handshake_for_a_foreign_workspace_is_rejected() {
        let state = ApiState::for_tests(ChatStore::in_memory());
        let ada = signup(&state, "ada@example.com", "Ada").await;
        let grace = signup(&state, "grace@example.com", "Grace").await;
        let ada_session =
            state.sessions.create(ada.user_id).await.expect("session should be created");
        let addr = spawn_ws_server(state).await;

        let error = connect(addr, &grace.workspace_slug, Some(&ada_session.id))
            .await
            .expect_err("cross-workspace handshake should fail");
        match error {
            WsError::Http(response) => assert_eq!(response.status(), 401),
            other => panic!("expected an http rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn chat_messages_fan_out_to_workspace_peers_only() {
        let state = ApiState::for_tests(ChatStore::in_memory());
        let ada = signup(&state, "ada@example.com", "Ada").await;
        let grace = signup(&state, "grace@example.com", "Grace").await;
        let ada_session =
            state.sessions.create(ada.user_id).await.expect("session should be created");
        let grace_session =
            state.sessions.create(grace.user_id).await.expect("session should be created");

        let registry = state.registry.clone();
        let ada_topic = ada.workspace_slug.clone();
        let grace_topic = grace.workspace_slug.clone();
        let addr = spawn_ws_server(state).await;

        let mut ada_socket_one = connect(addr, &ada.workspace_slug, Some(&ada_session.id))
            .await
            .expect("first peer should connect");
        let mut ada_socket_two = connect(addr, &ada.workspace_slug, Some(&ada_session.id))
            .await
            .expect("second peer should connect");
        let mut grace_socket = connect(addr, &grace.workspace_slug, Some(&grace_session.id))
            .await
            .expect("outsider should connect to their own workspace");

        // Subscription happens after the upgrade completes; wait for it.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while registry.subscriber_count(&ada_topic).await < 2
            || registry.subscriber_count(&grace_topic).await < 1
        {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for subscriptions"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // The forged workspace field must not reroute the frame.
        let frame = json!({
            "type": "chat-message",
            "workspace": grace.workspace_slug,
            "message": {
                "body": "hello team",
                "client-message-id": "cmid-1",
                "createdAt": "2026-08-26T12:00:00.000Z"
            }
        });
        ada_socket_one
            .send(Message::Text(frame.to_string().into()))
            .await
            .expect("frame should send");

        for socket in [&mut ada_socket_one, &mut ada_socket_two] {
            let received = recv_json(socket).await;
            assert_eq!(received["type"], "chat-message");
            assert_eq!(received["message"]["body"], "hello team");
            assert_eq!(received["message"]["client-message-id"], "cmid-1");
            // The fan-out envelope drops the workspace field entirely.
            assert!(received.get("workspace").is_none());
        }

        let leaked =
            tokio::time::timeout(Duration::from_millis(300), grace_socket.next()).await;
        assert!(leaked.is_err(), "no frame may cross the workspace boundary");
    }

    #[tokio::test]
    async fn malformed_frames_are_ignored_and_the_socket_stays_open() {
        let state = ApiState::for_tests(ChatStore::in_memory());
        let ada = signup(&state, "ada@example.com", "Ada").await;
        let ada_session =
            state.sessions.create(ada.user_id).await.expect("session should be created");
        let registry = state.registry.clone();
        let topic = ada.workspace_slug.clone();
        let addr = spawn_ws_server(state).await;

        let mut socket = connect(addr, &ada.workspace_slug, Some(&ada_session.id))
            .await
            .expect("peer should connect");
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while registry.subscriber_count(&topic).await < 1 {
            assert!(tokio::time::Instant::now() < deadline, "timed out waiting for subscription");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        socket
            .send(Message::Text("this is not json".to_string().into()))
            .await
            .expect("frame should send");
        socket
            .send(Message::Text(r#"{"type":"unknown-kind"}"#.to_string().into()))
            .await
            .expect("frame should send");

        // A valid frame afterwards still round-trips.
        let frame = json!({
            "type": "chat-message",
            "message": {
                "body": "still here",
                "client-message-id": "cmid-2",
                "createdAt": "2026-08-26T12:00:00.000Z"
            }
        });
        socket.send(Message::Text(frame.to_string().into())).await.expect("frame should send");

        let received = recv_json(&mut socket).await;
        assert_eq!(received["message"]["body"], "still here");
    }
}
