use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use futures_util::{Stream, StreamExt};

use parley_types::events::ClientEvent;
use parley_types::models::Identity;

use crate::error::RelayError;

/// How long a freshly opened transport may take to present its token before
/// the relay gives up and closes it.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Verifies a bearer token and resolves it to a user identity. Blocking
/// (token decode plus a user lookup); async callers go through
/// `spawn_blocking`. Every failure mode collapses to
/// `RelayError::Authentication` so callers cannot leak which step failed.
pub trait CredentialVerifier: Send + Sync + 'static {
    fn verify(&self, token: &str) -> Result<Identity, RelayError>;
}

/// Admission gate for a newly opened WebSocket: wait (bounded) for the
/// client's `auth` frame, verify the token, and hand back the resolved
/// identity. No event-handling logic runs until this returns Ok; any frame
/// arriving before the `auth` frame is dropped unseen.
pub async fn authenticate<S>(
    frames: &mut S,
    verifier: &Arc<dyn CredentialVerifier>,
) -> Result<Identity, RelayError>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let token = tokio::time::timeout(HANDSHAKE_TIMEOUT, wait_for_token(frames))
        .await
        .map_err(|_| RelayError::Authentication)?
        .ok_or(RelayError::Authentication)?;

    let verifier = verifier.clone();
    tokio::task::spawn_blocking(move || verifier.verify(&token))
        .await
        .map_err(|_| RelayError::Authentication)?
}

async fn wait_for_token<S>(frames: &mut S) -> Option<String>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(Ok(msg)) = frames.next().await {
        if let Message::Text(text) = msg {
            if let Ok(ClientEvent::Auth { token }) = serde_json::from_str::<ClientEvent>(&text) {
                return Some(token);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use serde_json::json;

    struct FakeVerifier {
        accept: Option<Identity>,
    }

    impl CredentialVerifier for FakeVerifier {
        fn verify(&self, token: &str) -> Result<Identity, RelayError> {
            match (&self.accept, token) {
                (Some(identity), "good-token") => Ok(identity.clone()),
                _ => Err(RelayError::Authentication),
            }
        }
    }

    fn verifier_for(identity: Option<Identity>) -> Arc<dyn CredentialVerifier> {
        Arc::new(FakeVerifier { accept: identity })
    }

    fn text_frame(value: serde_json::Value) -> Result<Message, axum::Error> {
        Ok(Message::Text(value.to_string().into()))
    }

    fn alice() -> Identity {
        Identity {
            id: 1,
            username: "alice".into(),
        }
    }

    #[tokio::test]
    async fn valid_token_resolves_identity() {
        let mut frames = stream::iter(vec![text_frame(
            json!({"type": "auth", "data": {"token": "good-token"}}),
        )]);

        let identity = authenticate(&mut frames, &verifier_for(Some(alice())))
            .await
            .unwrap();
        assert_eq!(identity, alice());
    }

    #[tokio::test]
    async fn invalid_token_is_rejected_generically() {
        let mut frames = stream::iter(vec![text_frame(
            json!({"type": "auth", "data": {"token": "bad-token"}}),
        )]);

        let err = authenticate(&mut frames, &verifier_for(Some(alice())))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Authentication));
    }

    #[tokio::test]
    async fn closing_without_a_token_is_rejected() {
        let mut frames = stream::iter(vec![text_frame(
            json!({"type": "chat message", "data": "sneaky"}),
        )]);

        let err = authenticate(&mut frames, &verifier_for(Some(alice())))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Authentication));
    }

    #[tokio::test]
    async fn pre_auth_events_are_dropped_not_processed() {
        // A chat frame ahead of the auth frame is discarded; the handshake
        // still completes on the auth frame that follows.
        let mut frames = stream::iter(vec![
            text_frame(json!({"type": "chat message", "data": "too early"})),
            text_frame(json!({"type": "auth", "data": {"token": "good-token"}})),
        ]);

        let identity = authenticate(&mut frames, &verifier_for(Some(alice())))
            .await
            .unwrap();
        assert_eq!(identity, alice());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_transport_times_out() {
        let mut frames = stream::pending::<Result<Message, axum::Error>>();

        let err = authenticate(&mut frames, &verifier_for(Some(alice())))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Authentication));
    }
}
