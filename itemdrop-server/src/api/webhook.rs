//! EventSub webhook.
//!
//! `POST /webhook/twitch`
//!
//! Every delivery is signature checked before anything else, including the
//! subscription verification challenge. Notifications credit tokens; a
//! redelivered notification credits nothing new.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use itemdrop_core::ingestion::{CreditOutcome, CreditRequest, IngestError, RewardParser, credit_tokens};
use itemdrop_sdk::objects::eventsub::{
    BITS_TRANSACTION_CREATE, BitsTransaction, CHANNEL_POINTS_REDEMPTION_ADD,
    ChannelPointsRedemption, EventSubMessage, MESSAGE_TYPE_NOTIFICATION, MESSAGE_TYPE_REVOCATION,
    MESSAGE_TYPE_VERIFICATION,
};
use itemdrop_sdk::signature::{
    MESSAGE_ID_HEADER, MESSAGE_SIGNATURE_HEADER, MESSAGE_TIMESTAMP_HEADER, MESSAGE_TYPE_HEADER,
    SignatureError, verify_message,
};
use thiserror::Error;

use super::internal_error;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/twitch", post(receive))
}

#[derive(Debug, Error)]
pub(crate) enum WebhookError {
    #[error("missing header {0}")]
    MissingHeader(&'static str),
    #[error("signature rejected: {0}")]
    Signature(#[from] SignatureError),
    #[error("malformed delivery: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("verification delivery without challenge")]
    MissingChallenge,
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        match self {
            WebhookError::Signature(e) => {
                tracing::warn!(error = %e, "Rejected EventSub delivery");
                (StatusCode::FORBIDDEN, "Forbidden").into_response()
            }
            WebhookError::Ingest(IngestError::UnknownParty {
                viewer_id,
                streamer_id,
            }) => {
                // Acknowledge so Twitch does not keep redelivering.
                tracing::warn!(%viewer_id, %streamer_id, "Notification for unknown viewer or streamer");
                StatusCode::NO_CONTENT.into_response()
            }
            WebhookError::Ingest(IngestError::Database(e)) => {
                internal_error("Webhook database error", &e)
            }
            e @ (WebhookError::MissingHeader(_)
            | WebhookError::Malformed(_)
            | WebhookError::MissingChallenge
            | WebhookError::Ingest(IngestError::InvalidRewardDescriptor(_))) => {
                tracing::warn!(error = %e, "Bad EventSub delivery");
                (StatusCode::BAD_REQUEST, e.to_string()).into_response()
            }
        }
    }
}

/// What a verified delivery asks of us.
#[derive(Debug)]
pub(crate) enum Delivery {
    Verification { challenge: String },
    Revocation { subscription_type: String },
    Notification(CreditRequest),
    Ignored { reason: String },
}

fn header_value<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, WebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingHeader(name))
}

/// Check the signature and freshness of a delivery.
pub(crate) fn authenticate(
    headers: &HeaderMap,
    body: &[u8],
    secret: &[u8],
) -> Result<(), WebhookError> {
    let message_id = header_value(headers, MESSAGE_ID_HEADER)?;
    let timestamp = header_value(headers, MESSAGE_TIMESTAMP_HEADER)?;
    let signature = header_value(headers, MESSAGE_SIGNATURE_HEADER)?;
    verify_message(message_id, timestamp, body, signature, secret)?;
    Ok(())
}

/// Interpret an authenticated delivery.
pub(crate) fn classify(
    message_type: &str,
    body: &[u8],
    parser: &RewardParser,
) -> Result<Delivery, WebhookError> {
    let message: EventSubMessage = serde_json::from_slice(body)?;

    match message_type {
        MESSAGE_TYPE_VERIFICATION => Ok(Delivery::Verification {
            challenge: message.challenge.ok_or(WebhookError::MissingChallenge)?,
        }),
        MESSAGE_TYPE_REVOCATION => Ok(Delivery::Revocation {
            subscription_type: message.subscription.kind,
        }),
        MESSAGE_TYPE_NOTIFICATION => {
            let event = message.event.unwrap_or_default();
            match message.subscription.kind.as_str() {
                CHANNEL_POINTS_REDEMPTION_ADD => {
                    let redemption: ChannelPointsRedemption = serde_json::from_value(event)?;
                    Ok(Delivery::Notification(CreditRequest::from_channel_points(
                        parser,
                        &redemption,
                    )?))
                }
                BITS_TRANSACTION_CREATE => {
                    let transaction: BitsTransaction = serde_json::from_value(event)?;
                    Ok(Delivery::Notification(CreditRequest::from_bits(
                        parser,
                        &transaction,
                    )?))
                }
                other => Ok(Delivery::Ignored {
                    reason: format!("subscription type {other}"),
                }),
            }
        }
        other => Ok(Delivery::Ignored {
            reason: format!("message type {other}"),
        }),
    }
}

async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookError> {
    let secret = state.config.twitch.read().await.webhook_secret.clone();
    authenticate(&headers, &body, secret.as_bytes())?;

    let message_type = header_value(&headers, MESSAGE_TYPE_HEADER)?;
    match classify(message_type, &body, &state.parser)? {
        Delivery::Verification { challenge } => {
            tracing::info!("EventSub subscription verified");
            Ok(([(header::CONTENT_TYPE, "text/plain")], challenge).into_response())
        }
        Delivery::Revocation { subscription_type } => {
            tracing::warn!(%subscription_type, "EventSub subscription revoked");
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Delivery::Notification(request) => {
            match credit_tokens(&state.processor(), &request).await? {
                CreditOutcome::Credited { created } => {
                    tracing::debug!(created, source_event_id = %request.source_event_id, "Notification processed");
                }
                CreditOutcome::AlreadyCredited { existing } => {
                    tracing::debug!(existing, source_event_id = %request.source_event_id, "Redelivered notification");
                }
            }
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Delivery::Ignored { reason } => {
            tracing::info!(%reason, "Ignoring EventSub delivery");
            Ok(StatusCode::NO_CONTENT.into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};
    use itemdrop_core::entities::TokenSource;
    use itemdrop_sdk::signature::sign_message;
    use time::format_description::well_known::Rfc3339;

    const SECRET: &[u8] = b"webhook-secret";

    fn parser() -> RewardParser {
        RewardParser::new("Smash Factory Token").unwrap()
    }

    fn put(headers: &mut HeaderMap, name: &str, value: &str) {
        headers.insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }

    fn signed_headers(body: &[u8], message_type: &'static str, age: time::Duration) -> HeaderMap {
        let timestamp = (time::OffsetDateTime::now_utc() - age)
            .format(&Rfc3339)
            .unwrap();
        let signature = sign_message("msg-1", &timestamp, body, SECRET);

        let mut headers = HeaderMap::new();
        put(&mut headers, MESSAGE_ID_HEADER, "msg-1");
        put(&mut headers, MESSAGE_TIMESTAMP_HEADER, &timestamp);
        put(&mut headers, MESSAGE_SIGNATURE_HEADER, &signature);
        put(&mut headers, MESSAGE_TYPE_HEADER, message_type);
        headers
    }

    const REDEMPTION: &str = r#"{
        "subscription": {
            "id": "sub-1",
            "type": "channel.channel_points_custom_reward_redemption.add",
            "version": "1"
        },
        "event": {
            "id": "redemption-1",
            "broadcaster_user_id": "1337",
            "user_id": "9001",
            "reward": {"id": "reward-1", "title": "100 Smash Factory Tokens", "cost": 1000}
        }
    }"#;

    #[test]
    fn test_authenticate_accepts_signed_delivery() {
        let headers = signed_headers(REDEMPTION.as_bytes(), "notification", time::Duration::ZERO);
        assert!(authenticate(&headers, REDEMPTION.as_bytes(), SECRET).is_ok());
    }

    #[test]
    fn test_authenticate_rejects_tampering() {
        let headers = signed_headers(REDEMPTION.as_bytes(), "notification", time::Duration::ZERO);
        let tampered = REDEMPTION.replace("9001", "9002");
        assert!(matches!(
            authenticate(&headers, tampered.as_bytes(), SECRET),
            Err(WebhookError::Signature(SignatureError::SignatureMismatch))
        ));
        assert!(matches!(
            authenticate(&headers, REDEMPTION.as_bytes(), b"other-secret"),
            Err(WebhookError::Signature(_))
        ));
    }

    #[test]
    fn test_authenticate_rejects_stale_delivery() {
        let headers = signed_headers(
            REDEMPTION.as_bytes(),
            "notification",
            time::Duration::minutes(11),
        );
        assert!(matches!(
            authenticate(&headers, REDEMPTION.as_bytes(), SECRET),
            Err(WebhookError::Signature(SignatureError::Expired))
        ));
    }

    #[test]
    fn test_authenticate_requires_headers() {
        assert!(matches!(
            authenticate(&HeaderMap::new(), b"{}", SECRET),
            Err(WebhookError::MissingHeader(MESSAGE_ID_HEADER))
        ));
    }

    #[test]
    fn test_classify_channel_points() {
        let delivery = classify("notification", REDEMPTION.as_bytes(), &parser()).unwrap();
        let Delivery::Notification(request) = delivery else {
            panic!("expected a notification, got {delivery:?}");
        };
        assert_eq!(request.viewer_id, "9001");
        assert_eq!(request.streamer_id, "1337");
        assert_eq!(request.source, TokenSource::ChannelPoints);
        assert_eq!(request.source_event_id, "redemption-1");
        assert_eq!(request.amount, 100);
    }

    #[test]
    fn test_classify_bits() {
        let body = r#"{
            "subscription": {"id": "sub-2", "type": "extension.bits_transaction.create"},
            "event": {
                "id": "txn-1",
                "broadcaster_user_id": "1337",
                "user_id": "9001",
                "product": {"name": "Tokens", "sku": "50_tokens", "bits": 100}
            }
        }"#;
        let delivery = classify("notification", body.as_bytes(), &parser()).unwrap();
        let Delivery::Notification(request) = delivery else {
            panic!("expected a notification, got {delivery:?}");
        };
        assert_eq!(request.source, TokenSource::Bits);
        assert_eq!(request.amount, 50);
    }

    #[test]
    fn test_classify_verification_and_revocation() {
        let body = r#"{"challenge": "pogchamp", "subscription": {"id": "s", "type": "x"}}"#;
        assert!(matches!(
            classify("webhook_callback_verification", body.as_bytes(), &parser()).unwrap(),
            Delivery::Verification { challenge } if challenge == "pogchamp"
        ));
        assert!(matches!(
            classify("revocation", body.as_bytes(), &parser()).unwrap(),
            Delivery::Revocation { subscription_type } if subscription_type == "x"
        ));
    }

    #[test]
    fn test_classify_unknown_types_are_ignored() {
        let body = r#"{"subscription": {"id": "s", "type": "channel.follow"}, "event": {}}"#;
        assert!(matches!(
            classify("notification", body.as_bytes(), &parser()).unwrap(),
            Delivery::Ignored { .. }
        ));
        assert!(matches!(
            classify("something_new", body.as_bytes(), &parser()).unwrap(),
            Delivery::Ignored { .. }
        ));
    }

    #[test]
    fn test_classify_bad_reward_title() {
        let body = REDEMPTION.replace("100 Smash Factory Tokens", "Hydrate!");
        assert!(matches!(
            classify("notification", body.as_bytes(), &parser()),
            Err(WebhookError::Ingest(IngestError::InvalidRewardDescriptor(_)))
        ));
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(
            WebhookError::Signature(SignatureError::SignatureMismatch)
                .into_response()
                .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            WebhookError::Ingest(IngestError::UnknownParty {
                viewer_id: "9001".to_string(),
                streamer_id: "1337".to_string(),
            })
            .into_response()
            .status(),
            StatusCode::NO_CONTENT
        );
        assert_eq!(
            WebhookError::Ingest(IngestError::InvalidRewardDescriptor("x".to_string()))
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WebhookError::Ingest(IngestError::Database(sqlx::Error::PoolTimedOut))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
