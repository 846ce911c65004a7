use async_stream::stream;
use axum::extract::{Path, State};
use axum::http::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::{AppState, Error};
use domain::broadcast as BroadcastApi;
use domain::counter::CounterUpdate;
use domain::error::{DomainErrorKind, Error as DomainError, InternalErrorKind};
use domain::gateway::fanout;
use log::*;
use sse::DeliveryResult;
use tokio::sync::mpsc;

const EVENT_STREAM_MIME: &str = "text/event-stream";

/// GET the counter for a channel: a single JSON value, a direct SSE stream,
/// or a delegated hold answered on the fan-out provider's behalf.
///
/// Classification is header-driven: `Accept: text/event-stream` selects
/// streaming, and a `Grip-Sig` header (added by the fan-out proxy) selects
/// the delegated mode. The value is recomputed before classification, always.
#[utoipa::path(
    get,
    path = "/counter/{id}",
    params(
        ("id" = String, Path, description = "Counter channel id")
    ),
    responses(
        (status = 200, description = "Current counter value, or a held event-stream of values", body = domain::counter::CounterUpdate),
        (status = 500, description = "Internal Server Error")
    )
)]
pub async fn subscribe(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, Error> {
    let update = CounterUpdate::current();

    let wants_stream = headers
        .get(ACCEPT)
        .and_then(|value| value.to_str().ok())
        .map(|value| value == EVENT_STREAM_MIME)
        .unwrap_or(false);
    let via_gateway = headers.contains_key(fanout::GRIP_SIG_HEADER);

    if !wants_stream {
        debug!("GET single-shot counter value for channel {id}");
        return Ok(Json(update).into_response());
    }

    if via_gateway {
        debug!("GET delegated-stream hold for channel {id}");
        return delegated_stream_response(&id, &update);
    }

    debug!("GET direct counter stream for channel {id}");
    Ok(direct_stream_response(&app_state, id, &update))
}

/// POST a counter update for a channel, fanned out via the provider.
///
/// Delivery is at-most-effort: provider failures are logged and swallowed,
/// and the freshly computed value is returned regardless.
#[utoipa::path(
    post,
    path = "/counter/{id}",
    params(
        ("id" = String, Path, description = "Counter channel id")
    ),
    responses(
        (status = 200, description = "New counter value; fan-out publish attempted", body = domain::counter::CounterUpdate),
        (status = 500, description = "Internal Server Error")
    )
)]
pub async fn publish(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let update = CounterUpdate::current();
    debug!(
        "POST publish value {} for channel {id} via fan-out provider",
        update.value
    );

    // Best-effort fan-out - log failures, still answer with the fresh value
    if let Err(e) = BroadcastApi::publish_update(&app_state.config, &id, &update).await {
        warn!("Failed to publish update for channel {id}: {e:?}");
    }

    Ok(Json(update))
}

/// POST a counter update for a channel, delivered to the locally-held
/// subscriber without any outbound network call.
#[utoipa::path(
    post,
    path = "/vanilla/counter/{id}",
    params(
        ("id" = String, Path, description = "Counter channel id")
    ),
    responses(
        (status = 200, description = "New counter value; local delivery attempted", body = domain::counter::CounterUpdate),
        (status = 500, description = "Internal Server Error")
    )
)]
pub async fn publish_direct(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let update = CounterUpdate::current();
    debug!(
        "POST deliver value {} for channel {id} to local subscriber",
        update.value
    );

    match app_state.sse_manager.deliver(&id, &update) {
        DeliveryResult::Delivered => debug!("Delivered update to channel {id}"),
        DeliveryResult::NoSubscriber => debug!("No local subscriber for channel {id}"),
        DeliveryResult::Failed => warn!("Failed to deliver update to channel {id}"),
    }

    Ok(Json(update))
}

/// GRIP hold instructions for the fan-out proxy: the proxy converts this
/// terminated response into a long-lived connection it holds itself. This
/// server keeps no sink for it.
fn delegated_stream_response(channel_id: &str, update: &CounterUpdate) -> Result<Response, Error> {
    let channel = fanout::grip_channel(channel_id);
    let channel_value = HeaderValue::from_str(&channel).map_err(|err| DomainError {
        source: Some(Box::new(err)),
        error_kind: DomainErrorKind::Internal(InternalErrorKind::Other(
            "Channel id is not a valid header value".to_string(),
        )),
    })?;

    Ok((
        [
            (
                HeaderName::from_static(fanout::GRIP_HOLD_HEADER),
                HeaderValue::from_static("stream"),
            ),
            (
                HeaderName::from_static(fanout::GRIP_CHANNEL_HEADER),
                channel_value,
            ),
            (CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM_MIME)),
        ],
        update.sse_frame()?,
    )
        .into_response())
}

/// A held SSE response fed from the channel registry, with one initial frame
/// queued before the handler returns.
fn direct_stream_response(app_state: &AppState, channel_id: String, update: &CounterUpdate) -> Response {
    let (tx, mut rx) = mpsc::unbounded_channel();

    // Initial frame, queued ahead of anything a racing publish might deliver
    match serde_json::to_string(update) {
        Ok(json) => {
            let _ = tx.send(Ok(Event::default().data(json)));
        }
        Err(e) => error!("Failed to serialize initial counter frame: {e}"),
    }

    let guard = app_state.sse_manager.subscribe(channel_id.clone(), tx);

    // The guard moves into the stream: dropping the response body - client
    // disconnect, graceful or abrupt, or replacement by a newer subscriber -
    // unregisters this connection exactly once.
    let stream = stream! {
        let _guard = guard;

        while let Some(event) = rx.recv().await {
            yield event;
        }

        debug!("Counter stream closed for channel {channel_id}");
    };

    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response();
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::define_routes;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use futures::StreamExt;
    use http_body_util::BodyExt;
    use serial_test::serial;
    use service::config::Config;
    use std::env;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState::new(Config::default(), &Arc::new(sse::Manager::new()))
    }

    fn get_request(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    /// Helper struct to manage environment variables in tests
    struct EnvGuard {
        saved_vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(vars: &[&str]) -> Self {
            let saved_vars = vars
                .iter()
                .map(|var| (var.to_string(), env::var(var).ok()))
                .collect();
            EnvGuard { saved_vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.saved_vars {
                match value {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[tokio::test]
    #[serial]
    async fn single_shot_get_returns_current_value_as_json() {
        let app = define_routes(test_state());

        let response = app.oneshot(get_request("/counter/1", &[])).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let update: CounterUpdate = serde_json::from_slice(&body).unwrap();
        assert!(update.value >= domain::counter::BASE_POPULATION as u64);
    }

    #[tokio::test]
    #[serial]
    async fn direct_stream_has_streaming_headers_and_initial_frame() {
        let app = define_routes(test_state());

        let response = app
            .oneshot(get_request(
                "/counter/1",
                &[("accept", "text/event-stream")],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );
        assert_eq!(response.headers().get("cache-control").unwrap(), "no-cache");
        // No GRIP hold instructions on the direct path
        assert!(response.headers().get("grip-hold").is_none());

        // The initial frame is queued before any POST occurs
        let mut body = response.into_body().into_data_stream();
        let first_chunk = body.next().await.unwrap().unwrap();
        let frame = String::from_utf8(first_chunk.to_vec()).unwrap();
        assert!(frame.starts_with("data: {\"value\":"), "frame: {frame}");
        assert!(frame.ends_with("\n\n"), "frame: {frame}");
    }

    #[tokio::test]
    #[serial]
    async fn delegated_stream_returns_hold_headers_and_terminates() {
        let app = define_routes(test_state());

        let response = app
            .oneshot(get_request(
                "/counter/7",
                &[
                    ("accept", "text/event-stream"),
                    ("grip-sig", "test-signature"),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("grip-hold").unwrap(), "stream");
        assert_eq!(
            response.headers().get("grip-channel").unwrap(),
            "counter-7"
        );
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );

        // Terminates immediately with exactly one initial frame as body
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let frame = String::from_utf8(body.to_vec()).unwrap();
        assert!(frame.starts_with("data: {\"value\":"), "frame: {frame}");
        assert!(frame.ends_with("\n\n"), "frame: {frame}");
    }

    #[tokio::test]
    #[serial]
    async fn direct_and_delegated_paths_use_identical_framing() {
        let app = define_routes(test_state());

        let direct = app
            .clone()
            .oneshot(get_request(
                "/counter/1",
                &[("accept", "text/event-stream")],
            ))
            .await
            .unwrap();
        let mut direct_body = direct.into_body().into_data_stream();
        let direct_frame =
            String::from_utf8(direct_body.next().await.unwrap().unwrap().to_vec()).unwrap();

        let delegated = app
            .oneshot(get_request(
                "/counter/1",
                &[
                    ("accept", "text/event-stream"),
                    ("grip-sig", "test-signature"),
                ],
            ))
            .await
            .unwrap();
        let delegated_frame = String::from_utf8(
            delegated
                .into_body()
                .collect()
                .await
                .unwrap()
                .to_bytes()
                .to_vec(),
        )
        .unwrap();

        // Byte-identical framing apart from the clock-dependent digits
        let strip_digits = |s: &str| s.replace(|c: char| c.is_ascii_digit(), "");
        assert_eq!(strip_digits(&direct_frame), strip_digits(&delegated_frame));
    }

    #[tokio::test]
    #[serial]
    async fn direct_publish_delivers_exactly_one_update_to_subscriber() {
        let state = test_state();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _guard = state.sse_manager.subscribe("5".to_string(), tx);
        let app = define_routes(state);

        let response = app.oneshot(post_request("/vanilla/counter/5")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let update: CounterUpdate = serde_json::from_slice(&body).unwrap();

        let event = rx.try_recv().expect("subscriber should receive one update");
        assert!(format!("{:?}", event).contains(&update.value.to_string()));
        assert!(rx.try_recv().is_err(), "expected exactly one write");
    }

    #[tokio::test]
    #[serial]
    async fn direct_publish_without_subscriber_still_returns_ok() {
        let app = define_routes(test_state());

        let response = app
            .oneshot(post_request("/vanilla/counter/unsubscribed"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    #[serial]
    async fn provider_publish_failure_is_swallowed_and_local_sink_untouched() {
        let _env = EnvGuard::new(&["FASTLY_SERVICE_ID", "FASTLY_KEY", "FASTLY_API_BASE_URL"]);
        let mut server = mockito::Server::new_async().await;
        env::set_var("FASTLY_SERVICE_ID", "test_service");
        env::set_var("FASTLY_KEY", "test_api_key_123");
        env::set_var("FASTLY_API_BASE_URL", server.url());

        let mock = server
            .mock("POST", "/service/test_service/publish/")
            .with_status(500)
            .create_async()
            .await;

        let state = test_state();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _guard = state.sse_manager.subscribe("5".to_string(), tx);
        let app = define_routes(state);

        let response = app.oneshot(post_request("/counter/5")).await.unwrap();

        // The provider path never touches the local registry, and the 500 is
        // swallowed - the caller still gets the fresh value.
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let update: CounterUpdate = serde_json::from_slice(&body).unwrap();
        assert!(update.value > 0);
        assert!(rx.try_recv().is_err(), "local sink must receive nothing");
        mock.assert_async().await;
    }

    #[tokio::test]
    #[serial]
    async fn gateway_publish_reaches_provider_endpoint() {
        let _env = EnvGuard::new(&["FASTLY_SERVICE_ID", "FASTLY_KEY", "FASTLY_API_BASE_URL"]);
        let mut server = mockito::Server::new_async().await;
        env::set_var("FASTLY_SERVICE_ID", "test_service");
        env::set_var("FASTLY_KEY", "test_api_key_123");
        env::set_var("FASTLY_API_BASE_URL", server.url());

        let mock = server
            .mock("POST", "/service/test_service/publish/")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "items": [{"channel": "counter-9"}]
            })))
            .with_status(200)
            .create_async()
            .await;

        let app = define_routes(test_state());
        let response = app.oneshot(post_request("/counter/9")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        mock.assert_async().await;
    }

    #[tokio::test]
    #[serial]
    async fn health_check_returns_ok() {
        let app = define_routes(test_state());

        let response = app.oneshot(get_request("/health", &[])).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
