#![allow(dead_code)]

use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use santascribe::{router, AppConfig, AppState};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// What the fake chat-completions endpoint does with each request.
#[derive(Clone)]
pub enum Behavior {
    /// Streams these deltas then `[DONE]`; buffered calls get them joined.
    Reply(Vec<&'static str>),
    /// Streams these deltas then an error chunk, never `[DONE]`.
    BreakMidStream(Vec<&'static str>),
    /// Streams these deltas, then half an event, then closes the body.
    Truncate(Vec<&'static str>),
    /// Streams this delta every few milliseconds until the connection goes away.
    Trickle(&'static str),
    /// Answers with this status and an OpenAI-style error body.
    Fail(StatusCode, &'static str),
}

#[derive(Clone)]
pub struct FakeUpstream {
    behavior: Behavior,
    hits: Arc<AtomicUsize>,
    last_body: Arc<Mutex<Option<Value>>>,
    released: Arc<AtomicBool>,
}

impl FakeUpstream {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// True once a trickling body has been dropped by the server.
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn last_body(&self) -> Value {
        self.last_body
            .lock()
            .unwrap()
            .clone()
            .expect("upstream was never called")
    }
}

async fn completions(State(fake): State<FakeUpstream>, Json(body): Json<Value>) -> Response {
    fake.hits.fetch_add(1, Ordering::SeqCst);
    let stream = body["stream"].as_bool().unwrap_or(false);
    *fake.last_body.lock().unwrap() = Some(body);

    match fake.behavior {
        Behavior::Fail(status, message) => (
            status,
            Json(json!({ "error": { "message": message, "type": "test_error" } })),
        )
            .into_response(),
        Behavior::Reply(deltas) if !stream => Json(json!({
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": deltas.concat() } }]
        }))
        .into_response(),
        Behavior::Reply(deltas) => {
            let mut body = chunks(&deltas);
            body.push_str("data: [DONE]\n\n");
            event_stream(body)
        }
        Behavior::BreakMidStream(deltas) => {
            let mut body = chunks(&deltas);
            body.push_str("data: {\"error\":{\"message\":\"The server had an error while processing your request\"}}\n\n");
            event_stream(body)
        }
        Behavior::Truncate(deltas) => {
            let mut body = chunks(&deltas);
            body.push_str("data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\" P.S. Rudolph\"}}]}\n");
            event_stream(body)
        }
        Behavior::Trickle(delta) => trickle(delta, fake.released.clone()),
    }
}

/// Flags the fake when the server drops the body it was streaming.
struct ReleaseOnDrop(Arc<AtomicBool>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

const TRICKLE_INTERVAL: Duration = Duration::from_millis(20);
const TRICKLE_LIMIT: u32 = 1_000;

fn trickle(delta: &'static str, released: Arc<AtomicBool>) -> Response {
    let guard = ReleaseOnDrop(released);
    let events = futures_util::stream::unfold((guard, 0u32), move |(guard, sent)| async move {
        if sent >= TRICKLE_LIMIT {
            return None;
        }
        if sent > 0 {
            tokio::time::sleep(TRICKLE_INTERVAL).await;
        }
        let event = chunks(&[delta]);
        Some((Ok::<_, Infallible>(event), (guard, sent + 1)))
    });

    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(events),
    )
        .into_response()
}

fn chunks(deltas: &[&str]) -> String {
    let mut body = String::from("data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n");
    for delta in deltas {
        let chunk = json!({ "choices": [{ "index": 0, "delta": { "content": delta } }] });
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body
}

fn event_stream(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Starts a fake upstream; returns its `/v1` base URL and a handle for assertions.
pub async fn spawn_upstream(behavior: Behavior) -> (String, FakeUpstream) {
    let fake = FakeUpstream {
        behavior,
        hits: Arc::new(AtomicUsize::new(0)),
        last_body: Arc::new(Mutex::new(None)),
        released: Arc::new(AtomicBool::new(false)),
    };
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .with_state(fake.clone());
    let base = serve(app).await;
    (format!("{base}/v1"), fake)
}

/// A base URL nothing is listening on.
pub async fn dead_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/v1")
}

pub async fn spawn_app(api_key: Option<&str>, upstream_base: &str) -> String {
    let mut config = AppConfig::new(api_key.map(str::to_string));
    config.openai_base_url = upstream_base.to_string();
    let state = AppState::new(config).unwrap();
    serve(router(state)).await
}

pub const TEST_KEY: &str = "sk-test-0123456789";

pub const MIA_LETTER: &[&str] = &[
    "Ho Ho Ho, Mia!\n\n",
    "The elves told me how you helped your brother.\n\n",
    "You are on my GOOD LIST, and a shiny bicycle is on the sleigh.\n\n",
    "Santa Claus\n\n",
    "P.S. Rudolph says hello!",
];
