use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use tokio::net::TcpListener;

/// One batch POST as the collector saw it.
#[derive(Debug, Clone)]
pub struct CollectedBatch {
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl CollectedBatch {
    pub fn items(&self) -> Vec<serde_json::Value> {
        serde_json::from_slice(&self.body).expect("batch body is not a JSON array")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[derive(Default)]
struct State {
    batches: Vec<CollectedBatch>,
    responses: VecDeque<StatusCode>,
}

/// A local batch ingestion endpoint. Answers with the scripted statuses in
/// order, then 200 for everything after.
#[derive(Clone)]
pub struct Collector {
    pub addr: SocketAddr,
    state: Arc<Mutex<State>>,
}

impl Collector {
    pub async fn start() -> Self {
        Self::with_responses(Vec::new()).await
    }

    pub async fn with_responses(responses: Vec<u16>) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .expect("failed to bind collector listener");
        let addr = listener.local_addr().expect("listener has no address");

        let state = Arc::new(Mutex::new(State {
            batches: Vec::new(),
            responses: responses
                .into_iter()
                .map(|s| StatusCode::from_u16(s).expect("invalid status"))
                .collect(),
        }));

        let state_clone = state.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener
                    .accept()
                    .await
                    .expect("failed to accept connection");
                let state = state_clone.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let state = state.clone();
                        handle(req, state)
                    });
                    let _ = Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Wait until at least `min_expected` batches arrived or `timeout`
    /// passed, then take everything collected so far.
    pub async fn drain(&self, timeout: Duration, min_expected: usize) -> Vec<CollectedBatch> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.state.lock().unwrap().batches.len() >= min_expected {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.state.lock().unwrap().batches.drain(..).collect()
    }
}

async fn handle<B>(req: Request<B>, state: Arc<Mutex<State>>) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
{
    if req.method() != Method::POST {
        return Ok(Response::builder()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .body(Full::default())
            .unwrap());
    }

    let path = req.uri().path().to_owned();
    let headers = req
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_owned(), v.to_owned()))
        })
        .collect();

    let body = req
        .collect()
        .await
        .map(|c| c.to_bytes())
        .unwrap_or_default();

    let status = {
        let mut state = state.lock().unwrap();
        state.batches.push(CollectedBatch { path, headers, body });
        state.responses.pop_front().unwrap_or(StatusCode::OK)
    };

    Ok(Response::builder()
        .status(status)
        .body(Full::default())
        .unwrap())
}
