#![allow(dead_code)]

use std::{
    io::Cursor,
    net::{SocketAddr, TcpListener},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use serde_json::Value;
use url::Url;

use car_recognition_rs::{
    relay::RecognitionRelay,
    routes::{router, AppState},
};

pub const TEST_BODY_LIMIT: usize = 32 * 1024 * 1024;

pub async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(app.into_make_service());
    tokio::spawn(server);
    addr
}

/// Starts the relay service pointed at `upstream`.
pub async fn spawn_service(upstream: Option<Url>, timeout: Duration) -> String {
    let state = Arc::new(AppState {
        relay: RecognitionRelay::new(upstream, timeout),
        max_upload_size_mb: 5.0,
    });
    let addr = spawn(router(state, TEST_BODY_LIMIT)).await;
    format!("http://{}", addr)
}

#[derive(Clone)]
pub enum Reply {
    Json(StatusCode, Value),
    Text(StatusCode, &'static str),
    Delayed(Duration, Value),
}

#[derive(Debug, Clone)]
pub struct ReceivedPart {
    pub name: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Stand-in for the external classifier. Records every call it gets.
#[derive(Clone)]
pub struct FakeClassifier {
    reply: Reply,
    pub hits: Arc<AtomicUsize>,
    pub received: Arc<Mutex<Vec<ReceivedPart>>>,
}

impl FakeClassifier {
    pub fn new(reply: Reply) -> Self {
        FakeClassifier {
            reply,
            hits: Arc::new(AtomicUsize::new(0)),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn start(&self) -> Url {
        let app = Router::new()
            .route("/predict", post(classify))
            .with_state(self.clone());
        let addr = spawn(app).await;
        Url::parse(&format!("http://{}/predict", addr)).unwrap()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn parts(&self) -> Vec<ReceivedPart> {
        self.received.lock().unwrap().clone()
    }
}

async fn classify(State(fake): State<FakeClassifier>, mut multipart: Multipart) -> Response {
    fake.hits.fetch_add(1, Ordering::SeqCst);

    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().map(str::to_owned);
        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(str::to_owned);
        let bytes = field.bytes().await.unwrap().to_vec();
        fake.received.lock().unwrap().push(ReceivedPart {
            name,
            file_name,
            content_type,
            bytes,
        });
    }

    match fake.reply {
        Reply::Json(status, body) => (status, Json(body)).into_response(),
        Reply::Text(status, body) => (status, body).into_response(),
        Reply::Delayed(delay, body) => {
            tokio::time::sleep(delay).await;
            Json(body).into_response()
        }
    }
}

pub fn honda_reply() -> Value {
    serde_json::json!({
        "status": "success",
        "top_prediction": { "class": "Honda Civic 2019", "confidence": 1.2 },
        "predictions": [
            { "class": "Honda Civic 2019", "confidence": 1.2 },
            { "class": "Honda Accord", "confidence": 0.8 }
        ]
    })
}

pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 200]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .unwrap();
    bytes
}

pub fn noisy_png(width: u32, height: u32) -> Vec<u8> {
    let mut seed: u32 = 0x9e37_79b9;
    let img = RgbImage::from_fn(width, height, |_, _| {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        let [r, g, b, _] = seed.to_le_bytes();
        Rgb([r, g, b])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .unwrap();
    bytes
}
