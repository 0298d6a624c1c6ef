//! Shared fixtures for the HTTP integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::routing::get;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use rembg_server::{
    error::{RemovalError, Result},
    router, AppState, BackgroundRemover, ImageFetcher, RemovalService,
};
use std::io::Cursor;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use url::Url;

/// How a [`MockFetcher`] answers
#[derive(Debug, Clone)]
pub enum FetchBehavior {
    Bytes(Vec<u8>),
    Fail(String),
    Panic(String),
}

/// Fetcher returning canned bytes and recording every URL it was asked for
#[derive(Debug, Clone)]
pub struct MockFetcher {
    behavior: FetchBehavior,
    calls: Arc<Mutex<Vec<Url>>>,
}

impl MockFetcher {
    pub fn new(behavior: FetchBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn serving_png(width: u32, height: u32) -> Self {
        Self::new(FetchBehavior::Bytes(test_png(width, height)))
    }

    pub fn calls(&self) -> Vec<Url> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageFetcher for MockFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        self.calls.lock().unwrap().push(url.clone());
        match &self.behavior {
            FetchBehavior::Bytes(bytes) => Ok(bytes.clone()),
            FetchBehavior::Fail(reason) => Err(RemovalError::network_error(url.as_str(), reason)),
            FetchBehavior::Panic(message) => panic!("{}", message),
        }
    }
}

/// Deterministic remover: the left half becomes transparent
#[derive(Debug, Default)]
pub struct HalfRemover;

impl BackgroundRemover for HalfRemover {
    fn remove(&self, image: DynamicImage) -> Result<RgbaImage> {
        let mut rgba = image.to_rgba8();
        let half = rgba.width() / 2;
        for (x, _, pixel) in rgba.enumerate_pixels_mut() {
            if x < half {
                *pixel = Rgba([0, 0, 0, 0]);
            }
        }
        Ok(rgba)
    }

    fn model_name(&self) -> String {
        "half-mock".to_string()
    }
}

/// Remover that panics on the blocking worker
#[derive(Debug, Default)]
pub struct PanickingRemover;

impl BackgroundRemover for PanickingRemover {
    fn remove(&self, _image: DynamicImage) -> Result<RgbaImage> {
        panic!("segmentation worker crashed")
    }

    fn model_name(&self) -> String {
        "panicking-mock".to_string()
    }
}

/// Opaque PNG with a horizontal gradient
pub fn test_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 255 / width.max(1)) as u8, (y % 256) as u8, 128, 255])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Temporary `static/` and `templates/` directories
pub struct Site {
    pub dir: TempDir,
}

impl Site {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("static")).unwrap();
        std::fs::create_dir_all(dir.path().join("templates")).unwrap();
        std::fs::write(dir.path().join("static/app.js"), "console.log('rembg');").unwrap();
        std::fs::write(
            dir.path().join("templates/index.html"),
            "<html><body><h1>rembg</h1><p>model {{ model }}</p></body></html>",
        )
        .unwrap();
        Self { dir }
    }

    pub fn static_dir(&self) -> PathBuf {
        self.dir.path().join("static")
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.dir.path().join("templates")
    }

    pub fn app(
        &self,
        fetcher: impl ImageFetcher + 'static,
        remover: impl BackgroundRemover + 'static,
    ) -> axum::Router {
        let service = RemovalService::new(Arc::new(fetcher), Arc::new(remover));
        router(AppState::new(service, self.templates_dir()), self.static_dir())
    }
}

/// Local image server on an ephemeral port
///
/// `/image.png` answers `test_png(12, 10)`, `/slow.png` answers after five
/// seconds and every other path is a 404.
pub async fn spawn_image_server() -> SocketAddr {
    let png = test_png(12, 10);
    let app = axum::Router::new()
        .route("/image.png", get(move || async move { png }))
        .route(
            "/slow.png",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "too late"
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub fn local_url(addr: SocketAddr, path: &str) -> Url {
    Url::parse(&format!("http://{addr}{path}")).unwrap()
}
