//! Moment Capture Service
//!
//! Webhook service that reacts to storage object-creation notifications for
//! uploaded videos. Each event is handled once, start to finish: the video is
//! downloaded to scratch storage, handed to a hosted multimodal model that
//! locates the first moment matching a fixed natural-language description,
//! the frame at that moment is decoded as PNG, and, when an output bucket is
//! configured, the frame is published back to object storage.
//!
//! ## Request flow
//!
//! ```text
//! POST / (storage event)
//!   │
//!   ▼
//! Event Decoder ──▶ Blob Fetcher ──▶ Moment Locator ──▶ Frame Extractor
//!  (bucket,name)    (scratch file)    (hosted model)      (ffmpeg)
//!                                                            │
//!                                                            ▼
//!                                                     Result Publisher
//!                                                      (output bucket)
//! ```
//!
//! Nothing persists between requests; the only local resource is the scratch
//! video file, removed on every exit path, and the only remote resource is
//! the uploaded model file, deleted best-effort after analysis.

pub mod config;
pub mod error;
pub mod event;
pub mod frame;
pub mod gemini;
pub mod locator;
pub mod server;
pub mod storage;

pub use config::Config;
pub use error::AppError;
pub use event::{decode_object_ref, ObjectRef};
pub use gemini::{FileHandle, FileState, GeminiClient, GeminiError};
pub use locator::{GeminiMomentLocator, MomentAnalyzer, MomentOutcome};
pub use server::{create_router, start_server, AppState};
pub use storage::{DownloadedVideo, ObjectStore, S3ObjectStore};
