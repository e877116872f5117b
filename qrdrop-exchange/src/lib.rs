//! Exchange layer for QRDrop.
//!
//! An uploader gets back an [`ExchangeToken`] (file id, access key and the
//! optional name and type) which is rendered as a QR code. A recipient scans
//! or types that code, and a [`RetrievalFlow`] walks it from capture through
//! confirmation to the decrypted file, fetched from any [`BlobSource`]:
//! a [`LocalSource`] over an in-process store or a [`ShareClient`] talking to
//! a sharing server.

pub mod api_client;
pub mod capture;
pub mod config;
pub mod error;
pub mod retrieval;
pub mod source;
pub mod token;

pub use api_client::{HealthStatus, ShareClient, UploadReceipt};
pub use capture::{cancel_pair, capture_token, CancelSignal, CaptureCanceller, CaptureDevice, CaptureSession};
pub use config::ClientConfig;
pub use error::{ExchangeError, ExchangeResult, TokenError};
pub use retrieval::{FailureKind, RetrievalFlow, RetrievalState};
pub use source::{BlobSource, LocalSource, RetrievedFile, DEFAULT_FILE_NAME};
pub use token::{package_token, unpackage_token, ExchangeToken};
