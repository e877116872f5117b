//! Recipient-side retrieval flow.
//!
//! ```text
//! Idle -> Capturing -> TokenAcquired -> Retrieving -> Succeeded
//!           ^   |                             |
//!           |   +-> Idle (cancel)             +-> Failed -> Capturing (retry)
//! ```
//!
//! The flow owns no I/O of its own: capture goes through a
//! [`CaptureDevice`](crate::capture::CaptureDevice) and retrieval through a
//! [`BlobSource`].

use crate::capture::{capture_token, CancelSignal, CaptureDevice};
use crate::error::{ExchangeError, ExchangeResult};
use crate::source::{BlobSource, RetrievedFile};
use crate::token::{unpackage_token, ExchangeToken};
use tracing::{debug, info, warn};

/// Broad reason a retrieval failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    Forbidden,
    Decryption,
    Unavailable,
}

impl FailureKind {
    fn of(err: &ExchangeError) -> Self {
        match err {
            ExchangeError::NotFound(_) => Self::NotFound,
            ExchangeError::Forbidden(_) => Self::Forbidden,
            ExchangeError::Decryption(_) => Self::Decryption,
            _ => Self::Unavailable,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetrievalState {
    Idle,
    Capturing,
    TokenAcquired(ExchangeToken),
    Retrieving(ExchangeToken),
    Succeeded {
        token: ExchangeToken,
        file: RetrievedFile,
    },
    Failed {
        token: ExchangeToken,
        kind: FailureKind,
        message: String,
    },
}

impl RetrievalState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Capturing => "capturing",
            Self::TokenAcquired(_) => "token acquired",
            Self::Retrieving(_) => "retrieving",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }
}

/// One recipient's path from scanning a code to holding the file.
#[derive(Debug)]
pub struct RetrievalFlow {
    state: RetrievalState,
    /// Last unreadable code or capture problem, cleared on the next good scan.
    scan_error: Option<String>,
}

impl Default for RetrievalFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl RetrievalFlow {
    pub fn new() -> Self {
        Self {
            state: RetrievalState::Idle,
            scan_error: None,
        }
    }

    pub fn state(&self) -> &RetrievalState {
        &self.state
    }

    pub fn scan_error(&self) -> Option<&str> {
        self.scan_error.as_deref()
    }

    fn invalid(&self, action: &'static str) -> ExchangeError {
        ExchangeError::InvalidTransition {
            state: self.state.name(),
            action,
        }
    }

    /// Start scanning or entering a code.
    pub fn begin_capture(&mut self) -> ExchangeResult<()> {
        match self.state {
            RetrievalState::Idle
            | RetrievalState::Failed { .. }
            | RetrievalState::Succeeded { .. } => {
                self.state = RetrievalState::Capturing;
                self.scan_error = None;
                Ok(())
            }
            _ => Err(self.invalid("begin capture")),
        }
    }

    /// Offer a scanned or typed code.
    ///
    /// An unreadable code keeps the flow in `Capturing` so the user can try
    /// again; the error is returned and remembered as the scan error.
    pub fn submit_code(&mut self, raw: &str) -> ExchangeResult<ExchangeToken> {
        if self.state != RetrievalState::Capturing {
            return Err(self.invalid("submit a code"));
        }
        match unpackage_token(raw) {
            Ok(token) => {
                debug!(id = %token.id, "token acquired");
                self.scan_error = None;
                self.state = RetrievalState::TokenAcquired(token.clone());
                Ok(token)
            }
            Err(e) => {
                self.scan_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Scan codes from `device` until one parses or `cancel` fires.
    ///
    /// Cancellation returns the flow to `Idle`; a device failure does too,
    /// with the problem kept as the scan error.
    pub async fn capture<D>(&mut self, device: &mut D, cancel: CancelSignal) -> ExchangeResult<()>
    where
        D: CaptureDevice + ?Sized,
    {
        if self.state != RetrievalState::Capturing {
            return Err(self.invalid("capture"));
        }
        match capture_token(device, cancel).await {
            Ok(token) => {
                self.scan_error = None;
                self.state = RetrievalState::TokenAcquired(token);
                Ok(())
            }
            Err(e) => {
                self.state = RetrievalState::Idle;
                if !matches!(e, ExchangeError::Cancelled) {
                    self.scan_error = Some(e.user_message());
                }
                Err(e)
            }
        }
    }

    /// Abandon scanning.
    pub fn cancel_capture(&mut self) -> ExchangeResult<()> {
        if self.state != RetrievalState::Capturing {
            return Err(self.invalid("cancel capture"));
        }
        self.state = RetrievalState::Idle;
        Ok(())
    }

    /// The user confirmed the download.
    pub fn confirm(&mut self) -> ExchangeResult<()> {
        match std::mem::replace(&mut self.state, RetrievalState::Idle) {
            RetrievalState::TokenAcquired(token) => {
                self.state = RetrievalState::Retrieving(token);
                Ok(())
            }
            other => {
                self.state = other;
                Err(self.invalid("confirm"))
            }
        }
    }

    /// Fetch the confirmed file.
    ///
    /// Store and cipher failures do not surface as `Err`; they move the flow
    /// to `Failed` with a message for the user. `Err` means the flow was not
    /// in `Retrieving`.
    pub async fn retrieve(&mut self, source: &dyn BlobSource) -> ExchangeResult<&RetrievalState> {
        let token = match &self.state {
            RetrievalState::Retrieving(token) => token.clone(),
            _ => return Err(self.invalid("retrieve")),
        };

        self.state = match source.fetch(&token).await {
            Ok(file) => {
                info!(id = %token.id, size = file.data.len(), "file retrieved");
                RetrievalState::Succeeded { token, file }
            }
            Err(e) => {
                warn!(id = %token.id, error = %e, "retrieval failed");
                RetrievalState::Failed {
                    kind: FailureKind::of(&e),
                    message: e.user_message(),
                    token,
                }
            }
        };
        Ok(&self.state)
    }

    /// Delete the retrieved file from the source.
    pub async fn discard_remote(&self, source: &dyn BlobSource) -> ExchangeResult<()> {
        match &self.state {
            RetrievalState::Succeeded { token, .. } => source.remove(token).await,
            _ => Err(self.invalid("discard")),
        }
    }

    /// Go back to scanning after a failure.
    pub fn retry(&mut self) -> ExchangeResult<()> {
        if !matches!(self.state, RetrievalState::Failed { .. }) {
            return Err(self.invalid("retry"));
        }
        self.state = RetrievalState::Capturing;
        Ok(())
    }

    /// Drop everything and return to `Idle`.
    pub fn reset(&mut self) {
        self.state = RetrievalState::Idle;
        self.scan_error = None;
    }

    /// The retrieved file, once the flow has succeeded.
    pub fn file(&self) -> Option<&RetrievedFile> {
        match &self.state {
            RetrievalState::Succeeded { file, .. } => Some(file),
            _ => None,
        }
    }
}
