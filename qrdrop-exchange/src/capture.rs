//! Code capture sessions.
//!
//! A capture device (camera scanner, clipboard watcher, text prompt) is held
//! for exactly the lifetime of a [`CaptureSession`]. Dropping the session
//! stops the device, so it is released whether capture ends with a token, an
//! error, or a cancellation.

use crate::error::{ExchangeError, ExchangeResult};
use crate::token::{unpackage_token, ExchangeToken};
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info};

/// Source of raw code strings.
#[async_trait]
pub trait CaptureDevice: Send {
    /// Acquire the underlying device.
    async fn start(&mut self) -> ExchangeResult<()>;

    /// Next decoded code, or `None` once the device has nothing more to give.
    async fn next_code(&mut self) -> Option<String>;

    /// Release the device. Must be safe to call after a failed `start`.
    fn stop(&mut self);
}

/// Scoped ownership of a started device.
pub struct CaptureSession<'a, D: CaptureDevice + ?Sized> {
    device: &'a mut D,
}

impl<'a, D: CaptureDevice + ?Sized> CaptureSession<'a, D> {
    /// Starts `device`. If starting fails the device is stopped again.
    pub async fn open(device: &'a mut D) -> ExchangeResult<Self> {
        if let Err(e) = device.start().await {
            device.stop();
            return Err(e);
        }
        Ok(Self { device })
    }

    pub async fn next_code(&mut self) -> Option<String> {
        self.device.next_code().await
    }
}

impl<D: CaptureDevice + ?Sized> Drop for CaptureSession<'_, D> {
    fn drop(&mut self) {
        self.device.stop();
        debug!("capture device released");
    }
}

/// Cancels a capture in progress.
#[derive(Clone)]
pub struct CaptureCanceller {
    tx: watch::Sender<bool>,
}

impl CaptureCanceller {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiving half handed to [`capture_token`].
#[derive(Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Never resolves if the canceller is dropped
    /// without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

pub fn cancel_pair() -> (CaptureCanceller, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CaptureCanceller { tx }, CancelSignal { rx })
}

/// Reads codes from `device` until one parses into a token.
///
/// Unreadable codes are skipped, matching a scanner that keeps looking.
pub async fn capture_token<D>(device: &mut D, mut cancel: CancelSignal) -> ExchangeResult<ExchangeToken>
where
    D: CaptureDevice + ?Sized,
{
    if cancel.is_cancelled() {
        return Err(ExchangeError::Cancelled);
    }

    let mut session = CaptureSession::open(device).await?;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("capture cancelled");
                return Err(ExchangeError::Cancelled);
            }
            code = session.next_code() => match code {
                Some(raw) => match unpackage_token(&raw) {
                    Ok(token) => return Ok(token),
                    Err(e) => debug!(error = %e, "ignoring unreadable code"),
                },
                None => {
                    return Err(ExchangeError::DeviceUnavailable(
                        "capture stream ended".into(),
                    ));
                }
            },
        }
    }
}
