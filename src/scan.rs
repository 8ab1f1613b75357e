// src/scan.rs

use crate::aggregate::ReconciliationResult;
use crate::reconcile::Session;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A capture device delivering decoded barcode / QR text.
#[async_trait]
pub trait ScanSource: Send {
    /// Next decoded text, or `None` once capture has ended.
    async fn next_scan(&mut self) -> Option<String>;

    /// Teardown hook. After this, `next_scan` yields nothing.
    async fn stop(&mut self);
}

/// Keyboard-wedge scanners: one code per line on stdin.
pub struct StdinScanner {
    lines: Lines<BufReader<Stdin>>,
    stopped: bool,
}

impl StdinScanner {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            stopped: false,
        }
    }
}

impl Default for StdinScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScanSource for StdinScanner {
    async fn next_scan(&mut self) -> Option<String> {
        while !self.stopped {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    let code = line.trim_end_matches('\r');
                    if !code.is_empty() {
                        return Some(code.to_string());
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    warn!(error = %e, "Reading scans from stdin failed");
                    return None;
                }
            }
        }
        None
    }

    async fn stop(&mut self) {
        self.stopped = true;
    }
}

/// Scans pushed by another task, e.g. a decoder thread.
pub struct ChannelScanner {
    rx: mpsc::Receiver<String>,
    stopped: bool,
}

impl ChannelScanner {
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx, stopped: false }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

#[async_trait]
impl ScanSource for ChannelScanner {
    async fn next_scan(&mut self) -> Option<String> {
        if self.stopped {
            return None;
        }
        self.rx.recv().await
    }

    async fn stop(&mut self) {
        self.stopped = true;
        self.rx.close();
    }
}

/// How the operator ends a conference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Finalize,
    Cancel,
}

#[derive(Debug)]
pub enum ConferenceEnd {
    Finalized(ReconciliationResult),
    Cancelled,
}

/// Feed scans into `session` one at a time until the source ends or a
/// control message arrives. The source is always stopped before returning.
///
/// End of the scan stream finalizes; a closed control channel is ignored.
pub async fn run_conference<S: ScanSource + ?Sized>(
    mut session: Session,
    source: &mut S,
    mut control: mpsc::Receiver<Control>,
) -> ConferenceEnd {
    let mut control_open = true;

    let decision = loop {
        tokio::select! {
            biased;
            cmd = control.recv(), if control_open => match cmd {
                Some(cmd) => break cmd,
                None => control_open = false,
            },
            scan = source.next_scan() => match scan {
                Some(text) => {
                    session.apply_scan(&text);
                }
                None => {
                    info!("Scan stream ended");
                    break Control::Finalize;
                }
            },
        }
    };

    source.stop().await;

    match decision {
        Control::Finalize => ConferenceEnd::Finalized(session.finalize()),
        Control::Cancel => {
            session.cancel();
            ConferenceEnd::Cancelled
        }
    }
}
