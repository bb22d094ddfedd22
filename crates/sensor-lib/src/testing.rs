//! Scripted transport shared by link and poller tests

use crate::error::LinkError;
use crate::link::{async_trait, Transport};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted read result
#[derive(Debug, Clone)]
pub enum ReadStep {
    Data(Vec<u8>),
    Timeout,
    Fail(LinkError),
}

/// Observable side effects of a scripted transport
#[derive(Debug, Default)]
pub struct TransportProbe {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub reads: AtomicUsize,
    pub reads_while_closed: AtomicUsize,
    pub is_open: AtomicBool,
    pub written: Mutex<Vec<Vec<u8>>>,
}

pub struct ScriptedTransport {
    open_results: VecDeque<Result<(), LinkError>>,
    reads: VecDeque<ReadStep>,
    write_results: VecDeque<Result<(), LinkError>>,
    open_delay: Duration,
    probe: Arc<TransportProbe>,
}

impl ScriptedTransport {
    pub fn new() -> (Self, Arc<TransportProbe>) {
        let probe = Arc::new(TransportProbe::default());
        (
            Self {
                open_results: VecDeque::new(),
                reads: VecDeque::new(),
                write_results: VecDeque::new(),
                open_delay: Duration::ZERO,
                probe: probe.clone(),
            },
            probe,
        )
    }

    pub fn fail_opens(mut self, errors: impl IntoIterator<Item = LinkError>) -> Self {
        self.open_results.extend(errors.into_iter().map(Err));
        self
    }

    /// Every open call takes this long before it resolves
    pub fn open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn reads(mut self, steps: impl IntoIterator<Item = ReadStep>) -> Self {
        self.reads.extend(steps);
        self
    }

    pub fn lines(self, lines: &[&str]) -> Self {
        let steps: Vec<ReadStep> = lines
            .iter()
            .map(|l| ReadStep::Data(format!("{}\n", l).into_bytes()))
            .collect();
        self.reads(steps)
    }

    pub fn write_results(mut self, results: impl IntoIterator<Item = Result<(), LinkError>>) -> Self {
        self.write_results.extend(results);
        self
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&mut self) -> Result<(), LinkError> {
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        let result = self.open_results.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.probe.is_open.store(true, Ordering::SeqCst);
        }
        result
    }

    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>, LinkError> {
        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        if !self.probe.is_open.load(Ordering::SeqCst) {
            self.probe.reads_while_closed.fetch_add(1, Ordering::SeqCst);
            return Err(LinkError::NotConnected);
        }

        match self.reads.pop_front() {
            Some(ReadStep::Data(bytes)) => {
                let n = buf.len().min(bytes.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.reads.push_front(ReadStep::Data(bytes[n..].to_vec()));
                }
                Ok(Some(n))
            }
            Some(ReadStep::Timeout) => Ok(None),
            Some(ReadStep::Fail(e)) => Err(e),
            None => {
                tokio::time::sleep(timeout.min(Duration::from_millis(5))).await;
                Ok(None)
            }
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let result = self.write_results.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.probe.written.lock().unwrap().push(bytes.to_vec());
        }
        result
    }

    async fn close(&mut self) {
        if self.probe.is_open.swap(false, Ordering::SeqCst) {
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}
