//! Scripted transport for exercising the connection and pump logic.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;
use url::Url;

use crate::connection::{CloseCode, ConnectionConfig, Link, Transport};
use crate::error::{ConnectError, WriteError};

/// What the next `open` call does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dial {
    Accept,
    Refuse,
    Stall,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Open(u64),
    Refused,
    Close(u64, CloseCode),
}

#[derive(Debug, Default)]
struct Script {
    dials: VecDeque<Dial>,
    link_budgets: VecDeque<Option<usize>>,
    links_opened: u64,
    attempts: Vec<Instant>,
    events: Vec<Event>,
    sent: Vec<(u64, Bytes)>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue dial outcomes; once exhausted every dial is accepted.
    pub(crate) fn script_dials(&self, dials: &[Dial]) {
        self.script.lock().dials.extend(dials.iter().copied());
    }

    pub(crate) fn fail_connects(&self, count: usize) {
        self.script_dials(&vec![Dial::Refuse; count]);
    }

    /// Number of frames the next opened link accepts before failing.
    pub(crate) fn push_link_budget(&self, budget: Option<usize>) {
        self.script.lock().link_budgets.push_back(budget);
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.script.lock().events.clone()
    }

    pub(crate) fn attempts(&self) -> Vec<Instant> {
        self.script.lock().attempts.clone()
    }

    pub(crate) fn sent(&self) -> Vec<Bytes> {
        self.script.lock().sent.iter().map(|(_, b)| b.clone()).collect()
    }

    pub(crate) fn sent_on(&self, link: u64) -> Vec<Bytes> {
        self.script
            .lock()
            .sent
            .iter()
            .filter(|(id, _)| *id == link)
            .map(|(_, b)| b.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Link = ScriptedLink;

    async fn open(&self, _endpoint: &Url, _config: &ConnectionConfig) -> Result<ScriptedLink, ConnectError> {
        let dial = {
            let mut script = self.script.lock();
            script.attempts.push(Instant::now());
            script.dials.pop_front().unwrap_or(Dial::Accept)
        };

        match dial {
            Dial::Accept => {
                let mut script = self.script.lock();
                script.links_opened += 1;
                let id = script.links_opened;
                script.events.push(Event::Open(id));
                let budget = script.link_budgets.pop_front().flatten();
                Ok(ScriptedLink {
                    id,
                    budget,
                    script: self.script.clone(),
                })
            }
            Dial::Refuse => {
                self.script.lock().events.push(Event::Refused);
                Err(ConnectError::Io(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "scripted refusal",
                )))
            }
            Dial::Stall => std::future::pending().await,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ScriptedLink {
    id: u64,
    budget: Option<usize>,
    script: Arc<Mutex<Script>>,
}

#[async_trait]
impl Link for ScriptedLink {
    async fn send_frame(&mut self, payload: Bytes) -> Result<(), WriteError> {
        match self.budget {
            Some(0) => return Err(WriteError::ConnectionClosed),
            Some(ref mut left) => *left -= 1,
            None => {}
        }
        self.script.lock().sent.push((self.id, payload));
        Ok(())
    }

    async fn close(&mut self, code: CloseCode) -> Result<(), WriteError> {
        self.script.lock().events.push(Event::Close(self.id, code));
        Ok(())
    }
}
