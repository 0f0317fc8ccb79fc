#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use rangefeed::{
    AttemptResponse, AttemptTransport, Endpoint, InMemoryLocationCache, InMemoryPartitionTopology,
    OperationRequest, PartitionKeyRange, PartitionRange, TransportError, headers,
};

/// What a scripted transport does for one attempt.
pub enum Step {
    Respond(AttemptResponse),
    Fail(&'static str),
}

/// Snapshot of one attempt the transport received.
#[derive(Debug, Clone)]
pub struct SentAttempt {
    pub endpoint: Option<Endpoint>,
    pub headers: HeaderMap,
}

impl SentAttempt {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }
}

/// Plays back a fixed script, then answers 200 with no body.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    sent: Mutex<Vec<SentAttempt>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<SentAttempt> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl AttemptTransport for ScriptedTransport {
    async fn send(
        &self,
        endpoint: Option<&Endpoint>,
        request: &OperationRequest,
    ) -> Result<AttemptResponse, TransportError> {
        self.sent.lock().unwrap().push(SentAttempt {
            endpoint: endpoint.cloned(),
            headers: request.headers.clone(),
        });
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(message)) => Err(TransportError::new(endpoint.cloned(), message)),
            None => Ok(AttemptResponse::new(StatusCode::OK)),
        }
    }
}

type Responder =
    dyn Fn(&SentAttempt) -> Result<AttemptResponse, TransportError> + Send + Sync + 'static;

/// Answers each attempt by calling a closure over what was sent.
pub struct FnTransport {
    responder: Box<Responder>,
    sent: Mutex<Vec<SentAttempt>>,
}

impl FnTransport {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&SentAttempt) -> Result<AttemptResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<SentAttempt> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl AttemptTransport for FnTransport {
    async fn send(
        &self,
        endpoint: Option<&Endpoint>,
        request: &OperationRequest,
    ) -> Result<AttemptResponse, TransportError> {
        let attempt = SentAttempt {
            endpoint: endpoint.cloned(),
            headers: request.headers.clone(),
        };
        self.sent.lock().unwrap().push(attempt.clone());
        (self.responder)(&attempt)
    }
}

pub fn range(min: &str, max: &str) -> PartitionRange {
    PartitionRange::new(min, max).unwrap()
}

pub fn pk_range(id: &str, min: &str, max: &str) -> PartitionKeyRange {
    PartitionKeyRange::new(id, range(min, max))
}

pub fn endpoint(name: &str) -> Endpoint {
    Endpoint::new(format!("https://{}.example.net", name))
}

/// Three read regions, two of them writable.
pub fn three_regions() -> Arc<InMemoryLocationCache> {
    Arc::new(InMemoryLocationCache::new(
        vec![endpoint("east"), endpoint("west"), endpoint("north")],
        vec![endpoint("east"), endpoint("west")],
    ))
}

pub async fn single_range_topology(container: &str) -> Arc<InMemoryPartitionTopology> {
    let topology = Arc::new(InMemoryPartitionTopology::new());
    topology
        .register_container(container, vec![pk_range("0", "", "FF")])
        .await
        .unwrap();
    topology
}

pub fn status(code: u16) -> AttemptResponse {
    AttemptResponse::new(StatusCode::from_u16(code).unwrap())
}

pub fn with_sub_status(code: u16, sub_status: u32) -> AttemptResponse {
    status(code).with_header(headers::SUB_STATUS, sub_status.to_string())
}
