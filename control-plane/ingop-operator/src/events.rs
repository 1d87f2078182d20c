//! Outcome stream of state-changing convergence actions.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ingop_store::ResourceIdentity;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::convergence::ConvergeAction;

#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceEvent {
    pub action: ConvergeAction,
    pub identity: ResourceIdentity,
    /// Set for updates: the change set taken before the write.
    pub diff: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ConvergenceEvent {
    pub fn new(
        action: ConvergeAction,
        identity: ResourceIdentity,
        diff: Option<String>,
    ) -> Self {
        Self {
            action,
            identity,
            diff,
            timestamp: Utc::now(),
        }
    }
}

/// Receiver of convergence events. Sinks report their own delivery
/// failures; recording never fails the reconcile that produced the event.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record(&self, event: &ConvergenceEvent);
}

/// Structured log line per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn record(&self, event: &ConvergenceEvent) {
        match &event.diff {
            Some(diff) => info!(
                identity = %event.identity,
                action = %event.action,
                %diff,
                "{} {}", event.action, event.identity
            ),
            None => info!(
                identity = %event.identity,
                action = %event.action,
                "{} {}", event.action, event.identity
            ),
        }
    }
}

/// In-process fan-out to any number of subscribers. Slow subscribers lag
/// and lose the oldest events; the sender never blocks.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<ConvergenceEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConvergenceEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventSink for BroadcastSink {
    async fn record(&self, event: &ConvergenceEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event.clone());
    }
}

#[derive(Clone, Default)]
pub struct Fanout {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl EventSink for Fanout {
    async fn record(&self, event: &ConvergenceEvent) {
        for sink in &self.sinks {
            sink.record(event).await;
        }
    }
}

pub const REPORTER: &str = "ingress-operator";

/// Publishes events as Kubernetes Events on the affected object.
#[derive(Clone)]
pub struct KubeEventSink {
    recorder: Recorder,
}

impl KubeEventSink {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: REPORTER.into(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

fn object_ref(id: &ResourceIdentity) -> ObjectReference {
    ObjectReference {
        api_version: Some(id.kind.api_version()),
        kind: Some(id.kind.kind.to_string()),
        namespace: id.namespace.clone(),
        name: Some(id.name.clone()),
        ..Default::default()
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn record(&self, event: &ConvergenceEvent) {
        let reason = match event.action {
            ConvergeAction::Created => "Created",
            ConvergeAction::Updated => "Updated",
            ConvergeAction::Deleted => "Deleted",
            ConvergeAction::NoOp => return,
        };
        let note = event
            .diff
            .clone()
            .unwrap_or_else(|| format!("{} {}", event.action, event.identity));
        let res = self
            .recorder
            .publish(
                &Event {
                    type_: EventType::Normal,
                    reason: reason.into(),
                    note: Some(note),
                    action: "Converge".into(),
                    secondary: None,
                },
                &object_ref(&event.identity),
            )
            .await;
        if let Err(e) = res {
            warn!(identity = %event.identity, error = %e, "failed to publish kubernetes event");
        }
    }
}
