//! A small async dataflow engine for running the research agents.
//!
//! The graph executes in supersteps like the Pregel model used by
//! `langgraph_core::pregel::algo`: a frontier of ready node names runs
//! concurrently, their writes are merged into shared state with a
//! [`StateSchema`], and the next frontier is derived from the edges that
//! just became satisfied. Unlike the Pregel executor, nodes here read and
//! write a single shared `ResearchState` value directly instead of
//! per-channel triggers, because every node in this workflow operates on
//! the same JSON record rather than disjoint topics.
//!
//! Conditional edges bypass fan-in gating so a critic can loop back to
//! synthesis without waiting on the (already-satisfied) static
//! predecessors of synthesis to fire again.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use langgraph_core::state::StateSchema;

use crate::error::{ResearchError, Result};

/// Cooperative cancellation signal shared across every node in a run.
///
/// `langgraph_core` itself has no standalone cancellation primitive at this
/// layer (its interrupt support rides on checkpointed resume values), so
/// this is a thin `tokio::sync::watch`-backed token in the same spirit as
/// `tokio_util::sync::CancellationToken`, which is not part of the
/// workspace's dependency set.
#[derive(Clone)]
pub struct CancellationToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Events observable while a graph runs, mirroring the shape of
/// `langgraph_core::stream::StreamEvent` (Updates/Custom/Error) without
/// tying callers to the Pregel checkpoint machinery.
#[derive(Debug, Clone)]
pub enum GraphEvent {
    NodeStart { node: String },
    NodeEnd { node: String, update: Value },
    Custom { node: String, data: Value },
    Error { node: String, message: String },
    Complete { state: Value },
}

/// Handle passed to each node body: lets it publish custom events and
/// check for cancellation without threading a channel through every
/// function signature by hand.
#[derive(Clone)]
pub struct NodeContext {
    node: String,
    events: mpsc::Sender<GraphEvent>,
    cancellation: CancellationToken,
}

impl NodeContext {
    /// Build a `NodeContext` outside of a running graph, for unit-testing
    /// agent node functions directly against a channel they can assert on.
    #[cfg(any(test, feature = "test-support"))]
    pub fn for_test(node: &str, events: mpsc::Sender<GraphEvent>, cancellation: CancellationToken) -> Self {
        Self {
            node: node.to_string(),
            events,
            cancellation,
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node
    }

    pub fn emit(&self, data: Value) {
        let _ = self.events.try_send(GraphEvent::Custom {
            node: self.node.clone(),
            data,
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

pub type NodeFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;
pub type NodeFn = Arc<dyn Fn(Value, NodeContext) -> NodeFuture + Send + Sync>;

/// Result of evaluating a conditional edge: the name of the node to run
/// next, or `None` to take no conditional transition this step.
pub type ConditionFn = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

const ENTRY: &str = "__entry__";

struct EdgeSet {
    /// static_edges[from] -> [to, ...], gated on ALL static predecessors of `to` completing
    static_edges: HashMap<String, Vec<String>>,
    /// conditional_edges[from] -> condition, evaluated against the merged state after `from` runs
    conditional_edges: HashMap<String, ConditionFn>,
}

/// Builds a node graph over a shared `ResearchState`-shaped JSON value.
pub struct GraphBuilder {
    nodes: HashMap<String, NodeFn>,
    entry: Option<String>,
    edges: EdgeSet,
    schema: StateSchema,
}

impl GraphBuilder {
    pub fn new(schema: StateSchema) -> Self {
        Self {
            nodes: HashMap::new(),
            entry: None,
            edges: EdgeSet {
                static_edges: HashMap::new(),
                conditional_edges: HashMap::new(),
            },
            schema,
        }
    }

    pub fn add_node<F, Fut>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Value, NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.nodes.insert(
            name.to_string(),
            Arc::new(move |state, ctx| Box::pin(f(state, ctx)) as NodeFuture),
        );
        self
    }

    pub fn set_entry(mut self, name: &str) -> Self {
        self.entry = Some(name.to_string());
        self
    }

    /// Static edge: `to` becomes a candidate once every static predecessor
    /// that targets it has completed in the run.
    pub fn add_edge(mut self, from: &str, to: &str) -> Self {
        self.edges
            .static_edges
            .entry(from.to_string())
            .or_default()
            .push(to.to_string());
        self
    }

    /// Conditional edge: evaluated after `from` completes, against the
    /// merged state. Returning `Some(node)` schedules `node` immediately,
    /// bypassing fan-in gating (this is how the critic loops back to
    /// synthesis without waiting on retrieval/web_search/image_gen again).
    pub fn add_conditional_edge<F>(mut self, from: &str, condition: F) -> Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        self.edges
            .conditional_edges
            .insert(from.to_string(), Arc::new(condition));
        self
    }

    pub fn compile(self) -> Result<CompiledGraph> {
        let entry = self
            .entry
            .ok_or_else(|| ResearchError::Graph("graph has no entry node".into()))?;
        if !self.nodes.contains_key(&entry) {
            return Err(ResearchError::Graph(format!(
                "entry node '{entry}' was never added"
            )));
        }

        let mut static_predecessors: HashMap<String, HashSet<String>> = HashMap::new();
        for (from, tos) in &self.edges.static_edges {
            for to in tos {
                static_predecessors
                    .entry(to.clone())
                    .or_default()
                    .insert(from.clone());
            }
        }

        Ok(CompiledGraph {
            nodes: self.nodes,
            entry,
            static_edges: self.edges.static_edges,
            conditional_edges: self.edges.conditional_edges,
            static_predecessors,
            schema: self.schema,
        })
    }
}

pub struct CompiledGraph {
    nodes: HashMap<String, NodeFn>,
    entry: String,
    static_edges: HashMap<String, Vec<String>>,
    conditional_edges: HashMap<String, ConditionFn>,
    static_predecessors: HashMap<String, HashSet<String>>,
    schema: StateSchema,
}

impl CompiledGraph {
    /// Run the graph to completion, applying every node's output to
    /// `state` via the schema's reducers. Emits `GraphEvent`s on `events`
    /// as each superstep progresses; `events` may be a bounded channel
    /// with a full/closed receiver, writes are best-effort.
    pub async fn run(
        &self,
        mut state: Value,
        events: mpsc::Sender<GraphEvent>,
        cancellation: CancellationToken,
    ) -> Result<Value> {
        let mut completed: HashSet<String> = HashSet::new();
        let mut frontier: Vec<String> = vec![self.entry.clone()];
        let mut loop_guard = 0usize;
        const MAX_SUPERSTEPS: usize = 64;

        while !frontier.is_empty() {
            loop_guard += 1;
            if loop_guard > MAX_SUPERSTEPS {
                return Err(ResearchError::Graph(format!(
                    "exceeded {MAX_SUPERSTEPS} supersteps, likely a conditional-edge cycle"
                )));
            }
            if cancellation.is_cancelled() {
                return Err(ResearchError::Cancelled);
            }

            debug!(?frontier, "graph superstep starting");

            let run_one = frontier.iter().cloned().map(|name| {
                let input = state.clone();
                let ctx = NodeContext {
                    node: name.clone(),
                    events: events.clone(),
                    cancellation: cancellation.clone(),
                };
                let node_fn = self.nodes.get(&name).cloned();
                async move {
                    let _ = ctx
                        .events
                        .send(GraphEvent::NodeStart { node: name.clone() })
                        .await;
                    let node_fn = match node_fn {
                        Some(f) => f,
                        None => {
                            return (
                                name.clone(),
                                Err(ResearchError::Graph(format!("unknown node '{name}'"))),
                            )
                        }
                    };
                    let result = node_fn(input, ctx).await;
                    (name, result)
                }
            });

            let outcomes = join_all(run_one).await;

            let mut next_conditional: Vec<String> = Vec::new();
            for (name, outcome) in outcomes {
                match outcome {
                    Ok(update) => {
                        self.schema
                            .apply(&mut state, &update)
                            .map_err(|e| ResearchError::Graph(e.to_string()))?;
                        completed.insert(name.clone());
                        let _ = events
                            .send(GraphEvent::NodeEnd {
                                node: name.clone(),
                                update,
                            })
                            .await;

                        if let Some(condition) = self.conditional_edges.get(&name) {
                            if let Some(next) = condition(&state) {
                                next_conditional.push(next);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(node = %name, error = %e, "node failed");
                        let _ = events
                            .send(GraphEvent::Error {
                                node: name.clone(),
                                message: e.to_string(),
                            })
                            .await;
                        if e.is_fatal() {
                            return Err(e);
                        }
                        completed.insert(name.clone());
                    }
                }
            }

            frontier = self.next_frontier(&completed, &next_conditional);
        }

        let _ = events
            .send(GraphEvent::Complete {
                state: state.clone(),
            })
            .await;
        Ok(state)
    }

    fn next_frontier(&self, completed: &HashSet<String>, forced: &[String]) -> Vec<String> {
        let mut next: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        // Conditional transitions bypass fan-in gating entirely.
        for node in forced {
            if seen.insert(node.clone()) {
                next.push(node.clone());
            }
        }

        // Static transitions: a target is ready once every static
        // predecessor targeting it (from any completed source) has run.
        let mut candidates: HashSet<String> = HashSet::new();
        for (from, tos) in &self.static_edges {
            if completed.contains(from) {
                for to in tos {
                    candidates.insert(to.clone());
                }
            }
        }

        for candidate in candidates {
            if completed.contains(&candidate) || seen.contains(&candidate) {
                continue;
            }
            let predecessors = self
                .static_predecessors
                .get(&candidate)
                .cloned()
                .unwrap_or_default();
            if predecessors.iter().all(|p| completed.contains(p)) {
                if seen.insert(candidate.clone()) {
                    next.push(candidate);
                }
            }
        }

        next
    }
}
