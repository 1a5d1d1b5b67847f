//! Cron scheduling with re-arming and cancellation.
//!
//! Each scheduled workflow owns one chain: a task that sleeps until the
//! next fire time, checks the workflow is still active, dispatches one
//! trigger event, then computes and waits for the following fire. A chain
//! is cancelled through its workflow's [`CancellationToken`]; the token is
//! checked while waiting and again before every re-arm, so a fire already
//! waited for is still suppressed.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nodes::{CompiledSchedule, CronSchedule};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::models::TriggerEvent;
use crate::store::GraphStore;
use crate::EngineError;

/// Delivers trigger events to whatever runs them.
#[async_trait]
pub trait TriggerDispatcher: Send + Sync {
    async fn dispatch(&self, event: TriggerEvent) -> Result<(), EngineError>;
}

/// Scheduling input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub workflow_id: Uuid,
    pub cron_expression: String,
    #[serde(default)]
    pub timezone: Option<String>,
}

struct Chain {
    token: CancellationToken,
    generation: u64,
}

#[derive(Default)]
struct Chains {
    by_workflow: HashMap<Uuid, Chain>,
    next_generation: u64,
}

struct Inner {
    graphs: Arc<dyn GraphStore>,
    dispatcher: Arc<dyn TriggerDispatcher>,
    chains: Mutex<Chains>,
    shutdown: CancellationToken,
}

/// Cloneable handle to the scheduler; every clone drives the same chains.
#[derive(Clone)]
pub struct CronScheduler {
    inner: Arc<Inner>,
}

impl CronScheduler {
    pub fn new(graphs: Arc<dyn GraphStore>, dispatcher: Arc<dyn TriggerDispatcher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                graphs,
                dispatcher,
                chains: Mutex::new(Chains::default()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    fn chains(&self) -> MutexGuard<'_, Chains> {
        self.inner.chains.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a chain for the workflow, replacing any existing one, and
    /// return its first fire time.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Invalid expression or timezone, or an expression with no future fire.
    pub fn schedule(&self, request: ScheduleRequest) -> Result<DateTime<Utc>, EngineError> {
        let mut schedule = CronSchedule::new(request.cron_expression.clone());
        schedule.timezone = request.timezone.clone();
        let compiled = schedule.compile()?;
        let first = compiled
            .next_after(Utc::now())
            .ok_or_else(|| EngineError::NoUpcomingFire(request.cron_expression.clone()))?;

        let token = self.inner.shutdown.child_token();
        let generation = {
            let mut chains = self.chains();
            chains.next_generation += 1;
            let generation = chains.next_generation;
            let previous = chains.by_workflow.insert(
                request.workflow_id,
                Chain {
                    token: token.clone(),
                    generation,
                },
            );
            if let Some(previous) = previous {
                debug!(workflow_id = %request.workflow_id, "replacing existing schedule");
                previous.token.cancel();
            }
            generation
        };

        info!(
            workflow_id = %request.workflow_id,
            cron = %request.cron_expression,
            timezone = %compiled.timezone(),
            first_fire = %first,
            "workflow scheduled"
        );

        tokio::spawn(
            self.clone()
                .run_chain(request.workflow_id, compiled, first, token, generation),
        );
        Ok(first)
    }

    /// Cancel the workflow's chain. Returns whether one was running.
    pub fn cancel(&self, workflow_id: Uuid) -> bool {
        match self.chains().by_workflow.remove(&workflow_id) {
            Some(chain) => {
                chain.token.cancel();
                info!(%workflow_id, "schedule cancelled");
                true
            }
            None => false,
        }
    }

    /// Workflows with a live chain.
    pub fn active_schedules(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.chains().by_workflow.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Cancel every chain.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.chains().by_workflow.clear();
    }

    /// Schedule every cron trigger of every active workflow. Invalid
    /// definitions are logged and skipped. A workflow holds one chain, so
    /// only its first cron trigger is scheduled and any further ones are
    /// logged and skipped. Returns how many were scheduled.
    pub async fn restore(&self) -> Result<usize, EngineError> {
        let triggers = self.inner.graphs.cron_triggers().await?;
        let mut scheduled = 0;
        let mut restored = HashSet::new();
        for trigger in triggers {
            if restored.contains(&trigger.workflow_id) {
                warn!(
                    workflow_id = %trigger.workflow_id,
                    node_id = %trigger.node_id,
                    "workflow already has a cron trigger, skipping"
                );
                continue;
            }
            let request = ScheduleRequest {
                workflow_id: trigger.workflow_id,
                cron_expression: trigger.cron_expression,
                timezone: trigger.timezone,
            };
            match self.schedule(request) {
                Ok(_) => {
                    restored.insert(trigger.workflow_id);
                    scheduled += 1;
                }
                Err(e) => warn!(workflow_id = %trigger.workflow_id, error = %e, "skipping cron trigger"),
            }
        }
        Ok(scheduled)
    }

    // -----------------------------------------------------------------------
    // Internal: the chain task.
    // -----------------------------------------------------------------------

    #[instrument(skip(self, schedule, first, token, generation))]
    async fn run_chain(
        self,
        workflow_id: Uuid,
        schedule: CompiledSchedule,
        first: DateTime<Utc>,
        token: CancellationToken,
        generation: u64,
    ) {
        let mut fire_at = first;
        let mut count: u64 = 0;

        loop {
            let wait = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
            if token.is_cancelled() {
                break;
            }

            match self.inner.graphs.load_workflow(workflow_id).await {
                Ok(Some(workflow)) if workflow.active => {
                    count += 1;
                    let event = TriggerEvent::scheduled(workflow_id, fire_at, count);
                    debug!(event_id = %event.id, count, "cron fire");
                    if let Err(e) = self.inner.dispatcher.dispatch(event).await {
                        warn!(error = %e, "failed to dispatch scheduled run");
                    }
                }
                Ok(_) => {
                    info!("workflow inactive or deleted, ending schedule");
                    break;
                }
                Err(e) => warn!(error = %e, "could not check workflow, skipping this fire"),
            }

            if token.is_cancelled() {
                break;
            }
            match schedule.next_after(fire_at) {
                Some(next) => fire_at = next,
                None => {
                    info!("schedule has no further fire times");
                    break;
                }
            }
        }

        self.forget(workflow_id, generation);
        debug!(fires = count, "schedule chain ended");
    }

    /// Drop the chain entry unless it was replaced meanwhile.
    fn forget(&self, workflow_id: Uuid, generation: u64) {
        let mut chains = self.chains();
        if chains
            .by_workflow
            .get(&workflow_id)
            .is_some_and(|chain| chain.generation == generation)
        {
            chains.by_workflow.remove(&workflow_id);
        }
    }
}
