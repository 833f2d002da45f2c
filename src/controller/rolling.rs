//! Rolling hand-off between Workload generations
//!
//! The new generation is staged as `<name>-next` with zero replicas. Each tick
//! reads ready and declared replicas of both generations and nudges each by at
//! most one replica:
//!
//! - scale up the staging Workload while it has caught up with its own spec,
//!   is below target, and the ready total is below `target + maxReplicasExcess`
//! - scale down the old Workload while it has caught up with its own spec, has
//!   pods left, and the ready total is above `target`
//!
//! Once the old generation is empty and the new one is at target, the staged
//! template is promoted onto the permanent name and the staging Workload is
//! deleted with its pods orphaned, so the promoted Workload adopts them.
//!
//! Ready counts come from a pod readiness scan (see
//! [`ResourceClient::get_ready_replicas`](crate::client::ResourceClient::get_ready_replicas)),
//! declared counts are read back from the server every tick.

use super::poll::Poller;
use super::{Context, LifecycleError};
use crate::client::PodPolicy;
use serde_json::Value;
use tracing::{debug, error, info};

/// Suffix of the staging Workload's name
pub const STAGING_SUFFIX: &str = "-next";

pub fn staging_name(name: &str) -> String {
    format!("{}{}", name, STAGING_SUFFIX)
}

/// Replica counts of both generations, as read at the start of a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub old_ready: u32,
    pub old_spec: u32,
    pub new_ready: u32,
    pub new_spec: u32,
}

impl Observation {
    pub fn total_ready(&self) -> u32 {
        self.old_ready + self.new_ready
    }
}

/// What a tick decides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPlan {
    /// Old generation empty, new generation at target
    Done,
    /// New spec values to set on the staging and old Workloads
    Nudge {
        scale_up: Option<u32>,
        scale_down: Option<u32>,
    },
    /// A generation is still converging on its spec
    Wait,
    /// Both generations settled but no rule can fire
    Stalled,
}

/// Decide one tick of the hand-off
///
/// Pure: the same observation always yields the same plan.
pub fn plan_tick(obs: Observation, target: u32, max_excess: u32) -> TickPlan {
    if obs.old_ready == 0 && obs.old_spec == 0 && obs.new_ready == target && obs.new_spec == target
    {
        return TickPlan::Done;
    }

    let new_settled = obs.new_ready == obs.new_spec;
    let old_settled = obs.old_ready == obs.old_spec;
    let total = obs.total_ready();

    let scale_up = (new_settled
        && obs.new_ready < target
        && total < target.saturating_add(max_excess))
    .then(|| obs.new_spec + 1);

    let scale_down =
        (old_settled && obs.old_ready > 0 && total > target).then(|| obs.old_spec - 1);

    if scale_up.is_some() || scale_down.is_some() {
        TickPlan::Nudge {
            scale_up,
            scale_down,
        }
    } else if new_settled && old_settled {
        TickPlan::Stalled
    } else {
        TickPlan::Wait
    }
}

/// Outcome of one completed hand-off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RollSummary {
    /// Observations made, including the final one
    pub ticks: u64,
    /// Highest ready total seen across both generations
    pub peak_ready: u32,
}

pub struct RollingUpgradeController<'a> {
    ctx: &'a Context,
}

impl<'a> RollingUpgradeController<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    /// Hand `old_name` over to `new_spec`
    ///
    /// # Arguments
    /// * `namespace` - Namespace of both generations
    /// * `old_name` - Name of the running Workload; also the promoted name
    /// * `new_spec` - Stamped Workload document carrying the target replicas
    ///
    /// # Errors
    /// Any client error aborts immediately. The staging Workload is left in
    /// place: it may already be serving, and deleting it would drop capacity.
    pub async fn roll(
        &self,
        namespace: &str,
        old_name: &str,
        new_spec: &Value,
    ) -> Result<RollSummary, LifecycleError> {
        let client = &self.ctx.client;
        let max_excess = self.ctx.settings.max_replicas_excess;
        let target = target_replicas(new_spec)?;
        let staging = staging_name(old_name);

        // Pre-flight: the old generation exists, no leftover staging Workload
        client.get_workload(namespace, old_name).await?;
        if client.workload_exists(namespace, &staging).await? {
            error!(namespace, workload = old_name, staging = %staging, "Staging Workload already exists");
            return Err(LifecycleError::InconsistentState(format!(
                "staging Workload '{}' already exists in namespace '{}'; a previous upgrade did not finish",
                staging, namespace
            )));
        }

        info!(
            namespace,
            workload = old_name,
            staging = %staging,
            target,
            max_excess,
            "Starting rolling upgrade"
        );
        client
            .create_workload(namespace, &with_name_and_replicas(new_spec, &staging, 0)?)
            .await?;

        let summary = if client.is_dry_run() {
            let old_ready = client.get_ready_replicas(namespace, old_name).await?;
            info!(
                namespace,
                workload = old_name,
                staging = %staging,
                old_ready,
                target,
                max_excess,
                "Dry run: would hand replicas over one at a time, not polling"
            );
            RollSummary {
                ticks: 0,
                peak_ready: old_ready,
            }
        } else {
            self.hand_off(namespace, old_name, &staging, target).await?
        };

        info!(namespace, workload = old_name, "Promoting new generation");
        client
            .replace_workload(namespace, old_name, &with_name_and_replicas(new_spec, old_name, target)?)
            .await?;
        client
            .delete_workload(namespace, &staging, PodPolicy::Orphan)
            .await?;

        info!(
            namespace,
            workload = old_name,
            ticks = summary.ticks,
            peak_ready = summary.peak_ready,
            "Rolling upgrade complete"
        );
        Ok(summary)
    }

    /// Tick until both generations have swapped, or a rule says they never will
    async fn hand_off(
        &self,
        namespace: &str,
        old_name: &str,
        staging: &str,
        target: u32,
    ) -> Result<RollSummary, LifecycleError> {
        let client = &self.ctx.client;
        let max_excess = self.ctx.settings.max_replicas_excess;
        let mut poller = Poller::new(format!("rolling upgrade of '{}'", old_name), &self.ctx.settings.poll);
        let mut summary = RollSummary::default();
        loop {
            let obs = Observation {
                old_ready: client.get_ready_replicas(namespace, old_name).await?,
                old_spec: client.get_spec_replicas(namespace, old_name).await?,
                new_ready: client.get_ready_replicas(namespace, staging).await?,
                new_spec: client.get_spec_replicas(namespace, staging).await?,
            };
            summary.ticks += 1;
            summary.peak_ready = summary.peak_ready.max(obs.total_ready());
            debug!(namespace, workload = old_name, tick = summary.ticks, ?obs, "Rolling tick");

            match plan_tick(obs, target, max_excess) {
                TickPlan::Done => break,
                TickPlan::Nudge {
                    scale_up,
                    scale_down,
                } => {
                    if let Some(replicas) = scale_up {
                        info!(namespace, workload = staging, replicas, "Scaling up new generation");
                        client.set_spec_replicas(namespace, staging, replicas).await?;
                    }
                    if let Some(replicas) = scale_down {
                        info!(namespace, workload = old_name, replicas, "Scaling down old generation");
                        client.set_spec_replicas(namespace, old_name, replicas).await?;
                    }
                }
                TickPlan::Wait => {}
                TickPlan::Stalled => {
                    error!(namespace, workload = old_name, ?obs, target, max_excess, "Rolling upgrade cannot progress");
                    return Err(LifecycleError::Stalled {
                        workload: old_name.to_string(),
                        old_ready: obs.old_ready,
                        old_spec: obs.old_spec,
                        new_ready: obs.new_ready,
                        new_spec: obs.new_spec,
                        target,
                        max_excess,
                    });
                }
            }

            poller.sleep().await?;
        }

        Ok(summary)
    }
}

/// `spec.replicas` of a Workload document
pub fn target_replicas(spec: &Value) -> Result<u32, LifecycleError> {
    spec.pointer("/spec/replicas")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| {
            LifecycleError::MalformedDocument(
                "workload has no non-negative integer spec.replicas".to_string(),
            )
        })
}

fn with_name_and_replicas(spec: &Value, name: &str, replicas: u32) -> Result<Value, LifecycleError> {
    let mut doc = spec.clone();
    let malformed = || LifecycleError::MalformedDocument(format!("workload '{}' is not an object", name));

    doc.pointer_mut("/metadata")
        .and_then(Value::as_object_mut)
        .ok_or_else(malformed)?
        .insert("name".to_string(), Value::String(name.to_string()));
    doc.pointer_mut("/spec")
        .and_then(Value::as_object_mut)
        .ok_or_else(malformed)?
        .insert("replicas".to_string(), Value::from(replicas));
    Ok(doc)
}

#[cfg(test)]
#[path = "rolling_test.rs"]
mod tests;
