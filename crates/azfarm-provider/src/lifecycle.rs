//! Pool lifecycle operations over a [`BatchService`].
//!
//! [`PoolManager`] wraps the raw vendor calls with the semantics the plugin
//! relies on: missing pools read as `None` (or as nothing to do), creating a
//! job that already exists succeeds, and a resize first waits out any resize
//! already in flight. Every other vendor error is logged with its detail
//! pairs and returned.

use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use azfarm_batch::{
    AllocationState, BatchError, BatchService, ComputeNode, ComputeNodeDeallocationOption,
    JobAddParameter, NodeRemoveParameter, Pool, PoolAddParameter, PoolInformation,
    PoolResizeParameter, error::codes,
};
use azfarm_core::Platform;

use crate::provision::license_task;

/// Node file holding the hostname the start task recorded.
pub const HOSTNAME_FILE: &str = "startup/wd/hostname.txt";

/// Errors from pool lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error("pool {pool_id} did not reach a steady allocation state within {timeout:?}")]
    ResizeTimeout { pool_id: String, timeout: Duration },

    #[error("image {0} cannot be resolved to a Batch image reference")]
    UnresolvableImage(String),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Log a vendor failure with its code, message and detail pairs.
fn log_batch_error(action: &str, err: &BatchError) {
    match err {
        BatchError::Service {
            status,
            code,
            message,
            ..
        } => error!(action, status, code = %code, message = %message, "batch service error"),
        other => error!(action, error = %other, "batch request failed"),
    }
    for detail in err.details() {
        error!(action, key = %detail.key, value = %detail.value, "batch error detail");
    }
}

/// Build a `map_err` adapter that logs before converting.
fn logged(action: &'static str) -> impl Fn(BatchError) -> LifecycleError {
    move |err| {
        log_batch_error(action, &err);
        LifecycleError::Batch(err)
    }
}

/// Vendor-facing pool operations.
pub struct PoolManager<S> {
    service: S,
    poll_interval: Duration,
    resize_timeout: Duration,
}

impl<S: BatchService> PoolManager<S> {
    pub fn new(service: S, poll_interval: Duration, resize_timeout: Duration) -> Self {
        Self {
            service,
            poll_interval,
            resize_timeout,
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn list_pools(&self) -> LifecycleResult<Vec<Pool>> {
        self.service
            .list_pools()
            .map_err(logged("listing pools"))
    }

    /// The pool, or `None` if it does not exist.
    pub fn get_pool(&self, pool_id: &str) -> LifecycleResult<Option<Pool>> {
        match self.service.get_pool(pool_id) {
            Ok(pool) => Ok(Some(pool)),
            Err(e) if e.has_code(codes::POOL_NOT_FOUND) => Ok(None),
            Err(e) => Err(logged("fetching pool")(e)),
        }
    }

    pub fn create_pool(&self, pool: &PoolAddParameter) -> LifecycleResult<()> {
        self.service
            .add_pool(pool)
            .map_err(logged("creating pool"))?;
        info!(
            pool_id = %pool.id,
            vm_size = %pool.vm_size,
            dedicated = pool.target_dedicated_nodes,
            low_priority = pool.target_low_priority_nodes,
            "created pool"
        );
        Ok(())
    }

    /// Delete a pool; a pool that is already gone counts as deleted.
    pub fn delete_pool(&self, pool_id: &str) -> LifecycleResult<()> {
        match self.service.delete_pool(pool_id) {
            Ok(()) => {
                info!(pool_id, "deleted pool");
                Ok(())
            }
            Err(e) if e.has_code(codes::POOL_NOT_FOUND) => Ok(()),
            Err(e) => Err(logged("deleting pool")(e)),
        }
    }

    /// Set new target counts, stopping any resize in progress first.
    ///
    /// Does nothing if the pool no longer exists.
    pub fn resize_pool(
        &self,
        pool_id: &str,
        target_dedicated: u32,
        target_low_priority: u32,
    ) -> LifecycleResult<()> {
        let Some(pool) = self.get_pool(pool_id)? else {
            warn!(pool_id, "pool to resize no longer exists");
            return Ok(());
        };

        if pool.allocation_state == AllocationState::Resizing {
            self.service
                .stop_resize_pool(pool_id)
                .map_err(logged("stopping pool resize"))?;
            self.wait_for_steady(pool)?;
        }

        let resize = PoolResizeParameter {
            target_dedicated_nodes: target_dedicated,
            target_low_priority_nodes: target_low_priority,
        };
        self.service
            .resize_pool(pool_id, &resize)
            .map_err(logged("resizing pool"))?;
        info!(
            pool_id,
            dedicated = target_dedicated,
            low_priority = target_low_priority,
            "resized pool"
        );
        Ok(())
    }

    fn wait_for_steady(&self, mut pool: Pool) -> LifecycleResult<()> {
        let started = Instant::now();
        while pool.allocation_state != AllocationState::Steady {
            if started.elapsed() >= self.resize_timeout {
                return Err(LifecycleError::ResizeTimeout {
                    pool_id: pool.id,
                    timeout: self.resize_timeout,
                });
            }
            debug!(pool_id = %pool.id, state = ?pool.allocation_state, "waiting for pool to settle");
            thread::sleep(self.poll_interval);

            let pool_id = pool.id.clone();
            match self.get_pool(&pool_id)? {
                Some(next) => pool = next,
                None => {
                    warn!(pool_id = %pool_id, "pool disappeared while waiting for resize to stop");
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Create the licensing job for a pool with one task per node. A job
    /// that already exists is reused.
    pub fn create_job(
        &self,
        job_id: &str,
        pool_id: &str,
        total_nodes: u32,
        platform: Platform,
    ) -> LifecycleResult<()> {
        let job = JobAddParameter {
            id: job_id.to_string(),
            pool_info: PoolInformation {
                pool_id: pool_id.to_string(),
            },
        };
        match self.service.add_job(&job) {
            Ok(()) => info!(job_id, pool_id, "created licensing job"),
            Err(e) if e.has_code(codes::JOB_EXISTS) => debug!(job_id, "licensing job already exists"),
            Err(e) => return Err(logged("creating job")(e)),
        }

        for _ in 0..total_nodes {
            self.service
                .add_task(job_id, &license_task(platform))
                .map_err(logged("adding licensing task"))?;
        }
        debug!(job_id, count = total_nodes, "added licensing tasks");
        Ok(())
    }

    /// Delete a job. Returns `false` if there was no such job.
    pub fn delete_job(&self, job_id: &str) -> LifecycleResult<bool> {
        match self.service.delete_job(job_id) {
            Ok(()) => Ok(true),
            Err(e) if e.has_code(codes::JOB_NOT_FOUND) => Ok(false),
            Err(e) => Err(logged("deleting job")(e)),
        }
    }

    /// Nodes of a pool, or `None` if the pool does not exist.
    pub fn list_compute_nodes(&self, pool_id: &str) -> LifecycleResult<Option<Vec<ComputeNode>>> {
        if self.get_pool(pool_id)?.is_none() {
            return Ok(None);
        }
        self.service
            .list_compute_nodes(pool_id)
            .map(Some)
            .map_err(logged("listing compute nodes"))
    }

    pub fn reboot_compute_node(&self, pool_id: &str, node_id: &str) -> LifecycleResult<()> {
        if self.get_pool(pool_id)?.is_none() {
            warn!(pool_id, node_id, "pool not found, skipping reboot");
            return Ok(());
        }
        self.service
            .reboot_compute_node(pool_id, node_id)
            .map_err(logged("rebooting compute node"))?;
        info!(pool_id, node_id, "rebooting node");
        Ok(())
    }

    /// Remove nodes from a pool, terminating their running tasks.
    pub fn remove_compute_nodes(&self, pool_id: &str, node_ids: &[String]) -> LifecycleResult<()> {
        if self.get_pool(pool_id)?.is_none() {
            warn!(pool_id, "pool not found, skipping node removal");
            return Ok(());
        }
        let remove = NodeRemoveParameter {
            node_list: node_ids.to_vec(),
            node_deallocation_option: ComputeNodeDeallocationOption::Terminate,
        };
        self.service
            .remove_nodes(pool_id, &remove)
            .map_err(logged("removing compute nodes"))?;
        info!(pool_id, count = node_ids.len(), "removing nodes");
        Ok(())
    }

    /// Hostname recorded on the node, or `None` if the pool does not exist.
    pub fn compute_node_hostname(
        &self,
        pool_id: &str,
        node_id: &str,
    ) -> LifecycleResult<Option<String>> {
        if self.get_pool(pool_id)?.is_none() {
            return Ok(None);
        }
        let content = self
            .service
            .get_node_file(pool_id, node_id, HOSTNAME_FILE)
            .map_err(logged("reading node hostname"))?;
        Ok(Some(content.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use azfarm_batch::{BatchCall, InMemoryBatchService};

    fn manager() -> PoolManager<InMemoryBatchService> {
        PoolManager::new(
            InMemoryBatchService::new(),
            Duration::ZERO,
            Duration::from_secs(5),
        )
    }

    fn pool(id: &str, state: AllocationState) -> Pool {
        Pool {
            id: id.to_string(),
            vm_size: "standard_f8".to_string(),
            allocation_state: state,
            current_dedicated_nodes: 1,
            target_dedicated_nodes: 2,
            ..Default::default()
        }
    }

    #[test]
    fn missing_pool_is_none() {
        let pools = manager();
        assert!(pools.get_pool("gone").unwrap().is_none());
        pools.delete_pool("gone").unwrap();
        assert!(pools.list_compute_nodes("gone").unwrap().is_none());
        assert!(pools.compute_node_hostname("gone", "n1").unwrap().is_none());
    }

    #[test]
    fn resize_stops_resize_in_flight() {
        let pools = manager();
        pools.service().set_polls_until_steady(2);
        pools.service().insert_pool(pool("p1", AllocationState::Resizing));

        pools.resize_pool("p1", 5, 0).unwrap();

        let calls = pools.service().calls();
        assert!(calls.contains(&BatchCall::StopResizePool("p1".to_string())));
        assert_eq!(
            calls.last(),
            Some(&BatchCall::ResizePool {
                pool_id: "p1".to_string(),
                target_dedicated: 5,
                target_low_priority: 0,
            })
        );
        let polls = calls
            .iter()
            .filter(|c| **c == BatchCall::GetPool("p1".to_string()))
            .count();
        assert_eq!(polls, 4);
    }

    #[test]
    fn resize_wait_is_bounded() {
        let pools = PoolManager::new(InMemoryBatchService::new(), Duration::ZERO, Duration::ZERO);
        pools.service().set_polls_until_steady(100);
        pools.service().insert_pool(pool("p1", AllocationState::Resizing));

        let err = pools.resize_pool("p1", 5, 0).unwrap_err();
        assert!(matches!(err, LifecycleError::ResizeTimeout { pool_id, .. } if pool_id == "p1"));
        assert!(
            !pools
                .service()
                .calls()
                .iter()
                .any(|c| matches!(c, BatchCall::ResizePool { .. }))
        );
    }

    #[test]
    fn steady_pool_resizes_directly() {
        let pools = manager();
        pools.service().insert_pool(pool("p1", AllocationState::Steady));
        pools.resize_pool("p1", 3, 1).unwrap();
        let resized = pools.service().pool("p1").unwrap();
        assert_eq!(resized.target_dedicated_nodes, 3);
        assert_eq!(resized.target_low_priority_nodes, 1);
        assert!(
            !pools
                .service()
                .calls()
                .contains(&BatchCall::StopResizePool("p1".to_string()))
        );
    }

    #[test]
    fn existing_job_is_reused() {
        let pools = manager();
        pools.service().insert_job("p1");
        pools.service().add_task("p1", &license_task(Platform::Linux)).unwrap();

        pools.create_job("p1", "p1", 2, Platform::Linux).unwrap();
        assert_eq!(pools.service().job_tasks("p1").unwrap().len(), 3);
    }

    #[test]
    fn delete_missing_job() {
        let pools = manager();
        pools.service().insert_job("j");
        assert!(pools.delete_job("j").unwrap());
        assert!(!pools.delete_job("j").unwrap());
    }

    #[test]
    fn hostname_is_trimmed() {
        let pools = manager();
        pools.service().insert_pool(pool("p1", AllocationState::Steady));
        pools
            .service()
            .put_node_file("p1", "n1", "/startup/wd/hostname.txt", "render-007\r\n");
        assert_eq!(
            pools.compute_node_hostname("p1", "n1").unwrap().as_deref(),
            Some("render-007")
        );
    }
}
