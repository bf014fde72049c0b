//! In-memory Batch service for tests.
//!
//! Pools, nodes, jobs and node files live in a mutex-guarded map. Every call
//! is appended to a journal so tests can assert on exactly what was sent.
//! Missing resources fail with the same error codes the real service uses.
//!
//! Allocation behaviour is simplified: `resize_pool` sets the targets and
//! marks the pool `resizing`; `stop_resize_pool` marks it `stopping`, and it
//! settles back to `steady` after a configurable number of `get_pool` calls.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::error::{BatchError, BatchResult, codes};
use crate::models::*;
use crate::service::BatchService;

/// A recorded call against the in-memory service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchCall {
    ListPools,
    GetPool(String),
    AddPool(String),
    DeletePool(String),
    ResizePool {
        pool_id: String,
        target_dedicated: u32,
        target_low_priority: u32,
    },
    StopResizePool(String),
    RemoveNodes {
        pool_id: String,
        node_ids: Vec<String>,
    },
    ListComputeNodes(String),
    RebootComputeNode {
        pool_id: String,
        node_id: String,
    },
    GetNodeFile {
        pool_id: String,
        node_id: String,
        file_path: String,
    },
    AddJob(String),
    DeleteJob(String),
    AddTask {
        job_id: String,
        task_id: String,
    },
}

#[derive(Default)]
struct Inner {
    pools: BTreeMap<String, Pool>,
    nodes: HashMap<String, Vec<ComputeNode>>,
    files: HashMap<(String, String, String), String>,
    jobs: BTreeMap<String, Vec<TaskAddParameter>>,
    added_pools: Vec<PoolAddParameter>,
    /// Remaining `get_pool` calls that still report `stopping`.
    stopping_polls: HashMap<String, u32>,
    polls_until_steady: u32,
    failing_node_listings: HashSet<String>,
    calls: Vec<BatchCall>,
}

/// [`BatchService`] backed by in-process maps.
pub struct InMemoryBatchService {
    inner: Mutex<Inner>,
}

impl Default for InMemoryBatchService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBatchService {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                polls_until_steady: 1,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock only happens in a failing test.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Seeding ────────────────────────────────────────────────────

    /// Insert or replace a pool.
    pub fn insert_pool(&self, pool: Pool) {
        let mut inner = self.lock();
        inner.nodes.entry(pool.id.clone()).or_default();
        inner.pools.insert(pool.id.clone(), pool);
    }

    /// Replace the nodes listed for a pool.
    pub fn set_nodes(&self, pool_id: &str, nodes: Vec<ComputeNode>) {
        self.lock().nodes.insert(pool_id.to_string(), nodes);
    }

    /// Make a file readable through `get_node_file`.
    pub fn put_node_file(&self, pool_id: &str, node_id: &str, file_path: &str, content: &str) {
        self.lock().files.insert(
            (
                pool_id.to_string(),
                node_id.to_string(),
                file_path.trim_start_matches('/').to_string(),
            ),
            content.to_string(),
        );
    }

    /// Create an empty job, as if it had been added earlier.
    pub fn insert_job(&self, job_id: &str) {
        self.lock().jobs.entry(job_id.to_string()).or_default();
    }

    /// Number of `get_pool` calls a stopped resize keeps reporting
    /// `stopping` before it turns `steady` (default 1).
    pub fn set_polls_until_steady(&self, polls: u32) {
        self.lock().polls_until_steady = polls;
    }

    /// Make `list_compute_nodes` fail for a pool with a server error.
    pub fn fail_node_listing(&self, pool_id: &str) {
        self.lock().failing_node_listings.insert(pool_id.to_string());
    }

    // ── Inspection ─────────────────────────────────────────────────

    pub fn calls(&self) -> Vec<BatchCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn pool(&self, pool_id: &str) -> Option<Pool> {
        self.lock().pools.get(pool_id).cloned()
    }

    pub fn pool_ids(&self) -> Vec<String> {
        self.lock().pools.keys().cloned().collect()
    }

    /// Create-pool requests received, in order.
    pub fn added_pools(&self) -> Vec<PoolAddParameter> {
        self.lock().added_pools.clone()
    }

    /// Tasks added to a job, or `None` if the job does not exist.
    pub fn job_tasks(&self, job_id: &str) -> Option<Vec<TaskAddParameter>> {
        self.lock().jobs.get(job_id).cloned()
    }
}

fn pool_not_found(pool_id: &str) -> BatchError {
    BatchError::service(
        404,
        codes::POOL_NOT_FOUND,
        format!("The specified pool {pool_id} does not exist."),
    )
}

fn job_not_found(job_id: &str) -> BatchError {
    BatchError::service(
        404,
        codes::JOB_NOT_FOUND,
        format!("The specified job {job_id} does not exist."),
    )
}

impl BatchService for InMemoryBatchService {
    fn list_pools(&self) -> BatchResult<Vec<Pool>> {
        let mut inner = self.lock();
        inner.calls.push(BatchCall::ListPools);
        Ok(inner.pools.values().cloned().collect())
    }

    fn get_pool(&self, pool_id: &str) -> BatchResult<Pool> {
        let mut inner = self.lock();
        inner.calls.push(BatchCall::GetPool(pool_id.to_string()));

        if let Some(remaining) = inner.stopping_polls.get_mut(pool_id) {
            if *remaining == 0 {
                inner.stopping_polls.remove(pool_id);
                if let Some(pool) = inner.pools.get_mut(pool_id) {
                    pool.allocation_state = AllocationState::Steady;
                }
            } else {
                *remaining -= 1;
            }
        }

        inner
            .pools
            .get(pool_id)
            .cloned()
            .ok_or_else(|| pool_not_found(pool_id))
    }

    fn add_pool(&self, pool: &PoolAddParameter) -> BatchResult<()> {
        let mut inner = self.lock();
        inner.calls.push(BatchCall::AddPool(pool.id.clone()));
        if inner.pools.contains_key(&pool.id) {
            return Err(BatchError::service(
                409,
                codes::POOL_EXISTS,
                format!("The specified pool {} already exists.", pool.id),
            ));
        }

        let created = Pool {
            id: pool.id.clone(),
            display_name: Some(pool.display_name.clone()),
            vm_size: pool.vm_size.clone(),
            state: PoolState::Active,
            allocation_state: AllocationState::Resizing,
            current_dedicated_nodes: 0,
            current_low_priority_nodes: 0,
            target_dedicated_nodes: pool.target_dedicated_nodes,
            target_low_priority_nodes: pool.target_low_priority_nodes,
            virtual_machine_configuration: Some(pool.virtual_machine_configuration.clone()),
        };
        inner.pools.insert(pool.id.clone(), created);
        inner.nodes.entry(pool.id.clone()).or_default();
        inner.added_pools.push(pool.clone());
        Ok(())
    }

    fn delete_pool(&self, pool_id: &str) -> BatchResult<()> {
        let mut inner = self.lock();
        inner.calls.push(BatchCall::DeletePool(pool_id.to_string()));
        inner.nodes.remove(pool_id);
        inner
            .pools
            .remove(pool_id)
            .map(|_| ())
            .ok_or_else(|| pool_not_found(pool_id))
    }

    fn resize_pool(&self, pool_id: &str, resize: &PoolResizeParameter) -> BatchResult<()> {
        let mut inner = self.lock();
        inner.calls.push(BatchCall::ResizePool {
            pool_id: pool_id.to_string(),
            target_dedicated: resize.target_dedicated_nodes,
            target_low_priority: resize.target_low_priority_nodes,
        });

        let pool = inner
            .pools
            .get_mut(pool_id)
            .ok_or_else(|| pool_not_found(pool_id))?;
        if pool.allocation_state != AllocationState::Steady {
            return Err(BatchError::service(
                409,
                "PoolNotSteady",
                "The specified pool is not in steady allocation state.",
            ));
        }
        pool.target_dedicated_nodes = resize.target_dedicated_nodes;
        pool.target_low_priority_nodes = resize.target_low_priority_nodes;
        pool.allocation_state = AllocationState::Resizing;
        Ok(())
    }

    fn stop_resize_pool(&self, pool_id: &str) -> BatchResult<()> {
        let mut inner = self.lock();
        inner
            .calls
            .push(BatchCall::StopResizePool(pool_id.to_string()));

        let polls = inner.polls_until_steady;
        let pool = inner
            .pools
            .get_mut(pool_id)
            .ok_or_else(|| pool_not_found(pool_id))?;
        if pool.allocation_state == AllocationState::Resizing {
            pool.allocation_state = AllocationState::Stopping;
            inner.stopping_polls.insert(pool_id.to_string(), polls);
        }
        Ok(())
    }

    fn remove_nodes(&self, pool_id: &str, remove: &NodeRemoveParameter) -> BatchResult<()> {
        let mut inner = self.lock();
        inner.calls.push(BatchCall::RemoveNodes {
            pool_id: pool_id.to_string(),
            node_ids: remove.node_list.clone(),
        });
        if !inner.pools.contains_key(pool_id) {
            return Err(pool_not_found(pool_id));
        }
        if let Some(nodes) = inner.nodes.get_mut(pool_id) {
            nodes.retain(|n| !remove.node_list.contains(&n.id));
        }
        Ok(())
    }

    fn list_compute_nodes(&self, pool_id: &str) -> BatchResult<Vec<ComputeNode>> {
        let mut inner = self.lock();
        inner
            .calls
            .push(BatchCall::ListComputeNodes(pool_id.to_string()));
        if inner.failing_node_listings.contains(pool_id) {
            return Err(BatchError::service(
                500,
                "InternalServerError",
                "Server encountered an internal error.",
            ));
        }
        if !inner.pools.contains_key(pool_id) {
            return Err(pool_not_found(pool_id));
        }
        Ok(inner.nodes.get(pool_id).cloned().unwrap_or_default())
    }

    fn reboot_compute_node(&self, pool_id: &str, node_id: &str) -> BatchResult<()> {
        let mut inner = self.lock();
        inner.calls.push(BatchCall::RebootComputeNode {
            pool_id: pool_id.to_string(),
            node_id: node_id.to_string(),
        });
        let node = inner
            .nodes
            .get_mut(pool_id)
            .and_then(|nodes| nodes.iter_mut().find(|n| n.id == node_id))
            .ok_or_else(|| {
                BatchError::service(
                    404,
                    codes::NODE_NOT_FOUND,
                    format!("The specified node {node_id} does not exist."),
                )
            })?;
        node.state = ComputeNodeState::Rebooting;
        Ok(())
    }

    fn get_node_file(
        &self,
        pool_id: &str,
        node_id: &str,
        file_path: &str,
    ) -> BatchResult<String> {
        let mut inner = self.lock();
        let file_path = file_path.trim_start_matches('/').to_string();
        inner.calls.push(BatchCall::GetNodeFile {
            pool_id: pool_id.to_string(),
            node_id: node_id.to_string(),
            file_path: file_path.clone(),
        });
        inner
            .files
            .get(&(pool_id.to_string(), node_id.to_string(), file_path))
            .cloned()
            .ok_or_else(|| {
                BatchError::service(404, "FileNotFound", "The specified file does not exist.")
            })
    }

    fn add_job(&self, job: &JobAddParameter) -> BatchResult<()> {
        let mut inner = self.lock();
        inner.calls.push(BatchCall::AddJob(job.id.clone()));
        if inner.jobs.contains_key(&job.id) {
            return Err(BatchError::service(
                409,
                codes::JOB_EXISTS,
                "The specified job already exists.",
            ));
        }
        inner.jobs.insert(job.id.clone(), Vec::new());
        Ok(())
    }

    fn delete_job(&self, job_id: &str) -> BatchResult<()> {
        let mut inner = self.lock();
        inner.calls.push(BatchCall::DeleteJob(job_id.to_string()));
        inner
            .jobs
            .remove(job_id)
            .map(|_| ())
            .ok_or_else(|| job_not_found(job_id))
    }

    fn add_task(&self, job_id: &str, task: &TaskAddParameter) -> BatchResult<()> {
        let mut inner = self.lock();
        inner.calls.push(BatchCall::AddTask {
            job_id: job_id.to_string(),
            task_id: task.id.clone(),
        });
        inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| job_not_found(job_id))?
            .push(task.clone());
        Ok(())
    }
}
