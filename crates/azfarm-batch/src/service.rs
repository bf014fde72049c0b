//! The Batch control-plane operations azfarm depends on.

use std::sync::Arc;

use crate::error::BatchResult;
use crate::models::*;

/// Batch account operations, one method per REST call.
///
/// Implementations report vendor failures as
/// [`BatchError::Service`](crate::BatchError::Service) with the service's
/// error code, e.g. `get_pool` on a missing pool fails with `PoolNotFound`.
pub trait BatchService {
    fn list_pools(&self) -> BatchResult<Vec<Pool>>;

    fn get_pool(&self, pool_id: &str) -> BatchResult<Pool>;

    fn add_pool(&self, pool: &PoolAddParameter) -> BatchResult<()>;

    fn delete_pool(&self, pool_id: &str) -> BatchResult<()>;

    fn resize_pool(&self, pool_id: &str, resize: &PoolResizeParameter) -> BatchResult<()>;

    fn stop_resize_pool(&self, pool_id: &str) -> BatchResult<()>;

    fn remove_nodes(&self, pool_id: &str, remove: &NodeRemoveParameter) -> BatchResult<()>;

    fn list_compute_nodes(&self, pool_id: &str) -> BatchResult<Vec<ComputeNode>>;

    fn reboot_compute_node(&self, pool_id: &str, node_id: &str) -> BatchResult<()>;

    /// Contents of a file in the node's Batch working directory tree.
    fn get_node_file(&self, pool_id: &str, node_id: &str, file_path: &str)
    -> BatchResult<String>;

    fn add_job(&self, job: &JobAddParameter) -> BatchResult<()>;

    fn delete_job(&self, job_id: &str) -> BatchResult<()>;

    fn add_task(&self, job_id: &str, task: &TaskAddParameter) -> BatchResult<()>;
}

/// Forward every `BatchService` method through a smart pointer.
macro_rules! forward_batch_service {
    ($($ptr:ty),+ $(,)?) => {$(
        impl<T: BatchService + ?Sized> BatchService for $ptr {
            fn list_pools(&self) -> BatchResult<Vec<Pool>> {
                (**self).list_pools()
            }

            fn get_pool(&self, pool_id: &str) -> BatchResult<Pool> {
                (**self).get_pool(pool_id)
            }

            fn add_pool(&self, pool: &PoolAddParameter) -> BatchResult<()> {
                (**self).add_pool(pool)
            }

            fn delete_pool(&self, pool_id: &str) -> BatchResult<()> {
                (**self).delete_pool(pool_id)
            }

            fn resize_pool(&self, pool_id: &str, resize: &PoolResizeParameter) -> BatchResult<()> {
                (**self).resize_pool(pool_id, resize)
            }

            fn stop_resize_pool(&self, pool_id: &str) -> BatchResult<()> {
                (**self).stop_resize_pool(pool_id)
            }

            fn remove_nodes(&self, pool_id: &str, remove: &NodeRemoveParameter) -> BatchResult<()> {
                (**self).remove_nodes(pool_id, remove)
            }

            fn list_compute_nodes(&self, pool_id: &str) -> BatchResult<Vec<ComputeNode>> {
                (**self).list_compute_nodes(pool_id)
            }

            fn reboot_compute_node(&self, pool_id: &str, node_id: &str) -> BatchResult<()> {
                (**self).reboot_compute_node(pool_id, node_id)
            }

            fn get_node_file(
                &self,
                pool_id: &str,
                node_id: &str,
                file_path: &str,
            ) -> BatchResult<String> {
                (**self).get_node_file(pool_id, node_id, file_path)
            }

            fn add_job(&self, job: &JobAddParameter) -> BatchResult<()> {
                (**self).add_job(job)
            }

            fn delete_job(&self, job_id: &str) -> BatchResult<()> {
                (**self).delete_job(job_id)
            }

            fn add_task(&self, job_id: &str, task: &TaskAddParameter) -> BatchResult<()> {
                (**self).add_task(job_id, task)
            }
        }
    )+};
}

forward_batch_service!(&T, Box<T>, Arc<T>);
