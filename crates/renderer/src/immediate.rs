//! Blocking one-off submissions.
//!
//! [`ImmediateSubmitter`] owns a graphics recording context and a fence that
//! live outside the frame ring. Each [`submit`](ImmediateSubmitter::submit)
//! records, submits and waits before returning, so submissions never
//! overlap and host memory read by the GPU can be released right after.

use std::time::Duration;

use tracing::debug;

use renderer_rhi::RhiResult;
use renderer_rhi::gpu::{GpuDevice, QueueKind, Submission};

/// Dedicated context and fence for synchronous GPU work.
pub struct ImmediateSubmitter<G: GpuDevice> {
    commands: G::Commands,
    fence: G::Fence,
    timeout: Duration,
    submissions: u64,
    /// Set between submit and a successful wait.
    pending: bool,
}

impl<G: GpuDevice> ImmediateSubmitter<G> {
    /// Creates the context and a signaled fence.
    ///
    /// `timeout` bounds the wait for each submission; it should be longer
    /// than the per-frame timeout since uploads may be large.
    ///
    /// # Errors
    ///
    /// Returns an error if the context or fence cannot be created.
    pub fn new(gpu: &G, timeout: Duration) -> RhiResult<Self> {
        Ok(Self {
            commands: gpu.create_commands(QueueKind::Graphics)?,
            fence: gpu.create_fence(true)?,
            timeout,
            submissions: 0,
            pending: false,
        })
    }

    /// Records with `record`, submits to the graphics queue and blocks until
    /// the work has completed.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Timeout`](renderer_rhi::RhiError::Timeout) if the
    /// work does not finish in time, or whatever `record` or the device
    /// reports.
    pub fn submit<F>(&mut self, gpu: &G, record: F) -> RhiResult<()>
    where
        F: FnOnce(&G::Commands) -> RhiResult<()>,
    {
        debug_assert!(
            !self.pending,
            "immediate submission started while a previous one is outstanding"
        );

        gpu.reset_fence(&self.fence)?;
        gpu.begin_commands(&self.commands)?;
        record(&self.commands)?;
        gpu.end_commands(&self.commands)?;

        let submission = Submission::<G>::new().fence(&self.fence);
        gpu.submit(QueueKind::Graphics, &self.commands, &submission)?;
        self.pending = true;
        gpu.wait_for_fence(&self.fence, self.timeout, "immediate submission")?;
        self.pending = false;

        self.submissions += 1;
        debug!("Immediate submission {} completed", self.submissions);
        Ok(())
    }

    /// Number of completed submissions.
    #[inline]
    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    /// The configured wait bound.
    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
