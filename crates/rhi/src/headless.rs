//! Simulated GPU for tests and the headless demo.
//!
//! [`HeadlessGpu`] implements [`Backend`] without touching a real device.
//! Submitted work queues up on a simulated timeline and only completes when
//! a driver tells it to, either explicitly ([`HeadlessGpu::complete_up_to`],
//! [`HeadlessGpu::complete_next`]) or through a background
//! [`CompletionWorker`]. This makes every interleaving of CPU and GPU
//! progress reproducible.
//!
//! The simulation also audits allocator reuse: resetting a command allocator
//! while a command list recorded from it has not been retired by a completed
//! fence signal is counted as a premature reset.
//!
//! # Example
//!
//! ```
//! use pbr_rhi::{Backend, GpuFence};
//! use pbr_rhi::headless::HeadlessGpu;
//!
//! let gpu = HeadlessGpu::new();
//! let fence = gpu.create_fence().unwrap();
//! fence.signal(1).unwrap();
//! assert_eq!(fence.completed_value().unwrap(), 0);
//!
//! gpu.complete_next();
//! assert_eq!(fence.completed_value().unwrap(), 1);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, trace, warn};

use crate::backend::{
    Backend, CommandAllocator, DrawRecorder, GpuFence, HostVisibleBuffer, PipelineId,
};
use crate::error::{RhiError, RhiResult};
use crate::vertex::{IndexBufferView, VertexBufferView};

/// First simulated device address handed out.
const ADDRESS_BASE: u64 = 0x1_0000_0000;
/// Simulated allocations are placed on this boundary.
const ADDRESS_GRANULARITY: u64 = 0x1_0000;

/// One recorded command.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    SetPipeline(PipelineId),
    BindPassConstants(u64),
    BindGeometry {
        vertex_buffer: u64,
        index_buffer: u64,
    },
    BindObjectConstants(u64),
    BindMaterialConstants(u64),
    BindTextures {
        environment: Option<u32>,
        diffuse: Option<u32>,
    },
    DrawIndexed {
        index_count: u32,
        start_index: u32,
        base_vertex: i32,
    },
}

/// An entry on the simulated queue, in submission order.
#[derive(Clone, Debug, PartialEq)]
pub enum Submission {
    /// A command list executed from the given allocator.
    Commands {
        allocator: u64,
        commands: Vec<DrawCommand>,
    },
    /// A fence signal.
    Signal(u64),
}

#[derive(Debug)]
struct InFlightList {
    allocator: u64,
    /// First signal enqueued after this list. `None` until one is.
    retired_by: Option<u64>,
}

#[derive(Debug, Default)]
struct GpuState {
    pending_signals: VecDeque<u64>,
    completed: u64,
    lost: Option<String>,
    submissions: Vec<Submission>,
    in_flight: Vec<InFlightList>,
    premature_resets: usize,
    next_address: u64,
    next_allocator: u64,
}

impl GpuState {
    fn check_lost(&self) -> RhiResult<()> {
        match &self.lost {
            Some(reason) => Err(RhiError::DeviceLost(reason.clone())),
            None => Ok(()),
        }
    }

    fn retire(&mut self) {
        let completed = self.completed;
        self.in_flight
            .retain(|list| list.retired_by.is_none_or(|v| v > completed));
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<GpuState>,
    progress: Condvar,
}

/// Simulated GPU timeline.
///
/// Cloning yields another handle to the same timeline, so a test or worker
/// thread can drive completion while the renderer owns the backend.
#[derive(Clone, Debug, Default)]
pub struct HeadlessGpu {
    shared: Arc<Shared>,
}

impl HeadlessGpu {
    /// Creates an idle GPU with completed value 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest completed fence value.
    pub fn completed_value(&self) -> u64 {
        self.shared.state.lock().completed
    }

    /// Signals queued but not yet completed, oldest first.
    pub fn pending_signals(&self) -> Vec<u64> {
        self.shared.state.lock().pending_signals.iter().copied().collect()
    }

    /// Completes every queued signal up to and including `value`.
    ///
    /// The completed value becomes `value` even if no signal equal to it was
    /// queued. It never decreases.
    pub fn complete_up_to(&self, value: u64) {
        let mut state = self.shared.state.lock();
        while state.pending_signals.front().is_some_and(|&v| v <= value) {
            state.pending_signals.pop_front();
        }
        if value > state.completed {
            state.completed = value;
            trace!("GPU completed fence value {}", value);
        }
        state.retire();
        drop(state);
        self.shared.progress.notify_all();
    }

    /// Completes the oldest queued signal and returns its value.
    pub fn complete_next(&self) -> Option<u64> {
        let mut state = self.shared.state.lock();
        let value = state.pending_signals.pop_front()?;
        state.completed = state.completed.max(value);
        trace!("GPU completed fence value {}", value);
        state.retire();
        drop(state);
        self.shared.progress.notify_all();
        Some(value)
    }

    /// Completes every queued signal.
    pub fn complete_all(&self) {
        let last = self.shared.state.lock().pending_signals.back().copied();
        if let Some(value) = last {
            self.complete_up_to(value);
        }
    }

    /// Overwrites the completed value, even downwards.
    ///
    /// Models a faulty driver so callers can test their monotonicity checks.
    pub fn inject_completed_value(&self, value: u64) {
        let mut state = self.shared.state.lock();
        warn!(
            "Injecting completed value {} (was {})",
            value, state.completed
        );
        state.completed = value;
        drop(state);
        self.shared.progress.notify_all();
    }

    /// Marks the device as lost. Waiters wake up with an error.
    pub fn set_device_lost(&self, reason: &str) {
        let mut state = self.shared.state.lock();
        error!("Headless device lost: {}", reason);
        state.lost = Some(reason.to_string());
        drop(state);
        self.shared.progress.notify_all();
    }

    /// Everything submitted so far, in order.
    pub fn submissions(&self) -> Vec<Submission> {
        self.shared.state.lock().submissions.clone()
    }

    /// Removes and returns everything submitted so far.
    pub fn take_submissions(&self) -> Vec<Submission> {
        std::mem::take(&mut self.shared.state.lock().submissions)
    }

    /// Number of command lists executed so far.
    pub fn executed_lists(&self) -> usize {
        self.shared
            .state
            .lock()
            .submissions
            .iter()
            .filter(|s| matches!(s, Submission::Commands { .. }))
            .count()
    }

    /// Allocator resets that happened while their work was still in flight.
    pub fn premature_resets(&self) -> usize {
        self.shared.state.lock().premature_resets
    }

    /// Starts a thread that completes queued signals in order, each one
    /// `latency` after it is first seen.
    pub fn spawn_completion_worker(&self, latency: Duration) -> CompletionWorker {
        CompletionWorker::spawn(self.clone(), latency)
    }
}

impl Backend for HeadlessGpu {
    type Memory = HeadlessMemory;
    type Allocator = HeadlessCommandAllocator;
    type CommandList = HeadlessCommandList;
    type Fence = HeadlessFence;

    fn name(&self) -> &'static str {
        "headless"
    }

    fn create_upload_memory(&self, size: u64, label: &str) -> RhiResult<HeadlessMemory> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "Buffer '{}' size must be greater than 0",
                label
            )));
        }
        let len = usize::try_from(size).map_err(|_| RhiError::AllocationFailed {
            label: label.to_string(),
            reason: format!("{} bytes exceeds the address space", size),
        })?;

        let mut state = self.shared.state.lock();
        state.check_lost()?;
        if state.next_address == 0 {
            state.next_address = ADDRESS_BASE;
        }
        let address = state.next_address;
        state.next_address += size.div_ceil(ADDRESS_GRANULARITY) * ADDRESS_GRANULARITY;

        debug!(
            "Created headless buffer '{}': {} bytes at {:#x}",
            label, size, address
        );

        Ok(HeadlessMemory {
            bytes: vec![0; len],
            address,
        })
    }

    fn create_command_allocator(&self) -> RhiResult<HeadlessCommandAllocator> {
        let mut state = self.shared.state.lock();
        state.check_lost()?;
        state.next_allocator += 1;
        Ok(HeadlessCommandAllocator {
            id: state.next_allocator,
            resets: 0,
            gpu: self.clone(),
        })
    }

    fn create_fence(&self) -> RhiResult<HeadlessFence> {
        self.shared.state.lock().check_lost()?;
        Ok(HeadlessFence { gpu: self.clone() })
    }

    fn begin_command_list(
        &self,
        allocator: &mut HeadlessCommandAllocator,
    ) -> RhiResult<HeadlessCommandList> {
        self.shared.state.lock().check_lost()?;
        Ok(HeadlessCommandList {
            allocator: allocator.id,
            commands: Vec::new(),
        })
    }

    fn execute(&self, list: HeadlessCommandList) -> RhiResult<()> {
        let mut state = self.shared.state.lock();
        state.check_lost()?;
        trace!(
            "Executing {} commands from allocator {}",
            list.commands.len(),
            list.allocator
        );
        state.in_flight.push(InFlightList {
            allocator: list.allocator,
            retired_by: None,
        });
        state.submissions.push(Submission::Commands {
            allocator: list.allocator,
            commands: list.commands,
        });
        Ok(())
    }

    fn device_status(&self) -> RhiResult<()> {
        self.shared.state.lock().check_lost()
    }
}

/// Host memory standing in for a mapped upload buffer.
#[derive(Debug)]
pub struct HeadlessMemory {
    bytes: Vec<u8>,
    address: u64,
}

impl HostVisibleBuffer for HeadlessMemory {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn mapped_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn mapped_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn device_address(&self) -> u64 {
        self.address
    }
}

/// Simulated command allocator.
#[derive(Debug)]
pub struct HeadlessCommandAllocator {
    id: u64,
    resets: usize,
    gpu: HeadlessGpu,
}

impl HeadlessCommandAllocator {
    /// Identifier recorded with every list executed from this allocator.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of times [`CommandAllocator::reset`] was called.
    #[inline]
    pub fn resets(&self) -> usize {
        self.resets
    }
}

impl CommandAllocator for HeadlessCommandAllocator {
    fn reset(&mut self) -> RhiResult<()> {
        let mut state = self.gpu.shared.state.lock();
        state.check_lost()?;
        let busy = state
            .in_flight
            .iter()
            .filter(|list| list.allocator == self.id)
            .count();
        if busy > 0 {
            state.premature_resets += 1;
            error!(
                "Allocator {} reset with {} command list(s) still in flight",
                self.id, busy
            );
        }
        self.resets += 1;
        Ok(())
    }
}

/// Simulated command list; records commands for inspection.
#[derive(Debug)]
pub struct HeadlessCommandList {
    allocator: u64,
    commands: Vec<DrawCommand>,
}

impl HeadlessCommandList {
    /// Commands recorded so far.
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }
}

impl DrawRecorder for HeadlessCommandList {
    fn set_pipeline(&mut self, pipeline: PipelineId) -> RhiResult<()> {
        self.commands.push(DrawCommand::SetPipeline(pipeline));
        Ok(())
    }

    fn bind_pass_constants(&mut self, address: u64) {
        self.commands.push(DrawCommand::BindPassConstants(address));
    }

    fn bind_geometry(&mut self, vertices: &VertexBufferView, indices: &IndexBufferView) {
        self.commands.push(DrawCommand::BindGeometry {
            vertex_buffer: vertices.buffer,
            index_buffer: indices.buffer,
        });
    }

    fn bind_object_constants(&mut self, address: u64) {
        self.commands.push(DrawCommand::BindObjectConstants(address));
    }

    fn bind_material_constants(&mut self, address: u64) {
        self.commands
            .push(DrawCommand::BindMaterialConstants(address));
    }

    fn bind_textures(&mut self, environment: Option<u32>, diffuse: Option<u32>) {
        self.commands.push(DrawCommand::BindTextures {
            environment,
            diffuse,
        });
    }

    fn draw_indexed(&mut self, index_count: u32, start_index: u32, base_vertex: i32) {
        self.commands.push(DrawCommand::DrawIndexed {
            index_count,
            start_index,
            base_vertex,
        });
    }
}

/// Fence on the simulated timeline.
#[derive(Clone, Debug)]
pub struct HeadlessFence {
    gpu: HeadlessGpu,
}

impl GpuFence for HeadlessFence {
    fn signal(&self, value: u64) -> RhiResult<()> {
        let mut state = self.gpu.shared.state.lock();
        state.check_lost()?;
        for list in state.in_flight.iter_mut() {
            if list.retired_by.is_none() {
                list.retired_by = Some(value);
            }
        }
        state.pending_signals.push_back(value);
        state.submissions.push(Submission::Signal(value));
        drop(state);
        self.gpu.shared.progress.notify_all();
        Ok(())
    }

    fn completed_value(&self) -> RhiResult<u64> {
        let state = self.gpu.shared.state.lock();
        state.check_lost()?;
        Ok(state.completed)
    }

    fn wait(&self, value: u64, timeout: Option<Duration>) -> RhiResult<bool> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.gpu.shared.state.lock();
        loop {
            state.check_lost()?;
            if state.completed >= value {
                return Ok(true);
            }
            match deadline {
                Some(deadline) => {
                    if self
                        .gpu
                        .shared
                        .progress
                        .wait_until(&mut state, deadline)
                        .timed_out()
                    {
                        state.check_lost()?;
                        return Ok(state.completed >= value);
                    }
                }
                None => self.gpu.shared.progress.wait(&mut state),
            }
        }
    }
}

/// Background thread retiring queued signals with a fixed latency.
///
/// Stops and joins on drop.
pub struct CompletionWorker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CompletionWorker {
    fn spawn(gpu: HeadlessGpu, latency: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = std::thread::Builder::new()
            .name("headless-gpu".to_string())
            .spawn(move || Self::run(gpu, latency, flag))
            .ok();
        if handle.is_none() {
            error!("Failed to spawn headless GPU completion thread");
        }
        debug!("Headless GPU completion worker started ({:?} latency)", latency);
        Self { stop, handle }
    }

    fn run(gpu: HeadlessGpu, latency: Duration, stop: Arc<AtomicBool>) {
        let poll = Duration::from_millis(1).min(latency.max(Duration::from_micros(100)));
        while !stop.load(Ordering::Acquire) {
            let next = {
                let mut state = gpu.shared.state.lock();
                if state.lost.is_some() {
                    break;
                }
                if state.pending_signals.is_empty() {
                    // Woken by `signal`, or by the poll so `stop` is observed.
                    gpu.shared.progress.wait_for(&mut state, poll);
                    None
                } else {
                    state.pending_signals.front().copied()
                }
            };
            if let Some(value) = next {
                std::thread::sleep(latency);
                gpu.complete_up_to(value);
            }
        }
        trace!("Headless GPU completion worker exiting");
    }
}

impl Drop for CompletionWorker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Headless GPU completion thread panicked");
            }
        }
    }
}
