//! Uniform façade over the tree heap.
//!
//! Higher-level systems talk to a `Manager` they construct and own; there
//! is no process-wide instance. The manager forwards every operation to
//! its heap and records a structured lifecycle log entry per decision,
//! with accounting snapshots, so allocator behavior can be replayed and
//! inspected after the fact.

use crate::error::{AllocError, AuditError};
use crate::heap::{BlockRef, BlockReport, TreeHeap};

/// Severity of a lifecycle record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured record of one allocator decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Monotonic decision id.
    pub decision_id: u64,
    /// Correlation id for this record.
    pub trace_id: String,
    pub level: LogLevel,
    /// API symbol (`alloc`, `free`, `realloc`, `extend`, `clear`).
    pub symbol: &'static str,
    /// Event kind.
    pub event: &'static str,
    /// Block address involved, when known.
    pub addr: Option<usize>,
    /// Size value involved, when applicable.
    pub size: Option<usize>,
    /// Machine-readable outcome label.
    pub outcome: &'static str,
    /// Snapshot: live allocation count.
    pub live_count: usize,
    /// Snapshot: live bytes including headers.
    pub live_bytes: usize,
    /// Snapshot: free bytes including headers.
    pub free_bytes: usize,
}

/// Owning façade: one heap, one lifecycle log.
pub struct Manager {
    heap: TreeHeap,
    next_decision_id: u64,
    lifecycle_logs: Vec<LogRecord>,
}

impl Manager {
    /// Creates a manager over a fresh heap of `capacity` bytes.
    pub fn new(capacity: usize) -> Result<Self, AllocError> {
        Ok(Self {
            heap: TreeHeap::new(capacity)?,
            next_decision_id: 1,
            lifecycle_logs: Vec::new(),
        })
    }

    pub fn alloc(&mut self, size: usize) -> Result<BlockRef, AllocError> {
        match self.heap.alloc(size) {
            Ok(block) => {
                let addr = self.heap.addr(block).ok();
                self.record(LogLevel::Trace, "alloc", "alloc", addr, Some(size), "success");
                Ok(block)
            }
            Err(err) => {
                self.record(LogLevel::Warn, "alloc", "alloc", None, Some(size), "oom");
                Err(err)
            }
        }
    }

    pub fn free(&mut self, block: BlockRef) -> Result<(), AllocError> {
        let addr = self.heap.addr(block).ok();
        match self.heap.free(block) {
            Ok(()) => {
                self.record(LogLevel::Trace, "free", "free", addr, None, "success");
                Ok(())
            }
            Err(err) => {
                self.record(LogLevel::Warn, "free", "stale_free", addr, None, "rejected");
                Err(err)
            }
        }
    }

    pub fn realloc(&mut self, block: BlockRef, new_size: usize) -> Result<BlockRef, AllocError> {
        match self.heap.realloc(block, new_size) {
            Ok(out) => {
                let addr = self.heap.addr(out).ok();
                let event = if out == block {
                    "realloc_in_place"
                } else {
                    "realloc_move"
                };
                self.record(LogLevel::Trace, "realloc", event, addr, Some(new_size), "success");
                Ok(out)
            }
            Err(err @ AllocError::OutOfMemory { .. }) => {
                self.record(
                    LogLevel::Warn,
                    "realloc",
                    "realloc_grow_failed",
                    None,
                    Some(new_size),
                    "oom",
                );
                Err(err)
            }
            Err(err) => {
                self.record(
                    LogLevel::Warn,
                    "realloc",
                    "stale_realloc",
                    None,
                    Some(new_size),
                    "rejected",
                );
                Err(err)
            }
        }
    }

    /// Appends a region to the heap.
    pub fn extend(&mut self, capacity: usize) -> Result<(), AllocError> {
        match self.heap.extend(capacity) {
            Ok(()) => {
                self.record(LogLevel::Info, "extend", "extend", None, Some(capacity), "success");
                Ok(())
            }
            Err(err) => {
                self.record(LogLevel::Warn, "extend", "extend", None, Some(capacity), "denied");
                Err(err)
            }
        }
    }

    /// Resets every region to one spanning free block.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.record(LogLevel::Info, "clear", "clear", None, None, "success");
    }

    pub fn payload(&self, block: BlockRef) -> Result<&[u8], AllocError> {
        self.heap.payload(block)
    }

    pub fn payload_mut(&mut self, block: BlockRef) -> Result<&mut [u8], AllocError> {
        self.heap.payload_mut(block)
    }

    pub fn heap(&self) -> &TreeHeap {
        &self.heap
    }

    pub fn dump(&self) -> Vec<BlockReport> {
        self.heap.dump()
    }

    pub fn audit(&self) -> Result<(), AuditError> {
        self.heap.audit()
    }

    /// View of the lifecycle records collected so far.
    pub fn lifecycle_logs(&self) -> &[LogRecord] {
        &self.lifecycle_logs
    }

    /// Drains the lifecycle records.
    pub fn drain_lifecycle_logs(&mut self) -> Vec<LogRecord> {
        std::mem::take(&mut self.lifecycle_logs)
    }

    fn record(
        &mut self,
        level: LogLevel,
        symbol: &'static str,
        event: &'static str,
        addr: Option<usize>,
        size: Option<usize>,
        outcome: &'static str,
    ) {
        let decision_id = self.next_decision_id;
        self.next_decision_id = self.next_decision_id.wrapping_add(1);
        let trace_id = format!("quarry::heap::{}::{:016x}", symbol, decision_id);
        self.lifecycle_logs.push(LogRecord {
            decision_id,
            trace_id,
            level,
            symbol,
            event,
            addr,
            size,
            outcome,
            live_count: self.heap.live_count(),
            live_bytes: self.heap.live_bytes(),
            free_bytes: self.heap.free_bytes(),
        });
    }
}
