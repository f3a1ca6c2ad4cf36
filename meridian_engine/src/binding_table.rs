//! Binding-table manager - frames-in-flight descriptor bookkeeping
//!
//! Tracks, per in-flight frame slot, which binding tables have been handed
//! out for each (shader, set index) pair, plus the updates recorded against
//! them. The actual table allocation and update commit are backend work,
//! abstracted behind `TablePool` so the rotation and caching logic here is
//! testable without a GPU.

use crate::error::{Error, Result};
use crate::reflection::ShaderId;
use rustc_hash::FxHashMap;
use std::fmt::Debug;
use std::mem;

/// Backend half of binding-table management
///
/// One pool per in-flight frame slot. `reset` reclaims every table the pool
/// ever allocated in one call; the manager clears its caches at the same
/// time so no stale handle survives.
pub trait TablePool {
    /// Opaque table handle (e.g. a descriptor set)
    type Table: Copy + Eq + Debug;

    /// One recorded binding update, self-contained and committable later
    type Update;

    /// Allocate a fresh table for `(shader, set_index)`
    fn allocate(&mut self, shader: ShaderId, set_index: u32) -> Result<Self::Table>;

    /// Commit a batch of recorded updates in one backend call
    fn commit(&mut self, updates: Vec<Self::Update>) -> Result<()>;

    /// Reclaim every table allocated from this pool
    fn reset(&mut self) -> Result<()>;
}

/// Per-slot state: the pool plus caches that must die with it
struct FrameSlot<P: TablePool> {
    pool: P,
    tables: FxHashMap<(ShaderId, u32), P::Table>,
    pending: Vec<P::Update>,
}

/// Frames-in-flight binding-table manager
///
/// Owns one `TablePool` per in-flight slot. Tables are cached per
/// (shader, frame slot, set index); updates are recorded per slot and
/// committed in one batch by `flush_updates`.
pub struct BindingTableManager<P: TablePool> {
    slots: Vec<FrameSlot<P>>,
}

impl<P: TablePool> BindingTableManager<P> {
    /// Create a manager from one pool per in-flight frame slot
    pub fn new(pools: Vec<P>) -> Self {
        assert!(!pools.is_empty(), "at least one frame slot required");
        Self {
            slots: pools
                .into_iter()
                .map(|pool| FrameSlot {
                    pool,
                    tables: FxHashMap::default(),
                    pending: Vec::new(),
                })
                .collect(),
        }
    }

    /// Number of frame slots this manager rotates through
    pub fn frames_in_flight(&self) -> u32 {
        self.slots.len() as u32
    }

    fn slot_mut(&mut self, frame: u32) -> Result<&mut FrameSlot<P>> {
        let count = self.slots.len();
        self.slots.get_mut(frame as usize).ok_or_else(|| {
            Error::InvalidResource(format!(
                "Frame slot {} out of range ({} frames in flight)",
                frame, count
            ))
        })
    }

    fn slot(&self, frame: u32) -> Result<&FrameSlot<P>> {
        let count = self.slots.len();
        self.slots.get(frame as usize).ok_or_else(|| {
            Error::InvalidResource(format!(
                "Frame slot {} out of range ({} frames in flight)",
                frame, count
            ))
        })
    }

    /// Get the cached table for `(shader, set_index)` in `frame`'s slot, or
    /// allocate a fresh one.
    ///
    /// Returns the table and whether it was freshly allocated. A fresh table
    /// has no contents; the caller must record updates for every binding the
    /// shader declares in that set before it is bound.
    pub fn get_or_allocate(
        &mut self,
        frame: u32,
        shader: ShaderId,
        set_index: u32,
    ) -> Result<(P::Table, bool)> {
        let slot = self.slot_mut(frame)?;
        if let Some(&table) = slot.tables.get(&(shader, set_index)) {
            return Ok((table, false));
        }
        let table = slot.pool.allocate(shader, set_index)?;
        slot.tables.insert((shader, set_index), table);
        Ok((table, true))
    }

    /// Table last handed out for `(shader, set_index)` in `frame`'s slot,
    /// if any. This is what draw recording binds; it never allocates.
    pub fn last(&self, frame: u32, shader: ShaderId, set_index: u32) -> Option<P::Table> {
        self.slot(frame)
            .ok()
            .and_then(|slot| slot.tables.get(&(shader, set_index)).copied())
    }

    /// Record one binding update against `frame`'s slot
    pub fn record_update(&mut self, frame: u32, update: P::Update) -> Result<()> {
        self.slot_mut(frame)?.pending.push(update);
        Ok(())
    }

    /// Number of updates recorded and not yet flushed for `frame`'s slot
    pub fn pending_count(&self, frame: u32) -> usize {
        self.slot(frame).map_or(0, |slot| slot.pending.len())
    }

    /// Commit every recorded update for `frame`'s slot in one backend call.
    ///
    /// The pending list is drained unconditionally: on failure the updates
    /// are gone and the caller re-records them (dirty flags stay set).
    pub fn flush_updates(&mut self, frame: u32) -> Result<()> {
        let slot = self.slot_mut(frame)?;
        let pending = mem::take(&mut slot.pending);
        if pending.is_empty() {
            return Ok(());
        }
        slot.pool.commit(pending)
    }

    /// Reclaim `frame`'s slot wholesale: drop all cached tables, drop any
    /// un-flushed updates, and reset the pool.
    ///
    /// Called at the start of a frame, once the GPU is known to be done with
    /// the slot's previous use.
    pub fn cleanup_frame(&mut self, frame: u32) -> Result<()> {
        let slot = self.slot_mut(frame)?;
        slot.tables.clear();
        slot.pending.clear();
        slot.pool.reset()
    }
}

#[cfg(test)]
#[path = "binding_table_tests.rs"]
mod tests;
