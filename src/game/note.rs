//! Shared note vocabulary and the collaborators a note talks to while it is
//! being judged.

use std::cell::Cell;
use std::rc::Rc;

use rand::rngs::StdRng;
use thiserror::Error;

use crate::core::input::{AREA_COUNT, InputEventArgs, SensorArea};
use crate::game::judgment::{JudgeGrade, JudgeResult};
use crate::game::timing_windows::JudgeSettings;

/// Lifecycle of a judged note. Variants are ordered; a note only ever moves
/// to a later one.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NoteStatus {
    /// Allocated but not yet handed to the scheduler.
    Start,
    Initialized,
    Scaling,
    Running,
    Arrived,
    End,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NoteId(pub usize);

impl std::fmt::Display for NoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum NoteError {
    #[error("note {id} has invalid length {length}s")]
    InvalidLength { id: NoteId, length: f32 },
}

/* ------------------------ Queue ------------------------ */

/// Position of a note in its area's judge queue.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QueueInfo {
    pub area: SensorArea,
    pub index: usize,
}

/// Tracks which note of each area currently accepts player input.
pub trait NoteQueue {
    fn is_current(&self, info: QueueInfo) -> bool;

    /// Called whenever a note resolves. Never moves an area backwards.
    fn advance(&mut self, info: QueueInfo);
}

#[derive(Clone, Debug)]
pub struct TouchQueue {
    current: [usize; AREA_COUNT],
}

impl TouchQueue {
    pub const fn new() -> Self {
        Self {
            current: [0; AREA_COUNT],
        }
    }

    #[inline(always)]
    pub const fn current(&self, area: SensorArea) -> usize {
        self.current[area.ix()]
    }
}

impl Default for TouchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl NoteQueue for TouchQueue {
    #[inline(always)]
    fn is_current(&self, info: QueueInfo) -> bool {
        self.current[info.area.ix()] == info.index
    }

    #[inline(always)]
    fn advance(&mut self, info: QueueInfo) {
        let slot = &mut self.current[info.area.ix()];
        *slot = (*slot).max(info.index + 1);
    }
}

/* ------------------------ Groups ------------------------ */

/// Shared by every note of one simultaneous multi-area gesture.
#[derive(Debug)]
pub struct NoteGroup {
    members: usize,
    judged: Cell<usize>,
    result: Cell<Option<(JudgeGrade, f32)>>,
}

impl NoteGroup {
    pub fn new(members: usize) -> Rc<Self> {
        Rc::new(Self {
            members,
            judged: Cell::new(0),
            result: Cell::new(None),
        })
    }

    #[inline(always)]
    pub const fn members(&self) -> usize {
        self.members
    }

    #[inline(always)]
    pub fn judged(&self) -> usize {
        self.judged.get()
    }

    /// Fraction of members that registered a grade.
    #[inline(always)]
    pub fn percent(&self) -> f32 {
        if self.members == 0 {
            return 0.0;
        }
        self.judged.get() as f32 / self.members as f32
    }

    /// First registered grade and diff (ms).
    #[inline(always)]
    pub fn result(&self) -> Option<(JudgeGrade, f32)> {
        self.result.get()
    }

    pub fn register(&self, grade: JudgeGrade, diff_ms: f32) {
        let judged = self.judged.get();
        debug_assert!(judged < self.members, "group registered more than its members");
        self.judged.set((judged + 1).min(self.members));
        if self.result.get().is_none() {
            self.result.set(Some((grade, diff_ms)));
        }
    }
}

/* ------------------------ Collaborators ------------------------ */

/// Read-only view of the touch panel.
pub trait SensorQuery {
    fn is_on(&self, area: SensorArea) -> bool;
}

pub trait ResultSink {
    fn report(&mut self, id: NoteId, result: JudgeResult);
}

/// Fire-and-forget presentation hooks.
pub trait EffectSink {
    fn judge(&mut self, area: SensorArea, result: &JudgeResult);
    fn hold_start(&mut self, area: SensorArea);
    fn hold_stop(&mut self, area: SensorArea);
    fn hold_reset(&mut self, area: SensorArea);
}

pub trait NotePool {
    fn release(&mut self, id: NoteId);
}

/// A dispatched input event as seen by this tick's notes. The first note
/// that consumes it marks it used so later listeners skip it.
#[derive(Clone, Debug)]
pub struct GameInputEvent {
    pub args: InputEventArgs,
    used: Cell<bool>,
}

impl GameInputEvent {
    pub fn new(args: InputEventArgs) -> Self {
        Self {
            args,
            used: Cell::new(false),
        }
    }

    #[inline(always)]
    pub fn is_used(&self) -> bool {
        self.used.get()
    }

    #[inline(always)]
    pub fn mark_used(&self) {
        self.used.set(true);
    }
}

/// Everything a note may read or poke during one phase callback.
pub struct TickContext<'a> {
    /// Chart time of this frame, seconds.
    pub this_frame_sec: f32,
    pub delta_sec: f32,
    /// False until the chart clock starts.
    pub is_start: bool,
    pub settings: &'a JudgeSettings,
    pub sensors: &'a dyn SensorQuery,
    pub events: &'a [GameInputEvent],
    pub queue: &'a mut dyn NoteQueue,
    pub results: &'a mut dyn ResultSink,
    pub effects: &'a mut dyn EffectSink,
    pub pool: &'a mut dyn NotePool,
    pub rng: &'a mut StdRng,
}
