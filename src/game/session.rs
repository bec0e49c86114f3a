//! One play session: owns the dispatcher, the scheduled notes and every
//! collaborator they report to, and runs the fixed per-tick order.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use log::{info, trace};
use rand::rngs::StdRng;
use serde::Serialize;

use crate::core::input::{InputDispatcher, InputEventArgs, SensorArea, SensorClass, SubscriberId};
use crate::game::judgment::{JudgeGrade, JudgeResult};
use crate::game::note::{
    EffectSink, GameInputEvent, NoteId, NotePool, ResultSink, SensorQuery, TickContext,
    TouchQueue,
};
use crate::game::scheduler::{NoteComponent, Phase, Scheduler};
use crate::game::timing_windows::JudgeSettings;
use crate::game::touch_note::{TouchNote, TouchNoteDesc};

/* ------------------------ Collaborators ------------------------ */

impl SensorQuery for InputDispatcher {
    #[inline(always)]
    fn is_on(&self, area: SensorArea) -> bool {
        self.status(SensorClass::Touch, area)
            .is_ok_and(|s| s.is_on())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct NoteRecord {
    pub id: usize,
    #[serde(flatten)]
    pub result: JudgeResult,
}

/// Result sink that counts grades for the end-of-play summary.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Tally {
    pub counts: BTreeMap<JudgeGrade, u32>,
    pub fast: u32,
    pub late: u32,
    pub breaks: u32,
    pub notes: Vec<NoteRecord>,
}

impl Tally {
    #[inline(always)]
    pub fn count(&self, grade: JudgeGrade) -> u32 {
        self.counts.get(&grade).copied().unwrap_or(0)
    }

    #[inline(always)]
    pub fn total(&self) -> usize {
        self.notes.len()
    }
}

impl ResultSink for Tally {
    fn report(&mut self, id: NoteId, result: JudgeResult) {
        *self.counts.entry(result.grade).or_insert(0) += 1;
        if result.grade.is_fast() && !result.grade.is_missed() {
            self.fast += 1;
        } else if result.grade.is_late() && !result.grade.is_missed() {
            self.late += 1;
        }
        if result.is_break {
            self.breaks += 1;
        }
        self.notes.push(NoteRecord { id: id.0, result });
    }
}

/// Presentation stand-in: effects are traced, and the set of areas with a
/// running hold effect is tracked.
#[derive(Debug, Default)]
pub struct EffectLog {
    holding: Vec<SensorArea>,
}

impl EffectLog {
    #[inline(always)]
    pub fn holding(&self) -> &[SensorArea] {
        &self.holding
    }
}

impl EffectSink for EffectLog {
    fn judge(&mut self, area: SensorArea, result: &JudgeResult) {
        trace!("Judge effect on {area}: {}", result.grade);
    }

    fn hold_start(&mut self, area: SensorArea) {
        if !self.holding.contains(&area) {
            self.holding.push(area);
        }
    }

    fn hold_stop(&mut self, area: SensorArea) {
        self.holding.retain(|a| *a != area);
    }

    fn hold_reset(&mut self, area: SensorArea) {
        self.hold_stop(area);
    }
}

/// Pool stand-in that records which notes came back.
#[derive(Debug, Default)]
pub struct Recycler {
    released: Vec<NoteId>,
}

impl NotePool for Recycler {
    fn release(&mut self, id: NoteId) {
        self.released.push(id);
    }
}

/* ------------------------ Session ------------------------ */

#[derive(Copy, Clone, Debug, Default, Serialize)]
pub struct TickStats {
    pub accepted_events: usize,
    pub update_ms: f64,
    pub fixed_update_ms: f64,
    pub late_update_ms: f64,
}

pub struct Session {
    dispatcher: InputDispatcher,
    frame_events: Rc<RefCell<Vec<InputEventArgs>>>,
    listener: SubscriberId,
    scheduler: Scheduler,
    queue: TouchQueue,
    settings: JudgeSettings,
    rng: StdRng,
    tally: Tally,
    effects: EffectLog,
    pool: Recycler,
    chart_time: f32,
    is_start: bool,
}

impl Session {
    /// `lead_in` is how many seconds of chart time pass before the anchor 0.
    pub fn new(
        mut dispatcher: InputDispatcher,
        notes: Vec<TouchNoteDesc>,
        settings: JudgeSettings,
        rng: StdRng,
        lead_in: f32,
    ) -> Self {
        let frame_events = Rc::new(RefCell::new(Vec::new()));
        let sink = frame_events.clone();
        let listener = dispatcher.bind_any(move |args| sink.borrow_mut().push(*args));

        let components: Vec<Box<dyn NoteComponent>> = notes
            .into_iter()
            .map(|desc| {
                let mut note = TouchNote::new(desc);
                note.initialize();
                Box::new(note) as Box<dyn NoteComponent>
            })
            .collect();
        info!(
            "Session ready: {} notes, autoplay {}.",
            components.len(),
            if settings.autoplay { "on" } else { "off" }
        );

        Self {
            dispatcher,
            frame_events,
            listener,
            scheduler: Scheduler::new(components),
            queue: TouchQueue::new(),
            settings,
            rng,
            tally: Tally::default(),
            effects: EffectLog::default(),
            pool: Recycler::default(),
            chart_time: -lead_in,
            is_start: false,
        }
    }

    /// Start the chart clock. Before this, time stands still at `-lead_in`.
    pub fn start(&mut self) {
        self.is_start = true;
    }

    #[inline(always)]
    pub const fn chart_time(&self) -> f32 {
        self.chart_time
    }

    #[inline(always)]
    pub fn dispatcher_mut(&mut self) -> &mut InputDispatcher {
        &mut self.dispatcher
    }

    #[inline(always)]
    pub fn tally(&self) -> &Tally {
        &self.tally
    }

    #[inline(always)]
    pub fn effects(&self) -> &EffectLog {
        &self.effects
    }

    #[inline(always)]
    pub fn released(&self) -> &[NoteId] {
        &self.pool.released
    }

    #[inline(always)]
    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    /// Dispatch input, then run update, fixed-update and late-update.
    pub fn tick(&mut self, delta_sec: f32) -> TickStats {
        let accepted_events = self.dispatcher.update();
        let events: Vec<GameInputEvent> = self
            .frame_events
            .borrow_mut()
            .drain(..)
            .map(GameInputEvent::new)
            .collect();

        if self.is_start {
            self.chart_time += delta_sec;
        }

        let mut ctx = TickContext {
            this_frame_sec: self.chart_time,
            delta_sec,
            is_start: self.is_start,
            settings: &self.settings,
            sensors: &self.dispatcher,
            events: &events,
            queue: &mut self.queue,
            results: &mut self.tally,
            effects: &mut self.effects,
            pool: &mut self.pool,
            rng: &mut self.rng,
        };
        for phase in [Phase::Update, Phase::FixedUpdate, Phase::LateUpdate] {
            self.scheduler.run_phase(phase, &mut ctx);
        }

        TickStats {
            accepted_events,
            update_ms: self.scheduler.elapsed_ms(Phase::Update),
            fixed_update_ms: self.scheduler.elapsed_ms(Phase::FixedUpdate),
            late_update_ms: self.scheduler.elapsed_ms(Phase::LateUpdate),
        }
    }

    /// Detach from the dispatcher and hand it back with the final tally.
    pub fn finish(mut self) -> (InputDispatcher, Tally) {
        self.dispatcher.unbind_any(self.listener);
        info!(
            "Session finished: {} results, {} notes recycled.",
            self.tally.total(),
            self.pool.released.len()
        );
        (self.dispatcher, self.tally)
    }
}
