//! Collaborator doubles for note and scheduler tests.

use rand::rngs::StdRng;

use crate::core::input::SensorArea;
use crate::game::judgment::JudgeResult;
use crate::game::note::{
    EffectSink, GameInputEvent, NoteId, NotePool, ResultSink, SensorQuery, TickContext,
    TouchQueue,
};
use crate::game::timing_windows::JudgeSettings;

pub struct Harness {
    pub touched: Vec<SensorArea>,
    pub is_start: bool,
    pub queue: TouchQueue,
    pub reported: Vec<(NoteId, JudgeResult)>,
    pub effects: Vec<String>,
    pub released: Vec<NoteId>,
    pub settings: JudgeSettings,
}

struct Touched<'a>(&'a [SensorArea]);

impl SensorQuery for Touched<'_> {
    fn is_on(&self, area: SensorArea) -> bool {
        self.0.contains(&area)
    }
}

struct Reports<'a>(&'a mut Vec<(NoteId, JudgeResult)>);

impl ResultSink for Reports<'_> {
    fn report(&mut self, id: NoteId, result: JudgeResult) {
        self.0.push((id, result));
    }
}

struct Effects<'a>(&'a mut Vec<String>);

impl EffectSink for Effects<'_> {
    fn judge(&mut self, area: SensorArea, result: &JudgeResult) {
        self.0.push(format!("judge {area} {}", result.grade));
    }

    fn hold_start(&mut self, area: SensorArea) {
        self.0.push(format!("start {area}"));
    }

    fn hold_stop(&mut self, area: SensorArea) {
        self.0.push(format!("stop {area}"));
    }

    fn hold_reset(&mut self, area: SensorArea) {
        self.0.push(format!("reset {area}"));
    }
}

struct Pool<'a>(&'a mut Vec<NoteId>);

impl NotePool for Pool<'_> {
    fn release(&mut self, id: NoteId) {
        self.0.push(id);
    }
}

impl Harness {
    pub fn new() -> Self {
        Self {
            touched: Vec::new(),
            is_start: true,
            queue: TouchQueue::new(),
            reported: Vec::new(),
            effects: Vec::new(),
            released: Vec::new(),
            settings: JudgeSettings::default(),
        }
    }

    /// Run `f` with a context for chart time `now`, `dt` after the previous
    /// frame, carrying this frame's dispatched `events`.
    pub fn with_ctx<R>(
        &mut self,
        now: f32,
        dt: f32,
        events: &[GameInputEvent],
        rng: &mut StdRng,
        f: impl FnOnce(&mut TickContext<'_>) -> R,
    ) -> R {
        let sensors = Touched(&self.touched);
        let mut results = Reports(&mut self.reported);
        let mut effects = Effects(&mut self.effects);
        let mut pool = Pool(&mut self.released);
        let mut ctx = TickContext {
            this_frame_sec: now,
            delta_sec: dt,
            is_start: self.is_start,
            settings: &self.settings,
            sensors: &sensors,
            events,
            queue: &mut self.queue,
            results: &mut results,
            effects: &mut effects,
            pool: &mut pool,
            rng,
        };
        f(&mut ctx)
    }

    pub fn grades(&self) -> Vec<crate::game::judgment::JudgeGrade> {
        self.reported.iter().map(|(_, r)| r.grade).collect()
    }
}
