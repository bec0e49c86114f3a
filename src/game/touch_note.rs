//! Judgment state machine for touch and touch-hold notes.

use std::rc::Rc;

use log::{debug, trace};
use rand::Rng;

use crate::core::input::SensorArea;
use crate::game::judgment::{GRADE_COUNT, JudgeGrade, JudgeResult, apply_ex, rescale_for_hold};
use crate::game::note::{NoteError, NoteGroup, NoteId, NoteStatus, QueueInfo, TickContext};
use crate::game::scheduler::{NoteComponent, Phases};
use crate::game::timing_windows::JudgeSettings;

/// Chart data for one touch note. `length` is zero for a plain touch.
#[derive(Clone, Debug)]
pub struct TouchNoteDesc {
    pub id: NoteId,
    pub area: SensorArea,
    /// Judge-timing anchor, seconds of chart time.
    pub timing: f32,
    pub length: f32,
    pub is_break: bool,
    pub is_ex: bool,
    /// Position among this area's notes, in chart order.
    pub queue_index: usize,
    pub group: Option<Rc<NoteGroup>>,
}

pub struct TouchNote {
    id: NoteId,
    area: SensorArea,
    timing: f32,
    length: f32,
    is_break: bool,
    is_ex: bool,
    queue: QueueInfo,
    group: Option<Rc<NoteGroup>>,

    state: NoteStatus,
    active: bool,

    judged: bool,
    grade: JudgeGrade,
    diff_ms: f32,

    release_time: f32,
    player_release_time: f32,
    last_hold_state: Option<bool>,
    result: Option<JudgeResult>,
}

impl TouchNote {
    pub fn new(desc: TouchNoteDesc) -> Self {
        Self {
            id: desc.id,
            area: desc.area,
            timing: desc.timing,
            length: desc.length,
            is_break: desc.is_break,
            is_ex: desc.is_ex,
            queue: QueueInfo {
                area: desc.area,
                index: desc.queue_index,
            },
            group: desc.group,
            state: NoteStatus::Start,
            active: false,
            judged: false,
            grade: JudgeGrade::TooFast,
            diff_ms: 0.0,
            release_time: 0.0,
            player_release_time: 0.0,
            last_hold_state: None,
            result: None,
        }
    }

    /// Hand the note to the scheduler. Only an unstarted note can be
    /// initialized.
    pub fn initialize(&mut self) {
        if self.state != NoteStatus::Start {
            return;
        }
        self.state = NoteStatus::Initialized;
        self.active = true;
    }

    #[inline(always)]
    pub const fn id(&self) -> NoteId {
        self.id
    }

    #[inline(always)]
    pub const fn area(&self) -> SensorArea {
        self.area
    }

    #[inline(always)]
    pub const fn is_judged(&self) -> bool {
        self.judged
    }

    #[inline(always)]
    pub const fn grade(&self) -> JudgeGrade {
        self.grade
    }

    #[inline(always)]
    pub const fn diff_ms(&self) -> f32 {
        self.diff_ms
    }

    #[inline(always)]
    pub const fn player_release_time(&self) -> f32 {
        self.player_release_time
    }

    /// Set once the note has ended.
    #[inline(always)]
    pub const fn result(&self) -> Option<JudgeResult> {
        self.result
    }

    #[inline(always)]
    fn is_hold(&self) -> bool {
        self.length > 0.0
    }

    #[inline(always)]
    fn is_ended(&self) -> bool {
        self.state == NoteStatus::End
    }

    #[inline(always)]
    fn in_judgable_range(&self, now: f32, s: &JudgeSettings) -> bool {
        now >= self.timing - s.judgable_lead_s && now <= self.timing + s.expiry_s
    }

    #[inline(always)]
    fn in_body_check_range(&self, now: f32, s: &JudgeSettings) -> bool {
        if self.length < s.head_ignore_s + s.tail_ignore_s {
            return false;
        }
        now >= self.timing + s.head_ignore_s && now <= self.timing + self.length - s.tail_ignore_s
    }

    #[inline(always)]
    fn remaining_time(&self, now: f32) -> f32 {
        let remaining = self.length - (now - self.timing);
        remaining.max(0.0)
    }

    /// Grade a press at `current_sec`. A press too early to count leaves the
    /// note untouched, as does any call after the note is judged.
    pub fn judge(&mut self, ctx: &mut TickContext<'_>, current_sec: f32) {
        if self.judged {
            return;
        }
        let diff_ms = (current_sec - self.timing) * 1000.0;
        let Some(grade) = ctx.settings.ladder.classify(diff_ms) else {
            return;
        };
        self.diff_ms = diff_ms;
        self.grade = apply_ex(grade, self.is_ex);
        self.judged = true;
        debug!(
            "Note {} on {}: {} ({:+.2} ms).",
            self.id, self.area, self.grade, self.diff_ms
        );
        self.play_hold_effect(ctx);
    }

    fn handle_input(&mut self, ctx: &mut TickContext<'_>) {
        // Autoplay notes never listen to the panel.
        if self.judged || self.is_ended() || ctx.settings.autoplay {
            return;
        }
        let now = ctx.this_frame_sec;
        if !self.in_judgable_range(now, ctx.settings) || !ctx.queue.is_current(self.queue) {
            return;
        }
        let events = ctx.events;
        let press_sec = now - ctx.settings.touch_panel_offset_s;
        for event in events {
            let args = &event.args;
            if args.is_button || args.area != self.area || !args.is_click() || event.is_used() {
                continue;
            }
            self.judge(ctx, press_sec);
            if self.judged {
                event.mark_used();
                ctx.queue.advance(self.queue);
                self.register_grade();
                return;
            }
        }
    }

    fn register_grade(&self) {
        if let Some(group) = &self.group
            && !self.grade.is_missed()
        {
            group.register(self.grade, self.diff_ms);
        }
    }

    fn autoplay(&mut self, ctx: &mut TickContext<'_>) {
        if self.judged || !ctx.settings.autoplay {
            return;
        }
        if ctx.this_frame_sec - self.timing < -ctx.settings.autoplay_lead_s {
            return;
        }
        let grade = match ctx.settings.autoplay_grade {
            Some(g) => g,
            None => {
                let ix = ctx.rng.gen_range(0..GRADE_COUNT);
                JudgeGrade::from_ix(ix).unwrap_or(JudgeGrade::Perfect)
            }
        };
        self.grade = apply_ex(grade, self.is_ex);
        self.judged = true;
        self.diff_ms = if self.grade.is_late() {
            1.0
        } else if self.grade.is_fast() {
            -1.0
        } else {
            0.0
        };
        ctx.queue.advance(self.queue);
        let preview = self.preview_result();
        ctx.effects.judge(self.area, &preview);
        self.play_hold_effect(ctx);
    }

    fn too_late_check(&mut self, ctx: &mut TickContext<'_>) {
        if self.is_ended() || self.judged {
            return;
        }
        let timing = ctx.this_frame_sec - self.timing;
        if timing > ctx.settings.expiry_s {
            self.grade = JudgeGrade::Miss;
            self.judged = true;
            self.diff_ms = ctx.settings.expiry_s * 1000.0;
            ctx.queue.advance(self.queue);
            trace!("Note {} on {} expired.", self.id, self.area);
            return;
        }
        if let Some(group) = &self.group
            && group.percent() > 0.5
            && let Some((grade, diff_ms)) = group.result()
        {
            self.grade = grade;
            self.diff_ms = diff_ms;
            self.judged = true;
            ctx.queue.advance(self.queue);
            trace!("Note {} on {} inherited {grade} from its group.", self.id, self.area);
        }
    }

    fn body_check(&mut self, ctx: &mut TickContext<'_>) {
        if !self.judged || self.is_ended() {
            return;
        }
        if !self.is_hold() {
            self.end(ctx);
            return;
        }
        let now = ctx.this_frame_sec;
        let remaining = self.remaining_time(now);
        debug_assert!(remaining >= 0.0);
        if remaining == 0.0 {
            self.end(ctx);
            return;
        }
        if !self.in_body_check_range(now, ctx.settings) || !ctx.is_start {
            return;
        }

        if ctx.sensors.is_on(self.area) || ctx.settings.autoplay {
            self.play_hold_effect(ctx);
            self.release_time = 0.0;
        } else {
            if self.release_time <= ctx.settings.release_tolerance_s {
                self.release_time += ctx.delta_sec;
                return;
            }
            self.player_release_time += ctx.delta_sec;
            self.stop_hold_effect(ctx);
        }
    }

    fn update_approach(&mut self, now: f32, s: &JudgeSettings) {
        let (whole, moving) = s.approach_durations();
        let timing = now - self.timing;
        if self.state == NoteStatus::Initialized && -timing < whole {
            self.state = NoteStatus::Scaling;
        }
        if self.state == NoteStatus::Scaling && -timing < moving {
            self.state = NoteStatus::Running;
        }
        if self.state == NoteStatus::Running && timing >= 0.0 {
            self.state = NoteStatus::Arrived;
        }
    }

    /// Hold grade after applying the fraction of the body actually held.
    pub fn end_judge(&self, s: &JudgeSettings) -> JudgeGrade {
        if !self.judged {
            return self.grade;
        }
        let offset_ms = if self.grade.is_fast() { 0.0 } else { self.diff_ms };
        let span = (self.length - s.head_ignore_s - s.tail_ignore_s).max(0.0);
        let reality = (span - offset_ms / 1000.0).clamp(0.0, span);
        if reality <= 0.0 {
            return self.grade;
        }
        let percent = ((reality - self.player_release_time) / reality).clamp(0.0, 1.0);
        trace!("Note {} held {:.1}% of {:.3}s.", self.id, percent * 100.0, reality);
        rescale_for_hold(self.grade, self.diff_ms, percent)
    }

    /// Finish the note: rescale, report, release. Later calls do nothing.
    pub fn end(&mut self, ctx: &mut TickContext<'_>) {
        if self.is_ended() {
            return;
        }
        self.state = NoteStatus::End;
        self.grade = apply_ex(self.end_judge(ctx.settings), self.is_ex);
        let result = self.preview_result();
        self.result = Some(result);
        self.active = false;

        ctx.results.report(self.id, result);
        if !self.judged {
            ctx.queue.advance(self.queue);
        }
        if !result.grade.is_missed() {
            ctx.effects.judge(self.area, &result);
        }
        if self.is_hold() {
            ctx.effects.hold_reset(self.area);
        }
        self.last_hold_state = Some(false);
        ctx.pool.release(self.id);
    }

    #[inline(always)]
    fn preview_result(&self) -> JudgeResult {
        JudgeResult {
            grade: self.grade,
            is_break: self.is_break,
            is_ex: self.is_ex,
            diff_ms: self.diff_ms,
        }
    }

    fn play_hold_effect(&mut self, ctx: &mut TickContext<'_>) {
        if !self.is_hold() {
            return;
        }
        if self.last_hold_state != Some(true) {
            ctx.effects.hold_start(self.area);
        }
        self.last_hold_state = Some(true);
    }

    fn stop_hold_effect(&mut self, ctx: &mut TickContext<'_>) {
        if self.last_hold_state != Some(false) {
            ctx.effects.hold_stop(self.area);
        }
        self.last_hold_state = Some(false);
    }
}

impl NoteComponent for TouchNote {
    #[inline(always)]
    fn state(&self) -> NoteStatus {
        self.state
    }

    #[inline(always)]
    fn is_active(&self) -> bool {
        self.active
    }

    #[inline(always)]
    fn phases(&self) -> Phases {
        Phases::UPDATE
    }

    fn on_update(&mut self, ctx: &mut TickContext<'_>) -> Result<(), NoteError> {
        if !self.length.is_finite() || self.length < 0.0 {
            return Err(NoteError::InvalidLength {
                id: self.id,
                length: self.length,
            });
        }
        self.handle_input(ctx);
        self.autoplay(ctx);
        self.too_late_check(ctx);
        self.body_check(ctx);
        if !self.is_ended() {
            self.update_approach(ctx.this_frame_sec, ctx.settings);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{TouchNote, TouchNoteDesc};
    use crate::core::input::{InputEventArgs, SensorArea, SensorStatus};
    use crate::game::harness::Harness;
    use crate::game::judgment::JudgeGrade;
    use crate::game::note::{GameInputEvent, NoteGroup, NoteId, NoteStatus};
    use crate::game::scheduler::NoteComponent;
    use crate::game::timing_windows::JudgeLadder;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::time::Instant;

    const DT: f32 = 1.0 / 60.0;

    fn note(id: usize, area: SensorArea, timing: f32, length: f32) -> TouchNote {
        let mut n = TouchNote::new(TouchNoteDesc {
            id: NoteId(id),
            area,
            timing,
            length,
            is_break: false,
            is_ex: false,
            queue_index: 0,
            group: None,
        });
        n.initialize();
        n
    }

    fn click(area: SensorArea) -> GameInputEvent {
        GameInputEvent::new(InputEventArgs {
            area,
            old_status: SensorStatus::Off,
            status: SensorStatus::On,
            is_button: false,
            timestamp: Instant::now(),
        })
    }

    fn tick(h: &mut Harness, n: &mut TouchNote, now: f32, events: &[GameInputEvent]) {
        let mut rng = StdRng::seed_from_u64(7);
        h.with_ctx(now, DT, events, &mut rng, |ctx| n.on_update(ctx))
            .expect("valid note");
    }

    #[test]
    fn press_on_the_anchor_is_perfect_and_consumes_the_event() {
        let mut h = Harness::new();
        let mut n = note(1, SensorArea::B3, 1.0, 0.0);
        let ev = [click(SensorArea::B3)];
        tick(&mut h, &mut n, 1.0, &ev);
        assert!(ev[0].is_used(), "judging note must mark the event used");
        assert_eq!(n.state(), NoteStatus::End, "touch notes end once judged");
        assert_eq!(h.grades(), vec![JudgeGrade::Perfect]);
        assert_eq!(h.queue.current(SensorArea::B3), 1);
        assert_eq!(h.released, vec![NoteId(1)]);
    }

    #[test]
    fn presses_elsewhere_or_already_used_are_ignored() {
        let mut h = Harness::new();
        let mut n = note(1, SensorArea::B3, 1.0, 0.0);
        let used = click(SensorArea::B3);
        used.mark_used();
        let events = [click(SensorArea::B4), used];
        tick(&mut h, &mut n, 1.0, &events);
        assert!(!n.is_judged());

        let mut release = click(SensorArea::B3);
        release.args.old_status = SensorStatus::On;
        release.args.status = SensorStatus::Off;
        tick(&mut h, &mut n, 1.0, &[release]);
        assert!(!n.is_judged(), "only Off->On counts as a press");
    }

    #[test]
    fn press_outside_judgable_range_is_ignored() {
        let mut h = Harness::new();
        let mut n = note(1, SensorArea::C, 2.0, 0.0);
        tick(&mut h, &mut n, 1.8, &[click(SensorArea::C)]);
        assert!(!n.is_judged(), "0.2s early is outside the judgable range");
    }

    #[test]
    fn judging_again_changes_nothing() {
        let mut h = Harness::new();
        h.settings.ladder = JudgeLadder::TAP;
        let mut n = note(1, SensorArea::A1, 1.0, 2.0);
        let mut rng = StdRng::seed_from_u64(0);
        h.with_ctx(1.0, DT, &[], &mut rng, |ctx| {
            n.judge(ctx, 1.03);
            n.judge(ctx, 1.0);
        });
        assert_eq!(n.grade(), JudgeGrade::LatePerfect2nd);
        assert!((n.diff_ms() - 30.0).abs() < 0.01);
    }

    #[test]
    fn too_early_press_leaves_note_unjudged() {
        let mut h = Harness::new();
        h.settings.ladder = JudgeLadder::TAP;
        let mut n = note(1, SensorArea::A1, 1.0, 0.0);
        let mut rng = StdRng::seed_from_u64(0);
        h.with_ctx(0.8, DT, &[], &mut rng, |ctx| n.judge(ctx, 0.8));
        assert!(!n.is_judged());
        assert_eq!(n.diff_ms(), 0.0);
    }

    #[test]
    fn unjudged_note_expires_to_miss() {
        let mut h = Harness::new();
        let mut n = note(4, SensorArea::E2, 1.0, 0.0);
        tick(&mut h, &mut n, 1.3, &[]);
        assert!(!n.is_judged());
        tick(&mut h, &mut n, 1.33, &[]);
        assert_eq!(n.state(), NoteStatus::End);
        let (_, result) = h.reported[0];
        assert_eq!(result.grade, JudgeGrade::Miss);
        assert!((result.diff_ms - 316.667).abs() < 0.01);
        assert!(
            !h.effects.iter().any(|e| e.starts_with("judge")),
            "misses fire no judge effect"
        );
    }

    #[test]
    fn group_majority_is_inherited_before_expiry() {
        let mut h = Harness::new();
        let group = NoteGroup::new(3);
        let areas = [SensorArea::A1, SensorArea::A2, SensorArea::A3];
        let mut notes: Vec<TouchNote> = areas
            .iter()
            .enumerate()
            .map(|(i, &area)| {
                let mut n = TouchNote::new(TouchNoteDesc {
                    id: NoteId(i),
                    area,
                    timing: 1.0,
                    length: 0.0,
                    is_break: false,
                    is_ex: false,
                    queue_index: 0,
                    group: Some(group.clone()),
                });
                n.initialize();
                n
            })
            .collect();

        let presses = [click(SensorArea::A1), click(SensorArea::A2)];
        for n in notes.iter_mut() {
            tick(&mut h, n, 1.05, &presses);
        }
        assert_eq!(group.judged(), 2);
        let expected = notes[0].grade();
        assert!(!expected.is_missed());

        tick(&mut h, &mut notes[2], 1.1, &[]);
        assert!(notes[2].is_judged());
        assert_eq!(notes[2].grade(), expected, "third member inherits the group grade");
        assert_eq!(group.judged(), 2, "inheritors do not register");
        assert_eq!(h.grades(), vec![expected; 3]);
    }

    #[test]
    fn held_hold_keeps_its_grade() {
        let mut h = Harness::new();
        h.settings.head_ignore_s = 0.3;
        h.settings.tail_ignore_s = 0.3;
        let mut n = note(9, SensorArea::C, 1.0, 2.0);
        h.touched.push(SensorArea::C);

        let mut now = 1.0;
        tick(&mut h, &mut n, now, &[click(SensorArea::C)]);
        assert_eq!(n.grade(), JudgeGrade::Perfect);
        while n.state() != NoteStatus::End {
            now += DT;
            tick(&mut h, &mut n, now, &[]);
            assert!(now < 3.5, "hold never ended");
        }
        assert_eq!(n.player_release_time(), 0.0);
        assert_eq!(h.grades(), vec![JudgeGrade::Perfect]);
        assert_eq!(h.effects.first().map(String::as_str), Some("start C"));
        assert_eq!(
            h.effects.iter().filter(|e| e.starts_with("start")).count(),
            1,
            "hold start fires once while contact is unbroken"
        );
        assert!(h.effects.contains(&"reset C".to_string()));
    }

    #[test]
    fn released_hold_is_downgraded() {
        let mut h = Harness::new();
        let mut n = note(9, SensorArea::C, 1.0, 2.0);
        h.touched.push(SensorArea::C);
        tick(&mut h, &mut n, 1.0, &[click(SensorArea::C)]);
        h.touched.clear();

        let mut now = 1.0;
        while n.state() != NoteStatus::End {
            now += DT;
            tick(&mut h, &mut n, now, &[]);
        }
        assert!(n.player_release_time() > 1.0);
        assert_eq!(h.grades(), vec![JudgeGrade::FastGood]);
        assert_eq!(
            h.effects.iter().filter(|e| e.starts_with("stop")).count(),
            1,
            "hold stop fires once per release"
        );
    }

    #[test]
    fn autoplay_uses_configured_grade() {
        let mut h = Harness::new();
        h.settings.autoplay = true;
        h.settings.autoplay_grade = Some(JudgeGrade::LateGreat);
        let mut n = note(2, SensorArea::D5, 1.0, 0.0);
        tick(&mut h, &mut n, 0.9, &[]);
        assert!(!n.is_judged());
        tick(&mut h, &mut n, 0.99, &[]);
        assert_eq!(h.grades(), vec![JudgeGrade::LateGreat]);
        assert_eq!(h.reported[0].1.diff_ms, 1.0);
    }

    #[test]
    fn autoplay_note_ignores_player_presses() {
        let mut h = Harness::new();
        h.settings.ladder = JudgeLadder::TAP;
        h.settings.autoplay = true;
        h.settings.autoplay_grade = Some(JudgeGrade::Perfect);
        let mut n = note(2, SensorArea::A1, 1.0, 0.0);
        let ev = [click(SensorArea::A1)];
        tick(&mut h, &mut n, 0.88, &ev);
        assert!(!n.is_judged(), "a press must not judge an autoplay note");
        assert!(!ev[0].is_used(), "autoplay notes leave events for others");
        assert_eq!(h.queue.current(SensorArea::A1), 0);

        tick(&mut h, &mut n, 0.99, &[click(SensorArea::A1)]);
        assert_eq!(h.grades(), vec![JudgeGrade::Perfect]);
        assert_eq!(h.reported[0].1.diff_ms, 0.0);
    }

    #[test]
    fn expiry_wins_over_a_group_majority() {
        let mut h = Harness::new();
        let group = NoteGroup::new(3);
        group.register(JudgeGrade::LateGreat, 70.0);
        group.register(JudgeGrade::LateGreat, 70.0);
        let mut n = TouchNote::new(TouchNoteDesc {
            id: NoteId(2),
            area: SensorArea::A3,
            timing: 1.0,
            length: 0.0,
            is_break: false,
            is_ex: false,
            queue_index: 0,
            group: Some(group.clone()),
        });
        n.initialize();

        tick(&mut h, &mut n, 1.4, &[]);
        assert_eq!(n.state(), NoteStatus::End);
        let (_, result) = h.reported[0];
        assert_eq!(result.grade, JudgeGrade::Miss, "expired notes never inherit");
        assert!((result.diff_ms - h.settings.expiry_s * 1000.0).abs() < 0.01);
        assert_eq!(group.judged(), 2);
    }

    #[test]
    fn random_autoplay_is_reproducible_with_a_seed() {
        let run = |seed: u64| {
            let mut h = Harness::new();
            h.settings.autoplay = true;
            h.settings.autoplay_grade = None;
            let mut rng = StdRng::seed_from_u64(seed);
            (0..8)
                .map(|i| {
                    let mut n = note(i, SensorArea::A4, 1.0, 0.0);
                    h.with_ctx(1.0, DT, &[], &mut rng, |ctx| n.on_update(ctx))
                        .expect("valid note");
                    n.grade()
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn approach_moves_forward_only() {
        let mut h = Harness::new();
        let mut n = note(3, SensorArea::B1, 2.0, 1.0);
        tick(&mut h, &mut n, 0.0, &[]);
        assert_eq!(n.state(), NoteStatus::Initialized);
        tick(&mut h, &mut n, 1.6, &[]);
        assert_eq!(n.state(), NoteStatus::Scaling);
        tick(&mut h, &mut n, 1.7, &[]);
        assert_eq!(n.state(), NoteStatus::Running);
        tick(&mut h, &mut n, 2.0, &[]);
        assert_eq!(n.state(), NoteStatus::Arrived);
        tick(&mut h, &mut n, 1.0, &[]);
        assert_eq!(n.state(), NoteStatus::Arrived, "state never regresses");
    }

    #[test]
    fn invalid_length_is_reported_as_an_error() {
        let mut h = Harness::new();
        let mut n = note(5, SensorArea::A1, 1.0, -1.0);
        let mut rng = StdRng::seed_from_u64(0);
        let out = h.with_ctx(1.0, DT, &[], &mut rng, |ctx| n.on_update(ctx));
        assert!(out.is_err());
    }
}
