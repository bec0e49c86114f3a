//! Frame lifecycle scheduler: runs each phase once per tick over the notes
//! that take part in it.

use std::time::Instant;

use bitflags::bitflags;
use log::{error, trace};

use crate::game::note::{NoteError, NoteStatus, TickContext};

bitflags! {
    /// Phases a component participates in. Read once when the scheduler is
    /// built.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Phases: u8 {
        const UPDATE = 1 << 0;
        const FIXED_UPDATE = 1 << 1;
        const LATE_UPDATE = 1 << 2;
    }
}

pub trait NoteComponent {
    fn state(&self) -> NoteStatus;

    /// Whether the owning container is enabled.
    fn is_active(&self) -> bool;

    fn phases(&self) -> Phases;

    #[inline(always)]
    fn is_executable(&self) -> bool {
        !matches!(self.state(), NoteStatus::Start | NoteStatus::End) && self.is_active()
    }

    fn on_update(&mut self, _ctx: &mut TickContext<'_>) -> Result<(), NoteError> {
        Ok(())
    }

    fn on_fixed_update(&mut self, _ctx: &mut TickContext<'_>) -> Result<(), NoteError> {
        Ok(())
    }

    fn on_late_update(&mut self, _ctx: &mut TickContext<'_>) -> Result<(), NoteError> {
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Update,
    FixedUpdate,
    LateUpdate,
}

impl Phase {
    #[inline(always)]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Update => "Update",
            Self::FixedUpdate => "FixedUpdate",
            Self::LateUpdate => "LateUpdate",
        }
    }

    #[inline(always)]
    const fn flag(self) -> Phases {
        match self {
            Self::Update => Phases::UPDATE,
            Self::FixedUpdate => Phases::FIXED_UPDATE,
            Self::LateUpdate => Phases::LATE_UPDATE,
        }
    }

    #[inline(always)]
    const fn ix(self) -> usize {
        self as usize
    }
}

pub struct Scheduler {
    components: Vec<Box<dyn NoteComponent>>,
    lists: [Vec<usize>; 3],
    elapsed_ms: [f64; 3],
}

impl Scheduler {
    /// Partition `components` by declared phase, keeping insertion order.
    pub fn new(components: Vec<Box<dyn NoteComponent>>) -> Self {
        let lists = [Phase::Update, Phase::FixedUpdate, Phase::LateUpdate].map(|phase| {
            components
                .iter()
                .enumerate()
                .filter(|(_, c)| c.phases().contains(phase.flag()))
                .map(|(i, _)| i)
                .collect::<Vec<_>>()
        });
        trace!(
            "Scheduler built: {} components ({} update, {} fixed, {} late).",
            components.len(),
            lists[0].len(),
            lists[1].len(),
            lists[2].len()
        );
        Self {
            components,
            lists,
            elapsed_ms: [0.0; 3],
        }
    }

    /// Run one phase over its list. Errors are logged per component and never
    /// stop the rest of the list.
    pub fn run_phase(&mut self, phase: Phase, ctx: &mut TickContext<'_>) {
        let started = Instant::now();
        for &i in &self.lists[phase.ix()] {
            let component = &mut self.components[i];
            if !component.is_executable() {
                continue;
            }
            let outcome = match phase {
                Phase::Update => component.on_update(ctx),
                Phase::FixedUpdate => component.on_fixed_update(ctx),
                Phase::LateUpdate => component.on_late_update(ctx),
            };
            if let Err(e) = outcome {
                error!("{} failed for component {i}: {e}", phase.as_str());
            }
        }
        self.elapsed_ms[phase.ix()] = started.elapsed().as_secs_f64() * 1000.0;
    }

    #[inline(always)]
    pub const fn elapsed_ms(&self, phase: Phase) -> f64 {
        self.elapsed_ms[phase.ix()]
    }

    #[inline(always)]
    pub fn components(&self) -> &[Box<dyn NoteComponent>] {
        &self.components
    }

    /// True once no component can run again.
    pub fn is_finished(&self) -> bool {
        self.components
            .iter()
            .all(|c| c.state() == NoteStatus::End)
    }
}

#[cfg(test)]
mod tests {
    use super::{NoteComponent, Phase, Phases, Scheduler};
    use crate::game::harness::Harness;
    use crate::game::note::{NoteError, NoteId, NoteStatus, TickContext};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Probe {
        name: &'static str,
        state: NoteStatus,
        active: bool,
        phases: Phases,
        fail: bool,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Probe {
        fn new(
            name: &'static str,
            state: NoteStatus,
            phases: Phases,
            log: &Rc<RefCell<Vec<String>>>,
        ) -> Self {
            Self {
                name,
                state,
                active: true,
                phases,
                fail: false,
                log: log.clone(),
            }
        }

        fn inactive(mut self) -> Self {
            self.active = false;
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn boxed(self) -> Box<dyn NoteComponent> {
            Box::new(self)
        }

        fn hit(&self, phase: &str) -> Result<(), NoteError> {
            self.log.borrow_mut().push(format!("{}:{phase}", self.name));
            if self.fail {
                return Err(NoteError::InvalidLength {
                    id: NoteId(0),
                    length: -1.0,
                });
            }
            Ok(())
        }
    }

    impl NoteComponent for Probe {
        fn state(&self) -> NoteStatus {
            self.state
        }
        fn is_active(&self) -> bool {
            self.active
        }
        fn phases(&self) -> Phases {
            self.phases
        }
        fn on_update(&mut self, _ctx: &mut TickContext<'_>) -> Result<(), NoteError> {
            self.hit("update")
        }
        fn on_fixed_update(&mut self, _ctx: &mut TickContext<'_>) -> Result<(), NoteError> {
            self.hit("fixed")
        }
        fn on_late_update(&mut self, _ctx: &mut TickContext<'_>) -> Result<(), NoteError> {
            self.hit("late")
        }
    }

    fn run_all(scheduler: &mut Scheduler) {
        let mut h = Harness::new();
        let mut rng = StdRng::seed_from_u64(1);
        h.with_ctx(0.0, 0.016, &[], &mut rng, |ctx| {
            scheduler.run_phase(Phase::Update, ctx);
            scheduler.run_phase(Phase::FixedUpdate, ctx);
            scheduler.run_phase(Phase::LateUpdate, ctx);
        });
    }

    #[test]
    fn phases_run_only_declared_components_in_insertion_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut s = Scheduler::new(vec![
            Probe::new("a", NoteStatus::Running, Phases::all(), &log).boxed(),
            Probe::new("b", NoteStatus::Running, Phases::UPDATE, &log).boxed(),
            Probe::new("c", NoteStatus::Arrived, Phases::LATE_UPDATE | Phases::UPDATE, &log).boxed(),
        ]);
        run_all(&mut s);
        assert_eq!(
            *log.borrow(),
            vec!["a:update", "b:update", "c:update", "a:fixed", "a:late", "c:late"]
        );
    }

    #[test]
    fn unstarted_ended_and_inactive_components_are_skipped() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut s = Scheduler::new(vec![
            Probe::new("start", NoteStatus::Start, Phases::all(), &log).boxed(),
            Probe::new("end", NoteStatus::End, Phases::all(), &log).boxed(),
            Probe::new("inactive", NoteStatus::Running, Phases::all(), &log)
                .inactive()
                .boxed(),
            Probe::new("live", NoteStatus::Initialized, Phases::UPDATE, &log).boxed(),
        ]);
        run_all(&mut s);
        assert_eq!(*log.borrow(), vec!["live:update"]);
    }

    #[test]
    fn one_failing_component_does_not_stop_the_rest() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut s = Scheduler::new(vec![
            Probe::new("bad", NoteStatus::Running, Phases::UPDATE, &log)
                .failing()
                .boxed(),
            Probe::new("good", NoteStatus::Running, Phases::UPDATE, &log).boxed(),
        ]);
        run_all(&mut s);
        assert_eq!(*log.borrow(), vec!["bad:update", "good:update"]);
        assert!(s.elapsed_ms(Phase::Update) >= 0.0);
        assert!(!s.is_finished());
    }
}
