use crate::config::{self, Config};
use crate::core::input::keyboard::KeyboardInput;
use crate::core::input::sampler::{self, SamplerConfig, SamplerHandle, StopSignal};
use crate::core::input::{
    AREA_COUNT, BankConfig, InputDispatcher, SensorArea, SensorClass, SensorRing,
};
use crate::game::note::{NoteGroup, NoteId};
use crate::game::session::{Session, Tally};
use crate::game::touch_note::TouchNoteDesc;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

use log::{debug, error, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::cell::Cell;
use std::rc::Rc;
use std::{error::Error, sync::Arc, time::Instant};

/// Seconds of chart time before the first anchor.
const LEAD_IN: f32 = 2.0;
const TITLE_UPDATE_INTERVAL: f32 = 1.0;

/* -------------------- demo chart -------------------- */

struct ChartBuilder {
    notes: Vec<TouchNoteDesc>,
    next_index: [usize; AREA_COUNT],
}

impl ChartBuilder {
    fn new() -> Self {
        Self {
            notes: Vec::new(),
            next_index: [0; AREA_COUNT],
        }
    }

    fn push(
        &mut self,
        area: SensorArea,
        timing: f32,
        length: f32,
        group: Option<&Rc<NoteGroup>>,
    ) -> &mut TouchNoteDesc {
        let queue_index = self.next_index[area.ix()];
        self.next_index[area.ix()] += 1;
        let id = NoteId(self.notes.len());
        self.notes.push(TouchNoteDesc {
            id,
            area,
            timing,
            length,
            is_break: false,
            is_ex: false,
            queue_index,
            group: group.cloned(),
        });
        let last = self.notes.len() - 1;
        &mut self.notes[last]
    }

    fn touch(&mut self, area: SensorArea, timing: f32) -> &mut TouchNoteDesc {
        self.push(area, timing, 0.0, None)
    }

    fn hold(&mut self, area: SensorArea, timing: f32, length: f32) -> &mut TouchNoteDesc {
        self.push(area, timing, length, None)
    }

    /// Simultaneous touches on `areas` judged by majority.
    fn group(&mut self, areas: &[SensorArea], timing: f32) {
        let group = NoteGroup::new(areas.len());
        for &area in areas {
            self.push(area, timing, 0.0, Some(&group));
        }
    }

    fn build(self) -> Vec<TouchNoteDesc> {
        self.notes
    }
}

/// A short fixed pattern that touches every feature of the judge: plain
/// touches, a repeated area, an EX and a break note, two holds and a group.
fn demo_chart() -> Vec<TouchNoteDesc> {
    use SensorArea::*;
    let mut chart = ChartBuilder::new();
    chart.touch(A1, 1.0);
    chart.touch(B3, 1.5);
    chart.touch(A1, 2.0);
    chart.touch(D5, 2.5).is_ex = true;
    chart.hold(C, 3.0, 1.5);
    chart.touch(E2, 5.0).is_break = true;
    chart.group(&[B1, B2, B8], 6.0);
    chart.hold(A4, 7.0, 2.0).is_ex = true;
    chart.touch(C, 9.5);
    chart.build()
}

/* -------------------- app -------------------- */

pub struct App {
    window: Option<Arc<Window>>,
    keyboard: KeyboardInput,
    session: Session,
    abort: Rc<Cell<bool>>,
    last_frame_time: Instant,
    last_title_update: Instant,
}

impl App {
    fn new(keyboard: KeyboardInput, session: Session, abort: Rc<Cell<bool>>) -> Self {
        let now = Instant::now();
        Self {
            window: None,
            keyboard,
            session,
            abort,
            last_frame_time: now,
            last_title_update: now,
        }
    }

    fn init_window(&mut self, event_loop: &ActiveEventLoop) -> Result<(), Box<dyn Error>> {
        let attrs = Window::default_attributes()
            .with_title("touchsync")
            .with_inner_size(PhysicalSize::new(640, 360));
        let window = Arc::new(event_loop.create_window(attrs)?);
        self.window = Some(window);
        self.last_frame_time = Instant::now();
        self.session.start();
        info!("Window created; chart clock started.");
        Ok(())
    }

    fn update_title(&mut self, now: Instant) {
        if now.duration_since(self.last_title_update).as_secs_f32() < TITLE_UPDATE_INTERVAL {
            return;
        }
        self.last_title_update = now;
        if let Some(window) = &self.window {
            let tally = self.session.tally();
            window.set_title(&format!(
                "touchsync - {:.1}s - {} judged, {} fast, {} late",
                self.session.chart_time(),
                tally.total(),
                tally.fast,
                tally.late
            ));
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none()
            && let Err(e) = self.init_window(event_loop)
        {
            error!("Failed to create window: {e}");
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else { return; };
        if window_id != window.id() { return; }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested. Shutting down.");
                event_loop.exit();
            }
            WindowEvent::Focused(false) => {
                debug!("Focus lost; releasing all keys.");
                self.keyboard.release_all();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                    && event.state == ElementState::Pressed
                {
                    info!("Escape pressed. Shutting down.");
                    event_loop.exit();
                    return;
                }
                self.keyboard.handle_key_event(&event);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            return;
        }
        let now = Instant::now();
        let delta_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;

        self.session.tick(delta_time);
        self.update_title(now);

        if self.abort.get() {
            info!("Service button pressed. Ending session early.");
            event_loop.exit();
        } else if self.session.is_finished() {
            info!("Every note reached its end state.");
            event_loop.exit();
        }
    }
}

fn spawn_samplers(
    cfg: &Config,
    keyboard: &KeyboardInput,
    stop: &StopSignal,
) -> Result<(Vec<SamplerHandle>, InputDispatcher), Box<dyn Error>> {
    let mut handles = Vec::with_capacity(2);
    let mut banks = Vec::with_capacity(2);
    for class in [SensorClass::Button, SensorClass::Touch] {
        let bank = cfg.bank(class);
        let (producer, consumer) = SensorRing::new();
        let sampler_cfg = SamplerConfig {
            class,
            polling_interval: bank.polling_interval(),
            priority: cfg.io_thread_priority,
        };
        handles.push(sampler::spawn(
            sampler_cfg,
            keyboard.source(class),
            producer,
            stop.clone(),
        )?);
        banks.push(BankConfig {
            consumer,
            debounce: bank.debounce_threshold(),
        });
    }
    let touch = banks.pop().ok_or("touch bank missing")?;
    let button = banks.pop().ok_or("button bank missing")?;
    Ok((handles, InputDispatcher::new(button, touch)))
}

fn print_summary(tally: &Tally) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(tally)?);
    Ok(())
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cfg = config::get();
    let keyboard = KeyboardInput::new(&cfg.keymap);
    let stop = StopSignal::new();
    let (samplers, mut dispatcher) = spawn_samplers(&cfg, &keyboard, &stop)?;

    let abort = Rc::new(Cell::new(false));
    let abort_flag = abort.clone();
    dispatcher.bind(SensorClass::Button, SensorArea::Service, move |args| {
        if args.is_click() {
            abort_flag.set(true);
        }
    })?;

    let session = Session::new(
        dispatcher,
        demo_chart(),
        cfg.judge_settings(),
        StdRng::from_entropy(),
        LEAD_IN,
    );

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);
    let mut app = App::new(keyboard, session, abort);
    let result = event_loop.run_app(&mut app);

    stop.stop();
    for handle in samplers {
        handle.shutdown();
    }
    result?;

    let (_dispatcher, tally) = app.session.finish();
    print_summary(&tally)
}
