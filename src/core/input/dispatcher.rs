//! Main-tick side of input: drains sampled reports, filters them and fans
//! accepted transitions out to subscribers.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use log::{debug, trace};
use smallvec::SmallVec;
use thiserror::Error;

use super::{
    AREA_COUNT, InputEventArgs, ReportConsumer, SensorArea, SensorClass, SensorReport,
    SensorStatus,
};

pub type InputCallback = Box<dyn FnMut(&InputEventArgs)>;

/// Handle returned by `bind`; ids increase monotonically, so iterating a
/// subscriber map visits callbacks in registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("{area} {class} sensor not found")]
    UnknownSensorArea {
        class: SensorClass,
        area: SensorArea,
    },
}

pub struct SensorState {
    area: SensorArea,
    status: SensorStatus,
    last_transition: Option<Instant>,
    subscribers: BTreeMap<SubscriberId, InputCallback>,
}

impl SensorState {
    #[inline(always)]
    pub const fn area(&self) -> SensorArea {
        self.area
    }

    #[inline(always)]
    pub const fn status(&self) -> SensorStatus {
        self.status
    }

    #[inline(always)]
    pub const fn last_transition(&self) -> Option<Instant> {
        self.last_transition
    }
}

#[derive(Debug)]
pub struct BankConfig {
    pub consumer: ReportConsumer,
    /// `None` disables debounce for the bank.
    pub debounce: Option<Duration>,
}

struct SensorBank {
    class: SensorClass,
    consumer: ReportConsumer,
    sensors: Vec<SensorState>,
    by_area: [SmallVec<[usize; 2]>; AREA_COUNT],
    debounce: Option<Duration>,
    last_trigger: [Option<Instant>; AREA_COUNT],
}

impl SensorBank {
    fn new(class: SensorClass, config: BankConfig) -> Self {
        let mut by_area: [SmallVec<[usize; 2]>; AREA_COUNT] =
            std::array::from_fn(|_| SmallVec::new());
        let sensors = class
            .areas()
            .iter()
            .enumerate()
            .map(|(i, &area)| {
                by_area[area.ix()].push(i);
                SensorState {
                    area,
                    status: SensorStatus::Off,
                    last_transition: None,
                    subscribers: BTreeMap::new(),
                }
            })
            .collect();
        Self {
            class,
            consumer: config.consumer,
            sensors,
            by_area,
            debounce: config.debounce,
            last_trigger: [None; AREA_COUNT],
        }
    }

    #[inline(always)]
    fn slots(&self, area: SensorArea) -> Result<&[usize], InputError> {
        let slots = &self.by_area[area.ix()];
        if slots.is_empty() {
            return Err(InputError::UnknownSensorArea {
                class: self.class,
                area,
            });
        }
        Ok(slots)
    }

    /// True when `timestamp` is too close to the area's last accepted trigger.
    #[inline(always)]
    fn is_jitter(&self, area: SensorArea, timestamp: Instant, threshold: Duration) -> bool {
        match self.last_trigger[area.ix()] {
            Some(prev) => timestamp.saturating_duration_since(prev) < threshold,
            None => false,
        }
    }

    /// Returns the event to publish, or `None` when the report is filtered.
    fn accept(&mut self, report: SensorReport) -> Option<InputEventArgs> {
        let Some(sensor) = self.sensors.get(report.index) else {
            trace!(
                "Dropped {} report with out-of-range index {}.",
                self.class, report.index
            );
            return None;
        };
        let area = sensor.area;
        let old_status = sensor.status;
        if old_status == report.status {
            return None;
        }
        if let Some(threshold) = self.debounce {
            if self.is_jitter(area, report.timestamp, threshold) {
                trace!("{} {area}: suppressed bounce.", self.class);
                return None;
            }
            self.last_trigger[area.ix()] = Some(report.timestamp);
        }

        let sensor = &mut self.sensors[report.index];
        sensor.status = report.status;
        sensor.last_transition = Some(report.timestamp);
        debug!("{} {area}: {:?}", self.class, report.status);
        Some(InputEventArgs {
            area,
            old_status,
            status: report.status,
            is_button: self.class == SensorClass::Button,
            timestamp: report.timestamp,
        })
    }
}

fn drain_bank(
    bank: &mut SensorBank,
    global: &mut BTreeMap<SubscriberId, InputCallback>,
) -> usize {
    let mut accepted = 0;
    while let Some(report) = bank.consumer.try_dequeue() {
        let Some(args) = bank.accept(report) else {
            continue;
        };
        accepted += 1;
        for cb in bank.sensors[report.index].subscribers.values_mut() {
            cb(&args);
        }
        for cb in global.values_mut() {
            cb(&args);
        }
    }
    accepted
}

pub struct InputDispatcher {
    button: SensorBank,
    touch: SensorBank,
    global: BTreeMap<SubscriberId, InputCallback>,
    next_id: u64,
}

impl InputDispatcher {
    pub fn new(button: BankConfig, touch: BankConfig) -> Self {
        Self {
            button: SensorBank::new(SensorClass::Button, button),
            touch: SensorBank::new(SensorClass::Touch, touch),
            global: BTreeMap::new(),
            next_id: 0,
        }
    }

    #[inline(always)]
    fn bank(&self, class: SensorClass) -> &SensorBank {
        match class {
            SensorClass::Button => &self.button,
            SensorClass::Touch => &self.touch,
        }
    }

    #[inline(always)]
    fn bank_mut(&mut self, class: SensorClass) -> &mut SensorBank {
        match class {
            SensorClass::Button => &mut self.button,
            SensorClass::Touch => &mut self.touch,
        }
    }

    #[inline(always)]
    fn alloc_id(&mut self) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Drain every queued report from both banks without waiting for more.
    /// Returns the number of accepted transitions.
    pub fn update(&mut self) -> usize {
        drain_bank(&mut self.button, &mut self.global) + drain_bank(&mut self.touch, &mut self.global)
    }

    /// Subscribe to transitions of every sensor mapped to `area`.
    pub fn bind(
        &mut self,
        class: SensorClass,
        area: SensorArea,
        callback: impl FnMut(&InputEventArgs) + 'static,
    ) -> Result<SubscriberId, InputError> {
        let slots: SmallVec<[usize; 2]> = self.bank(class).slots(area)?.iter().copied().collect();
        let id = self.alloc_id();
        let bank = self.bank_mut(class);
        if let [only] = slots[..] {
            bank.sensors[only].subscribers.insert(id, Box::new(callback));
            return Ok(id);
        }
        // Areas backed by several sensors share one callback.
        let shared = std::rc::Rc::new(std::cell::RefCell::new(callback));
        for slot in slots {
            let cb = shared.clone();
            bank.sensors[slot]
                .subscribers
                .insert(id, Box::new(move |args: &InputEventArgs| (&mut *cb.borrow_mut())(args)));
        }
        Ok(id)
    }

    /// Unbinding an id that was never bound to this area is a no-op.
    pub fn unbind(
        &mut self,
        class: SensorClass,
        area: SensorArea,
        id: SubscriberId,
    ) -> Result<(), InputError> {
        let slots: SmallVec<[usize; 2]> = self.bank(class).slots(area)?.iter().copied().collect();
        let bank = self.bank_mut(class);
        for slot in slots {
            bank.sensors[slot].subscribers.remove(&id);
        }
        Ok(())
    }

    /// Subscribe to every accepted transition of both banks.
    pub fn bind_any(&mut self, callback: impl FnMut(&InputEventArgs) + 'static) -> SubscriberId {
        let id = self.alloc_id();
        self.global.insert(id, Box::new(callback));
        id
    }

    #[inline(always)]
    pub fn unbind_any(&mut self, id: SubscriberId) {
        self.global.remove(&id);
    }

    /// `On` when any sensor mapped to `area` is on.
    pub fn status(&self, class: SensorClass, area: SensorArea) -> Result<SensorStatus, InputError> {
        let bank = self.bank(class);
        let on = bank
            .slots(area)?
            .iter()
            .any(|&i| bank.sensors[i].status.is_on());
        Ok(SensorStatus::from_pressed(on))
    }

    #[inline(always)]
    pub fn check_sensor_status(
        &self,
        class: SensorClass,
        area: SensorArea,
        status: SensorStatus,
    ) -> Result<bool, InputError> {
        Ok(self.status(class, area)? == status)
    }

    #[inline(always)]
    pub fn sensors(&self, class: SensorClass) -> &[SensorState] {
        &self.bank(class).sensors
    }
}
