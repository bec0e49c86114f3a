use std::time::Instant;

/* ------------------------ Sensor vocabulary ------------------------ */

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SensorStatus {
    #[default]
    Off,
    On,
}

impl SensorStatus {
    #[inline(always)]
    pub const fn from_pressed(pressed: bool) -> Self {
        if pressed { Self::On } else { Self::Off }
    }

    #[inline(always)]
    pub const fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

/// Which physical bank a sensor belongs to. Each bank has its own ring
/// buffer, sampling loop and debounce settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SensorClass {
    Button,
    Touch,
}

impl SensorClass {
    #[inline(always)]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Button => "Button",
            Self::Touch => "Touch",
        }
    }

    #[inline(always)]
    pub const fn areas(self) -> &'static [SensorArea] {
        match self {
            Self::Button => &BUTTON_AREAS,
            Self::Touch => &TOUCH_AREAS,
        }
    }

    #[inline(always)]
    pub const fn sensor_count(self) -> usize {
        self.areas().len()
    }
}

impl std::fmt::Display for SensorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[rustfmt::skip]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum SensorArea {
    A1, A2, A3, A4, A5, A6, A7, A8,
    B1, B2, B3, B4, B5, B6, B7, B8,
    C,
    D1, D2, D3, D4, D5, D6, D7, D8,
    E1, E2, E3, E4, E5, E6, E7, E8,
    Test,
    P1,
    Service,
    P2,
}

pub const AREA_COUNT: usize = SensorArea::P2 as usize + 1;

#[rustfmt::skip]
const ALL_AREAS: [SensorArea; AREA_COUNT] = {
    use SensorArea::*;
    [
        A1, A2, A3, A4, A5, A6, A7, A8,
        B1, B2, B3, B4, B5, B6, B7, B8,
        C,
        D1, D2, D3, D4, D5, D6, D7, D8,
        E1, E2, E3, E4, E5, E6, E7, E8,
        Test, P1, Service, P2,
    ]
};

/// Button ring layout: BA1..BA8, Select, ArrowUp, InsertCoin, ArrowDown.
#[rustfmt::skip]
pub const BUTTON_AREAS: [SensorArea; 12] = {
    use SensorArea::*;
    [A1, A2, A3, A4, A5, A6, A7, A8, Test, P1, Service, P2]
};

/// Touch panel layout. The panel has two physical C sensors (C1, C2) that
/// both report as the single logical area `C`.
#[rustfmt::skip]
pub const TOUCH_AREAS: [SensorArea; 34] = {
    use SensorArea::*;
    [
        A1, A2, A3, A4, A5, A6, A7, A8,
        B1, B2, B3, B4, B5, B6, B7, B8,
        C, C,
        D1, D2, D3, D4, D5, D6, D7, D8,
        E1, E2, E3, E4, E5, E6, E7, E8,
    ]
};

impl SensorArea {
    #[inline(always)]
    pub const fn ix(self) -> usize {
        self as usize
    }

    #[inline(always)]
    pub const fn from_ix(ix: usize) -> Option<Self> {
        if ix < AREA_COUNT {
            Some(ALL_AREAS[ix])
        } else {
            None
        }
    }

    #[inline(always)]
    pub fn all() -> impl Iterator<Item = Self> {
        ALL_AREAS.iter().copied()
    }

    #[rustfmt::skip]
    pub const fn as_str(self) -> &'static str {
        use SensorArea::*;
        match self {
            A1 => "A1", A2 => "A2", A3 => "A3", A4 => "A4",
            A5 => "A5", A6 => "A6", A7 => "A7", A8 => "A8",
            B1 => "B1", B2 => "B2", B3 => "B3", B4 => "B4",
            B5 => "B5", B6 => "B6", B7 => "B7", B8 => "B8",
            C => "C",
            D1 => "D1", D2 => "D2", D3 => "D3", D4 => "D4",
            D5 => "D5", D6 => "D6", D7 => "D7", D8 => "D8",
            E1 => "E1", E2 => "E2", E3 => "E3", E4 => "E4",
            E5 => "E5", E6 => "E6", E7 => "E7", E8 => "E8",
            Test => "Test",
            P1 => "P1",
            Service => "Service",
            P2 => "P2",
        }
    }
}

impl std::fmt::Display for SensorArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SensorArea {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::all()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

/* ------------------------ Reports and events ------------------------ */

/// One sampled sensor state, produced by a sampling loop and consumed exactly
/// once by the dispatcher. `index` is the sensor's slot within its bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SensorReport {
    pub index: usize,
    pub status: SensorStatus,
    pub timestamp: Instant,
}

/// An accepted sensor transition as seen by subscribers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputEventArgs {
    pub area: SensorArea,
    pub old_status: SensorStatus,
    pub status: SensorStatus,
    pub is_button: bool,
    pub timestamp: Instant,
}

impl InputEventArgs {
    /// Off -> On.
    #[inline(always)]
    pub const fn is_click(&self) -> bool {
        matches!(self.old_status, SensorStatus::Off) && matches!(self.status, SensorStatus::On)
    }
}

pub mod dispatcher;
pub mod keyboard;
pub mod ring;
pub mod sampler;

pub use dispatcher::{BankConfig, InputDispatcher, InputError, SubscriberId};
pub use ring::{ReportConsumer, ReportProducer, SensorRing};
pub use sampler::{SampleError, SamplerConfig, SamplerHandle, SensorSource, StopSignal};
