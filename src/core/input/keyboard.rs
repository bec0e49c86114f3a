//! Keyboard-backed sensors.
//!
//! The window thread records key transitions into per-bank atomic tables; the
//! sampling threads read those tables through `KeyboardSource` exactly as they
//! would read a serial touch panel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use winit::event::{ElementState, KeyEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use super::{AREA_COUNT, SampleError, SensorArea, SensorClass, SensorSource, SensorStatus};

/* ------------------------ Keymap ------------------------ */

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Keymap {
    button: [Option<KeyCode>; AREA_COUNT],
    touch: [Option<KeyCode>; AREA_COUNT],
}

impl Keymap {
    pub const fn empty() -> Self {
        Self {
            button: [None; AREA_COUNT],
            touch: [None; AREA_COUNT],
        }
    }

    #[inline(always)]
    pub const fn get(&self, class: SensorClass, area: SensorArea) -> Option<KeyCode> {
        match class {
            SensorClass::Button => self.button[area.ix()],
            SensorClass::Touch => self.touch[area.ix()],
        }
    }

    #[inline(always)]
    pub fn set(&mut self, class: SensorClass, area: SensorArea, key: Option<KeyCode>) {
        match class {
            SensorClass::Button => self.button[area.ix()] = key,
            SensorClass::Touch => self.touch[area.ix()] = key,
        }
    }

    /// Every area of every bank that has a key, in bank order.
    pub fn bindings(&self) -> impl Iterator<Item = (SensorClass, SensorArea, KeyCode)> + '_ {
        [SensorClass::Button, SensorClass::Touch]
            .into_iter()
            .flat_map(move |class| {
                let mut seen = [false; AREA_COUNT];
                class.areas().iter().filter_map(move |&area| {
                    if std::mem::replace(&mut seen[area.ix()], true) {
                        return None;
                    }
                    self.get(class, area).map(|key| (class, area, key))
                })
            })
    }
}

impl Default for Keymap {
    fn default() -> Self {
        use SensorArea::*;
        let mut km = Self::empty();

        let buttons = [
            (A1, KeyCode::Numpad8),
            (A2, KeyCode::Numpad9),
            (A3, KeyCode::Numpad6),
            (A4, KeyCode::Numpad3),
            (A5, KeyCode::Numpad2),
            (A6, KeyCode::Numpad1),
            (A7, KeyCode::Numpad4),
            (A8, KeyCode::Numpad7),
            (Test, KeyCode::F1),
            (P1, KeyCode::ArrowUp),
            (Service, KeyCode::F2),
            (P2, KeyCode::ArrowDown),
        ];
        for (area, key) in buttons {
            km.set(SensorClass::Button, area, Some(key));
        }

        let rows: [([SensorArea; 8], [KeyCode; 8]); 4] = [
            (
                [A1, A2, A3, A4, A5, A6, A7, A8],
                [
                    KeyCode::Digit1,
                    KeyCode::Digit2,
                    KeyCode::Digit3,
                    KeyCode::Digit4,
                    KeyCode::Digit5,
                    KeyCode::Digit6,
                    KeyCode::Digit7,
                    KeyCode::Digit8,
                ],
            ),
            (
                [B1, B2, B3, B4, B5, B6, B7, B8],
                [
                    KeyCode::KeyQ,
                    KeyCode::KeyW,
                    KeyCode::KeyE,
                    KeyCode::KeyR,
                    KeyCode::KeyT,
                    KeyCode::KeyY,
                    KeyCode::KeyU,
                    KeyCode::KeyI,
                ],
            ),
            (
                [D1, D2, D3, D4, D5, D6, D7, D8],
                [
                    KeyCode::KeyA,
                    KeyCode::KeyS,
                    KeyCode::KeyD,
                    KeyCode::KeyF,
                    KeyCode::KeyG,
                    KeyCode::KeyH,
                    KeyCode::KeyJ,
                    KeyCode::KeyK,
                ],
            ),
            (
                [E1, E2, E3, E4, E5, E6, E7, E8],
                [
                    KeyCode::KeyZ,
                    KeyCode::KeyX,
                    KeyCode::KeyC,
                    KeyCode::KeyV,
                    KeyCode::KeyB,
                    KeyCode::KeyN,
                    KeyCode::KeyM,
                    KeyCode::Comma,
                ],
            ),
        ];
        for (areas, keys) in rows {
            for (area, key) in areas.into_iter().zip(keys) {
                km.set(SensorClass::Touch, area, Some(key));
            }
        }
        km.set(SensorClass::Touch, C, Some(KeyCode::Space));
        km
    }
}

/// `Button.A1`, `Touch.C` and so on.
pub fn parse_keymap_entry(key: &str) -> Option<(SensorClass, SensorArea)> {
    let (class, area) = key.trim().split_once('.')?;
    let class = if class.eq_ignore_ascii_case("button") {
        SensorClass::Button
    } else if class.eq_ignore_ascii_case("touch") {
        SensorClass::Touch
    } else {
        return None;
    };
    let area: SensorArea = area.parse().ok()?;
    class.areas().contains(&area).then_some((class, area))
}

#[inline(always)]
pub fn keymap_entry_name(class: SensorClass, area: SensorArea) -> String {
    format!("{class}.{area}")
}

#[rustfmt::skip]
const KEY_NAMES: &[(KeyCode, &str)] = &[
    (KeyCode::Digit0, "Digit0"), (KeyCode::Digit1, "Digit1"), (KeyCode::Digit2, "Digit2"),
    (KeyCode::Digit3, "Digit3"), (KeyCode::Digit4, "Digit4"), (KeyCode::Digit5, "Digit5"),
    (KeyCode::Digit6, "Digit6"), (KeyCode::Digit7, "Digit7"), (KeyCode::Digit8, "Digit8"),
    (KeyCode::Digit9, "Digit9"),
    (KeyCode::KeyA, "KeyA"), (KeyCode::KeyB, "KeyB"), (KeyCode::KeyC, "KeyC"), (KeyCode::KeyD, "KeyD"),
    (KeyCode::KeyE, "KeyE"), (KeyCode::KeyF, "KeyF"), (KeyCode::KeyG, "KeyG"), (KeyCode::KeyH, "KeyH"),
    (KeyCode::KeyI, "KeyI"), (KeyCode::KeyJ, "KeyJ"), (KeyCode::KeyK, "KeyK"), (KeyCode::KeyL, "KeyL"),
    (KeyCode::KeyM, "KeyM"), (KeyCode::KeyN, "KeyN"), (KeyCode::KeyO, "KeyO"), (KeyCode::KeyP, "KeyP"),
    (KeyCode::KeyQ, "KeyQ"), (KeyCode::KeyR, "KeyR"), (KeyCode::KeyS, "KeyS"), (KeyCode::KeyT, "KeyT"),
    (KeyCode::KeyU, "KeyU"), (KeyCode::KeyV, "KeyV"), (KeyCode::KeyW, "KeyW"), (KeyCode::KeyX, "KeyX"),
    (KeyCode::KeyY, "KeyY"), (KeyCode::KeyZ, "KeyZ"),
    (KeyCode::Numpad0, "Numpad0"), (KeyCode::Numpad1, "Numpad1"), (KeyCode::Numpad2, "Numpad2"),
    (KeyCode::Numpad3, "Numpad3"), (KeyCode::Numpad4, "Numpad4"), (KeyCode::Numpad5, "Numpad5"),
    (KeyCode::Numpad6, "Numpad6"), (KeyCode::Numpad7, "Numpad7"), (KeyCode::Numpad8, "Numpad8"),
    (KeyCode::Numpad9, "Numpad9"),
    (KeyCode::F1, "F1"), (KeyCode::F2, "F2"), (KeyCode::F3, "F3"), (KeyCode::F4, "F4"),
    (KeyCode::F5, "F5"), (KeyCode::F6, "F6"), (KeyCode::F7, "F7"), (KeyCode::F8, "F8"),
    (KeyCode::F9, "F9"), (KeyCode::F10, "F10"), (KeyCode::F11, "F11"), (KeyCode::F12, "F12"),
    (KeyCode::ArrowUp, "ArrowUp"), (KeyCode::ArrowDown, "ArrowDown"),
    (KeyCode::ArrowLeft, "ArrowLeft"), (KeyCode::ArrowRight, "ArrowRight"),
    (KeyCode::Space, "Space"), (KeyCode::Enter, "Enter"), (KeyCode::Tab, "Tab"),
    (KeyCode::Comma, "Comma"), (KeyCode::Period, "Period"), (KeyCode::Slash, "Slash"),
    (KeyCode::Semicolon, "Semicolon"), (KeyCode::Minus, "Minus"), (KeyCode::Equal, "Equal"),
    (KeyCode::BracketLeft, "BracketLeft"), (KeyCode::BracketRight, "BracketRight"),
];

/// Parse `KeyCode::<Variant>`; an empty token means "unbound".
pub fn parse_key_token(tok: &str) -> Result<Option<KeyCode>, ()> {
    let tok = tok.trim();
    if tok.is_empty() {
        return Ok(None);
    }
    let name = tok.strip_prefix("KeyCode::").ok_or(())?;
    KEY_NAMES
        .iter()
        .find(|(_, n)| *n == name)
        .map(|(code, _)| Some(*code))
        .ok_or(())
}

pub fn key_token(code: KeyCode) -> Option<String> {
    KEY_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, n)| format!("KeyCode::{n}"))
}

/* ------------------------ Shared key tables ------------------------ */

type KeyTable = Arc<[AtomicBool]>;

fn new_table(class: SensorClass) -> KeyTable {
    (0..class.sensor_count()).map(|_| AtomicBool::new(false)).collect()
}

/// Window-side half: maps physical keys to sensor slots and records presses.
pub struct KeyboardInput {
    slots: FxHashMap<KeyCode, SmallVec<[(SensorClass, usize); 2]>>,
    button: KeyTable,
    touch: KeyTable,
}

impl KeyboardInput {
    pub fn new(keymap: &Keymap) -> Self {
        let mut slots: FxHashMap<KeyCode, SmallVec<[(SensorClass, usize); 2]>> =
            FxHashMap::default();
        for class in [SensorClass::Button, SensorClass::Touch] {
            for (i, &area) in class.areas().iter().enumerate() {
                if let Some(key) = keymap.get(class, area) {
                    let entry = slots.entry(key).or_default();
                    if !entry.is_empty() && !(entry.len() == 1 && area == SensorArea::C) {
                        warn!("{key:?} is bound to several sensors; all of them will fire.");
                    }
                    entry.push((class, i));
                }
            }
        }
        debug!("Keyboard mapped {} keys to sensors.", slots.len());
        Self {
            slots,
            button: new_table(SensorClass::Button),
            touch: new_table(SensorClass::Touch),
        }
    }

    #[inline(always)]
    fn table(&self, class: SensorClass) -> &KeyTable {
        match class {
            SensorClass::Button => &self.button,
            SensorClass::Touch => &self.touch,
        }
    }

    /// Returns `true` when the key is mapped to at least one sensor.
    pub fn set_key(&self, code: KeyCode, pressed: bool) -> bool {
        let Some(targets) = self.slots.get(&code) else {
            return false;
        };
        for &(class, i) in targets {
            self.table(class)[i].store(pressed, Ordering::Release);
        }
        true
    }

    /// Feed a window key event. Auto-repeat presses are ignored.
    pub fn handle_key_event(&self, event: &KeyEvent) -> bool {
        let PhysicalKey::Code(code) = event.physical_key else {
            return false;
        };
        let pressed = event.state == ElementState::Pressed;
        if pressed && event.repeat {
            return false;
        }
        self.set_key(code, pressed)
    }

    /// Lift every key, e.g. when the window loses focus.
    pub fn release_all(&self) {
        for flag in self.button.iter().chain(self.touch.iter()) {
            flag.store(false, Ordering::Release);
        }
    }

    pub fn source(&self, class: SensorClass) -> KeyboardSource {
        KeyboardSource {
            keys: self.table(class).clone(),
        }
    }
}

/// Sampling-thread half of `KeyboardInput`.
pub struct KeyboardSource {
    keys: KeyTable,
}

impl SensorSource for KeyboardSource {
    #[inline(always)]
    fn sensor_count(&self) -> usize {
        self.keys.len()
    }

    fn read(&mut self, index: usize) -> Result<SensorStatus, SampleError> {
        self.keys
            .get(index)
            .map(|flag| SensorStatus::from_pressed(flag.load(Ordering::Acquire)))
            .ok_or_else(|| SampleError::Read {
                index,
                reason: "no such key slot".to_string(),
            })
    }
}
