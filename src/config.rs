use crate::core::input::SensorClass;
use crate::core::input::keyboard::{Keymap, key_token, keymap_entry_name, parse_key_token, parse_keymap_entry};
use crate::core::priority::ThreadPriority;
use crate::game::judgment::JudgeGrade;
use crate::game::timing_windows::{JudgeSettings, LadderKind};
use ini::Ini;
use log::{LevelFilter, info, warn};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

const CONFIG_PATH: &str = "touchsync.ini";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(&self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::Off,
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
            Self::Trace => LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        [
            Self::Off,
            Self::Error,
            Self::Warn,
            Self::Info,
            Self::Debug,
            Self::Trace,
        ]
        .into_iter()
        .find(|l| l.as_str().eq_ignore_ascii_case(s))
        .ok_or(())
    }
}

/// Polling and debounce settings for one sensor bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankSettings {
    pub polling_rate_ms: u64,
    pub debounce: bool,
    pub debounce_threshold_ms: u64,
}

impl BankSettings {
    #[inline(always)]
    pub const fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_rate_ms)
    }

    #[inline(always)]
    pub const fn debounce_threshold(&self) -> Option<Duration> {
        if self.debounce {
            Some(Duration::from_millis(self.debounce_threshold_ms))
        } else {
            None
        }
    }
}

impl Default for BankSettings {
    fn default() -> Self {
        Self {
            polling_rate_ms: 0,
            debounce: false,
            debounce_threshold_ms: 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub log_level: LogLevel,
    pub main_thread_priority: ThreadPriority,
    pub io_thread_priority: ThreadPriority,
    pub button: BankSettings,
    pub touch: BankSettings,
    pub touch_panel_offset_ms: f32,
    pub ladder: LadderKind,
    pub autoplay: bool,
    // None = random grade per note
    pub autoplay_grade: Option<JudgeGrade>,
    pub release_tolerance_ms: f32,
    pub head_ignore_ms: f32,
    pub tail_ignore_ms: f32,
    pub expiry_ms: f32,
    pub touch_speed: f32,
    pub keymap: Keymap,
}

impl Default for Config {
    fn default() -> Self {
        let judge = JudgeSettings::default();
        Self {
            log_level: LogLevel::Warn,
            main_thread_priority: ThreadPriority::Normal,
            io_thread_priority: ThreadPriority::BelowNormal,
            button: BankSettings::default(),
            touch: BankSettings::default(),
            touch_panel_offset_ms: 0.0,
            ladder: LadderKind::Touch,
            autoplay: false,
            autoplay_grade: judge.autoplay_grade,
            release_tolerance_ms: judge.release_tolerance_s * 1000.0,
            head_ignore_ms: judge.head_ignore_s * 1000.0,
            tail_ignore_ms: judge.tail_ignore_s * 1000.0,
            expiry_ms: judge.expiry_s * 1000.0,
            touch_speed: judge.touch_speed,
            keymap: Keymap::default(),
        }
    }
}

impl Config {
    #[inline(always)]
    pub const fn bank(&self, class: SensorClass) -> BankSettings {
        match class {
            SensorClass::Button => self.button,
            SensorClass::Touch => self.touch,
        }
    }

    /// Session-scoped judge settings; the judgment code never reads `get()`.
    pub fn judge_settings(&self) -> JudgeSettings {
        JudgeSettings {
            ladder: self.ladder.ladder(),
            autoplay: self.autoplay,
            autoplay_grade: self.autoplay_grade,
            release_tolerance_s: self.release_tolerance_ms / 1000.0,
            head_ignore_s: self.head_ignore_ms / 1000.0,
            tail_ignore_s: self.tail_ignore_ms / 1000.0,
            expiry_s: self.expiry_ms / 1000.0,
            touch_panel_offset_s: self.touch_panel_offset_ms / 1000.0,
            touch_speed: self.touch_speed,
            ..JudgeSettings::default()
        }
    }
}

static CONFIG: std::sync::LazyLock<Mutex<Config>> =
    std::sync::LazyLock::new(|| Mutex::new(Config::default()));

// --- File I/O ---

#[inline(always)]
const fn flag(b: bool) -> &'static str {
    if b { "1" } else { "0" }
}

fn parse_flag(v: &str) -> Option<bool> {
    let v = v.trim();
    if v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes") || v.eq_ignore_ascii_case("on") {
        return Some(true);
    }
    if v.eq_ignore_ascii_case("false") || v.eq_ignore_ascii_case("no") || v.eq_ignore_ascii_case("off") {
        return Some(false);
    }
    v.parse::<u8>().ok().map(|n| n != 0)
}

const fn bank_section(class: SensorClass) -> &'static str {
    match class {
        SensorClass::Button => "ButtonRing",
        SensorClass::Touch => "TouchPanel",
    }
}

fn to_ini(cfg: &Config) -> Ini {
    let mut conf = Ini::new();
    conf.with_section(Some("Options"))
        .set("IOThreadPriority", cfg.io_thread_priority.as_str())
        .set("LogLevel", cfg.log_level.as_str())
        .set("MainThreadPriority", cfg.main_thread_priority.as_str());
    for class in [SensorClass::Button, SensorClass::Touch] {
        let bank = cfg.bank(class);
        conf.with_section(Some(bank_section(class)))
            .set("Debounce", flag(bank.debounce))
            .set("DebounceThresholdMs", bank.debounce_threshold_ms.to_string())
            .set("PollingRateMs", bank.polling_rate_ms.to_string());
    }
    conf.with_section(Some("Judge"))
        .set("Autoplay", flag(cfg.autoplay))
        .set(
            "AutoplayGrade",
            cfg.autoplay_grade.map_or("Random", JudgeGrade::as_str),
        )
        .set("ExpiryMs", cfg.expiry_ms.to_string())
        .set("HeadIgnoreMs", cfg.head_ignore_ms.to_string())
        .set("Ladder", cfg.ladder.as_str())
        .set("ReleaseToleranceMs", cfg.release_tolerance_ms.to_string())
        .set("TailIgnoreMs", cfg.tail_ignore_ms.to_string())
        .set("TouchPanelOffsetMs", cfg.touch_panel_offset_ms.to_string())
        .set("TouchSpeed", cfg.touch_speed.to_string());

    for (class, area, key) in cfg.keymap.bindings() {
        if let Some(token) = key_token(key) {
            conf.set_to(Some("Keymaps"), keymap_entry_name(class, area), token);
        }
    }
    conf
}

/// Read `key`, falling back to `default` (with a warning) when it is present
/// but unparsable.
fn read<T: FromStr>(conf: &Ini, section: &str, key: &str, default: T) -> T {
    let Some(raw) = conf.get_from(Some(section), key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            warn!("Invalid value '{raw}' for [{section}] {key}; using default.");
            default
        }
    }
}

fn read_flag(conf: &Ini, section: &str, key: &str, default: bool) -> bool {
    let Some(raw) = conf.get_from(Some(section), key) else {
        return default;
    };
    parse_flag(raw).unwrap_or_else(|| {
        warn!("Invalid value '{raw}' for [{section}] {key}; using default.");
        default
    })
}

fn read_bank(conf: &Ini, class: SensorClass, default: BankSettings) -> BankSettings {
    let section = bank_section(class);
    BankSettings {
        polling_rate_ms: read(conf, section, "PollingRateMs", default.polling_rate_ms),
        debounce: read_flag(conf, section, "Debounce", default.debounce),
        debounce_threshold_ms: read(
            conf,
            section,
            "DebounceThresholdMs",
            default.debounce_threshold_ms,
        ),
    }
}

/// Non-negative, finite milliseconds.
fn read_ms(conf: &Ini, key: &str, default: f32) -> f32 {
    let v: f32 = read(conf, "Judge", key, default);
    if v.is_finite() && v >= 0.0 {
        v
    } else {
        warn!("[Judge] {key} must be a non-negative number; using default.");
        default
    }
}

fn read_keymap(conf: &Ini) -> Keymap {
    let mut km = Keymap::default();
    let Some(section) = conf.section(Some("Keymaps")) else {
        return km;
    };
    for (k, v) in section.iter() {
        let Some((class, area)) = parse_keymap_entry(k) else {
            warn!("Unknown keymap entry '{k}'.");
            continue;
        };
        match parse_key_token(v) {
            Ok(key) => km.set(class, area, key),
            Err(()) => warn!("Unknown key '{v}' for {k}; keeping default."),
        }
    }
    km
}

pub fn from_ini(conf: &Ini) -> Config {
    let default = Config::default();
    let autoplay_grade = match conf.get_from(Some("Judge"), "AutoplayGrade") {
        None => default.autoplay_grade,
        Some(v) if v.trim().eq_ignore_ascii_case("random") => None,
        // Out-of-range grades mean random, like an unset grade.
        Some(v) => v.parse::<JudgeGrade>().ok(),
    };
    let touch_speed = read(conf, "Judge", "TouchSpeed", default.touch_speed);
    Config {
        log_level: read(conf, "Options", "LogLevel", default.log_level),
        main_thread_priority: read(conf, "Options", "MainThreadPriority", default.main_thread_priority),
        io_thread_priority: read(conf, "Options", "IOThreadPriority", default.io_thread_priority),
        button: read_bank(conf, SensorClass::Button, default.button),
        touch: read_bank(conf, SensorClass::Touch, default.touch),
        touch_panel_offset_ms: read(conf, "Judge", "TouchPanelOffsetMs", default.touch_panel_offset_ms),
        ladder: read(conf, "Judge", "Ladder", default.ladder),
        autoplay: read_flag(conf, "Judge", "Autoplay", default.autoplay),
        autoplay_grade,
        release_tolerance_ms: read_ms(conf, "ReleaseToleranceMs", default.release_tolerance_ms),
        head_ignore_ms: read_ms(conf, "HeadIgnoreMs", default.head_ignore_ms),
        tail_ignore_ms: read_ms(conf, "TailIgnoreMs", default.tail_ignore_ms),
        expiry_ms: read_ms(conf, "ExpiryMs", default.expiry_ms),
        touch_speed: if touch_speed > 0.0 { touch_speed } else { default.touch_speed },
        keymap: read_keymap(conf),
    }
}

fn create_default_config_file() -> Result<(), std::io::Error> {
    info!("'{CONFIG_PATH}' not found, creating with default values.");
    to_ini(&Config::default()).write_to_file(CONFIG_PATH)
}

pub fn load() {
    if !std::path::Path::new(CONFIG_PATH).exists()
        && let Err(e) = create_default_config_file()
    {
        warn!("Failed to create default config file: {e}");
    }

    match Ini::load_from_file(CONFIG_PATH) {
        Ok(conf) => {
            let cfg = from_ini(&conf);
            *CONFIG.lock().unwrap_or_else(PoisonError::into_inner) = cfg;
            info!("Configuration loaded from '{CONFIG_PATH}'.");
        }
        Err(e) => {
            warn!("Failed to load '{CONFIG_PATH}': {e}. Using default values.");
        }
    }
}

pub fn get() -> Config {
    *CONFIG.lock().unwrap_or_else(PoisonError::into_inner)
}
