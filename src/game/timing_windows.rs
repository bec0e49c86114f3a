// Shared timing window definitions for every judged note.

use crate::game::judgment::JudgeGrade;

// One 60 Hz frame; most bounds are whole or partial frames.
pub const FRAME_MS: f32 = 1000.0 / 60.0;
pub const FRAME_S: f32 = 1.0 / 60.0;

/// Ordered late-side bounds (ms) from `Perfect` out to `LateGood`, plus the
/// widest early offset at which a press is judged at all.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct JudgeLadder {
    pub bounds_ms: [f32; 7],
    pub too_fast_ms: f32,
}

const LADDER_GRADES: [JudgeGrade; 7] = [
    JudgeGrade::Perfect,
    JudgeGrade::LatePerfect2nd,
    JudgeGrade::LatePerfect3rd,
    JudgeGrade::LateGreat,
    JudgeGrade::LateGreat2nd,
    JudgeGrade::LateGreat3rd,
    JudgeGrade::LateGood,
];

impl JudgeLadder {
    pub const TAP: Self = Self {
        bounds_ms: [
            FRAME_MS,
            2.0 * FRAME_MS,
            3.0 * FRAME_MS,
            4.0 * FRAME_MS,
            5.0 * FRAME_MS,
            6.0 * FRAME_MS,
            9.0 * FRAME_MS,
        ],
        too_fast_ms: 9.0 * FRAME_MS,
    };

    pub const TOUCH: Self = Self {
        bounds_ms: [
            9.0 * FRAME_MS,
            10.5 * FRAME_MS,
            12.0 * FRAME_MS,
            13.0 * FRAME_MS,
            14.0 * FRAME_MS,
            15.0 * FRAME_MS,
            18.0 * FRAME_MS,
        ],
        too_fast_ms: 9.0 * FRAME_MS,
    };

    /// Grade a signed offset (negative = early). `None` means the press is
    /// too early to count and the note stays unjudged.
    pub fn classify(&self, diff_ms: f32) -> Option<JudgeGrade> {
        let is_fast = diff_ms < 0.0;
        let d = diff_ms.abs();
        if is_fast && d > self.too_fast_ms {
            return None;
        }
        let grade = match self.bounds_ms.iter().position(|&b| d <= b) {
            Some(i) => LADDER_GRADES[i],
            None if is_fast => return Some(JudgeGrade::TooFast),
            None => JudgeGrade::Miss,
        };
        Some(if is_fast { grade.mirrored() } else { grade })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum LadderKind {
    Tap,
    #[default]
    Touch,
}

impl LadderKind {
    #[inline(always)]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tap => "Tap",
            Self::Touch => "Touch",
        }
    }

    #[inline(always)]
    pub const fn ladder(self) -> JudgeLadder {
        match self {
            Self::Tap => JudgeLadder::TAP,
            Self::Touch => JudgeLadder::TOUCH,
        }
    }
}

impl std::fmt::Display for LadderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LadderKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("tap") {
            Ok(Self::Tap)
        } else if s.eq_ignore_ascii_case("touch") {
            Ok(Self::Touch)
        } else {
            Err(())
        }
    }
}

/// Everything a note needs to judge itself, owned by one play session.
/// All durations are seconds.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct JudgeSettings {
    pub ladder: JudgeLadder,
    /// How early a press may land inside the judgable range.
    pub judgable_lead_s: f32,
    /// Grace period past the anchor before an unjudged note is a Miss.
    pub expiry_s: f32,
    pub autoplay: bool,
    /// `None` picks a uniformly random grade per note.
    pub autoplay_grade: Option<JudgeGrade>,
    pub autoplay_lead_s: f32,
    pub release_tolerance_s: f32,
    pub head_ignore_s: f32,
    pub tail_ignore_s: f32,
    pub touch_panel_offset_s: f32,
    pub touch_speed: f32,
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self {
            ladder: JudgeLadder::TOUCH,
            judgable_lead_s: 0.15,
            expiry_s: 19.0 * FRAME_S,
            autoplay: false,
            autoplay_grade: Some(JudgeGrade::Perfect),
            autoplay_lead_s: FRAME_S,
            release_tolerance_s: 2.0 * FRAME_S,
            head_ignore_s: 9.0 * FRAME_S,
            tail_ignore_s: 18.0 * FRAME_S,
            touch_panel_offset_s: 0.0,
            touch_speed: 7.5,
        }
    }
}

impl JudgeSettings {
    /// Seconds from spawn to arrival, and from movement start to arrival.
    pub fn approach_durations(&self) -> (f32, f32) {
        let speed = self.touch_speed.max(f32::EPSILON);
        let whole = 3.209_385_7 * speed.powf(-0.954_962_2);
        (whole, whole * 0.8)
    }
}

#[cfg(test)]
mod tests {
    use super::{JudgeLadder, JudgeSettings, LadderKind};
    use crate::game::judgment::JudgeGrade::*;

    #[test]
    fn tap_ladder_walks_every_tier() {
        let l = JudgeLadder::TAP;
        assert_eq!(l.classify(0.0), Some(Perfect));
        assert_eq!(l.classify(20.0), Some(LatePerfect2nd));
        assert_eq!(l.classify(40.0), Some(LatePerfect3rd));
        assert_eq!(l.classify(60.0), Some(LateGreat));
        assert_eq!(l.classify(80.0), Some(LateGreat2nd));
        assert_eq!(l.classify(95.0), Some(LateGreat3rd));
        assert_eq!(l.classify(120.0), Some(LateGood));
        assert_eq!(l.classify(151.0), Some(Miss));
    }

    #[test]
    fn late_good_bound_is_closed() {
        let l = JudgeLadder::TAP;
        let bound = l.bounds_ms[6];
        assert_eq!(l.classify(bound), Some(LateGood));
        assert_eq!(l.classify(-bound), Some(FastGood));
        assert_eq!(l.classify(bound + 0.01), Some(Miss));
    }

    #[test]
    fn presses_beyond_the_early_bound_are_ignored() {
        let l = JudgeLadder::TAP;
        assert_eq!(l.classify(-(l.too_fast_ms + 0.01)), None);
        assert_eq!(l.classify(-60.0), Some(FastGreat));

        let t = JudgeLadder::TOUCH;
        assert_eq!(t.classify(-t.too_fast_ms), Some(Perfect));
        assert_eq!(t.classify(-200.0), None);
        assert_eq!(t.classify(290.0), Some(LateGood));
        assert_eq!(t.classify(310.0), Some(Miss));
    }

    #[test]
    fn ladder_kinds_parse() {
        assert_eq!("tap".parse::<LadderKind>().map(LadderKind::ladder), Ok(JudgeLadder::TAP));
        assert!("hold".parse::<LadderKind>().is_err());
    }

    #[test]
    fn approach_shrinks_with_speed() {
        let slow = JudgeSettings {
            touch_speed: 5.0,
            ..JudgeSettings::default()
        };
        let (whole, moving) = JudgeSettings::default().approach_durations();
        assert!((moving - whole * 0.8).abs() < 1e-6);
        assert!(slow.approach_durations().0 > whole);
        assert!(whole > 0.4 && whole < 0.5, "7.5 speed approach was {whole}");
    }
}
