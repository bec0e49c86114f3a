use serde::Serialize;

/// Fifteen-step timing grade. `Perfect` sits at the centre; lower indices are
/// late, higher indices are fast, and each late grade mirrors a fast one.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(u8)]
pub enum JudgeGrade {
    Miss = 0,
    LateGood,
    LateGreat3rd,
    LateGreat2nd,
    LateGreat,
    LatePerfect3rd,
    LatePerfect2nd,
    Perfect,
    FastPerfect2nd,
    FastPerfect3rd,
    FastGreat,
    FastGreat2nd,
    FastGreat3rd,
    FastGood,
    TooFast,
}

pub const GRADE_COUNT: usize = 15;
const CENTER: usize = JudgeGrade::Perfect as usize;

#[rustfmt::skip]
pub const ALL_GRADES: [JudgeGrade; GRADE_COUNT] = {
    use JudgeGrade::*;
    [
        Miss, LateGood, LateGreat3rd, LateGreat2nd, LateGreat, LatePerfect3rd, LatePerfect2nd,
        Perfect,
        FastPerfect2nd, FastPerfect3rd, FastGreat, FastGreat2nd, FastGreat3rd, FastGood, TooFast,
    ]
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Polarity {
    Fast,
    Late,
}

impl JudgeGrade {
    #[inline(always)]
    pub const fn ix(self) -> usize {
        self as usize
    }

    #[inline(always)]
    pub const fn from_ix(ix: usize) -> Option<Self> {
        if ix < GRADE_COUNT {
            Some(ALL_GRADES[ix])
        } else {
            None
        }
    }

    /// The same distance from `Perfect` on the other side.
    #[inline(always)]
    pub const fn mirrored(self) -> Self {
        ALL_GRADES[GRADE_COUNT - 1 - self.ix()]
    }

    #[inline(always)]
    pub const fn distance_from_perfect(self) -> usize {
        self.ix().abs_diff(CENTER)
    }

    #[inline(always)]
    pub const fn is_late(self) -> bool {
        self.ix() < CENTER
    }

    #[inline(always)]
    pub const fn is_fast(self) -> bool {
        self.ix() > CENTER
    }

    /// `Miss` and `TooFast` never count as a hit.
    #[inline(always)]
    pub const fn is_missed(self) -> bool {
        matches!(self, Self::Miss | Self::TooFast)
    }

    /// Fast/late side of a grade. `Perfect` has none of its own, so the sign of
    /// the timing diff decides.
    #[inline(always)]
    pub fn polarity(self, diff_ms: f32) -> Polarity {
        if self.is_late() || (!self.is_fast() && diff_ms > 0.0) {
            Polarity::Late
        } else {
            Polarity::Fast
        }
    }

    #[rustfmt::skip]
    pub const fn as_str(self) -> &'static str {
        use JudgeGrade::*;
        match self {
            Miss => "Miss",
            LateGood => "LateGood",
            LateGreat3rd => "LateGreat3rd",
            LateGreat2nd => "LateGreat2nd",
            LateGreat => "LateGreat",
            LatePerfect3rd => "LatePerfect3rd",
            LatePerfect2nd => "LatePerfect2nd",
            Perfect => "Perfect",
            FastPerfect2nd => "FastPerfect2nd",
            FastPerfect3rd => "FastPerfect3rd",
            FastGreat => "FastGreat",
            FastGreat2nd => "FastGreat2nd",
            FastGreat3rd => "FastGreat3rd",
            FastGood => "FastGood",
            TooFast => "TooFast",
        }
    }
}

impl std::fmt::Display for JudgeGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts a grade name or its ladder index.
impl std::str::FromStr for JudgeGrade {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(ix) = s.parse::<usize>() {
            return Self::from_ix(ix).ok_or(());
        }
        ALL_GRADES
            .iter()
            .copied()
            .find(|g| g.as_str().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

/// What the scoring collaborator receives once per note.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct JudgeResult {
    pub grade: JudgeGrade,
    pub is_break: bool,
    pub is_ex: bool,
    pub diff_ms: f32,
}

/// EX notes turn every hit into `Perfect`.
#[inline(always)]
pub const fn apply_ex(grade: JudgeGrade, is_ex: bool) -> JudgeGrade {
    if is_ex && !grade.is_missed() {
        JudgeGrade::Perfect
    } else {
        grade
    }
}

/// Re-grade a hold from the fraction of its body that was actually held.
///
/// `diff_ms` is the signed timing diff of the initial judgment; it only
/// matters for picking a side when `grade` is `Perfect`.
pub fn rescale_for_hold(grade: JudgeGrade, diff_ms: f32, percent: f32) -> JudgeGrade {
    use JudgeGrade::*;
    // A Perfect takes its side from the sign of the diff.
    let late = grade.polarity(diff_ms) == Polarity::Late;
    let good = if late { LateGood } else { FastGood };
    let great = if late { LateGreat } else { FastGreat };

    if percent >= 1.0 {
        match grade {
            Miss | TooFast => LateGood,
            g if g.distance_from_perfect() == 6 => great,
            g => g,
        }
    } else if percent >= 0.67 {
        match grade {
            Miss | TooFast => LateGood,
            g if g.distance_from_perfect() == 6 => great,
            Perfect => {
                if late {
                    LatePerfect2nd
                } else {
                    FastPerfect2nd
                }
            }
            g => g,
        }
    } else if percent >= 0.33 {
        if grade.distance_from_perfect() >= 6 {
            good
        } else {
            great
        }
    } else if percent >= 0.05 {
        good
    } else if grade.is_missed() {
        Miss
    } else {
        good
    }
}

#[cfg(test)]
mod tests {
    use super::{ALL_GRADES, JudgeGrade, Polarity, apply_ex, rescale_for_hold};
    use JudgeGrade::*;

    #[test]
    fn fast_and_late_grades_mirror_around_perfect() {
        for g in ALL_GRADES {
            assert_eq!(g.mirrored().mirrored(), g);
            assert_eq!(g.distance_from_perfect(), g.mirrored().distance_from_perfect());
        }
        assert_eq!(LateGood.mirrored(), FastGood);
        assert_eq!(Miss.mirrored(), TooFast);
        assert_eq!(Perfect.mirrored(), Perfect);
    }

    #[test]
    fn grades_parse_by_name_or_index() {
        assert_eq!("latePerfect2nd".parse(), Ok(LatePerfect2nd));
        assert_eq!("7".parse(), Ok(Perfect));
        assert_eq!("15".parse::<JudgeGrade>(), Err(()));
        assert_eq!("Critical".parse::<JudgeGrade>(), Err(()));
    }

    #[test]
    fn perfect_takes_its_side_from_the_diff() {
        assert_eq!(Perfect.polarity(3.0), Polarity::Late);
        assert_eq!(Perfect.polarity(-3.0), Polarity::Fast);
        assert_eq!(Perfect.polarity(0.0), Polarity::Fast);
        assert_eq!(Miss.polarity(-50.0), Polarity::Late);
        assert_eq!(TooFast.polarity(50.0), Polarity::Fast);
    }

    #[test]
    fn ex_only_upgrades_hits() {
        assert_eq!(apply_ex(LateGood, true), Perfect);
        assert_eq!(apply_ex(Miss, true), Miss);
        assert_eq!(apply_ex(TooFast, true), TooFast);
        assert_eq!(apply_ex(FastGreat2nd, false), FastGreat2nd);
    }

    #[test]
    fn full_hold_upgrades_edge_grades() {
        assert_eq!(rescale_for_hold(Miss, 316.0, 1.0), LateGood);
        assert_eq!(rescale_for_hold(TooFast, -150.0, 1.0), LateGood);
        assert_eq!(rescale_for_hold(LateGood, 140.0, 1.0), LateGreat);
        assert_eq!(rescale_for_hold(FastGood, -140.0, 1.0), FastGreat);
        assert_eq!(rescale_for_hold(Perfect, 2.0, 1.0), Perfect);
        assert_eq!(rescale_for_hold(FastGreat2nd, -90.0, 1.0), FastGreat2nd);
    }

    #[test]
    fn tier_boundaries_belong_to_the_upper_tier() {
        // 0.67: Perfect drops one step, edge grades still upgrade.
        assert_eq!(rescale_for_hold(Perfect, 1.0, 0.67), LatePerfect2nd);
        assert_eq!(rescale_for_hold(Perfect, -1.0, 0.67), FastPerfect2nd);
        assert_eq!(rescale_for_hold(LateGood, 140.0, 0.67), LateGreat);
        assert_eq!(rescale_for_hold(LateGreat3rd, 95.0, 0.67), LateGreat3rd);
        assert_eq!(rescale_for_hold(Perfect, 1.0, 0.669), LateGreat);

        // 0.33: far grades become Good, the rest Great.
        assert_eq!(rescale_for_hold(Perfect, -1.0, 0.33), FastGreat);
        assert_eq!(rescale_for_hold(LateGood, 140.0, 0.33), LateGood);
        assert_eq!(rescale_for_hold(Miss, 316.0, 0.33), LateGood);
        assert_eq!(rescale_for_hold(TooFast, -150.0, 0.33), FastGood);
        assert_eq!(rescale_for_hold(Perfect, 1.0, 0.329), LateGood);

        // 0.05: everything is Good.
        assert_eq!(rescale_for_hold(Perfect, 1.0, 0.05), LateGood);
        assert_eq!(rescale_for_hold(FastPerfect3rd, -40.0, 0.05), FastGood);
        assert_eq!(rescale_for_hold(Miss, 316.0, 0.05), LateGood);

        // 0.0: misses stay misses, hits are Good.
        assert_eq!(rescale_for_hold(Miss, 316.0, 0.0), Miss);
        assert_eq!(rescale_for_hold(TooFast, -150.0, 0.0), Miss);
        assert_eq!(rescale_for_hold(LateGreat, 70.0, 0.0), LateGood);
        assert_eq!(rescale_for_hold(FastPerfect2nd, -20.0, 0.049), FastGood);
    }
}
