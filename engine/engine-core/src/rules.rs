//! Rule sets: ko handling, scoring and suicide.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RulesError;

/// How repeated positions are forbidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KoRule {
    /// Only the immediate single-stone recapture is forbidden.
    Simple,
    /// No whole-board position may repeat.
    Positional,
    /// No whole-board position may repeat with the same player to move.
    Situational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoringRule {
    Area,
    /// Scored as area. Territory counting is not modelled separately.
    Territory,
}

/// A complete rule set including komi.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rules {
    pub ko_rule: KoRule,
    pub scoring_rule: ScoringRule,
    pub multi_stone_suicide_legal: bool,
    pub komi: f32,
}

impl Rules {
    pub fn tromp_taylor() -> Self {
        Self {
            ko_rule: KoRule::Positional,
            scoring_rule: ScoringRule::Area,
            multi_stone_suicide_legal: true,
            komi: 7.5,
        }
    }

    pub fn chinese() -> Self {
        Self {
            ko_rule: KoRule::Simple,
            scoring_rule: ScoringRule::Area,
            multi_stone_suicide_legal: false,
            komi: 7.5,
        }
    }

    pub fn japanese() -> Self {
        Self {
            ko_rule: KoRule::Simple,
            scoring_rule: ScoringRule::Territory,
            multi_stone_suicide_legal: false,
            komi: 6.5,
        }
    }

    pub fn aga() -> Self {
        Self {
            ko_rule: KoRule::Situational,
            scoring_rule: ScoringRule::Area,
            multi_stone_suicide_legal: false,
            komi: 7.5,
        }
    }

    pub fn new_zealand() -> Self {
        Self {
            ko_rule: KoRule::Situational,
            scoring_rule: ScoringRule::Area,
            multi_stone_suicide_legal: true,
            komi: 7.5,
        }
    }

    pub fn with_komi(mut self, komi: f32) -> Self {
        self.komi = komi;
        self
    }

    /// Komi must be a whole or half point value.
    pub fn komi_is_int_or_half_int(komi: f32) -> bool {
        komi.is_finite() && (komi * 2.0).fract() == 0.0
    }
}

impl Default for Rules {
    fn default() -> Self {
        Self::tromp_taylor()
    }
}

impl FromStr for Rules {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "tromptaylor" => Ok(Self::tromp_taylor()),
            "chinese" | "chineseogs" | "chinesekgs" => Ok(Self::chinese()),
            "japanese" | "korean" => Ok(Self::japanese()),
            "aga" | "bga" | "french" => Ok(Self::aga()),
            "newzealand" | "nz" => Ok(Self::new_zealand()),
            _ => parse_short_form(s).ok_or_else(|| RulesError::UnknownRules(s.to_string())),
        }
    }
}

/// Parse the compact form written by `Display`, e.g.
/// `koPOSITIONALscoreAREAsui0` or `koSIMPLEscoreTERRITORYsui0komi6.5`.
/// Case is ignored. `ko` and `score` are required; suicide defaults to
/// illegal and komi to 7.5.
fn parse_short_form(text: &str) -> Option<Rules> {
    let upper = text.trim().to_ascii_uppercase();
    let mut rest = upper.as_str();
    let mut ko_rule = None;
    let mut scoring_rule = None;
    let mut suicide = false;
    let mut komi = 7.5;

    while !rest.is_empty() {
        if let Some(r) = rest.strip_prefix("KOMI") {
            let end = r.find(|c: char| c.is_ascii_alphabetic()).unwrap_or(r.len());
            komi = r[..end].parse::<f32>().ok().filter(|&k| Rules::komi_is_int_or_half_int(k))?;
            rest = &r[end..];
        } else if let Some(r) = rest.strip_prefix("KO") {
            let (rule, r) = take_keyword(
                r,
                &[
                    ("SIMPLE", KoRule::Simple),
                    ("POSITIONAL", KoRule::Positional),
                    ("SITUATIONAL", KoRule::Situational),
                ],
            )?;
            ko_rule = Some(rule);
            rest = r;
        } else if let Some(r) = rest.strip_prefix("SCORE") {
            let (rule, r) = take_keyword(r, &[("AREA", ScoringRule::Area), ("TERRITORY", ScoringRule::Territory)])?;
            scoring_rule = Some(rule);
            rest = r;
        } else if let Some(r) = rest.strip_prefix("SUI") {
            let (legal, r) = take_keyword(r, &[("0", false), ("1", true)])?;
            suicide = legal;
            rest = r;
        } else {
            return None;
        }
    }

    Some(Rules {
        ko_rule: ko_rule?,
        scoring_rule: scoring_rule?,
        multi_stone_suicide_legal: suicide,
        komi,
    })
}

fn take_keyword<'a, T: Copy>(s: &'a str, options: &[(&str, T)]) -> Option<(T, &'a str)> {
    options
        .iter()
        .find_map(|&(keyword, value)| s.strip_prefix(keyword).map(|rest| (value, rest)))
}

impl fmt::Display for Rules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ko = match self.ko_rule {
            KoRule::Simple => "SIMPLE",
            KoRule::Positional => "POSITIONAL",
            KoRule::Situational => "SITUATIONAL",
        };
        let score = match self.scoring_rule {
            ScoringRule::Area => "AREA",
            ScoringRule::Territory => "TERRITORY",
        };
        write!(
            f,
            "ko{}score{}sui{}komi{}",
            ko,
            score,
            u8::from(self.multi_stone_suicide_legal),
            self.komi
        )
    }
}
