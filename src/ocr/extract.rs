use regex::Regex;
use std::sync::LazyLock;

use crate::progress::sample::Reading;

/// `[12.34%]`: the percentage as the game prints it
static BRACKETED_PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d{1,3}(?:\.\d{1,2})?)%\]").unwrap());

/// Any bare `12.34%`, used when the brackets were lost
static BARE_PERCENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)%").unwrap());

/// Integer immediately before the opening bracket
static VALUE_BEFORE_BRACKET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{2,})\[").unwrap());

/// First run of 1-4 digits in the level field
static LEVEL_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{1,4}").unwrap());

/// Confusable glyphs and their canonical replacement. Closed table: anything
/// not listed here is either kept as-is or dropped by the character filter.
const CONFUSABLES: &[(char, char)] = &[
    // Fullwidth digits
    ('０', '0'),
    ('１', '1'),
    ('２', '2'),
    ('３', '3'),
    ('４', '4'),
    ('５', '5'),
    ('６', '6'),
    ('７', '7'),
    ('８', '8'),
    ('９', '9'),
    // Zero look-alikes
    ('O', '0'),
    ('o', '0'),
    ('〇', '0'),
    ('○', '0'),
    ('Ｏ', '0'),
    // One look-alikes
    ('l', '1'),
    ('I', '1'),
    ('|', '1'),
    ('!', '1'),
    ('ı', '1'),
    ('ǀ', '1'),
    ('ｌ', '1'),
    ('Ｉ', '1'),
    // Percent variants
    ('％', '%'),
    ('﹪', '%'),
    ('٪', '%'),
    // Bracket variants
    ('［', '['),
    ('【', '['),
    ('「', '['),
    ('〔', '['),
    ('(', '['),
    ('{', '['),
    ('（', '['),
    ('］', ']'),
    ('】', ']'),
    ('」', ']'),
    ('〕', ']'),
    (')', ']'),
    ('}', ']'),
    ('）', ']'),
    // Fullwidth period
    ('．', '.'),
];

fn remap_confusable(c: char) -> char {
    CONFUSABLES
        .iter()
        .find(|(from, _)| *from == c)
        .map(|&(_, to)| to)
        .unwrap_or(c)
}

fn is_kept(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '.' | '%' | '[' | ']')
}

/// Normalizes raw recognizer text: strip whitespace, remap confusables,
/// then drop everything outside `[0-9.%\[\]]`.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(remap_confusable)
        .filter(|&c| is_kept(c))
        .collect()
}

/// Experience fields read from the bracketed string.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExpFields {
    pub exp_value: Option<i64>,
    pub exp_percent: Option<f64>,
}

/// Parses `12,345 [67.89%]` style text. Never fails; missing parts are `None`.
pub fn parse_exp(raw: &str) -> ExpFields {
    let cleaned = normalize(raw);

    let exp_percent = BRACKETED_PERCENT
        .captures(&cleaned)
        .or_else(|| BARE_PERCENT.captures(&cleaned))
        .and_then(|caps| caps[1].parse::<f64>().ok());

    let exp_value = VALUE_BEFORE_BRACKET
        .captures(&cleaned)
        .and_then(|caps| caps[1].parse::<i64>().ok());

    ExpFields {
        exp_value,
        exp_percent,
    }
}

/// Parses the digits-only level field. Level 0 does not exist and reads as `None`.
pub fn parse_level(raw: &str) -> Option<u32> {
    let cleaned = normalize(raw);
    LEVEL_DIGITS
        .find(&cleaned)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|&level| level > 0)
}

/// Combines both field reads into one reading.
pub fn interpret(level_text: &str, exp_text: &str) -> Reading {
    let exp = parse_exp(exp_text);
    Reading {
        level: parse_level(level_text),
        exp_value: exp.exp_value,
        exp_percent: exp.exp_percent,
    }
}
