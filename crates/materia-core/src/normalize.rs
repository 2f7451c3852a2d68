//! Canonical text form used as embedding input.
//!
//! Characters outside word/whitespace/CJK classes are stripped, the rest is
//! segmented with the jieba dictionary segmenter, stop tokens and
//! single-character tokens are dropped, and survivors are joined by one space.

use jieba_rs::Jieba;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

pub const STOP_TOKENS: &[&str] = &[
    "的", "了", "和", "是", "就", "都", "而", "及", "与", "等", "在", "这",
    "有", "以", "于", "之", "为", "对", "中", "下", "后", "由", "来", "到",
    "去", "上", "出", "要", "但", "从", "并", "也", "又", "或", "一个", "没有",
];

#[allow(clippy::expect_used)]
static STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s\x{4e00}-\x{9fff}]").expect("strip pattern"));

static JIEBA: Lazy<Jieba> = Lazy::new(Jieba::new);

static DEFAULT: Lazy<Normalizer> = Lazy::new(Normalizer::new);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segmenter {
    Dictionary,
    Whitespace,
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    stop_tokens: HashSet<String>,
    segmenter: Segmenter,
}

impl Default for Normalizer {
    fn default() -> Self { Self::new() }
}

impl Normalizer {
    pub fn new() -> Self {
        Self { stop_tokens: STOP_TOKENS.iter().map(|s| s.to_string()).collect(), segmenter: Segmenter::Dictionary }
    }

    /// Same filtering, but tokens come from plain whitespace splitting.
    pub fn whitespace() -> Self { Self { segmenter: Segmenter::Whitespace, ..Self::new() } }

    pub fn with_stop_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_tokens.extend(tokens.into_iter().map(Into::into));
        self
    }

    pub fn is_stop_token(&self, token: &str) -> bool { self.stop_tokens.contains(token) }

    pub fn normalize(&self, text: &str) -> String {
        self.tokens(text).join(" ")
    }

    /// Surviving tokens in order; `normalize` joins these.
    pub fn tokens(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() { return Vec::new(); }
        let cleaned = STRIP.replace_all(text, "");
        self.segment(&cleaned)
            .into_iter()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .filter(|w| w.chars().count() > 1 && !self.is_stop_token(w))
            .map(str::to_string)
            .collect()
    }

    fn segment<'a>(&self, text: &'a str) -> Vec<&'a str> {
        match self.segmenter {
            Segmenter::Whitespace => text.split_whitespace().collect(),
            Segmenter::Dictionary => match catch_unwind(AssertUnwindSafe(|| JIEBA.cut(text, true))) {
                Ok(words) => words,
                Err(_) => {
                    warn!(len = text.len(), "segmenter failed, splitting on whitespace");
                    text.split_whitespace().collect()
                }
            },
        }
    }
}

/// Normalize with the default stop-token set and dictionary segmenter.
pub fn normalize(text: &str) -> String { DEFAULT.normalize(text) }
