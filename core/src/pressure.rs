//! Pressure escalation for the active lock, and the prompt table that says
//! what each level looks like.
//!
//! Levels only ever rise. A tick that finds more elapsed time than the current
//! level accounts for jumps straight to the highest satisfied level with a
//! single `PRESSURE_ESCALATED` event.
//!
//! [`PromptTable`] is the data-driven half: framing, cadence, text and options
//! per level. A table is only constructible if urgency climbs with the level
//! while the prompt itself shrinks, and if nothing in it reads as comfort.

use std::fmt;
use std::iter;
use std::sync::OnceLock;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use vow_types::time::duration_ms;
use vow_types::{LockId, PressureEvent, PressureEventKind, PressureLevel, elapsed_percent};

/// Escalation state owned by the active lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureState {
    lock_id: LockId,
    level: PressureLevel,
    locked_at: DateTime<Utc>,
    escalated_at: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    window: TimeDelta,
    prompt_count: u32,
    last_prompt_at: Option<DateTime<Utc>>,
}

impl PressureState {
    /// Fresh state at P0, returned with its `PRESSURE_INITIALIZED` event.
    #[must_use]
    pub fn start(
        lock_id: LockId,
        locked_at: DateTime<Utc>,
        window: TimeDelta,
    ) -> (Self, PressureEvent) {
        let state = Self {
            lock_id,
            level: PressureLevel::P0,
            locked_at,
            escalated_at: locked_at,
            window,
            prompt_count: 0,
            last_prompt_at: None,
        };
        let event = state.event(PressureEventKind::PressureInitialized, locked_at);
        (state, event)
    }

    #[must_use]
    pub fn lock_id(&self) -> LockId {
        self.lock_id
    }

    #[must_use]
    pub fn level(&self) -> PressureLevel {
        self.level
    }

    #[must_use]
    pub fn escalated_at(&self) -> DateTime<Utc> {
        self.escalated_at
    }

    #[must_use]
    pub fn prompt_count(&self) -> u32 {
        self.prompt_count
    }

    #[must_use]
    pub fn last_prompt_at(&self) -> Option<DateTime<Utc>> {
        self.last_prompt_at
    }

    #[must_use]
    pub fn window(&self) -> TimeDelta {
        self.window
    }

    /// Time spent at the current level. Zero if the clock reads earlier than
    /// the escalation.
    #[must_use]
    pub fn time_in_level(&self, now: DateTime<Utc>) -> TimeDelta {
        (now - self.escalated_at).max(TimeDelta::zero())
    }

    #[must_use]
    pub fn elapsed_percent(&self, now: DateTime<Utc>) -> f64 {
        elapsed_percent(now - self.locked_at, self.window)
    }

    /// Raise the level to whatever `now` implies. Never lowers it.
    pub fn escalate(&mut self, now: DateTime<Utc>) -> Option<PressureEvent> {
        let target = PressureLevel::for_elapsed(now - self.locked_at, self.window);
        if target <= self.level {
            return None;
        }
        debug!(lock = %self.lock_id, from = %self.level, to = %target, "Pressure escalated");
        self.level = target;
        self.escalated_at = now;
        // A new level with a cadence prompts at once.
        self.last_prompt_at = None;
        Some(self.event(PressureEventKind::PressureEscalated, now))
    }

    /// Deliver at most one prompt if the current level's cadence is due.
    pub fn deliver_prompt(
        &mut self,
        table: &PromptTable,
        now: DateTime<Utc>,
    ) -> Option<PressureEvent> {
        let cadence = table.profile(self.level).cadence();
        if !cadence.is_due(self.last_prompt_at, now) {
            return None;
        }
        self.prompt_count = self.prompt_count.saturating_add(1);
        self.last_prompt_at = Some(now);
        Some(self.event(PressureEventKind::PromptDelivered, now))
    }

    #[must_use]
    pub fn event(&self, kind: PressureEventKind, now: DateTime<Utc>) -> PressureEvent {
        PressureEvent {
            kind,
            lock_id: self.lock_id,
            pressure_level: self.level,
            timestamp: now,
            elapsed_percent: self.elapsed_percent(now),
        }
    }
}

// ── Prompt table ─────────────────────────────────────────────

/// How a level's prompt is worded, weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Framing {
    Notice,
    Directive,
    Warning,
    Critical,
    Absolute,
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Notice => "notice",
            Self::Directive => "directive",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Absolute => "absolute",
        };
        f.write_str(label)
    }
}

/// How often a level repeats its prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Silent,
    Every(TimeDelta),
    /// Every tick with a later timestamp than the last prompt.
    Continuous,
}

impl Cadence {
    #[must_use]
    pub fn is_due(self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match (self, last) {
            (Self::Silent, _) => false,
            (_, None) => true,
            (Self::Every(interval), Some(last)) => now - last >= interval,
            (Self::Continuous, Some(last)) => now > last,
        }
    }

    /// Strictly more frequent than `other`.
    #[must_use]
    pub fn outpaces(self, other: Self) -> bool {
        match (self, other) {
            (Self::Silent, _)
            | (Self::Continuous, Self::Continuous)
            | (Self::Every(_), Self::Continuous) => false,
            (_, Self::Silent) | (Self::Continuous, Self::Every(_)) => true,
            (Self::Every(mine), Self::Every(theirs)) => mine < theirs,
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Silent => f.write_str("silent"),
            Self::Every(interval) => write!(f, "every {}m", interval.num_minutes()),
            Self::Continuous => f.write_str("continuous"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelProfile {
    framing: Framing,
    cadence: Cadence,
    text: String,
    options: Vec<String>,
}

impl LevelProfile {
    pub fn new(
        framing: Framing,
        cadence: Cadence,
        text: impl Into<String>,
        options: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            framing,
            cadence,
            text: text.into(),
            options: options.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn framing(&self) -> Framing {
        self.framing
    }

    #[must_use]
    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptTableError {
    #[error("{higher} framing ({found}) must be stronger than {lower}")]
    FramingNotEscalating {
        lower: PressureLevel,
        higher: PressureLevel,
        found: Framing,
    },
    #[error("{higher} cadence ({found}) must be more frequent than {lower}")]
    CadenceNotEscalating {
        lower: PressureLevel,
        higher: PressureLevel,
        found: Cadence,
    },
    #[error("{higher} prompt text must be shorter than {lower}")]
    TextNotShrinking {
        lower: PressureLevel,
        higher: PressureLevel,
    },
    #[error("{higher} must offer fewer options than {lower}")]
    OptionsNotShrinking {
        lower: PressureLevel,
        higher: PressureLevel,
    },
    #[error("{level} contains banned phrase \"{phrase}\"")]
    BannedPhrase {
        level: PressureLevel,
        phrase: &'static str,
    },
}

/// Comfort and motivational phrasing that never appears in a prompt.
pub const BANNED_PHRASES: &[&str] = &[
    "you can do it",
    "you've got this",
    "you got this",
    "take your time",
    "no pressure",
    "no rush",
    "don't worry",
    "no worries",
    "it's okay",
    "it's ok",
    "that's okay",
    "relax",
    "great job",
    "good job",
    "well done",
    "proud of you",
    "believe in yourself",
    "keep going",
    "almost there",
    "be kind to yourself",
    "take a break",
    "you deserve",
    "maybe later",
    "whenever you're ready",
    "don't stress",
];

struct BannedPhraseMatcher {
    automaton: Option<AhoCorasick>,
}

impl BannedPhraseMatcher {
    fn new() -> Self {
        let automaton = match AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostLongest)
            .build(BANNED_PHRASES)
        {
            Ok(ac) => Some(ac),
            Err(e) => {
                warn!("Banned phrase automaton build failed; using fallback scan ({e})");
                None
            }
        };
        Self { automaton }
    }

    fn find(&self, text: &str) -> Option<&'static str> {
        match &self.automaton {
            Some(ac) => ac
                .find(text)
                .map(|found| BANNED_PHRASES[found.pattern().as_usize()]),
            None => {
                let lower = text.to_ascii_lowercase();
                BANNED_PHRASES
                    .iter()
                    .copied()
                    .find(|phrase| lower.contains(phrase))
            }
        }
    }
}

static BANNED_PHRASE_MATCHER: OnceLock<BannedPhraseMatcher> = OnceLock::new();

/// First banned phrase contained in `text`, matched case-insensitively.
#[must_use]
pub fn find_banned_phrase(text: &str) -> Option<&'static str> {
    BANNED_PHRASE_MATCHER
        .get_or_init(BannedPhraseMatcher::new)
        .find(text)
}

/// Per-level prompt profiles, indexed by [`PressureLevel::index`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTable {
    levels: [LevelProfile; 5],
}

impl PromptTable {
    pub fn new(levels: [LevelProfile; 5]) -> Result<Self, PromptTableError> {
        let table = Self { levels };
        table.validate()?;
        Ok(table)
    }

    #[must_use]
    pub fn builtin() -> Self {
        Self {
            levels: [
                LevelProfile::new(
                    Framing::Notice,
                    Cadence::Silent,
                    "Obligation bound. The execution window is open. Log completed units now or the failure is recorded permanently.",
                    ["Log units", "View obligation", "View debt", "Attempt exit"],
                ),
                LevelProfile::new(
                    Framing::Directive,
                    Cadence::Every(TimeDelta::minutes(10)),
                    "A quarter of the window is gone. Execute now. Every minute of delay is recorded.",
                    ["Log units", "View obligation", "Attempt exit"],
                ),
                LevelProfile::new(
                    Framing::Warning,
                    Cadence::Every(TimeDelta::minutes(5)),
                    "Half the window is gone. Stop everything else. Execute.",
                    ["Log units", "Attempt exit"],
                ),
                LevelProfile::new(
                    Framing::Critical,
                    Cadence::Every(TimeDelta::minutes(2)),
                    "Window nearly spent. Execute immediately.",
                    ["Log units"],
                ),
                LevelProfile::new(
                    Framing::Absolute,
                    Cadence::Continuous,
                    "EXECUTE NOW.",
                    Vec::<String>::new(),
                ),
            ],
        }
    }

    #[must_use]
    pub fn profile(&self, level: PressureLevel) -> &LevelProfile {
        &self.levels[level.index()]
    }

    pub fn validate(&self) -> Result<(), PromptTableError> {
        for level in PressureLevel::ALL {
            let profile = self.profile(level);
            let phrases = iter::once(profile.text.as_str())
                .chain(profile.options.iter().map(String::as_str));
            for text in phrases {
                if let Some(phrase) = find_banned_phrase(text) {
                    return Err(PromptTableError::BannedPhrase { level, phrase });
                }
            }
        }

        for pair in PressureLevel::ALL.windows(2) {
            let (lower, higher) = (pair[0], pair[1]);
            let (low, high) = (self.profile(lower), self.profile(higher));

            if high.framing <= low.framing {
                return Err(PromptTableError::FramingNotEscalating {
                    lower,
                    higher,
                    found: high.framing,
                });
            }
            if !high.cadence.outpaces(low.cadence) {
                return Err(PromptTableError::CadenceNotEscalating {
                    lower,
                    higher,
                    found: high.cadence,
                });
            }
            if high.text.chars().count() >= low.text.chars().count() {
                return Err(PromptTableError::TextNotShrinking { lower, higher });
            }
            if high.options.len() >= low.options.len() {
                return Err(PromptTableError::OptionsNotShrinking { lower, higher });
            }
        }

        Ok(())
    }
}

impl Default for PromptTable {
    fn default() -> Self {
        Self::builtin()
    }
}
