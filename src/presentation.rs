// src/presentation.rs
//! Pure functions turning feed data and totals into display structures.
use serde::Serialize;

use crate::feed::{Feed, Indicator, OverallRisk, RiskClass};
use crate::models::{Choice, PollDefinition, Reaction, VoteCategory};
use crate::vote::{TotalsSnapshot, VoteState};

/// `|value| >= 1000` gets thousands separators and up to three decimals,
/// anything smaller exactly two decimals.
pub fn format_value(value: f64, unit: &str) -> String {
    if value.abs() >= 1000.0 {
        format!("{}{unit}", group_thousands(value))
    } else {
        format!("{value:.2}{unit}")
    }
}

pub fn format_count(count: u64) -> String {
    group_digits(&count.to_string())
}

fn group_thousands(value: f64) -> String {
    let fixed = format!("{:.3}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let frac_part = frac_part.trim_end_matches('0');

    let mut out = String::new();
    if value < 0.0 {
        out.push('-');
    }
    out.push_str(&group_digits(int_part));
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

fn group_digits(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Score 1 (safe) maps to -90 degrees, 3 (danger) to +90.
pub fn needle_angle(score: f64) -> f64 {
    let normalized = (score - 1.0) / 2.0;
    -90.0 + normalized * 180.0
}

/// Bar fill percentage, clamped to 0..=100.
pub fn bar_width(value: f64, min: f64, max: f64) -> f64 {
    if max == min {
        return 0.0;
    }
    let normalized = (value - min) / (max - min);
    (normalized * 100.0).clamp(0.0, 100.0)
}

pub fn score_label(score: f64) -> String {
    format!("위험 점수: {score:.2} / 3.0")
}

pub fn percent(count: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    (count as f64 / total as f64 * 100.0).round() as u32
}

/// Message shown under a vote control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// A vote was just recorded.
    Thanks,
    /// The visitor returns inside the window.
    AlreadyParticipated,
    /// The visitor tried to vote again inside the window.
    RepeatAttempt,
}

impl Notice {
    pub fn message(self, category: VoteCategory) -> &'static str {
        match (self, category) {
            (Notice::Thanks, _) => "참여해주셔서 감사합니다! 🙏",
            (Notice::AlreadyParticipated, VoteCategory::Reaction) => "오늘 이미 참여하셨습니다.",
            (Notice::AlreadyParticipated, VoteCategory::Poll) => "이번 주 설문에 이미 참여하셨습니다.",
            (Notice::RepeatAttempt, VoteCategory::Reaction) => {
                "이미 참여하셨습니다. 내일 다시 참여해주세요!"
            }
            (Notice::RepeatAttempt, VoteCategory::Poll) => "이번 주 설문에 이미 참여하셨습니다.",
        }
    }

    /// Notice for a page load given the visitor's current state.
    pub fn on_load(state: VoteState) -> Option<Self> {
        match state {
            VoteState::Unvoted => None,
            VoteState::Voted(_) => Some(Notice::AlreadyParticipated),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskCard {
    pub class: RiskClass,
    pub text: String,
    pub score_label: String,
    pub needle_angle: f64,
}

pub fn risk_card(risk: &OverallRisk) -> RiskCard {
    RiskCard {
        class: risk.class,
        text: risk.text.clone(),
        score_label: score_label(risk.score),
        needle_angle: needle_angle(risk.score),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorCard {
    pub id: String,
    pub name: String,
    pub risk_class: RiskClass,
    pub risk_text: String,
    pub value_label: String,
    pub bar_width: f64,
    pub description: String,
    pub date: String,
}

pub fn indicator_card(id: &str, indicator: &Indicator) -> IndicatorCard {
    IndicatorCard {
        id: id.to_string(),
        name: indicator.name.clone(),
        risk_class: indicator.risk_class,
        risk_text: indicator.risk_text.clone(),
        value_label: format_value(indicator.value, &indicator.unit),
        bar_width: bar_width(indicator.value, indicator.min, indicator.max),
        description: indicator.description.clone(),
        date: indicator.date.clone(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionCount {
    pub reaction: Reaction,
    pub count: u64,
    pub label: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionPanel {
    pub reactions: Vec<ReactionCount>,
    pub state: VoteState,
    pub disabled: bool,
    pub note: Option<&'static str>,
    pub totals_available: bool,
}

pub fn reaction_panel(
    state: VoteState,
    snapshot: &TotalsSnapshot,
    notice: Option<Notice>,
    busy: bool,
) -> ReactionPanel {
    let selected = state.choice();
    let reactions = Reaction::ALL
        .iter()
        .map(|&reaction| {
            let count = snapshot.totals.count(&Choice::Reaction(reaction));
            ReactionCount {
                reaction,
                count,
                label: format_count(count),
                selected: selected == Some(Choice::Reaction(reaction)),
            }
        })
        .collect();

    ReactionPanel {
        reactions,
        state,
        disabled: busy || selected.is_some(),
        note: notice.map(|n| n.message(VoteCategory::Reaction)),
        totals_available: snapshot.available,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollOptionView {
    pub index: usize,
    pub text: String,
    /// Hidden until the visitor has voted.
    pub count: Option<u64>,
    pub percent: Option<u32>,
    pub bar_width: u32,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollPanel {
    pub question: String,
    pub options: Vec<PollOptionView>,
    pub total: u64,
    pub total_label: String,
    pub state: VoteState,
    pub disabled: bool,
    pub note: Option<&'static str>,
    pub totals_available: bool,
}

pub fn poll_panel(
    poll: &PollDefinition,
    state: VoteState,
    snapshot: &TotalsSnapshot,
    notice: Option<Notice>,
    busy: bool,
) -> PollPanel {
    let counts: Vec<u64> = (0..poll.options.len())
        .map(|index| snapshot.totals.count(&Choice::Poll(index)))
        .collect();
    let total: u64 = counts.iter().sum();
    let voted = state.choice();
    let revealed = voted.is_some();

    let options = poll
        .options
        .iter()
        .zip(&counts)
        .enumerate()
        .map(|(index, (text, &count))| {
            let pct = percent(count, total);
            PollOptionView {
                index,
                text: text.clone(),
                count: revealed.then_some(count),
                percent: revealed.then_some(pct),
                bar_width: if revealed { pct } else { 0 },
                selected: voted == Some(Choice::Poll(index)),
            }
        })
        .collect();

    let total_label = if total > 0 {
        format!("총 {}명 참여", format_count(total))
    } else {
        String::new()
    };

    PollPanel {
        question: poll.question.clone(),
        options,
        total,
        total_label,
        state,
        disabled: busy || revealed,
        note: notice.map(|n| n.message(VoteCategory::Poll)),
        totals_available: snapshot.available,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub updated_date: String,
    pub overall_risk: RiskCard,
    pub indicators: Vec<IndicatorCard>,
    pub reactions: ReactionPanel,
    pub poll: Option<PollPanel>,
}

pub fn dashboard(feed: &Feed, reactions: ReactionPanel, poll: Option<PollPanel>) -> DashboardView {
    DashboardView {
        updated_date: feed.updated_date.clone(),
        overall_risk: risk_card(&feed.overall_risk),
        indicators: feed
            .indicators
            .iter()
            .map(|(id, indicator)| indicator_card(id, indicator))
            .collect(),
        reactions,
        poll,
    }
}
