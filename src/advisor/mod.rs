//! AI advisory collaborator.
//!
//! Two jobs: turn pasted free-form history text into draw records, and
//! suggest a ticket from recent draws. Model output is never trusted:
//! every record and the recommended ticket go through the same
//! validation as any other input.

pub mod openrouter;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::stats::mean_front_sum;
use crate::types::{DrawRecord, RawDraw, Ticket, Zone};

/// Most recent draws sent with an analysis request.
pub const ANALYSIS_WINDOW: usize = 50;

/// Validated advice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Advice {
    pub hot_numbers: Vec<u8>,
    pub cold_numbers: Vec<u8>,
    pub recommendation: Ticket,
    pub explanation: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Advisor: Send + Sync {
    /// Extract draw records from unstructured text. Invalid records are
    /// dropped.
    async fn parse_history(&self, raw_text: &str) -> Result<Vec<DrawRecord>>;

    /// Analyse recent draws. `trend_hint` is their mean front sum.
    async fn analyse(&self, recent: &[DrawRecord], trend_hint: f64) -> Result<Advice>;

    fn model_name(&self) -> String;
}

/// Ask for advice on the newest `ANALYSIS_WINDOW` draws of a history.
pub async fn advise(advisor: &dyn Advisor, history: &[DrawRecord]) -> Result<Advice> {
    if history.is_empty() {
        bail!("no draws to analyse");
    }
    let recent = &history[..history.len().min(ANALYSIS_WINDOW)];
    let trend_hint = mean_front_sum(recent).unwrap_or_default();
    info!(
        draws = recent.len(),
        trend_hint = format!("{trend_hint:.1}"),
        model = %advisor.model_name(),
        "Requesting analysis"
    );
    advisor.analyse(recent, trend_hint).await
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

pub fn system_prompt() -> &'static str {
    "You are a data assistant for the Super Lotto (大乐透) game. \
     A draw has 5 distinct front numbers from 1-35 and 2 distinct back numbers from 1-12. \
     Reply with a single JSON value and nothing else."
}

pub fn build_parse_prompt(raw_text: &str) -> String {
    format!(
        "Convert the following Super Lotto draw history into a JSON array.\n\
         Each element: {{\"id\": \"draw number\", \"date\": \"YYYY-MM-DD\", \
         \"front\": [5 numbers], \"back\": [2 numbers]}}\n\n\
         RAW DATA:\n{raw_text}\n"
    )
}

pub fn build_analysis_prompt(recent: &[DrawRecord], trend_hint: f64) -> String {
    let mut prompt = String::with_capacity(64 * recent.len() + 800);

    prompt.push_str(&format!(
        "Analyse the latest {} draws below.\n\
         Historically a fixed combination's best prize is usually the lowest tier, \
         so do not overfit to jackpot patterns. Prefer a combination that fits the \
         current number distribution and front-sum trend.\n\n\
         1. Identify hot and cold numbers (front 1-35, back 1-12).\n\
         2. Consider the recent front-sum trend (mean {:.1}).\n\
         3. Recommend one 5+2 combination.\n\
         4. Explain briefly.\n\n",
        recent.len(),
        trend_hint
    ));

    prompt.push_str("HISTORY:\n");
    for draw in recent {
        let join = |ns: &[u8]| ns.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(",");
        prompt.push_str(&format!("{}: {}+{}\n", draw.id(), join(draw.front()), join(draw.back())));
    }

    prompt.push_str(
        "\nRespond with JSON: {\"hotNumbers\": [..], \"coldNumbers\": [..], \
         \"recommendation\": [5 front numbers then 2 back numbers], \"explanation\": \"..\"}\n",
    );
    prompt
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAdvice {
    #[serde(default)]
    hot_numbers: Vec<i64>,
    #[serde(default)]
    cold_numbers: Vec<i64>,
    recommendation: Vec<u32>,
    #[serde(default)]
    explanation: String,
}

/// Strip markdown code fences and surrounding prose.
fn json_body(text: &str) -> &str {
    let start = text.find(|c: char| c == '[' || c == '{');
    let end = text.rfind(|c: char| c == ']' || c == '}');
    match (start, end) {
        (Some(s), Some(e)) if e >= s => &text[s..=e],
        _ => text.trim(),
    }
}

/// Parse a JSON array of draws, keeping only records that validate.
pub fn parse_history_response(text: &str) -> Result<Vec<DrawRecord>> {
    let raw: Vec<serde_json::Value> =
        serde_json::from_str(json_body(text)).context("model reply is not a JSON array")?;
    let total = raw.len();

    let draws: Vec<DrawRecord> = raw
        .into_iter()
        .filter_map(|v| {
            let raw: RawDraw = serde_json::from_value(v).ok()?;
            DrawRecord::try_from(raw)
                .map_err(|e| debug!(error = %e, "Dropping invalid parsed record"))
                .ok()
        })
        .collect();

    if draws.len() < total {
        warn!(kept = draws.len(), dropped = total - draws.len(), "Parsed history had invalid records");
    }
    Ok(draws)
}

/// Parse and validate an analysis reply. An invalid recommendation is
/// an error; out-of-range hot/cold numbers are dropped.
pub fn parse_advice(text: &str) -> Result<Advice> {
    let raw: RawAdvice = serde_json::from_str(json_body(text)).context("model reply is not valid advice JSON")?;

    let recommendation = Ticket::from_combination(&raw.recommendation)
        .with_context(|| format!("invalid recommendation {:?}", raw.recommendation))?;

    Ok(Advice {
        hot_numbers: clean_numbers(&raw.hot_numbers),
        cold_numbers: clean_numbers(&raw.cold_numbers),
        recommendation,
        explanation: raw.explanation.trim().to_string(),
    })
}

/// Keep numbers that are valid in either zone, first occurrence only.
fn clean_numbers(raw: &[i64]) -> Vec<u8> {
    let max = i64::from(Zone::Front.max());
    let mut out = Vec::with_capacity(raw.len());
    for &n in raw {
        if (1..=max).contains(&n) {
            let n = n as u8;
            if !out.contains(&n) {
                out.push(n);
            }
        }
    }
    out
}
