//! Shared types for the DLT tracker.
//!
//! These types form the data model used across all modules: the
//! validated draw record, the candidate ticket, prize tiers, the
//! versioned history snapshot, and the domain error enums.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Zones
// ---------------------------------------------------------------------------

/// Number of front-zone numbers in a draw or ticket.
pub const FRONT_COUNT: usize = 5;

/// Number of back-zone numbers in a draw or ticket.
pub const BACK_COUNT: usize = 2;

/// The two number pools of a DLT draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    /// 5 numbers out of 1–35.
    Front,
    /// 2 numbers out of 1–12.
    Back,
}

impl Zone {
    /// Largest number in the pool (the smallest is always 1).
    pub fn max(&self) -> u8 {
        match self {
            Zone::Front => 35,
            Zone::Back => 12,
        }
    }

    /// How many numbers are drawn from the pool.
    pub fn pick_count(&self) -> usize {
        match self {
            Zone::Front => FRONT_COUNT,
            Zone::Back => BACK_COUNT,
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Front => write!(f, "front"),
            Zone::Back => write!(f, "back"),
        }
    }
}

/// Check cardinality, range and uniqueness of one zone, returning the
/// numbers narrowed to `u8` in their original order.
fn validate_zone(zone: Zone, numbers: &[u32]) -> Result<Vec<u8>, ValidationError> {
    if numbers.len() != zone.pick_count() {
        return Err(ValidationError::WrongCount {
            zone,
            expected: zone.pick_count(),
            found: numbers.len(),
        });
    }

    let mut out = Vec::with_capacity(numbers.len());
    for (i, &n) in numbers.iter().enumerate() {
        if n < 1 || n > zone.max() as u32 {
            return Err(ValidationError::OutOfRange { zone, number: n, max: zone.max() });
        }
        if numbers[..i].contains(&n) {
            return Err(ValidationError::Duplicate { zone, number: n });
        }
        out.push(n as u8);
    }
    Ok(out)
}

fn to_front(numbers: &[u32]) -> Result<[u8; FRONT_COUNT], ValidationError> {
    let v = validate_zone(Zone::Front, numbers)?;
    Ok([v[0], v[1], v[2], v[3], v[4]])
}

fn to_back(numbers: &[u32]) -> Result<[u8; BACK_COUNT], ValidationError> {
    let v = validate_zone(Zone::Back, numbers)?;
    Ok([v[0], v[1]])
}

/// Strict `YYYY-MM-DD`: zero-padded, and a real calendar date.
fn parse_draw_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    let bytes = raw.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shape_ok {
        return Err(ValidationError::InvalidDate(raw.to_string()));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(raw.to_string()))
}

/// Whether a string looks like a draw date. Used by the HTML extractor
/// to locate the date cell by content rather than position.
pub fn is_draw_date(raw: &str) -> bool {
    parse_draw_date(raw).is_ok()
}

// ---------------------------------------------------------------------------
// Draw record
// ---------------------------------------------------------------------------

/// One historical draw. Only constructible through validation, and
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDraw", into = "RawDraw")]
pub struct DrawRecord {
    id: String,
    sequence: u64,
    date: NaiveDate,
    front: [u8; FRONT_COUNT],
    back: [u8; BACK_COUNT],
}

/// Wire shape of a draw (persisted JSON, advisor output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDraw {
    pub id: String,
    pub date: String,
    pub front: Vec<u32>,
    pub back: Vec<u32>,
}

impl DrawRecord {
    /// Validate and build a record.
    pub fn new(id: &str, date: &str, front: &[u32], back: &[u32]) -> Result<Self, ValidationError> {
        let id = id.trim();
        let sequence = Some(id)
            .filter(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|id| id.parse::<u64>().ok())
            .ok_or_else(|| ValidationError::InvalidId(id.to_string()))?;
        let date = parse_draw_date(date.trim())?;
        Ok(Self {
            id: id.to_string(),
            sequence,
            date,
            front: to_front(front)?,
            back: to_back(back)?,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The id as a draw sequence number (the ordering key).
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// The draw date as `YYYY-MM-DD`.
    pub fn date_string(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn front(&self) -> &[u8; FRONT_COUNT] {
        &self.front
    }

    pub fn back(&self) -> &[u8; BACK_COUNT] {
        &self.back
    }

    pub fn numbers(&self, zone: Zone) -> &[u8] {
        match zone {
            Zone::Front => &self.front,
            Zone::Back => &self.back,
        }
    }

    /// Sum of the front-zone numbers.
    pub fn front_sum(&self) -> u32 {
        self.front.iter().map(|&n| n as u32).sum()
    }

    /// Compare by sequence number. Ids are unique in a canonical
    /// history, so this never returns `Equal` for distinct records there.
    pub fn cmp_by_id(&self, other: &Self) -> Ordering {
        self.sequence.cmp(&other.sequence)
    }
}

impl TryFrom<RawDraw> for DrawRecord {
    type Error = ValidationError;

    fn try_from(raw: RawDraw) -> Result<Self, Self::Error> {
        DrawRecord::new(&raw.id, &raw.date, &raw.front, &raw.back)
    }
}

impl From<DrawRecord> for RawDraw {
    fn from(d: DrawRecord) -> Self {
        RawDraw {
            date: d.date_string(),
            front: d.front.iter().map(|&n| n as u32).collect(),
            back: d.back.iter().map(|&n| n as u32).collect(),
            id: d.id,
        }
    }
}

impl fmt::Display for DrawRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({}): ", self.id, self.date_string())?;
        let front: Vec<String> = self.front.iter().map(|n| format!("{n:02}")).collect();
        let back: Vec<String> = self.back.iter().map(|n| format!("{n:02}")).collect();
        write!(f, "{} + {}", front.join(" "), back.join(" "))
    }
}

// ---------------------------------------------------------------------------
// Ticket
// ---------------------------------------------------------------------------

/// A candidate combination to evaluate against history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTicket", into = "RawTicket")]
pub struct Ticket {
    front: [u8; FRONT_COUNT],
    back: [u8; BACK_COUNT],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTicket {
    pub front: Vec<u32>,
    pub back: Vec<u32>,
}

impl Ticket {
    pub fn new(front: &[u32], back: &[u32]) -> Result<Self, ValidationError> {
        Ok(Self {
            front: to_front(front)?,
            back: to_back(back)?,
        })
    }

    /// Build from a flat 7-number combination: 5 front numbers then 2 back.
    pub fn from_combination(numbers: &[u32]) -> Result<Self, ValidationError> {
        if numbers.len() != FRONT_COUNT + BACK_COUNT {
            return Err(ValidationError::WrongCount {
                zone: Zone::Front,
                expected: FRONT_COUNT + BACK_COUNT,
                found: numbers.len(),
            });
        }
        Self::new(&numbers[..FRONT_COUNT], &numbers[FRONT_COUNT..])
    }

    pub fn front(&self) -> &[u8; FRONT_COUNT] {
        &self.front
    }

    pub fn back(&self) -> &[u8; BACK_COUNT] {
        &self.back
    }
}

impl TryFrom<RawTicket> for Ticket {
    type Error = ValidationError;

    fn try_from(raw: RawTicket) -> Result<Self, Self::Error> {
        Ticket::new(&raw.front, &raw.back)
    }
}

impl From<Ticket> for RawTicket {
    fn from(t: Ticket) -> Self {
        RawTicket {
            front: t.front.iter().map(|&n| n as u32).collect(),
            back: t.back.iter().map(|&n| n as u32).collect(),
        }
    }
}

/// Parse `"1,5,10,20,30+2,11"`.
impl FromStr for Ticket {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (front, back) = s.split_once('+').unwrap_or((s, ""));
        Ticket::new(&parse_number_list(front)?, &parse_number_list(back)?)
    }
}

/// Parse a comma-separated list of numbers. Blank input is an empty list.
pub fn parse_number_list(s: &str) -> Result<Vec<u32>, ValidationError> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<u32>().map_err(|_| ValidationError::NotANumber(p.to_string())))
        .collect()
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let front: Vec<String> = self.front.iter().map(|n| n.to_string()).collect();
        let back: Vec<String> = self.back.iter().map(|n| n.to_string()).collect();
        write!(f, "{}+{}", front.join(","), back.join(","))
    }
}

// ---------------------------------------------------------------------------
// Prize tiers
// ---------------------------------------------------------------------------

/// One of the nine prize tiers, 1 (best) through 9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Tier(u8);

impl Tier {
    pub const ALL: [Tier; 9] = [
        Tier(1), Tier(2), Tier(3), Tier(4), Tier(5), Tier(6), Tier(7), Tier(8), Tier(9),
    ];

    pub fn new(n: u8) -> Option<Self> {
        (1..=9).contains(&n).then_some(Tier(n))
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    /// Official display name.
    pub fn name(&self) -> &'static str {
        match self.0 {
            1 => "一等奖",
            2 => "二等奖",
            3 => "三等奖",
            4 => "四等奖",
            5 => "五等奖",
            6 => "六等奖",
            7 => "七等奖",
            8 => "八等奖",
            _ => "九等奖",
        }
    }
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Tier::new(n).ok_or_else(|| format!("tier {n} out of range 1-9"))
    }
}

impl From<Tier> for u8 {
    fn from(t: Tier) -> Self {
        t.0
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// History snapshot
// ---------------------------------------------------------------------------

/// An immutable view of the canonical history at one version.
#[derive(Debug, Clone, Serialize)]
pub struct HistorySnapshot {
    /// Bumped each time reconciliation changes the history.
    pub version: u64,
    pub draws: Vec<DrawRecord>,
    pub updated_at: DateTime<Utc>,
}

impl HistorySnapshot {
    /// Version 0 means "not yet initialised".
    pub fn empty() -> Self {
        Self {
            version: 0,
            draws: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    /// The newest draw.
    pub fn latest(&self) -> Option<&DrawRecord> {
        self.draws.first()
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// A record or ticket that violates the draw invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid draw id '{0}': expected a numeric sequence number")]
    InvalidId(String),

    #[error("invalid draw date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("'{0}' is not a number")]
    NotANumber(String),

    #[error("{zone} zone needs {expected} numbers, got {found}")]
    WrongCount { zone: Zone, expected: usize, found: usize },

    #[error("{zone} zone number {number} out of range 1-{max}")]
    OutOfRange { zone: Zone, number: u32, max: u8 },

    #[error("{zone} zone number {number} appears more than once")]
    Duplicate { zone: Zone, number: u32 },
}

/// One data source could not produce records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("{source_name}: request timed out after {secs}s")]
    Timeout { source_name: String, secs: u64 },

    #[error("{source_name}: HTTP {status}")]
    Status { source_name: String, status: u16 },

    #[error("{source_name}: request failed: {message}")]
    Transport { source_name: String, message: String },

    #[error("{source_name}: unexpected content ({message})")]
    InvalidContent { source_name: String, message: String },

    #[error("{source_name}: only {found} well-formed records, need more than {threshold}")]
    TooFewRecords { source_name: String, found: usize, threshold: usize },

    #[error("{source_name}: all {attempts} attempts failed, last error: {last}")]
    Exhausted { source_name: String, attempts: usize, last: String },
}

/// Persistence failures for the canonical history file.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt history file {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialise history: {0}")]
    Serialise(#[source] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Build a record from literals, panicking on invalid input. Test-only.
#[cfg(test)]
pub fn draw(id: &str, date: &str, front: [u32; 5], back: [u32; 2]) -> DrawRecord {
    DrawRecord::new(id, date, &front, &back).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
