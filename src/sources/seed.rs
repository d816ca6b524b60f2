//! Built-in seed history, used when there is no usable cache so the
//! backtest has something to work with before the first sync.

use crate::types::DrawRecord;

const SEED: &[(&str, &str, [u32; 5], [u32; 2])] = &[
    ("24025", "2024-03-04", [1, 5, 10, 20, 30], [2, 11]),
    ("24024", "2024-03-02", [3, 8, 15, 24, 33], [6, 7]),
    ("24023", "2024-02-28", [2, 11, 19, 26, 35], [3, 10]),
    ("24022", "2024-02-26", [7, 13, 22, 29, 31], [1, 8]),
    ("24021", "2024-02-24", [4, 9, 16, 25, 34], [5, 12]),
];

/// The seed draws, newest first. Entries that fail validation are skipped.
pub fn seed_draws() -> Vec<DrawRecord> {
    SEED.iter()
        .filter_map(|(id, date, front, back)| DrawRecord::new(id, date, front, back).ok())
        .collect()
}
