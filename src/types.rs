use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tabled::Tabled;

use crate::errors::EngineError;

/// One row of the authoritative aggregate record set, as it appears in the
/// CSV blob published by the provincial disaster agency.
#[derive(Debug, Deserialize)]
pub struct RawAggregateRow {
    #[serde(rename = "Kategori")]
    pub category: Option<String>,
    #[serde(rename = "Sub_Kategori")]
    pub subcategory: Option<String>,
    #[serde(rename = "Satuan")]
    pub unit: Option<String>,
    #[serde(rename = "Nilai")]
    pub value: Option<String>,
}

/// Province-wide totals extracted from the record set. Treated as ground
/// truth: every allocated table must sum back to these exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuthoritativeTotals {
    pub deaths: u64,
    pub displaced: u64,
    /// Estimated loss in billions of Rupiah (converted from raw Rupiah).
    pub financial_loss_billions: f64,
    pub bridges_damaged: u64,
    pub schools_damaged: u64,
    pub health_facilities_damaged: u64,
}

impl AuthoritativeTotals {
    pub fn total_units_damaged(&self) -> u64 {
        self.bridges_damaged + self.schools_damaged + self.health_facilities_damaged
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisasterType {
    Flood,
    FlashFlood,
    Landslide,
}

impl fmt::Display for DisasterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DisasterType::Flood => "Flood",
            DisasterType::FlashFlood => "Flash Flood",
            DisasterType::Landslide => "Landslide",
        };
        f.write_str(label)
    }
}

/// Static configuration: one entry per region of the province.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionWeight {
    pub name: String,
    pub weight: f64,
    pub disaster_type: DisasterType,
}

impl RegionWeight {
    pub fn new(name: &str, weight: f64, disaster_type: DisasterType) -> Self {
        Self { name: name.to_string(), weight, disaster_type }
    }
}

/// Injected region weight table. Weights need not sum to 1; the engine
/// normalizes internally. The validating constructor enforces the
/// positive-weight invariant; the engine independently rejects empty tables
/// and zero weight sums at compute time.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionWeights {
    entries: Vec<RegionWeight>,
}

impl RegionWeights {
    pub fn new(entries: Vec<RegionWeight>) -> Result<Self, EngineError> {
        if entries.is_empty() {
            return Err(EngineError::EmptyInput);
        }
        for e in &entries {
            if !e.weight.is_finite() || e.weight <= 0.0 {
                return Err(EngineError::NonPositiveWeight(e.name.clone()));
            }
        }
        Ok(Self { entries })
    }

    /// Skips the positive-weight check. Intended for callers that carry
    /// legacy tables with zero rows and handle the consequences themselves.
    pub fn from_entries_unchecked(entries: Vec<RegionWeight>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[RegionWeight] {
        &self.entries
    }

    pub fn total_weight(&self) -> f64 {
        self.entries.iter().map(|e| e.weight).sum()
    }

    /// The legacy 9-region West Sumatra breakdown. The last two regions
    /// carried weight 0 in the source table; they get a small epsilon weight
    /// here so the positive-weight invariant holds and they still receive a
    /// near-zero share.
    pub fn west_sumatra_default() -> Self {
        use DisasterType::*;
        Self {
            entries: vec![
                RegionWeight::new("Lima Puluh Kota", 30.0, FlashFlood),
                RegionWeight::new("Pesisir Selatan", 15.0, Flood),
                RegionWeight::new("Agam", 8.0, Landslide),
                RegionWeight::new("Tanah Datar", 5.0, FlashFlood),
                RegionWeight::new("Padang", 4.0, Flood),
                RegionWeight::new("Solok Selatan", 2.0, Landslide),
                RegionWeight::new("Padang Pariaman", 1.0, Flood),
                RegionWeight::new("Solok", 0.5, Flood),
                RegionWeight::new("Lainnya", 0.5, Landslide),
            ],
        }
    }
}

/// Where the rounding remainder of an integer metric lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DriftCorrectionPolicy {
    /// The whole remainder goes to the last region in iteration order.
    /// O(n), no second pass, but visibly skews that one region.
    #[default]
    AssignToLast,
    /// The remainder is spread one unit at a time toward the regions the
    /// rounding shaved the most (classic largest-remainder repair).
    AssignToLargestRemainder,
}

/// One per-region row of the reconciled allocation table.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionAllocation {
    pub region: String,
    pub disaster_type: DisasterType,
    pub deaths: u64,
    pub displaced: u64,
    pub bridges_damaged: u64,
    pub schools_damaged: u64,
    pub health_facilities_damaged: u64,
    /// Sum of the three damage counts above, never allocated independently.
    pub total_units_damaged: u64,
    pub financial_loss_billions: f64,
}

/// One day of the synthetic cumulative trend series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub deaths_cumulative: u64,
    pub displaced_cumulative: u64,
    pub loss_cumulative_billions: f64,
}

/// Relative cumulative magnitudes for one day of the trend basis. Only the
/// shape matters; the engine rescales everything to the authoritative totals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendBasisPoint {
    pub deaths: f64,
    pub displaced: f64,
    pub loss: f64,
}

/// Shape of the synthetic trend series. Both variants must be non-decreasing
/// per field; the random walk is by construction, fixed sequences by
/// convention of the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum TrendBasis {
    Fixed { start: NaiveDate, points: Vec<TrendBasisPoint> },
    /// Seeded so repeated runs with identical inputs stay bit-identical.
    RandomWalk { start: NaiveDate, days: usize, seed: u64 },
}

impl TrendBasis {
    /// The hand-authored 5-day sequence from the original briefing period.
    pub fn west_sumatra_default() -> Self {
        let start = NaiveDate::from_ymd_opt(2025, 12, 1).expect("valid calendar date");
        let points = [
            (10.0, 5000.0, 15.0),
            (25.0, 15000.0, 30.0),
            (40.0, 25000.0, 50.0),
            (55.0, 35000.0, 75.0),
            (65.0, 40000.0, 80.0),
        ]
        .iter()
        .map(|&(deaths, displaced, loss)| TrendBasisPoint { deaths, displaced, loss })
        .collect();
        TrendBasis::Fixed { start, points }
    }
}

/// Everything the presentation layer is allowed to see, read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    pub totals: AuthoritativeTotals,
    pub allocations: Vec<RegionAllocation>,
    pub trend: Vec<TrendPoint>,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct RegionTableRow {
    #[serde(rename = "Region")]
    #[tabled(rename = "Region")]
    pub region: String,
    #[serde(rename = "DisasterType")]
    #[tabled(rename = "DisasterType")]
    pub disaster_type: String,
    #[serde(rename = "Deaths")]
    #[tabled(rename = "Deaths")]
    pub deaths: String,
    #[serde(rename = "Displaced")]
    #[tabled(rename = "Displaced")]
    pub displaced: String,
    #[serde(rename = "BridgesDamaged")]
    #[tabled(rename = "BridgesDamaged")]
    pub bridges_damaged: String,
    #[serde(rename = "SchoolsDamaged")]
    #[tabled(rename = "SchoolsDamaged")]
    pub schools_damaged: String,
    #[serde(rename = "HealthFacilitiesDamaged")]
    #[tabled(rename = "HealthFacilitiesDamaged")]
    pub health_facilities_damaged: String,
    #[serde(rename = "TotalUnitsDamaged")]
    #[tabled(rename = "TotalUnitsDamaged")]
    pub total_units_damaged: String,
    #[serde(rename = "LossBillions")]
    #[tabled(rename = "LossBillions")]
    pub loss_billions: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct TrendTableRow {
    #[serde(rename = "Date")]
    #[tabled(rename = "Date")]
    pub date: String,
    #[serde(rename = "DeathsCumulative")]
    #[tabled(rename = "DeathsCumulative")]
    pub deaths_cumulative: String,
    #[serde(rename = "DisplacedCumulative")]
    #[tabled(rename = "DisplacedCumulative")]
    pub displaced_cumulative: String,
    #[serde(rename = "LossCumulativeBillions")]
    #[tabled(rename = "LossCumulativeBillions")]
    pub loss_cumulative_billions: String,
}

/// Headline figures for the summary JSON and the console banner.
#[derive(Debug, Serialize)]
pub struct HeadlineSummary {
    pub total_deaths: u64,
    pub total_displaced: u64,
    pub total_loss_billions: f64,
    pub total_units_damaged: u64,
    pub priority_region: String,
    pub avg_daily_loss_billions: f64,
}
