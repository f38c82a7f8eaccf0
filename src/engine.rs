//! Proportional allocation with exact-sum reconciliation.
//!
//! Every integer metric is distributed over the region weight table and then
//! drift-corrected so the per-region values sum back to the authoritative
//! total exactly. The decimal loss metric is allocated unrounded, so its sum
//! matches to floating-point tolerance without correction. The synthetic
//! daily trend is rescaled from a basis shape and endpoint-reconciled the
//! same way.
//!
//! All rounding is `f64::round` (half away from zero; inputs are
//! non-negative, so effectively half-up), applied identically to every
//! metric and trend point.

use crate::errors::EngineError;
use crate::loader;
use crate::types::{
    AuthoritativeTotals, DriftCorrectionPolicy, EngineOutput, RegionAllocation, RegionWeight,
    RegionWeights, TrendBasis, TrendBasisPoint, TrendPoint,
};
use chrono::Duration;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Distribute an integer total over the weight table.
///
/// The rounding drift lands where the policy says. Under `AssignToLast` the
/// designated region absorbs the entire remainder; if a negative remainder
/// would push it below zero, the shortfall spills backwards through the
/// preceding regions, so the result is non-negative and still sums exactly
/// to `total`.
pub fn allocate_integer_metric(
    total: u64,
    weights: &[RegionWeight],
    policy: DriftCorrectionPolicy,
) -> Result<Vec<u64>, EngineError> {
    if weights.is_empty() {
        return Err(EngineError::EmptyInput);
    }
    let weight_sum: f64 = weights.iter().map(|w| w.weight).sum();
    if weight_sum <= 0.0 {
        return Err(EngineError::DivisionByZero("region weight table sums to zero"));
    }

    let factor = total as f64 / weight_sum;
    let exact: Vec<f64> = weights.iter().map(|w| w.weight * factor).collect();
    let mut alloc: Vec<i64> = exact.iter().map(|x| x.round() as i64).collect();
    let drift = total as i64 - alloc.iter().sum::<i64>();

    match policy {
        DriftCorrectionPolicy::AssignToLast => {
            let mut remaining = drift;
            for i in (0..alloc.len()).rev() {
                let adjusted = alloc[i] + remaining;
                if adjusted >= 0 {
                    alloc[i] = adjusted;
                    remaining = 0;
                    break;
                }
                // Zero this region out and carry the shortfall backwards.
                remaining = adjusted;
                alloc[i] = 0;
            }
            debug_assert_eq!(remaining, 0);
        }
        DriftCorrectionPolicy::AssignToLargestRemainder => {
            if drift != 0 {
                let mut order: Vec<usize> = (0..alloc.len()).collect();
                order.sort_by(|&a, &b| {
                    let ra = exact[a] - alloc[a] as f64;
                    let rb = exact[b] - alloc[b] as f64;
                    let cmp = if drift > 0 {
                        rb.partial_cmp(&ra)
                    } else {
                        ra.partial_cmp(&rb)
                    };
                    cmp.unwrap_or(Ordering::Equal)
                });
                let step: i64 = if drift > 0 { 1 } else { -1 };
                let mut remaining = drift;
                let mut idx = 0usize;
                while remaining != 0 {
                    let i = order[idx % order.len()];
                    idx += 1;
                    if step < 0 && alloc[i] == 0 {
                        continue;
                    }
                    alloc[i] += step;
                    remaining -= step;
                }
            }
        }
    }

    Ok(alloc.into_iter().map(|v| v as u64).collect())
}

/// Distribute a decimal total over the weight table, unrounded. No drift
/// correction is needed; the values sum to `total` up to floating-point
/// tolerance.
pub fn allocate_decimal_metric(total: f64, weights: &[RegionWeight]) -> Result<Vec<f64>, EngineError> {
    if weights.is_empty() {
        return Err(EngineError::EmptyInput);
    }
    let weight_sum: f64 = weights.iter().map(|w| w.weight).sum();
    if weight_sum <= 0.0 {
        return Err(EngineError::DivisionByZero("region weight table sums to zero"));
    }
    let factor = total / weight_sum;
    Ok(weights.iter().map(|w| w.weight * factor).collect())
}

/// Build the full per-region allocation table. Each integer metric is
/// allocated independently against the same weight table; the damage-unit
/// total per region is derived from the three reconciled counts rather than
/// allocated on its own, which preserves its relationship to the
/// authoritative sum by construction.
pub fn allocate(
    totals: &AuthoritativeTotals,
    weights: &RegionWeights,
    policy: DriftCorrectionPolicy,
) -> Result<Vec<RegionAllocation>, EngineError> {
    let entries = weights.entries();
    let deaths = allocate_integer_metric(totals.deaths, entries, policy)?;
    let displaced = allocate_integer_metric(totals.displaced, entries, policy)?;
    let bridges = allocate_integer_metric(totals.bridges_damaged, entries, policy)?;
    let schools = allocate_integer_metric(totals.schools_damaged, entries, policy)?;
    let health = allocate_integer_metric(totals.health_facilities_damaged, entries, policy)?;
    let loss = allocate_decimal_metric(totals.financial_loss_billions, entries)?;

    let rows = entries
        .iter()
        .enumerate()
        .map(|(i, w)| RegionAllocation {
            region: w.name.clone(),
            disaster_type: w.disaster_type,
            deaths: deaths[i],
            displaced: displaced[i],
            bridges_damaged: bridges[i],
            schools_damaged: schools[i],
            health_facilities_damaged: health[i],
            total_units_damaged: bridges[i] + schools[i] + health[i],
            financial_loss_billions: loss[i],
        })
        .collect();
    Ok(rows)
}

/// Scale the trend basis so its final point lands on the authoritative
/// totals, then overwrite the last point outright. The overwrite is the
/// reconciliation contract: whatever shape the basis had, the series ends
/// exactly on the published figures, for the loss field as well as the two
/// count fields.
pub fn build_trend(
    totals: &AuthoritativeTotals,
    basis: &TrendBasis,
) -> Result<Vec<TrendPoint>, EngineError> {
    let (start, points) = match basis {
        TrendBasis::Fixed { start, points } => (*start, points.clone()),
        TrendBasis::RandomWalk { start, days, seed } => (*start, random_walk_points(*days, *seed)),
    };
    if points.is_empty() {
        return Err(EngineError::EmptyInput);
    }

    let last = points[points.len() - 1];
    if last.deaths <= 0.0 {
        return Err(EngineError::DivisionByZero("trend basis final deaths value is zero"));
    }
    if last.displaced <= 0.0 {
        return Err(EngineError::DivisionByZero("trend basis final displaced value is zero"));
    }
    if last.loss <= 0.0 {
        return Err(EngineError::DivisionByZero("trend basis final loss value is zero"));
    }

    let f_deaths = totals.deaths as f64 / last.deaths;
    let f_displaced = totals.displaced as f64 / last.displaced;
    let f_loss = totals.financial_loss_billions / last.loss;

    let mut trend: Vec<TrendPoint> = points
        .iter()
        .enumerate()
        .map(|(i, p)| TrendPoint {
            date: start + Duration::days(i as i64),
            deaths_cumulative: (p.deaths * f_deaths).round() as u64,
            displaced_cumulative: (p.displaced * f_displaced).round() as u64,
            loss_cumulative_billions: p.loss * f_loss,
        })
        .collect();

    if let Some(end) = trend.last_mut() {
        end.deaths_cumulative = totals.deaths;
        end.displaced_cumulative = totals.displaced;
        end.loss_cumulative_billions = totals.financial_loss_billions;
    }
    Ok(trend)
}

/// Seeded non-decreasing random walk, one basis point per day. Determinism
/// given the seed keeps the engine idempotent.
fn random_walk_points(days: usize, seed: u64) -> Vec<TrendBasisPoint> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut acc = TrendBasisPoint { deaths: 0.0, displaced: 0.0, loss: 0.0 };
    let mut points = Vec::with_capacity(days);
    for _ in 0..days {
        acc.deaths += rng.gen_range(0.5..1.5);
        acc.displaced += rng.gen_range(0.5..1.5);
        acc.loss += rng.gen_range(0.5..1.5);
        points.push(acc);
    }
    points
}

/// One engine pass: allocation table plus trend series, both reconciled.
pub fn run(
    totals: &AuthoritativeTotals,
    weights: &RegionWeights,
    policy: DriftCorrectionPolicy,
    basis: &TrendBasis,
) -> Result<EngineOutput, EngineError> {
    let allocations = allocate(totals, weights, policy)?;
    let trend = build_trend(totals, basis)?;
    Ok(EngineOutput { totals: *totals, allocations, trend })
}

/// Single-slot memoization keyed by a fingerprint of every input. The engine
/// itself stays pure; the cache is an explicit value the caller owns, not a
/// hidden global, and recomputation is always safe.
#[derive(Debug, Default)]
pub struct EngineCache {
    key: Option<u64>,
    value: Option<EngineOutput>,
}

impl EngineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the cache currently holds a result for the given inputs.
    pub fn is_warm_for(
        &self,
        record_set: &str,
        weights: &RegionWeights,
        policy: DriftCorrectionPolicy,
        basis: &TrendBasis,
    ) -> bool {
        self.key == Some(fingerprint(record_set, weights, policy, basis)) && self.value.is_some()
    }

    /// Load the totals from the record set and run the engine, reusing the
    /// previous result when every input is unchanged.
    pub fn get_or_compute(
        &mut self,
        record_set: &str,
        weights: &RegionWeights,
        policy: DriftCorrectionPolicy,
        basis: &TrendBasis,
    ) -> Result<EngineOutput, EngineError> {
        let key = fingerprint(record_set, weights, policy, basis);
        if self.key == Some(key) {
            if let Some(cached) = &self.value {
                return Ok(cached.clone());
            }
        }
        let (totals, _) = loader::load_totals(record_set)?;
        let output = run(&totals, weights, policy, basis)?;
        self.key = Some(key);
        self.value = Some(output.clone());
        Ok(output)
    }
}

fn fingerprint(
    record_set: &str,
    weights: &RegionWeights,
    policy: DriftCorrectionPolicy,
    basis: &TrendBasis,
) -> u64 {
    let mut h = DefaultHasher::new();
    record_set.hash(&mut h);
    for w in weights.entries() {
        w.name.hash(&mut h);
        w.weight.to_bits().hash(&mut h);
        w.disaster_type.hash(&mut h);
    }
    policy.hash(&mut h);
    match basis {
        TrendBasis::Fixed { start, points } => {
            0u8.hash(&mut h);
            start.hash(&mut h);
            for p in points {
                p.deaths.to_bits().hash(&mut h);
                p.displaced.to_bits().hash(&mut h);
                p.loss.to_bits().hash(&mut h);
            }
        }
        TrendBasis::RandomWalk { start, days, seed } => {
            1u8.hash(&mut h);
            start.hash(&mut h);
            days.hash(&mut h);
            seed.hash(&mut h);
        }
    }
    h.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DisasterType;
    use chrono::NaiveDate;

    fn totals() -> AuthoritativeTotals {
        AuthoritativeTotals {
            deaths: 176,
            displaced: 137_383,
            financial_loss_billions: 1072.78,
            bridges_damaged: 121,
            schools_damaged: 110,
            health_facilities_damaged: 13,
        }
    }

    fn scenario_weights() -> RegionWeights {
        // The legacy table's two zero rows replaced by epsilon, per policy.
        let entries = [
            ("A", 30.0),
            ("B", 15.0),
            ("C", 8.0),
            ("D", 5.0),
            ("E", 4.0),
            ("F", 2.0),
            ("G", 1.0),
            ("H", 0.5),
            ("I", 0.5),
        ]
        .iter()
        .map(|&(name, w)| RegionWeight::new(name, w, DisasterType::Flood))
        .collect();
        RegionWeights::new(entries).unwrap()
    }

    #[test]
    fn deaths_reconcile_with_drift_on_last_region() {
        let weights = scenario_weights();
        let alloc = allocate_integer_metric(
            176,
            weights.entries(),
            DriftCorrectionPolicy::AssignToLast,
        )
        .unwrap();
        assert_eq!(alloc.iter().sum::<u64>(), 176);
        // factor = 176/66; the provisional rounds sum to 175, so the last
        // region absorbs +1 on top of its own rounded share of 1.
        assert_eq!(alloc, vec![80, 40, 21, 13, 11, 5, 3, 1, 2]);
    }

    #[test]
    fn every_integer_metric_reconciles_exactly() {
        let t = totals();
        let rows = allocate(&t, &scenario_weights(), DriftCorrectionPolicy::default()).unwrap();
        assert_eq!(rows.iter().map(|r| r.deaths).sum::<u64>(), t.deaths);
        assert_eq!(rows.iter().map(|r| r.displaced).sum::<u64>(), t.displaced);
        assert_eq!(rows.iter().map(|r| r.bridges_damaged).sum::<u64>(), t.bridges_damaged);
        assert_eq!(rows.iter().map(|r| r.schools_damaged).sum::<u64>(), t.schools_damaged);
        assert_eq!(
            rows.iter().map(|r| r.health_facilities_damaged).sum::<u64>(),
            t.health_facilities_damaged
        );
        assert_eq!(
            rows.iter().map(|r| r.total_units_damaged).sum::<u64>(),
            t.total_units_damaged()
        );
    }

    #[test]
    fn decimal_loss_reconciles_within_tolerance() {
        let t = totals();
        let rows = allocate(&t, &scenario_weights(), DriftCorrectionPolicy::default()).unwrap();
        let sum: f64 = rows.iter().map(|r| r.financial_loss_billions).sum();
        assert!((sum - t.financial_loss_billions).abs() < 1e-9);
        assert!(rows.iter().all(|r| r.financial_loss_billions >= 0.0));
    }

    #[test]
    fn derived_unit_total_matches_component_counts_per_region() {
        let rows = allocate(&totals(), &scenario_weights(), DriftCorrectionPolicy::default())
            .unwrap();
        for r in &rows {
            assert_eq!(
                r.total_units_damaged,
                r.bridges_damaged + r.schools_damaged + r.health_facilities_damaged
            );
        }
    }

    #[test]
    fn single_region_receives_everything() {
        let t = totals();
        let weights = RegionWeights::new(vec![RegionWeight::new(
            "OnlyRegion",
            1.0,
            DisasterType::Flood,
        )])
        .unwrap();
        let rows = allocate(&t, &weights, DriftCorrectionPolicy::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].deaths, t.deaths);
        assert_eq!(rows[0].displaced, t.displaced);
        assert_eq!(rows[0].bridges_damaged, t.bridges_damaged);
        assert_eq!(rows[0].total_units_damaged, t.total_units_damaged());
        assert!((rows[0].financial_loss_billions - t.financial_loss_billions).abs() < 1e-12);
    }

    #[test]
    fn zero_weight_sum_is_division_by_zero_not_nan() {
        let weights = RegionWeights::from_entries_unchecked(vec![
            RegionWeight::new("A", 0.0, DisasterType::Flood),
            RegionWeight::new("B", 0.0, DisasterType::Flood),
        ]);
        let err = allocate(&totals(), &weights, DriftCorrectionPolicy::default()).unwrap_err();
        assert!(matches!(err, EngineError::DivisionByZero(_)));
    }

    #[test]
    fn empty_region_list_is_rejected() {
        let weights = RegionWeights::from_entries_unchecked(Vec::new());
        let err = allocate(&totals(), &weights, DriftCorrectionPolicy::default()).unwrap_err();
        assert_eq!(err, EngineError::EmptyInput);
        assert_eq!(RegionWeights::new(Vec::new()).unwrap_err(), EngineError::EmptyInput);
    }

    #[test]
    fn non_positive_weight_is_rejected_by_the_validating_constructor() {
        let err = RegionWeights::new(vec![
            RegionWeight::new("A", 1.0, DisasterType::Flood),
            RegionWeight::new("B", 0.0, DisasterType::Flood),
        ])
        .unwrap_err();
        assert_eq!(err, EngineError::NonPositiveWeight("B".to_string()));
    }

    #[test]
    fn negative_drift_spills_backwards_without_going_negative() {
        // Four equal weights, total 2: every provisional round is 1, so the
        // drift is -2 and the correction has to walk past the last region.
        let entries: Vec<RegionWeight> = (0..4)
            .map(|i| RegionWeight::new(&format!("R{i}"), 1.0, DisasterType::Flood))
            .collect();
        let alloc =
            allocate_integer_metric(2, &entries, DriftCorrectionPolicy::AssignToLast).unwrap();
        assert_eq!(alloc.iter().sum::<u64>(), 2);
        assert_eq!(alloc, vec![1, 1, 0, 0]);
    }

    #[test]
    fn non_negativity_holds_for_awkward_totals() {
        let weights = scenario_weights();
        for total in [0u64, 1, 2, 3, 5, 7, 11, 65, 176, 137_383] {
            for policy in [
                DriftCorrectionPolicy::AssignToLast,
                DriftCorrectionPolicy::AssignToLargestRemainder,
            ] {
                let alloc = allocate_integer_metric(total, weights.entries(), policy).unwrap();
                assert_eq!(alloc.iter().sum::<u64>(), total, "total={total} policy={policy:?}");
            }
        }
    }

    #[test]
    fn largest_remainder_policy_stays_close_to_the_exact_shares() {
        let weights = scenario_weights();
        let factor = 176.0 / weights.total_weight();
        let alloc = allocate_integer_metric(
            176,
            weights.entries(),
            DriftCorrectionPolicy::AssignToLargestRemainder,
        )
        .unwrap();
        assert_eq!(alloc.iter().sum::<u64>(), 176);
        for (a, w) in alloc.iter().zip(weights.entries()) {
            let exact = w.weight * factor;
            assert!((*a as f64 - exact).abs() <= 1.0, "{} vs {}", a, exact);
        }
    }

    #[test]
    fn trend_is_monotone_and_ends_on_the_totals() {
        let t = totals();
        let trend = build_trend(&t, &TrendBasis::west_sumatra_default()).unwrap();
        assert_eq!(trend.len(), 5);
        for pair in trend.windows(2) {
            assert!(pair[0].deaths_cumulative <= pair[1].deaths_cumulative);
            assert!(pair[0].displaced_cumulative <= pair[1].displaced_cumulative);
            assert!(pair[0].loss_cumulative_billions <= pair[1].loss_cumulative_billions);
            assert_eq!(pair[1].date - pair[0].date, Duration::days(1));
        }
        let end = trend.last().unwrap();
        assert_eq!(end.deaths_cumulative, t.deaths);
        assert_eq!(end.displaced_cumulative, t.displaced);
        assert_eq!(end.loss_cumulative_billions, t.financial_loss_billions);
    }

    #[test]
    fn random_walk_trend_is_deterministic_and_reconciled() {
        let t = totals();
        let basis = TrendBasis::RandomWalk {
            start: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
            days: 14,
            seed: 42,
        };
        let a = build_trend(&t, &basis).unwrap();
        let b = build_trend(&t, &basis).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 14);
        for pair in a.windows(2) {
            assert!(pair[0].deaths_cumulative <= pair[1].deaths_cumulative);
            assert!(pair[0].displaced_cumulative <= pair[1].displaced_cumulative);
            assert!(pair[0].loss_cumulative_billions <= pair[1].loss_cumulative_billions);
        }
        let end = a.last().unwrap();
        assert_eq!(end.deaths_cumulative, t.deaths);
        assert_eq!(end.displaced_cumulative, t.displaced);
        assert_eq!(end.loss_cumulative_billions, t.financial_loss_billions);
    }

    #[test]
    fn zero_final_basis_value_is_division_by_zero() {
        let basis = TrendBasis::Fixed {
            start: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
            points: vec![TrendBasisPoint { deaths: 0.0, displaced: 0.0, loss: 0.0 }],
        };
        let err = build_trend(&totals(), &basis).unwrap_err();
        assert!(matches!(err, EngineError::DivisionByZero(_)));
    }

    #[test]
    fn empty_trend_basis_is_rejected() {
        let basis = TrendBasis::Fixed {
            start: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
            points: Vec::new(),
        };
        assert_eq!(build_trend(&totals(), &basis).unwrap_err(), EngineError::EmptyInput);
        let basis = TrendBasis::RandomWalk {
            start: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
            days: 0,
            seed: 1,
        };
        assert_eq!(build_trend(&totals(), &basis).unwrap_err(), EngineError::EmptyInput);
    }

    #[test]
    fn engine_is_idempotent() {
        let t = totals();
        let weights = scenario_weights();
        let basis = TrendBasis::west_sumatra_default();
        let a = run(&t, &weights, DriftCorrectionPolicy::default(), &basis).unwrap();
        let b = run(&t, &weights, DriftCorrectionPolicy::default(), &basis).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn cache_reuses_results_until_an_input_changes() {
        let weights = RegionWeights::west_sumatra_default();
        let basis = TrendBasis::west_sumatra_default();
        let policy = DriftCorrectionPolicy::default();
        let mut cache = EngineCache::new();

        assert!(!cache.is_warm_for(loader::DEFAULT_RECORD_SET, &weights, policy, &basis));
        let first = cache
            .get_or_compute(loader::DEFAULT_RECORD_SET, &weights, policy, &basis)
            .unwrap();
        assert!(cache.is_warm_for(loader::DEFAULT_RECORD_SET, &weights, policy, &basis));
        let second = cache
            .get_or_compute(loader::DEFAULT_RECORD_SET, &weights, policy, &basis)
            .unwrap();
        assert_eq!(first, second);

        // A different record set invalidates the slot.
        let edited = loader::DEFAULT_RECORD_SET.replace(
            "Korbang Jiwa,Meninggal Total,Jiwa,176",
            "Korbang Jiwa,Meninggal Total,Jiwa,180",
        );
        assert!(!cache.is_warm_for(&edited, &weights, policy, &basis));
        let third = cache.get_or_compute(&edited, &weights, policy, &basis).unwrap();
        assert_eq!(third.totals.deaths, 180);
        assert!(!cache.is_warm_for(loader::DEFAULT_RECORD_SET, &weights, policy, &basis));
    }

    #[test]
    fn default_weight_table_passes_validation() {
        let weights = RegionWeights::west_sumatra_default();
        assert_eq!(weights.entries().len(), 9);
        assert!(weights.entries().iter().all(|w| w.weight > 0.0));
        assert!((weights.total_weight() - 66.0).abs() < 1e-12);
    }
}
