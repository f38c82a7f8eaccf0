// Read-only consumers of the engine output: headline figures, table rows
// for export/preview, and the priority-region brief. Nothing here feeds
// back into the allocation.

use crate::types::{
    EngineOutput, HeadlineSummary, RegionAllocation, RegionTableRow, TrendPoint, TrendTableRow,
};
use crate::util::{format_int, format_number, format_rupiah_billions};
use std::cmp::Ordering;
use std::fmt::Write as _;

/// The region to triage first: largest financial loss, deaths as the
/// tie-break.
pub fn priority_region(allocations: &[RegionAllocation]) -> Option<&RegionAllocation> {
    allocations.iter().max_by(|a, b| {
        a.financial_loss_billions
            .partial_cmp(&b.financial_loss_billions)
            .unwrap_or(Ordering::Equal)
            .then(a.deaths.cmp(&b.deaths))
    })
}

/// Mean daily loss increment implied by the cumulative trend.
pub fn average_daily_loss(trend: &[TrendPoint]) -> f64 {
    match trend.last() {
        Some(end) => end.loss_cumulative_billions / trend.len() as f64,
        None => 0.0,
    }
}

pub fn headline_summary(output: &EngineOutput) -> HeadlineSummary {
    let priority = priority_region(&output.allocations)
        .map(|r| r.region.clone())
        .unwrap_or_else(|| "(none)".to_string());
    HeadlineSummary {
        total_deaths: output.totals.deaths,
        total_displaced: output.totals.displaced,
        total_loss_billions: output.totals.financial_loss_billions,
        total_units_damaged: output.totals.total_units_damaged(),
        priority_region: priority,
        avg_daily_loss_billions: average_daily_loss(&output.trend),
    }
}

pub fn region_table_rows(allocations: &[RegionAllocation]) -> Vec<RegionTableRow> {
    allocations
        .iter()
        .map(|r| RegionTableRow {
            region: r.region.clone(),
            disaster_type: r.disaster_type.to_string(),
            deaths: format_int(r.deaths),
            displaced: format_int(r.displaced),
            bridges_damaged: format_int(r.bridges_damaged),
            schools_damaged: format_int(r.schools_damaged),
            health_facilities_damaged: format_int(r.health_facilities_damaged),
            total_units_damaged: format_int(r.total_units_damaged),
            loss_billions: format_number(r.financial_loss_billions, 2),
        })
        .collect()
}

pub fn trend_table_rows(trend: &[TrendPoint]) -> Vec<TrendTableRow> {
    trend
        .iter()
        .map(|p| TrendTableRow {
            date: p.date.format("%Y-%m-%d").to_string(),
            deaths_cumulative: format_int(p.deaths_cumulative),
            displaced_cumulative: format_int(p.displaced_cumulative),
            loss_cumulative_billions: format_number(p.loss_cumulative_billions, 2),
        })
        .collect()
}

/// Console rendition of the command-center brief: priority focus, relief and
/// reconstruction actions, recovery gap.
pub fn render_priority_brief(output: &EngineOutput) -> String {
    let Some(p) = priority_region(&output.allocations) else {
        return "No regions configured.\n".to_string();
    };
    let mut s = String::new();
    let _ = writeln!(s, "CURRENT PRIORITY FOCUS");
    let _ = writeln!(s, "  Primary priority region: {}", p.region.to_uppercase());
    let _ = writeln!(
        s,
        "  Basis: largest financial loss share and {} displaced persons.",
        format_int(p.displaced)
    );
    let _ = writeln!(s);
    let _ = writeln!(s, "Humanitarian actions (short term):");
    let _ = writeln!(
        s,
        "  1. Urgent aid distribution for {} displaced in {} (food, clean water, shelter).",
        format_int(p.displaced),
        p.region
    );
    let _ = writeln!(
        s,
        "  2. Emergency health services around the {} damaged health facilities.",
        format_int(p.health_facilities_damaged)
    );
    let _ = writeln!(
        s,
        "  3. Psychosocial support for the families of the {} dead province-wide.",
        format_int(output.totals.deaths)
    );
    let _ = writeln!(s);
    let _ = writeln!(s, "Reconstruction and mitigation (medium term):");
    let _ = writeln!(
        s,
        "  1. Repair the {} damaged bridges in {} to restore logistics access.",
        format_int(p.bridges_damaged),
        p.region
    );
    let _ = writeln!(
        s,
        "  2. Fast inventory of the {} damaged schools so classes can resume.",
        format_int(p.schools_damaged)
    );
    let _ = writeln!(s, "  3. Reforest upstream catchments against repeat flash floods.");
    let _ = writeln!(s);
    let _ = writeln!(
        s,
        "Recovery gap: estimated loss of {} concentrated in {}.",
        format_rupiah_billions(p.financial_loss_billions),
        p.region
    );
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine;
    use crate::loader;
    use crate::types::{DriftCorrectionPolicy, RegionWeights, TrendBasis};

    fn output() -> EngineOutput {
        let (totals, _) = loader::load_totals(loader::DEFAULT_RECORD_SET).unwrap();
        engine::run(
            &totals,
            &RegionWeights::west_sumatra_default(),
            DriftCorrectionPolicy::default(),
            &TrendBasis::west_sumatra_default(),
        )
        .unwrap()
    }

    #[test]
    fn priority_region_has_the_largest_loss() {
        let out = output();
        let p = priority_region(&out.allocations).unwrap();
        assert_eq!(p.region, "Lima Puluh Kota");
        for r in &out.allocations {
            assert!(r.financial_loss_billions <= p.financial_loss_billions);
        }
    }

    #[test]
    fn headline_mirrors_the_authoritative_totals() {
        let out = output();
        let h = headline_summary(&out);
        assert_eq!(h.total_deaths, 176);
        assert_eq!(h.total_displaced, 137_383);
        assert_eq!(h.total_units_damaged, 244);
        assert_eq!(h.priority_region, "Lima Puluh Kota");
        assert!((h.avg_daily_loss_billions - h.total_loss_billions / 5.0).abs() < 1e-9);
    }

    #[test]
    fn table_rows_are_one_to_one_with_engine_rows() {
        let out = output();
        let rows = region_table_rows(&out.allocations);
        assert_eq!(rows.len(), out.allocations.len());
        assert_eq!(rows[0].region, "Lima Puluh Kota");
        assert_eq!(rows[0].disaster_type, "Flash Flood");
        let trend_rows = trend_table_rows(&out.trend);
        assert_eq!(trend_rows.len(), 5);
        assert_eq!(trend_rows[0].date, "2025-12-01");
        assert_eq!(trend_rows[4].deaths_cumulative, "176");
    }

    #[test]
    fn brief_names_the_priority_region() {
        let out = output();
        let brief = render_priority_brief(&out);
        assert!(brief.contains("LIMA PULUH KOTA"));
        assert!(brief.contains("displaced"));
    }
}
