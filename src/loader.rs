use crate::errors::EngineError;
use crate::types::{AuthoritativeTotals, RawAggregateRow};
use crate::util::{parse_f64_safe, parse_u64_safe};
use csv::ReaderBuilder;
use std::collections::{HashMap, HashSet};

// Exact subcategory names in the agency's record set. Lookup is literal:
// no trimming beyond outer whitespace, no fuzzy matching.
pub const KEY_DEATHS: &str = "Meninggal Total";
pub const KEY_DISPLACED: &str = "Mengungsi";
pub const KEY_BRIDGES: &str = "Jembatan Rusak";
pub const KEY_SCHOOLS: &str = "Sekolah";
pub const KEY_HEALTH_FACILITIES: &str = "Fasilitas Kesehatan";
pub const KEY_FINANCIAL_LOSS: &str = "Taksiran Kerugian Total";

/// The loss total is published in raw Rupiah; all reporting is in billions.
const RUPIAH_PER_BILLION: f64 = 1_000_000_000.0;

/// The December 2025 West Sumatra aggregate release, embedded so the binary
/// runs without any files on disk. A same-shaped CSV on disk takes
/// precedence when present (see `main.rs`).
pub const DEFAULT_RECORD_SET: &str = "\
Kategori,Sub_Kategori,Satuan,Nilai
Korbang Jiwa,Meninggal Total,Jiwa,176
Korbang Jiwa,Meninggal Teridentifikasi,Jiwa,140
Korbang Jiwa,Meninggal Belum Teridentifikasi,Jiwa,36
Korbang Jiwa,Hilang,Jiwa,117
Korbang Jiwa,Luka-Luka,Jiwa,112
Korbang Jiwa,Mengungsi,Jiwa,137383
Korbang Jiwa,Terdampak,Jiwa,141324
Kerusakan Rumah,Rusak Ringan,Unit,1827
Kerusakan Rumah,Rusak Sedang,Unit,660
Kerusakan Rumah,Rusak Berat,Unit,1092
Kerusakan Rumah,Terendam,Unit,0
Fasilitas Publik,Rumah Ibadah,Unit,86
Fasilitas Publik,Fasilitas Kesehatan,Unit,13
Fasilitas Publik,Kantor,Unit,16
Fasilitas Publik,Sekolah,Unit,110
Prasarana Vital,Jalan Rusak,Unit,7
Prasarana Vital,Jembatan Rusak,Unit,121
Dampak Ekonomi,Sawah,Ha,3473
Dampak Ekonomi,Lahan,Ha,2992
Dampak Ekonomi,Kebun,Ha,199
Dampak Ekonomi,Kolam,Ha,10483
Kerugian Finansial,Taksiran Kerugian Total,Rupiah,1072779241505
";

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub total_rows: usize,
    pub skipped_rows: usize,
    pub categories: usize,
    /// Distinct measurement units seen (Jiwa, Unit, Ha, Rupiah, ...).
    pub units: usize,
}

/// Parse the aggregate record set and extract the authoritative totals.
///
/// Pure read over an in-memory blob. Rows that lack a subcategory or value
/// are counted and skipped; a later row with the same subcategory overrides
/// an earlier one. Fails if any required subcategory is absent or its value
/// does not parse as a number.
pub fn load_totals(blob: &str) -> Result<(AuthoritativeTotals, LoadReport), EngineError> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(blob.as_bytes());
    let mut total_rows = 0usize;
    let mut skipped_rows = 0usize;
    let mut values: HashMap<String, String> = HashMap::new();
    let mut categories: HashSet<String> = HashSet::new();
    let mut units: HashSet<String> = HashSet::new();

    for result in rdr.deserialize::<RawAggregateRow>() {
        total_rows += 1;
        let row = match result {
            Ok(r) => r,
            Err(_) => {
                skipped_rows += 1;
                continue;
            }
        };
        let (Some(sub), Some(value)) = (row.subcategory, row.value) else {
            skipped_rows += 1;
            continue;
        };
        if let Some(cat) = row.category {
            categories.insert(cat.trim().to_string());
        }
        if let Some(unit) = row.unit {
            units.insert(unit.trim().to_string());
        }
        values.insert(sub.trim().to_string(), value.trim().to_string());
    }

    let deaths = lookup_u64(&values, KEY_DEATHS)?;
    let displaced = lookup_u64(&values, KEY_DISPLACED)?;
    let bridges_damaged = lookup_u64(&values, KEY_BRIDGES)?;
    let schools_damaged = lookup_u64(&values, KEY_SCHOOLS)?;
    let health_facilities_damaged = lookup_u64(&values, KEY_HEALTH_FACILITIES)?;
    let financial_loss_rupiah = lookup_f64(&values, KEY_FINANCIAL_LOSS)?;

    let totals = AuthoritativeTotals {
        deaths,
        displaced,
        financial_loss_billions: financial_loss_rupiah / RUPIAH_PER_BILLION,
        bridges_damaged,
        schools_damaged,
        health_facilities_damaged,
    };
    let report =
        LoadReport { total_rows, skipped_rows, categories: categories.len(), units: units.len() };
    Ok((totals, report))
}

fn lookup_raw<'a>(values: &'a HashMap<String, String>, key: &str) -> Result<&'a str, EngineError> {
    values
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| EngineError::MissingKey(key.to_string()))
}

fn lookup_u64(values: &HashMap<String, String>, key: &str) -> Result<u64, EngineError> {
    let raw = lookup_raw(values, key)?;
    parse_u64_safe(Some(raw)).ok_or_else(|| EngineError::InvalidFormat {
        field: key.to_string(),
        value: raw.to_string(),
    })
}

fn lookup_f64(values: &HashMap<String, String>, key: &str) -> Result<f64, EngineError> {
    let raw = lookup_raw(values, key)?;
    parse_f64_safe(Some(raw)).ok_or_else(|| EngineError::InvalidFormat {
        field: key.to_string(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_record_set_yields_published_totals() {
        let (totals, report) = load_totals(DEFAULT_RECORD_SET).unwrap();
        assert_eq!(totals.deaths, 176);
        assert_eq!(totals.displaced, 137_383);
        assert_eq!(totals.bridges_damaged, 121);
        assert_eq!(totals.schools_damaged, 110);
        assert_eq!(totals.health_facilities_damaged, 13);
        assert_eq!(totals.total_units_damaged(), 244);
        assert!((totals.financial_loss_billions - 1072.779241505).abs() < 1e-9);
        assert_eq!(report.total_rows, 22);
        assert_eq!(report.skipped_rows, 0);
        assert_eq!(report.categories, 6);
        assert_eq!(report.units, 4);
    }

    #[test]
    fn missing_subcategory_is_reported_by_name() {
        let blob = "\
Kategori,Sub_Kategori,Satuan,Nilai
Korbang Jiwa,Meninggal Total,Jiwa,176
";
        let err = load_totals(blob).unwrap_err();
        assert_eq!(err, EngineError::MissingKey(KEY_DISPLACED.to_string()));
    }

    #[test]
    fn unparseable_value_is_invalid_format() {
        let blob = DEFAULT_RECORD_SET.replace(
            "Korbang Jiwa,Mengungsi,Jiwa,137383",
            "Korbang Jiwa,Mengungsi,Jiwa,banyak",
        );
        let err = load_totals(&blob).unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidFormat {
                field: KEY_DISPLACED.to_string(),
                value: "banyak".to_string(),
            }
        );
    }

    #[test]
    fn later_duplicate_row_overrides_earlier() {
        let blob = format!("{}Korbang Jiwa,Meninggal Total,Jiwa,200\n", DEFAULT_RECORD_SET);
        let (totals, _) = load_totals(&blob).unwrap();
        assert_eq!(totals.deaths, 200);
    }

    #[test]
    fn loading_is_a_pure_read() {
        let (a, _) = load_totals(DEFAULT_RECORD_SET).unwrap();
        let (b, _) = load_totals(DEFAULT_RECORD_SET).unwrap();
        assert_eq!(a, b);
    }
}
