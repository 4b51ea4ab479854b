use crate::types::{Field, Record};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Rankings are only computed for groups larger than this.
const RANKING_MIN_EXCLUSIVE: usize = 5;
/// Groups larger than this get the long ranking.
const LONG_RANKING_MIN_EXCLUSIVE: usize = 30;
const SHORT_RANKING_LEN: usize = 3;
const LONG_RANKING_LEN: usize = 5;

/// Statistics over a non-empty group of records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub record_count: usize,
    pub total_population: u64,
    pub occupation_counts: BTreeMap<String, usize>,
    pub most_common_occupation: Option<String>,
    pub occupation_valid_count: usize,
    pub richest_family: Option<String>,
    pub top_ids: Vec<i64>,
    pub top_ids_details: BTreeMap<i64, Holder>,
}

/// A ranked household as shown in the top-assets list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holder {
    #[serde(rename = "NAME")]
    pub name: Option<String>,
    #[serde(rename = "PATRONYMIC")]
    pub patronymic: Option<String>,
    #[serde(rename = "FAMILY")]
    pub family: Option<String>,
    #[serde(rename = "TOTAL_ASSETS")]
    pub total_assets: f64,
}

impl From<&Record> for Holder {
    fn from(record: &Record) -> Self {
        Self {
            name: record.name.clone(),
            patronymic: record.patronymic.clone(),
            family: record.family.clone(),
            total_assets: record.assets(),
        }
    }
}

pub fn summarize(records: &[&Record]) -> Summary {
    let occupations = occupation_tally(records);
    let top = top_holders(records);

    Summary {
        record_count: records.len(),
        total_population: total_population(records),
        most_common_occupation: occupations
            .mode()
            .map(|(occupation, count)| format!("{} - {} householders", occupation, count)),
        occupation_valid_count: occupations.valid,
        occupation_counts: occupations
            .counts
            .into_iter()
            .map(|(occupation, count)| (occupation.to_string(), count))
            .collect(),
        richest_family: richest_family(records)
            .map(|(family, assets)| format!("{} - {} florins of assets", family, assets)),
        top_ids: top.iter().map(|record| record.id).collect(),
        top_ids_details: top.iter().map(|record| (record.id, Holder::from(*record))).collect(),
    }
}

pub fn total_population(records: &[&Record]) -> u64 {
    records
        .iter()
        .fold(0u64, |total, record| total.saturating_add(record.population()))
}

/// Distinct non-empty popoli in the group.
pub fn unique_popoli_count(records: &[&Record]) -> usize {
    records
        .iter()
        .filter_map(|record| record.non_empty(Field::Popolo))
        .collect::<HashSet<_>>()
        .len()
}

#[derive(Debug, Default)]
struct OccupationTally<'a> {
    counts: HashMap<&'a str, usize>,
    first_seen: Vec<&'a str>,
    valid: usize,
}

impl<'a> OccupationTally<'a> {
    // Ties go to the occupation seen first.
    fn mode(&self) -> Option<(&'a str, usize)> {
        let mut best: Option<(&str, usize)> = None;
        for &occupation in &self.first_seen {
            let count = self.counts[occupation];
            if best.map_or(true, |(_, top)| count > top) {
                best = Some((occupation, count));
            }
        }
        best
    }
}

fn occupation_tally<'a>(records: &[&'a Record]) -> OccupationTally<'a> {
    let mut tally = OccupationTally::default();
    for occupation in records.iter().filter_map(|r| r.non_empty(Field::Occupation)) {
        let count = tally.counts.entry(occupation).or_insert(0);
        if *count == 0 {
            tally.first_seen.push(occupation);
        }
        *count += 1;
        tally.valid += 1;
    }
    tally
}

/// Family with the largest summed assets; ties go to the family seen first.
pub fn richest_family<'a>(records: &[&'a Record]) -> Option<(&'a str, f64)> {
    let mut order: Vec<&str> = Vec::new();
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for record in records {
        if let Some(family) = record.non_empty(Field::Family) {
            let total = totals.entry(family).or_insert_with(|| {
                order.push(family);
                0.0
            });
            *total += record.assets();
        }
    }

    let mut best: Option<(&str, f64)> = None;
    for family in order {
        let total = totals[family];
        if best.map_or(true, |(_, top)| total > top) {
            best = Some((family, total));
        }
    }
    best
}

/// How many households the asset ranking shows for a group of `count`.
pub fn ranking_len(count: usize) -> usize {
    if count <= RANKING_MIN_EXCLUSIVE {
        0
    } else if count > LONG_RANKING_MIN_EXCLUSIVE {
        LONG_RANKING_LEN
    } else {
        SHORT_RANKING_LEN
    }
}

/// Richest households first; equal assets keep their input order.
pub fn top_holders<'a>(records: &[&'a Record]) -> Vec<&'a Record> {
    let len = ranking_len(records.len());
    if len == 0 {
        return Vec::new();
    }
    let mut ranked: Vec<&Record> = records.to_vec();
    // sort_by is stable.
    ranked.sort_by(|a, b| b.assets().total_cmp(&a.assets()));
    ranked.truncate(len);
    ranked
}
