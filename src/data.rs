use crate::config::DatasetConfig;
use crate::types::Record;
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{error, info, warn};

/// The full catasto snapshot with an index by `id_C`.
///
/// Built once at startup and never mutated; a refresh would build a new one.
#[derive(Debug, Default)]
pub struct Dataset {
    records: Vec<Record>,
    by_id: HashMap<i64, usize>,
}

impl Dataset {
    pub fn from_records(mut records: Vec<Record>) -> Self {
        let mut by_id = HashMap::with_capacity(records.len());
        for (position, record) in records.iter_mut().enumerate() {
            // Records built in code have no source element, render one.
            if record.source.is_empty() {
                if let Ok(Value::Object(source)) = serde_json::to_value(&*record) {
                    record.source = source;
                }
            }
            // Later entries win, the scan endpoints still see both.
            if by_id.insert(record.id, position).is_some() {
                warn!("Duplicate id_C {} in dataset, indexing the last occurrence", record.id);
            }
        }
        Self { records, by_id }
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(Self::from_records(parse_records(content.as_bytes())?))
    }

    pub fn get(&self, id: i64) -> Option<&Record> {
        self.by_id.get(&id).map(|&position| &self.records[position])
    }

    /// The element for `id` exactly as the dataset published it.
    pub fn source(&self, id: i64) -> Option<&Map<String, Value>> {
        self.get(id).map(|record| &record.source)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Loads the dataset named by the config.
///
/// Never fails: any problem is logged and yields an empty dataset, so every
/// query afterwards answers "not found".
pub fn load_dataset(config: &DatasetConfig) -> Dataset {
    let loaded = match &config.path {
        Some(path) => {
            info!("Loading dataset from file {:?}", path);
            read_records(path)
        }
        None => {
            info!("Fetching dataset from {}", config.url);
            fetch_records(&config.url)
        }
    };

    match loaded {
        Ok(records) => {
            let dataset = Dataset::from_records(records);
            info!("Loaded {} records", dataset.len());
            dataset
        }
        Err(e) => {
            error!("Error loading dataset: {:#}", e);
            Dataset::default()
        }
    }
}

pub fn fetch_records(url: &str) -> Result<Vec<Record>> {
    let response = ureq::get(url)
        .call()
        .with_context(|| format!("Failed to fetch dataset from {}", url))?;
    parse_records(response.into_body().into_reader())
}

pub fn read_records(path: &Path) -> Result<Vec<Record>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open dataset file: {:?}", path))?;
    parse_records(BufReader::new(file))
}

/// Parses a JSON array of records, skipping elements that don't decode.
fn parse_records<R: Read>(reader: R) -> Result<Vec<Record>> {
    let value: Value = serde_json::from_reader(reader).context("Failed to parse dataset JSON")?;
    let elements = match value {
        Value::Array(elements) => elements,
        _ => return Err(anyhow!("Dataset must be a JSON array")),
    };

    let total = elements.len();
    let records: Vec<Record> = elements
        .into_iter()
        .filter_map(|element| {
            let mut record = Record::deserialize(&element).ok()?;
            if let Value::Object(source) = element {
                record.source = source;
            }
            Some(record)
        })
        .collect();

    let skipped = total - records.len();
    if skipped > 0 {
        warn!("Skipped {} of {} dataset entries that could not be decoded", skipped, total);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"[
        {"id_C": 1, "FAMILY": "Medici", "NAME": "Cosimo"},
        {"id_C": 2, "FAMILY": "Strozzi", "NAME": "Palla"},
        {"id_C": 3, "FAMILY": "Albizzi"}
    ]"#;

    #[test]
    fn lookup_by_id() {
        let dataset = Dataset::from_json_str(SAMPLE).unwrap();
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.get(2).and_then(|r| r.name.as_deref()), Some("Palla"));
        assert!(dataset.get(99).is_none());
    }

    #[test]
    fn source_element_is_kept_verbatim() {
        let element = serde_json::json!({
            "id_C": 1,
            "TOTAL_ASSETS": 100,
            "BOCCHE_M": null,
            "BOCCHE_F": "2",
            "TERM": 1427,
            "NOTES": "fol. 12r"
        });
        let dataset = Dataset::from_json_str(&format!("[{}]", element)).unwrap();

        assert_eq!(dataset.source(1).cloned().map(Value::Object), Some(element));
        assert_eq!(dataset.get(1).map(Record::population), Some(3));
        assert!(dataset.source(2).is_none());
    }

    #[test]
    fn built_records_get_a_rendered_source() {
        let mut record = Record::new(4);
        record.family = Some("Pazzi".to_string());
        let dataset = Dataset::from_records(vec![record]);

        assert_eq!(
            dataset.source(4).cloned().map(Value::Object),
            Some(serde_json::json!({"id_C": 4, "FAMILY": "Pazzi"}))
        );
    }

    #[test]
    fn preserves_source_order() {
        let dataset = Dataset::from_json_str(SAMPLE).unwrap();
        let ids: Vec<i64> = dataset.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn undecodable_entries_are_skipped() {
        let dataset = Dataset::from_json_str(
            r#"[{"id_C": 1}, {"NAME": "no id"}, {"id_C": "x"}, {"id_C": 4}]"#,
        )
        .unwrap();
        let ids: Vec<i64> = dataset.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn duplicate_ids_index_last_occurrence() {
        let dataset = Dataset::from_json_str(
            r#"[{"id_C": 7, "NAME": "first"}, {"id_C": 7, "NAME": "second"}]"#,
        )
        .unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(7).and_then(|r| r.name.as_deref()), Some("second"));
    }

    #[test]
    fn rejects_non_array_and_invalid_json() {
        assert!(Dataset::from_json_str(r#"{"id_C": 1}"#).is_err());
        assert!(Dataset::from_json_str("not json").is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = DatasetConfig {
            url: "http://unused.invalid/".to_string(),
            path: Some(file.path().to_path_buf()),
        };
        let dataset = load_dataset(&config);
        assert_eq!(dataset.len(), 3);
    }

    #[test]
    fn load_failure_degrades_to_empty() {
        let config = DatasetConfig {
            url: "http://unused.invalid/".to_string(),
            path: Some("/nonexistent/catasto.json".into()),
        };
        let dataset = load_dataset(&config);
        assert!(dataset.is_empty());
        assert!(dataset.get(1).is_none());
    }

    #[test]
    fn invalid_file_degrades_to_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"<html>maintenance</html>").unwrap();

        let config = DatasetConfig {
            url: "http://unused.invalid/".to_string(),
            path: Some(file.path().to_path_buf()),
        };
        assert!(load_dataset(&config).is_empty());
    }
}
