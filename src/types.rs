use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One household entry of the catasto survey.
///
/// JSON keys follow the published dataset. `source` holds the element exactly
/// as it was received, which is what the lookup endpoint hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "id_C")]
    pub id: i64,

    #[serde(rename = "NAME", default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "PATRONYMIC", default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub patronymic: Option<String>,
    #[serde(rename = "FAMILY", default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,

    #[serde(rename = "LOCATION", default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(rename = "QUARTER", default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub quarter: Option<String>,
    #[serde(rename = "GONF_PIVIERE", default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub gonfalone: Option<String>,
    #[serde(rename = "POPOLO", default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub popolo: Option<String>,

    #[serde(rename = "LAT", default, deserialize_with = "de_amount", skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(rename = "LONG", default, deserialize_with = "de_amount", skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    #[serde(rename = "BOCCHE_M", default, deserialize_with = "de_count", skip_serializing_if = "Option::is_none")]
    pub male_mouths: Option<u64>,
    #[serde(rename = "BOCCHE_F", default, deserialize_with = "de_count", skip_serializing_if = "Option::is_none")]
    pub female_mouths: Option<u64>,
    #[serde(rename = "BOCCHE_U", default, deserialize_with = "de_count", skip_serializing_if = "Option::is_none")]
    pub child_mouths: Option<u64>,

    #[serde(rename = "TOTAL_ASSETS", default, deserialize_with = "de_amount", skip_serializing_if = "Option::is_none")]
    pub total_assets: Option<f64>,
    #[serde(rename = "OCCUPATION", default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,

    #[serde(rename = "ELECTION", default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub election: Option<String>,
    #[serde(rename = "OFFICE", default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub office: Option<String>,
    #[serde(rename = "TERM", default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,

    #[serde(skip)]
    pub source: Map<String, Value>,
}

/// Text columns a filter can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Patronymic,
    Family,
    Location,
    Quarter,
    Gonfalone,
    Popolo,
    Occupation,
    Election,
    Office,
    Term,
}

impl Record {
    /// An empty record carrying only its identifier.
    pub fn new(id: i64) -> Self {
        Self {
            id,
            name: None,
            patronymic: None,
            family: None,
            location: None,
            quarter: None,
            gonfalone: None,
            popolo: None,
            latitude: None,
            longitude: None,
            male_mouths: None,
            female_mouths: None,
            child_mouths: None,
            total_assets: None,
            occupation: None,
            election: None,
            office: None,
            term: None,
            source: Map::new(),
        }
    }

    pub fn text(&self, field: Field) -> Option<&str> {
        let value = match field {
            Field::Name => &self.name,
            Field::Patronymic => &self.patronymic,
            Field::Family => &self.family,
            Field::Location => &self.location,
            Field::Quarter => &self.quarter,
            Field::Gonfalone => &self.gonfalone,
            Field::Popolo => &self.popolo,
            Field::Occupation => &self.occupation,
            Field::Election => &self.election,
            Field::Office => &self.office,
            Field::Term => &self.term,
        };
        value.as_deref()
    }

    /// Like [`Record::text`], but blank strings count as absent.
    pub fn non_empty(&self, field: Field) -> Option<&str> {
        self.text(field).filter(|s| !s.is_empty())
    }

    /// Household size: every mouth plus the head of household.
    pub fn population(&self) -> u64 {
        [self.male_mouths, self.female_mouths, self.child_mouths]
            .into_iter()
            .fold(1u64, |total, mouths| total.saturating_add(mouths.unwrap_or(0)))
    }

    /// Whether the source element carried `key` at all, even as `null`.
    pub fn has_key(&self, key: &str) -> bool {
        self.source.contains_key(key)
    }

    pub fn assets(&self) -> f64 {
        self.total_assets.unwrap_or(0.0)
    }
}

// Text columns sometimes carry bare numbers (e.g. terms); keep them as text.
fn de_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn de_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let amount = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    // "NaN" and "inf" parse as f64 but are not amounts. -0.0 folds into 0.0
    // so rankings see the two as equal.
    Ok(amount
        .filter(|v| v.is_finite())
        .map(|v| if v == 0.0 { 0.0 } else { v }))
}

fn de_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_published_keys() {
        let record: Record = serde_json::from_value(json!({
            "id_C": 17,
            "NAME": "Cosimo",
            "PATRONYMIC": "Giovanni",
            "FAMILY": "Medici",
            "POPOLO": "San Lorenzo",
            "LAT": 43.7747,
            "LONG": 11.2536,
            "BOCCHE_M": 3,
            "BOCCHE_F": 2,
            "BOCCHE_U": 1,
            "TOTAL_ASSETS": 1250.5,
            "OCCUPATION": "banker"
        }))
        .unwrap();

        assert_eq!(record.id, 17);
        assert_eq!(record.text(Field::Family), Some("Medici"));
        assert_eq!(record.latitude, Some(43.7747));
        assert_eq!(record.population(), 7);
        assert_eq!(record.assets(), 1250.5);
        assert!(record.source.is_empty());
    }

    #[test]
    fn missing_numbers_default_to_zero() {
        let record: Record = serde_json::from_value(json!({
            "id_C": 1,
            "BOCCHE_M": null,
            "TOTAL_ASSETS": null
        }))
        .unwrap();

        assert_eq!(record.population(), 1);
        assert_eq!(record.assets(), 0.0);
    }

    #[test]
    fn lenient_field_decoding() {
        let record: Record = serde_json::from_value(json!({
            "id_C": 2,
            "TERM": 1427,
            "BOCCHE_M": "4",
            "BOCCHE_F": 2.0,
            "TOTAL_ASSETS": "88"
        }))
        .unwrap();

        assert_eq!(record.text(Field::Term), Some("1427"));
        assert_eq!(record.population(), 7);
        assert_eq!(record.assets(), 88.0);
    }

    #[test]
    fn blank_text_is_not_non_empty() {
        let mut record = Record::new(3);
        record.occupation = Some(String::new());
        assert_eq!(record.text(Field::Occupation), Some(""));
        assert_eq!(record.non_empty(Field::Occupation), None);
    }

    #[test]
    fn non_finite_amounts_read_as_absent() {
        for text in ["NaN", "inf", "-infinity"] {
            let record: Record = serde_json::from_value(json!({
                "id_C": 6,
                "TOTAL_ASSETS": text,
                "LAT": text
            }))
            .unwrap();
            assert_eq!(record.total_assets, None);
            assert_eq!(record.latitude, None);
            assert_eq!(record.assets(), 0.0);
        }
    }

    #[test]
    fn population_saturates() {
        let record: Record = serde_json::from_value(json!({
            "id_C": 8,
            "BOCCHE_M": "18446744073709551615",
            "BOCCHE_F": 1e30
        }))
        .unwrap();
        assert_eq!(record.population(), u64::MAX);
    }

    #[test]
    fn unknown_keys_are_not_modelled() {
        let record: Record = serde_json::from_value(json!({
            "id_C": 5,
            "FAMILY": "Strozzi",
            "NOTES": "fol. 12r"
        }))
        .unwrap();
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"id_C": 5, "FAMILY": "Strozzi"})
        );
    }

    #[test]
    fn id_is_required() {
        let result = serde_json::from_value::<Record>(json!({"NAME": "Anonimo"}));
        assert!(result.is_err());
    }
}
