use crate::aggregate::{self, Summary};
use crate::config::AppConfig;
use crate::data::Dataset;
use crate::error::{QueryError, QueryResult};
use crate::filter::{self, Predicate};
use crate::types::{Field, Record};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub const VALID_QUARTERS: [&str; 4] = ["San Gimignano", "Castiglione", "Colle", "Montepulciano"];
pub const VALID_LOCATIONS: [&str; 6] = ["Firenze", "Pisa", "Pistoia", "Arezzo", "Cortona", "Volterra"];
/// `ELECTION` value of a successful candidacy.
pub const ELECTED: &str = "Elected.";

const UNKNOWN: &str = "Unknown";
const NO_DETAIL: &str = "No detail available";

pub struct AppState {
    pub dataset: Dataset,
}

// The placeholder stands in for a missing key only, an explicit null stays null.
fn or_unknown(record: &Record, key: &str, value: &Option<String>) -> Option<String> {
    if record.has_key(key) {
        value.clone()
    } else {
        Some(UNKNOWN.to_string())
    }
}

// Absent and empty parameters are both "missing".
fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Maps a map layer name to the column its polygons are keyed on.
pub fn layer_field(layer: &str) -> Option<Field> {
    match layer {
        "Location" => Some(Field::Location),
        "Quarter" => Some(Field::Quarter),
        "Gonf Piviere" => Some(Field::Gonfalone),
        _ => None,
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/dettagli_marker/:id", get(record_details))
        .route("/markers_by_family_patronymic", get(markers_by_family_patronymic))
        .route("/polygon_details", get(polygon_details))
        .route("/settlement_details", get(settlement_details))
        .route("/markers_by_election_office_term", get(markers_by_election_office_term))
        .route("/markers_by_family_gonfalone", get(markers_by_family_gonfalone))
        .route("/markers_by_criteria", get(markers_by_criteria))
        .route("/markers_by_family_quarter", get(markers_by_family_quarter))
        .route("/markers_by_family_location", get(markers_by_family_location))
        .route("/search_family", get(search_family))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, dataset: Dataset) -> Result<()> {
    let state = Arc::new(AppState { dataset });
    let addr = SocketAddr::new(config.server.host, config.server.port);

    info!("Starting server on http://{} with {} records", addr, state.dataset.len());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct MatchingIds {
    matching_ids: Vec<i64>,
}

fn matching_ids(dataset: &Dataset, predicate: &Predicate) -> QueryResult<Json<MatchingIds>> {
    let ids = filter::select_ids(dataset.records(), predicate);
    if ids.is_empty() {
        return Err(QueryError::not_found("No records found matching the criteria"));
    }
    Ok(Json(MatchingIds { matching_ids: ids }))
}

async fn record_details(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> QueryResult<Json<Map<String, Value>>> {
    let id: i64 = id
        .parse()
        .map_err(|_| QueryError::validation(format!("Invalid record id '{}'", id)))?;

    state
        .dataset
        .source(id)
        .cloned()
        .map(Json)
        .ok_or_else(|| QueryError::not_found("Record not found"))
}

#[derive(Debug, Default, Deserialize)]
pub struct FamilyPatronymicParams {
    family: Option<String>,
    patronymic: Option<String>,
}

async fn markers_by_family_patronymic(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FamilyPatronymicParams>,
) -> QueryResult<Json<MatchingIds>> {
    let (Some(family), Some(patronymic)) = (required(&params.family), required(&params.patronymic))
    else {
        return Err(QueryError::validation("Parameters 'family' and 'patronymic' are required"));
    };

    let predicate = Predicate::new()
        .equals(Field::Family, family)
        .equals(Field::Patronymic, patronymic);
    matching_ids(&state.dataset, &predicate)
}

#[derive(Debug, Default, Deserialize)]
pub struct RegionParams {
    layer: Option<String>,
    region: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegionDetails {
    popolo: String,
    unique_popoli_count: usize,
    #[serde(flatten)]
    summary: Summary,
}

async fn polygon_details(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RegionParams>,
) -> QueryResult<Json<RegionDetails>> {
    let (Some(layer), Some(region)) = (required(&params.layer), required(&params.region)) else {
        return Err(QueryError::validation("Parameters 'layer' and 'region' are required"));
    };
    let field = layer_field(layer)
        .ok_or_else(|| QueryError::validation(format!("Layer '{}' is not supported", layer)))?;

    let records = filter::select(state.dataset.records(), &Predicate::new().equals(field, region));
    if records.is_empty() {
        return Err(QueryError::not_found("No records found for the selected polygon"));
    }

    Ok(Json(RegionDetails {
        popolo: region.to_string(),
        unique_popoli_count: aggregate::unique_popoli_count(&records),
        summary: aggregate::summarize(&records),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct SettlementParams {
    lat: Option<String>,
    lon: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SettlementDetails {
    popolo: Option<String>,
    lat: f64,
    lon: f64,
    #[serde(flatten)]
    summary: Summary,
    gonf_piviere: Option<String>,
    quarter: Option<String>,
    location: Option<String>,
}

fn parse_coordinate(value: &Option<String>) -> Option<f64> {
    required(value)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

async fn settlement_details(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SettlementParams>,
) -> QueryResult<Json<SettlementDetails>> {
    let (Some(lat), Some(lon)) = (parse_coordinate(&params.lat), parse_coordinate(&params.lon)) else {
        return Err(QueryError::validation(
            "Parameters 'lat' and 'lon' are required and must be numbers",
        ));
    };

    let records = filter::select(state.dataset.records(), &Predicate::new().at_coordinates(lat, lon));
    let Some(first) = records.first() else {
        return Err(QueryError::not_found("No records found for the given location"));
    };

    Ok(Json(SettlementDetails {
        popolo: or_unknown(first, "POPOLO", &first.popolo),
        lat: filter::round_coordinate(lat),
        lon: filter::round_coordinate(lon),
        gonf_piviere: first.gonfalone.clone(),
        quarter: first.quarter.clone(),
        location: first.location.clone(),
        summary: aggregate::summarize(&records),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ElectionParams {
    election: Option<String>,
    office: Option<String>,
    term: Option<String>,
}

async fn markers_by_election_office_term(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ElectionParams>,
) -> QueryResult<Json<MatchingIds>> {
    let (Some(election), Some(office), Some(term)) = (
        required(&params.election),
        required(&params.office),
        required(&params.term),
    ) else {
        return Err(QueryError::validation(
            "Parameters 'election', 'office' and 'term' are required",
        ));
    };

    // Only successful candidacies are plotted.
    if election != ELECTED {
        return Err(QueryError::not_found("No records found matching the criteria"));
    }

    let predicate = Predicate::new()
        .equals(Field::Election, election)
        .equals(Field::Office, office)
        .equals(Field::Term, term);
    matching_ids(&state.dataset, &predicate)
}

#[derive(Debug, Default, Deserialize)]
pub struct FamilyGroupParams {
    family: Option<String>,
    gonfalone: Option<String>,
    popolo: Option<String>,
    quarter: Option<String>,
    location: Option<String>,
    patronymic: Option<String>,
}

async fn markers_by_family_gonfalone(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FamilyGroupParams>,
) -> QueryResult<Json<MatchingIds>> {
    let (Some(family), Some(gonfalone)) = (required(&params.family), required(&params.gonfalone))
    else {
        return Err(QueryError::validation("Parameters 'family' and 'gonfalone' are required"));
    };

    let predicate = Predicate::new()
        .equals(Field::Family, family)
        .equals(Field::Gonfalone, gonfalone)
        .excludes(Field::Patronymic, params.patronymic.as_deref())
        .excludes(Field::Popolo, params.popolo.as_deref());
    matching_ids(&state.dataset, &predicate)
}

async fn markers_by_criteria(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FamilyGroupParams>,
) -> QueryResult<Json<MatchingIds>> {
    let (Some(family), Some(popolo)) = (required(&params.family), required(&params.popolo)) else {
        return Err(QueryError::validation("Parameters 'family' and 'popolo' are required"));
    };

    let predicate = Predicate::new()
        .equals(Field::Family, family)
        .equals(Field::Popolo, popolo)
        .excludes(Field::Patronymic, params.patronymic.as_deref());
    matching_ids(&state.dataset, &predicate)
}

async fn markers_by_family_quarter(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FamilyGroupParams>,
) -> QueryResult<Json<MatchingIds>> {
    let (Some(family), Some(quarter)) = (required(&params.family), required(&params.quarter)) else {
        return Err(QueryError::validation("Parameters 'family' and 'quarter' are required"));
    };
    if !VALID_QUARTERS.contains(&quarter) {
        return Err(QueryError::validation(format!(
            "Quarter '{}' is not valid, expected one of: {}",
            quarter,
            VALID_QUARTERS.join(", ")
        )));
    }

    let predicate = Predicate::new()
        .equals(Field::Family, family)
        .equals(Field::Quarter, quarter)
        .excludes(Field::Patronymic, params.patronymic.as_deref())
        .excludes(Field::Popolo, params.popolo.as_deref())
        .excludes(Field::Gonfalone, params.gonfalone.as_deref());
    matching_ids(&state.dataset, &predicate)
}

async fn markers_by_family_location(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FamilyGroupParams>,
) -> QueryResult<Json<MatchingIds>> {
    let (Some(family), Some(location)) = (required(&params.family), required(&params.location))
    else {
        return Err(QueryError::validation("Parameters 'family' and 'location' are required"));
    };
    if !VALID_LOCATIONS.contains(&location) {
        return Err(QueryError::validation(format!(
            "Location '{}' is not valid, expected one of: {}",
            location,
            VALID_LOCATIONS.join(", ")
        )));
    }

    let predicate = Predicate::new()
        .equals(Field::Family, family)
        .equals(Field::Location, location)
        .excludes(Field::Patronymic, params.patronymic.as_deref())
        .excludes(Field::Popolo, params.popolo.as_deref())
        .excludes(Field::Gonfalone, params.gonfalone.as_deref());
    matching_ids(&state.dataset, &predicate)
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    name: Option<String>,
    patronymic: Option<String>,
    family: Option<String>,
}

/// Abbreviated record returned by the name search.
#[derive(Debug, Serialize)]
pub struct SearchHit {
    #[serde(rename = "id_C")]
    id: i64,
    #[serde(rename = "NAME")]
    name: Option<String>,
    #[serde(rename = "PATRONYMIC")]
    patronymic: Option<String>,
    #[serde(rename = "FAMILY")]
    family: Option<String>,
    #[serde(rename = "DETAIL")]
    detail: String,
}

impl From<&Record> for SearchHit {
    fn from(record: &Record) -> Self {
        // Most specific place first.
        let detail = [Field::Popolo, Field::Gonfalone, Field::Quarter, Field::Location]
            .into_iter()
            .find_map(|field| record.non_empty(field))
            .unwrap_or(NO_DETAIL);

        Self {
            id: record.id,
            name: or_unknown(record, "NAME", &record.name),
            patronymic: or_unknown(record, "PATRONYMIC", &record.patronymic),
            family: or_unknown(record, "FAMILY", &record.family),
            detail: detail.to_string(),
        }
    }
}

async fn search_family(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> QueryResult<Json<Vec<SearchHit>>> {
    let terms = [
        (Field::Name, params.name.as_deref().unwrap_or("").trim()),
        (Field::Patronymic, params.patronymic.as_deref().unwrap_or("").trim()),
        (Field::Family, params.family.as_deref().unwrap_or("").trim()),
    ];
    if terms.iter().all(|(_, term)| term.is_empty()) {
        return Err(QueryError::validation(
            "Provide at least one of 'name', 'patronymic' or 'family'",
        ));
    }

    let predicate = terms
        .iter()
        .filter(|(_, term)| !term.is_empty())
        .fold(Predicate::new(), |predicate, (field, term)| {
            predicate.contains_ignore_case(*field, term)
        });

    let hits: Vec<SearchHit> = filter::select(state.dataset.records(), &predicate)
        .into_iter()
        .map(SearchHit::from)
        .collect();
    if hits.is_empty() {
        return Err(QueryError::not_found("No records found"));
    }
    Ok(Json(hits))
}
