use rocket::response::{
    status::BadRequest,
    content::Json,
};
use serde_json::{json, Value as JsonValue};

use crate::error::StoreError;
use crate::status::{Counters, Status};
use crate::store::{Account, Announcement, Institution};
use crate::util;


pub type JsonResult = Result<Json<String>, BadRequest<String>>;
pub type StringResult = Result<String, BadRequest<String>>;


pub fn bad_request<E: ToString>(err: E) -> BadRequest<String> {
    BadRequest(Some(err.to_string()))
}

/// Store failures are logged in full but only summarized to the caller.
pub fn store_failure(err: StoreError) -> BadRequest<String> {
    match err {
        StoreError::NotFound(what) => bad_request(format!("Not found: {}", what)),
        StoreError::Conflict(msg) => bad_request(msg),
        err => {
            error!("Store failure: {}", err);
            bad_request("Storage is unavailable, try again later")
        },
    }
}

pub fn json_result(value: JsonValue) -> JsonResult {
    Ok(Json(value.to_string()))
}


pub fn counters_json(c: &Counters) -> JsonValue {
    json!({
        "safe": c.safe,
        "unsafe": c.unsafe_,
        "pending": c.pending,
        "evacuated": c.evacuated,
        "ready": c.ready,
    })
}

pub fn account_json(a: &Account) -> JsonValue {
    json!({
        "id": a.id,
        "username": a.username,
        "is_configured": a.is_configured,
        "longitude": a.longitude,
        "latitude": a.latitude,
        "place_name": a.place_name,
    })
}

pub fn institution_json(i: &Institution) -> JsonValue {
    json!({
        "id": i.id,
        "owner_id": i.owner_id,
        "name": i.name,
        "longitude": i.longitude,
        "latitude": i.latitude,
        "place_name": i.place_name,
        "code": i.join_code,
        "counters": counters_json(&i.counters),
        "created_time": util::rfc3339(i.created_time),
    })
}

pub fn status_json(s: &Status) -> JsonValue {
    let c = &s.classification;

    json!({
        "id": s.id,
        "safety": c.safety.as_str(),
        "evacuation": c.evacuation.as_str(),
        "readiness": c.readiness.as_str(),
        "flood_height": s.flood_height,
        "rain_intensity": s.rain_intensity,
        "wind_speed": s.wind_speed,
        "modality": s.modality,
        "transportation": s.transportation,
        "datetime": util::rfc3339(s.created_time),
    })
}

pub fn announcement_json(a: &Announcement) -> JsonValue {
    json!({
        "id": a.id,
        "institution_id": a.institution_id,
        "author_username": a.author_username,
        "main_text": a.main_text,
        "description": a.description,
        "datetime": util::rfc3339(a.created_time),
    })
}
