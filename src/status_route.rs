use rocket::{
    State,
    request::Form,
};
use serde_json::json;

use crate::api::{self, JsonResult, bad_request, store_failure};
use crate::account_route::authenticate;
use crate::config::CONFIG;
use crate::error::ReconcileError;
use crate::reconciler::StatusReconciler;
use crate::status::{Classification, Evacuation, NewStatus, Readiness, Safety};
use crate::store::{SharedStore, StatusStore};


const MAX_TEXT_LEN: usize = 64;


#[derive(FromForm)]
pub struct StatusForm {
    username: String,
    password: String,
    safety: String,
    evacuation: String,
    readiness: String,
    flood_height: f64,
    rain_intensity: f64,
    wind_speed: f64,
    modality: String,
    transportation: String,
}

impl StatusForm {
    fn verify_error(&self) -> Option<&'static str> {
        let measures = [self.flood_height, self.rain_intensity, self.wind_speed];
        let texts = [
            &self.safety, &self.evacuation, &self.readiness,
            &self.modality, &self.transportation,
        ];

        if texts.iter().any(|t| t.trim().is_empty()) {
            Some("Please fill in all fields before updating the status")
        }
        else if texts.iter().any(|t| t.chars().count() > MAX_TEXT_LEN) {
            Some("The maximum length of a field is 64")
        }
        else if measures.iter().any(|m| !m.is_finite() || *m < 0.0) {
            Some("Measurements must be non-negative numbers")
        }
        else {
            None
        }
    }

    fn to_new_status(&self) -> NewStatus {
        NewStatus {
            classification: Classification::new(
                Safety::parse(&self.safety),
                Evacuation::parse(&self.evacuation),
                Readiness::parse(&self.readiness)),
            flood_height: self.flood_height,
            rain_intensity: self.rain_intensity,
            wind_speed: self.wind_speed,
            modality: self.modality.trim().to_owned(),
            transportation: self.transportation.trim().to_owned(),
        }
    }
}


#[post("/status", format="application/x-www-form-urlencoded", data="<form>")]
pub fn post_status(form: Option<Form<StatusForm>>, store: State<SharedStore>) -> JsonResult {
    let form = form.ok_or_else(|| bad_request("Invalid form"))?;

    if let Some(err) = form.verify_error() {
        return Err(bad_request(err));
    }

    let account = authenticate(&**store, &form.username, &form.password)?;

    let reconciler = StatusReconciler::new(&**store, CONFIG.counter_retries);

    match reconciler.submit_status(account.id, &form.to_new_status()) {
        Ok(submission) => {
            api::json_result(json!({
                "status": api::status_json(&submission.status),
                "institutions": submission.updated.iter()
                    .map(|(id, counters)| json!({
                        "id": id,
                        "counters": api::counters_json(counters),
                    }))
                    .collect::<Vec<_>>(),
            }))
        },
        Err(ReconcileError::PartialWrite { failed, .. }) => {
            Err(bad_request(format!(
                "Status saved, but institution(s) {:?} could not be updated", failed)))
        },
        Err(err) => {
            warn!("Status update of account {} failed: {}", account.id, err);
            Err(bad_request("Failed to update the status"))
        },
    }
}

#[get("/status?<username>&<password>")]
pub fn get_status(username: String, password: String, store: State<SharedStore>) -> JsonResult {
    let account = authenticate(&**store, &username, &password)?;

    let status = store.latest_status(account.id)
        .map_err(store_failure)?;

    api::json_result(json!({
        "status": status.as_ref().map(api::status_json),
    }))
}

#[get("/statuses?<username>&<password>")]
pub fn get_statuses(username: String, password: String, store: State<SharedStore>) -> JsonResult {
    let account = authenticate(&**store, &username, &password)?;

    let statuses = store.statuses(account.id)
        .map_err(store_failure)?;

    api::json_result(json!({
        "statuses": statuses.iter().map(api::status_json).collect::<Vec<_>>(),
        "size": statuses.len(),
    }))
}
