use std::{
    collections::BTreeMap,
    sync::RwLock,
    time::Duration,
};
use rocket::{
    State,
    request::Form,
    response::content::Json,
};
use serde_json::json;

use crate::api::{self, JsonResult, StringResult, bad_request, store_failure};
use crate::account_route::authenticate;
use crate::config::CONFIG;
use crate::reconciler::{self, StatusReconciler};
use crate::status::Counters;
use crate::store::{
    Account, Institution, InstitutionId, NewInstitution, SharedStore, Store,
    AccountStore, InstitutionStore, StatusStore,
};
use crate::task_scheduler::{Task, TaskSchedulerBuilder};
use crate::util;


lazy_static! {
    static ref INSTITUTION_MAP_CACHE: RwLock<String> = {
        RwLock::new(empty_map())
    };
}

const MAX_CODE_ATTEMPTS: usize = 10;
const RETRY_MAP_PERIOD: u64 = 5; // seconds


pub fn init_institution_sys(scheduler: &mut TaskSchedulerBuilder, store: SharedStore) {
    let delay = match build_institution_map(&*store) {
        Ok(data) => {
            update_institution_map(data);
            CONFIG.map_refresh_period
        },
        Err(err) => {
            warn!("Fail to init institution map: {}", err);
            Duration::new(RETRY_MAP_PERIOD, 0)
        },
    };

    scheduler.add_task(Task::new("institution-map", move || institution_map_job(&*store), delay));
}

fn institution_map_job(store: &dyn Store) -> Duration {
    info!("Start institution map job");

    match build_institution_map(store) {
        Ok(data) => {
            update_institution_map(data);
            CONFIG.map_refresh_period
        },
        Err(err) => {
            warn!("Fail to build institution map: {}", err);
            Duration::new(RETRY_MAP_PERIOD, 0)
        },
    }
}

fn empty_map() -> String {
    json!({
        "institutions": [],
        "size": 0,
    }).to_string()
}

fn update_institution_map(data: String) {
    match INSTITUTION_MAP_CACHE.write() {
        Ok(mut cache) => *cache = data,
        Err(_) => error!("Institution map cache is poisoned"),
    }
}

pub fn build_institution_map(store: &dyn Store) -> Result<String, String> {
    store.institutions()
        .map(|institutions| {
            let parts = institutions.iter()
                .map(|i| {
                    json!({
                        "id": i.id,
                        "name": i.name,
                        "longitude": i.longitude,
                        "latitude": i.latitude,
                        "counters": api::counters_json(&i.counters),
                        "total": i.counters.total_stakeholders(),
                        "created_time": util::unix_secs(i.created_time),
                    })
                })
                .collect::<Vec<_>>();

            json!({
                "institutions": parts,
                "size": parts.len(),
            }).to_string()
        })
        .map_err(|err| err.to_string())
}


/// Creates an institution owned by `owner`, who also becomes its first
/// member. Nothing is left behind if any step fails.
pub fn create_institution(store: &dyn Store, owner: &Account, name: &str,
    longitude: f64, latitude: f64, place_name: &str) -> Result<Institution, String> {

    let mut join_code = None;
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = util::generate_join_code();

        if store.institution_by_code(&code).map_err(|err| err.to_string())?.is_none() {
            join_code = Some(code);
            break;
        }
    }
    let join_code = join_code.ok_or("Failed to generate a unique join code")?;

    let institution = store.create_institution(&NewInstitution {
        owner_id: owner.id,
        name: name.to_owned(),
        longitude,
        latitude,
        place_name: place_name.to_owned(),
        join_code,
    })
    .map_err(|err| err.to_string())?;

    let joined = reconciler::lock_account(owner.id, || {
        store.add_membership(owner.id, institution.id)
            .map_err(|err| err.to_string())
            .and_then(|_| {
                StatusReconciler::new(store, CONFIG.counter_retries)
                    .reconcile_on_join(owner.id, institution.id)
                    .map_err(|err| err.to_string())
            })
    });

    match joined {
        Ok(counters) => {
            info!("Institution {} created by account {}", institution.id, owner.id);
            Ok(Institution { counters, ..institution })
        },
        Err(err) => {
            if let Err(del_err) = store.delete_institution(institution.id) {
                error!("Fail to remove half-created institution({}): {}", institution.id, del_err);
            }
            Err(err)
        },
    }
}

/// Adds `account` to the institution with `join_code` and counts it in.
pub fn join_institution(store: &dyn Store, account: &Account, join_code: &str)
    -> Result<Institution, String> {

    let institution = store.institution_by_code(join_code.trim())
        .map_err(|err| err.to_string())?
        .ok_or("Invalid join code")?;

    reconciler::lock_account(account.id, || -> Result<Institution, String> {
        let members = store.member_institutions(account.id)
            .map_err(|err| err.to_string())?;
        if members.contains(&institution.id) {
            return Err("Already joined".into());
        }

        store.add_membership(account.id, institution.id)
            .map_err(|err| err.to_string())?;

        let reconciled = StatusReconciler::new(store, CONFIG.counter_retries)
            .reconcile_on_join(account.id, institution.id);

        match reconciled {
            Ok(counters) => Ok(Institution { counters, ..institution }),
            Err(err) => {
                if let Err(rm_err) = store.remove_membership(account.id, institution.id) {
                    error!("Fail to undo membership of account {} in institution({}): {}",
                        account.id, institution.id, rm_err);
                }
                Err(err.to_string())
            },
        }
    })
}

pub fn delete_institution(store: &dyn Store, account: &Account, id: InstitutionId)
    -> Result<usize, String> {

    let institution = store.institution(id)
        .map_err(|err| err.to_string())?
        .ok_or("Not found")?;

    if institution.owner_id != account.id {
        return Err("Only the owner can delete an institution".into());
    }

    store.delete_institution(id).map_err(|err| err.to_string())
}


pub struct Summary {
    pub counters: Counters,
    pub total_stakeholders: i32,
    pub modality: Option<String>,
    pub transportation: Option<String>,
}

/// Most frequent non-empty value; ties go to the alphabetically first.
fn dominant<'a, I>(values: I) -> Option<String> where
    I: IntoIterator<Item = &'a str> {

    let mut counts = BTreeMap::new();
    for v in values.into_iter().map(str::trim).filter(|v| !v.is_empty()) {
        *counts.entry(v).or_insert(0usize) += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for (v, n) in counts {
        if best.map_or(true, |(_, m)| n > m) {
            best = Some((v, n));
        }
    }

    best.map(|(v, _)| v.to_owned())
}

pub fn institution_summary(store: &dyn Store, id: InstitutionId) -> Result<Summary, String> {
    let institution = store.institution(id)
        .map_err(|err| err.to_string())?
        .ok_or("Not found")?;

    let mut latest = Vec::new();
    for member in store.institution_members(id).map_err(|err| err.to_string())? {
        if let Some(status) = store.latest_status(member.id).map_err(|err| err.to_string())? {
            latest.push(status);
        }
    }

    Ok(Summary {
        counters: institution.counters,
        total_stakeholders: institution.counters.total_stakeholders(),
        modality: dominant(latest.iter().map(|s| s.modality.as_str())),
        transportation: dominant(latest.iter().map(|s| s.transportation.as_str())),
    })
}


#[derive(FromForm)]
pub struct InstitutionForm {
    username: String,
    password: String,
    name: String,
    longitude: f64,
    latitude: f64,
    place_name: String,
}

impl InstitutionForm {
    fn verify_error(&self) -> Option<&'static str> {
        let len_name = self.name.trim().chars().count();

        if len_name < 2 {
            Some("Name must be at least 2 characters")
        }
        else if len_name > 64 {
            Some("Name can not be longer than 64 characters")
        }
        else if !(-180.0..=180.0).contains(&self.longitude) {
            Some("Invalid longitude")
        }
        else if !(-90.0..=90.0).contains(&self.latitude) {
            Some("Invalid latitude")
        }
        else if self.place_name.chars().count() > 200 {
            Some("The maximum length of the place name is 200")
        }
        else {
            None
        }
    }
}


#[derive(FromForm)]
pub struct JoinForm {
    username: String,
    password: String,
    code: String,
}


#[post("/institution", format="application/x-www-form-urlencoded", data="<form>")]
pub fn post_institution(form: Option<Form<InstitutionForm>>, store: State<SharedStore>) -> JsonResult {
    let form = form.ok_or_else(|| bad_request("Invalid form"))?;

    if let Some(err) = form.verify_error() {
        return Err(bad_request(err));
    }

    let account = authenticate(&**store, &form.username, &form.password)?;

    let institution = create_institution(&**store, &account, form.name.trim(),
        form.longitude, form.latitude, form.place_name.trim())
        .map_err(bad_request)?;

    api::json_result(json!({
        "id": institution.id,
        "name": institution.name,
        "code": institution.join_code,
    }))
}

#[post("/institution/join", format="application/x-www-form-urlencoded", data="<form>")]
pub fn post_join_institution(form: Option<Form<JoinForm>>, store: State<SharedStore>) -> JsonResult {
    let form = form.ok_or_else(|| bad_request("Invalid form"))?;

    let account = authenticate(&**store, &form.username, &form.password)?;

    let institution = join_institution(&**store, &account, &form.code)
        .map_err(bad_request)?;

    api::json_result(api::institution_json(&institution))
}

#[delete("/institution?<id>&<username>&<password>")]
pub fn delete_institution_route(id: i32, username: String, password: String,
    store: State<SharedStore>) -> StringResult {

    let account = authenticate(&**store, &username, &password)?;

    match delete_institution(&**store, &account, id) {
        Ok(cnt) if cnt > 0 => Ok(cnt.to_string()),
        Ok(_) => Err(bad_request("Not found")),
        Err(err) => Err(bad_request(err)),
    }
}

#[get("/institution?<id>")]
pub fn get_institution(id: i32, store: State<SharedStore>) -> JsonResult {
    let institution = store.institution(id)
        .map_err(store_failure)?;

    let members = match institution {
        Some(_) => store.institution_members(id)
            .map_err(store_failure)?
            .iter()
            .map(api::account_json)
            .collect::<Vec<_>>(),
        None => Vec::new(),
    };

    api::json_result(json!({
        "institution": institution.as_ref().map(api::institution_json),
        "accounts": members,
    }))
}

#[get("/institution/summary?<id>")]
pub fn get_institution_summary(id: i32, store: State<SharedStore>) -> JsonResult {
    let summary = institution_summary(&**store, id)
        .map_err(bad_request)?;

    api::json_result(json!({
        "status_counts": api::counters_json(&summary.counters),
        "total_stakeholders": summary.total_stakeholders,
        "modality": summary.modality,
        "transportation": summary.transportation,
    }))
}

#[get("/institution-map")]
pub fn get_institution_map() -> Json<String> {
    match INSTITUTION_MAP_CACHE.read() {
        Ok(cache) => Json(cache.clone()),
        Err(_) => Json(empty_map()),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rocket::http::{ContentType, Status as HttpStatus};
    use serde_json::Value as JsonValue;

    use crate::status::{Classification, Evacuation, NewStatus, Readiness, Safety};
    use crate::store::{memory::MemoryStore, NewAccount};
    use crate::test_client;

    fn account(store: &dyn Store, name: &str) -> Account {
        store.create_account(&NewAccount {
            username: name.into(),
            user_pwd: util::hash_password("secret1").unwrap(),
        }).unwrap()
    }

    fn report(store: &dyn Store, account: &Account, safety: Safety, modality: &str, transportation: &str) {
        store.append_status(account.id, &NewStatus {
            classification: Classification::new(safety, Evacuation::NotEvacuated, Readiness::Ready),
            flood_height: 0.0,
            rain_intensity: 0.0,
            wind_speed: 0.0,
            modality: modality.into(),
            transportation: transportation.into(),
        }).unwrap();
    }

    #[test]
    fn creator_is_counted_in() {
        let store = MemoryStore::new();
        let owner = account(&store, "principal");

        let inst = create_institution(&store, &owner, "Rizal High", 121.0, 14.6, "Pasig").unwrap();

        assert_eq!(inst.join_code.len(), util::JOIN_CODE_LENGTH);
        assert_eq!(inst.counters, Counters { pending: 1, ..Default::default() });
        assert_eq!(store.member_institutions(owner.id).unwrap(), vec![inst.id]);
    }

    #[test]
    fn join_counts_latest_status_once() {
        let store = MemoryStore::new();
        let owner = account(&store, "principal");
        let student = account(&store, "student");
        let inst = create_institution(&store, &owner, "Rizal High", 121.0, 14.6, "Pasig").unwrap();

        report(&store, &student, Safety::Unsafe, "online", "bus");

        let joined = join_institution(&store, &student, &inst.join_code).unwrap();
        assert_eq!(joined.counters, Counters { pending: 1, unsafe_: 1, ready: 1, ..Default::default() });

        assert_eq!(join_institution(&store, &student, &inst.join_code).unwrap_err(), "Already joined");
        assert_eq!(join_institution(&store, &student, "NOPE00").unwrap_err(), "Invalid join code");
        assert_eq!(store.institution_counters(inst.id).unwrap(), joined.counters);
    }

    #[test]
    fn join_racing_submissions_counts_latest_status() {
        use std::{sync::{Arc, Barrier}, thread};

        for round in 0..10 {
            let store = Arc::new(MemoryStore::new());
            let owner = account(&*store, "principal");
            let student = account(&*store, "student");
            let inst = create_institution(&*store, &owner, "Rizal High", 121.0, 14.6, "Pasig").unwrap();
            let gate = Arc::new(Barrier::new(2));

            let submitter = {
                let (store, gate, student) = (store.clone(), gate.clone(), student.clone());

                thread::spawn(move || {
                    gate.wait();
                    for i in 0..20 {
                        let safety = if (i + round) % 2 == 0 { Safety::Safe } else { Safety::Unsafe };
                        StatusReconciler::new(&*store, 0)
                            .submit_status(student.id, &NewStatus {
                                classification: Classification::new(safety, Evacuation::Evacuated, Readiness::NotReady),
                                flood_height: 0.0,
                                rain_intensity: 0.0,
                                wind_speed: 0.0,
                                modality: "online".into(),
                                transportation: "bus".into(),
                            })
                            .unwrap();
                    }
                })
            };

            gate.wait();
            join_institution(&*store, &student, &inst.join_code).unwrap();
            submitter.join().unwrap();

            let latest = store.latest_status(student.id).unwrap().unwrap();
            let mut expected = Counters { pending: 1, evacuated: 1, ..Default::default() };
            match latest.classification.safety {
                Safety::Safe => expected.safe = 1,
                _ => expected.unsafe_ = 1,
            }

            assert_eq!(store.institution_counters(inst.id).unwrap(), expected);
        }
    }

    #[test]
    fn only_owner_deletes() {
        let store = MemoryStore::new();
        let owner = account(&store, "principal");
        let other = account(&store, "teacher");
        let inst = create_institution(&store, &owner, "Rizal High", 121.0, 14.6, "Pasig").unwrap();
        join_institution(&store, &other, &inst.join_code).unwrap();

        assert!(delete_institution(&store, &other, inst.id).is_err());
        assert_eq!(delete_institution(&store, &owner, inst.id), Ok(1));
        assert!(store.member_institutions(other.id).unwrap().is_empty());
    }

    #[test]
    fn summary_picks_dominant_values() {
        let store = MemoryStore::new();
        let owner = account(&store, "principal");
        let inst = create_institution(&store, &owner, "Rizal High", 121.0, 14.6, "Pasig").unwrap();

        for (name, modality, transportation) in &[
            ("a1", "online", "bus"),
            ("a2", "online", "walk"),
            ("a3", "face_to_face", "walk"),
        ] {
            let member = account(&store, name);
            join_institution(&store, &member, &inst.join_code).unwrap();
            report(&store, &member, Safety::Safe, modality, transportation);
        }

        let summary = institution_summary(&store, inst.id).unwrap();
        assert_eq!(summary.total_stakeholders, 4);
        assert_eq!(summary.modality.as_deref(), Some("online"));
        assert_eq!(summary.transportation.as_deref(), Some("walk"));
    }

    #[test]
    fn dominant_breaks_ties_alphabetically() {
        assert_eq!(dominant(vec!["walk", "bus", "walk", "bus"]), Some("bus".into()));
        assert_eq!(dominant(vec!["", " "]), None);
        assert_eq!(dominant(Vec::<&str>::new()), None);
    }

    #[test]
    fn map_lists_every_institution() {
        let store = MemoryStore::new();
        let owner = account(&store, "principal");
        create_institution(&store, &owner, "Rizal High", 121.0, 14.6, "Pasig").unwrap();
        create_institution(&store, &owner, "Bonifacio Elementary", 121.1, 14.7, "Taguig").unwrap();

        let map: JsonValue = serde_json::from_str(&build_institution_map(&store).unwrap()).unwrap();
        assert_eq!(map["size"], 2);
        assert_eq!(map["institutions"][0]["total"], 1);
    }

    #[test]
    fn institution_routes() {
        let (client, _) = test_client();

        client.post("/account")
            .header(ContentType::Form)
            .body("username=principal&password=secret1")
            .dispatch();
        client.post("/account")
            .header(ContentType::Form)
            .body("username=student&password=secret1")
            .dispatch();

        let mut res = client.post("/institution")
            .header(ContentType::Form)
            .body("username=principal&password=secret1&name=Rizal%20High&longitude=121.0&latitude=14.6&place_name=Pasig")
            .dispatch();
        assert_eq!(res.status(), HttpStatus::Ok);
        let created: JsonValue = serde_json::from_str(&res.body_string().unwrap()).unwrap();
        let id = created["id"].as_i64().unwrap();
        let code = created["code"].as_str().unwrap().to_owned();

        let res = client.post("/institution/join")
            .header(ContentType::Form)
            .body(format!("username=student&password=secret1&code={}", code))
            .dispatch();
        assert_eq!(res.status(), HttpStatus::Ok);

        let mut res = client.get(format!("/institution?id={}", id)).dispatch();
        let body: JsonValue = serde_json::from_str(&res.body_string().unwrap()).unwrap();
        assert_eq!(body["institution"]["counters"]["pending"], 2);
        assert_eq!(body["accounts"].as_array().unwrap().len(), 2);

        let mut res = client.get(format!("/institution/summary?id={}", id)).dispatch();
        let body: JsonValue = serde_json::from_str(&res.body_string().unwrap()).unwrap();
        assert_eq!(body["total_stakeholders"], 2);
        assert!(body["modality"].is_null());

        let res = client.delete(format!("/institution?id={}&username=student&password=secret1", id)).dispatch();
        assert_eq!(res.status(), HttpStatus::BadRequest);

        let res = client.delete(format!("/institution?id={}&username=principal&password=secret1", id)).dispatch();
        assert_eq!(res.status(), HttpStatus::Ok);

        let mut res = client.get(format!("/institution?id={}", id)).dispatch();
        assert_eq!(res.status(), HttpStatus::Ok);
        let body: JsonValue = serde_json::from_str(&res.body_string().unwrap()).unwrap();
        assert!(body["institution"].is_null());
        assert_eq!(body["accounts"].as_array().map(Vec::len), Some(0));
    }
}
