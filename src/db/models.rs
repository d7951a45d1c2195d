use std::time::SystemTime;

use super::schema::{accounts, institutions, account_institutions, statuses, announcements};
use crate::status::{Classification, Counters, Evacuation, Readiness, Safety, Status};
use crate::store;


#[derive(Queryable)]
pub struct AccountRow {
    pub id: i32,
    pub username: String,
    pub user_pwd: String,
    pub is_configured: bool,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub place_name: Option<String>,
    pub created_time: SystemTime,
}

impl From<AccountRow> for store::Account {
    fn from(r: AccountRow) -> Self {
        store::Account {
            id: r.id,
            username: r.username,
            user_pwd: r.user_pwd,
            is_configured: r.is_configured,
            longitude: r.longitude,
            latitude: r.latitude,
            place_name: r.place_name,
            created_time: r.created_time,
        }
    }
}

#[derive(Insertable)]
#[table_name="accounts"]
pub struct NewAccountRow<'a> {
    pub username: &'a str,
    pub user_pwd: &'a str,
    pub is_configured: bool,
    pub created_time: SystemTime,
}

#[derive(AsChangeset)]
#[table_name="accounts"]
pub struct AccountConfigRow<'a> {
    pub is_configured: bool,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub place_name: Option<&'a str>,
}


#[derive(Queryable)]
pub struct InstitutionRow {
    pub id: i32,
    pub owner_id: i32,
    pub name: String,
    pub longitude: f64,
    pub latitude: f64,
    pub place_name: String,
    pub join_code: String,
    pub n_safe: i32,
    pub n_unsafe: i32,
    pub n_pending: i32,
    pub n_evacuated: i32,
    pub n_ready: i32,
    pub created_time: SystemTime,
}

impl From<InstitutionRow> for store::Institution {
    fn from(r: InstitutionRow) -> Self {
        store::Institution {
            id: r.id,
            owner_id: r.owner_id,
            name: r.name,
            longitude: r.longitude,
            latitude: r.latitude,
            place_name: r.place_name,
            join_code: r.join_code,
            counters: Counters {
                safe: r.n_safe,
                unsafe_: r.n_unsafe,
                pending: r.n_pending,
                evacuated: r.n_evacuated,
                ready: r.n_ready,
            },
            created_time: r.created_time,
        }
    }
}

#[derive(Insertable)]
#[table_name="institutions"]
pub struct NewInstitutionRow<'a> {
    pub owner_id: i32,
    pub name: &'a str,
    pub longitude: f64,
    pub latitude: f64,
    pub place_name: &'a str,
    pub join_code: &'a str,
    pub n_safe: i32,
    pub n_unsafe: i32,
    pub n_pending: i32,
    pub n_evacuated: i32,
    pub n_ready: i32,
    pub created_time: SystemTime,
}

#[derive(AsChangeset)]
#[table_name="institutions"]
pub struct CountersRow {
    pub n_safe: i32,
    pub n_unsafe: i32,
    pub n_pending: i32,
    pub n_evacuated: i32,
    pub n_ready: i32,
}

impl From<&Counters> for CountersRow {
    fn from(c: &Counters) -> Self {
        CountersRow {
            n_safe: c.safe,
            n_unsafe: c.unsafe_,
            n_pending: c.pending,
            n_evacuated: c.evacuated,
            n_ready: c.ready,
        }
    }
}


#[derive(Insertable)]
#[table_name="account_institutions"]
pub struct NewMembershipRow {
    pub account_id: i32,
    pub institution_id: i32,
    pub joined_time: SystemTime,
}


#[derive(Queryable)]
pub struct StatusRow {
    pub id: i32,
    pub account_id: i32,
    pub safety: String,
    pub evacuation: String,
    pub readiness: String,
    pub flood_height: f64,
    pub rain_intensity: f64,
    pub wind_speed: f64,
    pub modality: String,
    pub transportation: String,
    pub created_time: SystemTime,
}

impl From<StatusRow> for Status {
    fn from(r: StatusRow) -> Self {
        Status {
            id: r.id,
            account_id: r.account_id,
            classification: Classification::new(
                Safety::parse(&r.safety),
                Evacuation::parse(&r.evacuation),
                Readiness::parse(&r.readiness)),
            flood_height: r.flood_height,
            rain_intensity: r.rain_intensity,
            wind_speed: r.wind_speed,
            modality: r.modality,
            transportation: r.transportation,
            created_time: r.created_time,
        }
    }
}

#[derive(Insertable)]
#[table_name="statuses"]
pub struct NewStatusRow<'a> {
    pub account_id: i32,
    pub safety: &'a str,
    pub evacuation: &'a str,
    pub readiness: &'a str,
    pub flood_height: f64,
    pub rain_intensity: f64,
    pub wind_speed: f64,
    pub modality: &'a str,
    pub transportation: &'a str,
    pub created_time: SystemTime,
}


#[derive(Queryable)]
pub struct AnnouncementRow {
    pub id: i32,
    pub institution_id: i32,
    pub author_id: i32,
    pub author_username: String,
    pub main_text: String,
    pub description: String,
    pub created_time: SystemTime,
}

impl From<AnnouncementRow> for store::Announcement {
    fn from(r: AnnouncementRow) -> Self {
        store::Announcement {
            id: r.id,
            institution_id: r.institution_id,
            author_id: r.author_id,
            author_username: r.author_username,
            main_text: r.main_text,
            description: r.description,
            created_time: r.created_time,
        }
    }
}

#[derive(Insertable)]
#[table_name="announcements"]
pub struct NewAnnouncementRow<'a> {
    pub institution_id: i32,
    pub author_id: i32,
    pub author_username: &'a str,
    pub main_text: &'a str,
    pub description: &'a str,
    pub created_time: SystemTime,
}
