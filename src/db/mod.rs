pub mod models;
pub mod schema;


use std::cell::RefCell;
use std::time::SystemTime;

use diesel::prelude::*;
use diesel::pg::PgConnection;
use diesel::result::QueryResult;

use models::*;
use schema::accounts::dsl::{self as a_dsl};
use schema::institutions::dsl::{self as i_dsl};
use schema::account_institutions::dsl::{self as m_dsl};
use schema::statuses::dsl::{self as s_dsl};
use schema::announcements::dsl::{self as n_dsl};

use crate::config::CONFIG;
use crate::error::{AppendError, StoreError};
use crate::status::{CounterDelta, Counters, NewStatus, Status};
use crate::store::*;


thread_local! {
    static DB_CONN: RefCell<Option<PgConnection>> = RefCell::new(None);
}


fn establish_connection() -> Result<PgConnection, StoreError> {
    let database_url = CONFIG.database_url.as_ref()
        .ok_or_else(|| StoreError::Connection("DATABASE_URL must be set".into()))?;

    PgConnection::establish(database_url)
        .map_err(|err| StoreError::Connection(format!("Error connecting to {}: {}", database_url, err)))
}

/// Runs `f` on this thread's connection, connecting first if needed.
fn on_conn<T, E, F>(f: F) -> Result<T, E> where
    F: FnOnce(&PgConnection) -> Result<T, E>,
    E: From<StoreError> {

    DB_CONN.with(|cell| {
        let mut slot = cell.borrow_mut();

        if slot.is_none() {
            *slot = Some(establish_connection()?);
        }

        match slot.as_ref() {
            Some(conn) => f(conn),
            None => Err(StoreError::Connection("no connection".into()).into()),
        }
    })
}

fn with_conn<T, F>(f: F) -> Result<T, StoreError>
    where F: FnOnce(&PgConnection) -> QueryResult<T> {

    on_conn(|conn| f(conn).map_err(StoreError::from))
}

fn insert_status(conn: &PgConnection, account: AccountId, status: &NewStatus) -> QueryResult<StatusRow> {
    let c = &status.classification;

    diesel::insert_into(schema::statuses::table)
        .values(&NewStatusRow {
            account_id: account,
            safety: c.safety.as_str(),
            evacuation: c.evacuation.as_str(),
            readiness: c.readiness.as_str(),
            flood_height: status.flood_height,
            rain_intensity: status.rain_intensity,
            wind_speed: status.wind_speed,
            modality: &status.modality,
            transportation: &status.transportation,
            created_time: SystemTime::now(),
        })
        .get_result::<StatusRow>(conn)
}

fn latest_status_row(conn: &PgConnection, account: AccountId) -> QueryResult<Option<StatusRow>> {
    s_dsl::statuses
        .filter(s_dsl::account_id.eq(account))
        .order((s_dsl::created_time.desc(), s_dsl::id.desc()))
        .first::<StatusRow>(conn)
        .optional()
}

fn not_found(what: &str, id: i32) -> StoreError {
    StoreError::NotFound(format!("{} {}", what, id))
}


/// PostgreSQL-backed store. Each worker thread keeps its own connection.
pub struct PgStore;

impl PgStore {
    pub fn new() -> Self {
        PgStore
    }

    /// Connects eagerly so that a bad `DATABASE_URL` shows up at start-up.
    pub fn check_connection(&self) -> Result<(), StoreError> {
        with_conn(|_| Ok(()))
    }
}


impl AccountStore for PgStore {
    fn create_account(&self, account: &NewAccount) -> StoreResult<Account> {
        with_conn(|conn| {
            diesel::insert_into(schema::accounts::table)
                .values(&NewAccountRow {
                    username: &account.username,
                    user_pwd: &account.user_pwd,
                    is_configured: false,
                    created_time: SystemTime::now(),
                })
                .get_result::<AccountRow>(conn)
        })
        .map(Account::from)
    }

    fn account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        with_conn(|conn| {
            a_dsl::accounts
                .find(id)
                .first::<AccountRow>(conn)
                .optional()
        })
        .map(|row| row.map(Account::from))
    }

    fn account_by_username(&self, username: &str) -> StoreResult<Option<Account>> {
        with_conn(|conn| {
            a_dsl::accounts
                .filter(a_dsl::username.eq(username))
                .first::<AccountRow>(conn)
                .optional()
        })
        .map(|row| row.map(Account::from))
    }

    fn configure_account(&self, id: AccountId, config: &AccountConfig) -> StoreResult<Account> {
        with_conn(|conn| {
            diesel::update(a_dsl::accounts.find(id))
                .set(&AccountConfigRow {
                    is_configured: true,
                    longitude: Some(config.longitude),
                    latitude: Some(config.latitude),
                    place_name: Some(&config.place_name),
                })
                .get_result::<AccountRow>(conn)
        })
        .map(Account::from)
    }

    fn member_institutions(&self, account: AccountId) -> StoreResult<Vec<InstitutionId>> {
        with_conn(|conn| {
            m_dsl::account_institutions
                .filter(m_dsl::account_id.eq(account))
                .select(m_dsl::institution_id)
                .order(m_dsl::institution_id.asc())
                .load::<i32>(conn)
        })
    }

    fn add_membership(&self, account: AccountId, institution: InstitutionId) -> StoreResult<()> {
        with_conn(|conn| {
            diesel::insert_into(schema::account_institutions::table)
                .values(&NewMembershipRow {
                    account_id: account,
                    institution_id: institution,
                    joined_time: SystemTime::now(),
                })
                .execute(conn)
        })
        .map(|_| ())
    }

    fn remove_membership(&self, account: AccountId, institution: InstitutionId) -> StoreResult<bool> {
        with_conn(|conn| {
            diesel::delete(m_dsl::account_institutions
                    .filter(m_dsl::account_id.eq(account))
                    .filter(m_dsl::institution_id.eq(institution)))
                .execute(conn)
        })
        .map(|cnt| cnt > 0)
    }

    fn institution_members(&self, institution: InstitutionId) -> StoreResult<Vec<Account>> {
        with_conn(|conn| {
            a_dsl::accounts
                .inner_join(m_dsl::account_institutions)
                .filter(m_dsl::institution_id.eq(institution))
                .select(schema::accounts::all_columns)
                .order(a_dsl::id.asc())
                .load::<AccountRow>(conn)
        })
        .map(|rows| rows.into_iter().map(Account::from).collect())
    }
}


impl StatusStore for PgStore {
    fn latest_status(&self, account: AccountId) -> StoreResult<Option<Status>> {
        with_conn(|conn| latest_status_row(conn, account))
            .map(|row| row.map(Status::from))
    }

    fn append_status(&self, account: AccountId, status: &NewStatus) -> StoreResult<Status> {
        with_conn(|conn| insert_status(conn, account, status))
            .map(Status::from)
    }

    /// The account row stays locked until commit, so appends of one account
    /// run one after another.
    fn append_status_with_previous(&self, account: AccountId, status: &NewStatus)
        -> Result<(Option<Status>, Status), AppendError> {

        on_conn(|conn| {
            conn.transaction::<_, AppendError, _>(|| {
                let lookup = |err: diesel::result::Error| AppendError::Lookup(err.into());

                a_dsl::accounts
                    .filter(a_dsl::id.eq(account))
                    .select(a_dsl::id)
                    .for_update()
                    .load::<i32>(conn)
                    .map_err(lookup)?;

                let previous = latest_status_row(conn, account)
                    .map_err(lookup)?
                    .map(Status::from);

                let saved = insert_status(conn, account, status)
                    .map_err(|err| AppendError::Append(err.into()))?;

                Ok((previous, Status::from(saved)))
            })
        })
    }

    fn statuses(&self, account: AccountId) -> StoreResult<Vec<Status>> {
        with_conn(|conn| {
            s_dsl::statuses
                .filter(s_dsl::account_id.eq(account))
                .order((s_dsl::created_time.asc(), s_dsl::id.asc()))
                .load::<StatusRow>(conn)
        })
        .map(|rows| rows.into_iter().map(Status::from).collect())
    }
}


impl InstitutionStore for PgStore {
    fn create_institution(&self, institution: &NewInstitution) -> StoreResult<Institution> {
        with_conn(|conn| {
            diesel::insert_into(schema::institutions::table)
                .values(&NewInstitutionRow {
                    owner_id: institution.owner_id,
                    name: &institution.name,
                    longitude: institution.longitude,
                    latitude: institution.latitude,
                    place_name: &institution.place_name,
                    join_code: &institution.join_code,
                    n_safe: 0,
                    n_unsafe: 0,
                    n_pending: 0,
                    n_evacuated: 0,
                    n_ready: 0,
                    created_time: SystemTime::now(),
                })
                .get_result::<InstitutionRow>(conn)
        })
        .map(Institution::from)
    }

    fn institution(&self, id: InstitutionId) -> StoreResult<Option<Institution>> {
        with_conn(|conn| {
            i_dsl::institutions
                .find(id)
                .first::<InstitutionRow>(conn)
                .optional()
        })
        .map(|row| row.map(Institution::from))
    }

    fn institution_by_code(&self, join_code: &str) -> StoreResult<Option<Institution>> {
        with_conn(|conn| {
            i_dsl::institutions
                .filter(i_dsl::join_code.eq(join_code))
                .first::<InstitutionRow>(conn)
                .optional()
        })
        .map(|row| row.map(Institution::from))
    }

    fn institutions(&self) -> StoreResult<Vec<Institution>> {
        with_conn(|conn| {
            i_dsl::institutions
                .order(i_dsl::id.asc())
                .load::<InstitutionRow>(conn)
        })
        .map(|rows| rows.into_iter().map(Institution::from).collect())
    }

    fn delete_institution(&self, id: InstitutionId) -> StoreResult<usize> {
        with_conn(|conn| {
            conn.transaction(|| {
                diesel::delete(m_dsl::account_institutions
                        .filter(m_dsl::institution_id.eq(id)))
                    .execute(conn)?;
                diesel::delete(n_dsl::announcements
                        .filter(n_dsl::institution_id.eq(id)))
                    .execute(conn)?;
                diesel::delete(i_dsl::institutions.find(id))
                    .execute(conn)
            })
        })
    }

    fn institution_counters(&self, id: InstitutionId) -> StoreResult<Counters> {
        with_conn(|conn| {
            i_dsl::institutions
                .find(id)
                .first::<InstitutionRow>(conn)
                .optional()
        })?
        .map(|row| Institution::from(row).counters)
        .ok_or_else(|| not_found("institution", id))
    }

    fn write_institution_counters(&self, id: InstitutionId, counters: &Counters) -> StoreResult<()> {
        let cnt = with_conn(|conn| {
            diesel::update(i_dsl::institutions.find(id))
                .set(&CountersRow::from(counters))
                .execute(conn)
        })?;

        if cnt > 0 {
            Ok(())
        }
        else {
            Err(not_found("institution", id))
        }
    }

    fn apply_counter_delta(&self, id: InstitutionId, delta: &CounterDelta) -> StoreResult<Counters> {
        let updated = with_conn(|conn| {
            conn.transaction(|| {
                let row = i_dsl::institutions
                    .filter(i_dsl::id.eq(id))
                    .for_update()
                    .load::<InstitutionRow>(conn)?
                    .into_iter()
                    .next();

                match row {
                    Some(row) => {
                        let counters = Institution::from(row).counters.apply(delta);

                        diesel::update(i_dsl::institutions.find(id))
                            .set(&CountersRow::from(&counters))
                            .execute(conn)?;

                        Ok(Some(counters))
                    },
                    None => Ok(None),
                }
            })
        })?;

        updated.ok_or_else(|| not_found("institution", id))
    }
}


impl AnnouncementStore for PgStore {
    fn create_announcement(&self, announcement: &NewAnnouncement) -> StoreResult<Announcement> {
        with_conn(|conn| {
            diesel::insert_into(schema::announcements::table)
                .values(&NewAnnouncementRow {
                    institution_id: announcement.institution_id,
                    author_id: announcement.author_id,
                    author_username: &announcement.author_username,
                    main_text: &announcement.main_text,
                    description: &announcement.description,
                    created_time: SystemTime::now(),
                })
                .get_result::<AnnouncementRow>(conn)
        })
        .map(Announcement::from)
    }

    fn announcements(&self, institution: InstitutionId) -> StoreResult<Vec<Announcement>> {
        with_conn(|conn| {
            n_dsl::announcements
                .filter(n_dsl::institution_id.eq(institution))
                .order((n_dsl::created_time.desc(), n_dsl::id.desc()))
                .load::<AnnouncementRow>(conn)
        })
        .map(|rows| rows.into_iter().map(Announcement::from).collect())
    }
}
