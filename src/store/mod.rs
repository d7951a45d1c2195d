pub mod memory;


use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{AppendError, StoreError};
use crate::status::{CounterDelta, Counters, NewStatus, Status};


pub type AccountId = i32;
pub type InstitutionId = i32;
pub type StatusId = i32;
pub type AnnouncementId = i32;

pub type StoreResult<T> = Result<T, StoreError>;

/// The store shared by routes and scheduled jobs.
pub type SharedStore = Arc<dyn Store>;


#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub user_pwd: String,
    pub is_configured: bool,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub place_name: Option<String>,
    pub created_time: SystemTime,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub user_pwd: String,
}

#[derive(Debug, Clone)]
pub struct AccountConfig {
    pub longitude: f64,
    pub latitude: f64,
    pub place_name: String,
}


#[derive(Debug, Clone, PartialEq)]
pub struct Institution {
    pub id: InstitutionId,
    pub owner_id: AccountId,
    pub name: String,
    pub longitude: f64,
    pub latitude: f64,
    pub place_name: String,
    pub join_code: String,
    pub counters: Counters,
    pub created_time: SystemTime,
}

#[derive(Debug, Clone)]
pub struct NewInstitution {
    pub owner_id: AccountId,
    pub name: String,
    pub longitude: f64,
    pub latitude: f64,
    pub place_name: String,
    pub join_code: String,
}


#[derive(Debug, Clone, PartialEq)]
pub struct Announcement {
    pub id: AnnouncementId,
    pub institution_id: InstitutionId,
    pub author_id: AccountId,
    pub author_username: String,
    pub main_text: String,
    pub description: String,
    pub created_time: SystemTime,
}

#[derive(Debug, Clone)]
pub struct NewAnnouncement {
    pub institution_id: InstitutionId,
    pub author_id: AccountId,
    pub author_username: String,
    pub main_text: String,
    pub description: String,
}


pub trait AccountStore {
    /// Fails with `Conflict` when the username is taken.
    fn create_account(&self, account: &NewAccount) -> StoreResult<Account>;
    fn account(&self, id: AccountId) -> StoreResult<Option<Account>>;
    fn account_by_username(&self, username: &str) -> StoreResult<Option<Account>>;
    fn configure_account(&self, id: AccountId, config: &AccountConfig) -> StoreResult<Account>;

    fn member_institutions(&self, account: AccountId) -> StoreResult<Vec<InstitutionId>>;
    /// Fails with `Conflict` when the account is already a member.
    fn add_membership(&self, account: AccountId, institution: InstitutionId) -> StoreResult<()>;
    fn remove_membership(&self, account: AccountId, institution: InstitutionId) -> StoreResult<bool>;
    fn institution_members(&self, institution: InstitutionId) -> StoreResult<Vec<Account>>;
}

pub trait StatusStore {
    /// The submission with the latest timestamp; the higher id wins a tie.
    fn latest_status(&self, account: AccountId) -> StoreResult<Option<Status>>;
    fn append_status(&self, account: AccountId, status: &NewStatus) -> StoreResult<Status>;
    /// Appends `status` and returns the submission that was latest before
    /// it, together with the stored one. Stores override this so that
    /// concurrent appends of one account see each other's result.
    fn append_status_with_previous(&self, account: AccountId, status: &NewStatus)
        -> Result<(Option<Status>, Status), AppendError> {

        let previous = self.latest_status(account).map_err(AppendError::Lookup)?;
        let saved = self.append_status(account, status).map_err(AppendError::Append)?;

        Ok((previous, saved))
    }
    /// Oldest first.
    fn statuses(&self, account: AccountId) -> StoreResult<Vec<Status>>;
}

pub trait InstitutionStore {
    fn create_institution(&self, institution: &NewInstitution) -> StoreResult<Institution>;
    fn institution(&self, id: InstitutionId) -> StoreResult<Option<Institution>>;
    fn institution_by_code(&self, join_code: &str) -> StoreResult<Option<Institution>>;
    fn institutions(&self) -> StoreResult<Vec<Institution>>;
    /// Also removes memberships and announcements. Returns the number of
    /// institutions deleted.
    fn delete_institution(&self, id: InstitutionId) -> StoreResult<usize>;

    fn institution_counters(&self, id: InstitutionId) -> StoreResult<Counters>;
    fn write_institution_counters(&self, id: InstitutionId, counters: &Counters) -> StoreResult<()>;

    /// Read, add, clamp and write back. Stores that can do this atomically
    /// should override it.
    fn apply_counter_delta(&self, id: InstitutionId, delta: &CounterDelta) -> StoreResult<Counters> {
        let counters = self.institution_counters(id)?.apply(delta);
        self.write_institution_counters(id, &counters)?;
        Ok(counters)
    }
}

pub trait AnnouncementStore {
    fn create_announcement(&self, announcement: &NewAnnouncement) -> StoreResult<Announcement>;
    /// Newest first.
    fn announcements(&self, institution: InstitutionId) -> StoreResult<Vec<Announcement>>;
}


pub trait Store: AccountStore + StatusStore + InstitutionStore + AnnouncementStore + Send + Sync {}

impl<T> Store for T
    where T: AccountStore + StatusStore + InstitutionStore + AnnouncementStore + Send + Sync {}
