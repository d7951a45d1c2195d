use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Mutex, MutexGuard},
    time::SystemTime,
};

use crate::error::{AppendError, StoreError};
use crate::status::{CounterDelta, Counters, NewStatus, Status};
use super::*;


#[derive(Default)]
struct Tables {
    next_id: i32,
    accounts: BTreeMap<AccountId, Account>,
    memberships: BTreeSet<(AccountId, InstitutionId)>,
    statuses: Vec<Status>,
    institutions: BTreeMap<InstitutionId, Institution>,
    announcements: Vec<Announcement>,
}

impl Tables {
    fn issue_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn institution_mut(&mut self, id: InstitutionId) -> StoreResult<&mut Institution> {
        self.institutions.get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("institution {}", id)))
    }

    fn latest_status(&self, account: AccountId) -> Option<&Status> {
        self.statuses.iter()
            .filter(|s| s.account_id == account)
            .max_by_key(|s| (s.created_time, s.id))
    }

    fn push_status(&mut self, account: AccountId, status: &NewStatus, created_time: SystemTime) -> Status {
        let status = Status {
            id: self.issue_id(),
            account_id: account,
            classification: status.classification,
            flood_height: status.flood_height,
            rain_intensity: status.rain_intensity,
            wind_speed: status.wind_speed,
            modality: status.modality.clone(),
            transportation: status.transportation.clone(),
            created_time,
        };
        self.statuses.push(status.clone());

        status
    }
}


/// Process-local store used for development runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables.lock()
            .map_err(|_| StoreError::Connection("memory store poisoned".into()))
    }
}


impl AccountStore for MemoryStore {
    fn create_account(&self, account: &NewAccount) -> StoreResult<Account> {
        let mut t = self.lock()?;

        if t.accounts.values().any(|a| a.username == account.username) {
            return Err(StoreError::Conflict(format!("username {} is taken", account.username)));
        }

        let id = t.issue_id();
        let account = Account {
            id,
            username: account.username.clone(),
            user_pwd: account.user_pwd.clone(),
            is_configured: false,
            longitude: None,
            latitude: None,
            place_name: None,
            created_time: SystemTime::now(),
        };
        t.accounts.insert(id, account.clone());

        Ok(account)
    }

    fn account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        Ok(self.lock()?.accounts.get(&id).cloned())
    }

    fn account_by_username(&self, username: &str) -> StoreResult<Option<Account>> {
        Ok(self.lock()?.accounts.values()
            .find(|a| a.username == username)
            .cloned())
    }

    fn configure_account(&self, id: AccountId, config: &AccountConfig) -> StoreResult<Account> {
        let mut t = self.lock()?;
        let account = t.accounts.get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("account {}", id)))?;

        account.longitude = Some(config.longitude);
        account.latitude = Some(config.latitude);
        account.place_name = Some(config.place_name.clone());
        account.is_configured = true;

        Ok(account.clone())
    }

    fn member_institutions(&self, account: AccountId) -> StoreResult<Vec<InstitutionId>> {
        Ok(self.lock()?.memberships.iter()
            .filter(|&&(a, _)| a == account)
            .map(|&(_, i)| i)
            .collect())
    }

    fn add_membership(&self, account: AccountId, institution: InstitutionId) -> StoreResult<()> {
        let mut t = self.lock()?;

        if !t.institutions.contains_key(&institution) {
            return Err(StoreError::NotFound(format!("institution {}", institution)));
        }

        if t.memberships.insert((account, institution)) {
            Ok(())
        }
        else {
            Err(StoreError::Conflict("already a member".into()))
        }
    }

    fn remove_membership(&self, account: AccountId, institution: InstitutionId) -> StoreResult<bool> {
        Ok(self.lock()?.memberships.remove(&(account, institution)))
    }

    fn institution_members(&self, institution: InstitutionId) -> StoreResult<Vec<Account>> {
        let t = self.lock()?;

        Ok(t.memberships.iter()
            .filter(|&&(_, i)| i == institution)
            .filter_map(|(a, _)| t.accounts.get(a).cloned())
            .collect())
    }
}


impl StatusStore for MemoryStore {
    fn latest_status(&self, account: AccountId) -> StoreResult<Option<Status>> {
        Ok(self.lock()?.latest_status(account).cloned())
    }

    fn append_status(&self, account: AccountId, status: &NewStatus) -> StoreResult<Status> {
        Ok(self.lock()?.push_status(account, status, SystemTime::now()))
    }

    fn append_status_with_previous(&self, account: AccountId, status: &NewStatus)
        -> Result<(Option<Status>, Status), AppendError> {

        let mut t = self.lock()?;
        let previous = t.latest_status(account).cloned();

        Ok((previous, t.push_status(account, status, SystemTime::now())))
    }

    fn statuses(&self, account: AccountId) -> StoreResult<Vec<Status>> {
        let mut list = self.lock()?.statuses.iter()
            .filter(|s| s.account_id == account)
            .cloned()
            .collect::<Vec<_>>();
        list.sort_by_key(|s| (s.created_time, s.id));

        Ok(list)
    }
}


impl InstitutionStore for MemoryStore {
    fn create_institution(&self, institution: &NewInstitution) -> StoreResult<Institution> {
        let mut t = self.lock()?;

        if t.institutions.values().any(|i| i.join_code == institution.join_code) {
            return Err(StoreError::Conflict(format!("join code {} is taken", institution.join_code)));
        }

        let id = t.issue_id();
        let institution = Institution {
            id,
            owner_id: institution.owner_id,
            name: institution.name.clone(),
            longitude: institution.longitude,
            latitude: institution.latitude,
            place_name: institution.place_name.clone(),
            join_code: institution.join_code.clone(),
            counters: Counters::default(),
            created_time: SystemTime::now(),
        };
        t.institutions.insert(id, institution.clone());

        Ok(institution)
    }

    fn institution(&self, id: InstitutionId) -> StoreResult<Option<Institution>> {
        Ok(self.lock()?.institutions.get(&id).cloned())
    }

    fn institution_by_code(&self, join_code: &str) -> StoreResult<Option<Institution>> {
        Ok(self.lock()?.institutions.values()
            .find(|i| i.join_code == join_code)
            .cloned())
    }

    fn institutions(&self) -> StoreResult<Vec<Institution>> {
        Ok(self.lock()?.institutions.values().cloned().collect())
    }

    fn delete_institution(&self, id: InstitutionId) -> StoreResult<usize> {
        let mut t = self.lock()?;

        t.memberships.retain(|&(_, i)| i != id);
        t.announcements.retain(|a| a.institution_id != id);

        Ok(t.institutions.remove(&id).map_or(0, |_| 1))
    }

    fn institution_counters(&self, id: InstitutionId) -> StoreResult<Counters> {
        Ok(self.lock()?.institution_mut(id)?.counters)
    }

    fn write_institution_counters(&self, id: InstitutionId, counters: &Counters) -> StoreResult<()> {
        self.lock()?.institution_mut(id)?.counters = *counters;
        Ok(())
    }

    fn apply_counter_delta(&self, id: InstitutionId, delta: &CounterDelta) -> StoreResult<Counters> {
        let mut t = self.lock()?;
        let institution = t.institution_mut(id)?;

        institution.counters = institution.counters.apply(delta);

        Ok(institution.counters)
    }
}


impl AnnouncementStore for MemoryStore {
    fn create_announcement(&self, announcement: &NewAnnouncement) -> StoreResult<Announcement> {
        let mut t = self.lock()?;

        if !t.institutions.contains_key(&announcement.institution_id) {
            return Err(StoreError::NotFound(format!("institution {}", announcement.institution_id)));
        }

        let id = t.issue_id();
        let announcement = Announcement {
            id,
            institution_id: announcement.institution_id,
            author_id: announcement.author_id,
            author_username: announcement.author_username.clone(),
            main_text: announcement.main_text.clone(),
            description: announcement.description.clone(),
            created_time: SystemTime::now(),
        };
        t.announcements.push(announcement.clone());

        Ok(announcement)
    }

    fn announcements(&self, institution: InstitutionId) -> StoreResult<Vec<Announcement>> {
        let mut list = self.lock()?.announcements.iter()
            .filter(|a| a.institution_id == institution)
            .cloned()
            .collect::<Vec<_>>();
        list.sort_by(|a, b| (b.created_time, b.id).cmp(&(a.created_time, a.id)));

        Ok(list)
    }
}
