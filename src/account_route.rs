use rocket::{
    State,
    request::Form,
    response::status::BadRequest,
};
use serde_json::json;

use crate::api::{self, JsonResult, StringResult, bad_request, store_failure};
use crate::store::{
    Account, AccountConfig, NewAccount, SharedStore, Store,
    AccountStore, InstitutionStore,
};
use crate::util;


/// Resolves the account behind a username/password pair.
pub fn authenticate(store: &dyn Store, username: &str, password: &str)
    -> Result<Account, BadRequest<String>> {

    let account = store.account_by_username(username)
        .map_err(store_failure)?;

    match account {
        Some(account) if util::verify_password(password, &account.user_pwd) => Ok(account),
        _ => Err(bad_request("Authentication failed!")),
    }
}


#[derive(FromForm)]
pub struct RegisterForm {
    username: String,
    password: String,
}

impl RegisterForm {
    fn verify_error(&self) -> Option<&'static str> {
        let len_name = self.username.chars().count();
        let len_pwd = self.password.chars().count();

        if self.username.find(char::is_whitespace).is_some() {
            Some("The username can not contain spaces")
        }
        else if len_name < 2 {
            Some("Username must be at least 2 characters")
        }
        else if len_name > 30 {
            Some("Username can not be longer than 30 characters")
        }
        else if len_pwd < 5 {
            Some("Password must be at least 5 characters")
        }
        else if len_pwd > 30 {
            Some("Password can not be longer than 30 characters")
        }
        else {
            None
        }
    }
}


#[derive(FromForm)]
pub struct ConfigureForm {
    username: String,
    password: String,
    longitude: f64,
    latitude: f64,
    place_name: String,
}

impl ConfigureForm {
    fn verify_error(&self) -> Option<&'static str> {
        if !(-180.0..=180.0).contains(&self.longitude) {
            Some("Invalid longitude")
        }
        else if !(-90.0..=90.0).contains(&self.latitude) {
            Some("Invalid latitude")
        }
        else if self.place_name.trim().is_empty() {
            Some("Place name is required")
        }
        else if self.place_name.chars().count() > 200 {
            Some("The maximum length of the place name is 200")
        }
        else {
            None
        }
    }
}


#[post("/account", format="application/x-www-form-urlencoded", data="<form>")]
pub fn post_account(form: Option<Form<RegisterForm>>, store: State<SharedStore>) -> StringResult {
    let form = form.ok_or_else(|| bad_request("Invalid form"))?;

    if let Some(err) = form.verify_error() {
        return Err(bad_request(err));
    }

    let user_pwd = util::hash_password(&form.password)
        .map_err(|err| {
            error!("Fail to hash a password: {}", err);
            bad_request("Failed to register the account")
        })?;

    let account = store.create_account(&NewAccount {
        username: form.username.clone(),
        user_pwd,
    })
    .map_err(store_failure)?;

    info!("Account {} registered", account.id);

    Ok(account.id.to_string())
}

#[post("/account/configure", format="application/x-www-form-urlencoded", data="<form>")]
pub fn post_configure(form: Option<Form<ConfigureForm>>, store: State<SharedStore>) -> JsonResult {
    let form = form.ok_or_else(|| bad_request("Invalid form"))?;

    if let Some(err) = form.verify_error() {
        return Err(bad_request(err));
    }

    let account = authenticate(&**store, &form.username, &form.password)?;

    let account = store.configure_account(account.id, &AccountConfig {
        longitude: form.longitude,
        latitude: form.latitude,
        place_name: form.place_name.trim().to_owned(),
    })
    .map_err(store_failure)?;

    api::json_result(api::account_json(&account))
}

#[get("/account?<username>&<password>")]
pub fn get_account(username: String, password: String, store: State<SharedStore>) -> JsonResult {
    let account = authenticate(&**store, &username, &password)?;

    let mut institutions = Vec::new();
    for id in store.member_institutions(account.id).map_err(store_failure)? {
        if let Some(inst) = store.institution(id).map_err(store_failure)? {
            institutions.push(api::institution_json(&inst));
        }
    }

    api::json_result(json!({
        "account": api::account_json(&account),
        "institutions": institutions,
    }))
}
