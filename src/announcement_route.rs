use rocket::{
    State,
    request::Form,
};
use serde_json::json;

use crate::api::{self, JsonResult, StringResult, bad_request, store_failure};
use crate::account_route::authenticate;
use crate::store::{AnnouncementStore, InstitutionStore, NewAnnouncement, SharedStore};


#[derive(FromForm)]
pub struct AnnouncementForm {
    username: String,
    password: String,
    institution_id: i32,
    main_text: String,
    description: String,
}

impl AnnouncementForm {
    fn verify_error(&self) -> Option<&'static str> {
        let len_main = self.main_text.trim().chars().count();

        if len_main == 0 {
            Some("The announcement can not be empty")
        }
        else if len_main > 200 {
            Some("The maximum length of the announcement is 200")
        }
        else if self.description.chars().count() > 2000 {
            Some("The maximum length of the description is 2000")
        }
        else {
            None
        }
    }
}


#[post("/announcement", format="application/x-www-form-urlencoded", data="<form>")]
pub fn post_announcement(form: Option<Form<AnnouncementForm>>, store: State<SharedStore>) -> StringResult {
    let form = form.ok_or_else(|| bad_request("Invalid form"))?;

    if let Some(err) = form.verify_error() {
        return Err(bad_request(err));
    }

    let account = authenticate(&**store, &form.username, &form.password)?;

    let institution = store.institution(form.institution_id)
        .map_err(store_failure)?
        .ok_or_else(|| bad_request("Can't find an institution"))?;

    if institution.owner_id != account.id {
        return Err(bad_request("Only the owner can make announcements"));
    }

    let announcement = store.create_announcement(&NewAnnouncement {
        institution_id: institution.id,
        author_id: account.id,
        author_username: account.username.clone(),
        main_text: form.main_text.trim().to_owned(),
        description: form.description.trim().to_owned(),
    })
    .map_err(store_failure)?;

    Ok(announcement.id.to_string())
}

#[get("/announcements?<institution_id>")]
pub fn get_announcements(institution_id: i32, store: State<SharedStore>) -> JsonResult {
    let announcements = store.announcements(institution_id)
        .map_err(store_failure)?;

    api::json_result(json!({
        "announcements": announcements.iter().map(api::announcement_json).collect::<Vec<_>>(),
        "size": announcements.len(),
    }))
}
