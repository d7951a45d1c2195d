#![feature(proc_macro_hygiene, decl_macro)]


#[macro_use] extern crate lazy_static;
#[macro_use] extern crate log;
#[macro_use] extern crate rocket;
#[macro_use] extern crate diesel;


mod api;
mod config;
mod db;
mod error;
mod logger;
mod reconciler;
mod status;
mod store;
mod task_scheduler;
mod util;
mod account_route;
mod announcement_route;
mod institution_sys;
mod status_route;


use std::{process, sync::Arc};

use config::{CONFIG, StorageKind};
use store::{SharedStore, memory::MemoryStore};
use task_scheduler::TaskSchedulerBuilder;


#[get("/")]
fn index() -> &'static str {
    "AwareIFY Server"
}


fn build_rocket(store: SharedStore) -> rocket::Rocket {
    rocket::ignite()
        .manage(store)
        .mount("/", routes![index])
        .mount("/", routes![
            account_route::post_account,
            account_route::post_configure,
            account_route::get_account,
        ])
        .mount("/", routes![
            institution_sys::post_institution,
            institution_sys::post_join_institution,
            institution_sys::delete_institution_route,
            institution_sys::get_institution,
            institution_sys::get_institution_summary,
            institution_sys::get_institution_map,
        ])
        .mount("/", routes![
            status_route::post_status,
            status_route::get_status,
            status_route::get_statuses,
        ])
        .mount("/", routes![
            announcement_route::post_announcement,
            announcement_route::get_announcements,
        ])
}

fn open_store() -> SharedStore {
    match CONFIG.storage {
        StorageKind::Postgres => {
            let store = db::PgStore::new();

            if let Err(err) = store.check_connection() {
                error!("Can't open the database: {}", err);
                process::exit(1);
            }

            Arc::new(store)
        },
        StorageKind::Memory => {
            warn!("Using the in-memory store, nothing survives a restart");
            Arc::new(MemoryStore::new())
        },
    }
}


fn main() {
    if let Err(err) = logger::init(CONFIG.log_level) {
        eprintln!("Fail to init logger: {}", err);
    }

    let _sentry = CONFIG.sentry_dsn.as_ref().map(|dsn| {
        sentry::init((dsn.as_str(), sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        }))
    });

    let store = open_store();

    let mut scheduler = TaskSchedulerBuilder::new()
        .n_workers(2)
        .period_resolution(std::time::Duration::new(1, 0));
    institution_sys::init_institution_sys(&mut scheduler, store.clone());
    let scheduler = scheduler.build();

    let err = build_rocket(store).launch();
    error!("Launch failed: {}", err);

    scheduler.join();
}


#[cfg(test)]
pub fn test_client() -> (rocket::local::Client, SharedStore) {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let client = rocket::local::Client::new(build_rocket(store.clone()))
        .expect("valid rocket instance");

    (client, store)
}
