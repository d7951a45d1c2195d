table! {
    accounts (id) {
        id -> Integer,
        username -> Text,
        user_pwd -> Text,
        is_configured -> Bool,
        longitude -> Nullable<Double>,
        latitude -> Nullable<Double>,
        place_name -> Nullable<Text>,
        created_time -> Timestamp,
    }
}

table! {
    institutions (id) {
        id -> Integer,
        owner_id -> Integer,
        name -> Text,
        longitude -> Double,
        latitude -> Double,
        place_name -> Text,
        join_code -> Text,
        n_safe -> Integer,
        n_unsafe -> Integer,
        n_pending -> Integer,
        n_evacuated -> Integer,
        n_ready -> Integer,
        created_time -> Timestamp,
    }
}

table! {
    account_institutions (id) {
        id -> Integer,
        account_id -> Integer,
        institution_id -> Integer,
        joined_time -> Timestamp,
    }
}

table! {
    statuses (id) {
        id -> Integer,
        account_id -> Integer,
        safety -> Text,
        evacuation -> Text,
        readiness -> Text,
        flood_height -> Double,
        rain_intensity -> Double,
        wind_speed -> Double,
        modality -> Text,
        transportation -> Text,
        created_time -> Timestamp,
    }
}

table! {
    announcements (id) {
        id -> Integer,
        institution_id -> Integer,
        author_id -> Integer,
        author_username -> Text,
        main_text -> Text,
        description -> Text,
        created_time -> Timestamp,
    }
}

joinable!(account_institutions -> accounts (account_id));

allow_tables_to_appear_in_same_query!(
    accounts,
    institutions,
    account_institutions,
    statuses,
    announcements,
);
