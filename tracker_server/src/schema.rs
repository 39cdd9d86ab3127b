//! Diesel table definitions for the certificate tracker.
//!
//! Tables: tracker_users, certificate_records, activity_logs,
//! dashboard_stats. Created by [`crate::migration::MIGRATION_SQL`].

diesel::table! {
    tracker_users (id) {
        id -> Int8,
        username -> Varchar,
        email -> Varchar,
        password -> Varchar,
        is_superuser -> Bool,
        is_staff -> Bool,
        is_active -> Bool,
        last_login -> Nullable<Timestamptz>,
        date_joined -> Timestamptz,
    }
}

diesel::table! {
    certificate_records (id) {
        id -> Int8,
        name -> Varchar,
        index_number -> Varchar,
        programme -> Varchar,
        slip_number -> Nullable<Varchar>,
        department -> Varchar,
        upload_date -> Timestamptz,
        status -> Varchar,
        collected_at -> Nullable<Timestamptz>,
        uploaded_by -> Nullable<Int8>,
        collected_by -> Nullable<Int8>,
    }
}

diesel::table! {
    activity_logs (id) {
        id -> Int8,
        user_id -> Nullable<Int8>,
        action -> Varchar,
        description -> Text,
        timestamp -> Timestamptz,
        ip_address -> Nullable<Varchar>,
        certificate_id -> Nullable<Int8>,
    }
}

diesel::table! {
    dashboard_stats (id) {
        id -> Int8,
        date -> Date,
        total_certificates -> Int8,
        collected_certificates -> Int8,
        pending_certificates -> Int8,
        total_uploads_today -> Int8,
        total_collections_today -> Int8,
        active_users -> Int8,
        last_updated -> Timestamptz,
    }
}

diesel::joinable!(activity_logs -> tracker_users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    tracker_users,
    certificate_records,
    activity_logs,
    dashboard_stats,
);
