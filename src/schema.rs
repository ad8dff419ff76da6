// Diesel table definitions. Kept in sync by hand with DbContext::init_schema.

diesel::table! {
    users (id) {
        id -> Integer,
        email -> Text,
        name -> Text,
        email_alerts_enabled -> Integer,
        http_timeout -> Integer,
        check_frequency -> Text,
        webhook_url -> Nullable<Text>,
        webhook_secret -> Nullable<Text>,
        webhook_events -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    backlinks (id) {
        id -> Integer,
        created_by -> Nullable<Integer>,
        source_url -> Text,
        target_url -> Text,
        anchor_text -> Nullable<Text>,
        rel_attributes -> Nullable<Text>,
        is_dofollow -> Integer,
        http_status -> Nullable<Integer>,
        status -> Text,
        last_checked_at -> Nullable<Text>,
        first_seen_at -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    backlink_checks (id) {
        id -> Integer,
        backlink_id -> Integer,
        checked_at -> Text,
        http_status -> Nullable<Integer>,
        is_present -> Integer,
        anchor_text -> Nullable<Text>,
        rel_attributes -> Nullable<Text>,
        error_message -> Nullable<Text>,
    }
}

diesel::table! {
    alerts (id) {
        id -> Integer,
        backlink_id -> Integer,
        alert_type -> Text,
        severity -> Text,
        title -> Text,
        message -> Text,
        metadata -> Text,
        is_read -> Integer,
        created_at -> Text,
    }
}

diesel::joinable!(backlink_checks -> backlinks (backlink_id));
diesel::joinable!(alerts -> backlinks (backlink_id));
diesel::joinable!(backlinks -> users (created_by));

diesel::allow_tables_to_appear_in_same_query!(users, backlinks, backlink_checks, alerts);
