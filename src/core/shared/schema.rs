diesel::table! {
    users (id) {
        id -> Int4,
        username -> Varchar,
        password_hash -> Varchar,
        email -> Varchar,
        role -> Varchar,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    tickets (id) {
        id -> Int4,
        user_id -> Int4,
        query -> Text,
        status -> Varchar,
        priority -> Varchar,
        reply -> Nullable<Text>,
        assigned_to -> Nullable<Int4>,
        assigned_by -> Nullable<Int4>,
        assigned_at -> Nullable<Timestamptz>,
        assignment_notes -> Nullable<Text>,
        completed_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_assignment_history (id) {
        id -> Int4,
        ticket_id -> Int4,
        assigned_to -> Nullable<Int4>,
        assigned_by -> Nullable<Int4>,
        assigned_at -> Timestamptz,
        unassigned_at -> Nullable<Timestamptz>,
        is_active -> Bool,
        notes -> Nullable<Text>,
    }
}

diesel::table! {
    user_activity_log (id) {
        id -> Int4,
        user_id -> Nullable<Int4>,
        action -> Varchar,
        details -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    notifications (id) {
        id -> Int4,
        user_id -> Nullable<Int4>,
        role -> Nullable<Varchar>,
        ticket_id -> Nullable<Int4>,
        message -> Text,
        notification_type -> Varchar,
        is_read -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    chat_history (id) {
        id -> Int4,
        user_id -> Int4,
        session_id -> Nullable<Varchar>,
        message -> Text,
        response -> Text,
        source -> Varchar,
        status -> Varchar,
        confidence -> Float8,
        ticket_created -> Bool,
        ticket_id -> Nullable<Int4>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    user_settings (user_id) {
        user_id -> Int4,
        email -> Nullable<Varchar>,
        email_notifications -> Bool,
        browser_notifications -> Bool,
        ticket_assignment_notifications -> Bool,
        ticket_update_notifications -> Bool,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(tickets -> users (user_id));
diesel::joinable!(ticket_assignment_history -> tickets (ticket_id));
diesel::joinable!(chat_history -> users (user_id));
diesel::joinable!(user_settings -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    tickets,
    ticket_assignment_history,
    user_activity_log,
    notifications,
    chat_history,
    user_settings,
);
