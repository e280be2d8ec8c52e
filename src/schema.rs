// Kept in sync by hand with the DDL in repository/ledger.rs.

diesel::table! {
    comments (id) {
        id -> BigInt,
        page_number -> Integer,
        author -> Text,
        content -> Text,
        #[sql_name = "timestamp"]
        posted_at -> Text,
        parent_id -> Nullable<BigInt>,
        url -> Text,
        first_seen_at -> Text,
    }
}
