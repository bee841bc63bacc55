//! Test fixtures for catalog integration tests
//!
//! Column sets matching the tables a reconciled application typically has.

#![allow(dead_code)]

use metasync_core::IntrospectedColumn;

/// Users table as created by a first reconcile pass
pub fn users_columns() -> Vec<IntrospectedColumn> {
    vec![
        IntrospectedColumn::new("id", "uuid")
            .primary_key()
            .with_default("gen_random_uuid()"),
        IntrospectedColumn::varchar("email", 255).not_null(),
        IntrospectedColumn::varchar("display_name", 100),
        IntrospectedColumn::new("tenant_id", "uuid").not_null(),
        IntrospectedColumn::new("version", "bigint").not_null().with_default("0"),
        IntrospectedColumn::new("created_at", "timestamp with time zone").with_default("now()"),
        IntrospectedColumn::new("updated_at", "timestamp with time zone"),
    ]
}

/// Roles table
pub fn roles_columns() -> Vec<IntrospectedColumn> {
    vec![
        IntrospectedColumn::new("id", "uuid").primary_key(),
        IntrospectedColumn::varchar("name", 64).not_null(),
        IntrospectedColumn::new("description", "text"),
    ]
}

/// Orders table with a foreign key to users
pub fn orders_columns() -> Vec<IntrospectedColumn> {
    let mut total = IntrospectedColumn::new("total_amount", "numeric").not_null();
    total.numeric_precision = Some(10);
    total.numeric_scale = Some(2);

    vec![
        IntrospectedColumn::new("id", "uuid").primary_key(),
        IntrospectedColumn::new("user_id", "uuid")
            .not_null()
            .with_foreign_key("users", "id"),
        total,
        IntrospectedColumn::new("placed_on", "date"),
        IntrospectedColumn::new("metadata", "jsonb"),
    ]
}

/// Junction table for users and roles
pub fn user_roles_columns() -> Vec<IntrospectedColumn> {
    vec![
        IntrospectedColumn::new("user_id", "uuid").primary_key(),
        IntrospectedColumn::new("role_id", "uuid").primary_key(),
        IntrospectedColumn::new("created_at", "timestamp with time zone").with_default("now()"),
    ]
}
