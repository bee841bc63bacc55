//! Test fixtures for engine integration tests
//!
//! A small declared model (users, roles, posts) plus the column sets of a
//! legacy `users` table that has drifted from it.

#![allow(dead_code)]

use metasync_catalog::MockCatalog;
use metasync_core::{
    model_from_entities, CascadeRule, DeclaredEntity, DeclaredField, EntityModel,
    FieldKind, IntrospectedColumn, Profile,
};
use metasync_engine::Reconciler;
use std::sync::Arc;

/// Users with tenant, version, audit timestamps and a many-to-many to roles
pub fn user_entity() -> DeclaredEntity {
    DeclaredEntity::new("User", "users")
        .with_tenant_field("tenant_id")
        .with_version_field("version")
        .with_field(
            DeclaredField::new("id", FieldKind::Identifier)
                .primary_key()
                .generated(),
        )
        .with_field(
            DeclaredField::new("email", FieldKind::Email)
                .required()
                .unique()
                .with_max_length(255),
        )
        .with_field(
            DeclaredField::new("display_name", FieldKind::ShortText)
                .with_max_length(100),
        )
        .with_field(DeclaredField::new("tenant_id", FieldKind::Identifier).required())
        .with_field(
            DeclaredField::new("version", FieldKind::LongInteger).with_default("0"),
        )
        .with_field(DeclaredField::new("created_at", FieldKind::Timestamp).generated())
        .with_field(DeclaredField::new("updated_at", FieldKind::Timestamp))
        .with_field(
            DeclaredField::new("roles", FieldKind::ManyToMany)
                .references("Role")
                .with_join_table("user_roles", "user_id", "role_id"),
        )
}

pub fn role_entity() -> DeclaredEntity {
    DeclaredEntity::new("Role", "roles")
        .with_field(
            DeclaredField::new("id", FieldKind::Identifier)
                .primary_key()
                .generated(),
        )
        .with_field(
            DeclaredField::new("name", FieldKind::ShortText)
                .required()
                .unique()
                .with_max_length(64),
        )
        .with_field(DeclaredField::new("description", FieldKind::LongText))
}

/// Posts reference their author; the name sorts before its target
pub fn post_entity() -> DeclaredEntity {
    DeclaredEntity::new("Post", "posts")
        .with_field(
            DeclaredField::new("id", FieldKind::Identifier)
                .primary_key()
                .generated(),
        )
        .with_field(
            DeclaredField::new("author_id", FieldKind::ManyToOne)
                .references("User")
                .required()
                .on_delete(CascadeRule::Cascade),
        )
        .with_field(
            DeclaredField::new("title", FieldKind::ShortText)
                .required()
                .with_max_length(200),
        )
        .with_field(DeclaredField::new("body", FieldKind::LongText))
        .with_field(
            DeclaredField::new("published", FieldKind::Boolean)
                .required()
                .with_default("false"),
        )
        .with_field(
            DeclaredField::new("comments", FieldKind::OneToMany)
                .references("Comment"),
        )
}

pub fn blog_model() -> EntityModel {
    model_from_entities(vec![user_entity(), role_entity(), post_entity()])
}

/// `users` as an older release left it
///
/// Compared with [`user_entity`]: `email` is missing, `display_name` is
/// TEXT, `tenant_id` is nullable, `version` is INTEGER, `created_at` has no
/// time zone and `legacy_code` is no longer declared.
pub fn legacy_users_columns() -> Vec<IntrospectedColumn> {
    vec![
        IntrospectedColumn::new("id", "uuid")
            .primary_key()
            .with_default("gen_random_uuid()"),
        IntrospectedColumn::new("display_name", "text"),
        IntrospectedColumn::new("tenant_id", "uuid"),
        IntrospectedColumn::new("version", "integer").with_default("0"),
        IntrospectedColumn::new("created_at", "timestamp without time zone").with_default("now()"),
        IntrospectedColumn::new("updated_at", "timestamp with time zone"),
        IntrospectedColumn::varchar("legacy_code", 20),
    ]
}

/// Reconciler sharing state with the given mock
pub fn reconciler(catalog: &MockCatalog, profile: Profile) -> Reconciler {
    Reconciler::new(Arc::new(catalog.clone()), profile)
}
