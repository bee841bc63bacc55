//! Integration tests for the reconciliation engine
//!
//! Every test runs against the in-memory `MockCatalog`, which applies the
//! DDL the engine emits so that later introspection sees the result.
//!
//! ```bash
//! cargo test -p metasync-engine --test integration_tests
//! ```

mod fixtures;

use metasync_catalog::{CatalogError, MockCatalog, MockCatalogBuilder, SchemaIntrospector};
use metasync_core::{
    model_from_entities, ChangeKind, DeclaredEntity, DeclaredField, DriftState, EntityModel,
    EntityOutcome, FieldKind, IntrospectedColumn, ModelError, Profile, ReconcileConfig,
};
use metasync_engine::{
    DiffOptions, ReconcileError, Reconciler, SchemaApplier, SchemaDiffEngine,
    TypeConversionRegistry,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const USERS_DDL: &str = "CREATE TABLE IF NOT EXISTS users (\
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(), \
    email VARCHAR(255) NOT NULL, \
    display_name VARCHAR(100), \
    tenant_id UUID NOT NULL, \
    version BIGINT DEFAULT 0, \
    created_at TIMESTAMPTZ DEFAULT NOW(), \
    updated_at TIMESTAMPTZ)";

const POSTS_DDL: &str = "CREATE TABLE IF NOT EXISTS posts (\
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(), \
    author_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE, \
    title VARCHAR(200) NOT NULL, \
    body TEXT, \
    published BOOLEAN DEFAULT FALSE)";

const USER_ROLES_DDL: &str = "CREATE TABLE IF NOT EXISTS user_roles (\
    user_id UUID NOT NULL, \
    role_id UUID NOT NULL, \
    created_at TIMESTAMPTZ DEFAULT NOW(), \
    PRIMARY KEY (user_id, role_id))";

fn single_field_entity(name: &str, table: &str, field: DeclaredField) -> DeclaredEntity {
    DeclaredEntity::new(name, table)
        .with_field(
            DeclaredField::new("id", FieldKind::Identifier)
                .primary_key()
                .generated(),
        )
        .with_field(field)
}

// =============================================================================
// Fresh Database
// =============================================================================

#[tokio::test]
async fn test_reconcile_creates_all_tables() {
    let catalog = MockCatalog::new();
    let reconciler = fixtures::reconciler(&catalog, Profile::Development);
    let model = fixtures::blog_model();

    let report = reconciler.reconcile_all(&model).await;

    assert!(!report.has_failures());
    assert_eq!(report.summary.created, 3);
    assert_eq!(report.entities["User"], EntityOutcome::Created);
    assert_eq!(
        catalog.table_names().await,
        vec!["posts", "roles", "user_roles", "users"]
    );

    assert_eq!(catalog.executed_matching("CREATE TABLE IF NOT EXISTS users").await, vec![USERS_DDL]);
    assert_eq!(catalog.executed_matching("CREATE TABLE IF NOT EXISTS posts").await, vec![POSTS_DDL]);
    assert_eq!(catalog.executed_matching("CREATE TABLE IF NOT EXISTS user_roles").await, vec![USER_ROLES_DDL]);
}

#[tokio::test]
async fn test_referenced_tables_are_created_first() {
    let catalog = MockCatalog::new();
    let reconciler = fixtures::reconciler(&catalog, Profile::Development);

    reconciler.reconcile_all(&fixtures::blog_model()).await;

    let creates: Vec<String> = catalog
        .executed_matching("CREATE TABLE IF NOT EXISTS")
        .await
        .into_iter()
        .map(|sql| sql.split_whitespace().nth(5).unwrap_or_default().to_string())
        .collect();
    assert_eq!(creates, vec!["roles", "users", "user_roles", "posts"]);
}

#[tokio::test]
async fn test_supporting_structures() {
    let catalog = MockCatalog::new();
    let reconciler = fixtures::reconciler(&catalog, Profile::Development);

    reconciler.reconcile_all(&fixtures::blog_model()).await;

    assert_eq!(
        catalog.executed_matching("CREATE INDEX").await,
        vec![
            "CREATE INDEX IF NOT EXISTS idx_users_tenant_id ON users(tenant_id)".to_string(),
            "CREATE INDEX IF NOT EXISTS idx_users_version ON users(version)".to_string(),
            "CREATE INDEX IF NOT EXISTS idx_posts_author_id ON posts(author_id)".to_string(),
        ]
    );
    assert_eq!(
        catalog.executed_matching("ADD CONSTRAINT").await,
        vec![
            "ALTER TABLE roles ADD CONSTRAINT uk_roles_name UNIQUE (name)".to_string(),
            "ALTER TABLE users ADD CONSTRAINT uk_users_email UNIQUE (email)".to_string(),
        ]
    );

    let function = catalog.executed_matching("CREATE OR REPLACE FUNCTION").await;
    assert_eq!(function.len(), 1);
    assert!(function[0].contains("NEW.version = COALESCE(OLD.version, 0) + 1;"));
    assert!(function[0].contains("NEW.updated_at = NOW();"));
    assert_eq!(
        catalog.executed_matching("trigger_increment_users_version").await,
        vec![
            "DROP TRIGGER IF EXISTS trigger_increment_users_version ON users".to_string(),
            "CREATE TRIGGER trigger_increment_users_version BEFORE UPDATE ON users \
             FOR EACH ROW EXECUTE FUNCTION increment_users_version()"
                .to_string(),
        ]
    );
}

// =============================================================================
// Idempotence
// =============================================================================

#[tokio::test]
async fn test_second_pass_is_unchanged() {
    let catalog = MockCatalog::new();
    let reconciler = fixtures::reconciler(&catalog, Profile::Development);
    let model = fixtures::blog_model();

    reconciler.reconcile_all(&model).await;
    catalog.clear_executed().await;

    let report = reconciler.reconcile_all(&model).await;
    assert_eq!(report.summary.unchanged, 3);
    assert!(catalog.executed_matching("CREATE TABLE").await.is_empty());
    assert!(catalog.executed_matching("ALTER TABLE").await.is_empty());

    for name in model.keys() {
        let diff = reconciler.status_for(&model, name).await.unwrap();
        assert!(diff.is_empty(), "{name}: {:?}", diff.changes);
    }
}

#[tokio::test]
async fn test_detect_changes_twice_after_apply() {
    let catalog = MockCatalogBuilder::new()
        .with_table("users", fixtures::legacy_users_columns())
        .build();
    let reconciler = fixtures::reconciler(&catalog, Profile::Development);
    let model = model_from_entities(vec![fixtures::user_entity()]);

    reconciler.reconcile_all(&model).await;

    let first = reconciler.status_for(&model, "User").await.unwrap();
    let second = reconciler.status_for(&model, "User").await.unwrap();
    assert_eq!(first, second);
    assert!(first.changes.iter().all(|c| c.risky));
}

#[tokio::test]
async fn test_concurrent_passes_are_serialized() {
    let catalog = MockCatalog::new();
    let reconciler = fixtures::reconciler(&catalog, Profile::Development);
    let model = fixtures::blog_model();

    let (first, second) = tokio::join!(reconciler.reconcile_all(&model), reconciler.reconcile_all(&model));

    assert!(!first.has_failures() && !second.has_failures());
    assert_eq!(first.summary.created + second.summary.created, 3);
    assert_eq!(first.summary.unchanged + second.summary.unchanged, 3);
    assert_eq!(catalog.executed_matching("ADD CONSTRAINT").await.len(), 2);
}

// =============================================================================
// Key Layouts and Identifier Names
// =============================================================================

/// Reconcile, then assert a second pass changes nothing
async fn assert_settles(catalog: &MockCatalog, reconciler: &Reconciler, model: &EntityModel) {
    catalog.clear_executed().await;

    let report = reconciler.reconcile_all(model).await;
    assert!(!report.has_failures());
    assert_eq!(report.summary.unchanged, model.len());
    assert!(catalog.executed_matching("ALTER TABLE").await.is_empty());

    for name in model.keys() {
        let diff = reconciler.status_for(model, name).await.unwrap();
        assert!(diff.is_empty(), "{name}: {:?}", diff.changes);
    }
}

#[tokio::test]
async fn test_multiple_key_fields_share_one_primary_key() {
    let catalog = MockCatalog::new();
    let reconciler = fixtures::reconciler(&catalog, Profile::Development);
    let membership = DeclaredEntity::new("Membership", "memberships")
        .with_field(DeclaredField::new("user_id", FieldKind::Identifier).primary_key().required())
        .with_field(DeclaredField::new("group_id", FieldKind::Identifier).primary_key().required())
        .with_field(DeclaredField::new("joined_at", FieldKind::Timestamp).generated());
    let model = model_from_entities(vec![membership]);

    let report = reconciler.reconcile_all(&model).await;

    assert_eq!(report.entities["Membership"], EntityOutcome::Created);
    assert_eq!(
        catalog.executed_matching("CREATE TABLE").await,
        vec![
            "CREATE TABLE IF NOT EXISTS memberships (user_id UUID NOT NULL, group_id UUID NOT NULL, \
             joined_at TIMESTAMPTZ DEFAULT NOW(), PRIMARY KEY (user_id, group_id))"
                .to_string()
        ]
    );
    let columns = catalog.columns("memberships").await.unwrap();
    assert!(columns["user_id"].primary_key && columns["group_id"].primary_key);
    assert!(!columns["joined_at"].primary_key);

    assert_settles(&catalog, &reconciler, &model).await;
}

#[tokio::test]
async fn test_id_field_with_flagged_key_field() {
    let catalog = MockCatalog::new();
    let reconciler = fixtures::reconciler(&catalog, Profile::Development);
    let account = DeclaredEntity::new("Account", "accounts")
        .with_field(DeclaredField::new("id", FieldKind::Identifier).generated())
        .with_field(DeclaredField::new("tenant_id", FieldKind::Identifier).primary_key().required())
        .with_field(DeclaredField::new("label", FieldKind::ShortText).with_max_length(80));
    let model = model_from_entities(vec![account]);

    let report = reconciler.reconcile_all(&model).await;

    assert_eq!(report.entities["Account"], EntityOutcome::Created);
    assert_eq!(
        catalog.executed_matching("CREATE TABLE").await,
        vec![
            "CREATE TABLE IF NOT EXISTS accounts (id UUID DEFAULT gen_random_uuid(), \
             tenant_id UUID NOT NULL, label VARCHAR(80), PRIMARY KEY (id, tenant_id))"
                .to_string()
        ]
    );
    let columns = catalog.columns("accounts").await.unwrap();
    assert!(columns["id"].primary_key && !columns["id"].nullable);
    assert!(columns["tenant_id"].primary_key);

    assert_settles(&catalog, &reconciler, &model).await;
}

#[tokio::test]
async fn test_mixed_case_table_settles() {
    let catalog = MockCatalog::new();
    let reconciler = fixtures::reconciler(&catalog, Profile::Development);
    let member = single_field_entity(
        "Member",
        "Members",
        DeclaredField::new("Email", FieldKind::Email)
            .required()
            .unique()
            .with_max_length(255),
    );
    let model = model_from_entities(vec![member]);

    let report = reconciler.reconcile_all(&model).await;

    assert_eq!(report.entities["Member"], EntityOutcome::Created);
    assert_eq!(catalog.table_names().await, vec!["members"]);
    assert_eq!(
        catalog.executed_matching("ADD CONSTRAINT").await,
        vec!["ALTER TABLE Members ADD CONSTRAINT uk_members_email UNIQUE (Email)".to_string()]
    );

    assert_settles(&catalog, &reconciler, &model).await;
    assert!(reconciler.catalog().table_exists("Members").await.unwrap());
}

#[tokio::test]
async fn test_long_constraint_name_is_truncated() {
    let catalog = MockCatalog::new();
    let reconciler = fixtures::reconciler(&catalog, Profile::Development);
    let entries = single_field_entity(
        "AuditEntry",
        "organization_membership_audit_entries",
        DeclaredField::new("primary_contact_email_address", FieldKind::Email)
            .unique()
            .with_max_length(255),
    );
    let model = model_from_entities(vec![entries]);

    let report = reconciler.reconcile_all(&model).await;
    assert!(!report.has_failures());

    let added = catalog.executed_matching("ADD CONSTRAINT").await;
    assert_eq!(
        added,
        vec![
            "ALTER TABLE organization_membership_audit_entries ADD CONSTRAINT \
             uk_organization_membership_audit_entries_primary_contact_email_ \
             UNIQUE (primary_contact_email_address)"
                .to_string()
        ]
    );
    assert!(catalog
        .constraint_exists(
            "organization_membership_audit_entries",
            "uk_organization_membership_audit_entries_primary_contact_email_address",
        )
        .await
        .unwrap());

    assert_settles(&catalog, &reconciler, &model).await;
}

// =============================================================================
// Drifted Tables
// =============================================================================

#[tokio::test]
async fn test_legacy_table_diff() {
    let catalog = MockCatalogBuilder::new()
        .with_table("users", fixtures::legacy_users_columns())
        .build();
    let engine = SchemaDiffEngine::new(Arc::new(catalog));
    let model = model_from_entities(vec![fixtures::user_entity()]);

    let diff = engine
        .detect_changes(&fixtures::user_entity(), &model)
        .await
        .unwrap();

    let summary: Vec<(&str, ChangeKind, bool)> = diff
        .changes
        .iter()
        .map(|c| (c.column.as_str(), c.kind, c.risky))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("email", ChangeKind::Add, false),
            ("display_name", ChangeKind::AlterType, true),
            ("tenant_id", ChangeKind::AlterNullable, true),
            ("version", ChangeKind::AlterType, false),
            ("created_at", ChangeKind::AlterType, false),
        ]
    );
    assert_eq!(
        diff.change_for("display_name").unwrap().sql,
        "ALTER TABLE users ALTER COLUMN display_name TYPE VARCHAR(100) USING LEFT(display_name, 100)"
    );
    assert_eq!(
        diff.change_for("version").unwrap().sql,
        "ALTER TABLE users ALTER COLUMN version TYPE BIGINT"
    );
    assert_eq!(
        diff.change_for("tenant_id").unwrap().sql,
        "ALTER TABLE users ALTER COLUMN tenant_id SET NOT NULL"
    );
}

#[tokio::test]
async fn test_risky_changes_are_never_executed() {
    let catalog = MockCatalogBuilder::new()
        .with_table("users", fixtures::legacy_users_columns())
        .build();
    let reconciler = fixtures::reconciler(&catalog, Profile::Development);
    let model = model_from_entities(vec![fixtures::user_entity()]);

    let report = reconciler.reconcile_all(&model).await;

    assert_eq!(
        report.entities["User"],
        EntityOutcome::Updated {
            applied: 3,
            skipped_risky: 2
        }
    );
    assert_eq!(report.summary.pending_risky, 2);
    assert!(catalog.executed_matching("LEFT(").await.is_empty());
    assert!(catalog.executed_matching("SET NOT NULL").await.is_empty());

    let status = reconciler.status_all(&model).await.unwrap();
    let users = &status.entities["User"];
    assert_eq!(users.state, DriftState::Drifted);
    assert_eq!(users.summary.risky, 2);
    assert_eq!(users.summary.safe, 0);
    assert_eq!(status.entities_needing_review(), vec!["User"]);
}

#[tokio::test]
async fn test_orphaned_columns_are_never_dropped() {
    let catalog = MockCatalogBuilder::new()
        .with_table("users", fixtures::legacy_users_columns())
        .build();
    let reconciler = fixtures::reconciler(&catalog, Profile::Development);
    let model = model_from_entities(vec![fixtures::user_entity()]);

    reconciler.reconcile_all(&model).await;
    let diff = reconciler.status_for(&model, "User").await.unwrap();

    assert!(diff.change_for("legacy_code").is_none());
    assert!(catalog.executed_matching("DROP COLUMN").await.is_empty());
    assert!(catalog.executed_matching("DROP TABLE").await.is_empty());

    let columns = metasync_catalog::SchemaIntrospector::columns(&catalog, "users")
        .await
        .unwrap();
    assert!(columns.contains_key("legacy_code"));
}

#[tokio::test]
async fn test_missing_table_yields_empty_diff() {
    let engine = SchemaDiffEngine::new(Arc::new(MockCatalog::new()));
    let model = fixtures::blog_model();

    let diff = engine
        .detect_changes(&fixtures::user_entity(), &model)
        .await
        .unwrap();
    assert!(diff.is_empty());
    assert_eq!(diff.table, "users");
}

// =============================================================================
// Column Rules
// =============================================================================

#[tokio::test]
async fn test_new_required_column_is_added() {
    let entity = single_field_entity(
        "Customer",
        "customers",
        DeclaredField::new("email", FieldKind::ShortText)
            .required()
            .with_max_length(255),
    );
    let catalog = MockCatalogBuilder::new()
        .with_table("customers", vec![IntrospectedColumn::new("id", "uuid").primary_key()])
        .build();
    let engine = SchemaDiffEngine::new(Arc::new(catalog));

    let diff = engine
        .detect_changes(&entity, &model_from_entities(vec![entity.clone()]))
        .await
        .unwrap();

    assert_eq!(diff.changes.len(), 1);
    assert_eq!(diff.changes[0].kind, ChangeKind::Add);
    assert!(!diff.changes[0].risky);
    assert_eq!(
        diff.changes[0].sql,
        "ALTER TABLE customers ADD COLUMN email VARCHAR(255) NOT NULL"
    );
}

#[tokio::test]
async fn test_id_field_nullability_is_never_altered() {
    let entity = DeclaredEntity::new("Account", "accounts")
        .with_field(DeclaredField::new("id", FieldKind::Identifier).required())
        .with_field(DeclaredField::new("owner", FieldKind::LongText));
    let catalog = MockCatalogBuilder::new()
        .with_table(
            "accounts",
            vec![
                IntrospectedColumn::new("id", "uuid"),
                IntrospectedColumn::new("owner", "text"),
            ],
        )
        .build();
    let engine = SchemaDiffEngine::new(Arc::new(catalog));

    let diff = engine
        .detect_changes(&entity, &model_from_entities(vec![entity.clone()]))
        .await
        .unwrap();

    assert!(diff.changes.iter().all(|c| c.kind != ChangeKind::AlterNullable));
    assert!(diff.is_empty());
}

#[tokio::test]
async fn test_wider_varchar_is_accepted() {
    let entity = single_field_entity(
        "Tag",
        "tags",
        DeclaredField::new("label", FieldKind::ShortText).with_max_length(100),
    );
    let catalog = MockCatalogBuilder::new()
        .with_table(
            "tags",
            vec![
                IntrospectedColumn::new("id", "uuid").primary_key(),
                IntrospectedColumn::varchar("label", 255),
            ],
        )
        .build();
    let engine = SchemaDiffEngine::new(Arc::new(catalog));

    let diff = engine
        .detect_changes(&entity, &model_from_entities(vec![entity.clone()]))
        .await
        .unwrap();
    assert!(diff.is_empty(), "{:?}", diff.changes);
}

#[tokio::test]
async fn test_narrower_varchar_is_flagged_when_enabled() {
    let entity = single_field_entity(
        "Tag",
        "tags",
        DeclaredField::new("label", FieldKind::ShortText).with_max_length(50),
    );
    let catalog = MockCatalogBuilder::new()
        .with_table(
            "tags",
            vec![
                IntrospectedColumn::new("id", "uuid").primary_key(),
                IntrospectedColumn::varchar("label", 255),
            ],
        )
        .build();
    let config = ReconcileConfig {
        flag_varchar_narrowing: true,
        ..ReconcileConfig::default()
    };
    let reconciler = Reconciler::from_config(Arc::new(catalog.clone()), &config);
    let model = model_from_entities(vec![entity]);

    let diff = reconciler.status_for(&model, "Tag").await.unwrap();

    assert_eq!(diff.changes.len(), 1);
    let change = &diff.changes[0];
    assert_eq!(change.kind, ChangeKind::AlterType);
    assert!(change.risky);
    assert!(change.sql.contains("LEFT("));
    assert_eq!(
        change.sql,
        "ALTER TABLE tags ALTER COLUMN label TYPE VARCHAR(50) USING LEFT(label, 50)"
    );
    assert_eq!(
        change.risk_description.as_deref(),
        Some("Data will be truncated to 50 characters")
    );

    let report = reconciler.reconcile_all(&model).await;
    assert_eq!(
        report.entities["Tag"],
        EntityOutcome::Updated {
            applied: 0,
            skipped_risky: 1
        }
    );
    assert!(catalog.executed_matching("ALTER COLUMN label").await.is_empty());
}

#[tokio::test]
async fn test_uuid_stored_as_text_is_accepted() {
    let entity = single_field_entity(
        "Session",
        "sessions",
        DeclaredField::new("token", FieldKind::Identifier),
    );
    let catalog = MockCatalogBuilder::new()
        .with_table(
            "sessions",
            vec![
                IntrospectedColumn::new("id", "uuid").primary_key(),
                IntrospectedColumn::varchar("token", 36),
            ],
        )
        .build();
    let engine = SchemaDiffEngine::new(Arc::new(catalog));

    let diff = engine
        .detect_changes(&entity, &model_from_entities(vec![entity.clone()]))
        .await
        .unwrap();
    assert!(diff.is_empty());
}

#[test]
fn test_conversions_are_directional() {
    let registry = TypeConversionRegistry::with_defaults();

    let narrowing = registry.find("BIGINT", "INTEGER").unwrap();
    let widening = registry.find("INTEGER", "BIGINT").unwrap();

    assert!(narrowing.risky);
    assert!(!widening.risky);
    assert_ne!(narrowing, widening);
    assert!(registry.find("DOUBLE PRECISION", "REAL").is_none());
    assert!(registry.find("JSONB", "JSON").is_none());
}

#[tokio::test]
async fn test_custom_conversion_registry() {
    let mut registry = TypeConversionRegistry::with_defaults();
    registry.register(
        "BOOLEAN",
        "INTEGER",
        metasync_engine::TypeConversion::safe("TYPE INTEGER USING {column}::INTEGER"),
    );

    let entity = single_field_entity(
        "Flag",
        "flags",
        DeclaredField::new("enabled", FieldKind::Integer),
    );
    let catalog = MockCatalogBuilder::new()
        .with_table(
            "flags",
            vec![
                IntrospectedColumn::new("id", "uuid").primary_key(),
                IntrospectedColumn::new("enabled", "boolean"),
            ],
        )
        .build();
    let reconciler =
        Reconciler::with_conversions(Arc::new(catalog.clone()), Profile::Test, Arc::new(registry));
    let model = model_from_entities(vec![entity]);

    let report = reconciler.reconcile_all(&model).await;

    assert_eq!(
        report.entities["Flag"],
        EntityOutcome::Updated {
            applied: 1,
            skipped_risky: 0
        }
    );
    assert_eq!(
        catalog.executed_matching("ALTER COLUMN enabled").await,
        vec!["ALTER TABLE flags ALTER COLUMN enabled TYPE INTEGER USING enabled::INTEGER".to_string()]
    );
    assert!(reconciler.status_for(&model, "Flag").await.unwrap().is_empty());
}

// =============================================================================
// Junction Tables
// =============================================================================

#[tokio::test]
async fn test_junction_table_creation() {
    let catalog = MockCatalog::new();
    let applier = SchemaApplier::new(Arc::new(catalog.clone()), Profile::Development);
    let user = fixtures::user_entity();

    let created = applier.create_many_to_many_junction_tables(&user).await.unwrap();

    assert_eq!(created, 1);
    assert_eq!(catalog.executed().await, vec![USER_ROLES_DDL.to_string()]);

    catalog.clear_executed().await;
    let again = applier.create_many_to_many_junction_tables(&user).await.unwrap();
    assert_eq!(again, 0);
    assert!(catalog.executed().await.is_empty());
}

#[tokio::test]
async fn test_junction_defaults_and_missing_join_table() {
    let catalog = MockCatalog::new();
    let applier = SchemaApplier::new(Arc::new(catalog.clone()), Profile::Development);

    let mut defaulted = DeclaredField::new("tags", FieldKind::ManyToMany).references("Tag");
    defaulted.relation.join_table = Some("article_tags".into());
    let entity = DeclaredEntity::new("Article", "articles")
        .with_id_field("article_id")
        .with_field(defaulted)
        .with_field(DeclaredField::new("editors", FieldKind::ManyToMany).references("User"));

    let created = applier.create_many_to_many_junction_tables(&entity).await.unwrap();

    assert_eq!(created, 1);
    assert_eq!(
        catalog.executed().await,
        vec![
            "CREATE TABLE IF NOT EXISTS article_tags (article_id UUID NOT NULL, target_id UUID NOT NULL, \
             created_at TIMESTAMPTZ DEFAULT NOW(), PRIMARY KEY (article_id, target_id))"
                .to_string()
        ]
    );
}

// =============================================================================
// Failure Handling
// =============================================================================

#[tokio::test]
async fn test_failed_entity_does_not_stop_the_pass() {
    let catalog = MockCatalogBuilder::new()
        .with_failing_statement("CREATE TABLE IF NOT EXISTS roles", "permission denied for schema public")
        .build();
    let reconciler = fixtures::reconciler(&catalog, Profile::Development);

    let report = reconciler.reconcile_all(&fixtures::blog_model()).await;

    assert!(report.has_failures());
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.created, 2);
    match &report.entities["Role"] {
        EntityOutcome::Failed { error } => assert!(error.contains("permission denied")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(catalog.has_table("users").await);
    assert!(catalog.has_table("posts").await);
}

#[tokio::test]
async fn test_apply_failure_aborts_remaining_changes() {
    let catalog = MockCatalogBuilder::new()
        .with_table("users", fixtures::legacy_users_columns())
        .with_failing_statement("ADD COLUMN email", "could not obtain lock on relation \"users\"")
        .build();
    let reconciler = fixtures::reconciler(&catalog, Profile::Development);
    let model = model_from_entities(vec![fixtures::user_entity()]);

    let result = reconciler.apply_safe(&model, "User").await;

    match result {
        Err(ReconcileError::Apply { entity, sql, source }) => {
            assert_eq!(entity, "User");
            assert!(sql.contains("ADD COLUMN email"));
            assert!(matches!(source, CatalogError::Execution { .. }));
        }
        other => panic!("expected apply failure, got {:?}", other),
    }
    assert!(catalog.executed_matching("TYPE BIGINT").await.is_empty());
    assert!(catalog.executed_matching("CREATE INDEX").await.is_empty());
}

#[tokio::test]
async fn test_introspection_failure_is_isolated() {
    let catalog = MockCatalogBuilder::new()
        .with_introspection_error(
            "posts",
            CatalogError::PermissionDenied("permission denied for table posts".into()),
        )
        .build();
    let reconciler = fixtures::reconciler(&catalog, Profile::Development);

    let report = reconciler.reconcile_all(&fixtures::blog_model()).await;

    assert_eq!(report.summary.failed, 1);
    match &report.entities["Post"] {
        EntityOutcome::Failed { error } => {
            assert!(error.starts_with("Introspection failed"));
            assert!(error.contains("permission denied for table posts"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(report.entities["User"], EntityOutcome::Created);
}

#[tokio::test]
async fn test_index_failures_are_soft() {
    let catalog = MockCatalogBuilder::new()
        .with_failing_statement("CREATE INDEX", "out of shared memory")
        .build();
    let reconciler = fixtures::reconciler(&catalog, Profile::Development);

    let report = reconciler.reconcile_all(&fixtures::blog_model()).await;

    assert!(!report.has_failures());
    assert_eq!(report.summary.created, 3);
    assert!(catalog.executed_matching("CREATE INDEX").await.is_empty());
}

#[tokio::test]
async fn test_trigger_failure_is_hard() {
    let catalog = MockCatalogBuilder::new()
        .with_failing_statement("CREATE TRIGGER", "permission denied for table users")
        .build();
    let reconciler = fixtures::reconciler(&catalog, Profile::Development);

    let report = reconciler.reconcile_all(&fixtures::blog_model()).await;

    assert!(report.entities["User"].is_failure());
    assert!(!report.entities["Role"].is_failure());
    assert!(catalog.has_table("users").await);
    assert!(!catalog.has_table("user_roles").await);
}

#[tokio::test]
async fn test_unknown_target_entity_fails_validation() {
    let catalog = MockCatalog::new();
    let reconciler = fixtures::reconciler(&catalog, Profile::Development);
    let model = model_from_entities(vec![fixtures::post_entity()]);

    let status = reconciler.status_for(&model, "Post").await;
    assert!(matches!(
        status,
        Err(ReconcileError::Model(ModelError::UnknownTargetEntity { .. }))
    ));

    let report = reconciler.reconcile_all(&model).await;
    assert!(report.entities["Post"].is_failure());
    assert!(catalog.executed().await.is_empty());
}

#[tokio::test]
async fn test_unknown_entity() {
    let reconciler = fixtures::reconciler(&MockCatalog::new(), Profile::Development);
    let result = reconciler.apply_safe(&fixtures::blog_model(), "Invoice").await;
    assert!(matches!(
        result,
        Err(ReconcileError::Model(ModelError::UnknownEntity(name))) if name == "Invoice"
    ));
}

// =============================================================================
// Status and Single-Entity Operations
// =============================================================================

#[tokio::test]
async fn test_status_tracks_reconciliation() {
    let catalog = MockCatalog::new();
    let reconciler = fixtures::reconciler(&catalog, Profile::Development);
    let model = fixtures::blog_model();

    let before = reconciler.status_all(&model).await.unwrap();
    assert!(before
        .entities
        .values()
        .all(|status| status.state == DriftState::NotReconciled));

    reconciler.reconcile_all(&model).await;

    let after = reconciler.status_all(&model).await.unwrap();
    assert!(after.entities.values().all(|status| status.state == DriftState::Clean));
    assert_eq!(after.pending_changes(), 0);
    assert!(catalog.executed().await.iter().all(|sql| !sql.contains("ALTER COLUMN")));
}

#[tokio::test]
async fn test_apply_safe_single_entity() {
    let catalog = MockCatalog::new();
    let reconciler = fixtures::reconciler(&catalog, Profile::Production);
    let model = fixtures::blog_model();

    let outcome = reconciler.apply_safe(&model, "Role").await.unwrap();

    assert_eq!(outcome, EntityOutcome::Created);
    assert_eq!(catalog.table_names().await, vec!["roles"]);
    assert_eq!(
        reconciler.apply_safe(&model, "Role").await.unwrap(),
        EntityOutcome::Unchanged
    );
}

// =============================================================================
// Drop All
// =============================================================================

#[tokio::test]
async fn test_drop_all_refused_in_production() {
    let catalog = MockCatalog::new();
    let reconciler = fixtures::reconciler(&catalog, Profile::Production);
    let model = fixtures::blog_model();
    reconciler.reconcile_all(&model).await;

    let result = reconciler.drop_all(&model).await;

    assert!(matches!(
        result,
        Err(ReconcileError::DropRefused {
            profile: Profile::Production
        })
    ));
    assert!(catalog.executed_matching("DROP TABLE").await.is_empty());
    assert_eq!(catalog.table_names().await.len(), 4);
}

#[tokio::test]
async fn test_drop_all_in_development() {
    let catalog = MockCatalog::new();
    let reconciler = fixtures::reconciler(&catalog, Profile::Development);
    let model = fixtures::blog_model();
    reconciler.reconcile_all(&model).await;

    let dropped = reconciler.drop_all(&model).await.unwrap();

    assert_eq!(dropped, vec!["posts", "roles", "users", "user_roles"]);
    assert!(catalog.table_names().await.is_empty());
    assert_eq!(
        catalog.executed_matching("DROP TABLE").await[0],
        "DROP TABLE IF EXISTS posts CASCADE"
    );
}

#[tokio::test]
async fn test_diff_options_default_accepts_wider_columns() {
    assert_eq!(DiffOptions::default().flag_varchar_narrowing, false);
    let reconciler = Reconciler::from_config(Arc::new(MockCatalog::new()), &ReconcileConfig::default());
    assert_eq!(reconciler.profile(), Profile::Production);
}
