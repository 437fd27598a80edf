//! SQL migration bodies implementing the relational schema (minimum).

use karto_adapter_postgres::Migration;

pub fn all() -> Vec<Migration> {
    vec![
        Migration::new(
            1,
            "create_tenants",
            r#"
            CREATE TABLE tenants (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        ),
        Migration::new(
            2,
            "create_users",
            r#"
            CREATE TABLE users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        ),
        Migration::new(
            3,
            "create_tenant_members",
            r#"
            CREATE TABLE tenant_members (
                tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id),
                role TEXT NOT NULL,
                PRIMARY KEY (tenant_id, user_id)
            )
            "#,
        ),
        Migration::new(
            4,
            "create_groups",
            r#"
            CREATE TABLE groups (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                name TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (tenant_id, name)
            )
            "#,
        ),
        Migration::new(
            5,
            "create_group_members",
            r#"
            CREATE TABLE group_members (
                group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id),
                role TEXT NOT NULL,
                PRIMARY KEY (group_id, user_id)
            )
            "#,
        ),
        Migration::new(
            6,
            "create_workspaces",
            r#"
            CREATE TABLE workspaces (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE RESTRICT,
                name TEXT NOT NULL,
                parent_workspace_id TEXT REFERENCES workspaces(id) ON DELETE RESTRICT,
                is_root BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        ),
        Migration::new(
            7,
            "create_workspaces_one_root_per_tenant_index",
            "CREATE UNIQUE INDEX workspaces_one_root_per_tenant ON workspaces (tenant_id) WHERE is_root",
        ),
        Migration::new(
            8,
            "create_api_keys",
            r#"
            CREATE TABLE api_keys (
                id TEXT PRIMARY KEY,
                owner_user_id TEXT NOT NULL REFERENCES users(id),
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                name TEXT NOT NULL,
                prefix TEXT NOT NULL,
                hash TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                expires_at TIMESTAMPTZ,
                last_used_at TIMESTAMPTZ,
                is_revoked BOOLEAN NOT NULL DEFAULT FALSE,
                UNIQUE (owner_user_id, tenant_id, name)
            )
            "#,
        ),
        Migration::new(9, "create_api_keys_prefix_index", "CREATE INDEX api_keys_prefix_idx ON api_keys (prefix)"),
        Migration::new(
            10,
            "create_api_keys_tenant_owner_index",
            "CREATE INDEX api_keys_tenant_owner_idx ON api_keys (tenant_id, owner_user_id)",
        ),
        Migration::new(
            11,
            "create_outbox",
            r#"
            CREATE TABLE outbox (
                id UUID PRIMARY KEY,
                aggregate_type TEXT NOT NULL,
                aggregate_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                payload JSONB NOT NULL,
                occurred_at TIMESTAMPTZ NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                processed_at TIMESTAMPTZ,
                retry_count INT NOT NULL DEFAULT 0,
                last_error TEXT,
                failed_at TIMESTAMPTZ
            )
            "#,
        ),
        Migration::new(
            12,
            "create_outbox_pending_index",
            r#"
            CREATE INDEX outbox_pending_idx ON outbox (processed_at, created_at)
                WHERE processed_at IS NULL AND failed_at IS NULL
            "#,
        ),
        Migration::new(
            13,
            "create_outbox_notify_function",
            r#"
            CREATE OR REPLACE FUNCTION notify_outbox_insert() RETURNS trigger AS $$
            BEGIN
                PERFORM pg_notify('outbox_events', NEW.id::text);
                RETURN NEW;
            END;
            $$ LANGUAGE plpgsql
            "#,
        ),
        Migration::new(
            14,
            "create_outbox_notify_trigger",
            r#"
            CREATE TRIGGER outbox_notify_trigger
                AFTER INSERT ON outbox
                FOR EACH ROW
                EXECUTE FUNCTION notify_outbox_insert()
            "#,
        ),
    ]
}
