use sqlx::PgPool;

/// Run database migrations, creating required tables and indexes if they do
/// not already exist.
///
/// Sensitive text columns (email bodies, classification reasoning, draft
/// text, audit details, resolution notes) hold `ENC[AES256-GCM,...]`
/// envelopes rather than plaintext, so they are declared as plain TEXT.
pub async fn run_migrations(pool: &PgPool, prefix: &str) -> Result<(), sqlx::Error> {
    let emails = format!("{prefix}emails");
    let classifications = format!("{prefix}classifications");
    let processing = format!("{prefix}processing_results");
    let escalations = format!("{prefix}escalation_groups");
    let patterns = format!("{prefix}email_patterns");
    let metrics = format!("{prefix}performance_metrics");
    let audit = format!("{prefix}audit_events");
    let auth_attempts = format!("{prefix}auth_attempts");
    let security = format!("{prefix}security_events");

    let tables = [
        format!(
            "
            CREATE TABLE IF NOT EXISTS {emails} (
                id                TEXT PRIMARY KEY,
                sender_address    TEXT NOT NULL,
                sender_name       TEXT,
                recipient_address TEXT NOT NULL,
                subject           TEXT NOT NULL,
                body              TEXT NOT NULL,
                html_body         TEXT,
                received_at       TIMESTAMPTZ NOT NULL,
                processed_at      TIMESTAMPTZ,
                conversation_id   TEXT,
                importance        TEXT,
                attachments       JSONB NOT NULL DEFAULT '[]'::jsonb,
                status            TEXT NOT NULL,
                retry_count       INT NOT NULL DEFAULT 0,
                last_error        TEXT
            )
            "
        ),
        format!(
            "
            CREATE TABLE IF NOT EXISTS {classifications} (
                email_id           TEXT PRIMARY KEY,
                category           TEXT NOT NULL,
                confidence         DOUBLE PRECISION NOT NULL,
                reasoning          TEXT NOT NULL,
                urgency            TEXT NOT NULL,
                suggested_action   TEXT NOT NULL,
                required_expertise JSONB NOT NULL DEFAULT '[]'::jsonb,
                estimated_effort   TEXT NOT NULL,
                model              TEXT NOT NULL,
                prompt_version     TEXT NOT NULL,
                tokens_used        INT,
                human_feedback     TEXT,
                feedback_notes     TEXT,
                feedback_at        TIMESTAMPTZ,
                created_at         TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "
        ),
        format!(
            "
            CREATE TABLE IF NOT EXISTS {processing} (
                id                     TEXT PRIMARY KEY,
                email_id               TEXT NOT NULL,
                status                 TEXT NOT NULL,
                started_at             TIMESTAMPTZ NOT NULL,
                completed_at           TIMESTAMPTZ,
                action_taken           TEXT,
                response_sent          BOOLEAN NOT NULL DEFAULT FALSE,
                escalation_created     BOOLEAN NOT NULL DEFAULT FALSE,
                escalation_ref         TEXT,
                processing_ms          BIGINT NOT NULL DEFAULT 0,
                classification_ms      BIGINT NOT NULL DEFAULT 0,
                response_generation_ms BIGINT NOT NULL DEFAULT 0,
                error_message          TEXT,
                error_stage            TEXT,
                retry_count            INT NOT NULL DEFAULT 0,
                routing_decision       TEXT
            )
            "
        ),
        format!(
            "
            CREATE TABLE IF NOT EXISTS {escalations} (
                group_id                TEXT PRIMARY KEY,
                email_id                TEXT NOT NULL,
                name                    TEXT NOT NULL,
                description             TEXT NOT NULL,
                members                 JSONB NOT NULL DEFAULT '[]'::jsonb,
                owner                   TEXT NOT NULL,
                status                  TEXT NOT NULL,
                created_at              TIMESTAMPTZ NOT NULL,
                resolved_at             TIMESTAMPTZ,
                resolution_notes        TEXT,
                resolution_time_hours   DOUBLE PRECISION,
                message_count           INT NOT NULL DEFAULT 0,
                first_response_time_min DOUBLE PRECISION,
                engagement_score        DOUBLE PRECISION
            )
            "
        ),
        format!(
            "
            CREATE TABLE IF NOT EXISTS {patterns} (
                id                   TEXT PRIMARY KEY,
                kind                 TEXT NOT NULL,
                description          TEXT NOT NULL,
                frequency            BIGINT NOT NULL DEFAULT 1,
                first_seen           TIMESTAMPTZ NOT NULL,
                last_seen            TIMESTAMPTZ NOT NULL,
                automation_potential DOUBLE PRECISION NOT NULL,
                sample_email_ids     JSONB NOT NULL DEFAULT '[]'::jsonb,
                common_keywords      JSONB NOT NULL DEFAULT '[]'::jsonb,
                time_savings_minutes DOUBLE PRECISION
            )
            "
        ),
        format!(
            "
            CREATE TABLE IF NOT EXISTS {metrics} (
                id          BIGSERIAL PRIMARY KEY,
                kind        TEXT NOT NULL,
                name        TEXT NOT NULL,
                category    TEXT,
                value       DOUBLE PRECISION NOT NULL,
                unit        TEXT NOT NULL,
                email_id    TEXT,
                agg_window  TEXT,
                aggregation TEXT,
                tags        JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                recorded_at TIMESTAMPTZ NOT NULL
            )
            "
        ),
        format!(
            "
            CREATE TABLE IF NOT EXISTS {audit} (
                id                TEXT PRIMARY KEY,
                event_type        TEXT NOT NULL,
                action            TEXT NOT NULL,
                actor             TEXT NOT NULL,
                session_id        TEXT,
                source_ip         TEXT,
                user_agent        TEXT,
                resource_type     TEXT,
                resource_id       TEXT,
                success           BOOLEAN NOT NULL,
                error             TEXT,
                details           TEXT NOT NULL,
                execution_time_ms BIGINT,
                risk_score        DOUBLE PRECISION,
                requires_review   BOOLEAN NOT NULL DEFAULT FALSE,
                occurred_at       TIMESTAMPTZ NOT NULL
            )
            "
        ),
        format!(
            "
            CREATE TABLE IF NOT EXISTS {auth_attempts} (
                id          TEXT PRIMARY KEY,
                identifier  TEXT NOT NULL,
                success     BOOLEAN NOT NULL,
                reason      TEXT,
                source_ip   TEXT,
                occurred_at TIMESTAMPTZ NOT NULL
            )
            "
        ),
        format!(
            "
            CREATE TABLE IF NOT EXISTS {security} (
                id          TEXT PRIMARY KEY,
                event_type  TEXT NOT NULL,
                severity    TEXT NOT NULL,
                identifier  TEXT NOT NULL,
                description TEXT NOT NULL,
                details     JSONB NOT NULL DEFAULT 'null'::jsonb,
                occurred_at TIMESTAMPTZ NOT NULL
            )
            "
        ),
    ];

    for ddl in &tables {
        sqlx::query(ddl).execute(pool).await?;
    }

    let indexes = [
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{prefix}emails_sender ON {emails} (sender_address, received_at)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{prefix}emails_status ON {emails} (status, received_at)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{prefix}classifications_category ON {classifications} (category, confidence)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{prefix}processing_status ON {processing} (status, started_at)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{prefix}processing_email ON {processing} (email_id, started_at DESC)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{prefix}escalations_status ON {escalations} (status, created_at DESC)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{prefix}patterns_kind ON {patterns} (kind, frequency DESC)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{prefix}metrics_kind ON {metrics} (kind, recorded_at)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{prefix}audit_type ON {audit} (event_type, occurred_at)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{prefix}auth_attempts_identifier ON {auth_attempts} (identifier, occurred_at)"
        ),
    ];

    for idx in &indexes {
        sqlx::query(idx).execute(pool).await?;
    }

    Ok(())
}
