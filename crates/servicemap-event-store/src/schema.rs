//! Event store database schema.

/// SQL to create the events table.
///
/// `insertion_seq` is a global `BIGSERIAL`, so it is monotonically increasing
/// in append order and breaks ties between events sharing an `event_date`.
pub const CREATE_EVENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS domain_events (
    insertion_seq   BIGSERIAL PRIMARY KEY,
    event_id        UUID NOT NULL UNIQUE,
    aggregate_type  VARCHAR(255) NOT NULL,
    aggregate_id    VARCHAR(255) NOT NULL,
    event_type      VARCHAR(255) NOT NULL,
    event_date      TIMESTAMPTZ NOT NULL,
    payload         JSONB,
    source          TEXT,
    recorded_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_domain_events_type_date
    ON domain_events (aggregate_type, event_date, insertion_seq);

CREATE INDEX IF NOT EXISTS idx_domain_events_aggregate_date
    ON domain_events (aggregate_type, aggregate_id, event_date, insertion_seq);
";
