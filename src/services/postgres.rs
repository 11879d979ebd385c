use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use crate::models::{
    CandidateOrder, CandidateQuery, ConnectionRequest, NewConnectionRequest, RequestId,
    RequestStatus, StatusUpdate, SubscriptionGrant, SwipeAllowance, SwipeEvent, SwipeUsage,
    UsageWindow, UserId, UserProfile,
};
use crate::services::store::{
    BlockStore, ConnectionStore, ProfileStore, StoreError, SubscriptionStore, SwipeStore,
};

const REQUEST_COLUMNS: &str = r#"
    id, sender_id, receiver_id, social_circle_id, request_type, message,
    status, sender_status, receiver_status, created_at, updated_at
"#;

const PROFILE_SELECT: &str = r#"
    SELECT
        u.id, u.name, u.gender, u.birth_date, u.country_id, u.interests,
        u.is_active, (u.deleted_at IS NOT NULL) AS is_deleted, u.created_at,
        ARRAY(
            SELECT usc.social_circle_id
            FROM user_social_circles usc
            WHERE usc.user_id = u.id
            ORDER BY usc.social_circle_id
        ) AS social_circle_ids
    FROM users u
"#;

/// PostgreSQL-backed store for every engine table
///
/// Timestamps are always bound from the caller so window maths runs on the
/// engine's clock rather than the database's.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new store from a connection string and run migrations
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout_secs: u64,
        idle_timeout_secs: u64,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(idle_timeout_secs))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new store from optional settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            acquire_timeout_secs.unwrap_or(5),
            idle_timeout_secs.unwrap_or(600),
        )
        .await
    }

    /// Health check for the database connection
    pub async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

/// Append to `swipe_events` and bump the day's counter row atomically
async fn insert_swipe(conn: &mut PgConnection, event: &SwipeEvent) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO swipe_events (user_id, direction, created_at)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(event.user_id)
    .bind(event.direction.as_str())
    .bind(event.created_at)
    .execute(&mut *conn)
    .await?;

    let mut delta = SwipeUsage::default();
    delta.record(event.direction);

    sqlx::query(
        r#"
        INSERT INTO user_swipes
            (user_id, swipe_date, total_swipes, left_swipes, right_swipes, super_likes, updated_at)
        VALUES ($1, $2, 1, $3, $4, $5, $6)
        ON CONFLICT (user_id, swipe_date)
        DO UPDATE SET
            total_swipes = user_swipes.total_swipes + 1,
            left_swipes = user_swipes.left_swipes + EXCLUDED.left_swipes,
            right_swipes = user_swipes.right_swipes + EXCLUDED.right_swipes,
            super_likes = user_swipes.super_likes + EXCLUDED.super_likes,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(event.user_id)
    .bind(event.created_at.date_naive())
    .bind(delta.left as i32)
    .bind(delta.right as i32)
    .bind(delta.super_likes as i32)
    .bind(event.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn used_in_window(
    conn: &mut PgConnection,
    user_id: UserId,
    window: UsageWindow,
) -> Result<u32, StoreError> {
    let used: i64 = match window {
        UsageWindow::Since(since) => {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM swipe_events WHERE user_id = $1 AND created_at > $2",
            )
            .bind(user_id)
            .bind(since)
            .fetch_one(&mut *conn)
            .await?
        }
        UsageWindow::Day(day) => {
            sqlx::query_scalar(
                r#"
                SELECT COALESCE(
                    (SELECT total_swipes::BIGINT FROM user_swipes
                     WHERE user_id = $1 AND swipe_date = $2),
                    0
                )
                "#,
            )
            .bind(user_id)
            .bind(day)
            .fetch_one(&mut *conn)
            .await?
        }
    };
    Ok(to_count(used))
}

fn parse_column<T: FromStr<Err = String>>(value: &str) -> Result<T, StoreError> {
    value.parse().map_err(StoreError::InvalidData)
}

/// Clamp a SQL count into the domain's counter type
fn to_count(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn request_from_row(row: &PgRow) -> Result<ConnectionRequest, StoreError> {
    Ok(ConnectionRequest {
        id: row.try_get("id")?,
        sender_id: row.try_get("sender_id")?,
        receiver_id: row.try_get("receiver_id")?,
        social_circle_id: row.try_get("social_circle_id")?,
        request_type: parse_column(row.try_get::<&str, _>("request_type")?)?,
        message: row.try_get("message")?,
        status: parse_column(row.try_get::<&str, _>("status")?)?,
        sender_status: parse_column(row.try_get::<&str, _>("sender_status")?)?,
        receiver_status: parse_column(row.try_get::<&str, _>("receiver_status")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn profile_from_row(row: &PgRow) -> Result<UserProfile, StoreError> {
    Ok(UserProfile {
        user_id: row.try_get("id")?,
        name: row.try_get("name")?,
        gender: row.try_get("gender")?,
        birth_date: row.try_get("birth_date")?,
        country_id: row.try_get("country_id")?,
        interests: row.try_get("interests")?,
        social_circle_ids: row.try_get("social_circle_ids")?,
        is_active: row.try_get("is_active")?,
        is_deleted: row.try_get("is_deleted")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl SubscriptionStore for PostgresStore {
    async fn active_grants(
        &self,
        user_ids: &[UserId],
        now: DateTime<Utc>,
    ) -> Result<Vec<SubscriptionGrant>, StoreError> {
        let query = r#"
            SELECT user_id, plan_id, status, expires_at
            FROM user_subscriptions
            WHERE user_id = ANY($1)
              AND status = 'active'
              AND expires_at > $2
        "#;

        let rows = sqlx::query(query)
            .bind(user_ids)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<SubscriptionGrant, StoreError> {
                Ok(SubscriptionGrant {
                    user_id: row.try_get("user_id")?,
                    plan_id: row.try_get("plan_id")?,
                    status: parse_column(row.try_get::<&str, _>("status")?)?,
                    expires_at: row.try_get("expires_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl SwipeStore for PostgresStore {
    async fn append_swipe(&self, event: &SwipeEvent) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        insert_swipe(&mut *tx, event).await?;
        tx.commit().await?;

        tracing::debug!("Recorded {} swipe for {}", event.direction, event.user_id);
        Ok(())
    }

    async fn usage_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<SwipeUsage, StoreError> {
        let query = r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE direction = 'left') AS left_swipes,
                COUNT(*) FILTER (WHERE direction IN ('right', 'super')) AS right_swipes,
                COUNT(*) FILTER (WHERE direction = 'super') AS super_likes
            FROM swipe_events
            WHERE user_id = $1 AND created_at > $2
        "#;

        let row = sqlx::query(query)
            .bind(user_id)
            .bind(since)
            .fetch_one(&self.pool)
            .await?;

        Ok(SwipeUsage {
            total: to_count(row.try_get("total")?),
            left: to_count(row.try_get("left_swipes")?),
            right: to_count(row.try_get("right_swipes")?),
            super_likes: to_count(row.try_get("super_likes")?),
        })
    }

    async fn oldest_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let query = r#"
            SELECT MIN(created_at) AS oldest
            FROM swipe_events
            WHERE user_id = $1 AND created_at > $2
        "#;

        let row = sqlx::query(query)
            .bind(user_id)
            .bind(since)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get("oldest")?)
    }

    async fn daily_usage(&self, user_id: UserId, day: NaiveDate) -> Result<SwipeUsage, StoreError> {
        let query = r#"
            SELECT total_swipes, left_swipes, right_swipes, super_likes
            FROM user_swipes
            WHERE user_id = $1 AND swipe_date = $2
        "#;

        let row = sqlx::query(query)
            .bind(user_id)
            .bind(day)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(SwipeUsage::default());
        };

        Ok(SwipeUsage {
            total: to_count(row.try_get::<i32, _>("total_swipes")?.into()),
            left: to_count(row.try_get::<i32, _>("left_swipes")?.into()),
            right: to_count(row.try_get::<i32, _>("right_swipes")?.into()),
            super_likes: to_count(row.try_get::<i32, _>("super_likes")?.into()),
        })
    }
}

#[async_trait]
impl ConnectionStore for PostgresStore {
    async fn get_request(&self, id: RequestId) -> Result<Option<ConnectionRequest>, StoreError> {
        let query = format!(
            "SELECT {} FROM user_requests WHERE id = $1 AND deleted_at IS NULL",
            REQUEST_COLUMNS
        );

        let row = sqlx::query(&query).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(request_from_row).transpose()
    }

    async fn find_between(
        &self,
        a: UserId,
        b: UserId,
        status: Option<RequestStatus>,
    ) -> Result<Option<ConnectionRequest>, StoreError> {
        let query = format!(
            r#"
            SELECT {}
            FROM user_requests
            WHERE ((sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1))
              AND ($3::TEXT IS NULL OR status = $3)
              AND deleted_at IS NULL
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            REQUEST_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(a)
            .bind(b)
            .bind(status.map(|s| s.as_str()))
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(request_from_row).transpose()
    }

    async fn counterpart_ids(&self, user_id: UserId) -> Result<HashSet<UserId>, StoreError> {
        let query = r#"
            SELECT CASE WHEN sender_id = $1 THEN receiver_id ELSE sender_id END AS other_id
            FROM user_requests
            WHERE (sender_id = $1 OR receiver_id = $1)
              AND deleted_at IS NULL
        "#;

        let rows = sqlx::query(query).bind(user_id).fetch_all(&self.pool).await?;
        let ids = rows
            .iter()
            .map(|row| row.try_get("other_id"))
            .collect::<Result<HashSet<UserId>, _>>()?;

        tracing::debug!("User {} has swiped with {} users", user_id, ids.len());
        Ok(ids)
    }

    async fn connected_ids(&self, user_id: UserId) -> Result<HashSet<UserId>, StoreError> {
        let query = r#"
            SELECT CASE WHEN sender_id = $1 THEN receiver_id ELSE sender_id END AS other_id
            FROM user_requests
            WHERE (sender_id = $1 OR receiver_id = $1)
              AND status = 'accepted'
              AND sender_status = 'accepted'
              AND receiver_status = 'accepted'
              AND deleted_at IS NULL
        "#;

        let rows = sqlx::query(query).bind(user_id).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| row.try_get("other_id"))
            .collect::<Result<HashSet<UserId>, _>>()?)
    }

    async fn pending_for(&self, receiver_id: UserId) -> Result<Vec<ConnectionRequest>, StoreError> {
        let query = format!(
            r#"
            SELECT {}
            FROM user_requests
            WHERE receiver_id = $1 AND status = 'pending' AND deleted_at IS NULL
            ORDER BY created_at DESC, id DESC
            "#,
            REQUEST_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(receiver_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(request_from_row).collect()
    }

    async fn insert_request_with_swipe(
        &self,
        request: &NewConnectionRequest,
        swipe: &SwipeEvent,
        allowance: SwipeAllowance,
    ) -> Result<ConnectionRequest, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Serialize sends from one user so the count below cannot go stale
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(swipe.user_id)
            .execute(&mut *tx)
            .await?;

        let used = used_in_window(&mut *tx, swipe.user_id, allowance.window).await?;
        if used >= allowance.limit {
            return Err(StoreError::QuotaExhausted {
                used,
                limit: allowance.limit,
            });
        }

        let query = format!(
            r#"
            INSERT INTO user_requests
                (sender_id, receiver_id, social_circle_id, request_type, message,
                 status, sender_status, receiver_status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', 'pending', 'pending', $6, $6)
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        );

        let inserted = sqlx::query(&query)
            .bind(request.sender_id)
            .bind(request.receiver_id)
            .bind(request.social_circle_id)
            .bind(request.request_type.as_str())
            .bind(request.message.as_deref())
            .bind(request.created_at)
            .fetch_one(&mut *tx)
            .await;

        let row = match inserted {
            Ok(row) => row,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(StoreError::Conflict(format!(
                    "live request between {} and {}",
                    request.sender_id, request.receiver_id
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let created = request_from_row(&row)?;

        insert_swipe(&mut *tx, swipe).await?;
        tx.commit().await?;

        Ok(created)
    }

    async fn update_status(
        &self,
        id: RequestId,
        expected: RequestStatus,
        update: StatusUpdate,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let query = r#"
            UPDATE user_requests
            SET status = $3,
                sender_status = COALESCE($4, sender_status),
                receiver_status = COALESCE($5, receiver_status),
                updated_at = $6
            WHERE id = $1 AND status = $2 AND deleted_at IS NULL
        "#;

        let result = sqlx::query(query)
            .bind(id)
            .bind(expected.as_str())
            .bind(update.status.as_str())
            .bind(update.sender_status.map(|s| s.as_str()))
            .bind(update.receiver_status.map(|s| s.as_str()))
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl BlockStore for PostgresStore {
    async fn blocked_ids(&self, user_id: UserId) -> Result<HashSet<UserId>, StoreError> {
        let query = r#"
            SELECT CASE WHEN blocker_id = $1 THEN blocked_id ELSE blocker_id END AS other_id
            FROM blocked_users
            WHERE (blocker_id = $1 OR blocked_id = $1) AND is_active
        "#;

        let rows = sqlx::query(query).bind(user_id).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| row.try_get("other_id"))
            .collect::<Result<HashSet<UserId>, _>>()?)
    }
}

#[async_trait]
impl ProfileStore for PostgresStore {
    async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError> {
        let query = format!("{} WHERE u.id = $1", PROFILE_SELECT);

        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn query_candidates(&self, query: &CandidateQuery) -> Result<Vec<UserProfile>, StoreError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(PROFILE_SELECT);
        builder.push(" WHERE u.is_active AND u.deleted_at IS NULL AND u.id <> ");
        builder.push_bind(query.requester_id);

        if !query.exclude_user_ids.is_empty() {
            let excluded: Vec<UserId> = query.exclude_user_ids.iter().copied().collect();
            builder.push(" AND NOT (u.id = ANY(");
            builder.push_bind(excluded);
            builder.push("))");
        }

        if let Some(min_id) = query.min_user_id {
            builder.push(" AND u.id > ");
            builder.push_bind(min_id);
        }

        if !query.social_circle_ids.is_empty() {
            builder.push(
                " AND EXISTS (SELECT 1 FROM user_social_circles c \
                 WHERE c.user_id = u.id AND c.social_circle_id = ANY(",
            );
            builder.push_bind(query.social_circle_ids.clone());
            builder.push("))");
        }

        if let Some(country_id) = query.country_id {
            builder.push(" AND u.country_id = ");
            builder.push_bind(country_id);
        }

        builder.push(match query.order {
            CandidateOrder::Random => " ORDER BY random()",
            CandidateOrder::NewestFirst => " ORDER BY u.created_at DESC, u.id DESC",
            CandidateOrder::UserId => " ORDER BY u.id",
        });

        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        let profiles = rows
            .iter()
            .map(profile_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            "Queried {} candidates for {}",
            profiles.len(),
            query.requester_id
        );
        Ok(profiles)
    }
}
