use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgConnection, PgPool};
use std::collections::{hash_map::Entry, BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info};

use super::{invalid_pk, Store, StoreError, StoreResult, TICKETS_OUTSIDE_DOME};
use crate::error::FieldErrors;
use crate::models::*;
use crate::services::booking;

const USER_COLUMNS: &str =
    "id, email, password_hash, first_name, last_name, is_staff, is_active, date_joined";

// Сводка сеанса: свободные места считаются агрегатом по билетам
const SESSION_SUMMARY: &str = r#"
    SELECT ss.id,
           ss.show_time,
           a.title AS astronomy_show_title,
           a.image AS astronomy_show_image,
           d.name AS planetarium_dome_name,
           d.rows * d.seats_in_row AS planetarium_dome_capacity,
           (d.rows * d.seats_in_row - COUNT(t.id))::int AS tickets_available
    FROM show_sessions ss
    JOIN astronomy_shows a ON a.id = ss.astronomy_show_id
    JOIN planetarium_domes d ON d.id = ss.planetarium_dome_id
    LEFT JOIN tickets t ON t.show_session_id = ss.id
"#;

const SESSION_SUMMARY_TAIL: &str = "GROUP BY ss.id, a.id, d.id ORDER BY ss.show_time, ss.id";

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// `%needle%` для ILIKE, спецсимволы LIKE в запросе экранируются.
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, pool_size: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("./src/migrations").run(&self.pool).await?;
        info!("Migrations completed");
        Ok(())
    }

    async fn attach_themes(
        conn: &mut PgConnection,
        shows: Vec<AstronomyShow>,
    ) -> StoreResult<Vec<AstronomyShowRecord>> {
        let ids: Vec<i64> = shows.iter().map(|s| s.id).collect();
        let rows: Vec<(i64, i64, String)> = sqlx::query_as(
            r#"
            SELECT st.show_id, t.id, t.name
            FROM astronomy_show_themes st
            JOIN show_themes t ON t.id = st.theme_id
            WHERE st.show_id = ANY($1)
            ORDER BY t.id
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;

        let mut by_show: HashMap<i64, Vec<ShowTheme>> = HashMap::new();
        for (show_id, id, name) in rows {
            by_show.entry(show_id).or_default().push(ShowTheme { id, name });
        }

        Ok(shows
            .into_iter()
            .map(|show| AstronomyShowRecord {
                themes: by_show.remove(&show.id).unwrap_or_default(),
                show,
            })
            .collect())
    }

    async fn session_dome(
        conn: &mut PgConnection,
        session_id: i64,
    ) -> StoreResult<Option<PlanetariumDome>> {
        let dome = sqlx::query_as::<_, PlanetariumDome>(
            r#"
            SELECT d.id, d.name, d.rows, d.seats_in_row
            FROM show_sessions ss
            JOIN planetarium_domes d ON d.id = ss.planetarium_dome_id
            WHERE ss.id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(dome)
    }

    // Проверка ссылок сеанса; возвращает зал, если обе ссылки валидны
    async fn check_session_refs(
        conn: &mut PgConnection,
        session: &NewShowSession,
    ) -> StoreResult<PlanetariumDome> {
        let mut errors = FieldErrors::new();

        let show_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM astronomy_shows WHERE id = $1)")
                .bind(session.astronomy_show_id)
                .fetch_one(&mut *conn)
                .await?;
        if !show_exists {
            errors.add("astronomy_show", invalid_pk(session.astronomy_show_id));
        }

        let dome = sqlx::query_as::<_, PlanetariumDome>(
            "SELECT id, name, rows, seats_in_row FROM planetarium_domes WHERE id = $1",
        )
        .bind(session.planetarium_dome_id)
        .fetch_optional(&mut *conn)
        .await?;
        if dome.is_none() {
            errors.add("planetarium_dome", invalid_pk(session.planetarium_dome_id));
        }

        match dome {
            Some(dome) if errors.is_empty() => Ok(dome),
            _ => Err(StoreError::Invalid(errors)),
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash, first_name, last_name, is_staff)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_staff)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::invalid("email", "user with this email already exists.")
            } else {
                e.into()
            }
        })
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_user(&self, id: i64) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn update_user(&self, id: i64, update: UserUpdate) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users
             SET email = COALESCE($2, email),
                 password_hash = COALESCE($3, password_hash),
                 first_name = COALESCE($4, first_name),
                 last_name = COALESCE($5, last_name)
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(update.email)
        .bind(update.password_hash)
        .bind(update.first_name)
        .bind(update.last_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::invalid("email", "user with this email already exists.")
            } else {
                e.into()
            }
        })?
        .ok_or(StoreError::NotFound)
    }

    async fn list_themes(&self) -> StoreResult<Vec<ShowTheme>> {
        let themes = sqlx::query_as::<_, ShowTheme>("SELECT id, name FROM show_themes ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(themes)
    }

    async fn create_theme(&self, name: &str) -> StoreResult<ShowTheme> {
        sqlx::query_as::<_, ShowTheme>(
            "INSERT INTO show_themes (name) VALUES ($1) RETURNING id, name",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::invalid("name", "show theme with this name already exists.")
            } else {
                e.into()
            }
        })
    }

    async fn list_domes(&self) -> StoreResult<Vec<PlanetariumDome>> {
        let domes = sqlx::query_as::<_, PlanetariumDome>(
            "SELECT id, name, rows, seats_in_row FROM planetarium_domes ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(domes)
    }

    async fn create_dome(&self, dome: NewPlanetariumDome) -> StoreResult<PlanetariumDome> {
        let dome = sqlx::query_as::<_, PlanetariumDome>(
            "INSERT INTO planetarium_domes (name, rows, seats_in_row)
             VALUES ($1, $2, $3)
             RETURNING id, name, rows, seats_in_row",
        )
        .bind(&dome.name)
        .bind(dome.rows)
        .bind(dome.seats_in_row)
        .fetch_one(&self.pool)
        .await?;
        Ok(dome)
    }

    async fn list_shows(&self, filter: &ShowFilter) -> StoreResult<Vec<AstronomyShowRecord>> {
        let mut conn = self.pool.acquire().await?;
        let title = filter.title.as_deref().map(contains_pattern);

        let shows = sqlx::query_as::<_, AstronomyShow>(
            r#"
            SELECT s.id, s.title, s.description, s.image
            FROM astronomy_shows s
            WHERE ($1::text IS NULL OR s.title ILIKE $1)
              AND ($2::bigint[] IS NULL OR EXISTS (
                    SELECT 1 FROM astronomy_show_themes st
                    WHERE st.show_id = s.id AND st.theme_id = ANY($2)
                  ))
            ORDER BY s.id
            "#,
        )
        .bind(title)
        .bind(filter.theme_ids.as_deref())
        .fetch_all(&mut *conn)
        .await?;

        Self::attach_themes(&mut conn, shows).await
    }

    async fn get_show(&self, id: i64) -> StoreResult<AstronomyShowRecord> {
        let mut conn = self.pool.acquire().await?;
        let show = sqlx::query_as::<_, AstronomyShow>(
            "SELECT id, title, description, image FROM astronomy_shows WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(StoreError::NotFound)?;

        Self::attach_themes(&mut conn, vec![show])
            .await?
            .pop()
            .ok_or(StoreError::NotFound)
    }

    async fn create_show(&self, show: NewAstronomyShow) -> StoreResult<AstronomyShowRecord> {
        let mut theme_ids = show.theme_ids;
        theme_ids.sort_unstable();
        theme_ids.dedup();

        let mut tx = self.pool.begin().await?;

        let themes = sqlx::query_as::<_, ShowTheme>(
            "SELECT id, name FROM show_themes WHERE id = ANY($1) ORDER BY id",
        )
        .bind(&theme_ids)
        .fetch_all(&mut *tx)
        .await?;
        if let Some(missing) = theme_ids.iter().find(|id| !themes.iter().any(|t| t.id == **id)) {
            return Err(StoreError::invalid("show_theme", invalid_pk(*missing)));
        }

        let created = sqlx::query_as::<_, AstronomyShow>(
            "INSERT INTO astronomy_shows (title, description)
             VALUES ($1, $2)
             RETURNING id, title, description, image",
        )
        .bind(&show.title)
        .bind(&show.description)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO astronomy_show_themes (show_id, theme_id)
             SELECT $1, UNNEST($2::bigint[])",
        )
        .bind(created.id)
        .bind(&theme_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(AstronomyShowRecord {
            show: created,
            themes,
        })
    }

    async fn set_show_image(&self, id: i64, image: &str) -> StoreResult<AstronomyShow> {
        sqlx::query_as::<_, AstronomyShow>(
            "UPDATE astronomy_shows SET image = $2 WHERE id = $1
             RETURNING id, title, description, image",
        )
        .bind(id)
        .bind(image)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn list_sessions(&self, filter: SessionFilter) -> StoreResult<Vec<ShowSessionSummary>> {
        let sql = format!(
            "{SESSION_SUMMARY}
             WHERE ($1::date IS NULL OR ss.show_time::date = $1)
               AND ($2::bigint IS NULL OR ss.astronomy_show_id = $2)
             {SESSION_SUMMARY_TAIL}"
        );
        let sessions = sqlx::query_as::<_, ShowSessionSummary>(&sql)
            .bind(filter.date)
            .bind(filter.astronomy_show_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(sessions)
    }

    async fn get_session(&self, id: i64) -> StoreResult<ShowSessionDetail> {
        let session = sqlx::query_as::<_, ShowSession>(
            "SELECT id, astronomy_show_id, planetarium_dome_id, show_time
             FROM show_sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        let astronomy_show = self.get_show(session.astronomy_show_id).await?;

        let planetarium_dome = sqlx::query_as::<_, PlanetariumDome>(
            "SELECT id, name, rows, seats_in_row FROM planetarium_domes WHERE id = $1",
        )
        .bind(session.planetarium_dome_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        let taken_places = sqlx::query_as::<_, TakenPlace>(
            "SELECT t.row, t.seat FROM tickets t
             WHERE t.show_session_id = $1
             ORDER BY t.row, t.seat",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ShowSessionDetail {
            session,
            astronomy_show,
            planetarium_dome,
            taken_places,
        })
    }

    async fn create_session(&self, session: NewShowSession) -> StoreResult<ShowSession> {
        let mut tx = self.pool.begin().await?;
        Self::check_session_refs(&mut tx, &session).await?;

        let created = sqlx::query_as::<_, ShowSession>(
            "INSERT INTO show_sessions (astronomy_show_id, planetarium_dome_id, show_time)
             VALUES ($1, $2, $3)
             RETURNING id, astronomy_show_id, planetarium_dome_id, show_time",
        )
        .bind(session.astronomy_show_id)
        .bind(session.planetarium_dome_id)
        .bind(session.show_time)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn update_session(&self, id: i64, session: NewShowSession) -> StoreResult<ShowSession> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT id FROM show_sessions WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound);
        }

        let dome = Self::check_session_refs(&mut tx, &session).await?;

        // Уже выданные билеты должны поместиться в новый зал
        let outside: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM tickets t
                WHERE t.show_session_id = $1 AND (t.row > $2 OR t.seat > $3)
             )",
        )
        .bind(id)
        .bind(dome.rows)
        .bind(dome.seats_in_row)
        .fetch_one(&mut *tx)
        .await?;
        if outside {
            return Err(StoreError::invalid("planetarium_dome", TICKETS_OUTSIDE_DOME));
        }

        let updated = sqlx::query_as::<_, ShowSession>(
            "UPDATE show_sessions
             SET astronomy_show_id = $2, planetarium_dome_id = $3, show_time = $4
             WHERE id = $1
             RETURNING id, astronomy_show_id, planetarium_dome_id, show_time",
        )
        .bind(id)
        .bind(session.astronomy_show_id)
        .bind(session.planetarium_dome_id)
        .bind(session.show_time)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_session(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM show_sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_reservations(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Page<ReservationListItem>> {
        // count и страница читаются из одного снимка
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reservations WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        let reservations = sqlx::query_as::<_, Reservation>(
            "SELECT id, user_id, created_at FROM reservations
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *tx)
        .await?;

        let reservation_ids: Vec<i64> = reservations.iter().map(|r| r.id).collect();
        let tickets = sqlx::query_as::<_, Ticket>(
            "SELECT t.id, t.row, t.seat, t.show_session_id, t.reservation_id
             FROM tickets t
             WHERE t.reservation_id = ANY($1)
             ORDER BY t.row, t.seat",
        )
        .bind(&reservation_ids)
        .fetch_all(&mut *tx)
        .await?;

        let mut session_ids: Vec<i64> = tickets.iter().map(|t| t.show_session_id).collect();
        session_ids.sort_unstable();
        session_ids.dedup();
        let sql = format!("{SESSION_SUMMARY} WHERE ss.id = ANY($1) {SESSION_SUMMARY_TAIL}");
        let sessions: HashMap<i64, ShowSessionSummary> =
            sqlx::query_as::<_, ShowSessionSummary>(&sql)
                .bind(&session_ids)
                .fetch_all(&mut *tx)
                .await?
                .into_iter()
                .map(|s| (s.id, s))
                .collect();

        let mut by_reservation: BTreeMap<i64, Vec<TicketWithSession>> = BTreeMap::new();
        for ticket in tickets {
            if let Some(summary) = sessions.get(&ticket.show_session_id) {
                by_reservation
                    .entry(ticket.reservation_id)
                    .or_default()
                    .push(TicketWithSession {
                        show_session: summary.clone(),
                        ticket,
                    });
            }
        }

        tx.commit().await?;

        let items = reservations
            .into_iter()
            .map(|reservation| ReservationListItem {
                tickets: by_reservation.remove(&reservation.id).unwrap_or_default(),
                reservation,
            })
            .collect();

        Ok(Page { count, items })
    }

    async fn create_reservation(
        &self,
        user_id: i64,
        tickets: Vec<NewTicket>,
    ) -> StoreResult<ReservationRecord> {
        if tickets.is_empty() {
            return Err(StoreError::invalid("tickets", "This list may not be empty."));
        }
        booking::check_duplicates(&tickets).into_result()?;

        let mut tx = self.pool.begin().await?;

        let mut domes: HashMap<i64, Option<PlanetariumDome>> = HashMap::new();
        let mut errors = FieldErrors::new();
        for (index, ticket) in tickets.iter().enumerate() {
            let dome = match domes.entry(ticket.show_session_id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let dome = Self::session_dome(&mut tx, ticket.show_session_id).await?;
                    entry.insert(dome)
                }
            };
            let Some(dome) = dome else {
                let (field, message) = booking::unknown_session(index, ticket.show_session_id);
                errors.add(field, message);
                continue;
            };

            if !booking::check_bounds(index, ticket, dome, &mut errors) {
                continue;
            }

            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM tickets t
                    WHERE t.show_session_id = $1 AND t.row = $2 AND t.seat = $3
                 )",
            )
            .bind(ticket.show_session_id)
            .bind(ticket.row)
            .bind(ticket.seat)
            .fetch_one(&mut *tx)
            .await?;
            if taken {
                let (field, message) = booking::seat_taken(index);
                errors.add(field, message);
            }
        }
        if !errors.is_empty() {
            debug!("reservation rejected for user {}: {}", user_id, errors);
            return Err(StoreError::Invalid(errors));
        }

        let reservation = sqlx::query_as::<_, Reservation>(
            "INSERT INTO reservations (user_id) VALUES ($1) RETURNING id, user_id, created_at",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut issued = Vec::with_capacity(tickets.len());
        for (index, ticket) in tickets.iter().enumerate() {
            // Параллельная бронь могла занять место после проверки - решает constraint
            let created = sqlx::query_as::<_, Ticket>(
                r#"INSERT INTO tickets ("row", seat, show_session_id, reservation_id)
                 VALUES ($1, $2, $3, $4)
                 RETURNING id, "row", seat, show_session_id, reservation_id"#,
            )
            .bind(ticket.row)
            .bind(ticket.seat)
            .bind(ticket.show_session_id)
            .bind(reservation.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    let (field, message) = booking::seat_taken(index);
                    StoreError::invalid(field, message)
                } else {
                    e.into()
                }
            })?;
            issued.push(created);
        }

        tx.commit().await?;

        issued.sort_by_key(|t| (t.row, t.seat));
        info!(
            "reservation {} created for user {} with {} tickets",
            reservation.id,
            user_id,
            issued.len()
        );

        Ok(ReservationRecord {
            reservation,
            tickets: issued,
        })
    }
}
