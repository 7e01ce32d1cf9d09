use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tokio::sync::Mutex;

use super::{invalid_pk, Store, StoreError, StoreResult, TICKETS_OUTSIDE_DOME};
use crate::error::FieldErrors;
use crate::models::*;
use crate::services::booking;

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    themes: BTreeMap<i64, ShowTheme>,
    shows: BTreeMap<i64, AstronomyShow>,
    /// (show_id, theme_id)
    show_themes: BTreeSet<(i64, i64)>,
    domes: BTreeMap<i64, PlanetariumDome>,
    sessions: BTreeMap<i64, ShowSession>,
    reservations: BTreeMap<i64, Reservation>,
    tickets: BTreeMap<i64, Ticket>,
    /// (show_session_id, row, seat) - аналог уникального индекса
    taken: HashSet<(i64, i32, i32)>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn show_record(&self, show: &AstronomyShow) -> AstronomyShowRecord {
        let themes = self
            .show_themes
            .range((show.id, i64::MIN)..=(show.id, i64::MAX))
            .filter_map(|(_, theme_id)| self.themes.get(theme_id).cloned())
            .collect();
        AstronomyShowRecord {
            show: show.clone(),
            themes,
        }
    }

    fn session_summary(&self, session: &ShowSession) -> Option<ShowSessionSummary> {
        let show = self.shows.get(&session.astronomy_show_id)?;
        let dome = self.domes.get(&session.planetarium_dome_id)?;
        let issued = self
            .taken
            .iter()
            .filter(|(session_id, _, _)| *session_id == session.id)
            .count() as i64;
        Some(ShowSessionSummary {
            id: session.id,
            show_time: session.show_time,
            astronomy_show_title: show.title.clone(),
            astronomy_show_image: show.image.clone(),
            planetarium_dome_name: dome.name.clone(),
            planetarium_dome_capacity: dome.capacity(),
            tickets_available: booking::tickets_available(dome, issued),
        })
    }

    fn session_dome(&self, session_id: i64) -> Option<&PlanetariumDome> {
        let session = self.sessions.get(&session_id)?;
        self.domes.get(&session.planetarium_dome_id)
    }

    fn check_session_refs(&self, session: &NewShowSession) -> StoreResult<PlanetariumDome> {
        let mut errors = FieldErrors::new();
        if !self.shows.contains_key(&session.astronomy_show_id) {
            errors.add("astronomy_show", invalid_pk(session.astronomy_show_id));
        }
        let dome = self.domes.get(&session.planetarium_dome_id);
        if dome.is_none() {
            errors.add("planetarium_dome", invalid_pk(session.planetarium_dome_id));
        }
        match dome {
            Some(dome) if errors.is_empty() => Ok(dome.clone()),
            _ => Err(StoreError::Invalid(errors)),
        }
    }

    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }
}

/// Хранилище в памяти процесса. Все изменения идут под одним mutex,
/// проверки выполняются до первой записи - неудачная бронь не оставляет следов.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.lock().await;
        if tables.email_taken(&user.email, None) {
            return Err(StoreError::invalid("email", "user with this email already exists."));
        }
        let id = tables.next_id();
        let created = User {
            id,
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            is_staff: user.is_staff,
            is_active: true,
            date_joined: Utc::now(),
        };
        tables.users.insert(id, created.clone());
        Ok(created)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn get_user(&self, id: i64) -> StoreResult<User> {
        let tables = self.tables.lock().await;
        tables.users.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn update_user(&self, id: i64, update: UserUpdate) -> StoreResult<User> {
        let mut tables = self.tables.lock().await;
        if let Some(email) = update.email.as_deref() {
            if tables.email_taken(email, Some(id)) {
                return Err(StoreError::invalid("email", "user with this email already exists."));
            }
        }
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(email) = update.email {
            user.email = email;
        }
        if let Some(hash) = update.password_hash {
            user.password_hash = hash;
        }
        if let Some(first_name) = update.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = update.last_name {
            user.last_name = last_name;
        }
        Ok(user.clone())
    }

    async fn list_themes(&self) -> StoreResult<Vec<ShowTheme>> {
        let tables = self.tables.lock().await;
        Ok(tables.themes.values().cloned().collect())
    }

    async fn create_theme(&self, name: &str) -> StoreResult<ShowTheme> {
        let mut tables = self.tables.lock().await;
        if tables.themes.values().any(|t| t.name == name) {
            return Err(StoreError::invalid("name", "show theme with this name already exists."));
        }
        let theme = ShowTheme {
            id: tables.next_id(),
            name: name.to_string(),
        };
        tables.themes.insert(theme.id, theme.clone());
        Ok(theme)
    }

    async fn list_domes(&self) -> StoreResult<Vec<PlanetariumDome>> {
        let tables = self.tables.lock().await;
        Ok(tables.domes.values().cloned().collect())
    }

    async fn create_dome(&self, dome: NewPlanetariumDome) -> StoreResult<PlanetariumDome> {
        let mut tables = self.tables.lock().await;
        let dome = PlanetariumDome {
            id: tables.next_id(),
            name: dome.name,
            rows: dome.rows,
            seats_in_row: dome.seats_in_row,
        };
        tables.domes.insert(dome.id, dome.clone());
        Ok(dome)
    }

    async fn list_shows(&self, filter: &ShowFilter) -> StoreResult<Vec<AstronomyShowRecord>> {
        let tables = self.tables.lock().await;
        let needle = filter.title.as_deref().map(str::to_lowercase);
        let records = tables
            .shows
            .values()
            .filter(|show| match &needle {
                Some(needle) => show.title.to_lowercase().contains(needle.as_str()),
                None => true,
            })
            .filter(|show| match &filter.theme_ids {
                Some(ids) => ids
                    .iter()
                    .any(|theme_id| tables.show_themes.contains(&(show.id, *theme_id))),
                None => true,
            })
            .map(|show| tables.show_record(show))
            .collect();
        Ok(records)
    }

    async fn get_show(&self, id: i64) -> StoreResult<AstronomyShowRecord> {
        let tables = self.tables.lock().await;
        let show = tables.shows.get(&id).ok_or(StoreError::NotFound)?;
        Ok(tables.show_record(show))
    }

    async fn create_show(&self, show: NewAstronomyShow) -> StoreResult<AstronomyShowRecord> {
        let mut tables = self.tables.lock().await;
        if let Some(missing) = show.theme_ids.iter().find(|id| !tables.themes.contains_key(*id)) {
            return Err(StoreError::invalid("show_theme", invalid_pk(*missing)));
        }
        let created = AstronomyShow {
            id: tables.next_id(),
            title: show.title,
            description: show.description,
            image: None,
        };
        for theme_id in show.theme_ids {
            tables.show_themes.insert((created.id, theme_id));
        }
        tables.shows.insert(created.id, created.clone());
        Ok(tables.show_record(&created))
    }

    async fn set_show_image(&self, id: i64, image: &str) -> StoreResult<AstronomyShow> {
        let mut tables = self.tables.lock().await;
        let show = tables.shows.get_mut(&id).ok_or(StoreError::NotFound)?;
        show.image = Some(image.to_string());
        Ok(show.clone())
    }

    async fn list_sessions(&self, filter: SessionFilter) -> StoreResult<Vec<ShowSessionSummary>> {
        let tables = self.tables.lock().await;
        let mut sessions: Vec<ShowSessionSummary> = tables
            .sessions
            .values()
            .filter(|s| filter.date.map_or(true, |date| s.show_time.date() == date))
            .filter(|s| {
                filter
                    .astronomy_show_id
                    .map_or(true, |show_id| s.astronomy_show_id == show_id)
            })
            .filter_map(|s| tables.session_summary(s))
            .collect();
        sessions.sort_by_key(|s| (s.show_time, s.id));
        Ok(sessions)
    }

    async fn get_session(&self, id: i64) -> StoreResult<ShowSessionDetail> {
        let tables = self.tables.lock().await;
        let session = tables.sessions.get(&id).ok_or(StoreError::NotFound)?;
        let show = tables
            .shows
            .get(&session.astronomy_show_id)
            .ok_or(StoreError::NotFound)?;
        let planetarium_dome = tables
            .domes
            .get(&session.planetarium_dome_id)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        let mut taken_places: Vec<TakenPlace> = tables
            .taken
            .iter()
            .filter(|(session_id, _, _)| *session_id == id)
            .map(|(_, row, seat)| TakenPlace {
                row: *row,
                seat: *seat,
            })
            .collect();
        taken_places.sort();

        Ok(ShowSessionDetail {
            session: session.clone(),
            astronomy_show: tables.show_record(show),
            planetarium_dome,
            taken_places,
        })
    }

    async fn create_session(&self, session: NewShowSession) -> StoreResult<ShowSession> {
        let mut tables = self.tables.lock().await;
        tables.check_session_refs(&session)?;
        let created = ShowSession {
            id: tables.next_id(),
            astronomy_show_id: session.astronomy_show_id,
            planetarium_dome_id: session.planetarium_dome_id,
            show_time: session.show_time,
        };
        tables.sessions.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_session(&self, id: i64, session: NewShowSession) -> StoreResult<ShowSession> {
        let mut tables = self.tables.lock().await;
        if !tables.sessions.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        let dome = tables.check_session_refs(&session)?;
        let outside = tables
            .taken
            .iter()
            .any(|(session_id, row, seat)| {
                *session_id == id && (*row > dome.rows || *seat > dome.seats_in_row)
            });
        if outside {
            return Err(StoreError::invalid("planetarium_dome", TICKETS_OUTSIDE_DOME));
        }

        let updated = ShowSession {
            id,
            astronomy_show_id: session.astronomy_show_id,
            planetarium_dome_id: session.planetarium_dome_id,
            show_time: session.show_time,
        };
        tables.sessions.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_session(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.sessions.remove(&id).is_none() {
            return Err(StoreError::NotFound);
        }
        tables.tickets.retain(|_, t| t.show_session_id != id);
        tables.taken.retain(|(session_id, _, _)| *session_id != id);
        Ok(())
    }

    async fn list_reservations(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Page<ReservationListItem>> {
        let tables = self.tables.lock().await;
        let mut own: Vec<&Reservation> = tables
            .reservations
            .values()
            .filter(|r| r.user_id == user_id)
            .collect();
        own.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let count = own.len() as i64;
        let skip = usize::try_from(offset).unwrap_or(0);
        let take = usize::try_from(limit).unwrap_or(0);

        let mut summaries: HashMap<i64, Option<ShowSessionSummary>> = HashMap::new();
        let mut items = Vec::new();
        for reservation in own.into_iter().skip(skip).take(take) {
            let mut tickets: Vec<&Ticket> = tables
                .tickets
                .values()
                .filter(|t| t.reservation_id == reservation.id)
                .collect();
            tickets.sort_by_key(|t| (t.row, t.seat));

            let mut with_sessions = Vec::with_capacity(tickets.len());
            for ticket in tickets {
                let summary = summaries
                    .entry(ticket.show_session_id)
                    .or_insert_with(|| {
                        tables
                            .sessions
                            .get(&ticket.show_session_id)
                            .and_then(|s| tables.session_summary(s))
                    });
                if let Some(summary) = summary {
                    with_sessions.push(TicketWithSession {
                        ticket: ticket.clone(),
                        show_session: summary.clone(),
                    });
                }
            }
            items.push(ReservationListItem {
                reservation: reservation.clone(),
                tickets: with_sessions,
            });
        }

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

        let mut tables = self.tables.lock().await;

        let mut errors = FieldErrors::new();
        for (index, ticket) in tickets.iter().enumerate() {
            let Some(dome) = tables.session_dome(ticket.show_session_id) else {
                let (field, message) = booking::unknown_session(index, ticket.show_session_id);
                errors.add(field, message);
                continue;
            };
            if !booking::check_bounds(index, ticket, dome, &mut errors) {
                continue;
            }
            if tables
                .taken
                .contains(&(ticket.show_session_id, ticket.row, ticket.seat))
            {
                let (field, message) = booking::seat_taken(index);
                errors.add(field, message);
            }
        }
        errors.into_result()?;

        let reservation = Reservation {
            id: tables.next_id(),
            user_id,
            created_at: Utc::now(),
        };
        tables.reservations.insert(reservation.id, reservation.clone());

        let mut issued = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            let created = Ticket {
                id: tables.next_id(),
                row: ticket.row,
                seat: ticket.seat,
                show_session_id: ticket.show_session_id,
                reservation_id: reservation.id,
            };
            tables
                .taken
                .insert((ticket.show_session_id, ticket.row, ticket.seat));
            tables.tickets.insert(created.id, created.clone());
            issued.push(created);
        }
        issued.sort_by_key(|t| (t.row, t.seat));

        Ok(ReservationRecord {
            reservation,
            tickets: issued,
        })
    }
}
