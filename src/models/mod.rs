pub mod user;
pub mod theme;
pub mod show;
pub mod dome;
pub mod session;
pub mod reservation;

pub use user::{NewUser, User, UserUpdate};
pub use theme::ShowTheme;
pub use show::{AstronomyShow, AstronomyShowRecord, NewAstronomyShow, ShowFilter};
pub use dome::{NewPlanetariumDome, PlanetariumDome};
pub use session::{NewShowSession, SessionFilter, ShowSession, ShowSessionDetail, ShowSessionSummary, TakenPlace};
pub use reservation::{
    NewTicket, Page, Reservation, ReservationListItem, ReservationRecord, Ticket, TicketWithSession,
};
