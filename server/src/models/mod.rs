pub mod category;
pub mod customer;
pub mod event;
pub mod ticket;
pub mod user;

pub use category::{Category, CategoryCapacity};
pub use customer::Customer;
pub use event::Event;
pub use ticket::{NewTicket, Ticket, TicketDetails, TicketStatus};
pub use user::User;
