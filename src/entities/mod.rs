//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod license_plate;
pub mod record;
pub mod reservation;
pub mod user;

// Re-export specific types to avoid conflicts
pub use license_plate::{
    Column as LicensePlateColumn, Entity as LicensePlate, Model as LicensePlateModel,
};
pub use record::{Column as RecordColumn, Entity as Record, Model as RecordModel};
pub use reservation::{
    Column as ReservationColumn, Entity as Reservation, Model as ReservationModel,
    ReservationStatus, Timeslot,
};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel, UserRole};
