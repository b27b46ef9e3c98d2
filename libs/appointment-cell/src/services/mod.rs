pub mod booking;
pub mod instant;
pub mod lifecycle;
