pub mod event;
pub mod fcm;
pub mod health;
pub mod notification;
pub mod room;
pub mod target;
