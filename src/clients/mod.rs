pub mod database;
pub mod fcm;
pub mod health;
pub mod rbmq;
pub mod redis;
pub mod rooms;
