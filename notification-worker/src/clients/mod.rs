pub mod circuit_breaker;
pub mod fcm;
pub mod health;
pub mod smtp;
