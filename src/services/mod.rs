pub mod charges;
pub mod discount;
pub mod mail;
pub mod orders;
pub mod payment;
pub mod pdf;
pub mod storage;
pub mod ticketing;
