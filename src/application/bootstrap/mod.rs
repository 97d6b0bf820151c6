pub mod persistence;
pub mod services;
pub mod training;
