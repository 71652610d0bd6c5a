mod debt;
mod driver;
mod lifecycle;
mod persistence;
