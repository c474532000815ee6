pub mod time;
pub mod ids;
