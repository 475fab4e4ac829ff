pub mod io;
pub mod logger;
