pub mod warn;
pub mod env;
