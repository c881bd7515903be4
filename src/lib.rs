pub mod gi;
pub mod prelude;
