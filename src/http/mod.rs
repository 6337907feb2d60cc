mod admission;
mod encryption;
mod handlers;
mod routes;
mod templates;

#[cfg(test)]
mod tests;

pub use routes::{create_router, AppState};
