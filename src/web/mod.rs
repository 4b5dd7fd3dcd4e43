pub mod essays;
pub mod history;
pub mod identity;
pub mod responses;
pub mod router;
pub mod state;
pub mod uploads;

pub use responses::json_error;
pub use state::AppState;
