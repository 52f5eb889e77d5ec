pub mod location_view;

pub use location_view::{LocationView, ViewState};
