pub mod location_store;

pub use location_store::{
    LocationListener, LocationStore, SubscriptionId, ACCURACY_THRESHOLD_METERS,
};
