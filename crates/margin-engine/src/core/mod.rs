pub mod decoder;
pub mod discovery;
pub mod metadata_store;
pub mod plan_builder;
pub mod position_manager;
pub mod price_view;
pub mod risk;
pub mod units;
