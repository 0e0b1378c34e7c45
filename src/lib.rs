pub mod client;
pub mod model;
pub mod normalization;
pub mod orchestrator;
pub mod pubg;
pub mod store;
pub mod trace;
pub mod valorant;

pub mod util {
    pub mod env;
}
