/*
    core_model - Value types shared by the store, publisher and tracker
*/

pub mod types;

pub use types::*;
