// src/blockchain/services/mod.rs

pub mod account;
pub mod block;
pub mod contract;
pub mod ens;
pub mod network;
pub mod price;
pub mod token;
pub mod transaction;
